/// Fjall-based persistence layer for job records and part completion tokens
///
/// Every job id maps to one `JobRecord` plus zero or more `PartRecord`s. The
/// ledger is opened once per server process and shared by all job actors;
/// callers are responsible for serializing mutations of a single job.
///
/// ## Retention
///
/// Successful jobs are cleared on finish. Failed or abandoned jobs stay for
/// inspection until `transfer::retention::prune_stale()` aborts their open
/// uploads and removes records idle for longer than the configured TTL.
///
/// ## Usage
///
/// ```rust,ignore
/// use ingestbox::ledger::JobLedger;
///
/// let ledger = JobLedger::open("data/ledger")?;
/// ledger.put_job(&record)?;
/// let parts = ledger.list_parts("job_123")?;
/// ```

pub mod error;
pub mod partitions;
pub mod pruning;
pub mod store;

pub use error::{LedgerError, Result};
pub use pruning::PruneStats;
pub use store::{JobLedger, LedgerStats};
