//! Transfer orchestration: planning, per-job actors, the single-stream
//! fallback and the client-side chunk driver.

pub mod actor;
pub mod driver;
pub mod error;
pub mod fallback;
pub mod planner;
pub mod registry;
pub mod remote;
pub mod retention;
pub mod service;
pub mod types;

pub use actor::{JobActor, ProgressSink, TransferContext};
pub use driver::{ChunkDriver, DriverReport};
pub use error::{DriverError, TransferError};
pub use registry::JobRegistry;
pub use remote::RemoteJob;
pub use retention::prune_stale;
pub use service::JobService;
pub use types::{
    ChunkOutcome, ChunkPlan, ChunkRange, FinishOutcome, InitOutcome, JobRecord, JobStatus,
    JobStatusReport, PartRecord, Progress, ProgressStatus, TransferMode,
};
