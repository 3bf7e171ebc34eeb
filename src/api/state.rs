use std::sync::Arc;

use tokio_util::task::TaskTracker;

use crate::config::Config;
use crate::ledger::JobLedger;
use crate::observability::Metrics;
use crate::source::SourceClient;
use crate::storage::StorageClient;
use crate::transfer::{JobRegistry, TransferContext};

pub type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<JobRegistry>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        ledger: JobLedger,
        storage: StorageClient,
        source: SourceClient,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        let ctx = TransferContext {
            ledger,
            storage,
            source,
            settings: config.transfer.clone(),
            tasks: TaskTracker::new(),
            metrics: metrics.clone(),
        };

        Self {
            config: Arc::new(config),
            registry: Arc::new(JobRegistry::new(Arc::new(ctx))),
            metrics,
        }
    }

    /// Open the ledger and connect the clients named by `config`
    pub fn from_config(config: Config) -> Result<Self, AnyError> {
        let ledger = JobLedger::open(&config.server.ledger_path)?;
        let storage = StorageClient::from_config(&config.storage)?;
        let source = SourceClient::new(&config.source)?;
        Ok(Self::new(config, ledger, storage, source))
    }

    pub fn tasks(&self) -> &TaskTracker {
        &self.registry.context().tasks
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.registry.context().ledger
    }
}
