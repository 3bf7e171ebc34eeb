use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::actor::{JobActor, TransferContext};

/// Hands out at most one live `JobActor` per job id
///
/// An actor stays registered while a caller holds it or its single-stream
/// copy is running. The map lock is never held across an await.
pub struct JobRegistry {
    ctx: Arc<TransferContext>,
    actors: Mutex<HashMap<String, Arc<JobActor>>>,
}

/// Nobody but the map holds it and no copy is running
fn is_idle(actor: &Arc<JobActor>) -> bool {
    Arc::strong_count(actor) == 1 && !actor.is_busy()
}

impl JobRegistry {
    pub fn new(ctx: Arc<TransferContext>) -> Self {
        Self {
            ctx,
            actors: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &Arc<TransferContext> {
        &self.ctx
    }

    /// Existing actor for `job_id`, or a fresh one bound to the shared context.
    /// Idle actors of other jobs are evicted on the way.
    pub async fn actor(&self, job_id: &str) -> Arc<JobActor> {
        let mut actors = self.actors.lock().await;
        let before = actors.len();
        actors.retain(|id, actor| id == job_id || !is_idle(actor));
        if actors.len() < before {
            debug!(evicted = before - actors.len(), "Evicted idle job actors");
        }

        actors
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(JobActor::new(job_id, self.ctx.clone())))
            .clone()
    }

    /// Drop the in-memory actor once nobody uses it and nothing runs on its
    /// behalf. Callers drop their own handle first. Durable state stays in
    /// the ledger.
    pub async fn release(&self, job_id: &str) -> bool {
        let mut actors = self.actors.lock().await;
        if !actors.get(job_id).is_some_and(is_idle) {
            return false;
        }
        actors.remove(job_id);
        debug!(job_id, "Released job actor");
        true
    }

    pub async fn live_count(&self) -> usize {
        self.actors.lock().await.len()
    }
}
