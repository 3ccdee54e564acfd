//! Crash-only supervision: the supervisor owns exactly one live
//! [`SyncCoordinator`] and answers every failure - a provider error, a
//! stalled cycle, anything unexpected - by building a fresh instance right
//! away. There is deliberately no backoff between restarts: every restart
//! re-reads the durable watermark and re-derives its window from it, so the
//! worst a restart storm can cause is redundant redelivery, which the sink
//! tolerates anyway.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::SyncConfig;
use crate::coordinator::SyncCoordinator;
use crate::provider::ChangeProvider;
use crate::sink::ChangeSink;
use crate::watermark::WatermarkStore;

pub struct SyncSupervisor<P, S> {
    source: String,
    config: SyncConfig,
    store: Arc<dyn WatermarkStore>,
    provider: P,
    sink: S,
}

impl<P, S> SyncSupervisor<P, S>
where
    P: ChangeProvider + Clone + 'static + Sync,
    S: ChangeSink + Clone + 'static + Sync,
{
    pub fn new(
        source: impl Into<String>,
        config: SyncConfig,
        store: Arc<dyn WatermarkStore>,
        provider: P,
        sink: S,
    ) -> Self {
        SyncSupervisor {
            source: source.into(),
            config,
            store,
            provider,
            sink,
        }
    }

    /// Run coordinators until cancelled, restarting on every failure.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut restarts: u64 = 0;
        loop {
            let coordinator = SyncCoordinator::new(
                self.source.clone(),
                self.config.clone(),
                Arc::clone(&self.store),
                self.provider.clone(),
                self.sink.clone(),
            );

            match coordinator.run(cancel.child_token()).await {
                Ok(()) => {
                    info!(source = %self.source, "sync supervisor stopped");
                    return;
                }
                Err(e) => {
                    restarts += 1;
                    error!(source = %self.source, restarts, error = %e, "sync coordinator failed, restarting");
                }
            }

            if cancel.is_cancelled() {
                info!(source = %self.source, "sync supervisor stopped");
                return;
            }
        }
    }

    /// Spawn the supervision loop onto the runtime.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}
