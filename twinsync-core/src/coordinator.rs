//! The coordinator drives one sync source: it waits for the trigger clock,
//! streams one window from the change provider to the sink, and commits the
//! watermark once the whole window has been acknowledged.
//!
//! ```text
//! Idle --trigger--> AwaitingStream --first batch--> Streaming --all acked-->
//! Committing --> Idle
//!                      \--idle/nack--> Aborting --> Idle (same window again)
//! ```
//!
//! Everything inside a cycle is guarded twice: a per-event `max_idle_time`
//! watchdog (waiting for the stream handle, the next batch, or an ack) that
//! aborts the cycle, and a whole-cycle `streaming_timeout` bound that is
//! fatal. Fatal errors are not handled here at all - the coordinator's
//! in-memory state is disposable and the supervisor answers every failure
//! with a fresh instance that re-reads the durable watermark.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::time::{Instant, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::message::{AckOutcome, Delivery, EntityId, ModifiedEntity};
use crate::provider::{ChangeProvider, StreamRequest};
use crate::sink::ChangeSink;
use crate::trigger::{SyncWindow, TriggerClock};
use crate::watermark::{Watermark, WatermarkStore};

/// How a sync cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CycleOutcome {
    /// Every element acknowledged and the watermark persisted.
    Committed,
    /// Every element acknowledged but the watermark write failed; the cached
    /// watermark stays put, so the same window is streamed again.
    CommitSkipped,
    /// The cycle was abandoned without a commit.
    Aborted(AbortReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AbortReason {
    /// No stream handle, batch, or ack within `max_idle_time`.
    Idle,
    /// The sink reported a failed delivery for this entity.
    DeliveryFailed(EntityId),
    /// The sink dropped the ack channel without answering.
    AckChannelClosed(EntityId),
}

enum Forwarded {
    Acked,
    Aborted(AbortReason),
}

/// One sync source's coordinator. Cheap to construct; the supervisor builds
/// a fresh one for every (re)start.
pub struct SyncCoordinator<P, S> {
    source: String,
    config: SyncConfig,
    store: Arc<dyn WatermarkStore>,
    provider: P,
    sink: S,
}

impl<P, S> SyncCoordinator<P, S>
where
    P: ChangeProvider,
    S: ChangeSink,
{
    pub fn new(
        source: impl Into<String>,
        config: SyncConfig,
        store: Arc<dyn WatermarkStore>,
        provider: P,
        sink: S,
    ) -> Self {
        SyncCoordinator {
            source: source.into(),
            config,
            store,
            provider,
            sink,
        }
    }

    /// Run trigger cycles until cancelled. `Err` means the instance is done
    /// for and the caller must restart from durable state.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let watermark = self.initial_watermark().await;
        info!(source = %self.source, watermark = %watermark.to_rfc3339(), "starting sync coordinator");
        let mut clock = TriggerClock::new(self.config.clone(), watermark);

        loop {
            let trigger = clock.next_trigger(Utc::now(), Instant::now());
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(source = %self.source, "sync coordinator stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(trigger.delay) => {}
            }

            if trigger.falling_behind {
                warn!(source = %self.source, window = %trigger.window, "sync is falling behind the upstream journal");
            }

            clock.mark_triggered(Instant::now());
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(source = %self.source, "sync coordinator stopped mid-cycle");
                    return Ok(());
                }
                outcome = self.run_cycle(trigger.window) => outcome?,
            };

            match outcome {
                CycleOutcome::Committed => clock.advance(trigger.window.to),
                CycleOutcome::CommitSkipped => {}
                CycleOutcome::Aborted(reason) => {
                    info!(source = %self.source, window = %trigger.window, ?reason, "sync cycle aborted, window will be re-streamed");
                }
            }
        }
    }

    async fn initial_watermark(&self) -> Watermark {
        match self.store.read().await {
            Ok(Some(watermark)) => watermark,
            Ok(None) => self.fallback_watermark(),
            Err(e) => {
                warn!(source = %self.source, error = %e, "watermark unreadable, falling back to initial start offset");
                self.fallback_watermark()
            }
        }
    }

    fn fallback_watermark(&self) -> Watermark {
        chrono::TimeDelta::from_std(self.config.initial_start_offset)
            .ok()
            .and_then(|offset| Utc::now().checked_sub_signed(offset))
            .unwrap_or(Watermark::MIN_UTC)
    }

    /// One full cycle, bounded by `streaming_timeout`.
    async fn run_cycle(&self, window: SyncWindow) -> Result<CycleOutcome> {
        match timeout(self.config.streaming_timeout, self.stream_window(window)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Stall(format!(
                "sync cycle for {window} did not finish within {:?}",
                self.config.streaming_timeout
            ))),
        }
    }

    async fn stream_window(&self, window: SyncWindow) -> Result<CycleOutcome> {
        let request = StreamRequest {
            from: window.from,
            to: window.to,
            batch_size: self.config.elements_per_batch,
            timeout: self.config.streaming_timeout,
        };

        debug!(source = %self.source, window = %window, "requesting change stream");
        let mut stream = match timeout(
            self.config.max_idle_time,
            self.provider.request_changes(request),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Ok(CycleOutcome::Aborted(AbortReason::Idle)),
        };

        let mut delivered: u64 = 0;
        loop {
            let batch = match timeout(self.config.max_idle_time, stream.next_batch()).await {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(_) => return Ok(CycleOutcome::Aborted(AbortReason::Idle)),
            };
            for entity in batch {
                match self.forward(entity).await? {
                    Forwarded::Acked => delivered += 1,
                    Forwarded::Aborted(reason) => return Ok(CycleOutcome::Aborted(reason)),
                }
            }
        }

        info!(source = %self.source, window = %window, delivered, "change stream completed");
        match self.store.write(window.to).await {
            Ok(()) => Ok(CycleOutcome::Committed),
            Err(e) => {
                error!(source = %self.source, window = %window, error = %e, "failed to persist watermark, window will be re-streamed");
                Ok(CycleOutcome::CommitSkipped)
            }
        }
    }

    /// Forward one element and wait for its acknowledgment before the caller
    /// pulls the next one.
    async fn forward(&self, entity: ModifiedEntity) -> Result<Forwarded> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.sink
            .deliver(Delivery {
                entity: entity.clone(),
                ack: ack_tx,
            })
            .await?;

        let ack = match timeout(self.config.max_idle_time, ack_rx).await {
            Ok(Ok(ack)) => ack,
            Ok(Err(_)) => {
                return Ok(Forwarded::Aborted(AbortReason::AckChannelClosed(entity.id)));
            }
            Err(_) => return Ok(Forwarded::Aborted(AbortReason::Idle)),
        };

        if ack.entity_id != entity.id {
            return Err(Error::Sink(format!(
                "ack for {} does not match in-flight element {}",
                ack.entity_id, entity.id
            )));
        }

        match ack.outcome {
            AckOutcome::Success => Ok(Forwarded::Acked),
            AckOutcome::Failure => {
                warn!(source = %self.source, entity = %entity, "delivery failed downstream");
                Ok(Forwarded::Aborted(AbortReason::DeliveryFailed(entity.id)))
            }
        }
    }
}
