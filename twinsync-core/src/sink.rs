//! Downstream seam: the sink receives one changed entity at a time and
//! acknowledges it through the oneshot sender carried by the [`Delivery`].
//!
//! The coordinator redelivers a whole window after any abort or restart, so
//! a sink must be idempotent per `(entity id, revision)`.

use tracing::info;

use crate::Result;
use crate::message::{Delivery, StreamAck};

/// Set of items to be implemented to act as a downstream sink.
#[trait_variant::make(ChangeSink: Send)]
pub trait LocalChangeSink {
    /// Hand one element to the downstream consumer.
    ///
    /// Returning `Ok` only means the element was accepted for processing;
    /// the actual outcome travels back through `delivery.ack`, at latest
    /// within the coordinator's `max_idle_time`. An `Err` means the sink is
    /// unreachable and is fatal to the running coordinator.
    async fn deliver(&self, delivery: Delivery) -> Result<()>;
}

/// Builtin sink that logs each element and acknowledges it immediately.
/// Useful for wiring tests and for dry-running a new sync source.
#[derive(Debug, Clone, Default)]
pub struct LogSink;

impl ChangeSink for LogSink {
    async fn deliver(&self, delivery: Delivery) -> Result<()> {
        info!(entity = %delivery.entity, "sync delivery");
        let _ = delivery
            .ack
            .send(StreamAck::success(delivery.entity.id.clone()));
        Ok(())
    }
}
