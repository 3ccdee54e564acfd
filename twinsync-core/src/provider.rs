//! Upstream seam: the change provider is asked once per cycle for everything
//! that changed inside a time window and answers with a pull-based
//! [`ChangeStream`] of batches.
//!
//! The stream rides on a bounded channel so the producer can stay at most one
//! batch ahead of the consumer; within a batch the coordinator forwards one
//! element at a time and only pulls the next batch once the previous one is
//! fully acknowledged. That is the backpressure contract: a slow sink stalls
//! the provider instead of buffering the window in memory.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::Result;
use crate::message::StreamBatch;

/// Window request sent to the change provider. The window is closed-open:
/// `from` is included, `to` is not, so consecutive requests neither skip nor
/// duplicate changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// Maximum number of elements per batch.
    pub batch_size: usize,
    /// Bound the provider may apply to its own streaming machinery; mirrors
    /// the coordinator's whole-cycle bound.
    pub timeout: Duration,
}

/// Pull-based handle to one cycle's change stream.
///
/// `None` from [`next_batch`](ChangeStream::next_batch) is the end-of-stream
/// marker: the producer has sent every change in the window and dropped its
/// sender. Dropping the handle cancels the subscription.
pub struct ChangeStream {
    batches: ReceiverStream<StreamBatch>,
}

impl ChangeStream {
    /// Connected producer/consumer pair for one window. The buffer of one
    /// batch is what keeps the producer from racing ahead of the sink.
    pub fn channel() -> (mpsc::Sender<StreamBatch>, ChangeStream) {
        let (tx, rx) = mpsc::channel(1);
        (
            tx,
            ChangeStream {
                batches: ReceiverStream::new(rx),
            },
        )
    }

    pub async fn next_batch(&mut self) -> Option<StreamBatch> {
        self.batches.next().await
    }
}

/// Set of items to be implemented to act as a change provider.
#[trait_variant::make(ChangeProvider: Send)]
pub trait LocalChangeProvider {
    /// Open a change stream for the window `[from, to)`.
    ///
    /// An error here is fatal to the running coordinator; transient upstream
    /// hiccups should instead surface as a silent stream, which the
    /// coordinator converts into an aborted cycle after `max_idle_time`.
    async fn request_changes(&self, request: StreamRequest) -> Result<ChangeStream>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ModifiedEntity;
    use tokio::time::{Duration, timeout};

    #[tokio::test]
    async fn batches_arrive_in_order_until_close() {
        let (tx, mut stream) = ChangeStream::channel();

        tokio::spawn(async move {
            tx.send(vec![ModifiedEntity::new("ns:a", 1)]).await.unwrap();
            tx.send(vec![]).await.unwrap();
            tx.send(vec![ModifiedEntity::new("ns:b", 2)]).await.unwrap();
        });

        let first = stream.next_batch().await.unwrap();
        assert_eq!(first, vec![ModifiedEntity::new("ns:a", 1)]);
        assert_eq!(stream.next_batch().await.unwrap(), vec![]);
        let third = stream.next_batch().await.unwrap();
        assert_eq!(third, vec![ModifiedEntity::new("ns:b", 2)]);
        // producer dropped the sender -> end of stream
        assert_eq!(stream.next_batch().await, None);
    }

    #[tokio::test]
    async fn producer_is_backpressured() {
        let (tx, mut stream) = ChangeStream::channel();

        // one batch in the buffer, the second send must wait for a pull
        tx.send(vec![ModifiedEntity::new("ns:a", 1)]).await.unwrap();
        let blocked = timeout(
            Duration::from_millis(50),
            tx.send(vec![ModifiedEntity::new("ns:b", 2)]),
        )
        .await;
        assert!(blocked.is_err(), "send should block until a batch is pulled");

        stream.next_batch().await.unwrap();
        timeout(
            Duration::from_secs(1),
            tx.send(vec![ModifiedEntity::new("ns:b", 2)]),
        )
        .await
        .expect("send should proceed after a pull")
        .unwrap();
    }
}
