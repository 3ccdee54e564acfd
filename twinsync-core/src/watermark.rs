//! The watermark marks the boundary of fully-synced changes: every upstream
//! change up to and including this instant is reflected downstream. It is
//! read once per coordinator lifetime and written exactly once per fully
//! acknowledged sync cycle, so it never moves backwards and never moves past
//! work that was not delivered.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;

pub mod store;

pub type Watermark = DateTime<Utc>;

/// Durable timestamp persistence for one sync source.
///
/// There is a single writer per source (the coordinator of that source), and
/// a write only ever carries the end of a window whose every element was
/// acknowledged downstream. Use as `Arc<dyn WatermarkStore>` for dynamic
/// dispatch.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Last committed watermark, `None` if nothing has been committed yet.
    ///
    /// A read failure is recovered by the caller (it falls back to
    /// `now - initial_start_offset`), so implementations should surface
    /// transient errors instead of blocking.
    async fn read(&self) -> Result<Option<Watermark>>;

    /// Persist a new watermark. Must be durable once this returns `Ok`.
    ///
    /// Failures are logged and swallowed by the caller; the same window is
    /// simply streamed again, so implementations must not retry internally
    /// for longer than a cycle.
    async fn write(&self, watermark: Watermark) -> Result<()>;
}
