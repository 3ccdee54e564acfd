//! In-memory implementation of the [`WatermarkStore`] trait.
//!
//! Progress does not survive a process restart, so a restarted service
//! re-syncs from `now - initial_start_offset`. That is safe (the sink is
//! idempotent) and makes this store the default for single-node deployments
//! and for tests.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::Result;
use crate::watermark::{Watermark, WatermarkStore};

#[derive(Debug, Default)]
pub struct InMemoryWatermarkStore {
    last: Mutex<Option<Watermark>>,
}

impl InMemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed the store, e.g. when migrating from another backend.
    pub fn with_watermark(watermark: Watermark) -> Self {
        InMemoryWatermarkStore {
            last: Mutex::new(Some(watermark)),
        }
    }
}

#[async_trait]
impl WatermarkStore for InMemoryWatermarkStore {
    async fn read(&self) -> Result<Option<Watermark>> {
        Ok(*self.last.lock())
    }

    async fn write(&self, watermark: Watermark) -> Result<()> {
        *self.last.lock() = Some(watermark);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn starts_empty() {
        let store = InMemoryWatermarkStore::new();
        assert_eq!(store.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_then_read_back() {
        let store = InMemoryWatermarkStore::new();
        let now = Utc::now();
        store.write(now).await.unwrap();
        assert_eq!(store.read().await.unwrap(), Some(now));
    }

    #[tokio::test]
    async fn seeded() {
        let now = Utc::now();
        let store = InMemoryWatermarkStore::with_watermark(now);
        assert_eq!(store.read().await.unwrap(), Some(now));
    }
}
