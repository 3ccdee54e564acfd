//! Tuning knobs for one sync source, externally supplied as a base64-encoded
//! JSON object (durations in milliseconds) or built in code. Every knob is a
//! non-negative duration by construction; only the batch size needs explicit
//! validation.

use std::env;
use std::time::Duration;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use serde::Deserialize;

use crate::{Error, Result};

const ENV_SYNC_OBJ: &str = "TWINSYNC_SYNC_OBJECT";

const DEFAULT_START_OFFSET_MS: u64 = 30 * 60 * 1000;
const DEFAULT_INITIAL_START_OFFSET_MS: u64 = 24 * 60 * 60 * 1000;
const DEFAULT_STREAM_INTERVAL_MS: u64 = 60 * 1000;
const DEFAULT_MAX_IDLE_TIME_MS: u64 = 60 * 1000;
const DEFAULT_STREAMING_TIMEOUT_MS: u64 = 10 * 60 * 1000;
const DEFAULT_ELEMENTS_PER_BATCH: usize = 10;
const DEFAULT_OUTDATED_WARNING_OFFSET_MS: u64 = 3 * 60 * 60 * 1000;
const DEFAULT_MINIMAL_DELAY_BETWEEN_STREAMS_MS: u64 = 0;

/// Wire form of [`SyncConfig`]: what the platform hands us through the
/// environment.
#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SyncConfigObject {
    start_offset_ms: u64,
    initial_start_offset_ms: u64,
    stream_interval_ms: u64,
    max_idle_time_ms: u64,
    streaming_timeout_ms: u64,
    elements_per_batch: usize,
    outdated_warning_offset_ms: u64,
    minimal_delay_between_streams_ms: u64,
}

impl Default for SyncConfigObject {
    fn default() -> Self {
        SyncConfigObject {
            start_offset_ms: DEFAULT_START_OFFSET_MS,
            initial_start_offset_ms: DEFAULT_INITIAL_START_OFFSET_MS,
            stream_interval_ms: DEFAULT_STREAM_INTERVAL_MS,
            max_idle_time_ms: DEFAULT_MAX_IDLE_TIME_MS,
            streaming_timeout_ms: DEFAULT_STREAMING_TIMEOUT_MS,
            elements_per_batch: DEFAULT_ELEMENTS_PER_BATCH,
            outdated_warning_offset_ms: DEFAULT_OUTDATED_WARNING_OFFSET_MS,
            minimal_delay_between_streams_ms: DEFAULT_MINIMAL_DELAY_BETWEEN_STREAMS_MS,
        }
    }
}

/// Immutable per-source sync settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// A window is only streamed once its data is at least this old, so the
    /// upstream journal has settled before we re-derive from it.
    pub start_offset: Duration,
    /// How far back the very first sync reaches when no watermark has ever
    /// been persisted (or the store is unreadable at start).
    pub initial_start_offset: Duration,
    /// Width of one sync window; also the lower bound on trigger spacing.
    pub stream_interval: Duration,
    /// Per-event inactivity bound inside a cycle: waiting for the stream
    /// handle, the next batch, or an ack. Expiry aborts the cycle.
    pub max_idle_time: Duration,
    /// Upper bound on one whole cycle. Expiry is fatal to the coordinator
    /// and answered by a supervisor restart.
    pub streaming_timeout: Duration,
    /// Maximum number of elements the provider should put in one batch.
    pub elements_per_batch: usize,
    /// Warn once the window end lags behind `now` by more than this.
    pub outdated_warning_offset: Duration,
    /// Floor on trigger spacing, effective even when cycles complete
    /// instantly (empty windows).
    pub minimal_delay_between_streams: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfigObject::default().into()
    }
}

impl From<SyncConfigObject> for SyncConfig {
    fn from(obj: SyncConfigObject) -> Self {
        SyncConfig {
            start_offset: Duration::from_millis(obj.start_offset_ms),
            initial_start_offset: Duration::from_millis(obj.initial_start_offset_ms),
            stream_interval: Duration::from_millis(obj.stream_interval_ms),
            max_idle_time: Duration::from_millis(obj.max_idle_time_ms),
            streaming_timeout: Duration::from_millis(obj.streaming_timeout_ms),
            elements_per_batch: obj.elements_per_batch,
            outdated_warning_offset: Duration::from_millis(obj.outdated_warning_offset_ms),
            minimal_delay_between_streams: Duration::from_millis(
                obj.minimal_delay_between_streams_ms,
            ),
        }
    }
}

impl SyncConfig {
    /// Decode a base64-encoded JSON settings object.
    pub fn load(encoded: impl AsRef<[u8]>) -> Result<Self> {
        let decoded = BASE64_STANDARD
            .decode(encoded.as_ref())
            .map_err(|e| Error::Config(format!("decoding sync object: {e}")))?;
        let obj: SyncConfigObject = serde_json::from_slice(&decoded)
            .map_err(|e| Error::Config(format!("parsing sync object: {e}")))?;
        let config: SyncConfig = obj.into();
        config.validate()?;
        Ok(config)
    }

    /// Load the settings object from the `TWINSYNC_SYNC_OBJECT` environment
    /// variable.
    pub fn from_env() -> Result<Self> {
        let encoded = env::var(ENV_SYNC_OBJ)
            .map_err(|_| Error::Config(format!("{ENV_SYNC_OBJ} is not set")))?;
        Self::load(encoded)
    }

    pub fn validate(&self) -> Result<()> {
        if self.elements_per_batch == 0 {
            return Err(Error::Config(
                "elementsPerBatch must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encode(value: serde_json::Value) -> String {
        BASE64_STANDARD.encode(value.to_string())
    }

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.start_offset, Duration::from_secs(30 * 60));
        assert_eq!(config.initial_start_offset, Duration::from_secs(24 * 3600));
        assert_eq!(config.stream_interval, Duration::from_secs(60));
        assert_eq!(config.elements_per_batch, 10);
        assert_eq!(config.minimal_delay_between_streams, Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_overrides_and_fills_defaults() {
        let encoded = encode(json!({
            "streamIntervalMs": 50,
            "elementsPerBatch": 1,
            "maxIdleTimeMs": 10_000
        }));

        let config = SyncConfig::load(encoded).unwrap();
        assert_eq!(config.stream_interval, Duration::from_millis(50));
        assert_eq!(config.elements_per_batch, 1);
        assert_eq!(config.max_idle_time, Duration::from_secs(10));
        // untouched knobs keep their defaults
        assert_eq!(config.streaming_timeout, Duration::from_secs(600));
    }

    #[test]
    fn rejects_zero_batch_size() {
        let encoded = encode(json!({ "elementsPerBatch": 0 }));
        assert!(matches!(
            SyncConfig::load(encoded),
            Err(Error::Config(msg)) if msg.contains("elementsPerBatch")
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(SyncConfig::load("not base64 at all!").is_err());
        let not_json = BASE64_STANDARD.encode("{{{{");
        assert!(SyncConfig::load(not_json).is_err());
    }
}
