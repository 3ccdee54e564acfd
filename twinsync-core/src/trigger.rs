//! Decides when the next sync cycle may start and which window it covers.
//!
//! The window is derived purely from the current watermark and the configured
//! interval, so wall-clock skew can delay a cycle but never changes what it
//! covers. Two constraints gate the start:
//!
//! * spacing - at least `max(stream_interval, minimal_delay_between_streams)`
//!   after the previous trigger, measured on the monotonic clock;
//! * settling - not before `watermark + start_offset` wall-clock time, so a
//!   window is only streamed once its data has stopped changing upstream.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Instant;

use crate::config::SyncConfig;
use crate::watermark::Watermark;

/// Closed-open time window `[from, to)` covered by one sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.from.to_rfc3339(), self.to.to_rfc3339())
    }
}

/// One trigger decision: which window to stream, how long to wait before
/// starting, and whether the sync is lagging enough to warn about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Trigger {
    pub(crate) window: SyncWindow,
    pub(crate) delay: Duration,
    pub(crate) falling_behind: bool,
}

/// Holds the only mutable scheduling state: the cached watermark and the
/// instant of the previous trigger.
pub(crate) struct TriggerClock {
    config: SyncConfig,
    watermark: Watermark,
    last_trigger: Option<Instant>,
}

impl TriggerClock {
    pub(crate) fn new(config: SyncConfig, watermark: Watermark) -> Self {
        TriggerClock {
            config,
            watermark,
            last_trigger: None,
        }
    }

    /// Evaluate the next trigger against the given wall and monotonic clocks.
    pub(crate) fn next_trigger(&self, wall_now: DateTime<Utc>, now: Instant) -> Trigger {
        let window = SyncWindow {
            from: self.watermark,
            to: add(self.watermark, self.config.stream_interval),
        };

        let spacing = self
            .config
            .stream_interval
            .max(self.config.minimal_delay_between_streams);
        let spacing_delay = match self.last_trigger {
            Some(last) => last
                .checked_add(spacing)
                .map(|due| due.saturating_duration_since(now))
                .unwrap_or(Duration::MAX),
            None => Duration::ZERO,
        };

        let settled_at = add(self.watermark, self.config.start_offset);
        let settle_delay = (settled_at - wall_now).to_std().unwrap_or(Duration::ZERO);

        let falling_behind = window.to < sub(wall_now, self.config.outdated_warning_offset);

        Trigger {
            window,
            delay: spacing_delay.max(settle_delay),
            falling_behind,
        }
    }

    /// Record that a cycle was started.
    pub(crate) fn mark_triggered(&mut self, at: Instant) {
        self.last_trigger = Some(at);
    }

    /// Advance the cached watermark after a committed cycle. Windows of
    /// consecutive commits are contiguous because the next `from` is exactly
    /// the committed `to`.
    pub(crate) fn advance(&mut self, to: Watermark) {
        self.watermark = to;
    }
}

fn add(ts: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(d)
        .ok()
        .and_then(|delta| ts.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn sub(ts: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(d)
        .ok()
        .and_then(|delta| ts.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SyncConfig {
        SyncConfig {
            start_offset: Duration::from_secs(120),
            stream_interval: Duration::from_millis(50),
            minimal_delay_between_streams: Duration::ZERO,
            outdated_warning_offset: Duration::from_secs(10 * 24 * 3600),
            ..SyncConfig::default()
        }
    }

    #[test]
    fn window_follows_watermark() {
        let watermark = Utc::now() - TimeDelta::seconds(121);
        let clock = TriggerClock::new(config(), watermark);

        let trigger = clock.next_trigger(Utc::now(), Instant::now());
        assert_eq!(trigger.window.from, watermark);
        assert_eq!(trigger.window.to, watermark + TimeDelta::milliseconds(50));
    }

    #[test]
    fn immediate_when_watermark_is_settled() {
        // watermark older than start_offset -> stream right away
        let watermark = Utc::now() - TimeDelta::seconds(121);
        let clock = TriggerClock::new(config(), watermark);

        let trigger = clock.next_trigger(Utc::now(), Instant::now());
        assert_eq!(trigger.delay, Duration::ZERO);
        assert!(!trigger.falling_behind);
    }

    #[test]
    fn waits_for_fresh_watermark_to_settle() {
        // watermark only 20s old, start_offset 120s -> wait ~100s
        let watermark = Utc::now() - TimeDelta::seconds(20);
        let clock = TriggerClock::new(config(), watermark);

        let trigger = clock.next_trigger(Utc::now(), Instant::now());
        assert!(trigger.delay > Duration::from_secs(95));
        assert!(trigger.delay <= Duration::from_secs(100));
    }

    #[test]
    fn spacing_lower_bounds_consecutive_triggers() {
        let watermark = Utc::now() - TimeDelta::seconds(121);
        let mut clock = TriggerClock::new(config(), watermark);
        let now = Instant::now();

        clock.mark_triggered(now);
        let trigger = clock.next_trigger(Utc::now(), now);
        assert_eq!(trigger.delay, Duration::from_millis(50));
    }

    #[test]
    fn minimal_delay_dominates_short_intervals() {
        let mut cfg = config();
        cfg.minimal_delay_between_streams = Duration::from_millis(80);
        let watermark = Utc::now() - TimeDelta::seconds(121);
        let mut clock = TriggerClock::new(cfg, watermark);
        let now = Instant::now();

        clock.mark_triggered(now);
        let trigger = clock.next_trigger(Utc::now(), now);
        assert_eq!(trigger.delay, Duration::from_millis(80));
    }

    #[test]
    fn flags_falling_behind() {
        let mut cfg = config();
        cfg.outdated_warning_offset = Duration::from_secs(60);
        let watermark = Utc::now() - TimeDelta::seconds(3600);
        let clock = TriggerClock::new(cfg, watermark);

        let trigger = clock.next_trigger(Utc::now(), Instant::now());
        assert!(trigger.falling_behind);
    }

    #[test]
    fn committed_windows_are_contiguous() {
        let watermark = Utc::now() - TimeDelta::seconds(121);
        let mut clock = TriggerClock::new(config(), watermark);

        let first = clock.next_trigger(Utc::now(), Instant::now());
        clock.advance(first.window.to);
        let second = clock.next_trigger(Utc::now(), Instant::now());
        assert_eq!(second.window.from, first.window.to);
    }
}
