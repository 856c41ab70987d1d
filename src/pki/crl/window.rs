//! Stable time-window sharding.
//!
//! Picture the timeline cut into chunks of equal width, numbered
//! `0..num_shards` and repeating forever:
//!
//! ```text
//!    chunk:  4     0     1     2     3     4     0     1     2     3
//! ...-----|-----|-----|-----|-----|-----|-----|-----|-----|-----|-----...
//!                         ^  ^-at                             ^
//!                at-lookback                       at+lookforward
//! ```
//!
//! Chunk boundaries are anchored to [`shard_epoch`], not to `at`, so they do
//! not move as time advances. The window `[at-lookback, at+lookforward)`
//! usually touches two instances of the chunk at its edges; the earliest
//! instance with any overlap is the one selected. `lookforward` therefore has
//! to leave at least one chunk width of headroom beyond the furthest
//! certificate expiry.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

use super::errors::ConfigError;
use super::types::ShardWindow;

/// Seconds from 0001-01-01T00:00:00Z to the Unix epoch.
const SHARD_EPOCH_UNIX_SECS: i128 = -62_135_596_800;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Zero point every chunk boundary is measured from.
pub fn shard_epoch() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Maps a reference time and shard ID to that shard's expiry window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardWindows {
    num_shards: u64,
    lookback: TimeDelta,
    width: i64,
    shard_width: i64,
}

impl ShardWindows {
    pub fn new(num_shards: u64, lookback: Duration, lookforward: Duration) -> Result<Self, ConfigError> {
        if num_shards < 1 {
            return Err(ConfigError::NoShards(num_shards));
        }

        let window = lookback
            .checked_add(lookforward)
            .ok_or(ConfigError::WindowTooLarge(Duration::MAX))?;
        let window_nanos = window.as_nanos();
        if window_nanos == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        let width = i64::try_from(window_nanos).map_err(|_| ConfigError::WindowTooLarge(window))?;
        if window_nanos % u128::from(num_shards) != 0 {
            return Err(ConfigError::WindowNotDivisible {
                window_nanos,
                num_shards,
            });
        }
        // lookback <= window, so it fits as well.
        let lookback = TimeDelta::nanoseconds(lookback.as_nanos() as i64);
        // Divisible, so num_shards <= width and the cast is lossless.
        let shard_width = width / num_shards as i64;

        Ok(Self {
            num_shards,
            lookback,
            width,
            shard_width,
        })
    }

    pub fn num_shards(&self) -> u64 {
        self.num_shards
    }

    pub fn shard_width(&self) -> TimeDelta {
        TimeDelta::nanoseconds(self.shard_width)
    }

    /// Total width, `lookback + lookforward`.
    pub fn width(&self) -> TimeDelta {
        TimeDelta::nanoseconds(self.width)
    }

    /// The observation window `[at-lookback, at+lookforward)`.
    pub fn observed(&self, at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = at - self.lookback;
        (start, start + self.width())
    }

    /// Boundaries of the earliest chunk numbered `shard_id` that overlaps the
    /// observation window at `at`. IDs wrap modulo the shard count.
    pub fn window_for(&self, at: DateTime<Utc>, shard_id: u64) -> ShardWindow {
        let shard_id = shard_id % self.num_shards;

        // Cycles are anchored on the left edge of the window, so every chunk
        // of the cycle starts before the right edge.
        let (left_edge, _) = self.observed(at);
        let offset = nanos_since_epoch(left_edge).rem_euclid(i128::from(self.width));
        // offset < width <= i64::MAX
        let zero_start = left_edge - TimeDelta::nanoseconds(offset as i64);

        let mut start = zero_start + TimeDelta::nanoseconds(shard_id as i64 * self.shard_width);
        let mut end = start + self.shard_width();

        // A chunk entirely behind the left edge moves to its next instance,
        // which overlaps because zero_start > left_edge - width.
        if end <= left_edge {
            start += self.width();
            end += self.width();
        }

        ShardWindow { start, end }
    }
}

fn nanos_since_epoch(at: DateTime<Utc>) -> i128 {
    (i128::from(at.timestamp()) - SHARD_EPOCH_UNIX_SECS) * NANOS_PER_SEC
        + i128::from(at.timestamp_subsec_nanos())
}
