//! Service timestamps.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Timestamp units per second (100ns resolution).
pub const TICKS_PER_SECOND: u64 = 10_000_000;

const NANOS_PER_TICK: u64 = 1_000_000_000 / TICKS_PER_SECOND;

/// Highest timestamp handed out by [`Timestamp::now`] in this process.
static LAST_ISSUED: Mutex<u64> = parking_lot::const_mutex(0);

/// A point in time as the service counts it: 100ns ticks since the Unix epoch.
///
/// Timestamps are plain integers on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The Unix epoch.
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Create a timestamp from a raw tick count.
    pub const fn from_ticks(ticks: u64) -> Self {
        Timestamp(ticks)
    }

    /// Create a timestamp from whole seconds since the Unix epoch.
    pub const fn from_unix_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(TICKS_PER_SECOND))
    }

    /// Create a timestamp from an offset since the Unix epoch.
    ///
    /// Sub-tick precision is truncated.
    pub fn from_duration(since_epoch: Duration) -> Self {
        let ticks = since_epoch
            .as_secs()
            .saturating_mul(TICKS_PER_SECOND)
            .saturating_add(u64::from(since_epoch.subsec_nanos()) / NANOS_PER_TICK);
        Timestamp(ticks)
    }

    /// Create a timestamp from a system time. Times before the epoch clamp to it.
    pub fn from_system_time(time: SystemTime) -> Self {
        time.duration_since(UNIX_EPOCH)
            .map(Self::from_duration)
            .unwrap_or(Self::EPOCH)
    }

    /// The current time.
    ///
    /// Never goes backwards within a process, even if the system clock does.
    pub fn now() -> Self {
        let observed = Self::from_system_time(SystemTime::now()).0;
        let mut last = LAST_ISSUED.lock();
        *last = (*last).max(observed);
        Timestamp(*last)
    }

    /// Raw tick count.
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Offset since the Unix epoch.
    pub fn as_duration(self) -> Duration {
        Duration::new(
            self.0 / TICKS_PER_SECOND,
            ((self.0 % TICKS_PER_SECOND) * NANOS_PER_TICK) as u32,
        )
    }

    pub fn to_system_time(self) -> SystemTime {
        UNIX_EPOCH + self.as_duration()
    }

    /// This timestamp moved forward by `delta`, saturating.
    pub fn saturating_add(self, delta: Duration) -> Self {
        Timestamp(self.0.saturating_add(Self::from_duration(delta).0))
    }

    /// This timestamp moved back by `delta`, clamped at the epoch.
    pub fn saturating_sub(self, delta: Duration) -> Self {
        Timestamp(self.0.saturating_sub(Self::from_duration(delta).0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        Timestamp::from_system_time(time)
    }
}
