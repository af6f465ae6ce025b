use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

const NANOSECONDS_PER_SECOND: u32 = 1_000_000_000;

/// A point in time with nanosecond resolution.
///
/// Ordering: `seconds` → `nanoseconds`. Null timestamps are represented
/// by [`Value::Null`](crate::Value::Null), never by a sentinel here.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    /// Seconds since the UNIX epoch. May be negative.
    pub seconds: i64,
    /// Sub-second component, always below one second.
    pub nanoseconds: u32,
}

impl Timestamp {
    /// Create a timestamp, rejecting out-of-range nanoseconds.
    pub fn new(seconds: i64, nanoseconds: u32) -> Result<Self, TypeError> {
        if nanoseconds >= NANOSECONDS_PER_SECOND {
            return Err(TypeError::InvalidNanoseconds(nanoseconds));
        }
        Ok(Self {
            seconds,
            nanoseconds,
        })
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            seconds: elapsed.as_secs() as i64,
            nanoseconds: elapsed.subsec_nanos(),
        }
    }

    /// The UNIX epoch.
    pub const fn epoch() -> Self {
        Self {
            seconds: 0,
            nanoseconds: 0,
        }
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::epoch()
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}, {})", self.seconds, self.nanoseconds)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.seconds, self.nanoseconds)
    }
}
