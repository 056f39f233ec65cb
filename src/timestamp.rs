use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

const MILLIS_PER_SEC: i64 = 1_000;
const SECS_PER_MIN: i64 = 60;

/// An absolute point in time with millisecond precision, counted from
/// the Unix epoch. Always UTC; converting into a local zone is the
/// caller's business.
///
/// This is the resolution the wire format carries: the 64-bit date
/// form stores milliseconds and the 32-bit form whole minutes.
/// Serializes through serde as a bare `i64` of milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Construct from milliseconds since the Unix epoch.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Construct from whole seconds since the Unix epoch.
    pub fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(MILLIS_PER_SEC))
    }

    /// Construct from whole minutes since the Unix epoch.
    pub fn from_mins(mins: i64) -> Self {
        Self::from_secs(mins.saturating_mul(SECS_PER_MIN))
    }

    /// The current time. Times before the epoch saturate to zero.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Milliseconds since the Unix epoch.
    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// Whole seconds since the Unix epoch, truncated toward zero.
    pub fn as_secs(self) -> i64 {
        self.0 / MILLIS_PER_SEC
    }
}

impl From<i64> for Timestamp {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn constructors_agree() {
        assert_eq!(Timestamp::from_secs(2), Timestamp::from_millis(2_000));
        assert_eq!(Timestamp::from_mins(3), Timestamp::from_secs(180));
        assert_eq!(Timestamp::from_millis(-1).as_millis(), -1);
        assert_eq!(Timestamp::from_millis(1_999).as_secs(), 1);
    }

    #[test]
    fn serde_as_millis() {
        let t = Timestamp::from_millis(1_612_351_353_000);
        let json = serde_json::to_string(&t).unwrap();
        assert_eq!(json, "1612351353000");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
