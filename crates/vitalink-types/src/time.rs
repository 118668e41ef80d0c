//! Explicit wall-clock representation used on every topic.
//!
//! Time values are always a `(sec, nanosec)` pair relative to the Unix epoch,
//! never an opaque scalar, so that implementations in any language encode
//! identically.

use chrono::{DateTime, TimeZone, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::VitaError;

/// Seconds-plus-nanoseconds wall-clock value relative to the Unix epoch.
///
/// Invariant: `nanosec < 1_000_000_000`.  Field order gives the derived
/// ordering the natural chronological meaning.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct WallClock {
    /// Whole seconds since the epoch (may be negative for pre-epoch values).
    pub sec: i64,
    /// Nanosecond remainder, `0..1_000_000_000`.
    pub nanosec: u32,
}

impl WallClock {
    pub const NANOS_PER_SEC: u32 = 1_000_000_000;

    /// Build a value, enforcing the nanosecond-range invariant.
    ///
    /// # Errors
    ///
    /// [`VitaError::InvalidRecord`] when `nanosec >= 1_000_000_000`.
    pub fn new(sec: i64, nanosec: u32) -> Result<Self, VitaError> {
        if nanosec >= Self::NANOS_PER_SEC {
            return Err(VitaError::InvalidRecord {
                reason: format!("nanosec {nanosec} out of range"),
            });
        }
        Ok(Self { sec, nanosec })
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Convert from a `chrono` timestamp.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            sec: dt.timestamp(),
            nanosec: dt.timestamp_subsec_nanos() % Self::NANOS_PER_SEC,
        }
    }

    /// Convert back to a `chrono` timestamp.  `None` when out of chrono's
    /// representable range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.sec, self.nanosec).single()
    }

    /// Signed difference `self - earlier` in nanoseconds.
    ///
    /// Wide enough (`i128`) that no representable pair of values overflows.
    pub fn delta_nanos(self, earlier: Self) -> i128 {
        let a = self.sec as i128 * Self::NANOS_PER_SEC as i128 + self.nanosec as i128;
        let b = earlier.sec as i128 * Self::NANOS_PER_SEC as i128 + earlier.nanosec as i128;
        a - b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_nanosec() {
        assert!(WallClock::new(0, WallClock::NANOS_PER_SEC).is_err());
        assert!(WallClock::new(0, WallClock::NANOS_PER_SEC - 1).is_ok());
    }

    #[test]
    fn ordering_is_chronological() {
        let a = WallClock::new(5, 999_999_999).unwrap();
        let b = WallClock::new(6, 0).unwrap();
        assert!(a < b);
    }

    #[test]
    fn datetime_roundtrip() {
        let now = WallClock::now();
        let dt = now.to_datetime().unwrap();
        assert_eq!(WallClock::from_datetime(dt), now);
    }

    #[test]
    fn delta_spans_the_nanosecond_boundary() {
        let a = WallClock::new(2, 100).unwrap();
        let b = WallClock::new(1, 999_999_999).unwrap();
        assert_eq!(a.delta_nanos(b), 101);
        assert_eq!(b.delta_nanos(a), -101);
    }

    #[test]
    fn serde_roundtrip_keeps_both_fields() {
        let t = WallClock::new(1_700_000_000, 123_456_789).unwrap();
        let json = serde_json::to_string(&t).unwrap();
        assert!(json.contains("\"sec\""));
        assert!(json.contains("\"nanosec\""));
        let back: WallClock = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }
}
