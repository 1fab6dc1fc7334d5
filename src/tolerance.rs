/**
 * Tolerance policy for comparing library dates against capture dates
 */

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;

/// Largest difference between two dates that still counts as "the same date".
///
/// Stored with millisecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Tolerance {
    millis: i64,
}

impl Tolerance {
    pub const ZERO: Tolerance = Tolerance { millis: 0 };

    pub fn from_secs(secs: u32) -> Self {
        Self {
            millis: i64::from(secs) * 1000,
        }
    }

    pub fn from_secs_f64(secs: f64) -> Result<Self, ConfigError> {
        if !secs.is_finite() {
            return Err(ConfigError::NonFiniteTolerance);
        }
        if secs < 0.0 {
            return Err(ConfigError::NegativeTolerance(secs));
        }
        // Anything beyond ~292 million years is as good as infinite
        let millis = (secs * 1000.0).round().min(i64::MAX as f64) as i64;
        Ok(Self { millis })
    }

    pub fn as_duration(&self) -> Duration {
        Duration::milliseconds(self.millis)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.millis as f64 / 1000.0
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::from_secs(2)
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.as_secs_f64())
    }
}

impl TryFrom<f64> for Tolerance {
    type Error = ConfigError;

    fn try_from(secs: f64) -> Result<Self, Self::Error> {
        Self::from_secs_f64(secs)
    }
}

impl From<Tolerance> for f64 {
    fn from(tolerance: Tolerance) -> f64 {
        tolerance.as_secs_f64()
    }
}

/// True iff `a` and `b` are strictly more than `tolerance` apart.
///
/// Symmetric in `a` and `b`; a difference of exactly `tolerance` is not a mismatch.
pub fn is_mismatch(a: DateTime<Utc>, b: DateTime<Utc>, tolerance: Tolerance) -> bool {
    let difference = if a >= b { a - b } else { b - a };
    difference > tolerance.as_duration()
}
