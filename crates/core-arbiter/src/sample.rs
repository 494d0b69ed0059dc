//! Proximity samples and the covered/uncovered discriminator
//!
//! The sensor port reports a raw distance together with the sensor's maximum
//! range. Arbitration only looks at the ratio of the two: a reading near the
//! maximum range means nothing is close, a reading near zero means something
//! is covering the sensor (pocket, case, hand).

use serde::{Deserialize, Serialize};

/// Ratio at or above which the sensor is considered uncovered
pub const UNCOVERED_RATIO_THRESHOLD: f32 = 0.10;

/// Raw reading as delivered by a proximity sensor port
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Reported distance, in the sensor's own unit (usually centimetres)
    pub distance: f32,

    /// Maximum range the sensor can report, same unit as `distance`
    pub max_range: f32,
}

impl SensorReading {
    pub fn new(distance: f32, max_range: f32) -> Self {
        Self {
            distance,
            max_range,
        }
    }
}

/// A normalized proximity sample: `distance / max_range`, clamped to `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximitySample {
    distance_ratio: f32,
}

impl ProximitySample {
    /// Normalize a raw reading.
    ///
    /// Readings that cannot produce a meaningful ratio (non-finite values or a
    /// maximum range that is not positive) normalize to `1.0`, which reads as
    /// uncovered. Absent information must never suppress a wake.
    pub fn from_reading(reading: SensorReading) -> Self {
        let SensorReading {
            distance,
            max_range,
        } = reading;

        if !distance.is_finite() || !max_range.is_finite() || max_range <= 0.0 {
            return Self {
                distance_ratio: 1.0,
            };
        }

        Self {
            distance_ratio: (distance / max_range).clamp(0.0, 1.0),
        }
    }

    /// Distance divided by maximum range, in `[0, 1]`
    pub fn distance_ratio(&self) -> f32 {
        self.distance_ratio
    }

    /// True when nothing is close enough to count as covering the sensor
    pub fn is_uncovered(&self, threshold: f32) -> bool {
        self.distance_ratio >= threshold
    }
}

impl From<SensorReading> for ProximitySample {
    fn from(reading: SensorReading) -> Self {
        Self::from_reading(reading)
    }
}
