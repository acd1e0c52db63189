//! The sensor port abstraction.
//!
//! A [`SensorPort`] hides one physical sensor source — the GPS receiver or
//! the environment/orientation package — behind a uniform "sample now"
//! contract. Implementations talk to real hardware; deterministic fakes
//! live in [`crate::testing`].

use async_trait::async_trait;
use thiserror::Error;

use crate::record::FixQuality;

/// Errors a sensor port can produce for a single sampling cycle.
///
/// Sensor errors are recovered locally by the sampling scheduler and are
/// never fatal: the failing port keeps being polled at its cadence.
#[derive(Debug, Error)]
pub enum SensorError {
    /// The read did not complete within the configured poll timeout.
    #[error("sensor read timed out")]
    Timeout,

    /// The sensor produced data that could not be interpreted.
    #[error("malformed reading: {0}")]
    Malformed(String),

    /// The sensor or its transport went away.
    #[error("sensor disconnected: {0}")]
    Disconnected(String),
}

/// A raw GPS receiver reading, prior to normalization.
///
/// All position and motion fields are optional: a receiver without a fix
/// may report none of them.
#[derive(Debug, Clone, PartialEq)]
pub struct GpsReading {
    /// Latitude in decimal degrees.
    pub latitude: Option<f64>,
    /// Longitude in decimal degrees.
    pub longitude: Option<f64>,
    /// Altitude above mean sea level, in meters.
    pub altitude: Option<f64>,
    /// Ground speed in meters per second.
    pub speed: Option<f64>,
    /// Course over ground in degrees.
    pub track: Option<f64>,
    /// Climb rate in meters per second.
    pub climb: Option<f64>,
    /// Fix quality reported by the receiver.
    pub quality: FixQuality,
    /// Number of satellites in use.
    pub satellites: u32,
}

impl Default for GpsReading {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            altitude: None,
            speed: None,
            track: None,
            climb: None,
            quality: FixQuality::NoFix,
            satellites: 0,
        }
    }
}

/// A raw environment/orientation reading, prior to normalization.
///
/// Every channel is independently optional; a sensor that failed this
/// cycle simply leaves its channel empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvReading {
    /// Ambient temperature in degrees Celsius.
    pub temperature: Option<f64>,
    /// Barometric pressure in hectopascal.
    pub pressure: Option<f64>,
    /// Relative humidity in percent.
    pub humidity: Option<f64>,
    /// Pitch angle in degrees.
    pub pitch: Option<f64>,
    /// Roll angle in degrees.
    pub roll: Option<f64>,
}

impl EnvReading {
    /// Whether no channel produced a value this cycle.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.pressure.is_none()
            && self.humidity.is_none()
            && self.pitch.is_none()
            && self.roll.is_none()
    }
}

/// A raw reading from either sensor source.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorReading {
    /// A GPS receiver reading.
    Gps(GpsReading),
    /// An environment package reading.
    Environment(EnvReading),
}

/// A single physical sensor source.
///
/// The scheduler wraps every [`sample`](Self::sample) call in a bounded
/// timeout, so implementations may block on their transport; they must
/// not assume they will be polled to completion.
#[async_trait]
pub trait SensorPort: Send {
    /// The name of this port (for logging and degradation signals).
    fn name(&self) -> &'static str;

    /// Take one reading from the sensor.
    ///
    /// # Errors
    ///
    /// Returns a [`SensorError`] when the reading cannot be produced this
    /// cycle; the scheduler treats this as a per-cycle failure and keeps
    /// polling.
    async fn sample(&mut self) -> Result<SensorReading, SensorError>;
}
