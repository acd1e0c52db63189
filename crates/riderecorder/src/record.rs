//! Core record types for riderecorder.
//!
//! This module defines the fundamental data structures for representing
//! normalized sensor output and rider-marked points during a ride.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quality of a GPS position estimate.
///
/// Maps directly onto the gpsd fix mode: modes 0 and 1 carry no fix,
/// mode 2 is a 2D fix, mode 3 a 3D fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixQuality {
    /// The receiver has no usable fix.
    NoFix,
    /// Two-dimensional fix (no trustworthy altitude).
    TwoD,
    /// Full three-dimensional fix.
    ThreeD,
}

impl FixQuality {
    /// Convert a gpsd TPV `mode` value into a fix quality.
    #[must_use]
    pub fn from_gpsd_mode(mode: u8) -> Self {
        match mode {
            2 => Self::TwoD,
            3 => Self::ThreeD,
            _ => Self::NoFix,
        }
    }

    /// Whether this fix carries a usable position.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::NoFix)
    }
}

impl std::fmt::Display for FixQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoFix => write!(f, "no_fix"),
            Self::TwoD => write!(f, "2d"),
            Self::ThreeD => write!(f, "3d"),
        }
    }
}

/// A normalized GPS position sample.
///
/// Produced by the sampling scheduler from raw receiver output. Readings
/// without a fix are still represented (with [`FixQuality::NoFix`]) so
/// that consumers can distinguish "no signal" from "no data".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    /// When this fix was normalized.
    pub timestamp: DateTime<Utc>,

    /// Latitude in decimal degrees.
    pub latitude: f64,

    /// Longitude in decimal degrees.
    pub longitude: f64,

    /// Altitude above mean sea level, in meters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,

    /// Ground speed in meters per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,

    /// Course over ground in degrees from true north.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<f64>,

    /// Climb rate in meters per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub climb: Option<f64>,

    /// Quality of this fix.
    pub quality: FixQuality,

    /// Number of satellites used by the receiver.
    pub satellites: u32,

    /// Per-source sequence number assigned at normalization.
    pub sequence: u64,
}

/// A named physical quantity reported by the environment package.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    /// Ambient temperature in degrees Celsius.
    Temperature,
    /// Barometric pressure in hectopascal.
    Pressure,
    /// Relative humidity in percent.
    Humidity,
    /// Pitch angle in degrees.
    Pitch,
    /// Roll angle in degrees.
    Roll,
}

impl Quantity {
    /// Unit suffix for display purposes.
    #[must_use]
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Pressure => "hPa",
            Self::Humidity => "%",
            Self::Pitch | Self::Roll => "°",
        }
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Temperature => write!(f, "temperature"),
            Self::Pressure => write!(f, "pressure"),
            Self::Humidity => write!(f, "humidity"),
            Self::Pitch => write!(f, "pitch"),
            Self::Roll => write!(f, "roll"),
        }
    }
}

/// A normalized sample of the ambient environment.
///
/// Each quantity is optional per cycle; a sample with no populated
/// quantities is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSample {
    /// When this sample was normalized.
    pub timestamp: DateTime<Utc>,

    /// Populated quantities and their values.
    pub values: BTreeMap<Quantity, f64>,
}

impl EnvironmentSample {
    /// Create a sample from the given values.
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, values: BTreeMap<Quantity, f64>) -> Self {
        Self { timestamp, values }
    }

    /// Whether the sample carries no quantities at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A rider-marked point of interest.
///
/// Carries the most recent known fix at the time of marking, which may be
/// stale if the receiver just lost its signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// When the mark gesture was made.
    pub timestamp: DateTime<Utc>,

    /// The most recent known position fix.
    pub fix: PositionFix,

    /// Optional label for the waypoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// The kind tag of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A position fix.
    Fix,
    /// An environment sample.
    Environment,
    /// A rider-marked waypoint.
    Waypoint,
}

impl RecordKind {
    /// Source priority used to order records with equal timestamps.
    ///
    /// Lower sorts first: fixes before environment samples before waypoints.
    #[must_use]
    pub fn priority(&self) -> u8 {
        match self {
            Self::Fix => 0,
            Self::Environment => 1,
            Self::Waypoint => 2,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fix => write!(f, "fix"),
            Self::Environment => write!(f, "environment"),
            Self::Waypoint => write!(f, "waypoint"),
        }
    }
}

/// The persisted union of everything a session can contain.
///
/// This is the only entity written to durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionRecord {
    /// A position fix.
    Fix(PositionFix),
    /// An environment sample.
    Environment(EnvironmentSample),
    /// A rider-marked waypoint.
    Waypoint(Waypoint),
}

impl SessionRecord {
    /// The kind tag of this record.
    #[must_use]
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Fix(_) => RecordKind::Fix,
            Self::Environment(_) => RecordKind::Environment,
            Self::Waypoint(_) => RecordKind::Waypoint,
        }
    }

    /// The normalization timestamp of this record.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Fix(fix) => fix.timestamp,
            Self::Environment(sample) => sample.timestamp,
            Self::Waypoint(waypoint) => waypoint.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(quality: FixQuality) -> PositionFix {
        PositionFix {
            timestamp: Utc::now(),
            latitude: 51.2,
            longitude: 6.8,
            altitude: Some(42.0),
            speed: Some(5.5),
            track: Some(182.0),
            climb: Some(-0.2),
            quality,
            satellites: 9,
            sequence: 7,
        }
    }

    #[test]
    fn test_fix_quality_from_gpsd_mode() {
        assert_eq!(FixQuality::from_gpsd_mode(0), FixQuality::NoFix);
        assert_eq!(FixQuality::from_gpsd_mode(1), FixQuality::NoFix);
        assert_eq!(FixQuality::from_gpsd_mode(2), FixQuality::TwoD);
        assert_eq!(FixQuality::from_gpsd_mode(3), FixQuality::ThreeD);
        assert_eq!(FixQuality::from_gpsd_mode(42), FixQuality::NoFix);
    }

    #[test]
    fn test_fix_quality_usable() {
        assert!(!FixQuality::NoFix.is_usable());
        assert!(FixQuality::TwoD.is_usable());
        assert!(FixQuality::ThreeD.is_usable());
    }

    #[test]
    fn test_fix_quality_display() {
        assert_eq!(FixQuality::NoFix.to_string(), "no_fix");
        assert_eq!(FixQuality::TwoD.to_string(), "2d");
        assert_eq!(FixQuality::ThreeD.to_string(), "3d");
    }

    #[test]
    fn test_quantity_units() {
        assert_eq!(Quantity::Temperature.unit(), "°C");
        assert_eq!(Quantity::Pressure.unit(), "hPa");
        assert_eq!(Quantity::Humidity.unit(), "%");
        assert_eq!(Quantity::Pitch.unit(), "°");
    }

    #[test]
    fn test_environment_sample_is_empty() {
        let empty = EnvironmentSample::new(Utc::now(), BTreeMap::new());
        assert!(empty.is_empty());

        let mut values = BTreeMap::new();
        values.insert(Quantity::Temperature, 21.5);
        let sample = EnvironmentSample::new(Utc::now(), values);
        assert!(!sample.is_empty());
    }

    #[test]
    fn test_record_kind_priority_order() {
        assert!(RecordKind::Fix.priority() < RecordKind::Environment.priority());
        assert!(RecordKind::Environment.priority() < RecordKind::Waypoint.priority());
    }

    #[test]
    fn test_record_kind_display() {
        assert_eq!(RecordKind::Fix.to_string(), "fix");
        assert_eq!(RecordKind::Environment.to_string(), "environment");
        assert_eq!(RecordKind::Waypoint.to_string(), "waypoint");
    }

    #[test]
    fn test_session_record_kind_and_timestamp() {
        let f = fix(FixQuality::ThreeD);
        let ts = f.timestamp;
        let record = SessionRecord::Fix(f);
        assert_eq!(record.kind(), RecordKind::Fix);
        assert_eq!(record.timestamp(), ts);
    }

    #[test]
    fn test_session_record_serialization_tags_kind() {
        let record = SessionRecord::Fix(fix(FixQuality::TwoD));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""kind":"fix""#));

        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_waypoint_serialization_roundtrip() {
        let waypoint = Waypoint {
            timestamp: Utc::now(),
            fix: fix(FixQuality::ThreeD),
            label: Some("summit".to_string()),
        };
        let record = SessionRecord::Waypoint(waypoint);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""kind":"waypoint""#));
        assert!(json.contains("summit"));

        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_no_fix_record_survives_serialization() {
        let mut no_fix = fix(FixQuality::NoFix);
        no_fix.latitude = 0.0;
        no_fix.longitude = 0.0;
        no_fix.altitude = None;

        let record = SessionRecord::Fix(no_fix);
        let json = serde_json::to_string(&record).unwrap();
        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_environment_record_serialization() {
        let mut values = BTreeMap::new();
        values.insert(Quantity::Temperature, 18.25);
        values.insert(Quantity::Pressure, 1013.1);
        let record = SessionRecord::Environment(EnvironmentSample::new(Utc::now(), values));

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""kind":"environment""#));
        assert!(json.contains("temperature"));

        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }
}
