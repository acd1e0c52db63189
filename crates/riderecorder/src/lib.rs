//! `riderecorder` - a headless recorder for GPS and environment data
//! during bicycle rides.
//!
//! The core of this library is the recording session engine: a sampling
//! scheduler polling the sensor ports, a single-owner session recorder
//! state machine fed through one event inbox, and a crash-tolerant
//! append-only session store with its own write worker. Everything the
//! engine touches at its edges goes through the port traits in
//! [`ports`], with hardware adapters in the `riderecorder-pi` crate and
//! deterministic fakes in [`testing`].

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod logging;
pub mod ports;
pub mod record;
pub mod recorder;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod testing;

pub use config::Config;
pub use engine::EnginePorts;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use ports::{
    Gesture, InputError, InputPort, LedPattern, OutputPort, SensorError, SensorPort,
};
pub use record::{
    EnvironmentSample, FixQuality, PositionFix, Quantity, RecordKind, SessionRecord, Waypoint,
};
pub use recorder::RecorderState;
pub use session::{Session, SessionId};
pub use store::{RecoveryReport, SessionStore, SessionSummary, StorageError};
