//! Port abstractions between the engine and the outside world.
//!
//! Sensors, the joystick and the LED matrix are each hidden behind a
//! small trait with one hardware implementation (in `riderecorder-pi`)
//! and one deterministic fake (in [`crate::testing`]).

pub mod input;
pub mod output;
pub mod sensor;

pub use input::{Debouncer, Gesture, InputError, InputPort};
pub use output::{LedPattern, OutputPort};
pub use sensor::{EnvReading, GpsReading, SensorError, SensorPort, SensorReading};
