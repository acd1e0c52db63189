//! Raspberry Pi / Sense HAT hardware adapters for riderecorder.
//!
//! Implements the core port traits against the real devices: gpsd over
//! TCP for position, the Sense HAT's sysfs IIO channels for the
//! environment, its evdev joystick for input and its framebuffer for the
//! LED matrix.

#![cfg(target_os = "linux")]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod gpsd;
pub mod joystick;
pub mod ledmatrix;
pub mod sensehat;

pub use gpsd::GpsdPort;
pub use joystick::SenseHatJoystick;
pub use ledmatrix::SenseHatMatrix;
pub use sensehat::SenseHatEnvironment;

use riderecorder::{Config, EnginePorts, Result};

/// Human-readable platform name.
#[must_use]
pub fn platform_name() -> &'static str {
    "Raspberry Pi / Sense HAT"
}

/// Build the full set of hardware ports from configuration.
///
/// The joystick and LED matrix must be present at startup (without them
/// the recorder can neither be controlled nor observed); the GPS and
/// environment ports connect lazily and degrade instead of failing.
///
/// # Errors
///
/// Returns an error if the joystick or framebuffer device cannot be
/// found or opened.
pub fn engine_ports(config: &Config) -> Result<EnginePorts> {
    let gps = GpsdPort::new(&config.gps.gpsd_host, config.gps.gpsd_port);
    let environment = SenseHatEnvironment::new(config.environment.iio_dir.clone());
    let input = SenseHatJoystick::open(
        config.input.device.clone(),
        config.debounce(),
        config.long_press(),
    )?;
    let led = SenseHatMatrix::open(config.led.framebuffer.clone())?;

    Ok(EnginePorts {
        gps: Box::new(gps),
        environment: Box::new(environment),
        input: Box::new(input),
        led: Box::new(led),
    })
}
