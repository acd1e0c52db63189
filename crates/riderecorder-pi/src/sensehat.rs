//! Sense HAT environment sensors via sysfs industrial I/O.
//!
//! The HAT exposes its HTS221 (temperature, humidity), LPS25H (pressure)
//! and LSM9DS1 (accelerometer) through `/sys/bus/iio/devices`. Every
//! channel is a plain text file holding a raw value plus optional offset
//! and scale, so the adapter is nothing but careful file reads; each
//! channel is independently optional per cycle.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use riderecorder::ports::{EnvReading, SensorError, SensorPort, SensorReading};

/// Default sysfs IIO root.
const DEFAULT_IIO_DIR: &str = "/sys/bus/iio/devices";

/// Discovered sensor device directories.
#[derive(Debug, Clone, Default)]
struct SensorDevices {
    /// HTS221: temperature and relative humidity.
    hts221: Option<PathBuf>,
    /// LPS25H: barometric pressure.
    lps25h: Option<PathBuf>,
    /// LSM9DS1 accelerometer: pitch and roll.
    accel: Option<PathBuf>,
}

/// The Sense HAT environment package.
#[derive(Debug)]
pub struct SenseHatEnvironment {
    iio_dir: PathBuf,
    devices: Option<SensorDevices>,
}

impl SenseHatEnvironment {
    /// Create a port scanning the given IIO directory (or the default).
    ///
    /// Device discovery happens lazily on the first sample.
    #[must_use]
    pub fn new(iio_dir: Option<PathBuf>) -> Self {
        Self {
            iio_dir: iio_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_IIO_DIR)),
            devices: None,
        }
    }

    fn devices(&mut self) -> Result<SensorDevices, SensorError> {
        if self.devices.is_none() {
            self.devices = Some(scan_devices(&self.iio_dir)?);
        }
        match &self.devices {
            Some(devices) => Ok(devices.clone()),
            None => Err(SensorError::Disconnected(
                "no environment sensors".to_string(),
            )),
        }
    }
}

#[async_trait]
impl SensorPort for SenseHatEnvironment {
    fn name(&self) -> &'static str {
        "environment"
    }

    async fn sample(&mut self) -> Result<SensorReading, SensorError> {
        let devices = self.devices()?;
        let mut reading = EnvReading::default();

        if let Some(dev) = &devices.hts221 {
            // HTS221 reports millidegrees and millipercent.
            reading.temperature = read_scaled(dev, "temp").map(|v| v / 1000.0);
            reading.humidity = read_scaled(dev, "humidityrelative").map(|v| v / 1000.0);
        }
        if let Some(dev) = &devices.lps25h {
            // LPS25H reports kilopascal; records carry hectopascal.
            reading.pressure = read_scaled(dev, "pressure").map(|v| v * 10.0);
        }
        if let Some(dev) = &devices.accel {
            if let Some((pitch, roll)) = read_orientation(dev) {
                reading.pitch = Some(pitch);
                reading.roll = Some(roll);
            }
        }

        if reading.is_empty() {
            // All channels failed this cycle; let the scheduler count it.
            return Err(SensorError::Disconnected(
                "all environment channels failed".to_string(),
            ));
        }
        Ok(SensorReading::Environment(reading))
    }
}

/// Scan the IIO directory for the Sense HAT sensor devices.
fn scan_devices(iio_dir: &Path) -> Result<SensorDevices, SensorError> {
    let entries = fs::read_dir(iio_dir)
        .map_err(|err| SensorError::Disconnected(format!("{}: {err}", iio_dir.display())))?;

    let mut devices = SensorDevices::default();
    for entry in entries.flatten() {
        let Ok(name) = fs::read_to_string(entry.path().join("name")) else {
            continue;
        };
        match name.trim() {
            "hts221" => devices.hts221 = Some(entry.path()),
            "lps25h" => devices.lps25h = Some(entry.path()),
            name if name.contains("accel") => devices.accel = Some(entry.path()),
            _ => {}
        }
    }

    if devices.hts221.is_none() && devices.lps25h.is_none() && devices.accel.is_none() {
        return Err(SensorError::Disconnected(format!(
            "no Sense HAT sensors under {}",
            iio_dir.display()
        )));
    }
    debug!("environment sensors: {devices:?}");
    Ok(devices)
}

/// Read one IIO channel: `(raw + offset) * scale`.
fn read_scaled(dev: &Path, channel: &str) -> Option<f64> {
    let raw = read_number(&dev.join(format!("in_{channel}_raw")))?;
    let offset = read_number(&dev.join(format!("in_{channel}_offset"))).unwrap_or(0.0);
    let scale = read_number(&dev.join(format!("in_{channel}_scale"))).unwrap_or(1.0);
    Some((raw + offset) * scale)
}

/// Pitch and roll in degrees, derived from the accelerometer axes.
fn read_orientation(dev: &Path) -> Option<(f64, f64)> {
    let scale = read_number(&dev.join("in_accel_scale")).unwrap_or(1.0);
    let x = read_number(&dev.join("in_accel_x_raw"))? * scale;
    let y = read_number(&dev.join("in_accel_y_raw"))? * scale;
    let z = read_number(&dev.join("in_accel_z_raw"))? * scale;

    let pitch = (-x).atan2((y * y + z * z).sqrt()).to_degrees();
    let roll = y.atan2(z).to_degrees();
    Some((pitch, roll))
}

fn read_number(path: &Path) -> Option<f64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}
