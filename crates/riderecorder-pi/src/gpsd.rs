//! GPS receiver port backed by gpsd.
//!
//! Speaks the gpsd JSON protocol over TCP: a `?WATCH` command switches
//! the daemon into streaming mode, after which every line is a JSON
//! object tagged with a `class`. `TPV` carries position and motion,
//! `SKY` the satellite constellation. The connection is (re)established
//! lazily, so a missing daemon degrades the port instead of failing the
//! engine.

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

use riderecorder::ports::{GpsReading, SensorError, SensorPort, SensorReading};
use riderecorder::FixQuality;

/// Switches gpsd into JSON streaming mode.
const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

/// The GPS receiver behind a gpsd instance.
#[derive(Debug)]
pub struct GpsdPort {
    addr: String,
    reader: Option<BufReader<TcpStream>>,
    satellites: u32,
}

impl GpsdPort {
    /// Create a port for the gpsd instance at `host:port`.
    ///
    /// No connection is made until the first sample.
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            reader: None,
            satellites: 0,
        }
    }

    async fn open_reader(&self) -> Result<BufReader<TcpStream>, SensorError> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|err| SensorError::Disconnected(err.to_string()))?;
        stream
            .write_all(WATCH_COMMAND)
            .await
            .map_err(|err| SensorError::Disconnected(err.to_string()))?;
        debug!("watching gpsd at {}", self.addr);
        Ok(BufReader::new(stream))
    }
}

#[async_trait]
impl SensorPort for GpsdPort {
    fn name(&self) -> &'static str {
        "gps"
    }

    async fn sample(&mut self) -> Result<SensorReading, SensorError> {
        let mut reader = match self.reader.take() {
            Some(reader) => reader,
            None => self.open_reader().await?,
        };

        let mut line = String::new();
        loop {
            line.clear();
            let read = match reader.read_line(&mut line).await {
                Ok(read) => read,
                Err(err) => return Err(SensorError::Disconnected(err.to_string())),
            };
            if read == 0 {
                return Err(SensorError::Disconnected(
                    "gpsd closed the connection".to_string(),
                ));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let value: Value = match serde_json::from_str(trimmed) {
                Ok(value) => value,
                Err(err) => {
                    // Keep the connection; one bad line is not a disconnect.
                    self.reader = Some(reader);
                    return Err(SensorError::Malformed(err.to_string()));
                }
            };

            match value.get("class").and_then(Value::as_str) {
                Some("SKY") => {
                    if let Some(satellites) = parse_sky(&value) {
                        self.satellites = satellites;
                    }
                }
                Some("TPV") => {
                    let reading = parse_tpv(&value, self.satellites);
                    self.reader = Some(reader);
                    return Ok(SensorReading::Gps(reading));
                }
                _ => {}
            }
        }
    }
}

/// Satellites in use, from a `SKY` report.
fn parse_sky(value: &Value) -> Option<u32> {
    if let Some(used) = value.get("uSat").and_then(Value::as_u64) {
        return u32::try_from(used).ok();
    }
    let satellites = value.get("satellites")?.as_array()?;
    let used = satellites
        .iter()
        .filter(|sat| sat.get("used").and_then(Value::as_bool) == Some(true))
        .count();
    u32::try_from(used).ok()
}

/// Raw reading from a `TPV` report.
fn parse_tpv(value: &Value, satellites: u32) -> GpsReading {
    let number = |key: &str| value.get(key).and_then(Value::as_f64);
    let mode = value
        .get("mode")
        .and_then(Value::as_u64)
        .and_then(|mode| u8::try_from(mode).ok())
        .unwrap_or(0);

    GpsReading {
        latitude: number("lat"),
        longitude: number("lon"),
        // gpsd ≥ 3.21 reports altMSL; older versions only alt.
        altitude: number("altMSL").or_else(|| number("alt")),
        speed: number("speed"),
        track: number("track"),
        climb: number("climb"),
        quality: FixQuality::from_gpsd_mode(mode),
        satellites,
    }
}
