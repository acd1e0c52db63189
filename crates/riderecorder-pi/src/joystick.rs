//! Sense HAT joystick via evdev.
//!
//! The joystick shows up as a plain evdev device. Raw `input_event`
//! frames are read straight off the device file; key events are decoded
//! into gestures (press duration separates short from long presses) and
//! debounced before the recorder ever sees them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tracing::debug;

use riderecorder::ports::{Debouncer, Gesture, InputError, InputPort};

/// Device name the kernel driver registers for the joystick.
const DEVICE_NAME: &str = "Raspberry Pi Sense HAT Joystick";
/// Where evdev devices are enumerated.
const INPUT_SYS_DIR: &str = "/sys/class/input";
/// Where the device nodes live.
const DEV_INPUT_DIR: &str = "/dev/input";

// struct input_event: a timeval (two C longs) followed by type, code
// and value. A C long matches the pointer width on Linux.
const TIME_FIELD_SIZE: usize = 2 * std::mem::size_of::<usize>();
const EVENT_SIZE: usize = TIME_FIELD_SIZE + 8;

const EV_KEY: u16 = 0x01;

const KEY_ENTER: u16 = 28;
const KEY_UP: u16 = 103;
const KEY_LEFT: u16 = 105;
const KEY_RIGHT: u16 = 106;
const KEY_DOWN: u16 = 108;

const VALUE_RELEASE: i32 = 0;
const VALUE_PRESS: i32 = 1;

/// Turns raw key events into gestures.
///
/// Direction pushes fire on press; the middle button fires on release so
/// the press duration can pick between short and long.
#[derive(Debug)]
struct GestureDecoder {
    long_press: Duration,
    pressed_at: Option<Instant>,
}

impl GestureDecoder {
    fn new(long_press: Duration) -> Self {
        Self {
            long_press,
            pressed_at: None,
        }
    }

    fn decode(&mut self, code: u16, value: i32, now: Instant) -> Option<Gesture> {
        match (code, value) {
            (KEY_UP, VALUE_PRESS) => Some(Gesture::Up),
            (KEY_DOWN, VALUE_PRESS) => Some(Gesture::Down),
            (KEY_LEFT, VALUE_PRESS) => Some(Gesture::Left),
            (KEY_RIGHT, VALUE_PRESS) => Some(Gesture::Right),
            (KEY_ENTER, VALUE_PRESS) => {
                self.pressed_at = Some(now);
                None
            }
            (KEY_ENTER, VALUE_RELEASE) => {
                let held = now.duration_since(self.pressed_at.take()?);
                if held >= self.long_press {
                    Some(Gesture::PressLong)
                } else {
                    Some(Gesture::PressShort)
                }
            }
            // Autorepeat and releases of direction keys carry no meaning.
            _ => None,
        }
    }
}

/// The Sense HAT joystick as an input port.
#[derive(Debug)]
pub struct SenseHatJoystick {
    device: tokio::fs::File,
    debouncer: Debouncer,
    decoder: GestureDecoder,
}

impl SenseHatJoystick {
    /// Open the joystick device, discovering it by name when no path is
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns an error if no joystick device exists or it cannot be
    /// opened.
    pub fn open(
        device: Option<PathBuf>,
        debounce: Duration,
        long_press: Duration,
    ) -> io::Result<Self> {
        let path = match device {
            Some(path) => path,
            None => discover()?,
        };
        let file = fs::File::open(&path)?;
        debug!("joystick at {}", path.display());

        Ok(Self {
            device: tokio::fs::File::from_std(file),
            debouncer: Debouncer::new(debounce),
            decoder: GestureDecoder::new(long_press),
        })
    }
}

#[async_trait]
impl InputPort for SenseHatJoystick {
    async fn next_gesture(&mut self) -> Result<Gesture, InputError> {
        let mut buf = [0u8; EVENT_SIZE];
        loop {
            self.device
                .read_exact(&mut buf)
                .await
                .map_err(|err| InputError::Disconnected(err.to_string()))?;

            let Some((code, value)) = parse_key_event(&buf) else {
                continue;
            };
            let now = Instant::now();
            if let Some(gesture) = self.decoder.decode(code, value, now) {
                if self.debouncer.accept(now) {
                    return Ok(gesture);
                }
                debug!("debounced {gesture}");
            }
        }
    }
}

/// Locate the joystick's event device through sysfs.
fn discover() -> io::Result<PathBuf> {
    for entry in fs::read_dir(INPUT_SYS_DIR)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if !name.starts_with("event") {
            continue;
        }
        let Ok(label) = fs::read_to_string(entry.path().join("device/name")) else {
            continue;
        };
        if label.trim() == DEVICE_NAME {
            return Ok(Path::new(DEV_INPUT_DIR).join(name.as_ref()));
        }
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        "Sense HAT joystick not found",
    ))
}

/// Decode one raw `input_event` frame; `None` for non-key events.
fn parse_key_event(buf: &[u8; EVENT_SIZE]) -> Option<(u16, i32)> {
    let event_type = u16::from_ne_bytes([buf[TIME_FIELD_SIZE], buf[TIME_FIELD_SIZE + 1]]);
    if event_type != EV_KEY {
        return None;
    }
    let code = u16::from_ne_bytes([buf[TIME_FIELD_SIZE + 2], buf[TIME_FIELD_SIZE + 3]]);
    let value = i32::from_ne_bytes([
        buf[TIME_FIELD_SIZE + 4],
        buf[TIME_FIELD_SIZE + 5],
        buf[TIME_FIELD_SIZE + 6],
        buf[TIME_FIELD_SIZE + 7],
    ]);
    Some((code, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event_type: u16, code: u16, value: i32) -> [u8; EVENT_SIZE] {
        let mut buf = [0u8; EVENT_SIZE];
        buf[TIME_FIELD_SIZE..TIME_FIELD_SIZE + 2].copy_from_slice(&event_type.to_ne_bytes());
        buf[TIME_FIELD_SIZE + 2..TIME_FIELD_SIZE + 4].copy_from_slice(&code.to_ne_bytes());
        buf[TIME_FIELD_SIZE + 4..TIME_FIELD_SIZE + 8].copy_from_slice(&value.to_ne_bytes());
        buf
    }

    #[test]
    fn test_parse_key_event() {
        let buf = frame(EV_KEY, KEY_LEFT, VALUE_PRESS);
        assert_eq!(parse_key_event(&buf), Some((KEY_LEFT, VALUE_PRESS)));
    }

    #[test]
    fn test_parse_ignores_non_key_events() {
        // EV_SYN frames separate event batches.
        let buf = frame(0x00, 0, 0);
        assert_eq!(parse_key_event(&buf), None);
    }

    #[test]
    fn test_decoder_directions_fire_on_press() {
        let mut decoder = GestureDecoder::new(Duration::from_millis(900));
        let now = Instant::now();

        assert_eq!(decoder.decode(KEY_UP, VALUE_PRESS, now), Some(Gesture::Up));
        assert_eq!(decoder.decode(KEY_UP, VALUE_RELEASE, now), None);
        assert_eq!(
            decoder.decode(KEY_RIGHT, VALUE_PRESS, now),
            Some(Gesture::Right)
        );
    }

    #[test]
    fn test_decoder_short_press() {
        let mut decoder = GestureDecoder::new(Duration::from_millis(900));
        let pressed = Instant::now();

        assert_eq!(decoder.decode(KEY_ENTER, VALUE_PRESS, pressed), None);
        assert_eq!(
            decoder.decode(KEY_ENTER, VALUE_RELEASE, pressed + Duration::from_millis(200)),
            Some(Gesture::PressShort)
        );
    }

    #[test]
    fn test_decoder_long_press() {
        let mut decoder = GestureDecoder::new(Duration::from_millis(900));
        let pressed = Instant::now();

        assert_eq!(decoder.decode(KEY_ENTER, VALUE_PRESS, pressed), None);
        assert_eq!(
            decoder.decode(KEY_ENTER, VALUE_RELEASE, pressed + Duration::from_millis(1200)),
            Some(Gesture::PressLong)
        );
    }

    #[test]
    fn test_decoder_release_without_press() {
        let mut decoder = GestureDecoder::new(Duration::from_millis(900));
        assert_eq!(
            decoder.decode(KEY_ENTER, VALUE_RELEASE, Instant::now()),
            None
        );
    }

    #[test]
    fn test_decoder_ignores_autorepeat() {
        let mut decoder = GestureDecoder::new(Duration::from_millis(900));
        let now = Instant::now();

        assert_eq!(decoder.decode(KEY_ENTER, VALUE_PRESS, now), None);
        // value 2 is the kernel's autorepeat.
        assert_eq!(decoder.decode(KEY_ENTER, 2, now), None);
        assert_eq!(
            decoder.decode(KEY_ENTER, VALUE_RELEASE, now + Duration::from_millis(100)),
            Some(Gesture::PressShort)
        );
    }
}
