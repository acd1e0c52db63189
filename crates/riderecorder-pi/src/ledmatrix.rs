//! Sense HAT LED matrix via the framebuffer.
//!
//! The 8×8 matrix is a tiny RGB565 framebuffer. Each pattern renders to
//! a full 64-pixel frame written in one go; a failed write is logged and
//! dropped, never surfaced to the recorder.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use riderecorder::ports::{LedPattern, OutputPort};

/// Framebuffer name the Sense HAT driver registers.
const FB_NAME: &str = "RPi-Sense FB";
/// Where framebuffers are enumerated.
const GRAPHICS_SYS_DIR: &str = "/sys/class/graphics";
/// Where the device nodes live.
const DEV_DIR: &str = "/dev";

const WIDTH: usize = 8;
const PIXELS: usize = WIDTH * WIDTH;

const OFF: u16 = 0;
const WHITE: u16 = rgb565(255, 255, 255);
const RED: u16 = rgb565(255, 0, 0);
const GREEN: u16 = rgb565(0, 255, 0);
const BLUE: u16 = rgb565(0, 0, 255);
const YELLOW: u16 = rgb565(255, 255, 0);

/// The Sense HAT LED matrix as an output port.
#[derive(Debug)]
pub struct SenseHatMatrix {
    path: PathBuf,
}

impl SenseHatMatrix {
    /// Open the matrix framebuffer, discovering it by name when no path
    /// is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if no matching framebuffer exists.
    pub fn open(framebuffer: Option<PathBuf>) -> io::Result<Self> {
        let path = match framebuffer {
            Some(path) => path,
            None => discover()?,
        };
        fs::metadata(&path)?;
        debug!("LED matrix at {}", path.display());
        Ok(Self { path })
    }
}

impl OutputPort for SenseHatMatrix {
    fn set_pattern(&mut self, pattern: LedPattern) {
        let frame = render(pattern);
        if let Err(err) = fs::write(&self.path, frame_bytes(&frame)) {
            warn!("LED write failed: {err}");
        }
    }
}

/// Locate the Sense HAT framebuffer through sysfs.
fn discover() -> io::Result<PathBuf> {
    for entry in fs::read_dir(GRAPHICS_SYS_DIR)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();
        if !name.starts_with("fb") {
            continue;
        }
        let Ok(label) = fs::read_to_string(entry.path().join("name")) else {
            continue;
        };
        if label.trim() == FB_NAME {
            return Ok(Path::new(DEV_DIR).join(name.as_ref()));
        }
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        "Sense HAT framebuffer not found",
    ))
}

/// Pack an RGB color into RGB565.
const fn rgb565(r: u8, g: u8, b: u8) -> u16 {
    (((r >> 3) as u16) << 11) | (((g >> 2) as u16) << 5) | ((b >> 3) as u16)
}

/// Render a pattern to a full frame.
fn render(pattern: LedPattern) -> [u16; PIXELS] {
    let mut frame = [OFF; PIXELS];
    match pattern {
        LedPattern::Ready => fill_row(&mut frame, 2, WHITE),
        LedPattern::Recording => fill_row(&mut frame, 2, BLUE),
        LedPattern::Paused => fill_row(&mut frame, 2, YELLOW),
        LedPattern::Error => frame = [RED; PIXELS],
        LedPattern::Acknowledge => frame = [GREEN; PIXELS],
        LedPattern::Searching { satellites } => {
            fill_row(&mut frame, 2, WHITE);
            // One dot per satellite, zig-zagging over the two top rows;
            // few satellites show red, a workable set yellow, plenty green.
            for x in 0..satellites.min(16) {
                let idx = (x % 2) * WIDTH as u32 + x / 2;
                let color = if x <= 3 {
                    RED
                } else if x < 8 {
                    YELLOW
                } else {
                    GREEN
                };
                frame[idx as usize] = color;
            }
        }
    }
    frame
}

/// Light one full row.
fn fill_row(frame: &mut [u16; PIXELS], row: usize, color: u16) {
    for pixel in &mut frame[row * WIDTH..(row + 1) * WIDTH] {
        *pixel = color;
    }
}

/// Serialize a frame for the framebuffer.
fn frame_bytes(frame: &[u16; PIXELS]) -> [u8; PIXELS * 2] {
    let mut bytes = [0u8; PIXELS * 2];
    for (i, pixel) in frame.iter().enumerate() {
        let pair = pixel.to_ne_bytes();
        bytes[2 * i] = pair[0];
        bytes[2 * i + 1] = pair[1];
    }
    bytes
}
