//! The input port abstraction.
//!
//! Wraps the joystick as a stream of discrete, debounced gestures. The
//! recorder only ever sees semantically meaningful events; raw event
//! handling, debouncing and long-press detection are the port's business.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

/// Errors an input port can produce.
#[derive(Debug, Error)]
pub enum InputError {
    /// The input device went away.
    #[error("input device disconnected: {0}")]
    Disconnected(String),
}

/// A debounced, semantically meaningful joystick gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    /// Short press of the middle button.
    PressShort,
    /// Long press of the middle button.
    PressLong,
    /// Push up.
    Up,
    /// Push down.
    Down,
    /// Push left.
    Left,
    /// Push right.
    Right,
}

impl std::fmt::Display for Gesture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PressShort => write!(f, "press_short"),
            Self::PressLong => write!(f, "press_long"),
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// The joystick as a stream of gestures.
#[async_trait]
pub trait InputPort: Send {
    /// Wait for the next debounced gesture.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::Disconnected`] when the device is gone;
    /// operator control is then lost for the rest of the process.
    async fn next_gesture(&mut self) -> Result<Gesture, InputError>;
}

/// Minimum-spacing debouncer for raw input events.
///
/// Hardware ports feed every candidate event through this before turning
/// it into a gesture; events closer together than the configured gap are
/// swallowed.
#[derive(Debug)]
pub struct Debouncer {
    min_gap: Duration,
    last_accepted: Option<Instant>,
}

impl Debouncer {
    /// Create a debouncer with the given minimum inter-event spacing.
    #[must_use]
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last_accepted: None,
        }
    }

    /// Decide whether an event observed at `now` passes the debounce gap.
    pub fn accept(&mut self, now: Instant) -> bool {
        match self.last_accepted {
            Some(last) if now.duration_since(last) < self.min_gap => false,
            _ => {
                self.last_accepted = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debouncer_accepts_first_event() {
        let mut debouncer = Debouncer::new(Duration::from_millis(150));
        assert!(debouncer.accept(Instant::now()));
    }

    #[test]
    fn test_debouncer_swallows_bounce() {
        let mut debouncer = Debouncer::new(Duration::from_millis(150));
        let start = Instant::now();

        assert!(debouncer.accept(start));
        assert!(!debouncer.accept(start + Duration::from_millis(10)));
        assert!(!debouncer.accept(start + Duration::from_millis(149)));
    }

    #[test]
    fn test_debouncer_accepts_after_gap() {
        let mut debouncer = Debouncer::new(Duration::from_millis(150));
        let start = Instant::now();

        assert!(debouncer.accept(start));
        assert!(debouncer.accept(start + Duration::from_millis(150)));
        assert!(debouncer.accept(start + Duration::from_millis(400)));
    }

    #[test]
    fn test_debouncer_gap_measured_from_last_accepted() {
        let mut debouncer = Debouncer::new(Duration::from_millis(100));
        let start = Instant::now();

        assert!(debouncer.accept(start));
        // Rejected events must not push the window forward.
        assert!(!debouncer.accept(start + Duration::from_millis(60)));
        assert!(debouncer.accept(start + Duration::from_millis(110)));
    }

    #[test]
    fn test_gesture_display() {
        assert_eq!(Gesture::PressShort.to_string(), "press_short");
        assert_eq!(Gesture::PressLong.to_string(), "press_long");
        assert_eq!(Gesture::Left.to_string(), "left");
        assert_eq!(Gesture::Right.to_string(), "right");
    }
}
