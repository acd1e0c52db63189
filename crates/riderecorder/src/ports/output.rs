//! The output port abstraction.
//!
//! The LED matrix is the only feedback channel during headless operation.
//! The recorder paints one of a small set of patterns; how a pattern is
//! rendered onto actual pixels is the adapter's business.

/// Feedback patterns the recorder can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedPattern {
    /// At rest, ready to start a session.
    Ready,
    /// Waiting for a usable GPS fix; shows how many satellites are in view.
    Searching {
        /// Satellites currently used by the receiver.
        satellites: u32,
    },
    /// Actively recording.
    Recording,
    /// Session open but paused.
    Paused,
    /// A fault needs operator attention.
    Error,
    /// A fault was acknowledged.
    Acknowledge,
}

/// The LED matrix as a pattern sink.
///
/// `set_pattern` is fire-and-forget: implementations must return promptly
/// and deal with their own I/O failures (logging them at most), so the
/// recorder is never blocked by its feedback channel.
pub trait OutputPort: Send {
    /// Show the given pattern.
    fn set_pattern(&mut self, pattern: LedPattern);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compare() {
        assert_eq!(
            LedPattern::Searching { satellites: 4 },
            LedPattern::Searching { satellites: 4 }
        );
        assert_ne!(
            LedPattern::Searching { satellites: 4 },
            LedPattern::Searching { satellites: 5 }
        );
        assert_ne!(LedPattern::Ready, LedPattern::Recording);
    }
}
