//! Deterministic fakes of every port, for tests.
//!
//! Each port trait has one hardware implementation (in `riderecorder-pi`)
//! and one fake here, so the whole engine can be driven without real
//! hardware and with fully scripted timing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::ports::{
    EnvReading, Gesture, GpsReading, InputError, InputPort, LedPattern, OutputPort, SensorError,
    SensorPort, SensorReading,
};
use crate::record::FixQuality;

/// What a scripted sensor does once its script runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhausted {
    /// Every further poll times out, like a sensor that dropped off.
    Timeout,
    /// Never resolve again, like a sensor gone permanently silent.
    Pend,
}

/// A sensor port that replays a fixed script of readings and errors.
#[derive(Debug)]
pub struct ScriptedSensor {
    name: &'static str,
    script: VecDeque<Result<SensorReading, SensorError>>,
    exhausted: Exhausted,
}

impl ScriptedSensor {
    /// Create a sensor with the given name and an empty script.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            script: VecDeque::new(),
            exhausted: Exhausted::Timeout,
        }
    }

    /// Set what happens once the script is exhausted.
    #[must_use]
    pub fn when_exhausted(mut self, exhausted: Exhausted) -> Self {
        self.exhausted = exhausted;
        self
    }

    /// Append one successful reading to the script.
    #[must_use]
    pub fn then_ok(mut self, reading: SensorReading) -> Self {
        self.script.push_back(Ok(reading));
        self
    }

    /// Append one failure to the script.
    #[must_use]
    pub fn then_err(mut self, err: SensorError) -> Self {
        self.script.push_back(Err(err));
        self
    }

    /// Append `count` copies of a successful reading.
    #[must_use]
    pub fn then_ok_times(mut self, reading: &SensorReading, count: usize) -> Self {
        for _ in 0..count {
            self.script.push_back(Ok(reading.clone()));
        }
        self
    }
}

#[async_trait]
impl SensorPort for ScriptedSensor {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn sample(&mut self) -> Result<SensorReading, SensorError> {
        match self.script.pop_front() {
            Some(step) => step,
            None => match self.exhausted {
                Exhausted::Timeout => Err(SensorError::Timeout),
                Exhausted::Pend => std::future::pending().await,
            },
        }
    }
}

/// An input port that replays gestures with scripted delays.
///
/// Each entry waits its delay (relative to the previous gesture) before
/// yielding; after the script the port stays silent forever.
#[derive(Debug)]
pub struct ScriptedInput {
    script: VecDeque<(Duration, Gesture)>,
}

impl ScriptedInput {
    /// Create an input port with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
        }
    }

    /// Append a gesture that fires `after` the previous one.
    #[must_use]
    pub fn then_after(mut self, after: Duration, gesture: Gesture) -> Self {
        self.script.push_back((after, gesture));
        self
    }
}

impl Default for ScriptedInput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InputPort for ScriptedInput {
    async fn next_gesture(&mut self) -> Result<Gesture, InputError> {
        match self.script.pop_front() {
            Some((after, gesture)) => {
                tokio::time::sleep(after).await;
                Ok(gesture)
            }
            None => std::future::pending().await,
        }
    }
}

/// An input port that fails immediately, like an unplugged joystick.
#[derive(Debug, Default)]
pub struct DisconnectedInput;

#[async_trait]
impl InputPort for DisconnectedInput {
    async fn next_gesture(&mut self) -> Result<Gesture, InputError> {
        Err(InputError::Disconnected("fake device unplugged".to_string()))
    }
}

/// An output port that records every pattern it is asked to show.
#[derive(Debug, Default)]
pub struct RecordingLed {
    history: Arc<Mutex<Vec<LedPattern>>>,
}

impl RecordingLed {
    /// Create a recording LED.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle onto the recorded pattern history.
    #[must_use]
    pub fn history(&self) -> Arc<Mutex<Vec<LedPattern>>> {
        Arc::clone(&self.history)
    }
}

impl OutputPort for RecordingLed {
    fn set_pattern(&mut self, pattern: LedPattern) {
        self.history
            .lock()
            .expect("led history lock poisoned")
            .push(pattern);
    }
}

/// A usable 3D fix reading at the given coordinates.
#[must_use]
pub fn gps_fix(latitude: f64, longitude: f64) -> SensorReading {
    SensorReading::Gps(GpsReading {
        latitude: Some(latitude),
        longitude: Some(longitude),
        altitude: Some(52.0),
        speed: Some(5.0),
        track: Some(180.0),
        climb: Some(0.1),
        quality: FixQuality::ThreeD,
        satellites: 9,
    })
}

/// A no-fix reading that still reports satellites in view.
#[must_use]
pub fn gps_no_fix(satellites: u32) -> SensorReading {
    SensorReading::Gps(GpsReading {
        satellites,
        ..GpsReading::default()
    })
}

/// An environment reading with the common three channels populated.
#[must_use]
pub fn env_reading(temperature: f64, pressure: f64, humidity: f64) -> SensorReading {
    SensorReading::Environment(EnvReading {
        temperature: Some(temperature),
        pressure: Some(pressure),
        humidity: Some(humidity),
        pitch: None,
        roll: None,
    })
}

/// An environment reading with no populated channels.
#[must_use]
pub fn env_empty() -> SensorReading {
    SensorReading::Environment(EnvReading::default())
}
