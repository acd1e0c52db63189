//! The session recorder state machine.
//!
//! One task owns the recorder. Sensor samples, gestures, degradation
//! signals, store faults and termination all arrive through a single
//! bounded inbox, so every state transition is applied atomically; no
//! other task ever touches the recorder's state. Store commands leave
//! through the non-blocking [`StoreClient`] — the recorder never waits
//! for the disk.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::ports::{Gesture, InputError, LedPattern, OutputPort};
use crate::record::{PositionFix, SessionRecord, Waypoint};
use crate::session::Session;
use crate::store::{StorageError, StoreClient};

/// Lifecycle state of the recorder.
///
/// Exactly one instance is live per process. The state itself is never
/// persisted; only its effects (records and session boundaries) are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// At rest; no sensors sampled.
    Idle,
    /// Sampling, waiting for the first usable fix.
    Armed,
    /// Session open; scheduler output is persisted.
    Recording,
    /// Session open; samples flow but nothing is persisted.
    Paused,
    /// A storage fault needs operator acknowledgement.
    Faulted,
    /// Session sealed; behaves like Idle for the next ride.
    Stopped,
}

impl std::fmt::Display for RecorderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Armed => write!(f, "armed"),
            Self::Recording => write!(f, "recording"),
            Self::Paused => write!(f, "paused"),
            Self::Faulted => write!(f, "faulted"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Everything that can arrive in the recorder's inbox.
#[derive(Debug)]
pub enum RecorderEvent {
    /// A normalized record from the sampling scheduler.
    Sample(SessionRecord),
    /// A debounced gesture from the input port.
    Gesture(Gesture),
    /// A sensor port crossed its consecutive-failure threshold.
    PortDegraded {
        /// Name of the degraded port.
        port: &'static str,
    },
    /// A degraded sensor port produced a reading again.
    PortRecovered {
        /// Name of the recovered port.
        port: &'static str,
    },
    /// The input device went away; operator control is lost.
    InputLost(InputError),
    /// The store worker reported a failure.
    StoreFault(StorageError),
    /// The process is being terminated.
    Terminate,
}

/// Tunables of the state machine.
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    /// How long Armed waits for a first usable fix.
    pub fix_timeout: Duration,
    /// Label attached to long-press waypoints.
    pub waypoint_label: String,
}

impl RecorderSettings {
    /// Derive the settings from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            fix_timeout: config.fix_timeout(),
            waypoint_label: config.recorder.waypoint_label.clone(),
        }
    }
}

/// The session recorder.
///
/// Owns the current [`Session`] and the only write path into the store.
pub struct SessionRecorder {
    state: RecorderState,
    session: Option<Session>,
    latest_fix: Option<PositionFix>,
    last_persisted: Option<DateTime<Utc>>,
    satellites: u32,
    degraded_ports: u32,
    input_lost: bool,
    store: StoreClient,
    led: Box<dyn OutputPort>,
    sampling: watch::Sender<bool>,
    settings: RecorderSettings,
    armed_deadline: Option<Instant>,
}

impl std::fmt::Debug for SessionRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecorder")
            .field("state", &self.state)
            .field("session", &self.session)
            .field("degraded_ports", &self.degraded_ports)
            .field("input_lost", &self.input_lost)
            .finish_non_exhaustive()
    }
}

impl SessionRecorder {
    /// Create a recorder in the Idle state.
    #[must_use]
    pub fn new(
        store: StoreClient,
        led: Box<dyn OutputPort>,
        sampling: watch::Sender<bool>,
        settings: RecorderSettings,
    ) -> Self {
        Self {
            state: RecorderState::Idle,
            session: None,
            latest_fix: None,
            last_persisted: None,
            satellites: 0,
            degraded_ports: 0,
            input_lost: false,
            store,
            led,
            sampling,
            settings,
            armed_deadline: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// The session currently owned by the recorder, if any.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Consume events until termination.
    ///
    /// Ends when a terminate event arrives, a terminating gesture is made,
    /// or every event sender is gone.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<RecorderEvent>) {
        self.enter_idle();
        loop {
            let event = tokio::select! {
                event = inbox.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                () = Self::until(self.armed_deadline) => {
                    self.on_armed_timeout();
                    continue;
                }
            };
            if !self.handle_event(event) {
                break;
            }
        }
        self.shutdown();
    }

    /// Sleep until the given deadline, or forever when there is none.
    async fn until(deadline: Option<Instant>) {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }

    /// Apply one event. Returns `false` when the process should end.
    fn handle_event(&mut self, event: RecorderEvent) -> bool {
        match event {
            RecorderEvent::Sample(record) => {
                self.on_sample(record);
                true
            }
            RecorderEvent::Gesture(gesture) => self.on_gesture(gesture),
            RecorderEvent::PortDegraded { port } => {
                self.on_port_degraded(port);
                true
            }
            RecorderEvent::PortRecovered { port } => {
                self.on_port_recovered(port);
                true
            }
            RecorderEvent::InputLost(err) => {
                self.on_input_lost(&err);
                true
            }
            RecorderEvent::StoreFault(err) => {
                self.fault(&err);
                true
            }
            RecorderEvent::Terminate => {
                self.on_terminate();
                false
            }
        }
    }

    fn on_gesture(&mut self, gesture: Gesture) -> bool {
        debug!("gesture {gesture} in state {}", self.state);
        match (self.state, gesture) {
            (RecorderState::Idle | RecorderState::Stopped, Gesture::Left) => {
                self.enter_armed();
            }
            (RecorderState::Idle | RecorderState::Stopped, Gesture::Down) => {
                info!("terminate gesture");
                return false;
            }
            (RecorderState::Armed, Gesture::Right) => {
                info!("fix acquisition cancelled");
                self.enter_idle();
            }
            (RecorderState::Recording | RecorderState::Paused, Gesture::Right) => {
                self.stop_session();
            }
            (RecorderState::Recording, Gesture::Up) => {
                info!("session paused");
                self.state = RecorderState::Paused;
                self.led.set_pattern(LedPattern::Paused);
            }
            (RecorderState::Paused, Gesture::Up) => {
                info!("session resumed");
                self.state = RecorderState::Recording;
                self.led.set_pattern(LedPattern::Recording);
            }
            (RecorderState::Recording, Gesture::PressShort) => {
                self.mark_waypoint(None);
            }
            (RecorderState::Recording, Gesture::PressLong) => {
                self.mark_waypoint(Some(self.settings.waypoint_label.clone()));
            }
            (RecorderState::Faulted, Gesture::Down) => {
                self.acknowledge_fault();
            }
            _ => debug!("gesture {gesture} ignored in state {}", self.state),
        }
        true
    }

    fn on_sample(&mut self, record: SessionRecord) {
        if let SessionRecord::Fix(fix) = &record {
            self.satellites = fix.satellites;
            if fix.quality.is_usable() {
                self.latest_fix = Some(fix.clone());
            }
        }

        match self.state {
            RecorderState::Armed => {
                self.led.set_pattern(LedPattern::Searching {
                    satellites: self.satellites,
                });
                let usable =
                    matches!(&record, SessionRecord::Fix(fix) if fix.quality.is_usable());
                if usable {
                    self.begin_recording(record);
                }
                // Pre-fix samples are discarded, not buffered.
            }
            RecorderState::Recording => self.admit(record),
            // Paused keeps the preview current but persists nothing.
            RecorderState::Idle
            | RecorderState::Paused
            | RecorderState::Faulted
            | RecorderState::Stopped => {}
        }
    }

    /// First usable fix while Armed: open the session, then admit the fix.
    fn begin_recording(&mut self, first_fix: SessionRecord) {
        let session = Session::begin(Utc::now());
        info!("session '{}' starting", session.id);

        match self.store.begin(session.clone()) {
            Ok(()) => {
                self.session = Some(session);
                self.state = RecorderState::Recording;
                self.armed_deadline = None;
                self.last_persisted = None;
                self.led.set_pattern(LedPattern::Recording);
                self.admit(first_fix);
            }
            Err(err) => self.fault(&err),
        }
    }

    /// Persist one record, enforcing non-decreasing timestamps.
    fn admit(&mut self, record: SessionRecord) {
        let timestamp = record.timestamp();
        if let Some(last) = self.last_persisted {
            if timestamp < last {
                debug!(
                    "dropping out-of-order {} record ({timestamp} < {last})",
                    record.kind()
                );
                return;
            }
        }
        match self.store.append(record) {
            Ok(()) => self.last_persisted = Some(timestamp),
            Err(err) => self.fault(&err),
        }
    }

    fn mark_waypoint(&mut self, label: Option<String>) {
        // Recording is only entered on a usable fix, so one is always known;
        // it may be stale if the receiver just dropped.
        let Some(fix) = self.latest_fix.clone() else {
            warn!("mark gesture without any known fix");
            return;
        };
        info!("waypoint marked");
        self.admit(SessionRecord::Waypoint(Waypoint {
            timestamp: Utc::now(),
            fix,
            label,
        }));
    }

    fn enter_armed(&mut self) {
        info!("arming: waiting for a usable fix");
        self.state = RecorderState::Armed;
        self.satellites = 0;
        self.sampling.send_replace(true);
        self.armed_deadline = Some(Instant::now() + self.settings.fix_timeout);
        self.led.set_pattern(LedPattern::Searching { satellites: 0 });
    }

    fn enter_idle(&mut self) {
        self.state = RecorderState::Idle;
        self.sampling.send_replace(false);
        self.armed_deadline = None;
        self.led.set_pattern(LedPattern::Ready);
    }

    fn on_armed_timeout(&mut self) {
        self.armed_deadline = None;
        if self.state == RecorderState::Armed {
            warn!(
                "no usable fix within {:?}; standing down",
                self.settings.fix_timeout
            );
            self.enter_idle();
        }
    }

    /// Flush and seal the open session, then rest at Stopped.
    fn stop_session(&mut self) {
        let ended_at = Utc::now();
        // The seal command queues behind every admitted record, so the
        // store flushes them before the trailer is written.
        if let Err(err) = self.store.seal(ended_at) {
            self.fault(&err);
            return;
        }
        if let Some(session) = self.session.as_mut() {
            session.ended_at = Some(ended_at);
            info!("session '{}' stopped", session.id);
        }
        self.state = RecorderState::Stopped;
        self.sampling.send_replace(false);
        self.armed_deadline = None;
        self.latest_fix = None;
        self.last_persisted = None;
        self.led.set_pattern(LedPattern::Ready);
    }

    fn fault(&mut self, err: &StorageError) {
        if self.state == RecorderState::Faulted {
            debug!("additional fault while already faulted: {err}");
            return;
        }
        error!("entering faulted state: {err}");
        self.state = RecorderState::Faulted;
        self.sampling.send_replace(false);
        self.armed_deadline = None;
        self.led.set_pattern(LedPattern::Error);
    }

    fn acknowledge_fault(&mut self) {
        info!("fault acknowledged");
        if self.session.as_ref().is_some_and(|s| !s.is_sealed()) {
            // Best effort: preserve what was captured before the fault.
            let ended_at = Utc::now();
            match self.store.seal(ended_at) {
                Ok(()) => {
                    if let Some(session) = self.session.as_mut() {
                        session.ended_at = Some(ended_at);
                    }
                }
                Err(err) => warn!("could not seal faulted session: {err}"),
            }
        }
        self.state = RecorderState::Stopped;
        self.led.set_pattern(LedPattern::Acknowledge);
    }

    fn on_port_degraded(&mut self, port: &'static str) {
        warn!("sensor port '{port}' degraded");
        self.degraded_ports += 1;
        // While Armed the searching pattern stays up: GPS reacquisition is
        // the normal case there, not a fault.
        if matches!(self.state, RecorderState::Recording | RecorderState::Paused) {
            self.led.set_pattern(LedPattern::Error);
        }
    }

    fn on_port_recovered(&mut self, port: &'static str) {
        info!("sensor port '{port}' recovered");
        self.degraded_ports = self.degraded_ports.saturating_sub(1);
        if self.degraded_ports == 0 && !self.input_lost {
            self.repaint();
        }
    }

    fn on_input_lost(&mut self, err: &InputError) {
        error!("operator input lost: {err}");
        self.input_lost = true;
        self.led.set_pattern(LedPattern::Error);
    }

    fn on_terminate(&mut self) {
        info!("termination requested");
        if matches!(self.state, RecorderState::Recording | RecorderState::Paused) {
            self.stop_session();
        }
    }

    /// Repaint the pattern belonging to the current state.
    fn repaint(&mut self) {
        let pattern = match self.state {
            RecorderState::Idle | RecorderState::Stopped => LedPattern::Ready,
            RecorderState::Armed => LedPattern::Searching {
                satellites: self.satellites,
            },
            RecorderState::Recording => LedPattern::Recording,
            RecorderState::Paused => LedPattern::Paused,
            RecorderState::Faulted => LedPattern::Error,
        };
        self.led.set_pattern(pattern);
    }

    fn shutdown(&mut self) {
        self.sampling.send_replace(false);
        self.led.set_pattern(LedPattern::Ready);
        info!("recorder stopped");
    }
}
