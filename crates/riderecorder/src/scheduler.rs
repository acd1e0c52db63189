//! The sampling scheduler.
//!
//! One polling task per sensor port, each driven by its own cadence and
//! gated by the recorder's sampling switch. Every read is bounded by a
//! poll timeout so a stalled sensor can never starve the other port.
//! Failures are absorbed here: the port keeps being polled at cadence,
//! and only the degraded/recovered edges are surfaced to the recorder.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::Config;
use crate::ports::{SensorError, SensorPort, SensorReading};
use crate::record::{EnvironmentSample, PositionFix, Quantity, SessionRecord};
use crate::recorder::RecorderEvent;

/// Per-port scheduling parameters.
#[derive(Debug, Clone)]
pub struct PortSettings {
    /// Time between polls.
    pub cadence: Duration,
    /// Bound on a single read.
    pub poll_timeout: Duration,
    /// Consecutive failures before the degraded signal fires.
    pub degraded_after: u32,
}

impl PortSettings {
    /// Settings for the GPS port.
    #[must_use]
    pub fn gps(config: &Config) -> Self {
        Self {
            cadence: config.gps_cadence(),
            poll_timeout: config.gps_poll_timeout(),
            degraded_after: config.gps.degraded_after,
        }
    }

    /// Settings for the environment port.
    #[must_use]
    pub fn environment(config: &Config) -> Self {
        Self {
            cadence: config.environment_cadence(),
            poll_timeout: config.environment_poll_timeout(),
            degraded_after: config.environment.degraded_after,
        }
    }
}

/// Spawn the polling task for one sensor port.
///
/// The task ends when the recorder (the `events` receiver) or the
/// sampling switch goes away.
#[must_use]
pub fn spawn_sampling_task(
    port: Box<dyn SensorPort>,
    settings: PortSettings,
    enabled: watch::Receiver<bool>,
    events: mpsc::Sender<RecorderEvent>,
) -> JoinHandle<()> {
    tokio::spawn(run_sampling_loop(port, settings, enabled, events))
}

async fn run_sampling_loop(
    mut port: Box<dyn SensorPort>,
    settings: PortSettings,
    mut enabled: watch::Receiver<bool>,
    events: mpsc::Sender<RecorderEvent>,
) {
    let name = port.name();
    let mut interval = tokio::time::interval(settings.cadence);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut failures: u32 = 0;
    let mut degraded = false;
    let mut sequence: u64 = 0;

    loop {
        interval.tick().await;

        if !*enabled.borrow_and_update() {
            // Park until the recorder switches sampling back on.
            if enabled.changed().await.is_err() {
                break;
            }
            continue;
        }

        let outcome = match tokio::time::timeout(settings.poll_timeout, port.sample()).await {
            Ok(result) => result,
            Err(_) => Err(SensorError::Timeout),
        };

        match outcome {
            Ok(reading) => {
                if degraded {
                    degraded = false;
                    if events
                        .send(RecorderEvent::PortRecovered { port: name })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                failures = 0;

                if let Some(record) = normalize(reading, &mut sequence) {
                    if events.send(RecorderEvent::Sample(record)).await.is_err() {
                        break;
                    }
                }
            }
            Err(err) => {
                failures += 1;
                debug!("'{name}' read failed ({failures} in a row): {err}");
                if failures == settings.degraded_after && !degraded {
                    degraded = true;
                    warn!("'{name}' degraded after {failures} consecutive failures");
                    if events
                        .send(RecorderEvent::PortDegraded { port: name })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }
    }
}

/// Turn a raw reading into a persisted record.
///
/// The record timestamp is assigned here, at normalization time. No-fix
/// GPS readings are forwarded (so downstream can distinguish "no signal"
/// from "no data"); environment readings with zero populated quantities
/// are dropped.
fn normalize(reading: SensorReading, sequence: &mut u64) -> Option<SessionRecord> {
    match reading {
        SensorReading::Gps(gps) => {
            let seq = *sequence;
            *sequence += 1;
            Some(SessionRecord::Fix(PositionFix {
                timestamp: Utc::now(),
                latitude: gps.latitude.unwrap_or(0.0),
                longitude: gps.longitude.unwrap_or(0.0),
                altitude: gps.altitude,
                speed: gps.speed,
                track: gps.track,
                climb: gps.climb,
                quality: gps.quality,
                satellites: gps.satellites,
                sequence: seq,
            }))
        }
        SensorReading::Environment(env) => {
            let mut values = std::collections::BTreeMap::new();
            if let Some(v) = env.temperature {
                values.insert(Quantity::Temperature, v);
            }
            if let Some(v) = env.pressure {
                values.insert(Quantity::Pressure, v);
            }
            if let Some(v) = env.humidity {
                values.insert(Quantity::Humidity, v);
            }
            if let Some(v) = env.pitch {
                values.insert(Quantity::Pitch, v);
            }
            if let Some(v) = env.roll {
                values.insert(Quantity::Roll, v);
            }
            if values.is_empty() {
                return None;
            }
            Some(SessionRecord::Environment(EnvironmentSample::new(
                Utc::now(),
                values,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::record::FixQuality;
    use crate::testing::{env_empty, env_reading, gps_fix, gps_no_fix, Exhausted, ScriptedSensor};

    fn settings() -> PortSettings {
        PortSettings {
            cadence: Duration::from_millis(10),
            poll_timeout: Duration::from_millis(5),
            degraded_after: 3,
        }
    }

    #[test]
    fn test_normalize_forwards_no_fix() {
        let mut sequence = 0;
        let record = normalize(gps_no_fix(4), &mut sequence).expect("no-fix must be forwarded");

        match record {
            SessionRecord::Fix(fix) => {
                assert_eq!(fix.quality, FixQuality::NoFix);
                assert_eq!(fix.satellites, 4);
                assert!((fix.latitude - 0.0).abs() < f64::EPSILON);
                assert!(fix.altitude.is_none());
            }
            other => panic!("expected fix, got {other:?}"),
        }
    }

    #[test]
    fn test_normalize_assigns_sequence_numbers() {
        let mut sequence = 0;
        for expected in 0..3u64 {
            let record = normalize(gps_fix(51.0, 6.0), &mut sequence).unwrap();
            match record {
                SessionRecord::Fix(fix) => assert_eq!(fix.sequence, expected),
                other => panic!("expected fix, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_normalize_drops_empty_environment() {
        let mut sequence = 0;
        assert!(normalize(env_empty(), &mut sequence).is_none());
        // Dropped environment readings do not consume fix sequence numbers.
        assert_eq!(sequence, 0);
    }

    #[test]
    fn test_normalize_keeps_partial_environment() {
        let mut sequence = 0;
        let record = normalize(env_reading(19.5, 1008.2, 61.0), &mut sequence).unwrap();
        match record {
            SessionRecord::Environment(sample) => {
                assert_eq!(sample.values.len(), 3);
                assert_eq!(sample.values.get(&Quantity::Temperature), Some(&19.5));
                assert!(!sample.values.contains_key(&Quantity::Pitch));
            }
            other => panic!("expected environment sample, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_and_recovered_edges() {
        let sensor = ScriptedSensor::new("gps")
            .then_err(SensorError::Timeout)
            .then_err(SensorError::Malformed("garbage".to_string()))
            .then_err(SensorError::Disconnected("gone".to_string()))
            .then_ok(gps_fix(51.0, 6.0))
            .when_exhausted(Exhausted::Pend);

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (enabled_tx, enabled_rx) = watch::channel(true);
        let task = spawn_sampling_task(Box::new(sensor), settings(), enabled_rx, events_tx);

        // Exactly one degraded edge after three consecutive failures.
        let event = events_rx.recv().await.unwrap();
        assert!(matches!(event, RecorderEvent::PortDegraded { port: "gps" }));

        // The next success reports recovery before the sample.
        let event = events_rx.recv().await.unwrap();
        assert!(matches!(event, RecorderEvent::PortRecovered { port: "gps" }));
        let event = events_rx.recv().await.unwrap();
        assert!(matches!(event, RecorderEvent::Sample(_)));

        drop(enabled_tx);
        drop(events_rx);
        task.abort();
        let _ = task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampling_gated_by_switch() {
        let sensor = ScriptedSensor::new("gps")
            .then_ok_times(&gps_fix(51.0, 6.0), 100)
            .when_exhausted(Exhausted::Pend);

        let (events_tx, mut events_rx) = mpsc::channel(64);
        let (enabled_tx, enabled_rx) = watch::channel(false);
        let task = spawn_sampling_task(Box::new(sensor), settings(), enabled_rx, events_tx);

        // Disabled: nothing flows no matter how long we wait.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(events_rx.try_recv().is_err());

        // Enabled: samples arrive.
        enabled_tx.send_replace(true);
        let event = events_rx.recv().await.unwrap();
        assert!(matches!(event, RecorderEvent::Sample(_)));

        task.abort();
        let _ = task.await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_below_threshold_stay_silent() {
        let sensor = ScriptedSensor::new("environment")
            .then_err(SensorError::Timeout)
            .then_err(SensorError::Timeout)
            .then_ok(env_reading(20.0, 1010.0, 55.0))
            .when_exhausted(Exhausted::Pend);

        let (events_tx, mut events_rx) = mpsc::channel(16);
        let (_enabled_tx, enabled_rx) = watch::channel(true);
        let task = spawn_sampling_task(Box::new(sensor), settings(), enabled_rx, events_tx);

        // Two failures are below the threshold of three: the first event
        // out must be the sample itself, not a degradation signal.
        let event = events_rx.recv().await.unwrap();
        assert!(matches!(event, RecorderEvent::Sample(_)));

        task.abort();
        let _ = task.await;
    }
}
