//! End-to-end scenarios through the full engine with fake ports.
//!
//! The tokio clock is paused, so scripted timelines spanning simulated
//! minutes run instantly and deterministically: timers fire in order and
//! the clock only advances when every task is idle.

use std::path::Path;
use std::time::Duration;

use riderecorder::testing::{
    env_reading, gps_fix, gps_no_fix, Exhausted, RecordingLed, ScriptedInput, ScriptedSensor,
};
use riderecorder::{
    engine, Config, EnginePorts, Gesture, RecordKind, SensorError, SessionStore,
};

fn test_config(data_dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = Some(data_dir.to_path_buf());
    config
}

fn secs(s: f64) -> Duration {
    Duration::from_millis((s * 1000.0) as u64)
}

/// Power-on, start, 30 s without a fix, 10 fixes, mark, stop.
///
/// Expected: one sealed session holding exactly ten position fixes and
/// one waypoint after them, end timestamp at or after the last fix.
#[tokio::test(start_paused = true)]
async fn thirty_seconds_to_first_fix() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let mut gps = ScriptedSensor::new("gps").when_exhausted(Exhausted::Timeout);
    for _ in 0..30 {
        gps = gps.then_ok(gps_no_fix(3));
    }
    gps = gps.then_ok_times(&gps_fix(50.94, 6.96), 10);

    let environment = ScriptedSensor::new("environment").when_exhausted(Exhausted::Timeout);

    let input = ScriptedInput::new()
        .then_after(secs(0.5), Gesture::Left)
        .then_after(secs(44.5), Gesture::PressShort)
        .then_after(secs(1.0), Gesture::Right)
        .then_after(secs(1.0), Gesture::Down);

    let led = RecordingLed::new();

    engine::run(
        &config,
        EnginePorts {
            gps: Box::new(gps),
            environment: Box::new(environment),
            input: Box::new(input),
            led: Box::new(led),
        },
    )
    .await
    .unwrap();

    let store = SessionStore::open(dir.path()).unwrap();
    let sessions = store.list_sessions().unwrap();
    assert_eq!(sessions.len(), 1, "exactly one session expected");
    assert!(sessions[0].sealed);

    let (summary, records) = store.read_session(&sessions[0].id).unwrap().unwrap();

    let fixes: Vec<_> = records
        .iter()
        .filter(|r| r.kind() == RecordKind::Fix)
        .collect();
    let waypoints: Vec<_> = records
        .iter()
        .filter(|r| r.kind() == RecordKind::Waypoint)
        .collect();

    // The 30 no-fix cycles were forwarded but discarded in Armed.
    assert_eq!(fixes.len(), 10);
    assert_eq!(waypoints.len(), 1);
    assert_eq!(records.len(), 11);

    // The waypoint comes after the tenth fix and the trailer closes after it.
    let last_fix_ts = fixes.last().unwrap().timestamp();
    assert!(waypoints[0].timestamp() >= last_fix_ts);
    assert_eq!(records.last().unwrap().kind(), RecordKind::Waypoint);
    assert!(summary.ended_at.unwrap() >= last_fix_ts);
}

/// Recording while the environment sensor fails every other cycle.
///
/// Expected: exactly five environment samples persisted, no fault.
#[tokio::test(start_paused = true)]
async fn environment_errors_every_other_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let gps = ScriptedSensor::new("gps")
        .then_ok_times(&gps_fix(50.94, 6.96), 60)
        .when_exhausted(Exhausted::Timeout);

    let mut environment = ScriptedSensor::new("environment").when_exhausted(Exhausted::Timeout);
    for cycle in 0..10 {
        environment = if cycle % 2 == 0 {
            environment.then_ok(env_reading(19.0 + f64::from(cycle), 1010.0, 60.0))
        } else {
            environment.then_err(SensorError::Malformed("i2c glitch".to_string()))
        };
    }

    let input = ScriptedInput::new()
        .then_after(secs(0.5), Gesture::Left)
        .then_after(secs(13.0), Gesture::Right)
        .then_after(secs(1.0), Gesture::Down);

    engine::run(
        &config,
        EnginePorts {
            gps: Box::new(gps),
            environment: Box::new(environment),
            input: Box::new(input),
            led: Box::new(RecordingLed::new()),
        },
    )
    .await
    .unwrap();

    let store = SessionStore::open(dir.path()).unwrap();
    let sessions = store.list_sessions().unwrap();
    assert_eq!(sessions.len(), 1);
    // A sealed session proves the recorder never went Faulted from
    // sensor errors alone.
    assert!(sessions[0].sealed);

    let (_, records) = store.read_session(&sessions[0].id).unwrap().unwrap();
    let environment_samples = records
        .iter()
        .filter(|r| r.kind() == RecordKind::Environment)
        .count();
    assert_eq!(environment_samples, 5);

    let fixes = records
        .iter()
        .filter(|r| r.kind() == RecordKind::Fix)
        .count();
    // Sampling ran from the start gesture to the stop at t = 13.5 s.
    assert_eq!(fixes, 13);
}

/// Pausing and resuming must not split the ride into two sessions.
#[tokio::test(start_paused = true)]
async fn pause_and_resume_keep_one_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let gps = ScriptedSensor::new("gps")
        .then_ok_times(&gps_fix(50.94, 6.96), 100)
        .when_exhausted(Exhausted::Timeout);
    let environment = ScriptedSensor::new("environment").when_exhausted(Exhausted::Timeout);

    let input = ScriptedInput::new()
        .then_after(secs(0.5), Gesture::Left)
        .then_after(secs(2.6), Gesture::Up)
        .then_after(secs(2.0), Gesture::Up)
        .then_after(secs(2.0), Gesture::Right)
        .then_after(secs(1.0), Gesture::Down);

    engine::run(
        &config,
        EnginePorts {
            gps: Box::new(gps),
            environment: Box::new(environment),
            input: Box::new(input),
            led: Box::new(RecordingLed::new()),
        },
    )
    .await
    .unwrap();

    let store = SessionStore::open(dir.path()).unwrap();
    let sessions = store.list_sessions().unwrap();
    assert_eq!(sessions.len(), 1, "pausing must not open a second container");
    assert!(sessions[0].sealed);

    let (_, records) = store.read_session(&sessions[0].id).unwrap().unwrap();
    // Recording t=1..3 (three fixes), paused through t=3.1..5.1 (ticks 4
    // and 5 discarded), recording again t=6..7 (two fixes).
    assert_eq!(records.len(), 5);
}

/// Armed never persists anything: without a usable fix the acquisition
/// timeout stands the recorder down and no container is ever created.
#[tokio::test(start_paused = true)]
async fn armed_timeout_leaves_no_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.recorder.fix_timeout_secs = 5;

    let gps = ScriptedSensor::new("gps")
        .then_ok_times(&gps_no_fix(2), 100)
        .when_exhausted(Exhausted::Pend);
    let environment = ScriptedSensor::new("environment").when_exhausted(Exhausted::Timeout);

    let input = ScriptedInput::new()
        .then_after(secs(0.5), Gesture::Left)
        .then_after(secs(10.0), Gesture::Down);

    engine::run(
        &config,
        EnginePorts {
            gps: Box::new(gps),
            environment: Box::new(environment),
            input: Box::new(input),
            led: Box::new(RecordingLed::new()),
        },
    )
    .await
    .unwrap();

    let store = SessionStore::open(dir.path()).unwrap();
    assert!(store.list_sessions().unwrap().is_empty());
}

/// An unclean shutdown mid-ride loses nothing that completed an append:
/// the next startup seals the container from its last record.
#[tokio::test(start_paused = true)]
async fn unclean_shutdown_recovers_on_next_start() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let gps = ScriptedSensor::new("gps")
        .then_ok_times(&gps_fix(50.94, 6.96), 100)
        .when_exhausted(Exhausted::Timeout);
    let environment = ScriptedSensor::new("environment").when_exhausted(Exhausted::Timeout);

    // No stop gesture: the ride ends the way a service shutdown does.
    let input = ScriptedInput::new().then_after(secs(0.5), Gesture::Left);

    let config_clone = config.clone();
    let dir_path = dir.path().to_path_buf();

    // Drive the engine on a task and inject the terminate event by
    // closing it from the outside after a few simulated seconds.
    let engine_task = tokio::spawn(async move {
        engine::run(
            &config_clone,
            EnginePorts {
                gps: Box::new(gps),
                environment: Box::new(environment),
                input: Box::new(input),
                led: Box::new(RecordingLed::new()),
            },
        )
        .await
        .unwrap();
    });

    // Let a few fixes land, then kill the engine mid-ride. Real signal
    // plumbing cannot be faked, so this exercises the unclean-shutdown
    // path: no seal is written and recovery must repair the container.
    tokio::time::sleep(secs(4.5)).await;
    engine_task.abort();
    let _ = engine_task.await;

    // The store worker runs on a real thread and survives the abort just
    // long enough to drain its queue; give it real (not virtual) time.
    std::thread::sleep(Duration::from_millis(300));

    let store = SessionStore::open(&dir_path).unwrap();
    let report = store.recover().unwrap();
    assert_eq!(report.recovered.len(), 1);

    let sessions = store.list_sessions().unwrap();
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].sealed);
    let (_, records) = store.read_session(&sessions[0].id).unwrap().unwrap();
    assert!(!records.is_empty(), "fixes recorded before the crash survive");
}
