//! Engine wiring: ports, channels, workers and the recorder loop.
//!
//! [`run`] is the single "run recorder" entry point the CLI blocks on. It
//! is generic over the four ports, so integration tests drive the exact
//! same code path with the deterministic fakes from [`crate::testing`].

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::ports::{InputPort, OutputPort, SensorPort};
use crate::recorder::{RecorderEvent, RecorderSettings, SessionRecorder};
use crate::scheduler::{spawn_sampling_task, PortSettings};
use crate::store::{spawn_store_worker, SessionStore};

/// Depth of the recorder's event inbox.
const EVENT_QUEUE_DEPTH: usize = 256;

/// The four ports the engine runs against.
pub struct EnginePorts {
    /// The GPS receiver.
    pub gps: Box<dyn SensorPort>,
    /// The environment/orientation package.
    pub environment: Box<dyn SensorPort>,
    /// The joystick.
    pub input: Box<dyn InputPort>,
    /// The LED matrix.
    pub led: Box<dyn OutputPort>,
}

impl std::fmt::Debug for EnginePorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnginePorts").finish_non_exhaustive()
    }
}

/// Run the recording engine until process termination.
///
/// Performs the startup recovery scan, wires the sampling tasks, input
/// pump, store worker and signal listener into the recorder's inbox, and
/// blocks until a terminate event (signal or gesture) ends the recorder
/// loop. The store queue is drained before returning, so every record
/// admitted before the final seal reaches the disk.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the recovery scan
/// fails; runtime faults are handled by the state machine instead.
pub async fn run(config: &Config, ports: EnginePorts) -> Result<()> {
    let store = SessionStore::open(config.data_dir())?;

    let report = store.recover()?;
    for id in &report.recovered {
        info!("sealed session '{id}' left open by a previous run");
    }
    for path in &report.quarantined {
        warn!("quarantined unreadable container {}", path.display());
    }

    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    let (sampling_tx, sampling_rx) = watch::channel(false);

    let (store_client, store_worker) =
        spawn_store_worker(store, config.storage.queue_depth, events_tx.clone());

    let gps_task = spawn_sampling_task(
        ports.gps,
        PortSettings::gps(config),
        sampling_rx.clone(),
        events_tx.clone(),
    );
    let environment_task = spawn_sampling_task(
        ports.environment,
        PortSettings::environment(config),
        sampling_rx,
        events_tx.clone(),
    );
    let input_task = spawn_input_pump(ports.input, events_tx.clone());
    let signal_task = spawn_signal_listener(events_tx);

    let recorder = SessionRecorder::new(
        store_client,
        ports.led,
        sampling_tx,
        RecorderSettings::from_config(config),
    );
    recorder.run(events_rx).await;

    // The recorder (and with it the only store client) is gone; the worker
    // drains whatever is still queued, then exits.
    gps_task.abort();
    environment_task.abort();
    input_task.abort();
    signal_task.abort();
    let _ = store_worker.await;

    info!("engine shut down");
    Ok(())
}

/// Forward gestures from the input port into the recorder inbox.
///
/// A disconnected device is reported once; operator control is then lost
/// for the rest of the process.
fn spawn_input_pump(
    mut input: Box<dyn InputPort>,
    events: mpsc::Sender<RecorderEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match input.next_gesture().await {
                Ok(gesture) => {
                    if events.send(RecorderEvent::Gesture(gesture)).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = events.send(RecorderEvent::InputLost(err)).await;
                    break;
                }
            }
        }
    })
}

/// Translate SIGINT/SIGTERM into a terminate event.
fn spawn_signal_listener(events: mpsc::Sender<RecorderEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        let _ = events.send(RecorderEvent::Terminate).await;
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    // Running as a service means SIGTERM is the usual way out.
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(err) => {
            warn!("cannot listen for SIGTERM: {err}");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
