//! The store worker.
//!
//! Storage I/O runs on its own blocking task so a slow disk write never
//! delays the next sensor poll. The recorder talks to it through a
//! bounded command queue: `Begin` opens the active container, `Append`
//! writes one record, `Seal` closes the container. Commands are processed
//! strictly in order, which makes the seal command the cancellation
//! barrier — every append queued before it is flushed first.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::record::SessionRecord;
use crate::recorder::RecorderEvent;
use crate::session::Session;

use super::{SessionHandle, SessionStore, StorageError};

/// Commands accepted by the store worker.
#[derive(Debug)]
pub enum StoreCommand {
    /// Open a new container and make it the active session.
    Begin {
        /// The session to persist.
        session: Session,
    },
    /// Append one record to the active session.
    Append {
        /// The record to persist.
        record: SessionRecord,
    },
    /// Seal the active session.
    Seal {
        /// End timestamp to write into the trailer.
        ended_at: DateTime<Utc>,
    },
}

/// Cheap, cloneable handle for submitting store commands.
///
/// All submissions are non-blocking: a full queue surfaces as
/// [`StorageError::QueueFull`], which the recorder treats as a fault
/// rather than buffering records without bound.
#[derive(Debug, Clone)]
pub struct StoreClient {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreClient {
    /// Wrap a raw command sender.
    #[must_use]
    pub fn new(tx: mpsc::Sender<StoreCommand>) -> Self {
        Self { tx }
    }

    /// Submit a `Begin` command.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::QueueFull`] or [`StorageError::WorkerGone`].
    pub fn begin(&self, session: Session) -> Result<(), StorageError> {
        self.send(StoreCommand::Begin { session })
    }

    /// Submit an `Append` command.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::QueueFull`] or [`StorageError::WorkerGone`].
    pub fn append(&self, record: SessionRecord) -> Result<(), StorageError> {
        self.send(StoreCommand::Append { record })
    }

    /// Submit a `Seal` command.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::QueueFull`] or [`StorageError::WorkerGone`].
    pub fn seal(&self, ended_at: DateTime<Utc>) -> Result<(), StorageError> {
        self.send(StoreCommand::Seal { ended_at })
    }

    fn send(&self, command: StoreCommand) -> Result<(), StorageError> {
        self.tx.try_send(command).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => StorageError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => StorageError::WorkerGone,
        })
    }
}

/// Spawn the store worker on the blocking pool.
///
/// The worker owns the store and the active session handle. It drains its
/// queue until every [`StoreClient`] is dropped, then exits; worker-side
/// failures are reported into the recorder inbox as
/// [`RecorderEvent::StoreFault`].
#[must_use]
pub fn spawn_store_worker(
    store: SessionStore,
    queue_depth: usize,
    events: mpsc::Sender<RecorderEvent>,
) -> (StoreClient, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(queue_depth);
    let handle = tokio::task::spawn_blocking(move || run_worker(&store, rx, &events));
    (StoreClient::new(tx), handle)
}

fn run_worker(
    store: &SessionStore,
    mut rx: mpsc::Receiver<StoreCommand>,
    events: &mpsc::Sender<RecorderEvent>,
) {
    let mut active: Option<SessionHandle> = None;

    while let Some(command) = rx.blocking_recv() {
        match command {
            StoreCommand::Begin { session } => match store.begin_session(&session) {
                Ok(handle) => {
                    info!("recording into session '{}'", handle.id());
                    active = Some(handle);
                }
                Err(err) => report_fault(events, err),
            },
            StoreCommand::Append { record } => match active.as_mut() {
                Some(handle) => {
                    if let Err(err) = handle.append(&record) {
                        report_fault(events, err);
                    }
                }
                None => warn!("dropping record: no active session container"),
            },
            StoreCommand::Seal { ended_at } => match active.take() {
                Some(mut handle) => {
                    if let Err(err) = handle.seal(ended_at) {
                        report_fault(events, err);
                    }
                }
                None => warn!("seal requested with no active session container"),
            },
        }
    }

    if let Some(handle) = active {
        // The startup recovery scan will seal it from its last record.
        warn!("store worker exiting with open session '{}'", handle.id());
    }
}

fn report_fault(events: &mpsc::Sender<RecorderEvent>, err: StorageError) {
    error!("store fault: {err}");
    // The recorder may already be gone during shutdown; nothing to do then.
    let _ = events.blocking_send(RecorderEvent::StoreFault(err));
}
