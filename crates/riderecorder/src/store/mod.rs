//! Durable session storage.
//!
//! Every session is persisted in its own `SQLite` container file under the
//! data directory: a `session` key/value table carries the header (id,
//! start time) and trailer (end time, sealed flag), and an append-only
//! `records` table carries the typed record stream. Each append is a
//! single `SQLite` transaction, which gives the store its central
//! invariant: a crash mid-append leaves either the previous complete
//! record or the new one, never a torn partial record.

pub mod schema;
pub mod worker;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::record::SessionRecord;
use crate::session::{Session, SessionId};

pub use worker::{spawn_store_worker, StoreClient, StoreCommand};

/// File extension of session containers.
pub const SESSION_FILE_EXT: &str = "ride";

/// Suffix of the sidecar marker flagging a quarantined container.
const QUARANTINE_SUFFIX: &str = ".quarantined";

/// Errors produced by the storage layer.
///
/// Storage failures are fatal to the current session (they drive the
/// recorder into its Faulted state) but never to the process.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to open or create a session container.
    #[error("failed to open session container {path}: {source}")]
    Open {
        /// Path to the container file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// Failed to create the data directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to read the data directory.
    #[error("failed to read data directory {path}: {source}")]
    DirectoryRead {
        /// Path that couldn't be read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A storage query failed.
    #[error("storage query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// Failed to encode a record payload.
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    /// The session has been sealed and accepts no further records.
    #[error("session '{id}' is sealed")]
    Sealed {
        /// Identifier of the sealed session.
        id: SessionId,
    },

    /// The container header or trailer is missing or invalid.
    #[error("invalid session container {path}: {message}")]
    Invalid {
        /// Path to the container file.
        path: PathBuf,
        /// What is wrong with it.
        message: String,
    },

    /// The store worker's command queue is full.
    #[error("store queue is full")]
    QueueFull,

    /// The store worker is no longer running.
    #[error("store worker is gone")]
    WorkerGone,
}

/// Outcome of the startup recovery scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Sessions that were left open and have been sealed.
    pub recovered: Vec<String>,
    /// Containers that could not be repaired and were flagged.
    pub quarantined: Vec<PathBuf>,
}

impl RecoveryReport {
    /// Whether the scan found nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recovered.is_empty() && self.quarantined.is_empty()
    }
}

/// Summary of one stored session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub id: String,
    /// When recording started.
    pub started_at: DateTime<Utc>,
    /// When the session was sealed; absent for a still-open container.
    pub ended_at: Option<DateTime<Utc>>,
    /// Whether the session is sealed.
    pub sealed: bool,
    /// Number of persisted records.
    pub records: u64,
    /// Path of the container file.
    pub path: PathBuf,
}

/// Parsed header/trailer of a container.
#[derive(Debug)]
struct Header {
    id: String,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    sealed: bool,
}

/// Append-only store of session containers under one data directory.
#[derive(Debug)]
pub struct SessionStore {
    /// Directory holding the session containers.
    data_dir: PathBuf,
}

impl SessionStore {
    /// Open a store rooted at the given data directory, creating it if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).map_err(|source| StorageError::DirectoryCreate {
                path: data_dir.clone(),
                source,
            })?;
        }
        debug!("session store opened at {}", data_dir.display());
        Ok(Self { data_dir })
    }

    /// The data directory this store works in.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the container file for a session identifier.
    #[must_use]
    pub fn container_path(&self, id: &str) -> PathBuf {
        self.data_dir.join(format!("{id}.{SESSION_FILE_EXT}"))
    }

    /// Create a new durable container for the given session.
    ///
    /// If a container with the same identifier already exists (two sessions
    /// started within the same second), a numeric suffix is appended; the
    /// returned handle carries the identifier actually used.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the medium is unavailable or the
    /// header cannot be written.
    pub fn begin_session(&self, session: &Session) -> Result<SessionHandle, StorageError> {
        let mut id = session.id.clone();
        let mut path = self.container_path(id.as_str());
        let mut attempt = 1;
        while path.exists() {
            id = SessionId::new(format!("{}-{attempt}", session.id));
            path = self.container_path(id.as_str());
            attempt += 1;
        }

        let conn = open_container(&path, OpenFlags::default())?;
        for statement in schema::SCHEMA_STATEMENTS {
            conn.execute(statement, [])?;
        }

        write_value(&conn, schema::KEY_SCHEMA_VERSION, &schema::CURRENT_VERSION.to_string())?;
        write_value(&conn, schema::KEY_ID, id.as_str())?;
        write_value(&conn, schema::KEY_STARTED_AT, &format_ts(session.started_at))?;
        write_value(&conn, schema::KEY_SEALED, "false")?;

        info!("new session container {}", path.display());
        Ok(SessionHandle {
            id,
            path,
            conn,
            sealed: false,
        })
    }

    /// Scan for sessions left open by a previous process instance.
    ///
    /// Open containers are sealed with the timestamp of their last valid
    /// record (or the header start time if they hold none) — a power loss
    /// mid-ride yields a truncated-but-valid ride. Containers that cannot
    /// be read are quarantined: flagged with a sidecar marker, left
    /// untouched, and skipped from then on.
    ///
    /// # Errors
    ///
    /// Returns an error only if the data directory itself cannot be read;
    /// per-container damage is reported through the [`RecoveryReport`].
    pub fn recover(&self) -> Result<RecoveryReport, StorageError> {
        let mut report = RecoveryReport::default();

        for path in self.container_files()? {
            if is_quarantined(&path) {
                debug!("skipping quarantined container {}", path.display());
                continue;
            }

            let outcome = Self::recover_container(&path);
            match outcome {
                Ok(Some(id)) => report.recovered.push(id),
                Ok(None) => {}
                Err(err) => quarantine(&path, &err.to_string(), &mut report),
            }
        }

        if !report.is_empty() {
            info!(
                "recovery: {} sealed, {} quarantined",
                report.recovered.len(),
                report.quarantined.len()
            );
        }
        Ok(report)
    }

    /// Seal one open container; returns its id, or `None` if already sealed.
    fn recover_container(path: &Path) -> Result<Option<String>, StorageError> {
        let conn = open_container(path, OpenFlags::SQLITE_OPEN_READ_WRITE)?;
        let header = read_header(&conn, path)?;
        if header.sealed {
            return Ok(None);
        }

        let last: Option<String> = conn
            .query_row("SELECT MAX(timestamp) FROM records", [], |row| row.get(0))
            .optional()?
            .flatten();
        let ended_at = match last {
            Some(raw) => parse_ts(&raw, path)?,
            None => header.started_at,
        };

        let mut handle = SessionHandle {
            id: SessionId::new(header.id.clone()),
            path: path.to_path_buf(),
            conn,
            sealed: false,
        };
        handle.seal(ended_at)?;
        info!("recovered session '{}' (sealed at {ended_at})", header.id);
        Ok(Some(header.id))
    }

    /// List all readable sessions, ordered by identifier.
    ///
    /// Quarantined or unreadable containers are skipped with a warning;
    /// listing never opens a container for writing.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be read.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>, StorageError> {
        let mut sessions = Vec::new();

        for path in self.container_files()? {
            if is_quarantined(&path) {
                continue;
            }
            match read_summary(&path) {
                Ok(summary) => sessions.push(summary),
                Err(err) => warn!("skipping unreadable container {}: {err}", path.display()),
            }
        }

        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sessions)
    }

    /// Read one session's summary and its ordered record stream.
    ///
    /// Returns `None` if no container exists for the identifier. Records
    /// are ordered by timestamp, with insertion order as the tie-break.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the container cannot be read.
    pub fn read_session(
        &self,
        id: &str,
    ) -> Result<Option<(SessionSummary, Vec<SessionRecord>)>, StorageError> {
        let path = self.container_path(id);
        if !path.exists() {
            return Ok(None);
        }

        let conn = open_container(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let summary = summary_from(&conn, &path)?;

        let mut stmt = conn.prepare("SELECT payload FROM records ORDER BY timestamp ASC, id ASC")?;
        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(payloads.len());
        for payload in payloads {
            match serde_json::from_str::<SessionRecord>(&payload) {
                Ok(record) => records.push(record),
                Err(err) => warn!("skipping undecodable record in '{id}': {err}"),
            }
        }

        Ok(Some((summary, records)))
    }

    /// All container files in the data directory.
    fn container_files(&self) -> Result<Vec<PathBuf>, StorageError> {
        let entries = fs::read_dir(&self.data_dir).map_err(|source| {
            StorageError::DirectoryRead {
                path: self.data_dir.clone(),
                source,
            }
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext == SESSION_FILE_EXT)
            })
            .collect();
        paths.sort();
        Ok(paths)
    }
}

/// Write handle to one open session container.
///
/// There is exactly one writer per session by construction: the store
/// worker owns the handle of the active session.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    path: PathBuf,
    conn: Connection,
    sealed: bool,
}

impl SessionHandle {
    /// The identifier this container was created under.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Path of the container file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    ///
    /// Each append is atomic with respect to process crash.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Sealed`] after sealing, or the underlying
    /// storage error on I/O failure.
    pub fn append(&mut self, record: &SessionRecord) -> Result<(), StorageError> {
        if self.sealed {
            return Err(StorageError::Sealed {
                id: self.id.clone(),
            });
        }

        let payload = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT INTO records (timestamp, kind, payload) VALUES (?1, ?2, ?3)",
            params![
                format_ts(record.timestamp()),
                record.kind().to_string(),
                payload
            ],
        )?;
        Ok(())
    }

    /// Write the trailer and close the session to further records.
    ///
    /// Idempotent: sealing an already-sealed session returns the original
    /// end timestamp without touching the container.
    ///
    /// # Errors
    ///
    /// Returns the underlying storage error on I/O failure.
    pub fn seal(&mut self, ended_at: DateTime<Utc>) -> Result<DateTime<Utc>, StorageError> {
        if let Some(existing) = self.existing_seal()? {
            self.sealed = true;
            debug!("session '{}' already sealed at {existing}", self.id);
            return Ok(existing);
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO session (key, value) VALUES (?1, ?2)",
            params![schema::KEY_ENDED_AT, format_ts(ended_at)],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO session (key, value) VALUES (?1, ?2)",
            params![schema::KEY_SEALED, "true"],
        )?;
        tx.commit()?;

        self.sealed = true;
        info!("session '{}' sealed at {ended_at}", self.id);
        Ok(ended_at)
    }

    /// The persisted end timestamp, if the container is already sealed.
    fn existing_seal(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        if read_value(&self.conn, schema::KEY_SEALED)?.as_deref() != Some("true") {
            return Ok(None);
        }
        match read_value(&self.conn, schema::KEY_ENDED_AT)? {
            Some(raw) => Ok(Some(parse_ts(&raw, &self.path)?)),
            None => Err(StorageError::Invalid {
                path: self.path.clone(),
                message: "sealed without an end timestamp".to_string(),
            }),
        }
    }
}

/// Open a container file with the given flags.
fn open_container(path: &Path, flags: OpenFlags) -> Result<Connection, StorageError> {
    let conn = Connection::open_with_flags(path, flags).map_err(|source| StorageError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    // WAL keeps appends cheap; reads of sealed sessions are unaffected.
    if !flags.contains(OpenFlags::SQLITE_OPEN_READ_ONLY) {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|source| StorageError::Open {
                path: path.to_path_buf(),
                source,
            })?;
    }
    Ok(conn)
}

/// Write one key/value pair into the session table.
fn write_value(conn: &Connection, key: &str, value: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT OR REPLACE INTO session (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

/// Read one value from the session table.
fn read_value(conn: &Connection, key: &str) -> Result<Option<String>, StorageError> {
    let value = conn
        .query_row("SELECT value FROM session WHERE key = ?1", [key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value)
}

/// Read and validate the container header and trailer.
fn read_header(conn: &Connection, path: &Path) -> Result<Header, StorageError> {
    let id = read_value(conn, schema::KEY_ID)?.ok_or_else(|| StorageError::Invalid {
        path: path.to_path_buf(),
        message: "missing session id".to_string(),
    })?;
    let started_raw =
        read_value(conn, schema::KEY_STARTED_AT)?.ok_or_else(|| StorageError::Invalid {
            path: path.to_path_buf(),
            message: "missing start timestamp".to_string(),
        })?;
    let started_at = parse_ts(&started_raw, path)?;
    let sealed = read_value(conn, schema::KEY_SEALED)?.as_deref() == Some("true");
    let ended_at = match read_value(conn, schema::KEY_ENDED_AT)? {
        Some(raw) => Some(parse_ts(&raw, path)?),
        None => None,
    };

    Ok(Header {
        id,
        started_at,
        ended_at,
        sealed,
    })
}

/// Build a summary for a container that is already open.
fn summary_from(conn: &Connection, path: &Path) -> Result<SessionSummary, StorageError> {
    let header = read_header(conn, path)?;
    let records: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;

    Ok(SessionSummary {
        id: header.id,
        started_at: header.started_at,
        ended_at: header.ended_at,
        sealed: header.sealed,
        records: u64::try_from(records).unwrap_or(0),
        path: path.to_path_buf(),
    })
}

/// Open a container read-only and build its summary.
fn read_summary(path: &Path) -> Result<SessionSummary, StorageError> {
    let conn = open_container(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    summary_from(&conn, path)
}

/// Uniform timestamp encoding: fixed-width RFC 3339 so that lexicographic
/// order in the database matches chronological order.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
fn parse_ts(raw: &str, path: &Path) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| StorageError::Invalid {
            path: path.to_path_buf(),
            message: format!("bad timestamp '{raw}': {err}"),
        })
}

/// Path of the quarantine marker for a container.
fn quarantine_marker(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(QUARANTINE_SUFFIX);
    PathBuf::from(name)
}

/// Whether a container has been flagged as quarantined.
fn is_quarantined(path: &Path) -> bool {
    quarantine_marker(path).exists()
}

/// Flag a container as quarantined without touching its bytes.
fn quarantine(path: &Path, reason: &str, report: &mut RecoveryReport) {
    let marker = quarantine_marker(path);
    if let Err(err) = fs::write(&marker, reason) {
        warn!("failed to write quarantine marker {}: {err}", marker.display());
    }
    warn!("quarantined session container {}: {reason}", path.display());
    report.quarantined.push(path.to_path_buf());
}
