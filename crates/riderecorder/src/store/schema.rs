//! `SQLite` schema for session containers.
//!
//! Every session lives in its own container file holding a key/value
//! `session` table (header and trailer) and an append-only `records`
//! table.

/// SQL statement to create the session header/trailer table.
pub const CREATE_SESSION_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS session (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// SQL statement to create the records table.
pub const CREATE_RECORDS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL
)
";

/// SQL statement to create an index on timestamp for ordered reads.
pub const CREATE_TIMESTAMP_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_records_timestamp ON records(timestamp)
";

/// SQL statement to create an index on kind for filtered reads.
pub const CREATE_KIND_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_records_kind ON records(kind)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_SESSION_TABLE,
    CREATE_RECORDS_TABLE,
    CREATE_TIMESTAMP_INDEX,
    CREATE_KIND_INDEX,
];

/// The current container schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Session table key for the schema version.
pub const KEY_SCHEMA_VERSION: &str = "schema_version";
/// Session table key for the session identifier.
pub const KEY_ID: &str = "id";
/// Session table key for the start timestamp (header).
pub const KEY_STARTED_AT: &str = "started_at";
/// Session table key for the end timestamp (trailer).
pub const KEY_ENDED_AT: &str = "ended_at";
/// Session table key for the sealed flag (trailer).
pub const KEY_SEALED: &str = "sealed";
