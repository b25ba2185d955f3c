//! SQLite implementation of `StateRepository`.
//!
//! The queue state is one JSON row in `kv_state`, next to a `version`
//! counter that every successful save bumps. The server and the operator CLI
//! may open the same file; the version check in `save` is what keeps them
//! from losing each other's writes.
//!
//! # Migrations
//!
//! `schema_version` holds the last applied step. Add a step to
//! `run_migrations()` and bump `CURRENT_SCHEMA_VERSION` to change the layout.
//! New `AssignmentState` fields need `#[serde(default)]` so older rows decode.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reviewer_queue_core::AssignmentState;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use super::{RepositoryError, StateRepository, StoredState, STATE_KEY};

/// 1: `kv_state`. 2: `kv_state.version` for optimistic writes.
const CURRENT_SCHEMA_VERSION: i64 = 2;

/// Milliseconds a writer waits for the other process to release the file.
const BUSY_TIMEOUT_MS: u32 = 5000;

/// SQLite-backed state repository.
///
/// rusqlite is synchronous, so every operation runs on the blocking pool via
/// `tokio::task::spawn_blocking`.
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
    conn.lock()
        .map_err(|_| RepositoryError::storage("lock connection", "connection mutex poisoned"))
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The state file holds who reviewed what; keep it private to the service user.
#[cfg(unix)]
fn restrict_to_owner(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        warn!("Could not make {} owner-only: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) {}

/// WAL lets `stats` read while the server writes. Some network filesystems
/// refuse it without an error, so the mode SQLite reports back is checked.
fn configure(conn: &Connection, in_memory: bool) -> Result<(), RepositoryError> {
    let mode: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .map_err(|e| RepositoryError::storage("enable WAL", e.to_string()))?;

    let expected = if in_memory { "memory" } else { "wal" };
    if !mode.eq_ignore_ascii_case(expected) {
        return Err(RepositoryError::storage(
            "enable WAL",
            format!(
                "journal mode stayed '{}'; put STATE_DIR on a local disk",
                mode
            ),
        ));
    }

    conn.execute_batch(&format!(
        "PRAGMA synchronous = FULL; PRAGMA busy_timeout = {};",
        BUSY_TIMEOUT_MS
    ))
    .map_err(|e| RepositoryError::storage("set pragmas", e.to_string()))
}

fn applied_schema_version(conn: &Connection) -> Result<i64, RepositoryError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
             id INTEGER PRIMARY KEY CHECK (id = 1),
             version INTEGER NOT NULL
         );",
    )
    .map_err(|e| RepositoryError::storage("read schema version", e.to_string()))?;

    let version: Option<i64> = conn
        .query_row("SELECT version FROM schema_version WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()
        .map_err(|e| RepositoryError::storage("read schema version", e.to_string()))?;

    Ok(version.unwrap_or(0))
}

impl SqliteRepository {
    /// Open the state database at `path`, creating the file and its
    /// directory on first use, and migrate it to the current layout.
    ///
    /// Writes use `synchronous = FULL`: once a reviewer has been asked, the
    /// rotation step that picked them is on disk.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        let in_memory = path.as_os_str() == ":memory:";

        if !in_memory {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(|e| {
                    RepositoryError::storage("create state directory", format!("{}: {}", dir.display(), e))
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|e| {
            RepositoryError::storage("open state database", format!("{}: {}", path.display(), e))
        })?;

        if !in_memory {
            restrict_to_owner(path);
        }

        configure(&conn, in_memory)?;
        let applied = applied_schema_version(&conn)?;
        Self::run_migrations(&conn, applied)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// A private in-memory database; nothing touches disk.
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "state database is at schema {} but this build only knows up to {}",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS kv_state (
                     key TEXT PRIMARY KEY,
                     value_json TEXT NOT NULL,
                     updated_at INTEGER NOT NULL
                 );",
            )
            .map_err(|e| RepositoryError::storage("migrate to schema 1", e.to_string()))?;
        }

        if from_version < 2 {
            // Rows written before versioning count as the first save.
            conn.execute_batch("ALTER TABLE kv_state ADD COLUMN version INTEGER NOT NULL DEFAULT 1;")
                .map_err(|e| RepositoryError::storage("migrate to schema 2", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("record schema version", e.to_string()))?;

        debug!(
            "Migrated state database from schema {} to {}",
            from_version, CURRENT_SCHEMA_VERSION
        );
        Ok(())
    }
}

#[async_trait]
impl StateRepository for SqliteRepository {
    async fn load(&self) -> Result<StoredState, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            let row: Option<(String, i64)> = conn
                .query_row(
                    "SELECT value_json, version FROM kv_state WHERE key = ?1",
                    params![STATE_KEY],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(|e| RepositoryError::storage("load", e.to_string()))?;

            let Some((json, version)) = row else {
                return Ok(StoredState::default());
            };

            let state = serde_json::from_str(&json)
                .map_err(|_| RepositoryError::corruption("queue state JSON"))?;
            let version =
                u64::try_from(version).map_err(|_| RepositoryError::corruption("state version"))?;
            Ok(StoredState { state, version })
        })
        .await
        .map_err(|e| RepositoryError::storage("load", e.to_string()))?
    }

    async fn save(
        &self,
        state: &AssignmentState,
        expected_version: u64,
    ) -> Result<u64, RepositoryError> {
        let conn = self.conn.clone();
        let state_json = serde_json::to_string(state)
            .map_err(|e| RepositoryError::storage("serialize state", e.to_string()))?;
        let expected = i64::try_from(expected_version)
            .map_err(|_| RepositoryError::storage("save", "version out of range"))?;
        let updated_at = now_secs();

        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;

            // Each statement is atomic, so between processes exactly one
            // writer can move the row off `expected`.
            let changed = if expected == 0 {
                conn.execute(
                    "INSERT INTO kv_state (key, value_json, updated_at, version)
                     VALUES (?1, ?2, ?3, 1)
                     ON CONFLICT(key) DO NOTHING",
                    params![STATE_KEY, state_json, updated_at],
                )
            } else {
                conn.execute(
                    "UPDATE kv_state
                     SET value_json = ?2, updated_at = ?3, version = version + 1
                     WHERE key = ?1 AND version = ?4",
                    params![STATE_KEY, state_json, updated_at, expected],
                )
            }
            .map_err(|e| RepositoryError::storage("save", e.to_string()))?;

            if changed == 0 {
                return Err(RepositoryError::Conflict {
                    expected: expected_version,
                });
            }
            Ok(expected_version + 1)
        })
        .await
        .map_err(|e| RepositoryError::storage("save", e.to_string()))?
    }
}
