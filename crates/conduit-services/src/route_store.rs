//! Route bookkeeping — which identifiers this instance has relayed, their
//! digest, and when they were last seen.
//!
//! Every write is a full overwrite keyed by identifier, so concurrent writes
//! for different identifiers never conflict and writes for the same
//! identifier resolve last-write-wins. The relay never reads these records;
//! reads exist for operators and tests.
//!
//! Both stores can be capped. Once a store holds more than `max_routes`
//! records it evicts the least recently seen until a tenth of the cap is
//! free again.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use conduit_core::{Digest, Identifier};

/// One bookkeeping record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteState {
    pub id: Identifier,
    pub digest: Digest,
    /// Unix timestamp in milliseconds.
    pub last_seen: u64,
}

impl RouteState {
    /// Record stamped with the current wall-clock time.
    pub fn seen_now(id: Identifier, digest: Digest) -> Self {
        Self {
            id,
            digest,
            last_seen: now_millis(),
        }
    }
}

pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Records kept after an eviction pass over a store capped at `max_routes`.
fn retain_after_eviction(max_routes: usize) -> usize {
    max_routes - max_routes / 10
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("route store unavailable: {0}")]
    Unavailable(String),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt route record for {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Upsert-only document store for route records.
pub trait RouteStore: Send + Sync {
    /// Insert or fully replace the record for `state.id`.
    fn upsert(&self, state: &RouteState) -> Result<(), StoreError>;

    fn get(&self, id: &Identifier) -> Result<Option<RouteState>, StoreError>;

    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────────

/// In-memory route store.
#[derive(Clone, Default)]
pub struct MemoryRouteStore {
    routes: Arc<DashMap<Identifier, RouteState>>,
    /// 0 = unbounded.
    max_routes: usize,
}

impl MemoryRouteStore {
    pub fn new() -> Self {
        Self {
            routes: Arc::new(DashMap::new()),
            max_routes: 0,
        }
    }

    /// Cap the number of records. 0 = unbounded.
    pub fn with_max_routes(mut self, max_routes: usize) -> Self {
        self.max_routes = max_routes;
        self
    }

    fn evict_oldest(&self) {
        let keep = retain_after_eviction(self.max_routes);
        let mut seen: Vec<(u64, Identifier)> = self
            .routes
            .iter()
            .map(|r| (r.value().last_seen, r.key().clone()))
            .collect();
        if seen.len() <= keep {
            return;
        }
        let excess = seen.len() - keep;
        seen.select_nth_unstable(excess - 1);
        for (_, id) in &seen[..excess] {
            self.routes.remove(id);
        }
    }
}

impl RouteStore for MemoryRouteStore {
    fn upsert(&self, state: &RouteState) -> Result<(), StoreError> {
        self.routes.insert(state.id.clone(), state.clone());
        if self.max_routes > 0 && self.routes.len() > self.max_routes {
            self.evict_oldest();
        }
        Ok(())
    }

    fn get(&self, id: &Identifier) -> Result<Option<RouteState>, StoreError> {
        Ok(self.routes.get(id).map(|r| r.value().clone()))
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.routes.len())
    }
}

// ── SQLite ────────────────────────────────────────────────────────────────────

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS routes (
        id        TEXT PRIMARY KEY NOT NULL,
        digest    TEXT NOT NULL,
        last_seen INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS routes_last_seen ON routes (last_seen);
";

/// Durable route store backed by a single SQLite file.
pub struct SqliteRouteStore {
    db: Mutex<Db>,
    /// 0 = unbounded.
    max_routes: usize,
}

struct Db {
    conn: Connection,
    /// Row count, kept in step with every insert and eviction.
    rows: usize,
}

impl SqliteRouteStore {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("{}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Cap the number of rows. 0 = unbounded. An over-full database from an
    /// earlier run is trimmed on the next insert.
    pub fn with_max_routes(mut self, max_routes: usize) -> Self {
        self.max_routes = max_routes;
        self
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        let rows = count_rows(&conn)?;
        Ok(Self {
            db: Mutex::new(Db { conn, rows }),
            max_routes: 0,
        })
    }

    fn evict_oldest(&self, db: &mut Db) -> Result<(), StoreError> {
        let excess = db.rows.saturating_sub(retain_after_eviction(self.max_routes));
        if excess == 0 {
            return Ok(());
        }
        let removed = db.conn.execute(
            "DELETE FROM routes WHERE id IN (
                 SELECT id FROM routes ORDER BY last_seen ASC, rowid ASC LIMIT ?1
             )",
            params![excess as i64],
        )?;
        db.rows = db.rows.saturating_sub(removed);
        Ok(())
    }
}

fn count_rows(conn: &Connection) -> Result<usize, StoreError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM routes", [], |row| row.get(0))?;
    Ok(count.max(0) as usize)
}

impl RouteStore for SqliteRouteStore {
    fn upsert(&self, state: &RouteState) -> Result<(), StoreError> {
        let mut db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        let known = db
            .conn
            .query_row(
                "SELECT 1 FROM routes WHERE id = ?1",
                params![state.id.as_str()],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        db.conn.execute(
            "INSERT INTO routes (id, digest, last_seen) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                 digest = excluded.digest,
                 last_seen = excluded.last_seen",
            params![
                state.id.as_str(),
                state.digest.to_hex(),
                state.last_seen as i64
            ],
        )?;
        if !known {
            db.rows += 1;
        }
        if self.max_routes > 0 && db.rows > self.max_routes {
            self.evict_oldest(&mut db)?;
        }
        Ok(())
    }

    fn get(&self, id: &Identifier) -> Result<Option<RouteState>, StoreError> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        let row = db
            .conn
            .query_row(
                "SELECT digest, last_seen FROM routes WHERE id = ?1",
                params![id.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        let Some((digest, last_seen)) = row else {
            return Ok(None);
        };
        let digest = digest.parse::<Digest>().map_err(|e| StoreError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(RouteState {
            id: id.clone(),
            digest,
            last_seen: last_seen.max(0) as u64,
        }))
    }

    fn len(&self) -> Result<usize, StoreError> {
        let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
        count_rows(&db.conn)
    }
}
