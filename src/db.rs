use std::sync::{Arc, Mutex};

use rusqlite::{params, Connection, Result};

use crate::error::AppError;
use crate::models::{ContextCount, Item, Session};

pub type DbPool = Arc<Mutex<Connection>>;

const ITEM_COLUMNS: &str =
    "id, text, notes, context, created, modified, done, deleted, hidden, pinned, last_modified";

pub fn init_db(path: &str) -> Result<DbPool> {
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn init_db_in_memory() -> Result<DbPool> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            created_at INTEGER DEFAULT (strftime('%s', 'now')),
            expires_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            notes TEXT,
            context TEXT,
            created INTEGER NOT NULL,
            modified INTEGER NOT NULL,
            done INTEGER,
            deleted INTEGER,
            hidden INTEGER,
            pinned INTEGER,
            last_modified INTEGER,
            dirty INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS sync_meta (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );
        ",
    )
}

fn row_to_item(row: &rusqlite::Row) -> Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        text: row.get(1)?,
        notes: row.get(2)?,
        context: row.get(3)?,
        created: row.get(4)?,
        modified: row.get(5)?,
        done: row.get(6)?,
        deleted: row.get(7)?,
        hidden: row.get(8)?,
        pinned: row.get(9)?,
        last_modified: row.get(10)?,
    })
}

// Session operations
pub fn create_session(pool: &DbPool, session: &Session) -> Result<(), AppError> {
    let conn = pool.lock().unwrap();
    conn.execute(
        "INSERT INTO sessions (id, expires_at) VALUES (?1, ?2)",
        (&session.id, session.expires_at),
    )?;
    Ok(())
}

pub fn get_session(pool: &DbPool, id: &str) -> Result<Option<Session>, AppError> {
    let conn = pool.lock().unwrap();
    let mut stmt = conn.prepare("SELECT id, created_at, expires_at FROM sessions WHERE id = ?1")?;
    let mut rows = stmt.query([id])?;

    if let Some(row) = rows.next()? {
        Ok(Some(Session {
            id: row.get(0)?,
            created_at: row.get(1)?,
            expires_at: row.get(2)?,
        }))
    } else {
        Ok(None)
    }
}

pub fn delete_session(pool: &DbPool, id: &str) -> Result<(), AppError> {
    let conn = pool.lock().unwrap();
    conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
    Ok(())
}

pub fn cleanup_expired_sessions(pool: &DbPool) -> Result<(), AppError> {
    let conn = pool.lock().unwrap();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    conn.execute("DELETE FROM sessions WHERE expires_at < ?1", [now])?;
    Ok(())
}

// Item operations
pub fn list_items(pool: &DbPool) -> Result<Vec<Item>, AppError> {
    let conn = pool.lock().unwrap();
    let mut stmt = conn.prepare(&format!(
        "SELECT {ITEM_COLUMNS} FROM items ORDER BY created DESC"
    ))?;
    let items = stmt
        .query_map([], row_to_item)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn get_item(pool: &DbPool, id: &str) -> Result<Option<Item>, AppError> {
    let conn = pool.lock().unwrap();
    let mut stmt = conn.prepare(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"))?;
    let mut rows = stmt.query([id])?;

    if let Some(row) = rows.next()? {
        Ok(Some(row_to_item(row)?))
    } else {
        Ok(None)
    }
}

pub fn insert_item(pool: &DbPool, item: &Item) -> Result<(), AppError> {
    let conn = pool.lock().unwrap();
    conn.execute(
        &format!("INSERT INTO items ({ITEM_COLUMNS}, dirty) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1)"),
        params![
            item.id,
            item.text,
            item.notes,
            item.context,
            item.created,
            item.modified,
            item.done,
            item.deleted,
            item.hidden,
            item.pinned,
            item.last_modified,
        ],
    )?;
    Ok(())
}

/// Persists the full record and marks it pending for the next sync push.
pub fn update_item(pool: &DbPool, item: &Item) -> Result<bool, AppError> {
    let conn = pool.lock().unwrap();
    let rows = conn.execute(
        "UPDATE items SET text = ?2, notes = ?3, context = ?4, modified = ?5,
            done = ?6, deleted = ?7, hidden = ?8, pinned = ?9, dirty = 1
         WHERE id = ?1",
        params![
            item.id,
            item.text,
            item.notes,
            item.context,
            item.modified,
            item.done,
            item.deleted,
            item.hidden,
            item.pinned,
        ],
    )?;
    Ok(rows > 0)
}

/// Idempotent upsert for externally-sourced records. Keeps the foreign id
/// and revision, and marks the record clean (it came from the server).
pub fn import_item(pool: &DbPool, item: &Item) -> Result<(), AppError> {
    let conn = pool.lock().unwrap();
    conn.execute(
        &format!("INSERT OR REPLACE INTO items ({ITEM_COLUMNS}, dirty) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0)"),
        params![
            item.id,
            item.text,
            item.notes,
            item.context,
            item.created,
            item.modified,
            item.done,
            item.deleted,
            item.hidden,
            item.pinned,
            item.last_modified,
        ],
    )?;
    Ok(())
}

/// Items changed locally since the last successful push.
pub fn dirty_items(pool: &DbPool) -> Result<Vec<Item>, AppError> {
    let conn = pool.lock().unwrap();
    let mut stmt = conn.prepare(&format!(
        "SELECT {ITEM_COLUMNS} FROM items WHERE dirty = 1 ORDER BY created DESC"
    ))?;
    let items = stmt
        .query_map([], row_to_item)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn mark_synced(pool: &DbPool, id: &str, last_modified: Option<i64>) -> Result<(), AppError> {
    let conn = pool.lock().unwrap();
    conn.execute(
        "UPDATE items SET dirty = 0, last_modified = ?2 WHERE id = ?1",
        params![id, last_modified],
    )?;
    Ok(())
}

pub fn clear_items(pool: &DbPool) -> Result<(), AppError> {
    let conn = pool.lock().unwrap();
    conn.execute("DELETE FROM items", [])?;
    conn.execute("DELETE FROM sync_meta WHERE key = 'last_sync'", [])?;
    Ok(())
}

/// Clean slate: hide everything that is visible and not pinned. Returns the
/// number of items hidden; all of them share the batch timestamp.
pub fn hide_unpinned(pool: &DbPool, batch: i64) -> Result<usize, AppError> {
    let conn = pool.lock().unwrap();
    let rows = conn.execute(
        "UPDATE items SET hidden = ?1, dirty = 1
         WHERE hidden IS NULL AND pinned IS NULL AND deleted IS NULL",
        [batch],
    )?;
    Ok(rows)
}

/// Un-hides the given clean-slate batch, or every hidden item when no batch
/// timestamp is tracked.
pub fn unhide(pool: &DbPool, batch: Option<i64>) -> Result<usize, AppError> {
    let conn = pool.lock().unwrap();
    let rows = match batch {
        Some(batch) => conn.execute(
            "UPDATE items SET hidden = NULL, dirty = 1 WHERE hidden = ?1",
            [batch],
        )?,
        None => conn.execute(
            "UPDATE items SET hidden = NULL, dirty = 1 WHERE hidden IS NOT NULL",
            [],
        )?,
    };
    Ok(rows)
}

/// Aggregates non-deleted items by context, lexicographically. Items with
/// no context land in the "" bucket.
pub fn context_summary(pool: &DbPool) -> Result<Vec<ContextCount>, AppError> {
    let conn = pool.lock().unwrap();
    let mut stmt = conn.prepare(
        "SELECT COALESCE(context, '') AS name, COUNT(*) FROM items
         WHERE deleted IS NULL GROUP BY name ORDER BY name",
    )?;
    let counts = stmt
        .query_map([], |row| {
            Ok(ContextCount {
                name: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(counts)
}

// Sync bookkeeping
pub fn last_sync(pool: &DbPool) -> Result<Option<i64>, AppError> {
    let conn = pool.lock().unwrap();
    let mut stmt = conn.prepare("SELECT value FROM sync_meta WHERE key = 'last_sync'")?;
    let mut rows = stmt.query([])?;
    if let Some(row) = rows.next()? {
        Ok(Some(row.get(0)?))
    } else {
        Ok(None)
    }
}

pub fn set_last_sync(pool: &DbPool, value: i64) -> Result<(), AppError> {
    let conn = pool.lock().unwrap();
    conn.execute(
        "INSERT OR REPLACE INTO sync_meta (key, value) VALUES ('last_sync', ?1)",
        [value],
    )?;
    Ok(())
}

/// Forgets everything we knew about the server's revision history. Used
/// when the remote collection was flushed out-of-band: every item becomes
/// pending again and loses its stale revision.
pub fn reset_sync_state(pool: &DbPool) -> Result<(), AppError> {
    let conn = pool.lock().unwrap();
    conn.execute("DELETE FROM sync_meta WHERE key = 'last_sync'", [])?;
    conn.execute("UPDATE items SET dirty = 1, last_modified = NULL", [])?;
    Ok(())
}
