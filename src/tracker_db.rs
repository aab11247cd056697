use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use std::path::Path;
#[cfg(feature = "desktop")]
use std::path::PathBuf;
#[cfg(feature = "desktop")]
use tauri::{AppHandle, Manager};

use crate::tracker_store::{ACCOUNTS_SLOT, WINDOWS_SLOT};

#[cfg(feature = "desktop")]
const DEFAULT_TRACKER_DB_RELATIVE_PATH: &str = "tracker/tracker.db";

const MIGRATIONS: &[(&str, &str)] = &[(
    "0001_init.sql",
    include_str!("../db/migrations/0001_init.sql"),
)];

const TRACKED_SLOTS: [&str; 2] = [ACCOUNTS_SLOT, WINDOWS_SLOT];

#[derive(Debug, Serialize)]
pub struct SlotSummary {
    pub slot: String,
    pub bytes: i64,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct TrackerDbStatus {
    pub db_path: String,
    pub exists: bool,
    pub schema_version: Option<String>,
    pub pending_versions: Vec<String>,
    pub slots: Vec<SlotSummary>,
    pub missing_slots: Vec<String>,
    pub ready: bool,
}

#[cfg(feature = "desktop")]
pub(crate) fn resolve_tracker_db_path(app: &AppHandle) -> Result<PathBuf, String> {
    let base = app
        .path()
        .app_local_data_dir()
        .map_err(|e| format!("cannot resolve app_local_data_dir: {e}"))?;
    Ok(base.join(DEFAULT_TRACKER_DB_RELATIVE_PATH))
}

fn has_table(conn: &Connection, table: &str) -> Result<bool, String> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n > 0)
    .map_err(|e| format!("failed to inspect database tables: {e}"))
}

fn applied_versions(conn: &Connection) -> Result<Vec<String>, String> {
    if !has_table(conn, "schema_migrations")? {
        return Ok(Vec::new());
    }
    let mut stmt = conn
        .prepare("SELECT version FROM schema_migrations ORDER BY version")
        .map_err(|e| format!("failed to read schema_migrations: {e}"))?;
    let versions = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(|e| format!("failed to read schema_migrations: {e}"));
    versions
}

fn pending_migrations(applied: &[String]) -> Vec<(&'static str, &'static str)> {
    MIGRATIONS
        .iter()
        .copied()
        .filter(|(version, _)| !applied.iter().any(|a| a == version))
        .collect()
}

// All pending migrations land in one transaction with their ledger rows.
fn migrate(conn: &mut Connection) -> Result<(), String> {
    let pending = pending_migrations(&applied_versions(conn)?);
    if pending.is_empty() {
        return Ok(());
    }
    let tx = conn
        .transaction()
        .map_err(|e| format!("failed to begin tracker migration: {e}"))?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("failed to create schema_migrations: {e}"))?;
    for (version, sql) in &pending {
        tx.execute_batch(sql)
            .and_then(|_| {
                tx.execute(
                    "INSERT INTO schema_migrations(version) VALUES (?1)",
                    [version],
                )
            })
            .map_err(|e| format!("tracker migration {version} failed: {e}"))?;
        log::info!("applied tracker migration {version}");
    }
    tx.commit()
        .map_err(|e| format!("failed to commit tracker migration: {e}"))
}

pub fn open_tracker_db(db_path: &Path) -> Result<Connection, String> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create database directory: {e}"))?;
    }
    let mut conn =
        Connection::open(db_path).map_err(|e| format!("failed to open database: {e}"))?;
    migrate(&mut conn)?;
    Ok(conn)
}

pub fn read_slot(conn: &Connection, slot: &str) -> Result<Option<String>, String> {
    conn.query_row(
        "SELECT payload FROM tracker_slots WHERE slot = ?1",
        [slot],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .map_err(|e| format!("failed to read slot {slot}: {e}"))
}

pub fn write_slots(conn: &Connection, slots: &[(&str, &str)]) -> Result<(), String> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| format!("failed to begin slot write: {e}"))?;
    for (slot, payload) in slots {
        tx.execute(
            "INSERT INTO tracker_slots(slot, payload) VALUES (?1, ?2)
             ON CONFLICT(slot) DO UPDATE SET
                payload = excluded.payload,
                updated_at = datetime('now')",
            params![slot, payload],
        )
        .map_err(|e| format!("failed to write slot {slot}: {e}"))?;
    }
    tx.commit()
        .map_err(|e| format!("failed to commit slot write: {e}"))
}

fn slot_summaries(conn: &Connection) -> Result<Vec<SlotSummary>, String> {
    if !has_table(conn, "tracker_slots")? {
        return Ok(Vec::new());
    }
    let mut stmt = conn
        .prepare("SELECT slot, length(payload), updated_at FROM tracker_slots ORDER BY slot")
        .map_err(|e| format!("failed to list tracker slots: {e}"))?;
    let summaries = stmt
        .query_map([], |row| {
            Ok(SlotSummary {
                slot: row.get(0)?,
                bytes: row.get(1)?,
                updated_at: row.get(2)?,
            })
        })
        .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(|e| format!("failed to list tracker slots: {e}"));
    summaries
}

pub fn inspect_status_at_path(db_path: &Path) -> Result<TrackerDbStatus, String> {
    let (applied, slots) = if db_path.exists() {
        let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|e| format!("failed to open database: {e}"))?;
        (applied_versions(&conn)?, slot_summaries(&conn)?)
    } else {
        (Vec::new(), Vec::new())
    };

    let pending_versions = pending_migrations(&applied)
        .into_iter()
        .map(|(version, _)| version.to_string())
        .collect::<Vec<_>>();
    let missing_slots = TRACKED_SLOTS
        .iter()
        .filter(|name| !slots.iter().any(|s| s.slot == **name))
        .map(|name| name.to_string())
        .collect::<Vec<_>>();

    Ok(TrackerDbStatus {
        db_path: db_path.to_string_lossy().to_string(),
        exists: db_path.exists(),
        schema_version: applied.last().cloned(),
        ready: pending_versions.is_empty() && missing_slots.is_empty(),
        pending_versions,
        slots,
        missing_slots,
    })
}

#[cfg(feature = "desktop")]
#[tauri::command]
pub fn tracker_db_status(app: AppHandle) -> Result<TrackerDbStatus, String> {
    let db_path = resolve_tracker_db_path(&app)?;
    inspect_status_at_path(&db_path)
}
