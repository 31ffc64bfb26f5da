//! Conversation cache schema and migrations.
//!
//! Migrations are append-only. `open_db` opens the database in WAL mode and
//! applies anything not yet recorded in `schema_meta`.

use rusqlite::{Connection, Result as SqlResult};
use std::path::Path;

struct Migration {
    version: u32,
    sql: &'static str,
}

/// Append-only. Never edit an existing entry.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: "
        CREATE TABLE npc_chats (
            key        TEXT    PRIMARY KEY CHECK (length(key) > 0),
            updated_at INTEGER NOT NULL,
            messages   TEXT    NOT NULL
        );

        CREATE INDEX idx_npc_chats_updated_at ON npc_chats(updated_at);
    ",
}];

/// Open (or create) the cache database at `path` and bring its schema up to date.
pub fn open_db(path: &Path) -> SqlResult<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "wal")?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_meta (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;
    apply_migrations(&conn)?;
    Ok(conn)
}

fn apply_migrations(conn: &Connection) -> SqlResult<()> {
    let max_applied: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_meta",
        [],
        |row| row.get(0),
    )?;

    for m in MIGRATIONS.iter().filter(|m| m.version > max_applied) {
        conn.execute_batch(m.sql)?;
        conn.execute("INSERT INTO schema_meta (version) VALUES (?1)", [m.version])?;
    }
    Ok(())
}
