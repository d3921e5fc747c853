//! SQLite database for moderation flags: single connection, WAL mode, tables created on open.

use std::path::Path;

use rusqlite::Connection;

/// Open (or create) the database file and ensure all tables exist.
pub fn open_db(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    create_tables(&conn)?;
    Ok(conn)
}

/// In-memory database with the same schema (tests, dry runs).
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    create_tables(&conn)?;
    Ok(conn)
}

fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS group_features (
            group_id    TEXT NOT NULL,
            feature     TEXT NOT NULL,
            value       TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (group_id, feature)
        );
        ",
    )
}
