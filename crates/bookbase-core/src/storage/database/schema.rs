use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: u32 = 1;

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

/// WAL only makes sense for on-disk databases.
pub fn apply_file_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    Ok(())
}

pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS books (
            id                      TEXT PRIMARY KEY,
            title                   TEXT NOT NULL CHECK(length(trim(title)) > 0),
            author                  TEXT NOT NULL CHECK(length(trim(author)) > 0),
            isbn                    TEXT NOT NULL DEFAULT '',
            description             TEXT NOT NULL DEFAULT '',
            status                  TEXT NOT NULL CHECK(status IN ('available', 'checked-out')) DEFAULT 'available',
            checked_out_by          TEXT,
            checked_out_by_username TEXT,
            checked_out_date        TEXT,
            is_favorite             INTEGER NOT NULL DEFAULT 0,
            created_at              TEXT NOT NULL,
            CHECK ((status = 'checked-out') = (checked_out_by IS NOT NULL AND checked_out_date IS NOT NULL))
        );

        CREATE TABLE IF NOT EXISTS borrow_history (
            book_id       TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            position      INTEGER NOT NULL,
            borrower      TEXT NOT NULL,
            borrower_id   TEXT,
            checkout_date TEXT NOT NULL,
            return_date   TEXT,
            PRIMARY KEY (book_id, position)
        );
        ",
    )?;
    Ok(())
}

pub fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_books_status     ON books(status);
        CREATE INDEX IF NOT EXISTS idx_books_created_at ON books(created_at);
        CREATE INDEX IF NOT EXISTS idx_books_favorite   ON books(is_favorite);
        ",
    )?;
    Ok(())
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    create_tables(conn)?;
    create_indexes(conn)?;
    Ok(())
}
