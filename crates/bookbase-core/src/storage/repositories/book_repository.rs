use std::collections::HashMap;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Book, BookId, BookStatus, HistoryEntry};

use super::Repository;

const BOOK_COLUMNS: &str = "id, title, author, isbn, description, status, checked_out_by,
     checked_out_by_username, checked_out_date, is_favorite, created_at";

pub trait BookRepository: Repository<Entity = Book, Id = BookId> {
    /// Every book with its history, oldest first.
    fn list(&self) -> Result<Vec<Book>>;
    fn count(&self) -> Result<usize>;
    /// Remove every book (history cascades). Returns the number removed.
    fn delete_all(&self) -> Result<usize>;
}

/// Book storage over a borrowed connection. Pass a `Transaction` to make a
/// sequence of calls atomic.
pub struct SqliteBookRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteBookRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn row_to_book(row: &Row) -> rusqlite::Result<Book> {
        Ok(Book {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            isbn: row.get(3)?,
            description: row.get(4)?,
            status: row.get(5)?,
            checked_out_by: row.get(6)?,
            checked_out_by_username: row.get(7)?,
            checked_out_date: row.get(8)?,
            is_favorite: row.get(9)?,
            borrow_history: Vec::new(),
            created_at: row.get(10)?,
        })
    }

    fn row_to_entry(row: &Row) -> rusqlite::Result<HistoryEntry> {
        Ok(HistoryEntry {
            borrower: row.get(0)?,
            borrower_id: row.get(1)?,
            checkout_date: row.get(2)?,
            return_date: row.get(3)?,
        })
    }

    fn load_history(&self, id: &BookId) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT borrower, borrower_id, checkout_date, return_date
             FROM borrow_history WHERE book_id = ?1 ORDER BY position",
        )?;
        let entries = stmt
            .query_map(params![id], Self::row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn load_all_history(&self) -> Result<HashMap<BookId, Vec<HistoryEntry>>> {
        let mut stmt = self.conn.prepare(
            "SELECT book_id, borrower, borrower_id, checkout_date, return_date
             FROM borrow_history ORDER BY book_id, position",
        )?;
        let rows = stmt.query_map([], |row| {
            let book_id: BookId = row.get(0)?;
            let entry = HistoryEntry {
                borrower: row.get(1)?,
                borrower_id: row.get(2)?,
                checkout_date: row.get(3)?,
                return_date: row.get(4)?,
            };
            Ok((book_id, entry))
        })?;

        let mut by_book: HashMap<BookId, Vec<HistoryEntry>> = HashMap::new();
        for row in rows {
            let (book_id, entry) = row?;
            by_book.entry(book_id).or_default().push(entry);
        }
        Ok(by_book)
    }

    fn write_history(&self, book: &Book) -> Result<()> {
        self.conn
            .execute("DELETE FROM borrow_history WHERE book_id = ?1", params![book.id])?;

        let mut stmt = self.conn.prepare(
            "INSERT INTO borrow_history
                (book_id, position, borrower, borrower_id, checkout_date, return_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (position, entry) in book.borrow_history.iter().enumerate() {
            stmt.execute(params![
                book.id,
                position as i64,
                entry.borrower,
                entry.borrower_id,
                entry.checkout_date,
                entry.return_date,
            ])?;
        }
        Ok(())
    }
}

impl Repository for SqliteBookRepository<'_> {
    type Entity = Book;
    type Id = BookId;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?1"))?;

        let book = match stmt.query_row(params![id], Self::row_to_book) {
            Ok(book) => book,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(Book {
            borrow_history: self.load_history(id)?,
            ..book
        }))
    }

    /// Upsert the book row and replace its history rows. Uses
    /// `ON CONFLICT DO UPDATE` rather than `INSERT OR REPLACE`, which would
    /// delete the row and cascade away the history.
    fn save(&self, book: &Self::Entity) -> Result<()> {
        self.conn.execute(
            "INSERT INTO books
                (id, title, author, isbn, description, status, checked_out_by,
                 checked_out_by_username, checked_out_date, is_favorite, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                title                   = excluded.title,
                author                  = excluded.author,
                isbn                    = excluded.isbn,
                description             = excluded.description,
                status                  = excluded.status,
                checked_out_by          = excluded.checked_out_by,
                checked_out_by_username = excluded.checked_out_by_username,
                checked_out_date        = excluded.checked_out_date,
                is_favorite             = excluded.is_favorite",
            params![
                book.id,
                book.title,
                book.author,
                book.isbn,
                book.description,
                book.status,
                book.checked_out_by,
                book.checked_out_by_username,
                book.checked_out_date,
                book.is_favorite,
                book.created_at,
            ],
        )?;

        self.write_history(book)
    }

    fn delete(&self, id: &Self::Id) -> Result<bool> {
        let deleted = self.conn.execute("DELETE FROM books WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }
}

impl BookRepository for SqliteBookRepository<'_> {
    fn list(&self) -> Result<Vec<Book>> {
        let mut history = self.load_all_history()?;

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY created_at, rowid"))?;
        let books = stmt
            .query_map([], Self::row_to_book)?
            .map(|row| {
                row.map(|book| Book {
                    borrow_history: history.remove(&book.id).unwrap_or_default(),
                    ..book
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(books)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn delete_all(&self) -> Result<usize> {
        let deleted = self.conn.execute("DELETE FROM books", [])?;
        Ok(deleted)
    }
}

// ─── Column conversions ────────────────────────────────────

impl ToSql for BookId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for BookId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Uuid::parse_str(text)
            .map(BookId::from)
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for BookStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for BookStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
