use std::path::Path;

use chrono::NaiveDate;
use tracing::info;

use crate::config::AppConfig;
use crate::error::{BookbaseError, Result};
use crate::lifecycle::{self, Borrower, CheckinOutcome};
use crate::models::{Book, BookHistory, BookId, CatalogStats, NewBook};
use crate::search::BookFilter;
use crate::storage::database::{self, ConnectionPool};
use crate::storage::queries::CatalogStatsQuery;
use crate::storage::repositories::{BookRepository, Repository, SqliteBookRepository};

/// The book record store. Owns all book state; every method returns an
/// owned snapshot.
///
/// Each mutation reads the book, applies the change and writes it back inside
/// one SQLite transaction while holding the connection lock.
pub struct Catalog {
    pool: ConnectionPool,
    clock: fn() -> NaiveDate,
}

impl Catalog {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::with_pool(database::open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::with_pool(database::open_in_memory()?))
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::open(&config.database_path())
    }

    fn with_pool(pool: ConnectionPool) -> Self {
        Self { pool, clock: lifecycle::today }
    }

    /// Replace the source of "today" used to date checkouts and returns.
    pub fn with_clock(mut self, clock: fn() -> NaiveDate) -> Self {
        self.clock = clock;
        self
    }

    /// Backing database file, `None` for in-memory catalogs.
    pub fn database_path(&self) -> Option<&str> {
        self.pool.path()
    }

    // ─── Records ───────────────────────────────────────────

    pub fn create(&self, input: NewBook) -> Result<Book> {
        let book = Book::new(input)?;
        let mut conn = self.pool.get_connection();
        let tx = conn.transaction()?;
        SqliteBookRepository::new(&tx).save(&book)?;
        tx.commit()?;

        info!(book = %book.id, title = %book.title, "book created");
        Ok(book)
    }

    pub fn get(&self, id: &BookId) -> Result<Book> {
        let conn = self.pool.get_connection();
        SqliteBookRepository::new(&conn)
            .find_by_id(id)?
            .ok_or_else(|| not_found(id))
    }

    pub fn list(&self) -> Result<Vec<Book>> {
        let conn = self.pool.get_connection();
        SqliteBookRepository::new(&conn).list()
    }

    /// Full scan of the catalog filtered in memory.
    pub fn search(&self, filter: &BookFilter) -> Result<Vec<Book>> {
        Ok(filter.apply(self.list()?))
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.pool.get_connection();
        SqliteBookRepository::new(&conn).count()
    }

    /// Permanently remove a book and its history.
    pub fn delete(&self, id: &BookId) -> Result<()> {
        let conn = self.pool.get_connection();
        if !SqliteBookRepository::new(&conn).delete(id)? {
            return Err(not_found(id));
        }
        info!(book = %id, "book deleted");
        Ok(())
    }

    /// Remove every book. Returns how many were removed.
    pub fn delete_all(&self) -> Result<usize> {
        let conn = self.pool.get_connection();
        let deleted = SqliteBookRepository::new(&conn).delete_all()?;
        info!(deleted, "catalog reset");
        Ok(deleted)
    }

    pub fn set_favorite(&self, id: &BookId, value: bool) -> Result<Book> {
        self.mutate(id, |book| {
            book.is_favorite = value;
            Ok(())
        })
        .map(|(book, ())| book)
    }

    pub fn toggle_favorite(&self, id: &BookId) -> Result<Book> {
        self.mutate(id, |book| {
            book.is_favorite = !book.is_favorite;
            Ok(())
        })
        .map(|(book, ())| book)
    }

    pub fn stats(&self) -> Result<CatalogStats> {
        let conn = self.pool.get_connection();
        CatalogStatsQuery::new(&conn).get_stats()
    }

    // ─── Lifecycle ─────────────────────────────────────────

    pub fn checkout(&self, id: &BookId, borrower: Borrower) -> Result<Book> {
        let today = (self.clock)();
        self.mutate(id, |book| lifecycle::checkout(book, borrower, today))
            .map(|(book, ())| book)
    }

    pub fn checkin(&self, id: &BookId) -> Result<(Book, CheckinOutcome)> {
        let today = (self.clock)();
        self.mutate(id, |book| lifecycle::checkin(book, today))
    }

    pub fn get_history(&self, id: &BookId) -> Result<BookHistory> {
        self.get(id).map(|book| BookHistory::from(&book))
    }

    /// Empty a book's history and return the (now empty) projection.
    pub fn clear_history(&self, id: &BookId) -> Result<BookHistory> {
        self.mutate(id, |book| Ok(lifecycle::clear_history(book)))
            .map(|(book, _)| BookHistory::from(&book))
    }

    /// Apply `apply` to the stored book atomically. On error the transaction
    /// is dropped uncommitted and the stored book is untouched.
    fn mutate<T>(&self, id: &BookId, apply: impl FnOnce(&mut Book) -> Result<T>) -> Result<(Book, T)> {
        let mut conn = self.pool.get_connection();
        let tx = conn.transaction()?;

        let (book, output) = {
            let repo = SqliteBookRepository::new(&tx);
            let mut book = repo.find_by_id(id)?.ok_or_else(|| not_found(id))?;
            let output = apply(&mut book)?;
            repo.save(&book)?;
            (book, output)
        };

        tx.commit()?;
        Ok((book, output))
    }
}

fn not_found(id: &BookId) -> BookbaseError {
    BookbaseError::NotFound(id.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::LifecycleAction;
    use crate::models::BookStatus;
    use crate::search::StatusFilter;
    use tempfile::TempDir;

    fn fixed_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 14).unwrap()
    }

    fn catalog() -> Catalog {
        Catalog::open_in_memory().unwrap().with_clock(fixed_day)
    }

    fn dune(catalog: &Catalog) -> Book {
        catalog.create(NewBook::new("Dune", "Herbert")).unwrap()
    }

    #[test]
    fn test_dune_scenario() {
        let catalog = catalog();

        let book = dune(&catalog);
        assert_eq!(book.status(), BookStatus::Available);
        assert!(book.borrow_history().is_empty());

        let book = catalog.checkout(&book.id, Borrower::named("Alice")).unwrap();
        assert_eq!(book.status(), BookStatus::CheckedOut);
        assert_eq!(book.checked_out_by(), Some("Alice"));
        assert_eq!(book.borrow_history().len(), 1);
        assert_eq!(book.borrow_history()[0].borrower, "Alice");
        assert_eq!(book.borrow_history()[0].return_date, None);

        let (book, outcome) = catalog.checkin(&book.id).unwrap();
        assert!(matches!(outcome, CheckinOutcome::Closed(_)));
        assert_eq!(book.status(), BookStatus::Available);
        assert_eq!(book.checked_out_by(), None);
        assert_eq!(book.checked_out_by_username(), None);
        assert_eq!(book.checked_out_date(), None);
        assert_eq!(book.borrow_history().len(), 1);
        assert_eq!(book.borrow_history()[0].checkout_date, fixed_day());
        assert_eq!(book.borrow_history()[0].return_date, Some(fixed_day()));

        assert_eq!(catalog.get(&book.id).unwrap(), book);
    }

    #[test]
    fn test_create_validation() {
        let catalog = catalog();
        let err = catalog.create(NewBook::new("", "Herbert")).unwrap_err();
        assert!(matches!(err, BookbaseError::Validation(_)));
        assert_eq!(catalog.count().unwrap(), 0);
    }

    #[test]
    fn test_get_unknown_id() {
        let catalog = catalog();
        assert_eq!(catalog.database_path(), None);
        assert!(matches!(catalog.get(&BookId::new()), Err(BookbaseError::NotFound(_))));
    }

    #[test]
    fn test_double_checkout_is_rejected_and_not_persisted() {
        let catalog = catalog();
        let book = dune(&catalog);

        catalog.checkout(&book.id, Borrower::named("Alice")).unwrap();
        let err = catalog.checkout(&book.id, Borrower::named("Bob")).unwrap_err();
        assert!(matches!(
            err,
            BookbaseError::InvalidTransition { action: LifecycleAction::Checkout, .. }
        ));

        let stored = catalog.get(&book.id).unwrap();
        assert_eq!(stored.borrow_history().len(), 1);
        assert_eq!(stored.checked_out_by(), Some("Alice"));
    }

    #[test]
    fn test_checkin_available_is_rejected() {
        let catalog = catalog();
        let book = dune(&catalog);

        let err = catalog.checkin(&book.id).unwrap_err();
        assert!(matches!(err, BookbaseError::InvalidTransition { .. }));
        assert!(catalog.get(&book.id).unwrap().borrow_history().is_empty());
    }

    #[test]
    fn test_repeated_checkin_keeps_stored_history() {
        let catalog = catalog();
        let book = dune(&catalog);
        catalog.checkout(&book.id, Borrower::named("Alice")).unwrap();
        let (returned, _) = catalog.checkin(&book.id).unwrap();

        let err = catalog.checkin(&book.id).unwrap_err();
        assert!(matches!(err, BookbaseError::InvalidTransition { .. }));

        let stored = catalog.get(&book.id).unwrap();
        assert_eq!(stored.borrow_history(), returned.borrow_history());
        assert_eq!(stored, returned);
    }

    #[test]
    fn test_lifecycle_unknown_id() {
        let catalog = catalog();
        let id = BookId::new();
        assert!(matches!(catalog.checkout(&id, Borrower::named("A")), Err(BookbaseError::NotFound(_))));
        assert!(matches!(catalog.checkin(&id), Err(BookbaseError::NotFound(_))));
        assert!(matches!(catalog.clear_history(&id), Err(BookbaseError::NotFound(_))));
        assert!(matches!(catalog.get_history(&id), Err(BookbaseError::NotFound(_))));
    }

    #[test]
    fn test_clear_history_then_checkin() {
        let catalog = catalog();
        let book = dune(&catalog);
        catalog.checkout(&book.id, Borrower::named("Alice")).unwrap();

        let history = catalog.clear_history(&book.id).unwrap();
        assert!(history.history.is_empty());
        let stored = catalog.get(&book.id).unwrap();
        assert_eq!(stored.status(), BookStatus::CheckedOut);
        assert_eq!(stored.checked_out_by(), Some("Alice"));

        let (book, outcome) = catalog.checkin(&book.id).unwrap();
        assert_eq!(outcome, CheckinOutcome::NoOpenEntry);
        assert_eq!(book.status(), BookStatus::Available);
        assert!(book.is_consistent());
    }

    #[test]
    fn test_get_history_projection() {
        let catalog = catalog();
        let book = dune(&catalog);
        catalog.checkout(&book.id, Borrower::named("Alice")).unwrap();
        catalog.checkin(&book.id).unwrap();
        catalog.checkout(&book.id, Borrower::named("Bob")).unwrap();

        let history = catalog.get_history(&book.id).unwrap();
        assert_eq!(history.title, "Dune");
        assert_eq!(history.author, "Herbert");
        let newest: Vec<(usize, &str)> =
            history.newest_first().map(|(n, e)| (n, e.borrower.as_str())).collect();
        assert_eq!(newest, vec![(2, "Bob"), (1, "Alice")]);
    }

    #[test]
    fn test_delete_unknown_keeps_size() {
        let catalog = catalog();
        dune(&catalog);

        assert!(matches!(catalog.delete(&BookId::new()), Err(BookbaseError::NotFound(_))));
        assert_eq!(catalog.count().unwrap(), 1);
    }

    #[test]
    fn test_delete_removes_book() {
        let catalog = catalog();
        let book = dune(&catalog);
        catalog.checkout(&book.id, Borrower::named("Alice")).unwrap();

        catalog.delete(&book.id).unwrap();
        assert!(matches!(catalog.get(&book.id), Err(BookbaseError::NotFound(_))));
        assert!(matches!(catalog.delete(&book.id), Err(BookbaseError::NotFound(_))));
    }

    #[test]
    fn test_toggle_favorite_twice() {
        let catalog = catalog();
        let book = dune(&catalog);
        catalog.checkout(&book.id, Borrower::named("Alice")).unwrap();

        let once = catalog.toggle_favorite(&book.id).unwrap();
        assert!(once.is_favorite());
        let twice = catalog.toggle_favorite(&book.id).unwrap();
        assert!(!twice.is_favorite());

        assert_eq!(twice.status(), BookStatus::CheckedOut);
        assert_eq!(twice.borrow_history().len(), 1);
    }

    #[test]
    fn test_set_favorite_is_idempotent() {
        let catalog = catalog();
        let book = dune(&catalog);
        assert!(catalog.set_favorite(&book.id, true).unwrap().is_favorite());
        assert!(catalog.set_favorite(&book.id, true).unwrap().is_favorite());
        assert!(!catalog.set_favorite(&book.id, false).unwrap().is_favorite());
    }

    #[test]
    fn test_search_and_stats() {
        let catalog = catalog();
        let dune = dune(&catalog);
        let emma = catalog.create(NewBook::new("Emma", "Austen")).unwrap();
        catalog.create(NewBook::new("Persuasion", "Austen")).unwrap();
        catalog.checkout(&emma.id, Borrower::named("Alice")).unwrap();
        catalog.set_favorite(&dune.id, true).unwrap();

        let austen = catalog.search(&BookFilter::parse("austen")).unwrap();
        assert_eq!(austen.len(), 2);

        let out = catalog
            .search(&BookFilter::all().with_status(StatusFilter::CheckedOut))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, emma.id);

        let favs = catalog.search(&BookFilter::all().favorites_only(true)).unwrap();
        assert_eq!(favs.len(), 1);
        assert_eq!(favs[0].id, dune.id);

        let stats = catalog.stats().unwrap();
        assert_eq!(stats, CatalogStats { total: 3, available: 2, checked_out: 1, favorites: 1 });
    }

    #[test]
    fn test_list_insertion_order_and_delete_all() {
        let catalog = catalog();
        for title in ["A", "B", "C"] {
            catalog.create(NewBook::new(title, "Anon")).unwrap();
        }
        let titles: Vec<String> = catalog.list().unwrap().into_iter().map(|b| b.title).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);

        assert_eq!(catalog.delete_all().unwrap(), 3);
        assert!(catalog.list().unwrap().is_empty());
    }

    #[test]
    fn test_status_invariant_holds_for_all_books() {
        let catalog = catalog();
        let a = dune(&catalog);
        let b = catalog.create(NewBook::new("Emma", "Austen")).unwrap();
        catalog.checkout(&a.id, Borrower::named("Alice")).unwrap();
        catalog.checkout(&b.id, Borrower::named("Bob")).unwrap();
        catalog.checkin(&b.id).unwrap();

        for book in catalog.list().unwrap() {
            assert!(book.is_consistent(), "inconsistent book: {book:?}");
        }
    }

    #[test]
    fn test_concurrent_checkouts_single_winner() {
        let catalog = Arc::new(catalog());
        let book = dune(&catalog);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let catalog = Arc::clone(&catalog);
                let id = book.id;
                std::thread::spawn(move || catalog.checkout(&id, Borrower::named(format!("reader-{i}"))))
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(successes, 1);

        let stored = catalog.get(&book.id).unwrap();
        assert_eq!(stored.borrow_history().len(), 1);
        assert_eq!(stored.borrow_history().iter().filter(|e| e.is_open()).count(), 1);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bookbase.db");

        let id = {
            let catalog = Catalog::open(&path).unwrap().with_clock(fixed_day);
            let book = dune(&catalog);
            catalog.checkout(&book.id, Borrower::named("Alice")).unwrap();
            book.id
        };

        let catalog = Catalog::open(&path).unwrap();
        assert!(catalog.database_path().is_some());
        let book = catalog.get(&id).unwrap();
        assert_eq!(book.checked_out_by(), Some("Alice"));
        assert_eq!(book.checked_out_date(), Some(fixed_day()));
        assert_eq!(book.borrow_history().len(), 1);
    }
}
