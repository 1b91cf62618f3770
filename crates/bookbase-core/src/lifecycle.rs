//! Checkout / check-in state machine.
//!
//! ```text
//!              checkout
//!   available ──────────▶ checked-out
//!       ▲                      │
//!       └──────────────────────┘
//!              checkin
//! ```
//!
//! Every transition here is a pure function over `&mut Book`; the
//! [`Catalog`](crate::Catalog) loads the book, applies the transition and
//! persists the result inside one storage transaction.

use chrono::{Local, NaiveDate};
use tracing::{info, warn};

use crate::error::{BookbaseError, LifecycleAction, Result};
use crate::models::{Book, BookStatus, HistoryEntry};

/// The person a book is checked out to. Identity is opaque text and is not
/// assumed to be unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Borrower {
    pub name: String,
    pub id: Option<String>,
}

impl Borrower {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), id: None }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// What a successful check-in did to the borrow history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckinOutcome {
    /// The open entry was stamped with a return date.
    Closed(HistoryEntry),
    /// No open entry existed (history was cleared while checked out);
    /// only the status was reset.
    NoOpenEntry,
}

/// Today's date in local time; the default catalog clock.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// `available` → `checked-out`, appending an open history entry.
pub fn checkout(book: &mut Book, borrower: Borrower, today: NaiveDate) -> Result<()> {
    let name = borrower.name.trim();
    if name.is_empty() {
        return Err(BookbaseError::Validation("borrower name is required".to_string()));
    }
    if book.status != BookStatus::Available {
        return Err(invalid(book, LifecycleAction::Checkout));
    }

    let borrower_id = borrower
        .id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    book.status = BookStatus::CheckedOut;
    book.checked_out_by = Some(name.to_string());
    book.checked_out_by_username = Some(borrower_id.clone().unwrap_or_else(|| name.to_string()));
    book.checked_out_date = Some(today);
    book.borrow_history.push(HistoryEntry {
        borrower: name.to_string(),
        borrower_id,
        checkout_date: today,
        return_date: None,
    });

    info!(book = %book.id, borrower = name, "book checked out");
    Ok(())
}

/// `checked-out` → `available`, closing the most recent open entry.
pub fn checkin(book: &mut Book, today: NaiveDate) -> Result<CheckinOutcome> {
    if book.status != BookStatus::CheckedOut {
        return Err(invalid(book, LifecycleAction::Checkin));
    }

    book.status = BookStatus::Available;
    book.checked_out_by = None;
    book.checked_out_by_username = None;
    book.checked_out_date = None;

    let outcome = match book.open_entry_mut() {
        Some(entry) => {
            entry.return_date = Some(today);
            CheckinOutcome::Closed(entry.clone())
        }
        None => {
            warn!(book = %book.id, "checked in with no open history entry; history left unchanged");
            CheckinOutcome::NoOpenEntry
        }
    };

    info!(book = %book.id, "book checked in");
    Ok(outcome)
}

/// Empty the borrow history. Status and borrower fields are untouched.
/// Returns the number of entries removed.
pub fn clear_history(book: &mut Book) -> usize {
    let removed = book.borrow_history.len();
    book.borrow_history.clear();
    info!(book = %book.id, removed, "borrow history cleared");
    removed
}

fn invalid(book: &Book, action: LifecycleAction) -> BookbaseError {
    BookbaseError::InvalidTransition {
        id: book.id.to_string(),
        status: book.status,
        action,
    }
}
