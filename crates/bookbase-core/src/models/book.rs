use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BookbaseError, Result};

// ─── BookId ─────────────────────────────────────────────────

/// Opaque, immutable identifier of a catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(Uuid);

impl BookId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BookId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BookId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BookId {
    type Err = BookbaseError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| BookbaseError::InvalidId(s.to_string()))
    }
}

// ─── Status ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BookStatus {
    #[default]
    Available,
    CheckedOut,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::CheckedOut => "checked-out",
        }
    }
}

impl std::fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookStatus {
    type Err = BookbaseError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "available" => Ok(Self::Available),
            "checked-out" | "checked_out" => Ok(Self::CheckedOut),
            other => Err(BookbaseError::Validation(format!("unknown status: {other}"))),
        }
    }
}

// ─── History ────────────────────────────────────────────────

/// One borrow event. Open while `return_date` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub borrower: String,

    #[serde(default)]
    pub borrower_id: Option<String>,

    pub checkout_date: NaiveDate,

    #[serde(default)]
    pub return_date: Option<NaiveDate>,
}

impl HistoryEntry {
    pub fn is_open(&self) -> bool {
        self.return_date.is_none()
    }
}

/// Read-only projection returned by `Catalog::get_history`.
///
/// `history` is kept in recorded order; display ordering is the caller's
/// business, see [`BookHistory::newest_first`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookHistory {
    pub title: String,
    pub author: String,
    pub history: Vec<HistoryEntry>,
}

impl BookHistory {
    /// Entries most-recent-first, each tagged with its 1-based borrow number.
    pub fn newest_first(&self) -> impl Iterator<Item = (usize, &HistoryEntry)> + '_ {
        let total = self.history.len();
        self.history
            .iter()
            .rev()
            .enumerate()
            .map(move |(i, entry)| (total - i, entry))
    }
}

impl From<&Book> for BookHistory {
    fn from(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            history: book.borrow_history.clone(),
        }
    }
}

// ─── NewBook ────────────────────────────────────────────────

/// Input for `Catalog::create`. Missing fields deserialize as empty and are
/// rejected by validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewBook {
    pub title: String,
    pub author: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NewBook {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            isbn: None,
            description: None,
        }
    }

    pub fn with_isbn(mut self, isbn: impl Into<String>) -> Self {
        self.isbn = Some(isbn.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

// ─── Book ───────────────────────────────────────────────────

/// A catalog item together with its lifecycle state and borrow history.
///
/// Lifecycle fields are crate-private: only the lifecycle transitions in
/// [`crate::lifecycle`] may change them, and a `Book` can only be built
/// through [`Book::new`] or storage. Callers always hold snapshots.
///
/// ```compile_fail
/// let book: bookbase_core::Book = serde_json::from_str("{}").unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,

    pub isbn: String,
    pub description: String,

    pub(crate) status: BookStatus,
    pub(crate) checked_out_by: Option<String>,
    pub(crate) checked_out_by_username: Option<String>,
    pub(crate) checked_out_date: Option<NaiveDate>,
    pub(crate) is_favorite: bool,
    pub(crate) borrow_history: Vec<HistoryEntry>,

    pub created_at: DateTime<Utc>,
}

impl Book {
    /// Validate the input and build an `available` book with empty history.
    pub fn new(input: NewBook) -> Result<Self> {
        let title = input.title.trim();
        let author = input.author.trim();
        if title.is_empty() {
            return Err(BookbaseError::Validation("title is required".to_string()));
        }
        if author.is_empty() {
            return Err(BookbaseError::Validation("author is required".to_string()));
        }

        Ok(Self {
            id: BookId::new(),
            title: title.to_string(),
            author: author.to_string(),
            isbn: input.isbn.unwrap_or_default().trim().to_string(),
            description: input.description.unwrap_or_default(),
            status: BookStatus::Available,
            checked_out_by: None,
            checked_out_by_username: None,
            checked_out_date: None,
            is_favorite: false,
            borrow_history: Vec::new(),
            created_at: Utc::now(),
        })
    }

    pub fn status(&self) -> BookStatus {
        self.status
    }

    pub fn checked_out_by(&self) -> Option<&str> {
        self.checked_out_by.as_deref()
    }

    pub fn checked_out_by_username(&self) -> Option<&str> {
        self.checked_out_by_username.as_deref()
    }

    pub fn checked_out_date(&self) -> Option<NaiveDate> {
        self.checked_out_date
    }

    pub fn is_favorite(&self) -> bool {
        self.is_favorite
    }

    pub fn borrow_history(&self) -> &[HistoryEntry] {
        &self.borrow_history
    }

    /// The entry a check-in closes: the most recent one still open.
    pub(crate) fn open_entry_mut(&mut self) -> Option<&mut HistoryEntry> {
        self.borrow_history.iter_mut().rev().find(|e| e.is_open())
    }

    /// Status agrees with the borrower fields.
    pub fn is_consistent(&self) -> bool {
        let has_borrower = self.checked_out_by.is_some()
            && self.checked_out_by_username.is_some()
            && self.checked_out_date.is_some();
        let has_none = self.checked_out_by.is_none()
            && self.checked_out_by_username.is_none()
            && self.checked_out_date.is_none();

        match self.status {
            BookStatus::CheckedOut => has_borrower,
            BookStatus::Available => has_none,
        }
    }
}
