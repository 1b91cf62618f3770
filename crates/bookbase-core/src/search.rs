/// Catalog search and filtering.
///
/// Supports the following query syntax:
/// ```text
/// dune                   → title or author contains "dune" (case-insensitive)
/// "frank herbert"        → quoted phrase, matched as one term
/// @author:herbert        → filter by author
/// s:available            → status filter (also status:checked-out)
/// is:fav  fav            → favorites only
/// by:alice               → current borrower
/// NOT s:available        → negate the next token (filter or term)
/// ```
use serde::{Deserialize, Serialize};

use crate::models::{Book, BookStatus};

/// Status selector as offered by the catalog view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusFilter {
    #[default]
    All,
    Available,
    CheckedOut,
}

impl StatusFilter {
    fn as_status(self) -> Option<BookStatus> {
        match self {
            Self::All => None,
            Self::Available => Some(BookStatus::Available),
            Self::CheckedOut => Some(BookStatus::CheckedOut),
        }
    }
}

/// A single filter extracted from the query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilter {
    /// Title or author contains the text. Produced for negated terms.
    Text(String),
    Author(String),
    Status(BookStatus),
    Favorite,
    Borrower(String),
    Not(Box<SearchFilter>),
}

/// A parsed catalog query. The default value matches every book.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilter {
    /// Free-text terms; each must appear in the title or the author.
    pub terms: Vec<String>,
    pub filters: Vec<SearchFilter>,
}

impl BookFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse a query string.
    pub fn parse(input: &str) -> Self {
        let mut query = Self::default();
        let mut negate_next = false;

        for token in tokenize(input) {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }

            if token.eq_ignore_ascii_case("NOT") {
                negate_next = true;
                continue;
            }

            match (parse_token(token), negate_next) {
                (Some(f), true) => query.filters.push(SearchFilter::Not(Box::new(f))),
                (Some(f), false) => query.filters.push(f),
                (None, true) => query
                    .filters
                    .push(SearchFilter::Not(Box::new(SearchFilter::Text(token.to_lowercase())))),
                (None, false) => query.terms.push(token.to_lowercase()),
            }
            negate_next = false;
        }

        // A trailing NOT negates nothing; search for the word itself.
        if negate_next {
            query.terms.push("not".to_string());
        }

        query
    }

    pub fn with_status(mut self, status: StatusFilter) -> Self {
        if let Some(status) = status.as_status() {
            self.filters.push(SearchFilter::Status(status));
        }
        self
    }

    pub fn favorites_only(mut self, only: bool) -> Self {
        if only {
            self.filters.push(SearchFilter::Favorite);
        }
        self
    }

    /// Whether `book` satisfies every term and filter.
    pub fn matches(&self, book: &Book) -> bool {
        let title = book.title.to_lowercase();
        let author = book.author.to_lowercase();

        self.terms
            .iter()
            .all(|term| title.contains(term.as_str()) || author.contains(term.as_str()))
            && self.filters.iter().all(|f| filter_matches(f, book))
    }

    pub fn apply(&self, books: Vec<Book>) -> Vec<Book> {
        books.into_iter().filter(|b| self.matches(b)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.filters.is_empty()
    }
}

fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Returns `None` for plain terms, including filter prefixes with no value.
fn parse_token(token: &str) -> Option<SearchFilter> {
    if let Some(rest) = token.strip_prefix("@author:").or_else(|| token.strip_prefix('@')) {
        return (!rest.is_empty()).then(|| SearchFilter::Author(rest.to_lowercase()));
    }

    if let Some(rest) = token.strip_prefix("s:").or_else(|| token.strip_prefix("status:")) {
        return rest.parse().ok().map(SearchFilter::Status);
    }

    if token.eq_ignore_ascii_case("fav") || token.eq_ignore_ascii_case("is:fav") {
        return Some(SearchFilter::Favorite);
    }

    if let Some(rest) = token.strip_prefix("by:") {
        return (!rest.is_empty()).then(|| SearchFilter::Borrower(rest.to_lowercase()));
    }

    None
}

fn filter_matches(filter: &SearchFilter, book: &Book) -> bool {
    match filter {
        SearchFilter::Text(text) => {
            book.title.to_lowercase().contains(text.as_str())
                || book.author.to_lowercase().contains(text.as_str())
        }
        SearchFilter::Author(name) => book.author.to_lowercase().contains(name.as_str()),
        SearchFilter::Status(status) => book.status() == *status,
        SearchFilter::Favorite => book.is_favorite(),
        SearchFilter::Borrower(name) => book
            .checked_out_by()
            .is_some_and(|b| b.to_lowercase().contains(name.as_str())),
        SearchFilter::Not(inner) => !filter_matches(inner, book),
    }
}
