pub mod catalog;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod search;
pub mod storage;

pub use catalog::Catalog;
pub use config::AppConfig;
pub use error::{BookbaseError, ExitCode, LifecycleAction, Result};
pub use lifecycle::{Borrower, CheckinOutcome};
pub use models::*;
pub use search::{BookFilter, SearchFilter, StatusFilter};

pub use storage::database::{ConnectionPool, open_database, open_in_memory};
pub use storage::queries::CatalogStatsQuery;
pub use storage::repositories::{BookRepository, Repository, SqliteBookRepository};
