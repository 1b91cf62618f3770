use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use bookbase_core::{
    AppConfig, Book, BookFilter, BookId, BookbaseError, Borrower, Catalog, CheckinOutcome,
    ExitCode, NewBook, StatusFilter,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "bookbase",
    about = "Library catalog with checkout tracking",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting BOOKBASE_JSON=1.
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List books in the catalog.
    List {
        /// all, available or checked-out.
        #[arg(long, value_parser = parse_status, default_value = "all")]
        status: StatusFilter,
        #[arg(long)]
        favorites: bool,
    },

    /// Search books, e.g. `dune`, `@author:austen s:checked-out`, `by:alice`.
    Search {
        query: String,
        #[arg(long, value_parser = parse_status, default_value = "all")]
        status: StatusFilter,
        #[arg(long)]
        favorites: bool,
    },

    /// Add a book to the catalog.
    Add {
        #[arg(long)]
        title: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        isbn: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },

    /// Show a single book.
    Get { id: String },

    /// Delete a book and its borrow history.
    Delete {
        id: String,
        #[arg(long)]
        confirm: bool,
    },

    /// Check a book out to a borrower.
    Checkout {
        id: String,
        borrower: String,
        #[arg(long)]
        borrower_id: Option<String>,
    },

    /// Return a checked-out book.
    Checkin { id: String },

    /// Show a book's borrow history, newest first.
    History { id: String },

    /// Erase a book's borrow history.
    ClearHistory {
        id: String,
        #[arg(long)]
        confirm: bool,
    },

    /// Toggle the favorite flag, or set it explicitly with --set.
    Favorite {
        id: String,
        #[arg(long)]
        set: Option<bool>,
    },

    /// Show catalog statistics.
    Stats,

    /// Delete every book in the catalog.
    Reset {
        #[arg(long)]
        confirm: bool,
    },

    /// Start the HTTP API server.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run diagnostics.
    Doctor,

    /// Show version information.
    Version,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show all config values.
    List,
    /// Print the config file path.
    Path,
    /// Write the current config to the config file.
    Init {
        #[arg(long)]
        force: bool,
    },
}

/// Raised when a destructive command is run without `--confirm`.
#[derive(Debug, thiserror::Error)]
#[error("Add --confirm to {0}.")]
struct ConfirmRequired(&'static str);

/// Raised by `doctor` when the catalog database cannot be opened.
#[derive(Debug, thiserror::Error)]
#[error("Database check failed: {0}")]
struct DoctorFailed(String);

// ─── Main ────────────────────────────────────────────────────────────────────

fn main() {
    let start = Instant::now();
    let cli = Cli::parse();
    let json_output = cli.json || std::env::var("BOOKBASE_JSON").as_deref() == Ok("1");

    if let Err(err) = run(cli.command, json_output, start) {
        let code = exit_code(&err);
        if json_output {
            let body = serde_json::json!({
                "status": "error",
                "error": error_kind(code),
                "message": err.to_string(),
                "meta": { "duration_ms": start.elapsed().as_millis() }
            });
            println!("{body:#}");
        } else {
            eprintln!("Error: {err:#}");
        }
        std::process::exit(code as i32);
    }
}

fn run(command: Commands, json_output: bool, start: Instant) -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config);

    let out = Output { json: json_output, start };
    debug!(json = json_output, "running command");

    match command {
        Commands::List { status, favorites } => {
            let catalog = open_catalog(&config)?;
            let filter = BookFilter::all().with_status(status).favorites_only(favorites);
            let books = catalog.search(&filter)?;
            out.books(&books, "No books in catalog. Use `bookbase add` to add one.")?;
        }

        Commands::Search { query, status, favorites } => {
            let catalog = open_catalog(&config)?;
            let filter = BookFilter::parse(&query).with_status(status).favorites_only(favorites);
            let books = catalog.search(&filter)?;
            out.books(&books, &format!("No results for: {query}"))?;
        }

        Commands::Add { title, author, isbn, description } => {
            let catalog = open_catalog(&config)?;
            let book = catalog.create(NewBook { title, author, isbn, description })?;
            out.emit(&book, || println!("Added: {} ({})", book.title, book.id))?;
        }

        Commands::Get { id } => {
            let catalog = open_catalog(&config)?;
            let book = catalog.get(&id.parse()?)?;
            out.emit(&book, || print_book_details(&book))?;
        }

        Commands::Delete { id, confirm } => {
            require_confirm(confirm, "delete the book")?;
            let id: BookId = id.parse()?;
            open_catalog(&config)?.delete(&id)?;
            out.emit(&serde_json::json!({ "deleted": id }), || println!("Deleted book: {id}"))?;
        }

        Commands::Checkout { id, borrower, borrower_id } => {
            let catalog = open_catalog(&config)?;
            let borrower = Borrower { name: borrower, id: borrower_id };
            let book = catalog.checkout(&id.parse()?, borrower)?;
            out.emit(&book, || {
                println!(
                    "Checked out: {} → {}",
                    book.title,
                    book.checked_out_by().unwrap_or_default()
                )
            })?;
        }

        Commands::Checkin { id } => {
            let catalog = open_catalog(&config)?;
            let (book, outcome) = catalog.checkin(&id.parse()?)?;
            out.emit(&book, || {
                println!("Checked in: {}", book.title);
                if outcome == CheckinOutcome::NoOpenEntry {
                    println!("  (no open history entry to close)");
                }
            })?;
        }

        Commands::History { id } => {
            let catalog = open_catalog(&config)?;
            let history = catalog.get_history(&id.parse()?)?;
            out.emit(&history, || {
                println!("{} — {}", history.title, history.author);
                if history.history.is_empty() {
                    println!("  No borrow history.");
                }
                for (n, entry) in history.newest_first() {
                    let returned = entry
                        .return_date
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "on loan".to_string());
                    println!("  #{n:<3} {:<20}  {} → {returned}", entry.borrower, entry.checkout_date);
                }
            })?;
        }

        Commands::ClearHistory { id, confirm } => {
            require_confirm(confirm, "erase the borrow history")?;
            let catalog = open_catalog(&config)?;
            let history = catalog.clear_history(&id.parse()?)?;
            out.emit(&history, || println!("Cleared history: {}", history.title))?;
        }

        Commands::Favorite { id, set } => {
            let catalog = open_catalog(&config)?;
            let id: BookId = id.parse()?;
            let book = match set {
                Some(value) => catalog.set_favorite(&id, value)?,
                None => catalog.toggle_favorite(&id)?,
            };
            out.emit(&book, || {
                let state = if book.is_favorite() { "favorite" } else { "not favorite" };
                println!("{}: {state}", book.title)
            })?;
        }

        Commands::Stats => {
            let stats = open_catalog(&config)?.stats()?;
            out.emit(&stats, || {
                println!("Catalog statistics:");
                println!("  Total books:  {}", stats.total);
                println!("  Available:    {}", stats.available);
                println!("  Checked out:  {}", stats.checked_out);
                println!("  Favorites:    {}", stats.favorites);
            })?;
        }

        Commands::Reset { confirm } => {
            require_confirm(confirm, "delete every book")?;
            let deleted = open_catalog(&config)?.delete_all()?;
            out.emit(&serde_json::json!({ "deleted": deleted }), || {
                println!("Deleted {deleted} books.")
            })?;
        }

        Commands::Serve { host, port } => {
            let mut server = config.server.clone();
            if let Some(host) = host {
                server.host = host;
            }
            if let Some(port) = port {
                server.port = port;
            }
            let catalog = open_catalog(&config)?;
            tokio::runtime::Runtime::new()?.block_on(bookbase_server::serve(&server, catalog))?;
        }

        Commands::Config { action } => match action {
            ConfigAction::List => {
                let kv = config_key_values(&config);
                out.emit(&kv, || {
                    for (k, v) in &kv {
                        println!("{k} = {v}");
                    }
                })?;
            }
            ConfigAction::Path => {
                let path = AppConfig::config_path();
                out.emit(&serde_json::json!({ "path": path }), || println!("{}", path.display()))?;
            }
            ConfigAction::Init { force } => {
                let path = AppConfig::config_path();
                if path.exists() && !force {
                    return Err(ConfirmRequired("overwrite the existing config (--force)").into());
                }
                config.save()?;
                out.emit(&serde_json::json!({ "path": path }), || {
                    println!("Wrote config: {}", path.display())
                })?;
            }
        },

        Commands::Doctor => {
            let report = doctor_report(&config, AppConfig::config_path());
            if let Some(err) = &report.database_error {
                if !out.json {
                    report.print();
                }
                return Err(DoctorFailed(err.clone()).into());
            }
            out.emit(&report, || {
                report.print();
                println!("\nAll checks passed ✓");
            })?;
        }

        Commands::Version => {
            let version = env!("CARGO_PKG_VERSION");
            out.emit(&serde_json::json!({ "version": version }), || {
                println!("bookbase v{version}")
            })?;
        }
    }

    Ok(())
}

// ─── Output ─────────────────────────────────────────────────────────────────

struct Output {
    json: bool,
    start: Instant,
}

impl Output {
    /// Print `data` in the JSON envelope, or run `text` for human output.
    fn emit<T: Serialize>(&self, data: &T, text: impl FnOnce()) -> Result<()> {
        if self.json {
            print_json(&serde_json::json!({
                "status": "ok",
                "data": data,
                "meta": { "duration_ms": self.start.elapsed().as_millis() }
            }))
        } else {
            text();
            Ok(())
        }
    }

    fn books(&self, books: &[Book], empty: &str) -> Result<()> {
        let data = serde_json::json!({ "items": books, "total": books.len() });
        self.emit(&data, || {
            if books.is_empty() {
                println!("{empty}");
            }
            for book in books {
                print_book_line(book);
            }
        })
    }
}

fn print_book_line(book: &Book) {
    let star = if book.is_favorite() { "★" } else { " " };
    let borrower = book
        .checked_out_by()
        .map(|b| format!("  ({b})"))
        .unwrap_or_default();
    println!(
        "{id}  {star} {title:<40}  {author:<25}  {status}{borrower}",
        id = &book.id.to_string()[..8],
        title = book.title,
        author = book.author,
        status = book.status(),
    );
}

fn print_book_details(book: &Book) {
    println!("{}", book.title);
    println!("  ID:          {}", book.id);
    println!("  Author:      {}", book.author);
    if !book.isbn.is_empty() {
        println!("  ISBN:        {}", book.isbn);
    }
    if !book.description.is_empty() {
        println!("  Description: {}", book.description);
    }
    println!("  Status:      {}", book.status());
    if let (Some(by), Some(date)) = (book.checked_out_by(), book.checked_out_date()) {
        println!("  Borrower:    {by} (since {date})");
    }
    println!("  Favorite:    {}", if book.is_favorite() { "yes" } else { "no" });
    println!("  Loans:       {}", book.borrow_history().len());
}

// ─── Doctor ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct DoctorReport {
    config_path: PathBuf,
    config_found: bool,
    database_path: PathBuf,
    book_count: Option<usize>,
    database_error: Option<String>,
}

fn doctor_report(config: &AppConfig, config_path: PathBuf) -> DoctorReport {
    let database_path = config.database_path();
    let (book_count, database_error) = match Catalog::open(&database_path).and_then(|c| c.count()) {
        Ok(count) => (Some(count), None),
        Err(e) => (None, Some(e.to_string())),
    };

    DoctorReport {
        config_found: config_path.exists(),
        config_path,
        database_path,
        book_count,
        database_error,
    }
}

impl DoctorReport {
    fn print(&self) {
        if self.config_found {
            println!("✓ Config: {}", self.config_path.display());
        } else {
            println!("○ Config: not found (using defaults)");
        }
        match (&self.book_count, &self.database_error) {
            (Some(count), _) => println!("✓ Database: {} ({count} books)", self.database_path.display()),
            (None, Some(err)) => println!("✗ Database: {err}"),
            (None, None) => {}
        }
    }
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn open_catalog(config: &AppConfig) -> Result<Catalog> {
    debug!(path = %config.database_path().display(), "opening catalog");
    Ok(Catalog::from_config(config)?)
}

fn require_confirm(confirm: bool, action: &'static str) -> Result<()> {
    if confirm {
        Ok(())
    } else {
        Err(ConfirmRequired(action).into())
    }
}

fn parse_status(s: &str) -> std::result::Result<StatusFilter, String> {
    match s {
        "all" => Ok(StatusFilter::All),
        "available" => Ok(StatusFilter::Available),
        "checked-out" => Ok(StatusFilter::CheckedOut),
        other => Err(format!("unknown status '{other}' (expected all, available or checked-out)")),
    }
}

fn exit_code(err: &anyhow::Error) -> ExitCode {
    if let Some(e) = err.downcast_ref::<BookbaseError>() {
        ExitCode::from(e)
    } else if err.downcast_ref::<ConfirmRequired>().is_some() {
        ExitCode::ConfirmRequired
    } else {
        ExitCode::GeneralError
    }
}

fn error_kind(code: ExitCode) -> &'static str {
    match code {
        ExitCode::NotFound => "not_found",
        ExitCode::InvalidArgs => "invalid_args",
        ExitCode::Conflict => "conflict",
        ExitCode::ConfirmRequired => "confirm_required",
        ExitCode::FileSystemError => "filesystem",
        ExitCode::Success | ExitCode::GeneralError => "error",
    }
}

fn config_key_values(config: &AppConfig) -> BTreeMap<&'static str, String> {
    let mut map = BTreeMap::new();
    map.insert("core.library_path", config.core.library_path.clone());
    map.insert("database_path", config.database_path().to_string_lossy().to_string());
    map.insert("server.host", config.server.host.clone());
    map.insert("server.port", config.server.port.to_string());
    map.insert("server.cors_origins", config.server.cors_origins.join(","));
    map.insert("logging.filter", config.logging.filter.clone());
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookbase_core::{BookStatus, LifecycleAction};
    use tempfile::TempDir;

    #[test]
    fn test_parse_checkout() {
        let cli = Cli::try_parse_from([
            "bookbase", "checkout", "some-id", "Alice", "--borrower-id", "u-1", "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Checkout { id, borrower, borrower_id } => {
                assert_eq!(id, "some-id");
                assert_eq!(borrower, "Alice");
                assert_eq!(borrower_id.as_deref(), Some("u-1"));
            }
            _ => panic!("expected checkout"),
        }
    }

    #[test]
    fn test_parse_list_status() {
        let cli = Cli::try_parse_from(["bookbase", "list", "--status", "checked-out", "--favorites"]).unwrap();
        match cli.command {
            Commands::List { status, favorites } => {
                assert_eq!(status, StatusFilter::CheckedOut);
                assert!(favorites);
            }
            _ => panic!("expected list"),
        }

        assert!(Cli::try_parse_from(["bookbase", "list", "--status", "lost"]).is_err());
    }

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["bookbase", "search", "@author:austen"]).unwrap();
        match cli.command {
            Commands::Search { query, status, favorites } => {
                assert_eq!(query, "@author:austen");
                assert_eq!(status, StatusFilter::All);
                assert!(!favorites);
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_parse_add_requires_title_and_author() {
        assert!(Cli::try_parse_from(["bookbase", "add", "--title", "Dune"]).is_err());
        assert!(Cli::try_parse_from(["bookbase", "add", "--title", "Dune", "--author", "Herbert"]).is_ok());
    }

    #[test]
    fn test_parse_serve_and_favorite() {
        let cli = Cli::try_parse_from(["bookbase", "serve", "--port", "8081"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { host: None, port: Some(8081) }));

        let cli = Cli::try_parse_from(["bookbase", "favorite", "x", "--set", "false"]).unwrap();
        assert!(matches!(cli.command, Commands::Favorite { set: Some(false), .. }));
    }

    #[test]
    fn test_require_confirm() {
        assert!(require_confirm(true, "reset").is_ok());
        let err = require_confirm(false, "reset").unwrap_err();
        assert_eq!(exit_code(&err), ExitCode::ConfirmRequired);
    }

    #[test]
    fn test_exit_codes() {
        let not_found = anyhow::Error::from(BookbaseError::NotFound("x".into()));
        assert_eq!(exit_code(&not_found), ExitCode::NotFound);

        let conflict = anyhow::Error::from(BookbaseError::InvalidTransition {
            id: "x".into(),
            status: BookStatus::CheckedOut,
            action: LifecycleAction::Checkout,
        });
        assert_eq!(exit_code(&conflict), ExitCode::Conflict);
        assert_eq!(error_kind(exit_code(&conflict)), "conflict");

        let other = anyhow::anyhow!("boom");
        assert_eq!(exit_code(&other), ExitCode::GeneralError);
    }

    #[test]
    fn test_doctor_report_healthy_library() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.set_library_path(dir.path().join("library"));

        let report = doctor_report(&config, dir.path().join("missing.toml"));
        assert!(!report.config_found);
        assert_eq!(report.book_count, Some(0));
        assert!(report.database_error.is_none());

        let data = serde_json::to_value(&report).unwrap();
        assert_eq!(data["book_count"], 0);
        assert!(data["database_error"].is_null());
    }

    #[test]
    fn test_doctor_report_unusable_library() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let mut config = AppConfig::default();
        config.set_library_path(blocker.join("library"));

        let report = doctor_report(&config, dir.path().join("missing.toml"));
        assert!(report.book_count.is_none());
        let message = report.database_error.unwrap();

        let err = anyhow::Error::from(DoctorFailed(message));
        assert_eq!(exit_code(&err), ExitCode::GeneralError);
        assert!(err.to_string().starts_with("Database check failed"));
    }
}
