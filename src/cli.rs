use clap::{Parser, Subcommand, ValueHint};
use firebase_console::explorer::query_builder::{QueryCondition, QueryOrder};
use firebase_console::firestore::models::{Direction, FieldOperator};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "warn", global = true)]
    pub log_level: tracing::Level,

    /// Project configuration file (JSON). Without it FIREBASE_CONFIG is tried.
    #[arg(long, env = "FIREBASE_CONFIG_FILE", global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Sign in with this account before running the command
    #[arg(long, env = "FIREBASE_EMAIL", global = true)]
    pub email: Option<String>,

    #[arg(long, env = "FIREBASE_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    /// Local key-value store holding the bookmarked collections
    #[arg(long, env = "FIREBASE_CONSOLE_STORE", global = true, value_hint = ValueHint::FilePath)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate, show or export the project configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Run a one-shot Firestore query
    Query {
        /// Collection to query
        collection: String,
        /// Filter as "field operator value", e.g. "age >= 18"
        #[arg(long = "where", value_parser = parse_condition)]
        conditions: Vec<QueryCondition>,
        /// Ordering as "field [asc|desc]"; the first one is the primary order
        #[arg(long = "order-by", value_parser = parse_order)]
        orders: Vec<QueryOrder>,
        /// Maximum number of documents
        #[arg(long, default_value = "10", allow_hyphen_values = true)]
        limit: String,
    },
    /// List the root collections of the database
    Collections,
    /// Bookmarked collections
    Bookmarks {
        #[command(subcommand)]
        command: BookmarkCommands,
    },
    /// Browse the storage bucket
    Storage {
        #[command(subcommand)]
        command: StorageCommands,
    },
    /// Authentication helpers
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate a configuration file, or stdin when no file is given
    Check {
        #[arg(value_hint = ValueHint::FilePath)]
        file: Option<PathBuf>,
    },
    /// Print the active configuration
    Show,
    /// Write the active configuration as pretty JSON
    Export {
        #[arg(short, long, default_value = firebase_console::config::EXPORT_FILE_NAME)]
        out: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum BookmarkCommands {
    List,
    Add { name: String },
    Remove { name: String },
}

#[derive(Subcommand, Debug)]
pub enum StorageCommands {
    /// List one folder level
    Ls {
        #[arg(default_value = "")]
        path: String,
    },
    /// Upload a local file
    Upload {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
        /// Destination folder in the bucket
        #[arg(long, default_value = "")]
        dest: String,
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
    },
    /// Download an object
    Download {
        path: String,
        /// Output file; defaults to the object's name
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Sign in with --email and --password
    SignIn,
    /// Show the signed-in account
    Whoami,
}

/// Parses `"field operator value"`. The value is everything after the
/// operator, so it may contain spaces.
pub fn parse_condition(s: &str) -> Result<QueryCondition, String> {
    let mut parts = s.trim().splitn(3, char::is_whitespace);
    let field = parts.next().unwrap_or_default();
    let operator: FieldOperator = parts
        .next()
        .ok_or_else(|| format!("expected \"field operator value\", got '{}'", s))?
        .parse()?;
    let value = parts.next().unwrap_or_default().trim();
    Ok(QueryCondition::new(field, operator, value))
}

pub fn parse_order(s: &str) -> Result<QueryOrder, String> {
    let mut parts = s.split_whitespace();
    let field = parts.next().unwrap_or_default();
    let direction = match parts.next() {
        Some(direction) => direction.parse()?,
        None => Direction::Ascending,
    };
    if let Some(extra) = parts.next() {
        return Err(format!("unexpected '{}' after direction", extra));
    }
    Ok(QueryOrder::new(field, direction))
}
