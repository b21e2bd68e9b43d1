//! Path and environment resolution for the achieve CLI.

/// Environment variable overriding the store location.
pub const DB_ENV: &str = "ACHIEVE_DB";

/// Environment variable holding the `env_logger` filter.
pub const LOG_ENV: &str = "ACHIEVE_LOG";

/// Resolve the store path.
/// Checks `ACHIEVE_DB`, falls back to `$HOME/.achieve/achieve.db`.
pub fn db_path() -> String {
    std::env::var(DB_ENV).unwrap_or_else(|_| default_db_path())
}

pub fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    format!("{home}/.achieve/achieve.db")
}
