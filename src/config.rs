use std::path::PathBuf;

use serde::Serialize;

/// Application-level constants
pub const APP_NAME: &str = "procsync";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Rows scanned from the top of a sheet when looking for the header row.
pub const DEFAULT_HEADER_SEARCH_ROWS: usize = 20;

/// Per-row error messages kept in an ingestion report; the counters stay exact.
pub const DEFAULT_MAX_REPORTED_ERRORS: usize = 50;

/// Get the application data directory.
/// `$PROCSYNC_DATA_DIR` when set, otherwise `<platform data dir>/procsync`.
pub fn app_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("PROCSYNC_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default location of the canonical entity store.
pub fn database_path() -> PathBuf {
    app_data_dir().join("procsync.db")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "info,procsync_lib=info"
}

/// Tunables for a single ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestConfig {
    pub header_search_rows: usize,
    pub max_reported_errors: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            header_search_rows: DEFAULT_HEADER_SEARCH_ROWS,
            max_reported_errors: DEFAULT_MAX_REPORTED_ERRORS,
        }
    }
}

impl IngestConfig {
    /// Defaults, with `PROCSYNC_HEADER_ROWS` overriding the header window.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(rows) = std::env::var("PROCSYNC_HEADER_ROWS")
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
        {
            config.header_search_rows = rows;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_lives_under_app_data() {
        let db = database_path();
        assert!(db.starts_with(app_data_dir()));
        assert!(db.ends_with("procsync.db"));
    }

    #[test]
    fn default_ingest_config() {
        let config = IngestConfig::default();
        assert_eq!(config.header_search_rows, 20);
        assert_eq!(config.max_reported_errors, 50);
    }

    #[test]
    fn app_name_is_procsync() {
        assert_eq!(APP_NAME, "procsync");
    }
}
