// Runtime settings: where the gateway lives and where reports are written.
// Both come from the environment so the binary needs no config file of its
// own; the token has separate lookup rules (see `token`).

use std::path::PathBuf;

/// Environment variable naming the gateway base URL.
pub const API_URL_VAR: &str = "NCW_API_URL";
/// Environment variable naming the directory for report files.
pub const REPORT_DIR_VAR: &str = "NCW_REPORT_DIR";

const DEFAULT_API_URL: &str = "http://localhost:3001";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub report_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_url: DEFAULT_API_URL.to_string(),
            report_dir: PathBuf::from("."),
        }
    }
}

impl Settings {
    /// Read `NCW_API_URL` and `NCW_REPORT_DIR`, falling back to
    /// `http://localhost:3001` and the current directory.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Settings::default();
        let api_url = lookup(API_URL_VAR)
            .filter(|v| !v.trim().is_empty())
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url);
        let report_dir = lookup(REPORT_DIR_VAR)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.report_dir);
        Settings { api_url, report_dir }
    }
}
