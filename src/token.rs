// Token lookup. An explicit `--token` file wins; otherwise the first
// existing rc file is used: `ncwrc` next to the executable, then `.ncwrc`
// in the home directory. Only the first line of the file counts.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::NcwError;

pub const RC_FILE: &str = "ncwrc";
pub const HOME_RC_FILE: &str = ".ncwrc";

/// Candidate rc files, in lookup order.
pub fn rc_candidates() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.canonicalize().ok())
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        out.push(dir.join(RC_FILE));
    }
    if let Some(home) = dirs::home_dir() {
        out.push(home.join(HOME_RC_FILE));
    }
    out
}

/// Trimmed first line of a token file. Read failures are reported and
/// treated as "no token".
pub fn read_token_file(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let token = text.lines().next().unwrap_or("").trim().to_string();
            if token.is_empty() {
                warn!("token file {} is empty", path.display());
                None
            } else {
                Some(token)
            }
        }
        Err(e) => {
            warn!("could not read token file {}: {}", path.display(), e);
            None
        }
    }
}

/// Resolve the token from `explicit` or, when absent, from `rc_files`.
pub fn resolve_token_from(explicit: Option<&Path>, rc_files: &[PathBuf]) -> Result<String, NcwError> {
    let token = match explicit {
        Some(path) => {
            debug!("token from token file {}", path.display());
            read_token_file(path)
        }
        None => rc_files.iter().filter(|p| p.is_file()).find_map(|p| {
            debug!("token from rc file {}", p.display());
            read_token_file(p)
        }),
    };
    token.ok_or(NcwError::MissingToken)
}

/// Resolve the token the way the CLI does.
pub fn resolve_token(explicit: Option<&Path>) -> Result<String, NcwError> {
    resolve_token_from(explicit, &rc_candidates())
}
