// Action-file parsers. Both formats are line oriented `KEY:value` text:
//
//   submission            download
//   DOC:<name>            DOC_ID:<id>
//   JOB:<name>   (n)      CALC_DIR:<path>
//   FILE:<path>  (n)      JOB_ID:<id>  (n)
//
// Keys are case-insensitive, blank lines and `#` comments are skipped.

use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Everything needed to create a document and submit one job per file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub doc_name: String,
    /// Same length as `files` once parsed.
    pub job_names: Vec<String>,
    pub files: Vec<PathBuf>,
    /// Non-fatal problems found while parsing (missing input files).
    pub errors: Vec<String>,
}

/// Which jobs of which document to fetch results for, and where to put them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub doc_id: String,
    pub calc_dir: PathBuf,
    pub job_ids: Vec<String>,
}

/// Split a line into an upper-cased key and a trimmed value. Only the first
/// colon separates, so values may contain colons (`FILE:C:\run\a.bdf`).
fn split_directive(line: &str) -> Option<(String, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match line.split_once(':') {
        Some((key, value)) => Some((key.trim().to_ascii_uppercase(), value.trim())),
        None => {
            debug!("ignoring line without key: {}", line);
            None
        }
    }
}

fn read_action_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read action file {}", path.display()))
}

/// Default document name, e.g. `ncw_20260101_120000`.
pub fn default_doc_name() -> String {
    format!("ncw_{}", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Absolute directory containing `path`.
fn base_dir(path: &Path) -> Result<PathBuf> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    if parent.is_absolute() {
        Ok(parent)
    } else {
        let cwd = std::env::current_dir().context("Failed to read current directory")?;
        Ok(cwd.join(parent))
    }
}

/// Values with a separator are taken verbatim, bare names are looked up
/// next to the submission file.
fn resolve_input(value: &str, base: &Path) -> PathBuf {
    if value.contains('/') || value.contains('\\') {
        PathBuf::from(value)
    } else {
        base.join(value)
    }
}

/// Make `names` exactly `count` long. Surplus names are dropped from the
/// end; missing ones become `<last>_1`, `<last>_2`, ... where `<last>` is
/// the last given name, or `fallback` when none was given.
pub fn reconcile_job_names(mut names: Vec<String>, count: usize, fallback: &str) -> Vec<String> {
    if names.len() >= count {
        names.truncate(count);
        return names;
    }
    let base = names.last().cloned().unwrap_or_else(|| fallback.to_string());
    let missing = count - names.len();
    names.extend((1..=missing).map(|i| format!("{}_{}", base, i)));
    names
}

/// Parse a submission file. Missing input files are recorded in `errors`
/// and left out; an empty `files` list is for the caller to reject.
pub fn parse_submit_file(path: &Path) -> Result<SubmitRequest> {
    let text = read_action_file(path)?;
    parse_submit_str(&text, &base_dir(path)?)
}

/// Parse submission directives, resolving bare file names against `base`.
pub fn parse_submit_str(text: &str, base: &Path) -> Result<SubmitRequest> {
    let mut doc_name = None;
    let mut job_names = Vec::new();
    let mut files = Vec::new();
    let mut errors = Vec::new();

    for line in text.lines() {
        let Some((key, value)) = split_directive(line) else {
            continue;
        };
        match key.as_str() {
            "DOC" => doc_name = Some(value.to_string()),
            "JOB" => job_names.push(value.to_string()),
            "FILE" => {
                let resolved = resolve_input(value, base);
                if resolved.exists() {
                    debug!("input file {}", resolved.display());
                    files.push(resolved);
                } else {
                    warn!("input file not found: {}", resolved.display());
                    errors.push(format!("WARNING: file not found: {}", resolved.display()));
                }
            }
            other => debug!("ignoring unknown submission key {}", other),
        }
    }

    let doc_name = doc_name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(default_doc_name);
    let job_names = reconcile_job_names(job_names, files.len(), &doc_name);

    Ok(SubmitRequest {
        doc_name,
        job_names,
        files,
        errors,
    })
}

/// Parse a download file. An empty `job_ids` list is for the caller to
/// reject.
pub fn parse_download_file(path: &Path) -> Result<DownloadRequest> {
    let text = read_action_file(path)?;
    Ok(parse_download_str(&text))
}

pub fn parse_download_str(text: &str) -> DownloadRequest {
    let mut doc_id = String::new();
    let mut calc_dir = PathBuf::from(".");
    let mut job_ids = Vec::new();

    for line in text.lines() {
        let Some((key, value)) = split_directive(line) else {
            continue;
        };
        match key.as_str() {
            "DOC_ID" => doc_id = value.to_string(),
            "CALC_DIR" if !value.is_empty() => calc_dir = PathBuf::from(value),
            "JOB_ID" => job_ids.push(value.to_string()),
            other => debug!("ignoring unknown download key {}", other),
        }
    }

    DownloadRequest {
        doc_id,
        calc_dir,
        job_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "SOL 101\n").unwrap();
        path
    }

    #[test]
    fn fewer_jobs_than_files_are_suffixed() {
        let dir = tempfile::tempdir().unwrap();
        for f in ["a.bdf", "b.bdf", "c.bdf", "d.bdf"] {
            touch(dir.path(), f);
        }
        let text = "DOC:wing\nJOB:static\nJOB:modal\nFILE:a.bdf\nFILE:b.bdf\nFILE:c.bdf\nFILE:d.bdf\n";
        let req = parse_submit_str(text, dir.path()).unwrap();
        assert_eq!(req.doc_name, "wing");
        assert_eq!(req.job_names, vec!["static", "modal", "modal_1", "modal_2"]);
        assert_eq!(req.files.len(), 4);
        assert!(req.errors.is_empty());
    }

    #[test]
    fn surplus_jobs_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.bdf");
        let text = "JOB:one\nJOB:two\nJOB:three\nFILE:a.bdf\n";
        let req = parse_submit_str(text, dir.path()).unwrap();
        assert_eq!(req.job_names, vec!["one"]);
    }

    #[test]
    fn bare_names_resolve_next_to_the_submission_file() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.bdf");
        let submit = dir.path().join("submit.txt");
        fs::write(&submit, "FILE:a.bdf\n").unwrap();
        let req = parse_submit_file(&submit).unwrap();
        assert_eq!(req.files, vec![dir.path().join("a.bdf")]);
    }

    #[test]
    fn values_with_separator_are_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("models");
        fs::create_dir(&sub).unwrap();
        let file = touch(&sub, "a.bdf");
        let text = format!("FILE:{}\n", file.display());
        let req = parse_submit_str(&text, Path::new("/somewhere/else")).unwrap();
        assert_eq!(req.files, vec![file]);
    }

    #[test]
    fn missing_files_are_recorded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.bdf");
        let text = "JOB:j\nFILE:missing.bdf\nFILE:a.bdf\n";
        let req = parse_submit_str(text, dir.path()).unwrap();
        assert_eq!(req.files, vec![dir.path().join("a.bdf")]);
        assert_eq!(req.job_names, vec!["j"]);
        assert_eq!(req.errors.len(), 1);
        assert!(req.errors[0].contains("missing.bdf"));
    }

    #[test]
    fn keys_are_case_insensitive_and_comments_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.bdf");
        let text = "# header\n\ndoc: bracket \n Job:run\nfile:a.bdf\nnonsense\n";
        let req = parse_submit_str(text, dir.path()).unwrap();
        assert_eq!(req.doc_name, "bracket");
        assert_eq!(req.job_names, vec!["run"]);
        assert_eq!(req.files.len(), 1);
    }

    #[test]
    fn doc_name_defaults_to_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let req = parse_submit_str("", dir.path()).unwrap();
        assert!(req.doc_name.starts_with("ncw_"));
        assert!(req.files.is_empty());
        assert!(req.job_names.is_empty());
    }

    #[test]
    fn no_job_names_fall_back_to_doc_name() {
        let names = reconcile_job_names(Vec::new(), 2, "wing");
        assert_eq!(names, vec!["wing_1", "wing_2"]);
    }

    #[test]
    fn download_file_keeps_job_order() {
        let req = parse_download_str("DOC_ID:d-42\nCALC_DIR:/data/results\nJOB_ID:j-2\nJOB_ID:j-1\n");
        assert_eq!(req.doc_id, "d-42");
        assert_eq!(req.calc_dir, PathBuf::from("/data/results"));
        assert_eq!(req.job_ids, vec!["j-2", "j-1"]);
    }

    #[test]
    fn download_calc_dir_defaults_to_current() {
        let req = parse_download_str("doc_id:d-1\njob_id:j-1\n");
        assert_eq!(req.calc_dir, PathBuf::from("."));
        assert_eq!(req.job_ids, vec!["j-1"]);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(parse_download_file(&dir.path().join("absent.txt")).is_err());
    }
}
