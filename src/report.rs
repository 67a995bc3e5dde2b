// Report writer: plain text files with one entry per line. Used for the
// status report and the submit/download/error logs.

use anyhow::{Context, Result};
use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const STATUS_REPORT: &str = "ncw_output_status.txt";
pub const SUBMIT_LOG: &str = "ncw_output_submit.txt";
pub const DOWNLOAD_LOG: &str = "ncw_output_download.txt";
pub const ERROR_REPORT: &str = "ncw_output_error.txt";

/// Write `lines` to `path`, replacing any previous content. With
/// `carriage_return` each line is terminated by `\n`; with `echo` every line
/// is also printed to stdout.
pub fn write_lines<I, S>(lines: I, path: &Path, carriage_return: bool, echo: bool) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let file = File::create(path)
        .with_context(|| format!("Failed to create report file {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for line in lines {
        let line = line.as_ref();
        out.write_all(line.as_bytes())?;
        if carriage_return {
            out.write_all(b"\n")?;
        }
        if echo {
            println!("{}", line);
        }
    }
    out.flush()
        .with_context(|| format!("Failed to write report file {}", path.display()))?;
    Ok(())
}

/// Flatten a mapping into `key  value` lines and write them like
/// [`write_lines`].
pub fn write_map<I, K, V>(map: I, path: &Path, carriage_return: bool, echo: bool) -> Result<()>
where
    I: IntoIterator<Item = (K, V)>,
    K: Display,
    V: Display,
{
    let lines = map.into_iter().map(|(k, v)| format!("{}  {}", k, v));
    write_lines(lines, path, carriage_return, echo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn lines_with_carriage_return() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_lines(["a", "b"], &path, true, false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
    }

    #[test]
    fn lines_without_carriage_return_are_concatenated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_lines(vec!["a".to_string(), "b".to_string()], &path, false, false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "ab");
    }

    #[test]
    fn map_is_flattened_with_two_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.txt");
        let mut map = BTreeMap::new();
        map.insert("x", 1);
        write_map(map, &path, true, false).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.lines().any(|l| l == "x  1"));
    }

    #[test]
    fn previous_content_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_lines(["old", "older"], &path, true, false).unwrap();
        write_lines(["new"], &path, true, false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("out.txt");
        assert!(write_lines(["a"], &path, true, false).is_err());
    }
}
