// CLI layer: argument definitions, argument validation and the linear
// pipeline authenticate -> connect -> login -> action -> teardown.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::api::ComputeService;
use crate::config::Settings;
use crate::error::NcwError;
use crate::request::{parse_download_file, parse_submit_file};
use crate::session::Session;
use crate::token;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum Action {
    Status,
    Submit,
    Download,
}

impl Action {
    /// SUBMIT and DOWNLOAD read their parameters from an action file.
    pub fn needs_file(self) -> bool {
        matches!(self, Action::Submit | Action::Download)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Status => "STATUS",
            Action::Submit => "SUBMIT",
            Action::Download => "DOWNLOAD",
        };
        f.write_str(s)
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "ncw",
    version,
    about = "Nexus Compute Wrapper",
    after_help = "Without --token the first line of an `ncwrc` file next to the binary \
                  (or `~/.ncwrc`) is used as token.\n\nExamples:\n  \
                  ncw --action SUBMIT --file submit_file.txt\n  \
                  ncw --action STATUS --token token_file.txt"
)]
pub struct Cli {
    /// Action to perform
    #[arg(short, long, value_enum, ignore_case = true)]
    pub action: Action,

    /// Action file, needed for SUBMIT/DOWNLOAD
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Token file which contains the token
    #[arg(short, long)]
    pub token: Option<PathBuf>,

    /// Verbose tracing
    #[arg(short, long, default_value_t = false)]
    pub debug: bool,
}

impl Cli {
    /// Check the action file and the token source before anything is sent.
    pub fn validate(&self) -> Result<(), NcwError> {
        self.validate_with(&token::rc_candidates())
    }

    pub fn validate_with(&self, rc_files: &[PathBuf]) -> Result<(), NcwError> {
        if self.action.needs_file() {
            match &self.file {
                None => {
                    return Err(NcwError::MissingActionFile {
                        action: self.action.to_string(),
                    })
                }
                Some(path) if !path.exists() => {
                    return Err(NcwError::ActionFileNotFound { path: path.clone() })
                }
                Some(path) => debug!("action file found: {}", path.display()),
            }
        }

        match &self.token {
            Some(path) if !path.exists() => Err(NcwError::TokenFileNotFound { path: path.clone() }),
            Some(path) => {
                debug!("token file found: {}", path.display());
                Ok(())
            }
            None => match rc_files.iter().find(|p| p.is_file()) {
                Some(rc) => {
                    debug!("rc token file found: {}", rc.display());
                    Ok(())
                }
                None => Err(NcwError::NoTokenSource),
            },
        }
    }
}

/// Run the validated command against `service`. The session is torn down
/// whether or not the action succeeded.
pub fn run<S: ComputeService>(cli: &Cli, service: S, settings: &Settings) -> Result<()> {
    debug!("arguments: {:?}", cli);
    debug!("settings: {:?}", settings);

    let token = token::resolve_token(cli.token.as_deref())?;
    let mut session = Session::open(service, token, settings.report_dir.clone())?;

    let outcome = run_action(cli, &mut session);
    if let Err(e) = &outcome {
        error!("{} failed: {:#}", cli.action, e);
    }
    let closed = session.teardown();
    match (outcome, closed) {
        (Err(e), Err(teardown)) => {
            warn!("teardown after failed action: {:#}", teardown);
            Err(e)
        }
        (outcome, closed) => outcome.and(closed),
    }
}

fn run_action<S: ComputeService>(cli: &Cli, session: &mut Session<S>) -> Result<()> {
    match cli.action {
        Action::Status => {
            session.status()?;
        }
        Action::Submit => {
            let path = cli.file.as_deref().ok_or_else(|| NcwError::MissingActionFile {
                action: cli.action.to_string(),
            })?;
            let request = parse_submit_file(path)?;
            let lines = session.submit(&request)?;
            info!("submitted {} job(s) from {}", request.files.len(), path.display());
            debug!("submit log has {} line(s)", lines.len());
        }
        Action::Download => {
            let path = cli.file.as_deref().ok_or_else(|| NcwError::MissingActionFile {
                action: cli.action.to_string(),
            })?;
            let request = parse_download_file(path)?;
            session.download(&request)?;
            info!("downloaded results of {} job(s)", request.job_ids.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ncw").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn parses_flags() {
        let cli = parse(&["--action", "SUBMIT", "--file", "s.txt", "--token", "t.txt", "--debug"]);
        assert_eq!(cli.action, Action::Submit);
        assert_eq!(cli.file, Some(PathBuf::from("s.txt")));
        assert_eq!(cli.token, Some(PathBuf::from("t.txt")));
        assert!(cli.debug);
    }

    #[test]
    fn action_is_case_insensitive() {
        assert_eq!(parse(&["-a", "download"]).action, Action::Download);
        assert_eq!(parse(&["--action=Status"]).action, Action::Status);
    }

    #[test]
    fn unknown_or_missing_action_is_rejected() {
        assert!(Cli::try_parse_from(["ncw", "--action", "DELETE"]).is_err());
        assert!(Cli::try_parse_from(["ncw"]).is_err());
    }

    #[test]
    fn submit_without_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let token = dir.path().join("token.txt");
        fs::write(&token, "abc\n").unwrap();
        let mut cli = parse(&["--action", "SUBMIT"]);
        cli.token = Some(token);
        let err = cli.validate_with(&[]).unwrap_err();
        assert!(matches!(err, NcwError::MissingActionFile { .. }));
        assert!(err.is_usage());

        cli.file = Some(dir.path().join("absent.txt"));
        assert!(matches!(
            cli.validate_with(&[]),
            Err(NcwError::ActionFileNotFound { .. })
        ));
    }

    #[test]
    fn token_source_is_required() {
        let dir = tempfile::tempdir().unwrap();
        let cli = parse(&["--action", "STATUS"]);
        let missing_rc = dir.path().join("ncwrc");
        assert!(matches!(
            cli.validate_with(&[missing_rc.clone()]),
            Err(NcwError::NoTokenSource)
        ));

        fs::write(&missing_rc, "abc\n").unwrap();
        assert!(cli.validate_with(&[missing_rc]).is_ok());

        let mut cli = cli;
        cli.token = Some(dir.path().join("absent"));
        assert!(matches!(
            cli.validate_with(&[]),
            Err(NcwError::TokenFileNotFound { .. })
        ));
    }

    #[test]
    fn status_needs_no_file() {
        assert!(!Action::Status.needs_file());
        assert!(Action::Submit.needs_file());
        assert_eq!(Action::Download.to_string(), "DOWNLOAD");
    }
}
