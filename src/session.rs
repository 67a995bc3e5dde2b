// Session wrapper: one connected, logged-in user and the three actions the
// CLI offers on top of it. Acquire with `Session::open`, release with
// `Session::teardown`.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::api::{ComputeService, Document, JobSpec, RemoteFile, SolverConfigs, User};
use crate::error::NcwError;
use crate::report::{self, DOWNLOAD_LOG, ERROR_REPORT, STATUS_REPORT, SUBMIT_LOG};
use crate::request::{DownloadRequest, SubmitRequest};

pub const SOLVER: &str = "nastran";
pub const SOLVER_VERSION: &str = "2023.1";
pub const HARDWARE_CONFIG: &str = "nastran_8cpu_32gb";

/// Command line the solver runs for one input deck.
pub fn command_line(input_name: &str) -> String {
    format!("{} {} scr=yes old=no", SOLVER, input_name)
}

/// Job payload for `input` with the fixed solver configuration.
pub fn job_spec(job_name: &str, input: &RemoteFile) -> JobSpec {
    JobSpec {
        name: job_name.to_string(),
        solver: SOLVER.to_string(),
        version: SOLVER_VERSION.to_string(),
        hardware: HARDWARE_CONFIG.to_string(),
        command_line: command_line(&input.name),
        input_files: vec![input.id.clone()],
    }
}

/// Report lines for the solver configuration block: the keys of the
/// `versions` and `configs` objects of the Nastran entry.
pub fn solver_config_lines(configs: &SolverConfigs) -> Vec<String> {
    let mut lines = Vec::new();
    let Some(nastran) = configs.get(SOLVER).and_then(|v| v.as_object()) else {
        return lines;
    };
    for (section, entries) in nastran {
        if section != "versions" && section != "configs" {
            continue;
        }
        if let Some(entries) = entries.as_object() {
            for key in entries.keys() {
                lines.push(format!("  {} {} {}", SOLVER, section, key));
            }
        }
    }
    lines
}

/// Final path component only, so remote names cannot escape the target
/// directory.
fn local_name(name: &str) -> String {
    let cleaned = name.replace('\\', "/");
    match Path::new(&cleaned).file_name() {
        Some(n) => n.to_string_lossy().into_owned(),
        None => "_".to_string(),
    }
}

/// Local results directory per requested job: the job name, or the id when
/// the name is unknown. Names shared by several requested jobs get the id
/// appended so their results do not overwrite each other.
pub fn result_dir_names(names: &HashMap<String, String>, job_ids: &[String]) -> Vec<String> {
    let base: Vec<String> = job_ids
        .iter()
        .map(|id| local_name(names.get(id).unwrap_or(id)))
        .collect();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in &base {
        *counts.entry(name.as_str()).or_default() += 1;
    }
    job_ids
        .iter()
        .zip(&base)
        .map(|(id, name)| {
            if counts[name.as_str()] > 1 {
                warn!("job name {} is not unique, using {}_{}", name, name, local_name(id));
                format!("{}_{}", name, local_name(id))
            } else {
                name.clone()
            }
        })
        .collect()
}

pub struct Session<S: ComputeService> {
    service: S,
    token: String,
    port: u16,
    user: User,
    report_dir: PathBuf,
    console: bool,
}

impl<S: ComputeService> Session<S> {
    /// Connect to the service and log in with `token`.
    pub fn open(mut service: S, token: String, report_dir: PathBuf) -> Result<Self> {
        if token.is_empty() {
            return Err(NcwError::MissingToken.into());
        }
        let port = service.start().context("Failed to connect to compute service")?;
        info!("port: {}", port);
        let user = match service.login(&token) {
            Ok(user) => user,
            Err(e) => {
                if let Err(stop) = service.stop() {
                    warn!("failed to close connection after login error: {:#}", stop);
                }
                return Err(e);
            }
        };
        info!("user id: {}", user.login_ref_id);
        Ok(Session {
            service,
            token,
            port,
            user,
            report_dir,
            console: true,
        })
    }

    /// Turn console echo and progress bars on or off (on by default).
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    fn report_path(&self, name: &str) -> PathBuf {
        self.report_dir.join(name)
    }

    fn write_report(&self, name: &str, lines: &[String]) -> Result<()> {
        report::write_lines(lines, &self.report_path(name), true, self.console)
    }

    fn progress_bar(&self, name: &str) -> Result<ProgressBar> {
        if !self.console {
            return Ok(ProgressBar::hidden());
        }
        let pb = ProgressBar::new(0);
        pb.set_style(ProgressStyle::with_template(
            "{msg:20} [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec})",
        )?);
        pb.set_message(name.to_string());
        Ok(pb)
    }

    /// Documents, their jobs and files, and the available solver
    /// configurations. Written to the status report and returned.
    pub fn status(&mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        let mut solver_configs: Option<SolverConfigs> = None;

        let docs = self.service.list_documents(&self.user)?;
        lines.push(format!("number of documents: {}", docs.len()));
        for entry in &docs {
            lines.push("  ".to_string());
            lines.push(format!(" doc name/id: {}      {}", entry.name, entry.id));
            let doc = self.service.load_document(&self.user, &entry.id)?;

            let jobs = self.service.list_jobs(&doc)?;
            lines.push(format!("  number of jobs: {}", jobs.len()));
            for job in &jobs {
                lines.push(format!("   job name/id/status: {}  {}  {}", job.name, job.id, job.status));
            }

            let files = self.service.list_files(&doc)?;
            lines.push("  files in document:".to_string());
            for file in &files {
                lines.push(format!("   {}", file));
            }

            // identical for every document
            if solver_configs.is_none() {
                solver_configs = Some(self.service.solver_configs(&doc)?);
            }
            self.service.close_document(&doc)?;
        }

        lines.push("\n\nsolver configurations:".to_string());
        if let Some(configs) = &solver_configs {
            lines.extend(solver_config_lines(configs));
        }

        self.write_report(STATUS_REPORT, &lines)?;
        Ok(lines)
    }

    /// Create a document, upload every input file and submit one job per
    /// file. Every produced id goes to the submit log.
    pub fn submit(&mut self, request: &SubmitRequest) -> Result<Vec<String>> {
        if request.files.is_empty() {
            let mut lines = request.errors.clone();
            lines.push(format!("ERROR: {}", NcwError::NoInputFiles));
            self.write_report(ERROR_REPORT, &lines)?;
            return Err(NcwError::NoInputFiles.into());
        }

        let mut log = request.errors.clone();
        let result = self.submit_into(request, &mut log);
        self.write_report(SUBMIT_LOG, &log)?;
        result.map(|()| log)
    }

    fn submit_into(&mut self, request: &SubmitRequest, log: &mut Vec<String>) -> Result<()> {
        let doc = self.service.create_document(&self.user, &request.doc_name)?;
        info!("created document {} ({})", doc.name, doc.id);
        log.push(format!("document name/id: {}  {}", doc.name, doc.id));

        let mut uploaded = Vec::with_capacity(request.files.len());
        for path in &request.files {
            let name = local_name(&path.to_string_lossy());
            let pb = self.progress_bar(&name)?;
            let remote = self.service.upload_file(&doc, path, &name, &pb)?;
            debug!("uploaded {} as {}", path.display(), remote.id);
            log.push(format!("file name/id: {}  {}", remote.name, remote.id));
            uploaded.push(remote);
        }

        for (job_name, input) in request.job_names.iter().zip(&uploaded) {
            let spec = job_spec(job_name, input);
            let job = self.service.submit_job(&doc, &spec)?;
            info!("submitted job {} ({})", job.name, job.id);
            log.push(format!("job name/id: {}  {}", job.name, job.id));
        }

        self.service.close_document(&doc)?;
        Ok(())
    }

    /// Fetch the result files of the requested jobs into
    /// `<calc_dir>/<job name>`.
    pub fn download(&mut self, request: &DownloadRequest) -> Result<Vec<String>> {
        if request.job_ids.is_empty() {
            let lines = vec![format!("ERROR: {}", NcwError::NoJobIds)];
            self.write_report(ERROR_REPORT, &lines)?;
            return Err(NcwError::NoJobIds.into());
        }

        let mut log = Vec::new();
        let result = self.download_into(request, &mut log);
        self.write_report(DOWNLOAD_LOG, &log)?;
        result.map(|()| log)
    }

    fn download_into(&mut self, request: &DownloadRequest, log: &mut Vec<String>) -> Result<()> {
        let doc: Document = self.service.load_document(&self.user, &request.doc_id)?;
        log.push(format!("document name/id: {}  {}", doc.name, doc.id));

        let names: HashMap<String, String> = self
            .service
            .list_jobs(&doc)?
            .into_iter()
            .map(|job| (job.id, job.name))
            .collect();

        let dirs = result_dir_names(&names, &request.job_ids);
        for (job_id, dir_name) in request.job_ids.iter().zip(&dirs) {
            let job_name = names.get(job_id).map(String::as_str).unwrap_or(job_id);
            let target = request.calc_dir.join(dir_name);
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create results directory {}", target.display()))?;

            let files = self.service.list_job_files(&doc, job_id)?;
            log.push(format!("job name/id: {}  {}  result files: {}", job_name, job_id, files.len()));
            for file in &files {
                let dest = target.join(local_name(&file.name));
                let pb = self.progress_bar(&file.name)?;
                self.service.download_file(&doc, file, &dest, &pb)?;
                info!("downloaded {}", dest.display());
                log.push(format!("   downloaded: {}", dest.display()));
            }
        }

        self.service.close_document(&doc)?;
        Ok(())
    }

    /// Log off and close the connection. The connection is closed even when
    /// logging off fails.
    pub fn teardown(mut self) -> Result<()> {
        let logoff = self.service.logoff(&self.user);
        let stop = self.service.stop();
        logoff.context("Failed to log off")?;
        stop.context("Failed to close connection")?;
        debug!("session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn solver_lines_only_for_nastran_versions_and_configs() {
        let configs = json!({
            "nastran": {
                "versions": {"2023.1": {}, "2024.1": {}},
                "configs": {"nastran_8cpu_32gb": {}},
                "queues": {"short": {}}
            },
            "abaqus": {"versions": {"2022": {}}}
        });
        let lines = solver_config_lines(configs.as_object().unwrap());
        assert_eq!(
            lines,
            vec![
                "  nastran configs nastran_8cpu_32gb",
                "  nastran versions 2023.1",
                "  nastran versions 2024.1",
            ]
        );
    }

    #[test]
    fn job_spec_uses_fixed_solver() {
        let input = RemoteFile {
            id: "f-1".into(),
            name: "wing.bdf".into(),
            size: 10,
        };
        let spec = job_spec("static", &input);
        assert_eq!(spec.solver, "nastran");
        assert_eq!(spec.version, SOLVER_VERSION);
        assert_eq!(spec.hardware, HARDWARE_CONFIG);
        assert_eq!(spec.command_line, "nastran wing.bdf scr=yes old=no");
        assert_eq!(spec.input_files, vec!["f-1"]);
    }

    #[test]
    fn repeated_job_names_get_the_id_appended() {
        let names: HashMap<String, String> = [("j-1", "static"), ("j-2", "static"), ("j-3", "modal")]
            .into_iter()
            .map(|(id, name)| (id.to_string(), name.to_string()))
            .collect();
        let ids: Vec<String> = ["j-1", "j-2", "j-3", "j-9"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            result_dir_names(&names, &ids),
            vec!["static_j-1", "static_j-2", "modal", "j-9"]
        );
    }

    #[test]
    fn local_name_strips_directories() {
        assert_eq!(local_name("out/wing.op2"), "wing.op2");
        assert_eq!(local_name("..\\..\\evil.f06"), "evil.f06");
        assert_eq!(local_name("plain"), "plain");
        assert_eq!(local_name(".."), "_");
    }
}
