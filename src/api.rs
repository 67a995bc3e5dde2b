// API client module: the seam between the wrapper and the compute service.
//
// `ComputeService` is everything the session needs from the service. The
// `ApiClient` implementation talks to the gateway over blocking HTTP; session
// tests use an in-memory implementation instead.

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::path::Path;
use tracing::debug;

use crate::config::Settings;

/// Free-form solver metadata, keyed by solver name (`nastran`, ...).
pub type SolverConfigs = serde_json::Map<String, serde_json::Value>;

/// Logged-in user handle returned by the login endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub login_ref_id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug)]
struct AuthRequest<'a> {
    token: &'a str,
}

#[derive(Serialize, Deserialize, Debug)]
struct NewDocument<'a> {
    name: &'a str,
}

/// Entry of the user's document listing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DocumentSummary {
    pub id: String,
    pub name: String,
}

/// An open document. Must be handed back to `close_document`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Created,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Created => "CREATED",
            JobStatus::Queued => "QUEUED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub id: String,
    pub name: String,
    pub status: JobStatus,
}

/// A file stored in a document or produced by a job.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

impl fmt::Display for RemoteFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {}  {} bytes", self.name, self.id, self.size)
    }
}

/// Job submission payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: String,
    pub solver: String,
    pub version: String,
    pub hardware: String,
    pub command_line: String,
    /// Ids of previously uploaded files.
    pub input_files: Vec<String>,
}

/// The operations of the compute service the wrapper relies on.
pub trait ComputeService {
    /// Establish the connection; returns the local connection handle (port).
    fn start(&mut self) -> Result<u16>;
    /// Exchange a token for an authenticated user.
    fn login(&mut self, token: &str) -> Result<User>;
    fn logoff(&mut self, user: &User) -> Result<()>;
    /// Close the connection.
    fn stop(&mut self) -> Result<()>;

    fn list_documents(&self, user: &User) -> Result<Vec<DocumentSummary>>;
    fn create_document(&self, user: &User, name: &str) -> Result<Document>;
    fn load_document(&self, user: &User, id: &str) -> Result<Document>;
    fn close_document(&self, doc: &Document) -> Result<()>;

    fn list_jobs(&self, doc: &Document) -> Result<Vec<JobSummary>>;
    fn list_files(&self, doc: &Document) -> Result<Vec<RemoteFile>>;
    fn solver_configs(&self, doc: &Document) -> Result<SolverConfigs>;

    /// Upload `path` into `doc` under `name`, advancing `progress`.
    fn upload_file(&self, doc: &Document, path: &Path, name: &str, progress: &ProgressBar) -> Result<RemoteFile>;
    fn submit_job(&self, doc: &Document, spec: &JobSpec) -> Result<JobSummary>;
    fn list_job_files(&self, doc: &Document, job_id: &str) -> Result<Vec<RemoteFile>>;
    /// Download `file` to `dest`, advancing `progress`.
    fn download_file(&self, doc: &Document, file: &RemoteFile, dest: &Path, progress: &ProgressBar) -> Result<()>;
}

/// Blocking HTTP client for the compute gateway. Holds the reqwest client,
/// the base URL and, once logged in, the bearer token.
#[derive(Clone)]
pub struct ApiClient {
    client: Option<Client>,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client for `settings.api_url`. Nothing is sent until
    /// `start` is called.
    pub fn new(settings: &Settings) -> Self {
        ApiClient {
            client: None,
            base_url: settings.api_url.clone(),
            token: None,
        }
    }

    /// Store a token for subsequent authenticated requests.
    pub fn set_token(&mut self, token: &str) {
        self.token = Some(token.to_string());
    }

    /// Returns whether a token is present in the client.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Port of the base URL, or the scheme's default port.
    pub fn port(&self) -> Result<u16> {
        let url = Url::parse(&self.base_url)
            .with_context(|| format!("Invalid API URL {}", self.base_url))?;
        url.port_or_known_default()
            .with_context(|| format!("No port for API URL {}", self.base_url))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn http(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .context("Not connected: call start() first")
    }

    /// Authorization header map when a token is set.
    fn auth_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(t) = &self.token {
            let val = HeaderValue::from_str(&format!("Bearer {}", t))
                .context("Token contains characters not allowed in a header")?;
            headers.insert(AUTHORIZATION, val);
        }
        Ok(headers)
    }

    fn get(&self, path: &str) -> Result<RequestBuilder> {
        Ok(self.http()?.get(self.url(path)).headers(self.auth_headers()?))
    }

    fn post(&self, path: &str) -> Result<RequestBuilder> {
        Ok(self.http()?.post(self.url(path)).headers(self.auth_headers()?))
    }

    /// Send `req` and turn non-2xx answers into an error carrying the body.
    fn send(req: RequestBuilder, what: &str) -> Result<Response> {
        let res = req
            .send()
            .with_context(|| format!("Failed to send {} request", what))?;
        if !res.status().is_success() {
            let status = res.status();
            let txt = res.text().unwrap_or_else(|_| "".into());
            anyhow::bail!("{} failed: {} - {}", what, status, txt);
        }
        Ok(res)
    }

    fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let res = Self::send(self.get(path)?, what)?;
        res.json()
            .with_context(|| format!("Parsing {} response json", what))
    }
}

impl ComputeService for ApiClient {
    fn start(&mut self) -> Result<u16> {
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        self.client = Some(client);
        Self::send(self.get("/health")?, "Health check")?;
        let port = self.port()?;
        debug!("connected to {} (port {})", self.base_url, port);
        Ok(port)
    }

    fn login(&mut self, token: &str) -> Result<User> {
        let req = self.post("/auth")?.json(&AuthRequest { token });
        let user: User = Self::send(req, "Login")?
            .json()
            .context("Parsing auth response json")?;
        self.set_token(token);
        Ok(user)
    }

    fn logoff(&mut self, user: &User) -> Result<()> {
        debug!("logging off {}", user.login_ref_id);
        Self::send(self.post("/logoff")?, "Logoff")?;
        self.token = None;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.client = None;
        Ok(())
    }

    fn list_documents(&self, _user: &User) -> Result<Vec<DocumentSummary>> {
        self.fetch("/documents", "List documents")
    }

    fn create_document(&self, _user: &User, name: &str) -> Result<Document> {
        let req = self.post("/documents")?.json(&NewDocument { name });
        Self::send(req, "Create document")?
            .json()
            .context("Parsing create document response json")
    }

    fn load_document(&self, _user: &User, id: &str) -> Result<Document> {
        self.fetch(&format!("/documents/{}", id), "Load document")
    }

    fn close_document(&self, doc: &Document) -> Result<()> {
        Self::send(self.post(&format!("/documents/{}/close", doc.id))?, "Close document")?;
        Ok(())
    }

    fn list_jobs(&self, doc: &Document) -> Result<Vec<JobSummary>> {
        self.fetch(&format!("/documents/{}/jobs", doc.id), "List jobs")
    }

    fn list_files(&self, doc: &Document) -> Result<Vec<RemoteFile>> {
        self.fetch(&format!("/documents/{}/files", doc.id), "List files")
    }

    fn solver_configs(&self, doc: &Document) -> Result<SolverConfigs> {
        self.fetch(&format!("/documents/{}/solver-configs", doc.id), "Solver configs")
    }

    fn upload_file(&self, doc: &Document, path: &Path, name: &str, progress: &ProgressBar) -> Result<RemoteFile> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open input file {}", path.display()))?;
        let len = file.metadata()?.len();
        progress.set_length(len);
        progress.set_position(0);

        let part = multipart::Part::reader_with_length(progress.wrap_read(file), len)
            .file_name(name.to_string())
            .mime_str("application/octet-stream")?;
        let form = multipart::Form::new().part("file", part);

        let req = self.post(&format!("/documents/{}/files", doc.id))?.multipart(form);
        let uploaded = Self::send(req, "Upload")?
            .json()
            .context("Parsing upload response json")?;
        progress.finish();
        Ok(uploaded)
    }

    fn submit_job(&self, doc: &Document, spec: &JobSpec) -> Result<JobSummary> {
        let req = self.post(&format!("/documents/{}/jobs", doc.id))?.json(spec);
        Self::send(req, "Submit job")?
            .json()
            .context("Parsing submit job response json")
    }

    fn list_job_files(&self, doc: &Document, job_id: &str) -> Result<Vec<RemoteFile>> {
        self.fetch(&format!("/documents/{}/jobs/{}/files", doc.id, job_id), "List job files")
    }

    fn download_file(&self, doc: &Document, file: &RemoteFile, dest: &Path, progress: &ProgressBar) -> Result<()> {
        let req = self.get(&format!("/documents/{}/files/{}/content", doc.id, file.id))?;
        let mut res = Self::send(req, "Download")?;
        progress.set_length(res.content_length().unwrap_or(file.size));
        progress.set_position(0);

        let out = File::create(dest)
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let mut out = progress.wrap_write(out);
        res.copy_to(&mut out)
            .with_context(|| format!("Failed to download {}", file.name))?;
        progress.finish();
        Ok(())
    }
}
