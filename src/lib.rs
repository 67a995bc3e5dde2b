// Library root
// -----------
// This crate exposes the library surface behind the `ncw` binary, a
// command-line wrapper around a remote compute-job service.
//
// Module responsibilities:
// - `api`: the `ComputeService` seam and the blocking HTTP client that
//   implements it, plus the wire records (documents, jobs, files).
// - `cli`: argument definitions, validation and the action pipeline.
// - `config`: settings read from the environment.
// - `error`: fatal conditions detected by the wrapper itself.
// - `report`: plain-text report and log files.
// - `request`: parsers for the submission and download action files.
// - `session`: connect/login, the STATUS/SUBMIT/DOWNLOAD actions, teardown.
// - `token`: token lookup from `--token` or an rc file.
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod report;
pub mod request;
pub mod session;
pub mod token;
