// Entrypoint for the CLI application.
// - Keeps `main` small: parse and validate arguments, build the API client
//   and hand both to `cli::run`.
// - Exit codes: 0 success, 1 runtime failure, 2 invalid arguments.

use clap::{CommandFactory, Parser};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use ncw::api::ApiClient;
use ncw::cli::{self, Cli};
use ncw::config::Settings;
use ncw::error::NcwError;

fn init_tracing(debug: bool) {
    let default = if debug { "ncw=debug" } else { "ncw=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Cli::parse();
    init_tracing(args.debug);

    if let Err(e) = args.validate() {
        eprintln!("ERROR: {}\n", e);
        let _ = Cli::command().print_help();
        return ExitCode::from(2);
    }

    // Gateway URL from `NCW_API_URL`, see `config::Settings::from_env`.
    let settings = Settings::from_env();
    let api = ApiClient::new(&settings);

    match cli::run(&args, api, &settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<NcwError>() {
                Some(err) => eprintln!("ERROR: {}", err),
                None => eprintln!("ERROR: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}
