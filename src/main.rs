// src/main.rs

use std::process::ExitCode;

use phpmon_runtime::errors::PhpmonError;
use phpmon_runtime::{cli, logging, run};

/// Exit status when the config file is missing pieces or does not parse.
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();
    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("phpmon-runtime: {err:#}");
        return ExitCode::FAILURE;
    }

    match run(args).await {
        // `exec` forwards the child's status; codes outside 0..=255 collapse to 1.
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            tracing::error!("{err:#}");
            match err.downcast_ref::<PhpmonError>() {
                Some(PhpmonError::ConfigError(_) | PhpmonError::TomlError(_)) => {
                    ExitCode::from(EXIT_CONFIG)
                }
                _ => ExitCode::FAILURE,
            }
        }
    }
}
