//! tagpub: publish tagged releases with trusted publishing.

mod cli;
mod commands;
mod errors;
mod shutdown;
mod tracing;

use crate::cli::parse;
use crate::errors::CliError;
use crate::tracing::{TracingConfig, TracingFormat};
use ::tracing::Instrument;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    std::panic::set_hook(Box::new(|panic_info| {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("Application panicked: {panic_info}");
            eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
        }
    }));

    match run_main().await {
        Ok(output) => {
            if !output.is_empty() {
                #[allow(clippy::print_stdout)]
                {
                    println!("{output}");
                }
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            let code = error.exit_code();
            #[allow(clippy::print_stderr)]
            {
                eprintln!("{:?}", miette::Report::new(error));
            }
            ExitCode::from(code)
        }
    }
}

async fn run_main() -> Result<String, CliError> {
    let cli = parse();

    let format = TracingFormat::select(
        cli.json,
        std::env::var(crate::tracing::LOG_FORMAT_ENV).ok().as_deref(),
    );

    crate::tracing::init_tracing(TracingConfig {
        format,
        level: cli.level.into(),
        ..Default::default()
    })
    .map_err(|e| CliError::Tracing {
        message: e.to_string(),
    })?;

    let command = cli.into_command();
    let span = command_span!(command.name());
    let cancel = shutdown::install_signal_handlers();

    command.execute(cancel).instrument(span).await
}
