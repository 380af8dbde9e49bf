use std::process::ExitCode;

use clap::Parser;
use tokio::io::BufReader;

use devlink::bootstrap::{self, tracing::init_tracing_subscriber};
use devlink::cli::{Cli, Commands};
use devlink::run_pair;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_tracing_subscriber(cli.verbose) {
        eprintln!("Failed to initialize tracing: {err}");
    }

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "devlink failed");
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = bootstrap::load_app_config(cli.config)?;
    let controller = bootstrap::build_controller(&config)?;

    match cli.command {
        Commands::Pair(args) => {
            let stdin = BufReader::new(tokio::io::stdin());
            let shutdown = async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %err, "Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            };
            let outcome = run_pair(&controller, &args, stdin, shutdown).await?;
            Ok(outcome.exit_code())
        }
    }
}
