use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use sla_harness::cli::{Args, Command};
use sla_harness::commands;
use sla_harness::output::EXIT_ERROR;
use verification::{HttpTransport, ReqwestTransport};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match dispatch(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

async fn dispatch(args: Args) -> Result<u8> {
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new()?);

    match args.command {
        Command::Run(run) => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted; finishing in-flight requests");
                    on_signal.cancel();
                }
            });
            commands::run(&run, transport, cancel).await
        }
        Command::Preflight(preflight) => commands::preflight(&preflight, transport).await,
        Command::Validate { scenario } => commands::validate(&scenario),
    }
}
