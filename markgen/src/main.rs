use clap::Parser;
use markgen::cli::{Cli, Commands, GenerateArgs};
use markgen::commands;
use markgen_core::RunStatus;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // RUST_LOG wins over -v/-q
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    let result = match cli.command.clone() {
        Some(Commands::Generate(args)) => commands::generate::run(&cli, args, cancel).await,
        None => commands::generate::run(&cli, GenerateArgs::default(), cancel).await,
        Some(Commands::Plugins(args)) => commands::plugins::run(&cli, args).await.map(|_| RunStatus::Succeeded),
        Some(Commands::Init(args)) => commands::init::run(&cli, args).await.map(|_| RunStatus::Succeeded),
    };

    match result {
        Ok(status) => ExitCode::from(status.exit_code() as u8),
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
