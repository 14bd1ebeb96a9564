//! Generate command - runs the full pipeline.

use super::load_config;
use crate::cli::{Cli, GenerateArgs};
use crate::plugin_finder;
use markgen_core::error::Result;
use markgen_core::{Orchestrator, RunStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Runs the generate command.
pub async fn run(cli: &Cli, args: GenerateArgs, cancel: CancellationToken) -> Result<RunStatus> {
    let config = args.apply(load_config(cli)?);
    info!("Generating from {}", config.input.display());
    debug!("Configuration: {:?}", config);

    let orchestrator = Orchestrator::new(config, cancel).with_finder(plugin_finder());
    let status = orchestrator.run().await;

    match status {
        RunStatus::Succeeded => info!("markgen completed successfully"),
        RunStatus::Failed => error!("markgen failed"),
        RunStatus::Cancelled => info!("markgen was cancelled"),
    }
    Ok(status)
}
