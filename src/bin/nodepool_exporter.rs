use clap::Parser;
use nodepool_exporter::bootstrap::init_collectors;
use nodepool_exporter::config::{Cli, Configuration, print_config};
use nodepool_exporter::logging::setup_logging;
use nodepool_exporter::metrics::build_info::VERSION;
use nodepool_exporter::server::start_server;
use nodepool_exporter::server::state::AppState;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let configuration = Configuration::load(&cli)?;
    if cli.print_config {
        print_config(&configuration)?;
        return Ok(());
    }

    let _guard = setup_logging(&configuration.log)?;
    tracing::info!(version = VERSION, "Starting Nodepool -> Prometheus Exporter");

    let registry = prometheus::Registry::new();
    init_collectors(&configuration, &registry)?;

    let state = AppState {
        configuration: Arc::new(configuration),
        registry,
    };

    if let Err(error) = start_server(state).await {
        tracing::error!(%error, "The exporter stopped unexpectedly");
        return Err(error);
    }

    tracing::info!("Bye!");
    Ok(())
}
