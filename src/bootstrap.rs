use crate::config::Configuration;
use crate::datasource::nodepool::NodepoolClient;
use crate::domain::Target;
use crate::metrics;
use crate::metrics::nodepool::NodepoolExporter;
use prometheus::Registry;

/// Populates `registry` once, before the server starts accepting scrapes.
pub fn init_collectors(config: &Configuration, registry: &Registry) -> anyhow::Result<()> {
    metrics::build_info::register(registry)?;

    let exporter = NodepoolExporter::new(Target::from(&config.nodepool), NodepoolClient::new()?)?;
    tracing::info!("Accepting nodepool address: {}", exporter.target());
    registry.register(Box::new(exporter))?;

    Ok(())
}
