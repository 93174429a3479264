use crate::domain::{DataSource, Target};
use crate::metrics::util::{gauge, into_labels};
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{IntCounter, Opts};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::runtime::Handle;

pub const NAMESPACE: &str = "nodepool";

/// Result of a single round trip to the status endpoint.
#[derive(Debug)]
pub enum ScrapeOutcome {
    Healthy,
    /// A response was received, but not a 200.
    Unhealthy(anyhow::Error),
    /// No response was received.
    Unreachable(anyhow::Error),
}

impl ScrapeOutcome {
    /// Reachability only: an error status still counts as reachable.
    pub fn is_reachable(&self) -> bool {
        !matches!(self, ScrapeOutcome::Unreachable(_))
    }

    pub fn into_result(self) -> anyhow::Result<()> {
        match self {
            ScrapeOutcome::Healthy => Ok(()),
            ScrapeOutcome::Unhealthy(error) | ScrapeOutcome::Unreachable(error) => Err(error),
        }
    }
}

/// Scrapes the nodepool status endpoint every time the registry gathers.
///
/// `collect` blocks the calling thread for the whole round trip, so the
/// registry must be gathered from a thread that is allowed to block (e.g.
/// `tokio::task::spawn_blocking`). Concurrent gathers are serialized.
pub struct NodepoolExporter<T> {
    target: Target,
    data_source: T,
    scrape_lock: Mutex<()>,
    up: Desc,
    scrape_failures: IntCounter,
}

impl<T> NodepoolExporter<T>
where
    T: DataSource + Send + Sync + 'static,
{
    pub fn new(target: Target, data_source: T) -> anyhow::Result<Self> {
        let up = Desc::new(
            format!("{}_up", NAMESPACE),
            "Could the nodepool server be reached".to_owned(),
            vec!["host".to_owned()],
            HashMap::new(),
        )?;

        let scrape_failures = IntCounter::with_opts(
            Opts::new(
                "exporter_scrape_failures_total",
                "Number of errors while scraping nodepool.",
            )
            .namespace(NAMESPACE),
        )?;

        Ok(Self {
            target,
            data_source,
            scrape_lock: Mutex::new(()),
            up,
            scrape_failures,
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn scrape_failures(&self) -> u64 {
        self.scrape_failures.get()
    }

    fn scrape(&self) -> ScrapeOutcome {
        let uri = self.target.scrape_uri();
        tracing::debug!(%uri, "Scraping nodepool");

        let response = match Handle::try_current() {
            Ok(handle) => handle.block_on(self.data_source.get(&uri)),
            Err(error) => Err(anyhow::Error::new(error)
                .context(format!("No async runtime available to GET [{}]", uri))),
        };

        match response {
            Err(error) => ScrapeOutcome::Unreachable(error),
            Ok(response) if response.is_ok() => ScrapeOutcome::Healthy,
            Ok(response) => ScrapeOutcome::Unhealthy(anyhow::anyhow!(
                "Status {} ({}): {}",
                response.status_line(),
                response.status,
                response.body_or_error()
            )),
        }
    }

    fn up_metric(&self, reachable: bool) -> MetricFamily {
        let value = if reachable { 1.0 } else { 0.0 };
        gauge(&self.up, into_labels(&[("host", &self.target.host)]), value)
    }
}

impl<T> Collector for NodepoolExporter<T>
where
    T: DataSource + Send + Sync + 'static,
{
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = vec![&self.up];
        descs.extend(self.scrape_failures.desc());
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let _guard = self.scrape_lock.lock().unwrap_or_else(|e| e.into_inner());

        let outcome = self.scrape();
        let mut families = vec![self.up_metric(outcome.is_reachable())];

        if let Err(error) = outcome.into_result() {
            tracing::error!(nodepool = %self.target, "Error scraping nodepool: {:#}", error);
            self.scrape_failures.inc();
            families.extend(self.scrape_failures.collect());
        }

        families
    }
}
