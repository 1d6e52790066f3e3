use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::server::monitoring::{register_build_info_metric, ConsumerMetrics};

const METRICS_PREFIX: &str = "consumer";

/// Process-wide handles, built once in `main` and passed to whatever needs them.
pub struct AppState {
    pub shutdown_token: CancellationToken,
    pub registry: RwLock<Registry>,
}

impl AppState {
    pub fn new(shutdown_token: CancellationToken) -> Self {
        Self {
            shutdown_token,
            registry: RwLock::new(<Registry>::default()),
        }
    }

    /// Registers the consumer counters and build info, returning the handles
    /// the loop increments.
    pub async fn register_consumer_metrics(&self) -> ConsumerMetrics {
        let mut registry = self.registry.write().await;
        register_build_info_metric(&mut registry, METRICS_PREFIX);
        ConsumerMetrics::register(&mut registry, METRICS_PREFIX)
    }
}
