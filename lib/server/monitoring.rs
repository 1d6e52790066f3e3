use crate::build_info;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use prometheus_client::registry::Registry;

/// Registers build metadata as a labeled gauge fixed at `1`.
pub fn register_build_info_metric(registry: &mut Registry, prefix: &str) {
    let build_info_metric = Family::<BuildInfoLabels, Gauge>::default();
    build_info_metric
        .get_or_create(&BuildInfoLabels {
            service: "widget_consumer",
            version: build_info::VERSION,
            commit: build_info::short_commit_hash(),
        })
        .set(1);
    let sub_registry = registry.sub_registry_with_prefix(prefix);
    sub_registry.register(
        "build_info",
        "Build identity labels for this process",
        build_info_metric,
    );
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct BuildInfoLabels {
    service: &'static str,
    version: &'static str,
    commit: &'static str,
}

/// Counters for one consumer loop. Cloning shares the underlying values, so a
/// default instance that was never registered is a valid no-export sink.
#[derive(Clone, Default)]
pub struct ConsumerMetrics {
    /// Requests whose sink mutation succeeded.
    pub applied_total: Counter,
    /// Requests dropped as permanently invalid (decode error or sink rejection).
    pub rejected_total: Counter,
    /// Requests left in the source after a transient failure.
    pub deferred_total: Counter,
    /// Applied requests whose acknowledgment failed; they will be redelivered.
    pub ack_failures_total: Counter,
    /// Drains that found no work.
    pub idle_polls_total: Counter,
    /// Failed listings of the request source.
    pub source_errors_total: Counter,
}

impl ConsumerMetrics {
    pub fn register(registry: &mut Registry, prefix: &str) -> Self {
        let metrics = Self::default();
        let sub_registry = registry.sub_registry_with_prefix(prefix);
        sub_registry.register(
            "requests_applied",
            "Total number of widget requests applied to the sink",
            metrics.applied_total.clone(),
        );
        sub_registry.register(
            "requests_rejected",
            "Total number of widget requests rejected and dropped",
            metrics.rejected_total.clone(),
        );
        sub_registry.register(
            "requests_deferred",
            "Total number of widget requests left for a later pass",
            metrics.deferred_total.clone(),
        );
        sub_registry.register(
            "ack_failures",
            "Total number of applied requests whose acknowledgment failed",
            metrics.ack_failures_total.clone(),
        );
        sub_registry.register(
            "idle_polls",
            "Total number of drains that found no pending requests",
            metrics.idle_polls_total.clone(),
        );
        sub_registry.register(
            "source_errors",
            "Total number of failed request source listings",
            metrics.source_errors_total.clone(),
        );
        metrics
    }
}
