use crate::request::{decode, DecodeError, RequestKind, WidgetRequest};
use crate::sink::{SinkError, WidgetSink};
use crate::source::{PendingItem, RequestSource};

use super::ConsumerLoop;

/// What happened to one pending item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The sink mutation succeeded. `acknowledged` is false when removing the
    /// item from the source failed, in which case it will be delivered again.
    Applied {
        kind: RequestKind,
        acknowledged: bool,
    },
    /// The request can never succeed. `dropped` tells whether it was removed
    /// from the source.
    Rejected {
        kind: Option<RequestKind>,
        reason: String,
        dropped: bool,
    },
    /// A transient failure; the item stays in the source for a later pass.
    Deferred {
        kind: Option<RequestKind>,
        reason: String,
    },
}

fn kind_label(kind: Option<RequestKind>) -> &'static str {
    kind.map_or("unknown", RequestKind::as_str)
}

/// Routes one decoded request to the matching sink operation.
pub(crate) async fn apply<K>(sink: &K, request: &WidgetRequest) -> Result<(), SinkError>
where
    K: WidgetSink + ?Sized,
{
    match (request.kind(), request.transform()) {
        (RequestKind::Delete, _) => {
            sink.delete(&request.widget_id, &request.normalized_owner())
                .await
        }
        (RequestKind::Create, Some(widget)) => sink.create(&widget).await,
        (RequestKind::Update, Some(widget)) => sink.update(&widget).await,
        (kind, None) => Err(SinkError::Rejected(format!(
            "{kind} request {} has no widget body",
            request.request_id
        ))),
    }
}

impl<S, K> ConsumerLoop<S, K>
where
    S: RequestSource,
    K: WidgetSink,
{
    /// Fetches, decodes and applies one item, acknowledging it only after the
    /// sink accepted the mutation.
    pub async fn dispatch(&self, item: &PendingItem) -> DispatchOutcome {
        let payload = match self.source.fetch(item).await {
            Ok(payload) => payload,
            Err(err) => {
                self.metrics.deferred_total.inc();
                tracing::warn!(
                    event = "request_fetch_failed",
                    key = %item.key,
                    error = %err,
                    "could not fetch request, leaving it in place"
                );
                return DispatchOutcome::Deferred {
                    kind: None,
                    reason: err.to_string(),
                };
            }
        };

        let request = match decode(&payload) {
            Ok(request) => request,
            Err(err) => {
                let kind = match &err {
                    DecodeError::MissingRequiredField { kind, .. } => Some(*kind),
                    DecodeError::MalformedPayload(_) | DecodeError::UnknownRequestKind(_) => None,
                };
                return self.reject(item, kind, err.to_string()).await;
            }
        };

        let kind = request.kind();
        tracing::info!(
            event = "request_dispatching",
            key = %item.key,
            kind = %kind,
            request_id = %request.request_id,
            widget_id = %request.widget_id,
            "applying widget request"
        );

        match apply(&self.sink, &request).await {
            Ok(()) => {
                self.metrics.applied_total.inc();
                let acknowledged = self.acknowledge(item, kind).await;
                DispatchOutcome::Applied { kind, acknowledged }
            }
            Err(err) if err.is_retryable() => {
                self.metrics.deferred_total.inc();
                tracing::warn!(
                    event = "request_deferred",
                    key = %item.key,
                    kind = %kind,
                    widget_id = %request.widget_id,
                    error = %err,
                    "sink unavailable, leaving request for a later pass"
                );
                DispatchOutcome::Deferred {
                    kind: Some(kind),
                    reason: err.to_string(),
                }
            }
            Err(err) => self.reject(item, Some(kind), err.to_string()).await,
        }
    }

    async fn acknowledge(&self, item: &PendingItem, kind: RequestKind) -> bool {
        match self.source.acknowledge(item).await {
            Ok(()) => {
                tracing::info!(
                    event = "request_applied",
                    key = %item.key,
                    kind = %kind,
                    "request applied and acknowledged"
                );
                true
            }
            Err(err) => {
                self.metrics.ack_failures_total.inc();
                tracing::warn!(
                    event = "request_ack_failed",
                    key = %item.key,
                    kind = %kind,
                    error = %err,
                    "request applied but not acknowledged, it will be delivered again"
                );
                false
            }
        }
    }

    async fn reject(
        &self,
        item: &PendingItem,
        kind: Option<RequestKind>,
        reason: String,
    ) -> DispatchOutcome {
        self.metrics.rejected_total.inc();
        tracing::error!(
            event = "request_rejected",
            key = %item.key,
            kind = kind_label(kind),
            reason = %reason,
            retained = self.policy.retain_rejected,
            "request can not be applied"
        );

        let dropped = if self.policy.retain_rejected {
            false
        } else {
            match self.source.acknowledge(item).await {
                Ok(()) => true,
                Err(err) => {
                    self.metrics.ack_failures_total.inc();
                    tracing::warn!(
                        event = "request_drop_failed",
                        key = %item.key,
                        error = %err,
                        "failed to drop rejected request"
                    );
                    false
                }
            }
        };

        DispatchOutcome::Rejected {
            kind,
            reason,
            dropped,
        }
    }
}
