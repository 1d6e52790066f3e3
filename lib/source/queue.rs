use aws_sdk_sqs::error::DisplayErrorContext;
use aws_sdk_sqs::types::Message;
use aws_sdk_sqs::Client;
use bytes::Bytes;
use futures::future::BoxFuture;

use super::{sort_by_key, PendingItem, RequestSource, SourceError};

/// Largest batch a single receive may return.
pub const MAX_RECEIVE_BATCH: i32 = 10;

/// Message-queue source. Receiving leases messages for the queue's visibility
/// timeout; acknowledging deletes them by receipt handle. Messages that are
/// never acknowledged become visible again on their own.
pub struct SqsRequestSource {
    client: Client,
    queue_url: String,
    wait_seconds: i32,
}

impl SqsRequestSource {
    pub fn new(client: Client, queue_url: impl Into<String>, wait_seconds: i32) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
            wait_seconds,
        }
    }
}

/// Converts a received message into a pending item. Messages without a
/// receipt handle cannot be acknowledged and are left for redelivery.
fn message_to_item(message: &Message) -> Option<PendingItem> {
    let Some(receipt) = message.receipt_handle() else {
        tracing::warn!(
            event = "queue_message_without_receipt",
            message_id = ?message.message_id(),
            "skipping message that cannot be acknowledged"
        );
        return None;
    };

    Some(PendingItem {
        key: message.message_id().unwrap_or(receipt).to_string(),
        receipt: Some(receipt.to_string()),
        body: Some(Bytes::from(message.body().unwrap_or_default().to_string())),
    })
}

impl RequestSource for SqsRequestSource {
    fn describe(&self) -> String {
        self.queue_url.clone()
    }

    fn list_pending<'a>(&'a self) -> BoxFuture<'a, Result<Vec<PendingItem>, SourceError>> {
        Box::pin(async move {
            let output = self
                .client
                .receive_message()
                .queue_url(&self.queue_url)
                .max_number_of_messages(MAX_RECEIVE_BATCH)
                .wait_time_seconds(self.wait_seconds)
                .send()
                .await
                .map_err(|err| {
                    SourceError::Unavailable(format!(
                        "receiving from {} failed: {}",
                        self.queue_url,
                        DisplayErrorContext(&err)
                    ))
                })?;

            let mut items: Vec<PendingItem> =
                output.messages().iter().filter_map(message_to_item).collect();
            sort_by_key(&mut items);
            Ok(items)
        })
    }

    fn fetch<'a>(&'a self, item: &'a PendingItem) -> BoxFuture<'a, Result<Bytes, SourceError>> {
        Box::pin(async move {
            item.body.clone().ok_or_else(|| SourceError::InvalidKey {
                key: item.key.clone(),
                reason: "queue item carries no body".to_string(),
            })
        })
    }

    fn acknowledge<'a>(&'a self, item: &'a PendingItem) -> BoxFuture<'a, Result<(), SourceError>> {
        Box::pin(async move {
            let receipt = item.receipt.as_deref().ok_or_else(|| SourceError::InvalidKey {
                key: item.key.clone(),
                reason: "queue item carries no receipt handle".to_string(),
            })?;

            self.client
                .delete_message()
                .queue_url(&self.queue_url)
                .receipt_handle(receipt)
                .send()
                .await
                .map(|_| ())
                .map_err(|err| {
                    SourceError::Unavailable(format!(
                        "deleting message {} failed: {}",
                        item.key,
                        DisplayErrorContext(&err)
                    ))
                })
        })
    }
}
