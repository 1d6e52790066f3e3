pub mod listing;
pub mod queue;

#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use thiserror::Error;

pub use listing::ObjectStoreRequestSource;
pub use queue::SqsRequestSource;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Listing, fetching or acknowledging failed for a reason that may clear up.
    #[error("request source unavailable: {0}")]
    Unavailable(String),

    #[error("invalid item key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },
}

/// One request waiting in a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingItem {
    /// Ordering key: object path for listings, message id for queues.
    pub key: String,
    /// Token needed to acknowledge the item, when it differs from `key`.
    pub receipt: Option<String>,
    /// Payload delivered together with the listing, if the source has one.
    pub body: Option<Bytes>,
}

impl PendingItem {
    pub fn keyed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            receipt: None,
            body: None,
        }
    }
}

/// Where widget requests come from.
///
/// Listings are returned sorted ascending by key so every run processes the
/// same backlog in the same order. An acknowledged item is never listed again.
pub trait RequestSource: Send + Sync {
    /// Human-readable source name for logs.
    fn describe(&self) -> String;

    fn list_pending<'a>(&'a self) -> BoxFuture<'a, Result<Vec<PendingItem>, SourceError>>;

    fn fetch<'a>(&'a self, item: &'a PendingItem) -> BoxFuture<'a, Result<Bytes, SourceError>>;

    fn acknowledge<'a>(&'a self, item: &'a PendingItem) -> BoxFuture<'a, Result<(), SourceError>>;
}

impl<T> RequestSource for Arc<T>
where
    T: RequestSource + ?Sized,
{
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn list_pending<'a>(&'a self) -> BoxFuture<'a, Result<Vec<PendingItem>, SourceError>> {
        (**self).list_pending()
    }

    fn fetch<'a>(&'a self, item: &'a PendingItem) -> BoxFuture<'a, Result<Bytes, SourceError>> {
        (**self).fetch(item)
    }

    fn acknowledge<'a>(&'a self, item: &'a PendingItem) -> BoxFuture<'a, Result<(), SourceError>> {
        (**self).acknowledge(item)
    }
}

impl<T> RequestSource for Box<T>
where
    T: RequestSource + ?Sized,
{
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn list_pending<'a>(&'a self) -> BoxFuture<'a, Result<Vec<PendingItem>, SourceError>> {
        (**self).list_pending()
    }

    fn fetch<'a>(&'a self, item: &'a PendingItem) -> BoxFuture<'a, Result<Bytes, SourceError>> {
        (**self).fetch(item)
    }

    fn acknowledge<'a>(&'a self, item: &'a PendingItem) -> BoxFuture<'a, Result<(), SourceError>> {
        (**self).acknowledge(item)
    }
}

pub(crate) fn sort_by_key(items: &mut [PendingItem]) {
    items.sort_by(|a, b| a.key.cmp(&b.key));
}
