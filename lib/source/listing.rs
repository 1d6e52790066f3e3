use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::TryStreamExt;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore};

use super::{sort_by_key, PendingItem, RequestSource, SourceError};

/// Pseudo-queue over an object store: every object under the prefix is one
/// pending request, and consuming a request deletes its object.
///
/// There is no lease. Two consumers listing the same store at the same time
/// can both process the same object; run one consumer per store.
pub struct ObjectStoreRequestSource {
    name: String,
    store: Arc<dyn ObjectStore>,
    prefix: Option<Path>,
}

impl ObjectStoreRequestSource {
    pub fn new(name: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            name: name.into(),
            store,
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: Path) -> Self {
        self.prefix = Some(prefix);
        self
    }

    fn location(item: &PendingItem) -> Result<Path, SourceError> {
        Path::parse(&item.key).map_err(|err| SourceError::InvalidKey {
            key: item.key.clone(),
            reason: err.to_string(),
        })
    }
}

impl RequestSource for ObjectStoreRequestSource {
    fn describe(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", self.name, prefix),
            None => self.name.clone(),
        }
    }

    fn list_pending<'a>(&'a self) -> BoxFuture<'a, Result<Vec<PendingItem>, SourceError>> {
        Box::pin(async move {
            let objects: Vec<ObjectMeta> = self
                .store
                .list(self.prefix.as_ref())
                .try_collect()
                .await
                .map_err(|err| {
                    SourceError::Unavailable(format!("listing {} failed: {err}", self.describe()))
                })?;

            let mut items: Vec<PendingItem> = objects
                .into_iter()
                .map(|meta| PendingItem::keyed(meta.location.to_string()))
                .collect();
            sort_by_key(&mut items);
            Ok(items)
        })
    }

    fn fetch<'a>(&'a self, item: &'a PendingItem) -> BoxFuture<'a, Result<Bytes, SourceError>> {
        Box::pin(async move {
            let location = Self::location(item)?;
            let fetched = self
                .store
                .get(&location)
                .await
                .map_err(|err| SourceError::Unavailable(format!("fetching {location} failed: {err}")))?;
            fetched
                .bytes()
                .await
                .map_err(|err| SourceError::Unavailable(format!("reading {location} failed: {err}")))
        })
    }

    fn acknowledge<'a>(&'a self, item: &'a PendingItem) -> BoxFuture<'a, Result<(), SourceError>> {
        Box::pin(async move {
            let location = Self::location(item)?;
            match self.store.delete(&location).await {
                // Already gone: another pass or consumer removed it first.
                Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
                Err(err) => Err(SourceError::Unavailable(format!(
                    "deleting {location} failed: {err}"
                ))),
            }
        })
    }
}
