use std::sync::Arc;

use futures::future::BoxFuture;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};

use super::{SinkBackend, SinkError, WidgetSink};
use crate::request::TransformedWidget;

const WIDGET_PREFIX: &str = "widgets";

/// Stores each widget as a JSON document under `widgets/{owner}/{id}`.
///
/// Creates are addressed by request id, updates and deletes by widget id.
pub struct ObjectSink {
    store: Arc<dyn ObjectStore>,
}

impl ObjectSink {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    async fn put_document(&self, location: Path, widget: &TransformedWidget) -> Result<(), SinkError> {
        let document = serde_json::to_vec(widget)
            .map_err(|err| SinkError::Rejected(format!("unserializable widget {}: {err}", widget.id)))?;
        self.store
            .put(&location, PutPayload::from(document))
            .await
            .map(|_| ())
            .map_err(|err| map_object_store_error(&location, err))
    }
}

/// Builds `widgets/{owner}/{id}`, rejecting segments that would produce a
/// different or invalid key.
pub fn widget_key(owner: &str, id: &str) -> Result<Path, SinkError> {
    for (what, segment) in [("owner", owner), ("id", id)] {
        if segment.is_empty() || segment.contains(object_store::path::DELIMITER) {
            return Err(SinkError::Rejected(format!(
                "{what} {segment:?} cannot be used as a key segment"
            )));
        }
    }

    let raw = format!("{WIDGET_PREFIX}/{owner}/{id}");
    Path::parse(&raw).map_err(|err| SinkError::Rejected(format!("invalid key {raw:?}: {err}")))
}

fn map_object_store_error(location: &Path, err: object_store::Error) -> SinkError {
    match err {
        object_store::Error::InvalidPath { source } => {
            SinkError::Rejected(format!("invalid key {location}: {source}"))
        }
        object_store::Error::NotSupported { source } => {
            SinkError::Rejected(format!("operation not supported at {location}: {source}"))
        }
        other => SinkError::Unavailable(format!("object store error at {location}: {other}")),
    }
}

impl WidgetSink for ObjectSink {
    fn backend(&self) -> SinkBackend {
        SinkBackend::ObjectStore
    }

    fn create<'a>(&'a self, widget: &'a TransformedWidget) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let location = widget_key(&widget.owner, &widget.request_id)?;
            self.put_document(location, widget).await
        })
    }

    fn update<'a>(&'a self, widget: &'a TransformedWidget) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let location = widget_key(&widget.owner, &widget.id)?;
            self.put_document(location, widget).await
        })
    }

    fn delete<'a>(
        &'a self,
        widget_id: &'a str,
        owner: &'a str,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let location = widget_key(owner, widget_id)?;
            match self.store.delete(&location).await {
                Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
                Err(err) => Err(map_object_store_error(&location, err)),
            }
        })
    }
}
