pub mod dynamo;
pub mod object;
pub mod table;
pub mod update_expression;

#[cfg(test)]
pub(crate) mod test_support;

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::request::TransformedWidget;

pub use dynamo::DynamoTableClient;
pub use object::ObjectSink;
pub use table::{TableClient, TableSink};
pub use update_expression::{ReservedWords, UpdateExpression};

/// Failure of a single sink mutation. The sink never retries on its own; the
/// consumer decides what happens to the request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Transient backend failure. The request is left for a later pass.
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// Permanent failure such as a malformed key or a constraint violation.
    #[error("sink rejected mutation: {0}")]
    Rejected(String),
}

impl SinkError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkBackend {
    ObjectStore,
    TableStore,
}

impl fmt::Display for SinkBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ObjectStore => "object_store",
            Self::TableStore => "table_store",
        })
    }
}

/// Destination of widget mutations.
///
/// Every operation is applied at most once per call and must be safe to repeat:
/// requests are delivered at least once, so a create, update or delete may
/// arrive again after it already succeeded.
pub trait WidgetSink: Send + Sync {
    fn backend(&self) -> SinkBackend;

    fn create<'a>(&'a self, widget: &'a TransformedWidget) -> BoxFuture<'a, Result<(), SinkError>>;

    fn update<'a>(&'a self, widget: &'a TransformedWidget) -> BoxFuture<'a, Result<(), SinkError>>;

    /// Removes a widget. `owner` is already normalized. Deleting a widget that
    /// does not exist succeeds.
    fn delete<'a>(
        &'a self,
        widget_id: &'a str,
        owner: &'a str,
    ) -> BoxFuture<'a, Result<(), SinkError>>;
}

impl<T> WidgetSink for Arc<T>
where
    T: WidgetSink + ?Sized,
{
    fn backend(&self) -> SinkBackend {
        (**self).backend()
    }

    fn create<'a>(&'a self, widget: &'a TransformedWidget) -> BoxFuture<'a, Result<(), SinkError>> {
        (**self).create(widget)
    }

    fn update<'a>(&'a self, widget: &'a TransformedWidget) -> BoxFuture<'a, Result<(), SinkError>> {
        (**self).update(widget)
    }

    fn delete<'a>(
        &'a self,
        widget_id: &'a str,
        owner: &'a str,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        (**self).delete(widget_id, owner)
    }
}

impl<T> WidgetSink for Box<T>
where
    T: WidgetSink + ?Sized,
{
    fn backend(&self) -> SinkBackend {
        (**self).backend()
    }

    fn create<'a>(&'a self, widget: &'a TransformedWidget) -> BoxFuture<'a, Result<(), SinkError>> {
        (**self).create(widget)
    }

    fn update<'a>(&'a self, widget: &'a TransformedWidget) -> BoxFuture<'a, Result<(), SinkError>> {
        (**self).update(widget)
    }

    fn delete<'a>(
        &'a self,
        widget_id: &'a str,
        owner: &'a str,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        (**self).delete(widget_id, owner)
    }
}
