use std::sync::Arc;

use futures::future::BoxFuture;

use super::update_expression::{ReservedWords, UpdateExpression};
use super::{SinkBackend, SinkError, WidgetSink};
use crate::request::TransformedWidget;
use crate::transcoder::{self, TableRow, KEY_COLUMN};

/// Row-level operations of a structured table store.
///
/// Split out from `TableSink` so row encoding and expression building can be
/// tested without a live table.
pub trait TableClient: Send + Sync {
    fn put_row<'a>(&'a self, table: &'a str, row: &'a TableRow)
        -> BoxFuture<'a, Result<(), SinkError>>;

    fn update_row<'a>(
        &'a self,
        table: &'a str,
        key: &'a TableRow,
        update: &'a UpdateExpression,
    ) -> BoxFuture<'a, Result<(), SinkError>>;

    fn delete_row<'a>(&'a self, table: &'a str, key: &'a TableRow)
        -> BoxFuture<'a, Result<(), SinkError>>;
}

impl<T> TableClient for Arc<T>
where
    T: TableClient + ?Sized,
{
    fn put_row<'a>(
        &'a self,
        table: &'a str,
        row: &'a TableRow,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        (**self).put_row(table, row)
    }

    fn update_row<'a>(
        &'a self,
        table: &'a str,
        key: &'a TableRow,
        update: &'a UpdateExpression,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        (**self).update_row(table, key, update)
    }

    fn delete_row<'a>(
        &'a self,
        table: &'a str,
        key: &'a TableRow,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        (**self).delete_row(table, key)
    }
}

/// Stores each widget as one row keyed by widget id.
pub struct TableSink<C>
where
    C: TableClient,
{
    client: C,
    table: String,
    reserved: ReservedWords,
}

impl<C> TableSink<C>
where
    C: TableClient,
{
    pub fn new(client: C, table: impl Into<String>, reserved: ReservedWords) -> Self {
        Self {
            client,
            table: table.into(),
            reserved,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl<C> WidgetSink for TableSink<C>
where
    C: TableClient,
{
    fn backend(&self) -> SinkBackend {
        SinkBackend::TableStore
    }

    fn create<'a>(&'a self, widget: &'a TransformedWidget) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let row = transcoder::table_row(widget);
            self.client.put_row(&self.table, &row).await
        })
    }

    fn update<'a>(&'a self, widget: &'a TransformedWidget) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let row = transcoder::table_row(widget);
            let update = UpdateExpression::build(&row, KEY_COLUMN, &self.reserved).ok_or_else(
                || SinkError::Rejected(format!("update for widget {} sets no columns", widget.id)),
            )?;
            let key = transcoder::row_key(&widget.id);
            self.client.update_row(&self.table, &key, &update).await
        })
    }

    fn delete<'a>(
        &'a self,
        widget_id: &'a str,
        _owner: &'a str,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let key = transcoder::row_key(widget_id);
            self.client.delete_row(&self.table, &key).await
        })
    }
}
