use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::{SinkBackend, SinkError, TableClient, UpdateExpression, WidgetSink};
use crate::request::TransformedWidget;
use crate::transcoder::TableRow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TableCall {
    Put {
        table: String,
        row: TableRow,
    },
    Update {
        table: String,
        key: TableRow,
        update: UpdateExpression,
    },
    Delete {
        table: String,
        key: TableRow,
    },
}

/// Records every table call and replays scripted outcomes in order, falling
/// back to success once the script runs out.
#[derive(Default)]
pub(crate) struct MockTableClient {
    outcomes: Mutex<VecDeque<Result<(), SinkError>>>,
    calls: Mutex<Vec<TableCall>>,
}

impl MockTableClient {
    pub(crate) fn with_outcomes(outcomes: Vec<Result<(), SinkError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<TableCall> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    fn record(&self, call: TableCall) -> Result<(), SinkError> {
        self.calls.lock().expect("calls mutex poisoned").push(call);
        self.outcomes
            .lock()
            .expect("outcomes mutex poisoned")
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

impl TableClient for MockTableClient {
    fn put_row<'a>(
        &'a self,
        table: &'a str,
        row: &'a TableRow,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.record(TableCall::Put {
                table: table.to_string(),
                row: row.clone(),
            })
        })
    }

    fn update_row<'a>(
        &'a self,
        table: &'a str,
        key: &'a TableRow,
        update: &'a UpdateExpression,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.record(TableCall::Update {
                table: table.to_string(),
                key: key.clone(),
                update: update.clone(),
            })
        })
    }

    fn delete_row<'a>(
        &'a self,
        table: &'a str,
        key: &'a TableRow,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.record(TableCall::Delete {
                table: table.to_string(),
                key: key.clone(),
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SinkCall {
    Create { request_id: String, widget_id: String },
    Update { widget_id: String },
    Delete { widget_id: String, owner: String },
}

/// Widget sink that records calls and replays scripted outcomes.
#[derive(Default)]
pub(crate) struct RecordingSink {
    outcomes: Mutex<VecDeque<Result<(), SinkError>>>,
    calls: Mutex<Vec<SinkCall>>,
    cancel_on_call: Option<CancellationToken>,
}

impl RecordingSink {
    pub(crate) fn with_outcomes(outcomes: Vec<Result<(), SinkError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
            cancel_on_call: None,
        }
    }

    /// Cancels `token` from inside the first mutation, simulating a shutdown
    /// signal that lands mid-dispatch.
    pub(crate) fn cancelling(token: CancellationToken) -> Self {
        Self {
            cancel_on_call: Some(token),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    fn record(&self, call: SinkCall) -> Result<(), SinkError> {
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        self.calls.lock().expect("calls mutex poisoned").push(call);
        self.outcomes
            .lock()
            .expect("outcomes mutex poisoned")
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

impl WidgetSink for RecordingSink {
    fn backend(&self) -> SinkBackend {
        SinkBackend::ObjectStore
    }

    fn create<'a>(&'a self, widget: &'a TransformedWidget) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.record(SinkCall::Create {
                request_id: widget.request_id.clone(),
                widget_id: widget.id.clone(),
            })
        })
    }

    fn update<'a>(&'a self, widget: &'a TransformedWidget) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.record(SinkCall::Update {
                widget_id: widget.id.clone(),
            })
        })
    }

    fn delete<'a>(
        &'a self,
        widget_id: &'a str,
        owner: &'a str,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.record(SinkCall::Delete {
                widget_id: widget_id.to_string(),
                owner: owner.to_string(),
            })
        })
    }
}
