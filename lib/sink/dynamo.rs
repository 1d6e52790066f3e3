use std::collections::HashMap;

use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use futures::future::BoxFuture;
use serde_json::Value;

use super::table::TableClient;
use super::update_expression::UpdateExpression;
use super::SinkError;
use crate::transcoder::{TableRow, TypedValue};

/// Service error codes worth another attempt on a later pass. Anything else
/// the service answers with is treated as a rejection of the request itself.
const TRANSIENT_ERROR_CODES: &[&str] = &[
    "InternalServerError",
    "LimitExceededException",
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "ServiceUnavailable",
    "ThrottlingException",
    "TransactionConflictException",
];

/// DynamoDB-backed table client used by the production runtime.
pub struct DynamoTableClient {
    client: Client,
}

impl DynamoTableClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Converts a tagged value into the SDK representation. List elements are
/// stored as-is: JSON text stays `S`, JSON numbers become `N`.
pub fn to_attribute_value(value: &TypedValue) -> AttributeValue {
    match value {
        TypedValue::Number(number) => AttributeValue::N(number.clone()),
        TypedValue::String(text) => AttributeValue::S(text.clone()),
        TypedValue::List(elements) => {
            AttributeValue::L(elements.iter().map(json_to_attribute_value).collect())
        }
    }
}

fn json_to_attribute_value(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(flag) => AttributeValue::Bool(*flag),
        Value::Number(number) => AttributeValue::N(number.to_string()),
        Value::String(text) => AttributeValue::S(text.clone()),
        Value::Array(elements) => {
            AttributeValue::L(elements.iter().map(json_to_attribute_value).collect())
        }
        Value::Object(fields) => AttributeValue::M(
            fields
                .iter()
                .map(|(name, field)| (name.clone(), json_to_attribute_value(field)))
                .collect(),
        ),
    }
}

fn to_item(row: &TableRow) -> HashMap<String, AttributeValue> {
    row.iter()
        .map(|(column, value)| (column.clone(), to_attribute_value(value)))
        .collect()
}

fn map_sdk_error<E>(operation: &str, err: SdkError<E>) -> SinkError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let retryable = match &err {
        SdkError::ServiceError(service) => {
            TRANSIENT_ERROR_CODES.contains(&service.err().code().unwrap_or_default())
        }
        // Timeouts, dispatch and response failures never reached a verdict.
        _ => true,
    };

    let message = format!("{operation} failed: {}", DisplayErrorContext(&err));
    if retryable {
        SinkError::Unavailable(message)
    } else {
        SinkError::Rejected(message)
    }
}

impl TableClient for DynamoTableClient {
    fn put_row<'a>(
        &'a self,
        table: &'a str,
        row: &'a TableRow,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.client
                .put_item()
                .table_name(table)
                .set_item(Some(to_item(row)))
                .send()
                .await
                .map(|_| ())
                .map_err(|err| map_sdk_error("PutItem", err))
        })
    }

    fn update_row<'a>(
        &'a self,
        table: &'a str,
        key: &'a TableRow,
        update: &'a UpdateExpression,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            // The service rejects an empty name map, so omit it instead.
            let names: Option<HashMap<String, String>> = (!update.names.is_empty()).then(|| {
                update
                    .names
                    .iter()
                    .map(|(placeholder, column)| (placeholder.clone(), column.clone()))
                    .collect()
            });
            let values: HashMap<String, AttributeValue> = update
                .values
                .iter()
                .map(|(placeholder, value)| (placeholder.clone(), to_attribute_value(value)))
                .collect();

            self.client
                .update_item()
                .table_name(table)
                .set_key(Some(to_item(key)))
                .update_expression(update.expression.as_str())
                .set_expression_attribute_names(names)
                .set_expression_attribute_values(Some(values))
                .send()
                .await
                .map(|_| ())
                .map_err(|err| map_sdk_error("UpdateItem", err))
        })
    }

    fn delete_row<'a>(
        &'a self,
        table: &'a str,
        key: &'a TableRow,
    ) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.client
                .delete_item()
                .table_name(table)
                .set_key(Some(to_item(key)))
                .send()
                .await
                .map(|_| ())
                .map_err(|err| map_sdk_error("DeleteItem", err))
        })
    }
}
