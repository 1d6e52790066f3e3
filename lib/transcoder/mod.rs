//! Reshapes widget attributes for the table store.
//!
//! Requests carry `otherAttributes` as an ordered `{name, value}` list. The
//! table sink wants one column per attribute with every value tagged by its
//! storage type, and column names free of hyphens.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::request::{Attribute, TransformedWidget};

/// Name of the primary key column holding the widget id.
pub const KEY_COLUMN: &str = "id";

/// Backend-native value tag. Serializes as `{"N": "3"}`, `{"S": "x"}` or
/// `{"L": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypedValue {
    #[serde(rename = "N")]
    Number(String),
    #[serde(rename = "S")]
    String(String),
    #[serde(rename = "L")]
    List(Vec<Value>),
}

/// One table row, or the key of one, by column name.
pub type TableRow = BTreeMap<String, TypedValue>;

/// Collapses an attribute list into a mapping. Later duplicates win.
pub fn flatten(attributes: &[Attribute]) -> BTreeMap<String, Value> {
    attributes
        .iter()
        .map(|attribute| (attribute.name.clone(), attribute.value.clone()))
        .collect()
}

/// Tags each value: integers become `N`, arrays `L` with their elements left
/// alone, and everything else `S`. Floats are stored as `S`.
pub fn to_typed_columns(mapping: &BTreeMap<String, Value>) -> TableRow {
    mapping
        .iter()
        .map(|(name, value)| (name.clone(), type_value(value)))
        .collect()
}

pub fn type_value(value: &Value) -> TypedValue {
    match value {
        Value::Number(number) if number.is_i64() || number.is_u64() => {
            TypedValue::Number(number.to_string())
        }
        Value::Array(elements) => TypedValue::List(elements.clone()),
        Value::String(text) => TypedValue::String(text.clone()),
        other => TypedValue::String(other.to_string()),
    }
}

/// Rewrites hyphens to underscores; table identifiers cannot contain them.
pub fn normalize_key(name: &str) -> String {
    name.replace('-', "_")
}

/// Builds the full row for a widget.
///
/// Base fields go in first, then the attributes in input order, so an
/// attribute shadows a base field of the same name. Names are normalized
/// before they land, so `size-unit` and `size_unit` share a column and the
/// later one wins. The key column is the exception: an attribute can never
/// move a row to a different key.
pub fn table_row(widget: &TransformedWidget) -> TableRow {
    let mut columns: BTreeMap<String, Value> = BTreeMap::new();
    columns.insert(normalize_key(KEY_COLUMN), Value::from(widget.id.clone()));
    columns.insert(normalize_key("owner"), Value::from(widget.owner.clone()));
    if let Some(label) = &widget.label {
        columns.insert(normalize_key("label"), Value::from(label.clone()));
    }
    if let Some(description) = &widget.description {
        columns.insert(normalize_key("description"), Value::from(description.clone()));
    }

    for attribute in &widget.other_attributes {
        let column = normalize_key(&attribute.name);
        if column == KEY_COLUMN {
            tracing::warn!(
                event = "attribute_shadows_key_column",
                widget_id = %widget.id,
                attribute = %attribute.name,
                "ignoring attribute that would overwrite the key column"
            );
            continue;
        }
        columns.insert(column, attribute.value.clone());
    }

    to_typed_columns(&columns)
}

/// Key of the row holding `widget_id`.
pub fn row_key(widget_id: &str) -> TableRow {
    TableRow::from([(
        KEY_COLUMN.to_string(),
        TypedValue::String(widget_id.to_string()),
    )])
}
