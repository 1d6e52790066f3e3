use serde::Deserialize;
use thiserror::Error;

use super::{Attribute, RequestBody, RequestKind, WidgetRequest};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("{kind} request is missing required field `{field}`")]
    MissingRequiredField {
        kind: RequestKind,
        field: &'static str,
    },

    #[error("unknown request type `{0}`")]
    UnknownRequestKind(String),
}

/// Loose wire shape. Every field is optional here; presence is checked per
/// kind afterwards so the error names the missing field. A JSON `null` counts
/// as missing.
#[derive(Deserialize)]
struct RawRequest {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(rename = "requestId")]
    request_id: Option<String>,
    #[serde(rename = "widgetId")]
    widget_id: Option<String>,
    owner: Option<String>,
    label: Option<String>,
    description: Option<String>,
    #[serde(rename = "otherAttributes")]
    other_attributes: Option<Vec<Attribute>>,
}

impl RawRequest {
    fn has(&self, field: &str) -> bool {
        match field {
            "requestId" => self.request_id.is_some(),
            "widgetId" => self.widget_id.is_some(),
            "owner" => self.owner.is_some(),
            "label" => self.label.is_some(),
            "description" => self.description.is_some(),
            "otherAttributes" => self.other_attributes.is_some(),
            _ => false,
        }
    }
}

/// Decodes and validates one request payload. Pure: nothing is touched on
/// failure or success.
pub fn decode(payload: &[u8]) -> Result<WidgetRequest, DecodeError> {
    let raw: RawRequest = serde_json::from_slice(payload)
        .map_err(|err| DecodeError::MalformedPayload(err.to_string()))?;

    let kind_name = raw
        .kind
        .as_deref()
        .ok_or_else(|| DecodeError::MalformedPayload("missing request `type`".to_string()))?;
    let kind = RequestKind::parse(kind_name)
        .ok_or_else(|| DecodeError::UnknownRequestKind(kind_name.to_string()))?;

    if let Some(field) = kind
        .required_fields()
        .iter()
        .copied()
        .find(|field| !raw.has(field))
    {
        return Err(DecodeError::MissingRequiredField { kind, field });
    }

    let missing = |field: &'static str| DecodeError::MissingRequiredField { kind, field };

    let body = match kind {
        RequestKind::Create => RequestBody::Create {
            label: raw.label.ok_or_else(|| missing("label"))?,
            description: raw.description.ok_or_else(|| missing("description"))?,
            other_attributes: raw.other_attributes.ok_or_else(|| missing("otherAttributes"))?,
        },
        RequestKind::Update => RequestBody::Update {
            label: raw.label,
            description: raw.description.ok_or_else(|| missing("description"))?,
            other_attributes: raw.other_attributes.ok_or_else(|| missing("otherAttributes"))?,
        },
        RequestKind::Delete => RequestBody::Delete,
    };

    Ok(WidgetRequest {
        request_id: raw.request_id.ok_or_else(|| missing("requestId"))?,
        widget_id: raw.widget_id.ok_or_else(|| missing("widgetId"))?,
        owner: raw.owner.ok_or_else(|| missing("owner"))?,
        body,
    })
}
