pub mod codec;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use codec::{decode, DecodeError};

/// The three operations a producer can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Create,
    Update,
    Delete,
}

impl RequestKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Wire names of the fields a request of this kind must carry, in the
    /// order they are checked.
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            Self::Create => &[
                "requestId",
                "widgetId",
                "owner",
                "label",
                "description",
                "otherAttributes",
            ],
            Self::Update => &[
                "requestId",
                "widgetId",
                "owner",
                "description",
                "otherAttributes",
            ],
            Self::Delete => &["requestId", "widgetId", "owner"],
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `{name, value}` entry of `otherAttributes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: Value,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Kind-specific payload. Holding the kind as the variant means a decoded
/// request cannot change kind or lose a field its kind requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Create {
        label: String,
        description: String,
        other_attributes: Vec<Attribute>,
    },
    Update {
        label: Option<String>,
        description: String,
        other_attributes: Vec<Attribute>,
    },
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetRequest {
    pub request_id: String,
    pub widget_id: String,
    pub owner: String,
    pub body: RequestBody,
}

impl WidgetRequest {
    pub fn kind(&self) -> RequestKind {
        match self.body {
            RequestBody::Create { .. } => RequestKind::Create,
            RequestBody::Update { .. } => RequestKind::Update,
            RequestBody::Delete => RequestKind::Delete,
        }
    }

    pub fn normalized_owner(&self) -> String {
        normalize_owner(&self.owner)
    }

    /// Entity-shaped view of a create or update. Deletes carry no entity.
    pub fn transform(&self) -> Option<TransformedWidget> {
        let (label, description, other_attributes) = match &self.body {
            RequestBody::Create {
                label,
                description,
                other_attributes,
            } => (Some(label.clone()), description, other_attributes),
            RequestBody::Update {
                label,
                description,
                other_attributes,
            } => (label.clone(), description, other_attributes),
            RequestBody::Delete => return None,
        };

        Some(TransformedWidget {
            request_id: self.request_id.clone(),
            id: self.widget_id.clone(),
            owner: self.normalized_owner(),
            label,
            description: Some(description.clone()),
            other_attributes: other_attributes.clone(),
        })
    }
}

/// The document stored for a widget. `request_id` travels alongside so the
/// object sink can address creates, but is never written out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformedWidget {
    #[serde(skip)]
    pub request_id: String,
    pub id: String,
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "otherAttributes")]
    pub other_attributes: Vec<Attribute>,
}

/// Lower-cases an owner name and replaces spaces with hyphens so it can be used
/// as a key segment. Applying it twice gives the same result as applying it once.
pub fn normalize_owner(owner: &str) -> String {
    owner.replace(' ', "-").to_lowercase()
}
