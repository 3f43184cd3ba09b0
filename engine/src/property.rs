//! Typed decoding of remote property values.
//!
//! Remote records carry an open-ended map of named properties, each tagged
//! with a `type`. Every shape the engine understands gets its own variant;
//! anything else is kept as [`PropertyValue::Unknown`] so callers can still
//! see that the property exists. A known shape with an unreadable body becomes
//! [`PropertyValue::Malformed`] and only matters if a field resolves to it.

use crate::{error::Result, DueDate, Error};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Structural shape of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Title,
    RichText,
    Select,
    Status,
    Date,
    Checkbox,
    Number,
    Unknown,
}

impl PropertyKind {
    /// Map a remote `type` tag to a kind.
    pub fn from_type_name(name: &str) -> PropertyKind {
        match name {
            "title" => PropertyKind::Title,
            "rich_text" => PropertyKind::RichText,
            "select" => PropertyKind::Select,
            "status" => PropertyKind::Status,
            "date" => PropertyKind::Date,
            "checkbox" => PropertyKind::Checkbox,
            "number" => PropertyKind::Number,
            _ => PropertyKind::Unknown,
        }
    }

    /// Remote `type` tag for this kind.
    pub fn type_name(self) -> &'static str {
        match self {
            PropertyKind::Title => "title",
            PropertyKind::RichText => "rich_text",
            PropertyKind::Select => "select",
            PropertyKind::Status => "status",
            PropertyKind::Date => "date",
            PropertyKind::Checkbox => "checkbox",
            PropertyKind::Number => "number",
            PropertyKind::Unknown => "unknown",
        }
    }

    /// Single-choice kinds: status or select.
    pub fn is_select_like(self) -> bool {
        matches!(self, PropertyKind::Select | PropertyKind::Status)
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A decoded property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Title(String),
    RichText(String),
    Select(Option<String>),
    Status(Option<String>),
    Date(Option<DueDate>),
    Checkbox(bool),
    Number(Option<f64>),
    Unknown { type_name: String },
    /// Tagged with a known type whose body could not be read
    Malformed { kind: PropertyKind, reason: String },
}

impl PropertyValue {
    /// Decode one property object (`{"type": "...", "<type>": ...}`).
    pub fn decode(value: &Value) -> Result<PropertyValue> {
        let type_name = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Parse("property without a type tag".into()))?;
        let body = value.get(type_name).unwrap_or(&Value::Null);

        let decoded = match PropertyKind::from_type_name(type_name) {
            PropertyKind::Title => PropertyValue::Title(plain_text(body, type_name)?),
            PropertyKind::RichText => PropertyValue::RichText(plain_text(body, type_name)?),
            PropertyKind::Select => PropertyValue::Select(option_name(body, type_name)?),
            PropertyKind::Status => PropertyValue::Status(option_name(body, type_name)?),
            PropertyKind::Date => PropertyValue::Date(date_start(body, type_name)?),
            PropertyKind::Checkbox => PropertyValue::Checkbox(body.as_bool().ok_or_else(|| {
                Error::Parse("checkbox property is not a boolean".into())
            })?),
            PropertyKind::Number => PropertyValue::Number(body.as_f64()),
            PropertyKind::Unknown => PropertyValue::Unknown {
                type_name: type_name.to_string(),
            },
        };
        Ok(decoded)
    }

    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Title(_) => PropertyKind::Title,
            PropertyValue::RichText(_) => PropertyKind::RichText,
            PropertyValue::Select(_) => PropertyKind::Select,
            PropertyValue::Status(_) => PropertyKind::Status,
            PropertyValue::Date(_) => PropertyKind::Date,
            PropertyValue::Checkbox(_) => PropertyKind::Checkbox,
            PropertyValue::Number(_) => PropertyKind::Number,
            PropertyValue::Unknown { .. } => PropertyKind::Unknown,
            PropertyValue::Malformed { kind, .. } => *kind,
        }
    }

    /// Selected option name for select-like values.
    pub fn option(&self) -> Option<&str> {
        match self {
            PropertyValue::Select(name) | PropertyValue::Status(name) => name.as_deref(),
            _ => None,
        }
    }

    /// Text content for title and rich-text values.
    pub fn text(&self) -> Option<&str> {
        match self {
            PropertyValue::Title(text) | PropertyValue::RichText(text) => Some(text),
            _ => None,
        }
    }
}

/// Properties of one record, keyed by their remote name.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Decode a `properties` object.
///
/// Fails only if the container itself is not an object. A property that
/// cannot be decoded is kept as [`PropertyValue::Malformed`].
pub fn decode_properties(properties: &Value) -> Result<PropertyMap> {
    let object = properties
        .as_object()
        .ok_or_else(|| Error::Parse("properties is not an object".into()))?;

    let map = object
        .iter()
        .map(|(name, value)| {
            let decoded = PropertyValue::decode(value).unwrap_or_else(|e| {
                let kind = value
                    .get("type")
                    .and_then(Value::as_str)
                    .map_or(PropertyKind::Unknown, PropertyKind::from_type_name);
                PropertyValue::Malformed {
                    kind,
                    reason: e.to_string(),
                }
            });
            (name.clone(), decoded)
        })
        .collect();
    Ok(map)
}

fn plain_text(body: &Value, type_name: &str) -> Result<String> {
    match body {
        Value::Null => Ok(String::new()),
        Value::Array(fragments) => Ok(fragments
            .iter()
            .filter_map(|fragment| {
                fragment
                    .get("plain_text")
                    .or_else(|| fragment.get("text").and_then(|t| t.get("content")))
                    .and_then(Value::as_str)
            })
            .collect()),
        _ => Err(Error::Parse(format!("{type_name} property is not a text array"))),
    }
}

fn option_name(body: &Value, type_name: &str) -> Result<Option<String>> {
    match body {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(map.get("name").and_then(Value::as_str).map(str::to_string)),
        _ => Err(Error::Parse(format!("{type_name} property is not an option"))),
    }
}

fn date_start(body: &Value, type_name: &str) -> Result<Option<DueDate>> {
    match body {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(map
            .get("start")
            .and_then(Value::as_str)
            .and_then(DueDate::parse)),
        _ => Err(Error::Parse(format!("{type_name} property is not a date"))),
    }
}
