//! Remote collection schema.
//!
//! A schema is the list of property names a remote collection defines, each
//! with its structural kind. Field resolution runs against it.

use crate::{error::Result, Error, PropertyKind, PropertyMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Property names and kinds of a remote collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSchema {
    /// Remote display title of the collection, if any
    #[serde(default)]
    pub title: String,
    /// Property kinds by property name
    pub properties: BTreeMap<String, PropertyKind>,
}

impl CollectionSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property (builder style).
    pub fn with_property(mut self, name: impl Into<String>, kind: PropertyKind) -> Self {
        self.properties.insert(name.into(), kind);
        self
    }

    /// Derive a schema from the properties of a single record.
    pub fn from_properties(properties: &PropertyMap) -> Self {
        Self {
            title: String::new(),
            properties: properties
                .iter()
                .map(|(name, value)| (name.clone(), value.kind()))
                .collect(),
        }
    }

    /// Decode a remote collection description (`{"title": [...], "properties": {...}}`).
    pub fn from_json(value: &Value) -> Result<Self> {
        let properties = value
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::Parse("schema without properties".into()))?;

        let properties = properties
            .iter()
            .map(|(name, def)| {
                let kind = def
                    .get("type")
                    .and_then(Value::as_str)
                    .map(PropertyKind::from_type_name)
                    .unwrap_or(PropertyKind::Unknown);
                (name.clone(), kind)
            })
            .collect();

        let title = value
            .get("title")
            .and_then(Value::as_array)
            .map(|fragments| {
                fragments
                    .iter()
                    .filter_map(|f| f.get("plain_text").and_then(Value::as_str))
                    .collect::<String>()
            })
            .unwrap_or_default();

        Ok(Self { title, properties })
    }

    /// Kind of a property by exact name.
    pub fn kind_of(&self, name: &str) -> Option<PropertyKind> {
        self.properties.get(name).copied()
    }

    /// Name of the first title-kind property, if any.
    pub fn title_property(&self) -> Option<&str> {
        self.properties
            .iter()
            .find(|(_, kind)| **kind == PropertyKind::Title)
            .map(|(name, _)| name.as_str())
    }
}
