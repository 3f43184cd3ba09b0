//! Field resolution.
//!
//! Users name their remote properties freely ("Status", "Stage", "Deadline").
//! Each semantic field has an ordered list of candidate names plus the shapes
//! it accepts; the first candidate present in the schema with an accepted
//! shape wins. Candidate lists are plain data and can be loaded from config.

use crate::{CollectionSchema, PropertyKind};
use serde::{Deserialize, Serialize};

/// A field the engine understands, independent of its remote name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SemanticField {
    Title,
    Status,
    Priority,
    DueDate,
}

impl SemanticField {
    pub const ALL: [SemanticField; 4] = [
        SemanticField::Title,
        SemanticField::Status,
        SemanticField::Priority,
        SemanticField::DueDate,
    ];
}

impl std::fmt::Display for SemanticField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SemanticField::Title => write!(f, "title"),
            SemanticField::Status => write!(f, "status"),
            SemanticField::Priority => write!(f, "priority"),
            SemanticField::DueDate => write!(f, "due date"),
        }
    }
}

/// Candidate property names and accepted shapes for one semantic field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldCandidates {
    pub field: SemanticField,
    /// Tried in order; matching ignores case and surrounding whitespace
    pub names: Vec<String>,
    pub shapes: Vec<PropertyKind>,
}

impl FieldCandidates {
    pub fn new(
        field: SemanticField,
        names: impl IntoIterator<Item = impl Into<String>>,
        shapes: impl IntoIterator<Item = PropertyKind>,
    ) -> Self {
        Self {
            field,
            names: names.into_iter().map(Into::into).collect(),
            shapes: shapes.into_iter().collect(),
        }
    }

    fn accepts(&self, kind: PropertyKind) -> bool {
        self.shapes.contains(&kind)
    }
}

/// A semantic field bound to a concrete remote property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedField {
    pub name: String,
    pub kind: PropertyKind,
}

/// Result of resolving every semantic field against one schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedFields {
    pub title: Option<ResolvedField>,
    pub status: Option<ResolvedField>,
    pub priority: Option<ResolvedField>,
    pub due_date: Option<ResolvedField>,
}

impl ResolvedFields {
    pub fn get(&self, field: SemanticField) -> Option<&ResolvedField> {
        match field {
            SemanticField::Title => self.title.as_ref(),
            SemanticField::Status => self.status.as_ref(),
            SemanticField::Priority => self.priority.as_ref(),
            SemanticField::DueDate => self.due_date.as_ref(),
        }
    }

    fn slot(&mut self, field: SemanticField) -> &mut Option<ResolvedField> {
        match field {
            SemanticField::Title => &mut self.title,
            SemanticField::Status => &mut self.status,
            SemanticField::Priority => &mut self.priority,
            SemanticField::DueDate => &mut self.due_date,
        }
    }
}

/// Ordered-candidate resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldResolver {
    candidates: Vec<FieldCandidates>,
}

impl Default for FieldResolver {
    fn default() -> Self {
        Self::new(vec![
            FieldCandidates::new(
                SemanticField::Title,
                ["Name", "Title", "Task", "Task name", "Todo"],
                [PropertyKind::Title],
            ),
            FieldCandidates::new(
                SemanticField::Status,
                ["Status", "State", "Stage", "Progress"],
                [PropertyKind::Status, PropertyKind::Select],
            ),
            FieldCandidates::new(
                SemanticField::Priority,
                ["Priority", "Importance", "Urgency", "Level"],
                [PropertyKind::Select, PropertyKind::Status],
            ),
            FieldCandidates::new(
                SemanticField::DueDate,
                ["Due", "Due date", "Deadline", "Due by", "Date", "When"],
                [PropertyKind::Date],
            ),
        ])
    }
}

impl FieldResolver {
    pub fn new(candidates: Vec<FieldCandidates>) -> Self {
        Self { candidates }
    }

    /// Replace the candidate list for one field.
    pub fn with_candidates(mut self, candidates: FieldCandidates) -> Self {
        self.candidates.retain(|c| c.field != candidates.field);
        self.candidates.push(candidates);
        self
    }

    pub fn candidates(&self) -> &[FieldCandidates] {
        &self.candidates
    }

    /// Bind each semantic field to a property of `schema`.
    ///
    /// A title is always bound if the schema has any title-kind property, even
    /// when none of the candidate names match.
    pub fn resolve(&self, schema: &CollectionSchema) -> ResolvedFields {
        let mut resolved = ResolvedFields::default();

        for candidates in &self.candidates {
            let slot = resolved.slot(candidates.field);
            if slot.is_some() {
                continue;
            }
            *slot = find_match(schema, candidates);
        }

        if resolved.title.is_none() {
            resolved.title = schema.title_property().map(|name| ResolvedField {
                name: name.to_string(),
                kind: PropertyKind::Title,
            });
        }

        resolved
    }
}

fn find_match(schema: &CollectionSchema, candidates: &FieldCandidates) -> Option<ResolvedField> {
    candidates.names.iter().find_map(|candidate| {
        let wanted = candidate.trim().to_lowercase();
        schema
            .properties
            .iter()
            .find(|(name, kind)| name.trim().to_lowercase() == wanted && candidates.accepts(**kind))
            .map(|(name, kind)| ResolvedField {
                name: name.clone(),
                kind: *kind,
            })
    })
}
