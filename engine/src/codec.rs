//! Record codec: remote pages to [`Record`]s and [`RecordPatch`]es to remote
//! property updates.
//!
//! Decoding is lenient per record. A malformed page is skipped and reported as
//! a [`Diagnostic`]; it never aborts the rest of the response. Only a response
//! whose envelope is unreadable fails as a whole.

use crate::{
    decode_properties, error::Result, CollectionSchema, Error, FieldResolver, Priority,
    PropertyKind, PropertyMap, PropertyValue, Record, RecordId, RecordPatch, ResolvedFields,
    SemanticField, Status, Timestamp, UNTITLED,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Something noteworthy found while decoding that did not stop decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Diagnostic {
    /// A status or priority option the engine does not recognize.
    UnknownFieldValue {
        record_id: RecordId,
        field: SemanticField,
        value: String,
    },
    /// A property the engine does not use had an unreadable value.
    MalformedProperty {
        record_id: RecordId,
        property: String,
        reason: String,
    },
    /// A page that could not be decoded and was left out.
    SkippedRecord {
        record_id: Option<RecordId>,
        reason: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnknownFieldValue {
                record_id,
                field,
                value,
            } => write!(f, "record {record_id}: unrecognized {field} value '{value}'"),
            Diagnostic::MalformedProperty {
                record_id,
                property,
                reason,
            } => write!(f, "record {record_id}: ignored property '{property}': {reason}"),
            Diagnostic::SkippedRecord {
                record_id: Some(id),
                reason,
            } => write!(f, "record {id} skipped: {reason}"),
            Diagnostic::SkippedRecord {
                record_id: None,
                reason,
            } => write!(f, "record skipped: {reason}"),
        }
    }
}

/// One decoded page of a record query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    pub records: Vec<Record>,
    pub diagnostics: Vec<Diagnostic>,
    pub next_cursor: Option<String>,
}

/// Turns remote pages into records using a [`FieldResolver`].
#[derive(Debug, Clone, Default)]
pub struct PropertyExtractor {
    resolver: FieldResolver,
}

impl PropertyExtractor {
    pub fn new(resolver: FieldResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &FieldResolver {
        &self.resolver
    }

    /// Resolve semantic fields against a schema.
    pub fn resolve(&self, schema: &CollectionSchema) -> ResolvedFields {
        self.resolver.resolve(schema)
    }

    /// Decode a record query response (`{"results": [...], "has_more", "next_cursor"}`).
    ///
    /// Archived pages are dropped silently.
    pub fn decode_query(&self, response: &Value) -> Result<QueryPage> {
        let results = response
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Parse("query response without results".into()))?;

        let mut page = QueryPage::default();
        for raw in results {
            if raw.get("archived").and_then(Value::as_bool) == Some(true)
                || raw.get("in_trash").and_then(Value::as_bool) == Some(true)
            {
                continue;
            }
            match self.decode_page(raw) {
                Ok((record, diagnostics)) => {
                    page.records.push(record);
                    page.diagnostics.extend(diagnostics);
                }
                Err(err) => page.diagnostics.push(Diagnostic::SkippedRecord {
                    record_id: raw.get("id").and_then(Value::as_str).map(str::to_string),
                    reason: err.to_string(),
                }),
            }
        }

        if response.get("has_more").and_then(Value::as_bool) == Some(true) {
            page.next_cursor = response
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        Ok(page)
    }

    /// Decode one page into a record.
    ///
    /// Fails when the id or timestamps are unreadable, or when a property
    /// bound to a semantic field is malformed. Other malformed properties are
    /// reported and ignored.
    pub fn decode_page(&self, page: &Value) -> Result<(Record, Vec<Diagnostic>)> {
        let id = page
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Parse("page without id".into()))?
            .to_string();
        let created_at = timestamp(page, "created_time")?;
        let updated_at = match page.get("last_edited_time") {
            Some(_) => timestamp(page, "last_edited_time")?,
            None => created_at,
        };

        let properties = decode_properties(page.get("properties").unwrap_or(&Value::Null))?;
        let fields = self
            .resolver
            .resolve(&CollectionSchema::from_properties(&properties));

        let mut diagnostics = Vec::new();
        for (name, value) in &properties {
            let PropertyValue::Malformed { reason, .. } = value else {
                continue;
            };
            let bound = SemanticField::ALL
                .into_iter()
                .find(|field| fields.get(*field).is_some_and(|f| &f.name == name));
            if let Some(field) = bound {
                return Err(Error::Parse(format!(
                    "{field} property '{name}': {reason}"
                )));
            }
            diagnostics.push(Diagnostic::MalformedProperty {
                record_id: id.clone(),
                property: name.clone(),
                reason: reason.clone(),
            });
        }

        let title = field_value(&properties, &fields, SemanticField::Title)
            .and_then(PropertyValue::text)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(UNTITLED)
            .to_string();

        let status = match field_value(&properties, &fields, SemanticField::Status)
            .and_then(PropertyValue::option)
        {
            Some(name) => Status::parse(name).unwrap_or_else(|| {
                diagnostics.push(Diagnostic::UnknownFieldValue {
                    record_id: id.clone(),
                    field: SemanticField::Status,
                    value: name.to_string(),
                });
                Status::NotStarted
            }),
            None => Status::NotStarted,
        };

        let priority = match field_value(&properties, &fields, SemanticField::Priority)
            .and_then(PropertyValue::option)
        {
            Some(name) => {
                let parsed = Priority::parse(name);
                if parsed.is_none() {
                    diagnostics.push(Diagnostic::UnknownFieldValue {
                        record_id: id.clone(),
                        field: SemanticField::Priority,
                        value: name.to_string(),
                    });
                }
                parsed
            }
            None => None,
        };

        let due = match field_value(&properties, &fields, SemanticField::DueDate) {
            Some(PropertyValue::Date(due)) => *due,
            _ => None,
        };

        let record = Record {
            id,
            title,
            status,
            priority,
            due,
            created_at,
            updated_at,
            pending_since: None,
        };
        Ok((record, diagnostics))
    }
}

fn field_value<'a>(
    properties: &'a PropertyMap,
    fields: &ResolvedFields,
    field: SemanticField,
) -> Option<&'a PropertyValue> {
    fields.get(field).and_then(|f| properties.get(&f.name))
}

fn timestamp(page: &Value, key: &str) -> Result<Timestamp> {
    let raw = page
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Parse(format!("page without {key}")))?;
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&chrono::Utc))
        .map_err(|e| Error::Parse(format!("invalid {key} '{raw}': {e}")))
}

/// Encode a patch as a remote property update body (`{"properties": {...}}`).
///
/// The option shape follows the resolved property: status-kind properties get
/// a `status` payload, select-kind ones a `select` payload.
pub fn encode_patch(fields: &ResolvedFields, patch: &RecordPatch) -> Result<Value> {
    let field = match patch {
        RecordPatch::Status(_) => SemanticField::Status,
        RecordPatch::Priority(_) => SemanticField::Priority,
        RecordPatch::DueDate(_) => SemanticField::DueDate,
        RecordPatch::Title(_) => SemanticField::Title,
    };
    let target = fields
        .get(field)
        .ok_or_else(|| Error::UnresolvedField(field.to_string()))?;

    let value = match patch {
        RecordPatch::Status(status) => option_payload(target.kind, Some(status.label())),
        RecordPatch::Priority(priority) => {
            option_payload(target.kind, priority.map(Priority::label))
        }
        RecordPatch::DueDate(Some(due)) => json!({ "date": { "start": due.to_wire() } }),
        RecordPatch::DueDate(None) => json!({ "date": null }),
        RecordPatch::Title(title) => {
            let title = if title.trim().is_empty() { UNTITLED } else { title };
            json!({ "title": [{ "type": "text", "text": { "content": title } }] })
        }
    };

    let mut properties = Map::new();
    properties.insert(target.name.clone(), value);
    Ok(json!({ "properties": properties }))
}

fn option_payload(kind: PropertyKind, name: Option<&str>) -> Value {
    let tag = if kind == PropertyKind::Status {
        "status"
    } else {
        "select"
    };
    let mut payload = Map::new();
    payload.insert(
        tag.to_string(),
        name.map(|name| json!({ "name": name })).unwrap_or(Value::Null),
    );
    Value::Object(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DueDate, ResolvedField};
    use serde_json::json;

    fn page(id: &str, status: &str) -> Value {
        json!({
            "object": "page",
            "id": id,
            "created_time": "2024-04-01T10:00:00.000Z",
            "last_edited_time": "2024-04-02T10:00:00.000Z",
            "properties": {
                "Name": {"type": "title", "title": [{"plain_text": format!("Task {id}")}]},
                "Status": {"type": "status", "status": {"name": status}},
                "Priority": {"type": "select", "select": {"name": "High"}},
                "Due": {"type": "date", "date": {"start": "2024-05-01"}}
            }
        })
    }

    #[test]
    fn decode_full_page() {
        let extractor = PropertyExtractor::default();
        let (record, diagnostics) = extractor.decode_page(&page("p1", "In progress")).unwrap();

        assert!(diagnostics.is_empty());
        assert_eq!(record.id, "p1");
        assert_eq!(record.title, "Task p1");
        assert_eq!(record.status, Status::InProgress);
        assert_eq!(record.priority, Some(Priority::High));
        assert_eq!(record.due, DueDate::parse("2024-05-01"));
        assert!(record.updated_at > record.created_at);
    }

    #[test]
    fn unknown_status_defaults_with_diagnostic() {
        let extractor = PropertyExtractor::default();
        let (record, diagnostics) = extractor
            .decode_page(&page("p1", "Waiting on someone"))
            .unwrap();

        assert_eq!(record.status, Status::NotStarted);
        assert_eq!(
            diagnostics,
            vec![Diagnostic::UnknownFieldValue {
                record_id: "p1".into(),
                field: SemanticField::Status,
                value: "Waiting on someone".into(),
            }]
        );
    }

    #[test]
    fn missing_fields_use_defaults() {
        let extractor = PropertyExtractor::default();
        let raw = json!({
            "id": "p2",
            "created_time": "2024-04-01T10:00:00Z",
            "properties": {
                "Name": {"type": "title", "title": []},
                "Priority": {"type": "select", "select": {"name": "Someday"}}
            }
        });
        let (record, diagnostics) = extractor.decode_page(&raw).unwrap();

        assert_eq!(record.title, UNTITLED);
        assert_eq!(record.status, Status::NotStarted);
        assert_eq!(record.priority, None);
        assert_eq!(record.due, None);
        assert_eq!(record.updated_at, record.created_at);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn malformed_page_does_not_abort_query() {
        let extractor = PropertyExtractor::default();
        let response = json!({
            "results": [
                page("p1", "Done"),
                {"id": "broken", "properties": {}},
                {"id": "p3", "created_time": "2024-04-01T10:00:00Z",
                 "properties": {"Name": {"type": "title", "title": 7}}},
                page("p4", "Not started")
            ],
            "has_more": true,
            "next_cursor": "cursor-2"
        });

        let page = extractor.decode_query(&response).unwrap();
        let ids: Vec<_> = page.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p4"]);
        assert_eq!(page.diagnostics.len(), 2);
        assert_eq!(page.next_cursor.as_deref(), Some("cursor-2"));
    }

    #[test]
    fn unrelated_bad_property_keeps_the_record() {
        let extractor = PropertyExtractor::default();
        let mut raw = page("p1", "In progress");
        raw["properties"]["Reviewed"] = json!({"type": "checkbox", "checkbox": null});
        let response = json!({"results": [raw], "has_more": false, "next_cursor": null});

        let page = extractor.decode_query(&response).unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].status, Status::InProgress);
        assert_eq!(page.records[0].priority, Some(Priority::High));
        assert!(matches!(
            page.diagnostics.as_slice(),
            [Diagnostic::MalformedProperty { record_id, property, .. }]
                if record_id == "p1" && property == "Reviewed"
        ));
    }

    #[test]
    fn bad_status_property_skips_the_record() {
        let extractor = PropertyExtractor::default();
        let mut raw = page("p1", "Done");
        raw["properties"]["Status"] = json!({"type": "status", "status": "Done"});

        let err = extractor.decode_page(&raw).unwrap_err();
        assert!(matches!(err, Error::Parse(reason) if reason.contains("Status")));
    }

    #[test]
    fn archived_pages_are_dropped() {
        let extractor = PropertyExtractor::default();
        let mut archived = page("p1", "Done");
        archived["archived"] = json!(true);
        let response = json!({"results": [archived], "has_more": false, "next_cursor": null});

        let page = extractor.decode_query(&response).unwrap();
        assert!(page.records.is_empty());
        assert!(page.diagnostics.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn query_envelope_must_have_results() {
        let extractor = PropertyExtractor::default();
        assert!(extractor.decode_query(&json!({"object": "error"})).is_err());
    }

    fn fields(status_kind: PropertyKind) -> ResolvedFields {
        ResolvedFields {
            title: Some(ResolvedField {
                name: "Name".into(),
                kind: PropertyKind::Title,
            }),
            status: Some(ResolvedField {
                name: "Stage".into(),
                kind: status_kind,
            }),
            priority: Some(ResolvedField {
                name: "Priority".into(),
                kind: PropertyKind::Select,
            }),
            due_date: None,
        }
    }

    #[test]
    fn encode_status_follows_shape() {
        let body = encode_patch(
            &fields(PropertyKind::Status),
            &RecordPatch::Status(Status::Done),
        )
        .unwrap();
        assert_eq!(
            body,
            json!({"properties": {"Stage": {"status": {"name": "Done"}}}})
        );

        let body = encode_patch(
            &fields(PropertyKind::Select),
            &RecordPatch::Status(Status::Done),
        )
        .unwrap();
        assert_eq!(
            body,
            json!({"properties": {"Stage": {"select": {"name": "Done"}}}})
        );
    }

    #[test]
    fn encode_clear_priority_and_title() {
        let f = fields(PropertyKind::Status);
        assert_eq!(
            encode_patch(&f, &RecordPatch::Priority(None)).unwrap(),
            json!({"properties": {"Priority": {"select": null}}})
        );
        assert_eq!(
            encode_patch(&f, &RecordPatch::Title("Ship it".into())).unwrap(),
            json!({"properties": {"Name": {"title": [{"type": "text", "text": {"content": "Ship it"}}]}}})
        );
    }

    #[test]
    fn encode_unresolved_field_fails() {
        let err = encode_patch(&fields(PropertyKind::Status), &RecordPatch::DueDate(None))
            .unwrap_err();
        assert_eq!(err, Error::UnresolvedField("due date".into()));
    }
}
