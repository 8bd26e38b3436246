// src/types/crm.rs
use super::file_field::{FieldName, FileFieldValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// External contact record, addressed by its CRM id.
///
/// Only the fields requested through `select` are present; everything else the
/// CRM stores stays on the CRM side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrmRecord {
    pub external_id: String,
    pub fields: Map<String, Value>,
}

impl CrmRecord {
    pub fn new(external_id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            external_id: external_id.into(),
            fields,
        }
    }

    /// Build a record from a raw CRM object, reading the id from `ID` or `id`
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(fields) = value else {
            return None;
        };

        let external_id = fields
            .get("ID")
            .or_else(|| fields.get("id"))
            .and_then(|id| match id {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })?;

        Some(Self {
            external_id,
            fields,
        })
    }

    /// Field value as text. Null and missing fields read as empty; arrays yield
    /// their first string element (multi-value CRM fields).
    pub fn field_text(&self, code: &str) -> Option<String> {
        match self.fields.get(code)? {
            Value::Null => Some(String::new()),
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Array(items) => match items.first() {
                None => Some(String::new()),
                Some(Value::String(s)) => Some(s.clone()),
                Some(_) => None,
            },
            Value::Object(_) => None,
        }
    }

    /// The file field stored under CRM code `code`, when it reads as text
    pub fn file_field(&self, field: FieldName, code: &str) -> Option<FileFieldValue> {
        self.field_text(code)
            .map(|raw| FileFieldValue::new(self.external_id.clone(), field, raw))
    }
}

/// `crm.contact.list` response envelope
#[derive(Debug, Deserialize)]
pub struct CrmListResponse {
    #[serde(default)]
    pub result: Vec<Value>,
    pub next: Option<u64>,
    pub total: Option<u64>,
}

/// `crm.contact.get` response envelope
#[derive(Debug, Deserialize)]
pub struct CrmGetResponse {
    pub result: Value,
}

/// `crm.contact.update` response envelope
#[derive(Debug, Deserialize)]
pub struct CrmUpdateResponse {
    #[serde(default)]
    pub result: bool,
}

/// Error body the CRM returns alongside non-2xx statuses
#[derive(Debug, Deserialize)]
pub struct CrmErrorBody {
    pub error: Option<String>,
    pub error_description: Option<String>,
}
