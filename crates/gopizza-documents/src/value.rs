//! Firestore REST document shape
//!
//! Field values arrive type-tagged (`{"stringValue": "Ana"}`); only the
//! scalar kinds this app stores are decoded.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub(crate) struct Document {
    /// `projects/{p}/databases/(default)/documents/{collection}/{id}`
    pub name: String,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
}

impl Document {
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    pub fn string(&self, field: &str) -> Option<String> {
        self.fields
            .get(field)?
            .get("stringValue")?
            .as_str()
            .map(str::to_string)
    }

    pub fn boolean(&self, field: &str) -> Option<bool> {
        self.fields.get(field)?.get("booleanValue")?.as_bool()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RunQueryItem {
    #[serde(default)]
    pub document: Option<Document>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: String,
}
