// src/types/file_field.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical file fields carried by a candidate contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Resume,
    Diploma,
    #[serde(rename = "voice_answer_1")]
    VoiceAnswer1,
    #[serde(rename = "voice_answer_2")]
    VoiceAnswer2,
    #[serde(rename = "voice_answer_3")]
    VoiceAnswer3,
    Logo,
    Photo,
}

impl FieldName {
    pub const ALL: [FieldName; 7] = [
        FieldName::Resume,
        FieldName::Diploma,
        FieldName::VoiceAnswer1,
        FieldName::VoiceAnswer2,
        FieldName::VoiceAnswer3,
        FieldName::Logo,
        FieldName::Photo,
    ];

    /// Slug used in filenames, webhook keys and CLI arguments
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resume => "resume",
            Self::Diploma => "diploma",
            Self::VoiceAnswer1 => "voice_answer_1",
            Self::VoiceAnswer2 => "voice_answer_2",
            Self::VoiceAnswer3 => "voice_answer_3",
            Self::Logo => "logo",
            Self::Photo => "photo",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "resume" | "cv" => Ok(Self::Resume),
            "diploma" => Ok(Self::Diploma),
            "voice_answer_1" | "voiceanswer1" | "voice1" => Ok(Self::VoiceAnswer1),
            "voice_answer_2" | "voiceanswer2" | "voice2" => Ok(Self::VoiceAnswer2),
            "voice_answer_3" | "voiceanswer3" | "voice3" => Ok(Self::VoiceAnswer3),
            "logo" => Ok(Self::Logo),
            "photo" => Ok(Self::Photo),
            other => Err(format!("Unknown file field: {}", other)),
        }
    }
}

/// Raw value of one file field on one owning record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFieldValue {
    pub owner_id: String,
    pub field_name: FieldName,
    pub raw_value: String,
}

impl FileFieldValue {
    pub fn new(owner_id: impl Into<String>, field_name: FieldName, raw_value: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            field_name,
            raw_value: raw_value.into(),
        }
    }
}

/// Outcome of classifying a raw field value.
///
/// `Opaque` holds values that match none of the known shapes; they are left
/// untouched by every consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ReferenceClassification {
    Empty,
    Ephemeral(String),
    Broken(String),
    Durable(String),
    Opaque(String),
}

impl ReferenceClassification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Ephemeral(_) => "ephemeral",
            Self::Broken(_) => "broken",
            Self::Durable(_) => "durable",
            Self::Opaque(_) => "opaque",
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Durable(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// A file re-hosted in durable storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermanentFile {
    pub filename: String,
    pub byte_size: u64,
    pub content_type: String,
    pub public_url: String,
}
