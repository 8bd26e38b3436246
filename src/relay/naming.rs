// src/relay/naming.rs
//! Filenames for relayed files:
//! `[contact-{owner}_]{field}_{YYYY-MM-DD}_{8 hex}{ext}`

use crate::classifier::contains_broken_marker;
use crate::types::FieldName;
use crate::utils::normalize_owner_id;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingScheme {
    /// Fresh random suffix per relay
    #[default]
    Random,
    /// Suffix derived from the SHA-256 of the bytes; identical bytes for the
    /// same owner, field and day map to the same file
    ContentHash,
}

impl NamingScheme {
    pub fn suffix(&self, data: &[u8]) -> String {
        match self {
            Self::Random => random_suffix(),
            Self::ContentHash => content_suffix(data),
        }
    }
}

pub fn random_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..SUFFIX_LEN].to_string()
}

pub fn content_suffix(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(digest)[..SUFFIX_LEN].to_string()
}

/// Prefix shared by every file of one owner and field.
///
/// Unresolved owner ids (`null`, `undefined`, `pending`) are treated as absent:
/// a `contact-null_` name would read back as a broken reference.
pub fn owner_field_prefix(owner_id: Option<&str>, field: FieldName) -> String {
    let owner = owner_id
        .map(normalize_owner_id)
        .filter(|id| !id.is_empty())
        .map(|id| format!("contact-{}_", id))
        .filter(|prefix| !contains_broken_marker(prefix));

    match owner {
        Some(owner) => format!("{}{}_", owner, field.as_str()),
        None => format!("{}_", field.as_str()),
    }
}

pub fn build_filename(
    owner_id: Option<&str>,
    field: FieldName,
    date: NaiveDate,
    suffix: &str,
    extension: &str,
) -> String {
    format!(
        "{}{}_{}{}",
        owner_field_prefix(owner_id, field),
        date.format("%Y-%m-%d"),
        suffix,
        extension
    )
}
