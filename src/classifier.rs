// src/classifier.rs
//! Reference classification for stored file-field values.
//!
//! Classification never touches the network or disk. Evaluation order is
//! Empty, Broken, Durable, Ephemeral, and everything left over is Opaque.

use crate::types::ReferenceClassification;
use tracing::{debug, warn};

/// Minimum length of an upstream platform file id
pub const MIN_FILE_ID_LEN: usize = 10;

/// Substrings that mark a stored value as dangling.
/// Matched ASCII case-insensitively.
pub const BROKEN_MARKERS: &[&str] = &[
    "contact-pending",
    "contact-undefined",
    "contact-null",
    "404 not found",
    "\"error_code\"",
    "bad request",
    "internal server error",
];

/// True when `value` has the shape of an upstream file id and carries no bad
/// marker. This is the exact predicate behind the Ephemeral branch of
/// [`Classifier::classify`].
pub fn is_ephemeral_reference(value: &str) -> bool {
    let trimmed = value.trim();
    has_file_id_shape(trimmed) && !contains_broken_marker(trimmed)
}

fn has_file_id_shape(value: &str) -> bool {
    value.len() >= MIN_FILE_ID_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

pub(crate) fn contains_broken_marker(value: &str) -> bool {
    let lowered = value.to_ascii_lowercase();
    BROKEN_MARKERS.iter().any(|marker| lowered.contains(marker))
}

#[derive(Debug, Clone)]
pub struct Classifier {
    durable_prefixes: Vec<String>,
}

impl Classifier {
    /// `public_base_url` is the durable store's base URL; `local_prefixes` are
    /// path prefixes (e.g. `/uploads/`) that also count as durable.
    ///
    /// Prefixes without a `/` or `:` are ignored: they could collide with the
    /// file id shape.
    pub fn new(public_base_url: &str, local_prefixes: &[String]) -> Self {
        let mut durable_prefixes = Vec::new();

        let base = public_base_url.trim().trim_end_matches('/');
        if !base.is_empty() {
            durable_prefixes.push(format!("{}/", base));
        }

        for prefix in local_prefixes {
            let prefix = prefix.trim();
            if prefix.contains('/') || prefix.contains(':') {
                durable_prefixes.push(prefix.to_string());
            } else if !prefix.is_empty() {
                warn!("Ignoring durable prefix without path separator: {}", prefix);
            }
        }

        Self { durable_prefixes }
    }

    pub fn durable_prefixes(&self) -> &[String] {
        &self.durable_prefixes
    }

    pub fn classify(&self, raw_value: &str) -> ReferenceClassification {
        let trimmed = raw_value.trim();

        if trimmed.is_empty() {
            return ReferenceClassification::Empty;
        }

        if contains_broken_marker(trimmed) {
            return ReferenceClassification::Broken(trimmed.to_string());
        }

        if self.is_durable(trimmed) {
            return ReferenceClassification::Durable(trimmed.to_string());
        }

        if is_ephemeral_reference(trimmed) {
            return ReferenceClassification::Ephemeral(trimmed.to_string());
        }

        debug!("Unknown file reference format: {}", trimmed);
        ReferenceClassification::Opaque(trimmed.to_string())
    }

    fn is_durable(&self, value: &str) -> bool {
        self.durable_prefixes
            .iter()
            .any(|prefix| value.starts_with(prefix.as_str()))
    }
}
