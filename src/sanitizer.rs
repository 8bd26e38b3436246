// src/sanitizer.rs
//! Cleaning of inbound intake payloads.
//!
//! The bot platform forwards free text verbatim: values arrive with byte-order
//! marks, zero-width joiners, unresolved template variables and quotes that were
//! never escaped. Everything here degrades instead of failing.

use crate::types::FieldName;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Prefix of an unresolved CRM template variable
pub const DEFAULT_PLACEHOLDER_PREFIX: &str = "UF_CRM_";

const INVISIBLE_CHARS: &[char] = &['\u{FEFF}', '\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}'];

/// Wrappers the bot platform puts around template variables
const PLACEHOLDER_WRAPPERS: &[(&str, &str)] = &[("{=", "}"), ("{{", "}}"), ("#", "#")];

const TEXT_FIELDS: &[&str] = &[
    "contact_id",
    "chat_id",
    "username",
    "name",
    "phone",
    "city",
    "vacancy",
    "age",
    "citizenship",
    "experience",
    "answer_1",
    "answer_2",
    "answer_3",
    "answer_4",
    "answer_5",
];

/// Known intake keys; everything else is dropped
#[derive(Debug, Clone)]
pub struct KnownFields {
    names: HashSet<String>,
}

impl Default for KnownFields {
    fn default() -> Self {
        let names = TEXT_FIELDS
            .iter()
            .map(|name| name.to_string())
            .chain(FieldName::ALL.iter().map(|field| field.as_str().to_string()))
            .collect();
        Self { names }
    }
}

impl KnownFields {
    pub fn with_extra<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(extra.into_iter().map(Into::into));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

#[derive(Debug, Clone)]
pub struct Sanitizer {
    known_fields: KnownFields,
    placeholder_prefix: String,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(KnownFields::default(), DEFAULT_PLACEHOLDER_PREFIX)
    }
}

impl Sanitizer {
    pub fn new(known_fields: KnownFields, placeholder_prefix: &str) -> Self {
        Self {
            known_fields,
            placeholder_prefix: placeholder_prefix.to_string(),
        }
    }

    /// Clean a raw intake object. Present keys always carry non-empty values.
    pub fn sanitize(&self, raw: &Map<String, Value>) -> BTreeMap<String, String> {
        let mut cleaned = BTreeMap::new();

        for (raw_key, raw_value) in raw {
            let key = strip_invisible(raw_key).trim().to_string();

            if !self.known_fields.contains(&key) {
                debug!("Dropping unknown intake field: {:?}", raw_key);
                continue;
            }

            let value = self.clean_value(&coerce_to_string(raw_value));
            if value.is_empty() {
                debug!("Dropping empty intake field: {}", key);
                continue;
            }

            cleaned.insert(key, value);
        }

        cleaned
    }

    /// Strip invisible characters and placeholders from one value, then trim
    pub fn clean_value(&self, value: &str) -> String {
        let visible = strip_invisible(value);
        strip_placeholders(&visible, &self.placeholder_prefix)
            .trim()
            .to_string()
    }
}

fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

pub fn strip_invisible(value: &str) -> String {
    value.chars().filter(|c| !INVISIBLE_CHARS.contains(c)).collect()
}

/// Remove `prefix` + `[A-Z0-9_]+` tokens, together with a surrounding wrapper
/// when one encloses the token.
pub fn strip_placeholders(value: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len());
    let mut cursor = 0;

    while let Some(found) = value[cursor..].find(prefix) {
        let start = cursor + found;
        let id_start = start + prefix.len();
        let id_len = value[id_start..]
            .bytes()
            .take_while(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || *b == b'_')
            .count();

        if id_len == 0 {
            out.push_str(&value[cursor..id_start]);
            cursor = id_start;
            continue;
        }

        let mut token_start = start;
        let mut token_end = id_start + id_len;
        for (open, close) in PLACEHOLDER_WRAPPERS {
            if value[cursor..token_start].ends_with(open) && value[token_end..].starts_with(close) {
                token_start -= open.len();
                token_end += close.len();
                break;
            }
        }

        out.push_str(&value[cursor..token_start]);
        cursor = token_end;
    }

    out.push_str(&value[cursor..]);
    out
}

/// Result of a tolerant JSON parse
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedPayload {
    Strict(Value),
    Repaired(Value),
    Raw(String),
}

impl ParsedPayload {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Strict(value) | Self::Repaired(value) => Some(value),
            Self::Raw(_) => None,
        }
    }
}

/// Strict parse, then one retry after structural repair, then the raw input
pub fn safe_json_parse(raw: &str) -> ParsedPayload {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => return ParsedPayload::Strict(value),
        Err(e) => debug!("Strict JSON parse failed: {}", e),
    }

    let repaired = repair_json(raw);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            debug!("JSON parsed after structural repair");
            ParsedPayload::Repaired(value)
        }
        Err(e) => {
            warn!("JSON repair failed, passing raw payload through: {}", e);
            ParsedPayload::Raw(raw.to_string())
        }
    }
}

/// Apply the bounded repair set: invisible prefix, inner quotes and control
/// characters inside strings, bare keys, trailing commas.
pub fn repair_json(raw: &str) -> String {
    let visible = raw.trim_start_matches(INVISIBLE_CHARS).trim();
    let escaped = escape_inner_quotes(visible);
    let keyed = quote_bare_keys(&escaped);
    remove_trailing_commas(&keyed)
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from..].iter().copied().find(|c| !c.is_whitespace())
}

/// Inside a string, a quote only closes it when the next significant
/// character is structural; any other quote is escaped.
fn escape_inner_quotes(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 8);
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            i += 1;
            continue;
        }

        match c {
            '\\' => {
                out.push(c);
                if let Some(next) = chars.get(i + 1) {
                    out.push(*next);
                    i += 1;
                }
            }
            '"' => match next_significant(&chars, i + 1) {
                None | Some(',') | Some('}') | Some(']') | Some(':') => {
                    in_string = false;
                    out.push('"');
                }
                Some(_) => out.push_str("\\\""),
            },
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
        i += 1;
    }

    out
}

fn quote_bare_keys(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 8);
    let mut in_string = false;
    let mut escaped = false;
    let mut last_significant: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                last_significant = Some('"');
            }
            i += 1;
            continue;
        }

        let starts_key = (c.is_ascii_alphabetic() || c == '_' || c == '$')
            && matches!(last_significant, Some('{') | Some(','));

        if starts_key {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || matches!(chars[i], '_' | '$' | '-')) {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            if next_significant(&chars, i) == Some(':') {
                out.push('"');
                out.push_str(&ident);
                out.push('"');
            } else {
                out.push_str(&ident);
            }
            last_significant = chars.get(i - 1).copied();
            continue;
        }

        if c == '"' {
            in_string = true;
        }
        if !c.is_whitespace() {
            last_significant = Some(c);
        }
        out.push(c);
        i += 1;
    }

    out
}

fn remove_trailing_commas(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' if matches!(next_significant(&chars, i + 1), Some('}') | Some(']')) => {}
            _ => out.push(c),
        }
    }

    out
}

/// Escape string values so they survive being spliced into templated JSON
pub fn safe_json_response(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(escape_json_text(s)),
        Value::Array(items) => Value::Array(items.iter().map(safe_json_response).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), safe_json_response(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn escape_json_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_sanitize_strips_invisible_characters_from_keys_and_values() {
        let raw = object(json!({
            "\u{FEFF}name": "\u{200B}Anna\u{200D} ",
            "phone\u{2060}": "+7 900 000 00 00\u{FEFF}",
        }));
        let cleaned = Sanitizer::default().sanitize(&raw);
        assert_eq!(cleaned.get("name").map(String::as_str), Some("Anna"));
        assert_eq!(cleaned.get("phone").map(String::as_str), Some("+7 900 000 00 00"));
        for (key, value) in &cleaned {
            assert!(!key.chars().any(|c| INVISIBLE_CHARS.contains(&c)));
            assert!(!value.chars().any(|c| INVISIBLE_CHARS.contains(&c)));
        }
    }

    #[test]
    fn test_sanitize_drops_unknown_and_empty_fields() {
        let raw = object(json!({
            "name": "Ivan",
            "favourite_colour": "green",
            "city": "   ",
            "resume": null,
            "diploma": "{=UF_CRM_1712345678}",
        }));
        let cleaned = Sanitizer::default().sanitize(&raw);
        assert_eq!(cleaned.len(), 1);
        assert!(cleaned.contains_key("name"));
    }

    #[test]
    fn test_sanitize_coerces_scalars() {
        let raw = object(json!({"age": 31, "contact_id": 1055, "experience": true}));
        let cleaned = Sanitizer::default().sanitize(&raw);
        assert_eq!(cleaned["age"], "31");
        assert_eq!(cleaned["contact_id"], "1055");
        assert_eq!(cleaned["experience"], "true");
    }

    #[test]
    fn test_strip_placeholders_variants() {
        let prefix = DEFAULT_PLACEHOLDER_PREFIX;
        assert_eq!(strip_placeholders("Hello UF_CRM_ABC123!", prefix), "Hello !");
        assert_eq!(strip_placeholders("a {{UF_CRM_X1}} b", prefix), "a  b");
        assert_eq!(strip_placeholders("#UF_CRM_77#", prefix), "");
        assert_eq!(strip_placeholders("{=UF_CRM_5_A}tail", prefix), "tail");
        // lowercase id is not a placeholder
        assert_eq!(strip_placeholders("UF_CRM_abc", prefix), "UF_CRM_abc");
        assert_eq!(strip_placeholders("no tokens here", prefix), "no tokens here");
    }

    #[test]
    fn test_sanitized_output_contains_no_placeholders() {
        let sanitizer = Sanitizer::default();
        let inputs = [
            "UF_CRM_1 UF_CRM_2",
            "x{{UF_CRM_AAA}}y\u{FEFF}",
            "\u{200B}UF_CRM_Q9 answer",
        ];
        for input in inputs {
            let cleaned = sanitizer.clean_value(input);
            assert!(!cleaned.contains("UF_CRM_"), "left placeholder in {:?}", cleaned);
            assert!(!cleaned.chars().any(|c| INVISIBLE_CHARS.contains(&c)));
        }
    }

    #[test]
    fn test_safe_json_parse_strict() {
        let parsed = safe_json_parse(r#"{"name": "Anna"}"#);
        assert_eq!(parsed, ParsedPayload::Strict(json!({"name": "Anna"})));
    }

    #[test]
    fn test_safe_json_parse_repairs_trailing_commas_and_bare_keys() {
        let parsed = safe_json_parse(r#"{name: "Anna", city: "Kazan", tags: [1, 2,],}"#);
        assert_eq!(
            parsed,
            ParsedPayload::Repaired(json!({"name": "Anna", "city": "Kazan", "tags": [1, 2]}))
        );
    }

    #[test]
    fn test_safe_json_parse_repairs_inner_quotes() {
        let parsed = safe_json_parse(r#"{"answer_1": "I worked at "Romashka" LLC", "name": "Oleg"}"#);
        assert_eq!(
            parsed.value().and_then(|v| v.get("answer_1")).and_then(Value::as_str),
            Some(r#"I worked at "Romashka" LLC"#)
        );
    }

    #[test]
    fn test_safe_json_parse_repairs_doubled_quotes_and_newlines() {
        let raw = "{\"answer_2\": \"He said \"\"hi\"\"\nthen left\"}";
        let parsed = safe_json_parse(raw);
        assert_eq!(
            parsed.value().and_then(|v| v.get("answer_2")).and_then(Value::as_str),
            Some("He said \"\"hi\"\"\nthen left")
        );
    }

    #[test]
    fn test_safe_json_parse_strips_bom() {
        let parsed = safe_json_parse("\u{FEFF}{\"name\": \"Anna\"}");
        assert_eq!(parsed, ParsedPayload::Repaired(json!({"name": "Anna"})));
    }

    #[test]
    fn test_safe_json_parse_falls_back_to_raw() {
        let raw = "name=Anna&phone=123";
        assert_eq!(safe_json_parse(raw), ParsedPayload::Raw(raw.to_string()));
    }

    #[test]
    fn test_safe_json_response_escapes_nested_strings() {
        let value = json!({
            "a": "line1\nline2",
            "b": ["it's", {"c": "say \"x\"\t\\"}],
            "n": 5,
        });
        let escaped = safe_json_response(&value);
        assert_eq!(escaped["a"], "line1\\nline2");
        assert_eq!(escaped["b"][0], "it\\'s");
        assert_eq!(escaped["b"][1]["c"], "say \\\"x\\\"\\t\\\\");
        assert_eq!(escaped["n"], 5);
    }

    #[test]
    fn test_escaped_values_splice_into_valid_json() {
        let escaped = safe_json_response(&json!({"text": "quote \" and \\ and \nnewline"}));
        let text = escaped["text"].as_str().unwrap();
        let spliced = format!("{{\"reply\": \"{}\"}}", text.replace("\\'", "'"));
        let reparsed: Value = serde_json::from_str(&spliced).unwrap();
        assert_eq!(reparsed["reply"], "quote \" and \\ and \nnewline");
    }
}
