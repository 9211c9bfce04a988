//! Strict and lenient document parsing.
//!
//! A document type lists its known top-level fields. Strict parsing rejects
//! anything else; lenient parsing drops unknown fields before decoding.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

static SEPARATOR_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\\/]+").expect("separator regex must compile"));

/// Unknown-field policy for one parse call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Reject documents carrying fields outside `KnownFields::FIELDS`.
    Strict,
    /// Drop unknown fields and decode the rest.
    Lenient,
}

/// Top-level fields a document type understands.
pub trait KnownFields {
    const FIELDS: &'static [&'static str];
}

#[derive(Debug)]
pub enum ParseError {
    /// The value is not a JSON object.
    NotAnObject,
    UnknownFields(Vec<String>),
    Decode(serde_json::Error),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "expected a JSON object"),
            Self::UnknownFields(fields) => write!(f, "unknown fields: {}", fields.join(", ")),
            Self::Decode(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decode(err) => Some(err),
            _ => None,
        }
    }
}

/// Decodes `value` as `T` under `mode`.
pub fn parse_value<T>(value: &Value, mode: ParseMode) -> Result<T, ParseError>
where
    T: DeserializeOwned + KnownFields,
{
    let Value::Object(map) = value else {
        return Err(ParseError::NotAnObject);
    };
    let unknown: Vec<String> = map
        .keys()
        .filter(|key| !T::FIELDS.contains(&key.as_str()))
        .cloned()
        .collect();

    if unknown.is_empty() {
        return serde_json::from_value(value.clone()).map_err(ParseError::Decode);
    }
    match mode {
        ParseMode::Strict => Err(ParseError::UnknownFields(unknown)),
        ParseMode::Lenient => {
            let mut trimmed = map.clone();
            trimmed.retain(|key, _| T::FIELDS.contains(&key.as_str()));
            serde_json::from_value(Value::Object(trimmed)).map_err(ParseError::Decode)
        }
    }
}

/// Strict first, lenient on failure; every failure is recorded under `label`.
///
/// Returns `None` only when the lenient pass fails too.
pub fn parse_with_fallback<T>(value: &Value, label: &str, diagnostics: &mut Vec<String>) -> Option<T>
where
    T: DeserializeOwned + KnownFields,
{
    match parse_value(value, ParseMode::Strict) {
        Ok(parsed) => Some(parsed),
        Err(strict_err) => {
            diagnostics.push(format!("{label}: {strict_err}"));
            match parse_value(value, ParseMode::Lenient) {
                Ok(parsed) => Some(parsed),
                Err(lenient_err) => {
                    diagnostics.push(format!("{label}: lenient parse failed: {lenient_err}"));
                    None
                }
            }
        }
    }
}

/// Normalizes a document-relative file path.
///
/// Separators are unified to `/`, `.` segments and leading separators are
/// dropped, and a missing extension becomes `.json`. Returns `None` for
/// empty paths and paths escaping the document directory.
pub fn normalize_relative_path(raw: &str) -> Option<String> {
    let unified = SEPARATOR_RUN.replace_all(raw.trim(), "/");
    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            other => segments.push(other),
        }
    }
    let last = segments.last()?;
    let needs_extension = !last.contains('.');
    let mut joined = segments.join("/");
    if needs_extension {
        joined.push_str(".json");
    }
    Some(joined)
}
