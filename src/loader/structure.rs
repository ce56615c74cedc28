//! Intermediate row representation used while loading exports.

use crate::loader::LoaderConfig;
use crate::normalize::strip_parenthesised;
use crate::regex::Regex;
use crate::{ReconcileError, Record, Result, Source};
use csv::StringRecord;
use nanoid::nanoid;
use std::collections::HashMap;
use std::sync::LazyLock;

static YEAR_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}").unwrap());

/// One export row with its columns resolved to field names.
#[derive(Debug, Clone)]
pub(crate) struct RawExportRow {
    /// Field name to (alias rank, value); the lowest rank seen wins
    fields: HashMap<String, (usize, String)>,
}

impl RawExportRow {
    pub(crate) fn from_record(
        headers: &[String],
        record: &StringRecord,
        config: &LoaderConfig,
        line_number: usize,
    ) -> Result<Self> {
        if record.len() > headers.len() && !config.is_flexible() {
            return Err(ReconcileError::MalformedInput {
                message: format!(
                    "Record has more fields ({}) than headers ({})",
                    record.len(),
                    headers.len()
                ),
                line: line_number,
            });
        }

        let mut fields: HashMap<String, (usize, String)> = HashMap::new();
        for (header, value) in headers.iter().zip(record.iter()) {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let Some((field, rank)) = config.field_for_header(header) else {
                continue;
            };
            match fields.get(field) {
                Some((existing, _)) if *existing <= rank => {}
                _ => {
                    fields.insert(field.to_string(), (rank, value.to_string()));
                }
            }
        }

        Ok(Self { fields })
    }

    pub(crate) fn get_field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(|(_, value)| value.as_str())
    }

    pub(crate) fn has_content(&self) -> bool {
        !self.fields.is_empty()
    }

    pub(crate) fn into_record(self, source: Source) -> Record {
        let journal = self.get_field("journal").map(|journal| match source {
            Source::Wos => journal.replace('&', "and"),
            Source::Scopus => journal.to_string(),
        });

        Record {
            source,
            origin_id: self
                .get_field("id")
                .map(String::from)
                .unwrap_or_else(|| nanoid!()),
            doi: self.get_field("doi").map(String::from),
            title: self.get_field("title").unwrap_or_default().to_string(),
            year: self.get_field("year").and_then(parse_year),
            journal,
            issn: self.get_field("issn").map(String::from),
            authors: self.get_field("authors").map(split_authors).unwrap_or_default(),
            document_type: self.get_field("type").map(normalize_document_type),
            open_access: self.get_field("open_access").map(String::from),
            affiliations: self.get_field("affiliations").map(String::from),
            cited_by: self.get_field("cited_by").and_then(parse_count),
        }
    }
}

/// First four-digit number in the value, if any.
pub(crate) fn parse_year(value: &str) -> Option<i32> {
    YEAR_REGEX
        .find(value)
        .and_then(|m| m.as_str().parse().ok())
}

/// A non-negative citation count; anything else is treated as unknown.
pub(crate) fn parse_count(value: &str) -> Option<u32> {
    value.trim().parse().ok()
}

/// Split a `;`-separated author list, dropping parenthesised author ids.
pub(crate) fn split_authors(value: &str) -> Vec<String> {
    strip_parenthesised(value)
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Harmonise document types across databases.
///
/// Proceedings papers are conference papers; any type mentioning a conference paper
/// collapses to `Conference Paper`. Separators become `"; "`.
pub(crate) fn normalize_document_type(value: &str) -> String {
    let value = value.replace("Proceedings Paper", "Conference paper");
    if value.to_lowercase().contains("conference paper") {
        return "Conference Paper".to_string();
    }
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}
