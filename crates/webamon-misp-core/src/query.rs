//! Query definitions loaded from the queries file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::QueryFileError;

/// One configured Webamon search and the metadata for its MISP event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Lucene search string sent to Webamon
    pub query: String,
    /// Fields to request, in mapping order; `None` requests everything
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl QueryDefinition {
    pub fn new(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            query: query.into(),
            fields: None,
            tags: Vec::new(),
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Entry as written in the file; `fields` is checked by hand so a bad value
/// downgrades to "all fields" instead of rejecting the whole file.
#[derive(Deserialize)]
struct RawQuery {
    name: String,
    #[serde(default)]
    description: Option<String>,
    query: String,
    #[serde(default)]
    fields: Value,
    #[serde(default)]
    tags: Vec<String>,
}

/// Load the ordered query list from a JSON file.
pub fn load_queries(path: &Path) -> Result<Vec<QueryDefinition>, QueryFileError> {
    if !path.exists() {
        return Err(QueryFileError::NotFound(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    parse_queries(&content)
}

/// Parse a JSON array of query definitions.
pub fn parse_queries(json: &str) -> Result<Vec<QueryDefinition>, QueryFileError> {
    let raw: Vec<RawQuery> = serde_json::from_str(json)?;

    raw.into_iter()
        .enumerate()
        .map(|(index, entry)| {
            if entry.name.trim().is_empty() {
                return Err(QueryFileError::Invalid {
                    index,
                    reason: "name must not be empty".to_string(),
                });
            }
            if entry.query.trim().is_empty() {
                return Err(QueryFileError::Invalid {
                    index,
                    reason: format!("query string for '{}' must not be empty", entry.name),
                });
            }
            let fields = normalize_fields(&entry.name, entry.fields);
            Ok(QueryDefinition {
                name: entry.name,
                description: entry.description.unwrap_or_default(),
                query: entry.query,
                fields,
                tags: entry.tags,
            })
        })
        .collect()
}

fn normalize_fields(name: &str, value: Value) -> Option<Vec<String>> {
    match value {
        Value::Null => None,
        Value::Array(items) => {
            let fields: Option<Vec<String>> = items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect();
            match fields {
                Some(fields) if !fields.is_empty() => Some(fields),
                Some(_) => None,
                None => {
                    warn!(query = %name, "'fields' must contain only strings, requesting all fields");
                    None
                }
            }
        }
        other => {
            warn!(
                query = %name,
                "'fields' should be a list, got {}, requesting all fields",
                json_type_name(&other)
            );
            None
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
