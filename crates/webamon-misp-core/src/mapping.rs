//! Webamon field → MISP attribute mapping.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::webamon::ResultRecord;

pub const REPORT_LINK_BASE: &str = "http://search.webamon.com/search/report_id=";

/// MISP attribute types the connector emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttributeType {
    #[serde(rename = "domain")]
    Domain,
    #[serde(rename = "ip-dst")]
    IpDst,
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "link")]
    Link,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::Domain => "domain",
            AttributeType::IpDst => "ip-dst",
            AttributeType::Url => "url",
            AttributeType::Text => "text",
            AttributeType::Link => "link",
        }
    }

    /// MISP category for the type.
    pub fn category(&self) -> &'static str {
        match self {
            AttributeType::Domain | AttributeType::IpDst | AttributeType::Url => "Network activity",
            AttributeType::Text | AttributeType::Link => "External analysis",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one Webamon field turns into attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// The value itself, as the given type
    Direct(AttributeType),
    /// A report id: a text note plus a link to the report
    ReportId,
    /// A page title, as a text note
    PageTitle,
}

/// Known fields, in the order used when a query requests no explicit fields.
pub const FIELD_MAPPINGS: &[(&str, FieldRule)] = &[
    ("resolved_domain", FieldRule::Direct(AttributeType::Domain)),
    ("resolved_ip", FieldRule::Direct(AttributeType::IpDst)),
    ("resolved_url", FieldRule::Direct(AttributeType::Url)),
    ("report_id", FieldRule::ReportId),
    ("page_title", FieldRule::PageTitle),
];

pub fn rule_for(field: &str) -> Option<FieldRule> {
    FIELD_MAPPINGS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, rule)| *rule)
}

/// A typed observable ready to be written to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorAttribute {
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    pub value: String,
    pub category: String,
    pub to_ids: bool,
    pub tags: Vec<String>,
}

impl IndicatorAttribute {
    pub fn new(attr_type: AttributeType, value: impl Into<String>, tags: &[String]) -> Self {
        Self {
            attr_type,
            value: value.into(),
            category: attr_type.category().to_string(),
            to_ids: true,
            tags: tags.to_vec(),
        }
    }

    /// Identity used for duplicate detection within an event.
    pub fn key(&self) -> (AttributeType, &str) {
        (self.attr_type, self.value.as_str())
    }
}

impl fmt::Display for IndicatorAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.attr_type, self.value)
    }
}

/// Map one record to attributes.
///
/// With `requested` set, only those fields are considered, in that order;
/// otherwise every known field in table order. Unknown fields are skipped.
pub fn map_record(
    record: &ResultRecord,
    requested: Option<&[String]>,
    tags: &[String],
) -> Vec<IndicatorAttribute> {
    let fields: Vec<&str> = match requested {
        Some(requested) if !requested.is_empty() => requested.iter().map(String::as_str).collect(),
        _ => FIELD_MAPPINGS.iter().map(|(name, _)| *name).collect(),
    };

    let mut attributes = Vec::new();
    for field in fields {
        let Some(rule) = rule_for(field) else {
            if record.contains(field) {
                debug!("no attribute mapping for field '{}', skipping", field);
            }
            continue;
        };
        let Some(value) = record.text(field) else {
            continue;
        };
        match rule {
            FieldRule::Direct(attr_type) => {
                attributes.push(IndicatorAttribute::new(attr_type, value, tags));
            }
            FieldRule::ReportId => {
                attributes.push(IndicatorAttribute::new(
                    AttributeType::Text,
                    format!("Webamon Report ID: {}", value),
                    tags,
                ));
                attributes.push(IndicatorAttribute::new(
                    AttributeType::Link,
                    format!("{}{}", REPORT_LINK_BASE, value),
                    tags,
                ));
            }
            FieldRule::PageTitle => {
                attributes.push(IndicatorAttribute::new(
                    AttributeType::Text,
                    format!("Page Title: {}", value),
                    tags,
                ));
            }
        }
    }
    attributes
}
