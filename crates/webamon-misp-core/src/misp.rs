//! MISP REST client
//!
//! Covers the three calls the connector needs: event search by title,
//! event creation and attribute insertion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::Settings;
use crate::error::ApiError;
use crate::mapping::IndicatorAttribute;

/// Handle to an event that exists in MISP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRef {
    pub id: String,
    pub info: String,
}

/// Event to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    pub info: String,
    /// 0 = your organisation only
    pub distribution: u8,
    /// 2 = medium
    pub threat_level_id: u8,
    /// 0 = initial
    pub analysis: u8,
    pub tags: Vec<String>,
}

impl NewEvent {
    pub fn new(info: impl Into<String>, tags: &[String]) -> Self {
        Self {
            info: info.into(),
            distribution: 0,
            threat_level_id: 2,
            analysis: 0,
            tags: tags.to_vec(),
        }
    }

    fn to_payload(&self) -> Value {
        json!({
            "Event": {
                "info": self.info,
                "distribution": self.distribution,
                "threat_level_id": self.threat_level_id,
                "analysis": self.analysis,
                "Tag": tag_list(&self.tags),
            }
        })
    }
}

/// Write access to a threat-sharing platform.
#[async_trait]
pub trait MispApi: Send + Sync {
    /// Event whose title equals `info` exactly, if any.
    async fn find_event(&self, info: &str) -> Result<Option<EventRef>, ApiError>;

    async fn create_event(&self, event: &NewEvent) -> Result<EventRef, ApiError>;

    /// Add one attribute. An existing (type, value) pair on the event is
    /// reported as an error whose message contains "already exists".
    async fn add_attribute(
        &self,
        event_id: &str,
        attribute: &IndicatorAttribute,
    ) -> Result<(), ApiError>;
}

/// HTTP client for a MISP instance.
pub struct MispClient {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl MispClient {
    pub fn new(settings: &Settings) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("webamon-misp/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.request_timeout)
            .danger_accept_invalid_certs(!settings.misp.verify_cert)
            .build()?;

        Ok(MispClient {
            base_url: settings.misp.url.trim_end_matches('/').to_string(),
            api_key: settings.misp.key.clone(),
            http_client,
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .post(&url)
            .header("Authorization", &self.api_key)
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: text,
            });
        }

        let value: Value = serde_json::from_str(&text)?;
        // Some MISP versions answer 200 with an `errors` object.
        if value.get("errors").is_some() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: text,
            });
        }
        Ok(value)
    }
}

#[async_trait]
impl MispApi for MispClient {
    async fn find_event(&self, info: &str) -> Result<Option<EventRef>, ApiError> {
        let body = json!({ "returnFormat": "json", "eventinfo": info });
        let response = self.post_json("/events/restSearch", &body).await?;
        Ok(parse_event_search(&response)?
            .into_iter()
            .find(|event| event.info == info))
    }

    async fn create_event(&self, event: &NewEvent) -> Result<EventRef, ApiError> {
        let response = self.post_json("/events/add", &event.to_payload()).await?;
        let created = response
            .get("Event")
            .ok_or_else(|| ApiError::Decode("event creation response has no Event".to_string()))?;
        event_ref(created)
    }

    async fn add_attribute(
        &self,
        event_id: &str,
        attribute: &IndicatorAttribute,
    ) -> Result<(), ApiError> {
        let body = json!({
            "type": attribute.attr_type.as_str(),
            "value": attribute.value,
            "category": attribute.category,
            "to_ids": attribute.to_ids,
            "Tag": tag_list(&attribute.tags),
        });
        let path = format!("/attributes/add/{}", event_id);
        self.post_json(&path, &body).await?;
        Ok(())
    }
}

fn tag_list(tags: &[String]) -> Vec<Value> {
    tags.iter().map(|name| json!({ "name": name })).collect()
}

/// Events from a `restSearch` answer, either `{"response": [...]}` or a
/// bare array of `{"Event": {...}}` wrappers.
pub fn parse_event_search(response: &Value) -> Result<Vec<EventRef>, ApiError> {
    let items = match response {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("response") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => return Ok(Vec::new()),
            Some(_) => {
                return Err(ApiError::Decode(
                    "event search response is not a list".to_string(),
                ))
            }
        },
        _ => {
            return Err(ApiError::Decode(
                "unexpected event search response".to_string(),
            ))
        }
    };

    items
        .iter()
        .map(|item| event_ref(item.get("Event").unwrap_or(item)))
        .collect()
}

fn event_ref(event: &Value) -> Result<EventRef, ApiError> {
    let id = match event.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(ApiError::Decode("event has no id".to_string())),
    };
    let info = event
        .get("info")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(EventRef { id, info })
}
