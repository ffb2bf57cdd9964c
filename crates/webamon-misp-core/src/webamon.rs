//! Webamon search API client
//!
//! One GET per query: `lucene_query`, `size`, `index` and an optional
//! comma-joined `fields` parameter, authenticated with `x-api-key`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::Settings;
use crate::error::ApiError;

/// One matched item: a flat field name → value mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRecord(pub Map<String, Value>);

impl ResultRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder used mostly by tests and fakes.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Scalar value of `field` rendered as text.
    ///
    /// `None` for absent, null, empty, array and object values.
    pub fn text(&self, field: &str) -> Option<String> {
        let text = match self.0.get(field)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null | Value::Array(_) | Value::Object(_) => return None,
        };
        (!text.is_empty()).then_some(text)
    }
}

/// Read access to a threat-intelligence search backend.
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Run one search. Zero matches is `Ok(vec![])`.
    async fn search(
        &self,
        query: &str,
        fields: Option<&[String]>,
    ) -> Result<Vec<ResultRecord>, ApiError>;
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Option<Vec<Value>>,
}

/// HTTP client for the Webamon search endpoint.
pub struct WebamonClient {
    url: String,
    api_key: String,
    result_size: u32,
    index: String,
    log_requests: bool,
    http_client: reqwest::Client,
}

impl WebamonClient {
    pub fn new(settings: &Settings) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("webamon-misp/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.request_timeout)
            .build()?;

        Ok(WebamonClient {
            url: settings.webamon.url.clone(),
            api_key: settings.webamon.key.clone(),
            result_size: settings.webamon.result_size,
            index: settings.webamon.index.clone(),
            log_requests: settings.debug,
            http_client,
        })
    }

    /// Query parameters in the order they are sent.
    pub fn request_params(&self, query: &str, fields: Option<&[String]>) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("lucene_query", query.to_string()),
            ("size", self.result_size.to_string()),
            ("index", self.index.clone()),
        ];
        if let Some(fields) = fields.filter(|f| !f.is_empty()) {
            params.push(("fields", fields.join(",")));
        }
        params
    }
}

#[async_trait]
impl SearchClient for WebamonClient {
    async fn search(
        &self,
        query: &str,
        fields: Option<&[String]>,
    ) -> Result<Vec<ResultRecord>, ApiError> {
        let params = self.request_params(query, fields);
        let request = self
            .http_client
            .get(&self.url)
            .header("x-api-key", &self.api_key)
            .query(&params)
            .build()?;

        if self.log_requests {
            debug!("API request: {}", request.url());
        }

        let response = self.http_client.execute(request).await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: body,
            });
        }

        parse_search_response(&body)
    }
}

/// Extract the `results` array; a missing or null array means no matches.
pub fn parse_search_response(body: &str) -> Result<Vec<ResultRecord>, ApiError> {
    let response: SearchResponse = serde_json::from_str(body)?;
    let records = response
        .results
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(ResultRecord(map)),
            _ => None,
        })
        .collect();
    Ok(records)
}
