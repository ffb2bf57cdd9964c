//! In-memory fakes for the client traits (testing only)
//!
//! `MemorySearchClient` and `MemoryMisp` satisfy the `SearchClient` and
//! `MispApi` contracts without a network, and can be scripted to fail.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::ApiError;
use crate::mapping::{AttributeType, IndicatorAttribute};
use crate::misp::{EventRef, MispApi, NewEvent};
use crate::webamon::{ResultRecord, SearchClient};

/// Body MISP sends when an attribute is already on the event.
pub const MISP_DUPLICATE_BODY: &str = r#"{"name":"Could not add Attribute","message":"Could not add Attribute","errors":{"value":["A similar attribute already exists for this event."]}}"#;

// ---------------------------------------------------------------------------
// MemorySearchClient
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SearchState {
    results: HashMap<String, Vec<ResultRecord>>,
    scripted: HashMap<String, VecDeque<ApiError>>,
    always: HashMap<String, ApiError>,
    requests: Vec<(String, Option<Vec<String>>)>,
}

/// Search backend keyed by query string. Unknown queries match nothing.
#[derive(Debug, Default)]
pub struct MemorySearchClient {
    state: Mutex<SearchState>,
}

impl MemorySearchClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(self, query: &str, records: Vec<ResultRecord>) -> Self {
        self.state().results.insert(query.to_string(), records);
        self
    }

    /// Fail the next search for `query` once with `err`.
    pub fn fail_next(&self, query: &str, err: ApiError) {
        self.state()
            .scripted
            .entry(query.to_string())
            .or_default()
            .push_back(err);
    }

    /// Fail every search for `query` with `err`.
    pub fn fail_always(&self, query: &str, err: ApiError) {
        self.state().always.insert(query.to_string(), err);
    }

    /// Number of searches issued for `query`.
    pub fn calls(&self, query: &str) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|(q, _)| q == query)
            .count()
    }

    /// Every request as (query, fields), in order.
    pub fn requests(&self) -> Vec<(String, Option<Vec<String>>)> {
        self.state().requests.clone()
    }

    fn state(&self) -> MutexGuard<'_, SearchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SearchClient for MemorySearchClient {
    async fn search(
        &self,
        query: &str,
        fields: Option<&[String]>,
    ) -> Result<Vec<ResultRecord>, ApiError> {
        let mut state = self.state();
        state
            .requests
            .push((query.to_string(), fields.map(|f| f.to_vec())));

        if let Some(err) = state.scripted.get_mut(query).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        if let Some(err) = state.always.get(query) {
            return Err(err.clone());
        }
        Ok(state.results.get(query).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// MemoryMisp
// ---------------------------------------------------------------------------

/// MISP operations that can be counted or scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MispOperation {
    FindEvent,
    CreateEvent,
    AddAttribute,
}

#[derive(Debug)]
struct StoredEvent {
    id: String,
    info: String,
    tags: Vec<String>,
    attributes: Vec<IndicatorAttribute>,
}

#[derive(Debug, Default)]
struct MispState {
    events: Vec<StoredEvent>,
    next_id: u64,
    scripted: HashMap<MispOperation, VecDeque<ApiError>>,
    calls: HashMap<MispOperation, usize>,
}

impl MispState {
    fn begin(&mut self, op: MispOperation) -> Result<(), ApiError> {
        *self.calls.entry(op).or_default() += 1;
        match self.scripted.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// MISP instance held in memory. Rejects a repeated (type, value) on the
/// same event the way MISP does: HTTP 403 with an "already exists" body.
#[derive(Debug, Default)]
pub struct MemoryMisp {
    state: Mutex<MispState>,
}

impl MemoryMisp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next call of `op` once with `err`. Calls queue up.
    pub fn fail_next(&self, op: MispOperation, err: ApiError) {
        self.state().scripted.entry(op).or_default().push_back(err);
    }

    /// Fail the next `times` calls of `op` with `err`.
    pub fn fail_times(&self, op: MispOperation, err: ApiError, times: usize) {
        for _ in 0..times {
            self.fail_next(op, err.clone());
        }
    }

    /// Calls made to `op`, failed ones included.
    pub fn calls(&self, op: MispOperation) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn event_count(&self) -> usize {
        self.state().events.len()
    }

    pub fn events(&self) -> Vec<EventRef> {
        self.state()
            .events
            .iter()
            .map(|e| EventRef {
                id: e.id.clone(),
                info: e.info.clone(),
            })
            .collect()
    }

    pub fn event_tags(&self, event_id: &str) -> Option<Vec<String>> {
        self.state()
            .events
            .iter()
            .find(|e| e.id == event_id)
            .map(|e| e.tags.clone())
    }

    /// (type, value) pairs on the event, in insertion order.
    pub fn attributes(&self, event_id: &str) -> Vec<(AttributeType, String)> {
        self.state()
            .events
            .iter()
            .find(|e| e.id == event_id)
            .map(|e| {
                e.attributes
                    .iter()
                    .map(|a| (a.attr_type, a.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn state(&self) -> MutexGuard<'_, MispState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MispApi for MemoryMisp {
    async fn find_event(&self, info: &str) -> Result<Option<EventRef>, ApiError> {
        let mut state = self.state();
        state.begin(MispOperation::FindEvent)?;
        Ok(state.events.iter().find(|e| e.info == info).map(|e| EventRef {
            id: e.id.clone(),
            info: e.info.clone(),
        }))
    }

    async fn create_event(&self, event: &NewEvent) -> Result<EventRef, ApiError> {
        let mut state = self.state();
        state.begin(MispOperation::CreateEvent)?;
        state.next_id += 1;
        let id = state.next_id.to_string();
        state.events.push(StoredEvent {
            id: id.clone(),
            info: event.info.clone(),
            tags: event.tags.clone(),
            attributes: Vec::new(),
        });
        Ok(EventRef {
            id,
            info: event.info.clone(),
        })
    }

    async fn add_attribute(
        &self,
        event_id: &str,
        attribute: &IndicatorAttribute,
    ) -> Result<(), ApiError> {
        let mut state = self.state();
        state.begin(MispOperation::AddAttribute)?;
        let event = state
            .events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| ApiError::Status {
                status: 404,
                message: format!("Event {} not found", event_id),
            })?;

        if event.attributes.iter().any(|a| a.key() == attribute.key()) {
            return Err(ApiError::Status {
                status: 403,
                message: MISP_DUPLICATE_BODY.to_string(),
            });
        }
        event.attributes.push(attribute.clone());
        Ok(())
    }
}
