//! Run orchestration: every query, in order, search then write.
//!
//! A failing query is recorded and the run moves on; nothing here aborts
//! the whole run.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::misp::MispApi;
use crate::query::QueryDefinition;
use crate::retry::{retry_call, RetryPolicy};
use crate::summary::{QueryReport, QueryStatus, RunSummary};
use crate::webamon::{ResultRecord, SearchClient};
use crate::writer::EventWriter;

/// Drives a run against a search backend and a MISP instance.
pub struct Connector<'a, S: SearchClient + ?Sized, M: MispApi + ?Sized> {
    search: &'a S,
    misp: &'a M,
    policy: RetryPolicy,
    verbose: bool,
}

impl<'a, S: SearchClient + ?Sized, M: MispApi + ?Sized> Connector<'a, S, M> {
    pub fn new(search: &'a S, misp: &'a M, policy: RetryPolicy) -> Self {
        Self {
            search,
            misp,
            policy,
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Run one search through the retry wrapper.
    pub async fn fetch(&self, query: &QueryDefinition) -> Result<Vec<ResultRecord>, ApiError> {
        let search = self.search;
        let text = query.query.as_str();
        let fields = query.fields.as_deref();
        retry_call(&self.policy, "Webamon search", move || search.search(text, fields))
            .await
            .into_result()
    }

    /// Search, then create-or-reuse the event and write the records.
    pub async fn run_query(&self, query: &QueryDefinition, date: NaiveDate) -> QueryReport {
        info!("Running query for: {}", query.name);
        if !query.description.is_empty() {
            info!("{}", query.description);
        }
        if let Some(fields) = &query.fields {
            info!("Requesting fields: {}", fields.join(", "));
        }

        let records = match self.fetch(query).await {
            Ok(records) => records,
            Err(err) => {
                warn!("Search failed for {}: {}", query.name, err);
                return QueryReport::failed(&query.name, QueryStatus::SearchFailed, err.to_string());
            }
        };
        if records.is_empty() {
            info!("No results for {}", query.name);
            return QueryReport::new(&query.name, QueryStatus::NoResults);
        }
        info!("{} results for {}", records.len(), query.name);

        let writer = EventWriter::new(self.misp, self.policy).verbose(self.verbose);
        let (event, created) = match writer.ensure_event(query, date).await {
            Ok(found) => found,
            Err(err) => {
                warn!("Event unavailable for {}: {}", query.name, err);
                let mut report =
                    QueryReport::failed(&query.name, QueryStatus::EventFailed, err.to_string());
                report.records = records.len();
                return report;
            }
        };

        let mut report = QueryReport::new(&query.name, QueryStatus::Imported);
        report.records = records.len();
        report.attributes = writer.write_records(&event, query, &records).await;
        report.event_id = Some(event.id);
        report.event_created = created;
        report
    }

    /// Run every query in order and collect the summary.
    pub async fn run(&self, queries: &[QueryDefinition], date: NaiveDate) -> RunSummary {
        let mut summary = RunSummary::new();
        for query in queries {
            let report = self.run_query(query, date).await;
            summary.record(report);
        }
        summary.log();
        summary
    }
}
