//! Per-query reports and run totals.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Attribute counts for one event write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeTally {
    pub added: u64,
    /// Rejected by MISP as already present
    pub skipped: u64,
    pub failed: u64,
}

impl AttributeTally {
    pub fn attempted(&self) -> u64 {
        self.added + self.skipped + self.failed
    }
}

impl AddAssign for AttributeTally {
    fn add_assign(&mut self, other: Self) {
        self.added += other.added;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// How a query ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    /// Records were written to an event
    Imported,
    /// The search matched nothing; no event was touched
    NoResults,
    SearchFailed,
    /// Event lookup or creation failed
    EventFailed,
}

impl QueryStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, QueryStatus::SearchFailed | QueryStatus::EventFailed)
    }
}

/// Outcome of one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryReport {
    pub name: String,
    pub status: QueryStatus,
    pub records: usize,
    pub event_id: Option<String>,
    /// True when the event was created by this run rather than reused
    pub event_created: bool,
    pub attributes: AttributeTally,
    pub error: Option<String>,
}

impl QueryReport {
    pub fn new(name: impl Into<String>, status: QueryStatus) -> Self {
        Self {
            name: name.into(),
            status,
            records: 0,
            event_id: None,
            event_created: false,
            attributes: AttributeTally::default(),
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, status: QueryStatus, error: impl Into<String>) -> Self {
        let mut report = Self::new(name, status);
        report.error = Some(error.into());
        report
    }
}

/// Everything a run did, in query order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub queries: Vec<QueryReport>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, report: QueryReport) {
        self.queries.push(report);
    }

    pub fn totals(&self) -> AttributeTally {
        let mut totals = AttributeTally::default();
        for report in &self.queries {
            totals += report.attributes;
        }
        totals
    }

    pub fn failed_queries(&self) -> usize {
        self.queries.iter().filter(|q| q.status.is_failure()).count()
    }

    pub fn succeeded_queries(&self) -> usize {
        self.queries.len() - self.failed_queries()
    }

    /// True when any query failed at search or event level.
    ///
    /// Attribute-level failures and duplicate skips do not count.
    pub fn has_failures(&self) -> bool {
        self.failed_queries() > 0
    }

    /// Process exit code for this run.
    pub fn exit_code(&self) -> u8 {
        if self.has_failures() {
            1
        } else {
            0
        }
    }

    /// Log the final summary.
    pub fn log(&self) {
        for report in &self.queries {
            match report.status {
                QueryStatus::Imported => info!(
                    "  {}: event {} ({}), added={} skipped={} failed={}",
                    report.name,
                    report.event_id.as_deref().unwrap_or("?"),
                    if report.event_created { "created" } else { "reused" },
                    report.attributes.added,
                    report.attributes.skipped,
                    report.attributes.failed
                ),
                QueryStatus::NoResults => info!("  {}: no results", report.name),
                QueryStatus::SearchFailed | QueryStatus::EventFailed => warn!(
                    "  {}: {:?}: {}",
                    report.name,
                    report.status,
                    report.error.as_deref().unwrap_or("unknown error")
                ),
            }
        }

        let totals = self.totals();
        info!(
            "Run complete: {} queries ({} succeeded, {} failed); attributes added={} skipped={} failed={}",
            self.queries.len(),
            self.succeeded_queries(),
            self.failed_queries(),
            totals.added,
            totals.skipped,
            totals.failed
        );
    }
}
