//! Event writer: create-or-reuse the query's event and add its attributes.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::mapping::{map_record, AttributeType, IndicatorAttribute};
use crate::misp::{EventRef, MispApi, NewEvent};
use crate::query::QueryDefinition;
use crate::retry::{retry_call, CallOutcome, RetryPolicy};
use crate::summary::AttributeTally;
use crate::webamon::ResultRecord;

/// Title of the event a query writes to on `date`.
pub fn event_title(query_name: &str, date: NaiveDate) -> String {
    format!("Webamon Import - {} - {}", query_name, date.format("%Y-%m-%d"))
}

/// Result of adding one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeOutcome {
    Added,
    Duplicate,
    Failed(ApiError),
}

pub struct EventWriter<'a, M: MispApi + ?Sized> {
    misp: &'a M,
    policy: RetryPolicy,
    verbose: bool,
}

impl<'a, M: MispApi + ?Sized> EventWriter<'a, M> {
    pub fn new(misp: &'a M, policy: RetryPolicy) -> Self {
        Self {
            misp,
            policy,
            verbose: false,
        }
    }

    /// Log every duplicate skip at info level instead of debug.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Find the query's event for `date`, creating it with the query's tags
    /// when absent. Returns the event and whether it was created.
    ///
    /// Either step failing is terminal for the query.
    pub async fn ensure_event(
        &self,
        query: &QueryDefinition,
        date: NaiveDate,
    ) -> Result<(EventRef, bool), ApiError> {
        let title = event_title(&query.name, date);
        let misp = self.misp;

        let existing = {
            let title = title.as_str();
            retry_call(&self.policy, "MISP event search", move || misp.find_event(title))
                .await
                .into_result()?
        };
        if let Some(event) = existing {
            info!("Updating existing event: {} (id {})", title, event.id);
            return Ok((event, false));
        }

        info!("Creating new event: {}", title);
        let new_event = NewEvent::new(title, &query.tags);
        let created = {
            let new_event = &new_event;
            retry_call(&self.policy, "MISP add_event", move || misp.create_event(new_event))
                .await
                .into_result()?
        };
        debug!("Created event {}", created.id);
        Ok((created, true))
    }

    /// Add one attribute through the retry wrapper.
    pub async fn add_attribute(
        &self,
        event_id: &str,
        attribute: &IndicatorAttribute,
    ) -> AttributeOutcome {
        let misp = self.misp;
        let outcome = retry_call(&self.policy, "MISP add_attribute", move || {
            misp.add_attribute(event_id, attribute)
        })
        .await;

        match outcome {
            CallOutcome::Success { .. } => AttributeOutcome::Added,
            CallOutcome::Duplicate { .. } => {
                if self.verbose {
                    info!("Attribute already exists: {}", attribute);
                } else {
                    debug!("Attribute already exists: {}", attribute);
                }
                AttributeOutcome::Duplicate
            }
            CallOutcome::Failed { error, .. } => {
                warn!("Could not add {}: {}", attribute, error);
                AttributeOutcome::Failed(error)
            }
        }
    }

    /// Map every record and add the attributes to `event`, in record order
    /// then field order.
    ///
    /// A (type, value) pair seen earlier in the same batch is not sent again
    /// and not counted. Individual failures never stop the batch.
    pub async fn write_records(
        &self,
        event: &EventRef,
        query: &QueryDefinition,
        records: &[ResultRecord],
    ) -> AttributeTally {
        let mut tally = AttributeTally::default();
        let mut seen: HashSet<(AttributeType, String)> = HashSet::new();

        for record in records {
            for attribute in map_record(record, query.fields.as_deref(), &query.tags) {
                if !seen.insert((attribute.attr_type, attribute.value.clone())) {
                    debug!("Repeated {} in results, already handled", attribute);
                    continue;
                }
                match self.add_attribute(&event.id, &attribute).await {
                    AttributeOutcome::Added => tally.added += 1,
                    AttributeOutcome::Duplicate => tally.skipped += 1,
                    AttributeOutcome::Failed(_) => tally.failed += 1,
                }
            }
        }

        if tally.skipped > 0 {
            info!("Added {} new attributes to event {}", tally.added, event.id);
            info!("Skipped {} duplicate attributes", tally.skipped);
        } else {
            info!("Added {} attributes to event {}", tally.added, event.id);
        }
        if tally.failed > 0 {
            warn!("{} attributes could not be added to event {}", tally.failed, event.id);
        }

        tally
    }
}
