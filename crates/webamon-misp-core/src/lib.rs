//! webamon-misp-core: Webamon search results into MISP events
//!
//! Each configured query is searched on Webamon, the matching records are
//! mapped to MISP attributes, and the attributes are written to a dated
//! event per query, created on first use and reused afterwards.
//!
//! ## Failure handling
//!
//! Every external call goes through [`retry_call`], which asks
//! [`classify::classify`] whether a failure is transient (retry), a duplicate
//! attribute (skip) or terminal (give up). Failures are reported as values;
//! the [`Connector`] records them in the [`RunSummary`] and carries on with
//! the next query.

pub mod classify;
pub mod config;
pub mod error;
pub mod fakes;
pub mod mapping;
pub mod misp;
pub mod orchestrator;
pub mod query;
pub mod retry;
pub mod summary;
pub mod telemetry;
pub mod webamon;
pub mod writer;

pub use classify::{classify, classify_status, FailureClass};
pub use config::{MispSettings, Settings, WebamonSettings};
pub use error::{ApiError, ConfigError, QueryFileError};
pub use mapping::{map_record, AttributeType, IndicatorAttribute, FIELD_MAPPINGS};
pub use misp::{EventRef, MispApi, MispClient, NewEvent};
pub use orchestrator::Connector;
pub use query::{load_queries, parse_queries, QueryDefinition};
pub use retry::{retry_call, CallOutcome, RetryPolicy};
pub use summary::{AttributeTally, QueryReport, QueryStatus, RunSummary};
pub use telemetry::{create_log_file, init_tracing, log_file_name};
pub use webamon::{ResultRecord, SearchClient, WebamonClient};
pub use writer::{event_title, AttributeOutcome, EventWriter};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
