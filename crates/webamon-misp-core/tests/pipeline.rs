//! End-to-end pipeline behaviour against the in-memory fakes.

use std::time::Duration;

use chrono::NaiveDate;
use webamon_misp_core::fakes::{MemoryMisp, MemorySearchClient, MispOperation};
use webamon_misp_core::{
    ApiError, AttributeTally, AttributeType, Connector, QueryDefinition, QueryStatus,
    ResultRecord, RetryPolicy,
};

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
}

fn test_query() -> QueryDefinition {
    QueryDefinition::new("Test", "domain:example.com")
        .with_fields(["resolved_domain"])
        .with_tags(["test"])
}

fn example_search() -> MemorySearchClient {
    MemorySearchClient::new().with_results(
        "domain:example.com",
        vec![ResultRecord::new().with("resolved_domain", "example.com")],
    )
}

#[tokio::test]
async fn first_run_creates_event_and_adds_attribute() {
    let search = example_search();
    let misp = MemoryMisp::new();
    let connector = Connector::new(&search, &misp, RetryPolicy::no_retry());

    let summary = connector.run(&[test_query()], run_date()).await;

    let events = misp.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].info, "Webamon Import - Test - 2026-10-17");
    assert_eq!(misp.event_tags(&events[0].id).unwrap(), vec!["test".to_string()]);
    assert_eq!(
        misp.attributes(&events[0].id),
        vec![(AttributeType::Domain, "example.com".to_string())]
    );

    assert_eq!(
        summary.totals(),
        AttributeTally {
            added: 1,
            skipped: 0,
            failed: 0
        }
    );
    assert!(summary.queries[0].event_created);
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test]
async fn rerun_reuses_event_and_skips_duplicate() {
    let search = example_search();
    let misp = MemoryMisp::new();
    let connector = Connector::new(&search, &misp, RetryPolicy::default());

    connector.run(&[test_query()], run_date()).await;
    let adds_before = misp.calls(MispOperation::AddAttribute);
    let second = connector.run(&[test_query()], run_date()).await;

    assert_eq!(misp.event_count(), 1);
    assert!(!second.queries[0].event_created);
    assert_eq!(
        second.totals(),
        AttributeTally {
            added: 0,
            skipped: 1,
            failed: 0
        }
    );
    // duplicate is never retried
    assert_eq!(misp.calls(MispOperation::AddAttribute), adds_before + 1);
    assert_eq!(second.exit_code(), 0);
}

#[tokio::test]
async fn repeated_runs_are_idempotent() {
    let search = MemorySearchClient::new().with_results(
        "page_title:login",
        vec![
            ResultRecord::new()
                .with("resolved_domain", "login.example.com")
                .with("resolved_ip", "203.0.113.7")
                .with("report_id", "r-1"),
            ResultRecord::new()
                .with("resolved_domain", "login.example.com")
                .with("resolved_url", "https://login.example.com/")
                .with("page_title", "Sign in"),
        ],
    );
    let misp = MemoryMisp::new();
    let connector = Connector::new(&search, &misp, RetryPolicy::no_retry());
    let query = QueryDefinition::new("Phish", "page_title:login").with_tags(["phishing"]);

    let first = connector.run(&[query.clone()], run_date()).await;
    let event_id = misp.events()[0].id.clone();
    let after_first = misp.attributes(&event_id);
    let second = connector.run(&[query], run_date()).await;

    assert_eq!(misp.attributes(&event_id), after_first);
    assert_eq!(first.totals().added, 6);
    assert_eq!(second.totals().added, 0);
    assert_eq!(second.totals().skipped, first.totals().added);
}

#[tokio::test]
async fn zero_results_makes_no_attribute_calls() {
    let search = MemorySearchClient::new();
    let misp = MemoryMisp::new();
    let connector = Connector::new(&search, &misp, RetryPolicy::no_retry());

    let summary = connector
        .run(&[QueryDefinition::new("Quiet", "domain:nothing.invalid")], run_date())
        .await;

    assert_eq!(summary.queries[0].status, QueryStatus::NoResults);
    assert_eq!(summary.totals(), AttributeTally::default());
    assert_eq!(misp.calls(MispOperation::AddAttribute), 0);
    assert_eq!(misp.event_count(), 0);
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test(start_paused = true)]
async fn search_timeout_fails_query_but_run_continues() {
    let search = example_search();
    search.fail_always("domain:slow.example", ApiError::Timeout);
    let misp = MemoryMisp::new();
    let connector = Connector::new(&search, &misp, RetryPolicy::new(3, Duration::from_secs(1)));

    let queries = vec![
        QueryDefinition::new("Slow", "domain:slow.example"),
        test_query(),
    ];
    let summary = connector.run(&queries, run_date()).await;

    assert_eq!(search.calls("domain:slow.example"), 3);
    assert_eq!(summary.queries[0].status, QueryStatus::SearchFailed);
    assert_eq!(summary.queries[1].status, QueryStatus::Imported);
    assert_eq!(summary.queries[1].attributes.added, 1);
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_attribute_failure_is_retried() {
    let search = example_search();
    let misp = MemoryMisp::new();
    misp.fail_times(
        MispOperation::AddAttribute,
        ApiError::Status {
            status: 502,
            message: "Bad Gateway".into(),
        },
        2,
    );
    let connector = Connector::new(&search, &misp, RetryPolicy::new(3, Duration::from_secs(1)));

    let summary = connector.run(&[test_query()], run_date()).await;

    assert_eq!(misp.calls(MispOperation::AddAttribute), 3);
    assert_eq!(summary.totals().added, 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_attribute_retries_count_as_failed_not_query_failure() {
    let search = example_search();
    let misp = MemoryMisp::new();
    misp.fail_times(MispOperation::AddAttribute, ApiError::Timeout, 3);
    let connector = Connector::new(&search, &misp, RetryPolicy::new(3, Duration::from_millis(100)));

    let summary = connector.run(&[test_query()], run_date()).await;

    assert_eq!(
        summary.totals(),
        AttributeTally {
            added: 0,
            skipped: 0,
            failed: 1
        }
    );
    assert_eq!(summary.queries[0].status, QueryStatus::Imported);
    assert_eq!(summary.exit_code(), 0);
}

#[tokio::test]
async fn event_creation_failure_moves_to_next_query() {
    let search = example_search().with_results(
        "domain:other.example",
        vec![ResultRecord::new().with("resolved_domain", "other.example")],
    );
    let misp = MemoryMisp::new();
    misp.fail_next(
        MispOperation::CreateEvent,
        ApiError::Status {
            status: 403,
            message: "You do not have permission to use this functionality.".into(),
        },
    );
    let connector = Connector::new(&search, &misp, RetryPolicy::default());

    let queries = vec![
        test_query(),
        QueryDefinition::new("Other", "domain:other.example"),
    ];
    let summary = connector.run(&queries, run_date()).await;

    assert_eq!(summary.queries[0].status, QueryStatus::EventFailed);
    assert_eq!(summary.queries[1].status, QueryStatus::Imported);
    assert_eq!(misp.calls(MispOperation::CreateEvent), 2);
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn attributes_written_in_record_then_field_order() {
    let search = MemorySearchClient::new().with_results(
        "q",
        vec![
            ResultRecord::new()
                .with("resolved_domain", "a.example")
                .with("resolved_ip", "198.51.100.1"),
            ResultRecord::new()
                .with("resolved_domain", "b.example")
                .with("resolved_ip", "198.51.100.2"),
        ],
    );
    let misp = MemoryMisp::new();
    let connector = Connector::new(&search, &misp, RetryPolicy::no_retry());
    let query = QueryDefinition::new("Order", "q").with_fields(["resolved_ip", "resolved_domain"]);

    connector.run(&[query], run_date()).await;

    let event_id = misp.events()[0].id.clone();
    assert_eq!(
        misp.attributes(&event_id),
        vec![
            (AttributeType::IpDst, "198.51.100.1".to_string()),
            (AttributeType::Domain, "a.example".to_string()),
            (AttributeType::IpDst, "198.51.100.2".to_string()),
            (AttributeType::Domain, "b.example".to_string()),
        ]
    );
}
