//! Webamon and MISP HTTP clients against a mock server.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::json;
use webamon_misp_core::fakes::MISP_DUPLICATE_BODY;
use webamon_misp_core::{
    classify, ApiError, AttributeType, Connector, FailureClass, IndicatorAttribute, MispApi,
    MispClient, NewEvent, QueryDefinition, QueryStatus, RetryPolicy, SearchClient, Settings,
    WebamonClient,
};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings_for(server: &MockServer) -> Settings {
    let vars: HashMap<&str, String> = HashMap::from([
        ("MISP_URL", server.uri()),
        ("MISP_KEY", "misp-key".to_string()),
        ("WEBAMON_URL", format!("{}/search", server.uri())),
        ("WEBAMON_KEY", "webamon-key".to_string()),
        ("REQUEST_TIMEOUT", "5".to_string()),
    ]);
    Settings::from_lookup(|name| vars.get(name).cloned()).unwrap()
}

#[tokio::test]
async fn webamon_search_sends_expected_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(header("x-api-key", "webamon-key"))
        .and(query_param("lucene_query", "domain:example.com"))
        .and(query_param("size", "500"))
        .and(query_param("index", "scans"))
        .and(query_param("fields", "resolved_domain,resolved_ip"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"resolved_domain": "example.com", "resolved_ip": "93.184.216.34"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = WebamonClient::new(&settings_for(&server)).unwrap();
    let fields = vec!["resolved_domain".to_string(), "resolved_ip".to_string()];
    let records = client
        .search("domain:example.com", Some(fields.as_slice()))
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text("resolved_ip").as_deref(), Some("93.184.216.34"));
}

#[tokio::test]
async fn webamon_search_without_fields_omits_parameter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&server)
        .await;

    let client = WebamonClient::new(&settings_for(&server)).unwrap();
    let records = client.search("page_title:login", None).await.unwrap();
    assert!(records.is_empty());

    let requests = server.received_requests().await.unwrap();
    assert!(!requests[0].url.query_pairs().any(|(k, _)| k == "fields"));
}

#[tokio::test]
async fn webamon_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let client = WebamonClient::new(&settings_for(&server)).unwrap();
    let err = client.search("x", None).await.unwrap_err();

    assert_eq!(
        err,
        ApiError::Status {
            status: 503,
            message: "maintenance".to_string()
        }
    );
    assert_eq!(classify(&err), FailureClass::Transient);
}

#[tokio::test]
async fn webamon_bad_key_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let client = WebamonClient::new(&settings_for(&server)).unwrap();
    let err = client.search("x", None).await.unwrap_err();
    assert_eq!(classify(&err), FailureClass::Terminal);
}

#[tokio::test]
async fn webamon_slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"results": []}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let mut settings = settings_for(&server);
    settings.request_timeout = Duration::from_millis(200);
    let client = WebamonClient::new(&settings).unwrap();

    assert_eq!(client.search("x", None).await.unwrap_err(), ApiError::Timeout);
}

#[tokio::test]
async fn retried_search_recovers_after_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let search = WebamonClient::new(&settings).unwrap();
    let misp = MispClient::new(&settings).unwrap();
    let connector = Connector::new(&search, &misp, RetryPolicy::new(3, Duration::ZERO));

    let report = connector
        .run_query(
            &QueryDefinition::new("Q", "x"),
            chrono::NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
        )
        .await;

    assert_eq!(report.status, QueryStatus::NoResults);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn misp_find_event_matches_exact_title() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events/restSearch"))
        .and(header("Authorization", "misp-key"))
        .and(body_partial_json(json!({"eventinfo": "Webamon Import - Test - 2026-10-17"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": [
                {"Event": {"id": "9", "info": "Webamon Import - Test - 2026-10-17 (old)"}},
                {"Event": {"id": "12", "info": "Webamon Import - Test - 2026-10-17"}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = MispClient::new(&settings_for(&server)).unwrap();
    let event = client
        .find_event("Webamon Import - Test - 2026-10-17")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(event.id, "12");
}

#[tokio::test]
async fn misp_create_event_sends_tags_and_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/events/add"))
        .and(body_partial_json(json!({
            "Event": {
                "info": "Webamon Import - Test - 2026-10-17",
                "distribution": 0,
                "threat_level_id": 2,
                "analysis": 0,
                "Tag": [{"name": "test"}]
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Event": {"id": "31", "info": "Webamon Import - Test - 2026-10-17"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = MispClient::new(&settings_for(&server)).unwrap();
    let event = client
        .create_event(&NewEvent::new(
            "Webamon Import - Test - 2026-10-17",
            &["test".to_string()],
        ))
        .await
        .unwrap();

    assert_eq!(event.id, "31");
}

#[tokio::test]
async fn misp_add_attribute_posts_to_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/attributes/add/31"))
        .and(body_partial_json(json!({
            "type": "domain",
            "value": "example.com",
            "category": "Network activity",
            "to_ids": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Attribute": {"id": "100", "type": "domain", "value": "example.com"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = MispClient::new(&settings_for(&server)).unwrap();
    let attr = IndicatorAttribute::new(AttributeType::Domain, "example.com", &[]);
    client.add_attribute("31", &attr).await.unwrap();
}

#[tokio::test]
async fn misp_duplicate_attribute_classified_as_duplicate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/attributes/add/31"))
        .respond_with(ResponseTemplate::new(403).set_body_string(MISP_DUPLICATE_BODY))
        .expect(1)
        .mount(&server)
        .await;

    let client = MispClient::new(&settings_for(&server)).unwrap();
    let attr = IndicatorAttribute::new(AttributeType::Domain, "example.com", &[]);
    let err = client.add_attribute("31", &attr).await.unwrap_err();

    assert_eq!(classify(&err), FailureClass::Duplicate);
}

#[tokio::test]
async fn misp_errors_in_success_body_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/attributes/add/31"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": {"value": ["A similar attribute already exists for this event."]}
        })))
        .mount(&server)
        .await;

    let client = MispClient::new(&settings_for(&server)).unwrap();
    let attr = IndicatorAttribute::new(AttributeType::Domain, "example.com", &[]);
    let err = client.add_attribute("31", &attr).await.unwrap_err();

    assert_eq!(classify(&err), FailureClass::Duplicate);
}
