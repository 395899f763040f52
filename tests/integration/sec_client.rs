//! SEC client against a mock HTTP server

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::fixtures::FactsBuilder;
use stock_scorecard::api::{BackoffSchedule, FilingsProvider, ProviderError, SecClient};

const USER_AGENT: &str = "scorecard-tests admin@example.com";

fn client(server: &MockServer, backoff: BackoffSchedule) -> SecClient {
    SecClient::with_endpoints(
        USER_AGENT,
        &format!("{}/files/company_tickers.json", server.uri()),
        &format!("{}/", server.uri()),
        100,
        backoff,
    )
    .expect("Failed to build client")
}

#[tokio::test]
async fn test_ticker_map_is_uppercased_and_padded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/company_tickers.json"))
        .and(header("user-agent", USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "0": {"cik_str": 320193, "ticker": "aapl", "title": "Apple Inc."},
            "1": {"cik_str": 1067983, "ticker": "BRK-B", "title": "Berkshire Hathaway"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let map = client(&server, BackoffSchedule::none()).ticker_map().await.unwrap();
    assert_eq!(map.get("AAPL").map(String::as_str), Some("0000320193"));
    assert_eq!(map.get("BRK-B").map(String::as_str), Some("0001067983"));
}

#[tokio::test]
async fn test_company_facts_decoded() {
    let server = MockServer::start().await;
    let body = FactsBuilder::new()
        .entity("Apple Inc.")
        .annual("Assets", "2024-09-28", 364_980_000_000.0, 2024)
        .to_json();
    Mock::given(method("GET"))
        .and(path("/api/xbrl/companyfacts/CIK0000320193.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let document = client(&server, BackoffSchedule::none())
        .company_facts("320193")
        .await
        .unwrap()
        .expect("document expected");
    assert_eq!(document.entity_name.as_deref(), Some("Apple Inc."));
    assert!(document.tag("us-gaap", "Assets").is_some());
}

#[tokio::test]
async fn test_not_found_is_absent_and_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/xbrl/companyfacts/CIK0000000001.json"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let backoff = BackoffSchedule { delays: vec![Duration::from_millis(10); 3] };
    let result = client(&server, backoff).company_facts("0000000001").await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_server_errors_are_retried_then_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/xbrl/companyfacts/CIK0000320193.json"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/xbrl/companyfacts/CIK0000320193.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(FactsBuilder::new().to_json()))
        .expect(1)
        .mount(&server)
        .await;

    let backoff = BackoffSchedule { delays: vec![Duration::from_millis(10); 3] };
    let document = client(&server, backoff).company_facts("320193").await.unwrap();
    assert!(document.is_some());
}

#[tokio::test]
async fn test_retries_exhausted_surface_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let backoff = BackoffSchedule { delays: vec![Duration::from_millis(5); 2] };
    let err = client(&server, backoff).company_facts("320193").await.unwrap_err();
    assert_matches!(err, ProviderError::Status { status: 500, .. });
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>rate limited</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, BackoffSchedule::default()).company_facts("320193").await.unwrap_err();
    assert_matches!(err, ProviderError::Decode { .. });
}
