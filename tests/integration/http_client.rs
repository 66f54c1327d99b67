//! HTTP client behavior against a live mock server.

use crate::common::plain_http;
use sample_verifier::HttpClient;
use sample_verifier::http::{NO_RESPONSE_STATUS, basic_auth_value};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_get_returns_body_and_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hello"))
        .and(header("Authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Hello jane"))
        .mount(&server)
        .await;

    let result = plain_http()
        .get(&format!("{}/hello", server.uri()), Some("abc"), &[])
        .await;
    assert!(result.ok);
    assert_eq!(result.status, 200);
    assert_eq!(result.body, "Hello jane");
}

#[tokio::test]
async fn test_error_statuses_carry_reason() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/unauthenticated"))
        .respond_with(ResponseTemplate::new(401).set_body_string("ignored body"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/forbidden"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let http = plain_http();
    let result = http
        .get(&format!("{}/unauthenticated", server.uri()), None, &[])
        .await;
    assert!(!result.ok);
    assert_eq!(result.status, 401);
    assert_eq!(result.body, "Unauthorized");

    let result = http.get(&format!("{}/forbidden", server.uri()), None, &[]).await;
    assert!(!result.ok);
    assert_eq!(result.status, 403);
    assert_eq!(result.body, "Forbidden");
}

#[tokio::test]
async fn test_extra_headers_are_sent() {
    let server = MockServer::start().await;
    let authorization = basic_auth_value("jane", "pw");
    Mock::given(method("GET"))
        .and(path("/basic"))
        .and(header("Authorization", authorization.as_str()))
        .and(header("X-Correlation-Id", "42"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let result = plain_http()
        .get(
            &format!("{}/basic", server.uri()),
            None,
            &[
                ("Authorization", authorization.as_str()),
                ("X-Correlation-Id", "42"),
            ],
        )
        .await;
    assert!(result.ok);
}

#[tokio::test]
async fn test_post_sends_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/members"))
        .and(header("Content-Type", "application/json"))
        .and(body_string(r#"{"value":"u-1"}"#))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .mount(&server)
        .await;

    let result = plain_http()
        .post(
            &format!("{}/members", server.uri()),
            Some(br#"{"value":"u-1"}"#.to_vec()),
            None,
            &[("Content-Type", "application/json")],
        )
        .await;
    assert!(result.ok);
    assert_eq!(result.status, 201);
    assert_eq!(result.body, "created");
}

#[tokio::test]
async fn test_plain_http_refused_by_default() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let result = HttpClient::new()
        .get(&format!("{}/hello", server.uri()), None, &[])
        .await;
    assert!(!result.ok);
    assert_eq!(result.status, NO_RESPONSE_STATUS);
    assert!(result.body.contains("HTTPS required"));
}

#[tokio::test]
async fn test_connection_failure_has_no_status() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let result = plain_http().get(&format!("http://{address}/gone"), None, &[]).await;
    assert!(!result.ok);
    assert_eq!(result.status, NO_RESPONSE_STATUS);
}

#[tokio::test]
async fn test_malformed_url() {
    let result = plain_http().get("not a url", None, &[]).await;
    assert!(!result.ok);
    assert_eq!(result.status, NO_RESPONSE_STATUS);
}
