//! Deployed application resolution through the mock Cloud Controller.

use crate::common::{CF_TOKEN, CLIENT_ID, FakeCf, MockLandscape, SPACE_GUID, USERNAME, plain_http};
use sample_verifier::{
    CfCli, DeploymentRegistry, HarnessError, PlatformSession, Prerequisite,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

fn registry(landscape: &MockLandscape) -> DeploymentRegistry {
    DeploymentRegistry::new(
        plain_http(),
        PlatformSession {
            api_endpoint: landscape.uri(),
            bearer_token: CF_TOKEN.to_string(),
            space_guid: SPACE_GUID.to_string(),
            user: USERNAME.to_string(),
        },
    )
}

#[tokio::test]
async fn test_session_from_cli() {
    let cf = FakeCf::logged_in("https://api.cf.example.com/");
    let session = CfCli::new(cf.clone()).session().await.unwrap();

    assert_eq!(session.api_endpoint, "https://api.cf.example.com");
    assert_eq!(session.bearer_token, CF_TOKEN);
    assert_eq!(session.space_guid, SPACE_GUID);
    assert_eq!(session.user, USERNAME);
    assert_eq!(
        cf.calls(),
        vec!["cf oauth-token", "cf target", "cf space dev --guid"]
    );
}

#[tokio::test]
async fn test_resolve_app_and_binding() {
    let landscape = MockLandscape::start().await;
    landscape.mount_app("java-security-usage", "guid-1").await;

    let app = registry(&landscape)
        .resolve("java-security-usage")
        .await
        .unwrap();
    assert_eq!(app.guid, "guid-1");
    assert_eq!(app.name, "java-security-usage");
    assert_eq!(app.binding.client_id(), Some(CLIENT_ID));
    assert_eq!(app.binding.issuer_url(), Some(landscape.uri().as_str()));
    assert_eq!(app.binding.instance_name(), Some("xsuaa-sample"));
}

#[tokio::test]
async fn test_unknown_app_is_missing_prerequisite() {
    let landscape = MockLandscape::start().await;
    landscape
        .mount_app_listing(
            "nope",
            json!({"pagination": {"total_results": 0}, "resources": []}),
        )
        .await;

    let err = registry(&landscape).resolve("nope").await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::PrerequisiteNotFound {
            kind: Prerequisite::Application,
            ..
        }
    ));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_multiple_matches_take_first() {
    let landscape = MockLandscape::start().await;
    landscape
        .mount_app_listing(
            "dup",
            json!({
                "pagination": {"total_results": 2},
                "resources": [{"guid": "first", "name": "dup"}, {"guid": "second", "name": "dup"}]
            }),
        )
        .await;
    Mock::given(method("GET"))
        .and(path("/v3/apps/first/env"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "system_env_json": {"VCAP_SERVICES": landscape.vcap_services()}
        })))
        .mount(landscape.server())
        .await;

    let app = registry(&landscape).resolve("dup").await.unwrap();
    assert_eq!(app.guid, "first");
}

#[tokio::test]
async fn test_app_without_identity_binding() {
    let landscape = MockLandscape::start().await;
    landscape
        .mount_app_with_env(
            "unbound",
            "guid-2",
            json!({"destination": [{"name": "dest", "credentials": {}}]}),
        )
        .await;

    let err = registry(&landscape).resolve("unbound").await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::PrerequisiteNotFound {
            kind: Prerequisite::ServiceBinding,
            ..
        }
    ));
}

#[tokio::test]
async fn test_api_error_is_unexpected_response() {
    let landscape = MockLandscape::start().await;
    Mock::given(method("GET"))
        .and(path("/v3/apps"))
        .respond_with(ResponseTemplate::new(500))
        .mount(landscape.server())
        .await;

    let err = registry(&landscape).resolve("any").await.unwrap_err();
    assert!(matches!(err, HarnessError::UnexpectedResponse { .. }));
}
