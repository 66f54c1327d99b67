//! Shared test utilities: a scripted `cf` runner and a mock landscape.
//!
//! The mock landscape is a single wiremock server playing every remote party
//! at once: the Cloud Controller (`/v3/...`), the identity service token
//! endpoint (`/oauth/token`), its admin API (`/Users`, `/Groups/...`) and the
//! sample application itself (`/app/...`).

#![allow(dead_code)]

use sample_verifier::admin::{GroupMember, user_name_filter};
use sample_verifier::{
    CfCli, CommandOutput, CommandRunner, Credentials, Harness, HarnessConfig, HarnessError,
    HarnessResult, HttpClient, Settings,
};
use serde_json::{Value, json};
use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const USERNAME: &str = "jane.doe";
pub const PASSWORD: &str = "s3cret";
pub const CF_TOKEN: &str = "bearer cf-token";
pub const SPACE_GUID: &str = "space-guid-1";
pub const CLIENT_ID: &str = "sb-sample!t1";
pub const CLIENT_SECRET: &str = "sample-secret";
pub const XSAPPNAME: &str = "sample!t1";
pub const ADMIN_CLIENT_ID: &str = "sb-api-access!b1";
pub const ADMIN_CLIENT_SECRET: &str = "api-secret";
pub const USER_TOKEN: &str = "user-token";
pub const ADMIN_TOKEN: &str = "admin-token";
pub const USER_ID: &str = "user-id-1";

#[derive(Debug, Clone)]
enum Scripted {
    Output(CommandOutput),
    StartFailure,
}

/// Records every command and answers from a script.
///
/// Scripts match by command prefix; the latest matching script wins and
/// unscripted commands succeed with empty output.
#[derive(Debug, Clone, Default)]
pub struct FakeCf {
    calls: Arc<Mutex<Vec<String>>>,
    scripts: Arc<Mutex<Vec<(String, Scripted)>>>,
}

impl FakeCf {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runner logged into `api_endpoint` with an `apiaccess` service key.
    pub fn logged_in(api_endpoint: &str) -> Self {
        let cf = Self::new();
        cf.on("cf oauth-token", CommandOutput::ok(format!("{CF_TOKEN}\n")));
        cf.on(
            "cf target",
            CommandOutput::ok(format!(
                "api endpoint:   {api_endpoint}\n\
                 api version:    3.150.0\n\
                 user:           {USERNAME}\n\
                 org:            sample-org\n\
                 space:          dev\n"
            )),
        );
        cf.on("cf space dev --guid", CommandOutput::ok(format!("{SPACE_GUID}\n")));
        cf.on(
            "cf service-key api-access-service",
            CommandOutput::ok(format!(
                "Getting key api-access-service-sk for service instance api-access-service as {USERNAME}...\n\n\
                 {{\"clientid\": \"{ADMIN_CLIENT_ID}\", \"clientsecret\": \"{ADMIN_CLIENT_SECRET}\"}}\n"
            )),
        );
        cf
    }

    /// Answer commands starting with `prefix` with `output`.
    pub fn on(&self, prefix: &str, output: CommandOutput) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .push((prefix.to_string(), Scripted::Output(output)));
        self
    }

    /// Commands starting with `prefix` cannot be started at all.
    pub fn fail_to_start(&self, prefix: &str) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .push((prefix.to_string(), Scripted::StartFailure));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Index of the first call equal to `command`.
    pub fn position(&self, command: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == command)
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn answer(&self, command: &str) -> HarnessResult<CommandOutput> {
        let scripts = self.scripts.lock().unwrap();
        let scripted = scripts
            .iter()
            .rev()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, scripted)| scripted.clone());
        match scripted {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::StartFailure) => Err(HarnessError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("cannot start '{command}'"),
            ))),
            None => Ok(CommandOutput::ok("")),
        }
    }
}

impl CommandRunner for FakeCf {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        _cwd: Option<&Path>,
    ) -> impl Future<Output = HarnessResult<CommandOutput>> + Send {
        let command = format!("{program} {}", args.join(" ")).trim_end().to_string();
        self.calls.lock().unwrap().push(command.clone());
        let result = self.answer(&command);
        async move { result }
    }
}

/// Route `log` output through the test harness; `RUST_LOG` selects the level.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// HTTP client accepting the mock server's plain-http URLs.
pub fn plain_http() -> HttpClient {
    HttpClient::new().allow_plain_http(true)
}

/// Harness wired to `cf` and `landscape`, probing `/app` on the mock server.
pub fn harness(cf: FakeCf, landscape: &MockLandscape) -> Harness<FakeCf> {
    init_logging();
    Harness::new(
        CfCli::new(cf),
        plain_http(),
        Credentials::new(USERNAME, PASSWORD),
        Settings::new("X0000000", "cfapps.example.com"),
        HarnessConfig::default()
            .with_samples_dir("/samples")
            .with_settle_delay(Duration::ZERO),
    )
    .with_route_override(landscape.app_url(""))
}

/// One wiremock server standing in for the whole landscape.
pub struct MockLandscape {
    server: MockServer,
}

impl MockLandscape {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// URL of `path` on the mocked sample application.
    pub fn app_url(&self, path: &str) -> String {
        format!("{}/app{path}", self.server.uri())
    }

    /// `VCAP_SERVICES` with one identity-service binding pointing here.
    pub fn vcap_services(&self) -> Value {
        json!({
            "xsuaa": [{
                "label": "xsuaa",
                "plan": "application",
                "name": "xsuaa-sample",
                "credentials": {
                    "clientid": CLIENT_ID,
                    "clientsecret": CLIENT_SECRET,
                    "url": self.uri(),
                    "apiurl": self.uri(),
                    "xsappname": XSAPPNAME,
                    "identityzone": "sample-zone"
                }
            }]
        })
    }

    /// Register `name` with `guid` in the Cloud Controller.
    pub async fn mount_app(&self, name: &str, guid: &str) {
        self.mount_app_with_env(name, guid, self.vcap_services()).await;
    }

    pub async fn mount_app_with_env(&self, name: &str, guid: &str, vcap_services: Value) {
        self.mount_app_listing(
            name,
            json!({
                "pagination": {"total_results": 1},
                "resources": [{"guid": guid, "name": name}]
            }),
        )
        .await;
        Mock::given(method("GET"))
            .and(path(format!("/v3/apps/{guid}/env")))
            .and(header("Authorization", CF_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "staging_env_json": {},
                "running_env_json": {},
                "system_env_json": {"VCAP_SERVICES": vcap_services},
                "application_env_json": {"VCAP_APPLICATION": {"application_name": name}}
            })))
            .mount(&self.server)
            .await;
    }

    /// Answer the app listing for `name` with `listing` verbatim.
    pub async fn mount_app_listing(&self, name: &str, listing: Value) {
        Mock::given(method("GET"))
            .and(path("/v3/apps"))
            .and(query_param("names", name))
            .and(query_param("space_guids", SPACE_GUID))
            .and(header("Authorization", CF_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing))
            .mount(&self.server)
            .await;
    }

    /// Password grant of the sample's client for the operator.
    pub async fn mount_password_token(&self) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=password"))
            .and(body_string_contains(format!("client_secret={CLIENT_SECRET}")))
            .and(body_string_contains(format!("username={USERNAME}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": USER_TOKEN,
                "refresh_token": "refresh-1",
                "token_type": "bearer",
                "expires_in": 43199,
                "scope": "openid sample!t1.Read"
            })))
            .mount(&self.server)
            .await;
    }

    /// Client-credentials grant of the `apiaccess` key.
    pub async fn mount_admin_token(&self) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains(format!("client_secret={ADMIN_CLIENT_SECRET}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": ADMIN_TOKEN,
                "token_type": "bearer",
                "expires_in": 43199
            })))
            .mount(&self.server)
            .await;
    }

    /// The operator's user record, found by `userName` filter.
    pub async fn mount_user(&self) {
        Mock::given(method("GET"))
            .and(path("/Users"))
            .and(query_param("filter", user_name_filter(USERNAME)))
            .and(header("Authorization", format!("Bearer {ADMIN_TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resources": [{"id": USER_ID, "userName": USERNAME, "origin": "ldap"}],
                "startIndex": 1,
                "itemsPerPage": 100,
                "totalResults": 1
            })))
            .mount(&self.server)
            .await;
    }

    /// Accept exactly one membership request of the operator for `group`.
    pub async fn mount_group_member(&self, group: &str) {
        let member = serde_json::to_value(GroupMember::user(USER_ID)).unwrap();
        Mock::given(method("POST"))
            .and(path(format!("/Groups/{group}/members")))
            .and(header("Authorization", format!("Bearer {ADMIN_TOKEN}").as_str()))
            .and(body_json(&member))
            .respond_with(ResponseTemplate::new(201).set_body_json(&member))
            .expect(1)
            .mount(&self.server)
            .await;
    }

    /// A protected endpoint: 401 without credentials, 403 for the first
    /// request carrying `authorization`, then 200 with `body`.
    pub async fn mount_protected(&self, app_path: &str, authorization: &str, body: &str) {
        let full_path = format!("/app{app_path}");
        Mock::given(method("GET"))
            .and(path(full_path.as_str()))
            .and(header("Authorization", authorization))
            .respond_with(ResponseTemplate::new(403))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path(full_path.as_str()))
            .and(header("Authorization", authorization))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .with_priority(2)
            .mount(&self.server)
            .await;
        self.mount_unauthenticated(app_path).await;
    }

    /// 401 for any request to `app_path` not matched otherwise.
    pub async fn mount_unauthenticated(&self, app_path: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/app{app_path}")))
            .respond_with(ResponseTemplate::new(401))
            .with_priority(10)
            .mount(&self.server)
            .await;
    }

    /// Everything a role escalation needs: the app, both tokens, the user
    /// and one membership of `group`.
    pub async fn mount_escalation(&self, app_name: &str, group: &str) {
        self.mount_app(app_name, "app-guid-1").await;
        self.mount_password_token().await;
        self.mount_admin_token().await;
        self.mount_user().await;
        self.mount_group_member(group).await;
    }
}
