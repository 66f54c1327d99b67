//! Test case orchestration.
//!
//! A [`Harness`] holds everything shared by a run (CLI, HTTP client,
//! operator credentials, settings). Each test case gets its own
//! [`TestCase`], which deploys the sample, lets the test body probe it under
//! different authorization states and finally tears everything down again.
//!
//! # Lifecycle
//!
//! ```text
//! NotDeployed -> Deployed -> Probed(Unauthenticated) -> Probed(Forbidden)
//!             -> RoleEscalated -> Probed(Authorized) -> TornDown
//! ```
//!
//! Test bodies decide which states they visit. Teardown always runs: every
//! provisioning step registers a [`Release`] before it starts, and
//! [`Harness::run_case`] drains those after the body returns, fails or
//! panics.

use crate::admin::{ADMIN_SERVICE_NAME, AdminAccessKey, IdentityAdminClient};
use crate::config::{HarnessConfig, Settings};
use crate::credentials::{Credentials, TerminalPrompt};
use crate::error::{HarnessError, HarnessResult, Prerequisite};
use crate::http::{HttpClient, HttpResult, basic_auth_value};
use crate::platform::{CfCli, CommandRunner, SampleApp};
use crate::registry::{DeployedAppRef, DeploymentRegistry};
use crate::token::{Grant, TokenResponse, TokenService};
use futures::FutureExt;
use log::{error, info, warn};
use std::fmt;
use std::panic::AssertUnwindSafe;

/// What a probe observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 401
    Unauthenticated,
    /// 403
    Forbidden,
    /// 2xx
    Authorized,
    Other(u16),
}

impl From<u16> for ProbeOutcome {
    fn from(status: u16) -> Self {
        match status {
            401 => Self::Unauthenticated,
            403 => Self::Forbidden,
            200..=299 => Self::Authorized,
            other => Self::Other(other),
        }
    }
}

/// Position of a test case in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestState {
    NotDeployed,
    Deployed,
    Probed(ProbeOutcome),
    RoleEscalated,
    TornDown,
}

/// How a probe authenticates against the sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeAuth {
    Anonymous,
    Basic,
    Bearer,
}

impl fmt::Display for ProbeAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymously"),
            Self::Basic => write!(f, "using basic auth"),
            Self::Bearer => write!(f, "using access token"),
        }
    }
}

/// Cleanup registered by a provisioning step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    /// Delete the sample app, its router and its identity service
    SampleApp(SampleApp),
    /// Delete the admin service key and `apiaccess` instance
    AdminAccess { instance_name: String },
}

/// Final result of one test case.
#[derive(Debug)]
pub enum CaseOutcome {
    Passed,
    /// Assertion or other per-case failure; the run continues
    Failed(HarnessError),
    /// Missing prerequisite; the run stops after this case
    Aborted(HarnessError),
    /// Not run because an earlier case aborted the run
    Skipped,
}

impl CaseOutcome {
    fn from_result(result: HarnessResult<()>) -> Self {
        match result {
            Ok(()) => Self::Passed,
            Err(e) if e.is_fatal() => Self::Aborted(e),
            Err(e) => Self::Failed(e),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Outcome and state history of one test case.
#[derive(Debug)]
pub struct CaseReport {
    pub name: String,
    pub outcome: CaseOutcome,
    pub history: Vec<TestState>,
}

/// Shared state of a harness run.
pub struct Harness<R> {
    cli: CfCli<R>,
    http: HttpClient,
    tokens: TokenService,
    credentials: Credentials,
    settings: Settings,
    config: HarnessConfig,
    route_override: Option<String>,
}

impl<R: CommandRunner> Harness<R> {
    pub fn new(
        cli: CfCli<R>,
        http: HttpClient,
        credentials: Credentials,
        settings: Settings,
        config: HarnessConfig,
    ) -> Self {
        Self {
            tokens: TokenService::new(http.clone()),
            cli,
            http,
            credentials,
            settings,
            config,
            route_override: None,
        }
    }

    /// Send probes to `base_url` instead of the sample's public route.
    pub fn with_route_override(mut self, base_url: impl Into<String>) -> Self {
        self.route_override = Some(base_url.into());
        self
    }

    pub fn cli(&self) -> &CfCli<R> {
        &self.cli
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Deploy `app`, run `body` against it and tear everything down.
    pub async fn run_case<'h, F>(&'h self, name: &str, app: SampleApp, body: F) -> CaseReport
    where
        F: AsyncFnOnce(&mut TestCase<'h, R>) -> HarnessResult<()>,
    {
        info!("Running {name}");
        let mut case = TestCase::new(self, app);

        let result = match case.setup().await {
            Ok(()) => match AssertUnwindSafe(body(&mut case)).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(HarnessError::Panicked {
                    message: panic_message(panic.as_ref()),
                }),
            },
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            error!("{name} failed: {e}");
        }

        case.teardown().await;
        CaseReport {
            name: name.to_string(),
            outcome: CaseOutcome::from_result(result),
            history: case.history,
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Per-test-case context.
pub struct TestCase<'h, R> {
    harness: &'h Harness<R>,
    app: SampleApp,
    history: Vec<TestState>,
    deployed_app: Option<DeployedAppRef>,
    admin: Option<IdentityAdminClient>,
    releases: Vec<Release>,
}

impl<'h, R: CommandRunner> TestCase<'h, R> {
    fn new(harness: &'h Harness<R>, app: SampleApp) -> Self {
        Self {
            harness,
            app,
            history: vec![TestState::NotDeployed],
            deployed_app: None,
            admin: None,
            releases: Vec::new(),
        }
    }

    pub fn app(&self) -> &SampleApp {
        &self.app
    }

    pub fn credentials(&self) -> &'h Credentials {
        &self.harness.credentials
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TestState {
        self.history
            .last()
            .copied()
            .unwrap_or(TestState::NotDeployed)
    }

    fn transition(&mut self, state: TestState) {
        info!("{}: {:?} -> {state:?}", self.app.name, self.state());
        self.history.push(state);
    }

    async fn setup(&mut self) -> HarnessResult<()> {
        let harness = self.harness;
        let config = &harness.config;
        self.releases.push(Release::SampleApp(self.app.clone()));
        self.app
            .deploy(&harness.cli, &config.samples_dir, &config.push_vars_file())
            .await?;
        if !config.settle_delay.is_zero() {
            tokio::time::sleep(config.settle_delay).await;
        }
        self.transition(TestState::Deployed);
        Ok(())
    }

    /// Run every registered release, newest first. Failures are logged only.
    pub async fn teardown(&mut self) {
        while let Some(release) = self.releases.pop() {
            let result = match &release {
                Release::SampleApp(app) => app.delete(&self.harness.cli).await,
                Release::AdminAccess { instance_name } => {
                    AdminAccessKey::release(&self.harness.cli, instance_name).await
                }
            };
            if let Err(e) = result {
                warn!("Release of {release:?} failed: {e}");
            }
        }
        self.admin = None;
        self.deployed_app = None;
        self.transition(TestState::TornDown);
    }

    /// Registered releases, in the order they would run.
    pub fn pending_releases(&self) -> impl Iterator<Item = &Release> {
        self.releases.iter().rev()
    }

    /// Resolve the deployed app once per test case.
    pub async fn deployed_app(&mut self) -> HarnessResult<&DeployedAppRef> {
        let app = match self.deployed_app.take() {
            Some(app) => app,
            None => {
                let session = self.harness.cli.session().await?;
                DeploymentRegistry::new(self.harness.http.clone(), session)
                    .resolve(&self.app.name)
                    .await?
            }
        };
        Ok(self.deployed_app.insert(app))
    }

    async fn admin(&mut self) -> HarnessResult<&IdentityAdminClient> {
        let admin = match self.admin.take() {
            Some(admin) => admin,
            None => {
                let binding = self.deployed_app().await?.binding.clone();
                let issuer_url = binding.require("url")?.to_string();
                let admin_api_url = binding.require("apiurl")?.to_string();
                let instance_name = ADMIN_SERVICE_NAME.to_string();

                self.releases.push(Release::AdminAccess {
                    instance_name: instance_name.clone(),
                });
                let key = AdminAccessKey::provision(&self.harness.cli, &instance_name).await?;
                IdentityAdminClient::new(self.harness.http.clone(), issuer_url, admin_api_url, key)
            }
        };
        Ok(self.admin.insert(admin))
    }

    /// Add the operator to `role` (a group of the identity zone).
    pub async fn add_user_to_role(&mut self, role: &str) -> HarnessResult<()> {
        let harness = self.harness;
        let username = harness.credentials.username();
        info!("Assigning role collection {role} for user {username}");
        let admin = self.admin().await?;
        let user = admin.lookup_user(username).await?;
        let response = admin.add_user_to_group(&user.id, role).await?;
        if !response.ok {
            error!("Could not set role {role}");
            return Err(HarnessError::unexpected(
                format!("group {role}"),
                response.to_string(),
            ));
        }
        self.transition(TestState::RoleEscalated);
        Ok(())
    }

    fn second_factor_code(&self) -> HarnessResult<String> {
        self.harness.config.second_factor.code(&mut TerminalPrompt)
    }

    /// Password-grant token for the operator.
    pub async fn token(&mut self) -> HarnessResult<TokenResponse> {
        let code = self.second_factor_code()?;
        let credentials = &self.harness.credentials;
        let grant = Grant::password(credentials.username(), credentials.password_with_code(&code));
        self.acquire(&grant).await
    }

    /// Exchange a refresh token for a new token.
    pub async fn refresh(&mut self, refresh_token: &str) -> HarnessResult<TokenResponse> {
        self.acquire(&Grant::refresh(refresh_token)).await
    }

    async fn acquire(&mut self, grant: &Grant) -> HarnessResult<TokenResponse> {
        let binding = &self.deployed_app().await?.binding;
        let issuer_url = binding.require("url")?.to_string();
        let client_id = binding.require("clientid")?.to_string();
        let client_secret = binding.require("clientsecret")?.to_string();
        self.harness
            .tokens
            .acquire(&issuer_url, &client_id, &client_secret, grant)
            .await
            .ok_or_else(|| {
                error!("Cannot continue without access token");
                HarnessError::not_found(Prerequisite::AccessToken, client_id)
            })
    }

    fn url(&self, path: &str) -> String {
        match &self.harness.route_override {
            Some(base) => format!("{}{path}", base.trim_end_matches('/')),
            None => self.harness.settings.app_url(&self.app.name, path),
        }
    }

    async fn probe(
        &mut self,
        path: &str,
        auth: ProbeAuth,
        access_token: Option<&str>,
        headers: &[(&str, &str)],
    ) -> HttpResult {
        let url = self.url(path);
        info!("GET request to {url} {auth}");
        let response = self.harness.http.get(&url, access_token, headers).await;
        info!("Response: {response}");
        self.transition(TestState::Probed(response.status.into()));
        response
    }

    /// Anonymous GET.
    pub async fn get(&mut self, path: &str) -> HttpResult {
        self.probe(path, ProbeAuth::Anonymous, None, &[]).await
    }

    /// GET with basic auth; the second-factor code is appended to `password`.
    pub async fn get_with_basic_auth(
        &mut self,
        path: &str,
        username: &str,
        password: &str,
    ) -> HarnessResult<HttpResult> {
        let code = self.second_factor_code()?;
        let authorization = basic_auth_value(username, &format!("{password}{code}"));
        Ok(self
            .probe(path, ProbeAuth::Basic, None, &[("Authorization", authorization.as_str())])
            .await)
    }

    /// GET with a fresh password-grant token of the operator.
    pub async fn get_with_token(
        &mut self,
        path: &str,
        headers: &[(&str, &str)],
    ) -> HarnessResult<HttpResult> {
        let token = self.token().await?;
        Ok(self
            .probe(path, ProbeAuth::Bearer, Some(token.access_token.as_str()), headers)
            .await)
    }
}

/// Fail unless the response has `expected` status.
pub fn expect_status(response: &HttpResult, expected: u16) -> HarnessResult<()> {
    if response.status == expected {
        Ok(())
    } else {
        Err(HarnessError::assertion(format!(
            "Expected HTTP status {expected}, got {response}"
        )))
    }
}

/// Fail unless the response body contains `needle`.
pub fn expect_body_contains(response: &HttpResult, needle: &str) -> HarnessResult<()> {
    if response.body.contains(needle) {
        Ok(())
    } else {
        Err(HarnessError::assertion(format!(
            "Did not find '{needle}' in response body: {response}"
        )))
    }
}
