//! The sample applications and the scenarios run against them.
//!
//! Scenario names follow `Suite.case`; [`Scenario::select`] accepts either a
//! full name or just the suite to run all of its cases.

use crate::error::{HarnessError, HarnessResult};
use crate::http::HttpResult;
use crate::orchestrator::{
    CaseOutcome, CaseReport, Harness, TestCase, expect_body_contains, expect_status,
};
use crate::platform::{CommandRunner, SampleApp};
use log::{info, warn};
use std::fmt;

/// A verification scenario of one sample application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    TokenClientHello,
    JavaSecurityHello,
    SpringSecuritySayHello,
    SpringSecurityTokenFlows,
    BuildpackHelloToken,
    BasicAuthForbidden,
    BasicAuthAuthorized,
    WebfluxSayHello,
}

impl Scenario {
    /// Every scenario, in run order.
    pub const ALL: [Scenario; 8] = [
        Self::TokenClientHello,
        Self::JavaSecurityHello,
        Self::SpringSecuritySayHello,
        Self::SpringSecurityTokenFlows,
        Self::BuildpackHelloToken,
        Self::BasicAuthForbidden,
        Self::BasicAuthAuthorized,
        Self::WebfluxSayHello,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::TokenClientHello => "TokenClient.hello_token_client",
            Self::JavaSecurityHello => "JavaSecurity.hello_java_security",
            Self::SpringSecuritySayHello => "SpringSecurity.say_hello",
            Self::SpringSecurityTokenFlows => "SpringSecurity.token_flows",
            Self::BuildpackHelloToken => "JavaBuildpackApiUsage.hello_token_servlet",
            Self::BasicAuthForbidden => "SpringSecurityBasicAuth.hello_token",
            Self::BasicAuthAuthorized => "SpringSecurityBasicAuth.hello_token_status_ok",
            Self::WebfluxSayHello => "SpringWebfluxSecurityXsuaaUsage.say_hello",
        }
    }

    /// Suite part of [`name`](Self::name).
    pub fn suite(&self) -> &'static str {
        self.name().split('.').next().unwrap_or_default()
    }

    /// Scenarios matching a full name or a suite name.
    pub fn select(name: &str) -> Vec<Scenario> {
        Self::ALL
            .into_iter()
            .filter(|s| s.name() == name || s.suite() == name)
            .collect()
    }

    /// The sample this scenario deploys.
    pub fn app(&self) -> HarnessResult<SampleApp> {
        let app = match self {
            Self::TokenClientHello => {
                SampleApp::new("java-tokenclient-usage", "xsuaa-token-client")?
            }
            Self::JavaSecurityHello => {
                SampleApp::new("java-security-usage", "xsuaa-java-security")?
            }
            Self::SpringSecuritySayHello | Self::SpringSecurityTokenFlows => {
                SampleApp::new("spring-security-xsuaa-usage", "xsuaa-authentication")?
                    .with_app_router("approuter-spring-security-xsuaa-usage")
            }
            Self::BuildpackHelloToken => {
                SampleApp::new("sap-java-buildpack-api-usage", "xsuaa-buildpack")?
                    .with_app_router("approuter-sap-java-buildpack-api-usage")
            }
            Self::BasicAuthForbidden | Self::BasicAuthAuthorized => {
                SampleApp::new("spring-security-basic-auth", "xsuaa-basic")?
            }
            Self::WebfluxSayHello => {
                SampleApp::new("spring-webflux-security-xsuaa-usage", "xsuaa-webflux")?
                    .with_app_router("approuter-spring-webflux-security-xsuaa-usage")
            }
        };
        Ok(app)
    }

    /// Run the scenario body against a deployed sample.
    pub async fn run<R: CommandRunner>(&self, case: &mut TestCase<'_, R>) -> HarnessResult<()> {
        match self {
            Self::TokenClientHello => token_client_hello(case).await,
            Self::JavaSecurityHello => java_security_hello(case).await,
            Self::SpringSecuritySayHello => spring_security_say_hello(case).await,
            Self::SpringSecurityTokenFlows => spring_security_token_flows(case).await,
            Self::BuildpackHelloToken => {
                escalation_flow(case, "/hello-token", "Buildpack_API_Viewer").await?;
                Ok(())
            }
            Self::BasicAuthForbidden => basic_auth_forbidden(case).await,
            Self::BasicAuthAuthorized => basic_auth_authorized(case).await,
            Self::WebfluxSayHello => {
                escalation_flow(case, "/v1/sayHello", "Webflux_API_Viewer").await?;
                Ok(())
            }
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

async fn token_client_hello<R: CommandRunner>(case: &mut TestCase<'_, R>) -> HarnessResult<()> {
    let response = case.get("/hello-token-client").await;
    expect_status(&response, 200)?;
    expect_body_contains(&response, "Access-Token: ")?;
    expect_body_contains(&response, "Access-Token-Payload: ")?;
    expect_body_contains(&response, "Expired-At: ")
}

/// 401 anonymously, 403 with a token, 200 with the username after escalation.
///
/// Returns the authorized response.
async fn escalation_flow<R: CommandRunner>(
    case: &mut TestCase<'_, R>,
    path: &str,
    role: &str,
) -> HarnessResult<HttpResult> {
    let response = case.get(path).await;
    expect_status(&response, 401)?;

    let response = case.get_with_token(path, &[]).await?;
    expect_status(&response, 403)?;

    case.add_user_to_role(role).await?;
    let response = case.get_with_token(path, &[]).await?;
    expect_status(&response, 200)?;
    expect_body_contains(&response, case.credentials().username())?;
    Ok(response)
}

async fn java_security_hello<R: CommandRunner>(case: &mut TestCase<'_, R>) -> HarnessResult<()> {
    let response =
        escalation_flow(case, "/hello-java-security", "JAVA_SECURITY_SAMPLE_Viewer").await?;
    let xsappname = required_xsappname(case).await?;
    expect_body_contains(&response, &format!("{xsappname}.Read"))
}

async fn spring_security_say_hello<R: CommandRunner>(
    case: &mut TestCase<'_, R>,
) -> HarnessResult<()> {
    let response = case.get("/v1/sayHello").await;
    expect_status(&response, 401)?;

    let response = case.get_with_token("/v1/sayHello", &[]).await?;
    expect_status(&response, 403)?;

    case.add_user_to_role("Viewer").await?;
    let response = case.get_with_token("/v1/sayHello", &[]).await?;
    expect_status(&response, 200)?;
    let xsappname = required_xsappname(case).await?;
    expect_body_contains(&response, &xsappname)
}

async fn spring_security_token_flows<R: CommandRunner>(
    case: &mut TestCase<'_, R>,
) -> HarnessResult<()> {
    case.add_user_to_role("Viewer").await?;
    for path in [
        "/v2/sayHello",
        "/v3/requestClientCredentialsToken",
        "/v3/requestUserToken",
    ] {
        let response = case.get_with_token(path, &[]).await?;
        expect_status(&response, 200)?;
    }

    let token = case.token().await?;
    let refresh_token = token
        .refresh_token
        .ok_or_else(|| HarnessError::assertion("Password grant returned no refresh token"))?;
    let response = case
        .get_with_token(&format!("/v3/requestRefreshToken/{refresh_token}"), &[])
        .await?;
    expect_status(&response, 200)?;

    let refreshed = case.refresh(&refresh_token).await?;
    if refreshed.access_token.is_empty() {
        return Err(HarnessError::assertion(
            "Refresh token grant returned an empty access token",
        ));
    }
    Ok(())
}

async fn basic_auth_forbidden<R: CommandRunner>(case: &mut TestCase<'_, R>) -> HarnessResult<()> {
    let response = case.get("/hello-token").await;
    expect_status(&response, 401)?;

    let credentials = case.credentials();
    let response = case
        .get_with_basic_auth("/hello-token", credentials.username(), credentials.password())
        .await?;
    expect_status(&response, 403)
}

/// Separate case because the sample caches tokens per user.
async fn basic_auth_authorized<R: CommandRunner>(case: &mut TestCase<'_, R>) -> HarnessResult<()> {
    case.add_user_to_role("BASIC_AUTH_API_Viewer").await?;

    let credentials = case.credentials();
    let response = case
        .get_with_basic_auth("/hello-token", credentials.username(), credentials.password())
        .await?;
    expect_status(&response, 200)?;
    expect_body_contains(&response, credentials.username())
}

async fn required_xsappname<R: CommandRunner>(case: &mut TestCase<'_, R>) -> HarnessResult<String> {
    Ok(case
        .deployed_app()
        .await?
        .binding
        .require("xsappname")?
        .to_string())
}

/// Reports of a whole run.
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.count(|o| matches!(o, CaseOutcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, CaseOutcome::Failed(_) | CaseOutcome::Aborted(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, CaseOutcome::Skipped))
    }

    /// Whether every case passed.
    pub fn is_success(&self) -> bool {
        self.cases.iter().all(|c| c.outcome.is_success())
    }

    fn count(&self, predicate: impl Fn(&CaseOutcome) -> bool) -> usize {
        self.cases.iter().filter(|c| predicate(&c.outcome)).count()
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for case in &self.cases {
            match &case.outcome {
                CaseOutcome::Passed => writeln!(f, "✓ {}", case.name)?,
                CaseOutcome::Failed(e) => writeln!(f, "❌ {}: {e}", case.name)?,
                CaseOutcome::Aborted(e) => writeln!(f, "❌ {} (run aborted): {e}", case.name)?,
                CaseOutcome::Skipped => writeln!(f, "- {} (skipped)", case.name)?,
            }
        }
        write!(
            f,
            "{} passed, {} failed, {} skipped",
            self.passed(),
            self.failed(),
            self.skipped()
        )
    }
}

/// Run scenarios one after another.
///
/// A case that aborts (missing prerequisite) stops the run; the remaining
/// scenarios are reported as skipped.
pub async fn run_suite<R: CommandRunner>(
    harness: &Harness<R>,
    scenarios: &[Scenario],
) -> SuiteReport {
    let mut report = SuiteReport::default();
    let mut aborted = false;

    for scenario in scenarios {
        if aborted {
            report.cases.push(CaseReport {
                name: scenario.name().to_string(),
                outcome: CaseOutcome::Skipped,
                history: Vec::new(),
            });
            continue;
        }

        let case_report = match scenario.app() {
            Ok(app) => {
                harness
                    .run_case(scenario.name(), app, async |case| scenario.run(case).await)
                    .await
            }
            Err(e) => CaseReport {
                name: scenario.name().to_string(),
                outcome: CaseOutcome::Failed(e),
                history: Vec::new(),
            },
        };
        if matches!(case_report.outcome, CaseOutcome::Aborted(_)) {
            warn!("Aborting run after {}", scenario.name());
            aborted = true;
        }
        report.cases.push(case_report);
    }

    info!("{report}");
    report
}
