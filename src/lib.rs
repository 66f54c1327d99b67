//! End-to-end verification of the security samples on Cloud Foundry.
//!
//! Each scenario deploys one sample application together with its identity
//! service instance, probes its protected endpoints anonymously, with a
//! token lacking the required role and finally with the role assigned, and
//! tears every provisioned resource down again.
//!
//! # Core Components
//!
//! - [`Harness`] - Shared state of a run; runs test cases with scoped teardown
//! - [`TestCase`] - Per-case context: deploy, resolve, escalate, probe
//! - [`CfCli`] - Thin wrapper around the `cf` command line tool
//! - [`TokenService`] - OAuth2 token endpoint client
//! - [`IdentityAdminClient`] - User lookup and group membership
//! - [`Scenario`] - The catalog of sample checks
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use sample_verifier::{
//!     CfCli, Credentials, Harness, HarnessConfig, HttpClient, ProcessRunner, Scenario,
//!     TerminalPrompt, run_suite,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarnessConfig::from_env().with_samples_dir("./samples");
//! let settings = config.load_settings()?;
//! let credentials = Credentials::resolve(&mut TerminalPrompt)?;
//! let harness = Harness::new(
//!     CfCli::new(ProcessRunner),
//!     HttpClient::new(),
//!     credentials,
//!     settings,
//!     config,
//! );
//! let report = run_suite(&harness, &Scenario::ALL).await;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod binding;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod platform;
pub mod registry;
pub mod samples;
pub mod token;

// Re-export commonly used types for convenience
pub use admin::{AdminAccessKey, IdentityAdminClient, UserRecord};
pub use binding::{BindingRecord, ServiceBinding};
pub use config::{HarnessConfig, Settings};
pub use credentials::{Credentials, Prompt, SecondFactor, TerminalPrompt};
pub use error::{HarnessError, HarnessResult, Prerequisite};
pub use http::{HttpClient, HttpResult};
pub use orchestrator::{
    CaseOutcome, CaseReport, Harness, ProbeOutcome, Release, TestCase, TestState,
    expect_body_contains, expect_status,
};
pub use platform::{CfCli, CommandOutput, CommandRunner, PlatformSession, ProcessRunner, SampleApp};
pub use registry::{DeployedAppRef, DeploymentRegistry};
pub use samples::{Scenario, SuiteReport, run_suite};
pub use token::{Grant, TokenResponse, TokenService};
