//! Cloud Foundry CLI collaborator.
//!
//! Everything that needs the `cf` (or `mvn`) binary goes through the
//! [`CommandRunner`] trait so the harness can be exercised without a
//! platform. [`CfCli`] wraps a runner with the handful of commands the
//! harness uses: reading the logged-in session, creating and deleting
//! services and service keys, pushing and deleting applications.

use crate::error::{HarnessError, HarnessResult, Prerequisite};
use log::{debug, info, warn};
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Captured result of an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run printing `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run printing `stderr`.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Executes external programs and captures their output.
pub trait CommandRunner {
    /// Run `program` with `args`, optionally inside `cwd`.
    ///
    /// An `Err` means the program could not be started; a non-zero exit is
    /// reported through [`CommandOutput::success`].
    fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> impl Future<Output = HarnessResult<CommandOutput>> + Send;
}

/// Runs commands as child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> impl Future<Output = HarnessResult<CommandOutput>> + Send {
        let mut command = Command::new(program);
        command.args(args);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        let rendered = format!("{program} {}", args.join(" "));

        async move {
            debug!("Running '{rendered}'");
            let output = command.output().await?;
            let result = CommandOutput {
                success: output.status.success(),
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            };
            debug!("'{rendered}' exited with {:?}", result.code);
            Ok(result)
        }
    }
}

/// Fields of `cf target` the harness needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    pub api_endpoint: String,
    pub user: String,
    pub org: Option<String>,
    pub space: String,
}

impl TargetInfo {
    /// Parse the human-readable output of `cf target`.
    pub fn parse(output: &str) -> HarnessResult<Self> {
        let mut api_endpoint = None;
        let mut user = None;
        let mut org = None;
        let mut space = None;

        for line in output.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim().to_string();
            match key.trim().to_ascii_lowercase().as_str() {
                "api endpoint" => api_endpoint = Some(value),
                "user" => user = Some(value),
                "org" => org = Some(value),
                "space" => space = Some(value),
                _ => {}
            }
        }

        let missing = |field: &str| {
            HarnessError::config(format!("'cf target' output has no '{field}' line"))
        };
        Ok(Self {
            api_endpoint: api_endpoint.ok_or_else(|| missing("api endpoint"))?,
            user: user.ok_or_else(|| missing("user"))?,
            org,
            space: space.ok_or_else(|| missing("space"))?,
        })
    }
}

/// Operator-scoped access to the management API of the targeted space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSession {
    /// API endpoint without version suffix
    pub api_endpoint: String,
    /// Full `Authorization` value as printed by `cf oauth-token`
    pub bearer_token: String,
    pub space_guid: String,
    pub user: String,
}

/// Typed front-end over the `cf` command line.
#[derive(Debug, Clone)]
pub struct CfCli<R> {
    runner: R,
}

impl<R: CommandRunner> CfCli<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    async fn cf(&self, args: &[&str], cwd: Option<&Path>) -> HarnessResult<CommandOutput> {
        self.runner.run("cf", args, cwd).await
    }

    /// Run a command whose failure is logged but tolerated.
    async fn cf_tolerant(&self, args: &[&str], cwd: Option<&Path>) -> HarnessResult<CommandOutput> {
        let output = self.cf(args, cwd).await?;
        if !output.success {
            warn!(
                "'cf {}' failed ({:?}): {}",
                args.join(" "),
                output.code,
                output.stderr.trim()
            );
        }
        Ok(output)
    }

    /// Whether the CLI has no usable login.
    pub async fn is_logged_off(&self) -> bool {
        match self.cf(&["target"], None).await {
            Ok(output) => !output.success || output.stdout.trim_start().starts_with("FAILED"),
            Err(_) => true,
        }
    }

    /// Read the operator session: bearer token, API endpoint and space guid.
    pub async fn session(&self) -> HarnessResult<PlatformSession> {
        let token = self.cf(&["oauth-token"], None).await?;
        if !token.success {
            return Err(HarnessError::config(
                "'cf oauth-token' failed, log in with 'cf login' first",
            ));
        }
        let target = self.cf(&["target"], None).await?;
        let target = TargetInfo::parse(&target.stdout)?;
        let space = self.cf(&["space", target.space.as_str(), "--guid"], None).await?;
        if !space.success {
            return Err(HarnessError::config(format!(
                "Could not resolve guid of space '{}'",
                target.space
            )));
        }

        Ok(PlatformSession {
            api_endpoint: target.api_endpoint.trim_end_matches('/').to_string(),
            bearer_token: token.stdout.trim().to_string(),
            space_guid: space.stdout.trim().to_string(),
            user: target.user,
        })
    }

    pub async fn create_service(
        &self,
        offering: &str,
        plan: &str,
        instance: &str,
        config_file: Option<&str>,
        cwd: Option<&Path>,
    ) -> HarnessResult<CommandOutput> {
        let mut args = vec!["create-service", offering, plan, instance];
        if let Some(file) = config_file {
            args.extend(["-c", file]);
        }
        self.cf_tolerant(&args, cwd).await
    }

    pub async fn delete_service(&self, instance: &str) -> HarnessResult<CommandOutput> {
        self.cf_tolerant(&["delete-service", "-f", instance], None).await
    }

    pub async fn create_service_key(
        &self,
        instance: &str,
        key: &str,
    ) -> HarnessResult<CommandOutput> {
        self.cf_tolerant(&["create-service-key", instance, key], None).await
    }

    pub async fn delete_service_key(
        &self,
        instance: &str,
        key: &str,
    ) -> HarnessResult<CommandOutput> {
        self.cf_tolerant(&["delete-service-key", "-f", instance, key], None).await
    }

    /// Fetch the credentials of a service key.
    pub async fn service_key(&self, instance: &str, key: &str) -> HarnessResult<Value> {
        let output = self.cf(&["service-key", instance, key], None).await?;
        if !output.success {
            return Err(HarnessError::not_found(
                Prerequisite::ServiceKey,
                format!("{instance}/{key}"),
            ));
        }
        parse_service_key_output(&output.stdout)
    }

    pub async fn push(&self, cwd: &Path, vars_file: &str) -> HarnessResult<CommandOutput> {
        self.cf_tolerant(&["push", "--vars-file", vars_file], Some(cwd)).await
    }

    /// Delete an application together with its routes.
    pub async fn delete_app(&self, name: &str) -> HarnessResult<CommandOutput> {
        self.cf_tolerant(&["delete", "-f", "-r", name], None).await
    }
}

/// Extract the credentials from `cf service-key` output.
///
/// The first line is a status message; the rest is JSON, either the bare
/// credentials or (newer CLIs) wrapped in a `credentials` object.
pub fn parse_service_key_output(output: &str) -> HarnessResult<Value> {
    let json: String = output.lines().skip(1).collect::<Vec<_>>().join("\n");
    let mut value: Value = serde_json::from_str(&json)?;
    match value.get_mut("credentials") {
        Some(credentials) if credentials.is_object() => Ok(credentials.take()),
        _ => Ok(value),
    }
}

/// A sample application and the services it is deployed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleApp {
    pub name: String,
    pub identity_service_name: String,
    pub app_router_name: Option<String>,
}

impl SampleApp {
    /// Describe a sample; name and identity service are required.
    pub fn new(
        name: impl Into<String>,
        identity_service_name: impl Into<String>,
    ) -> HarnessResult<Self> {
        let name = name.into();
        let identity_service_name = identity_service_name.into();
        if name.is_empty() || identity_service_name.is_empty() {
            return Err(HarnessError::config(
                "Name and identity service name must be provided",
            ));
        }
        Ok(Self {
            name,
            identity_service_name,
            app_router_name: None,
        })
    }

    pub fn with_app_router(mut self, router: impl Into<String>) -> Self {
        self.app_router_name = Some(router.into());
        self
    }

    /// Directory holding the sample's sources below `samples_dir`.
    pub fn working_dir(&self, samples_dir: &Path) -> PathBuf {
        samples_dir.join(&self.name)
    }

    /// Create the identity service, build the sample and push it.
    pub async fn deploy<R: CommandRunner>(
        &self,
        cli: &CfCli<R>,
        samples_dir: &Path,
        vars_file: &str,
    ) -> HarnessResult<()> {
        let dir = self.working_dir(samples_dir);
        info!("Deploying {self}");
        cli.create_service(
            "xsuaa",
            "application",
            &self.identity_service_name,
            Some("xs-security.json"),
            Some(&dir),
        )
        .await?;
        let build = cli
            .runner()
            .run("mvn", &["clean", "verify"], Some(&dir))
            .await?;
        if !build.success {
            warn!("Build of {} failed: {}", self.name, build.stderr.trim());
        }
        cli.push(&dir, vars_file).await?;
        Ok(())
    }

    /// Delete the app, its router and its identity service.
    pub async fn delete<R: CommandRunner>(&self, cli: &CfCli<R>) -> HarnessResult<()> {
        info!("Deleting {self}");
        cli.delete_app(&self.name).await?;
        if let Some(router) = &self.app_router_name {
            cli.delete_app(router).await?;
        }
        cli.delete_service(&self.identity_service_name).await?;
        Ok(())
    }
}

impl std::fmt::Display for SampleApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Name: {}, Xsuaa-Service-Name: {}, App-Router-Name: {}",
            self.name,
            self.identity_service_name,
            self.app_router_name.as_deref().unwrap_or("None")
        )
    }
}
