//! Harness configuration.
//!
//! [`Settings`] is read from the samples' `vars.yml` (the same file `cf push`
//! receives as `--vars-file`). [`HarnessConfig`] collects the local knobs of
//! a run: where the samples live and how long to wait after a push.

use crate::credentials::SecondFactor;
use crate::error::{HarnessError, HarnessResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default name of the vars file inside the samples directory.
pub const DEFAULT_VARS_FILE: &str = "vars.yml";

/// Values from `vars.yml`.
///
/// ```yaml
/// # change to another value, e.g. your User ID
/// ID: X0000000
/// LANDSCAPE_APPS_DOMAIN: cfapps.sap.hana.ondemand.com
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Suffix making route hosts unique per operator
    #[serde(rename = "ID")]
    pub user_id: String,
    /// Shared domain applications are routed under
    #[serde(rename = "LANDSCAPE_APPS_DOMAIN")]
    pub landscape_apps_domain: String,
}

impl Settings {
    pub fn new(user_id: impl Into<String>, landscape_apps_domain: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            landscape_apps_domain: landscape_apps_domain.into(),
        }
    }

    /// Parse the content of a vars file.
    pub fn parse(content: &str) -> HarnessResult<Self> {
        let settings: Self = serde_yaml::from_str(content)?;
        if settings.user_id.trim().is_empty() || settings.landscape_apps_domain.trim().is_empty() {
            return Err(HarnessError::config(
                "ID and LANDSCAPE_APPS_DOMAIN must not be empty",
            ));
        }
        Ok(Self {
            user_id: settings.user_id.trim().to_string(),
            landscape_apps_domain: settings.landscape_apps_domain.trim().to_string(),
        })
    }

    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::config(format!("Could not read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Public URL of `path` on the deployed application `app_name`.
    pub fn app_url(&self, app_name: &str, path: &str) -> String {
        format!(
            "https://{app_name}-{}.{}{path}",
            self.user_id, self.landscape_apps_domain
        )
    }
}

/// Local configuration of a harness run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Directory containing one sub-directory per sample and the vars file
    pub samples_dir: PathBuf,
    /// Vars file name, relative to the samples directory
    pub vars_file: String,
    /// Pause after pushing an application before probing it
    pub settle_delay: Duration,
    pub second_factor: SecondFactor,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            samples_dir: PathBuf::from("."),
            vars_file: DEFAULT_VARS_FILE.to_string(),
            settle_delay: Duration::from_secs(2),
            second_factor: SecondFactor::Disabled,
        }
    }
}

impl HarnessConfig {
    /// Default configuration with the second factor taken from the environment.
    pub fn from_env() -> Self {
        Self {
            second_factor: SecondFactor::from_env(),
            ..Self::default()
        }
    }

    pub fn with_samples_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.samples_dir = dir.into();
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_second_factor(mut self, second_factor: SecondFactor) -> Self {
        self.second_factor = second_factor;
        self
    }

    /// Path of the vars file.
    pub fn vars_path(&self) -> PathBuf {
        self.samples_dir.join(&self.vars_file)
    }

    /// Vars file as passed to `cf push` from inside a sample directory.
    pub fn push_vars_file(&self) -> String {
        format!("../{}", self.vars_file)
    }

    pub fn load_settings(&self) -> HarnessResult<Settings> {
        Settings::from_file(&self.vars_path())
    }
}
