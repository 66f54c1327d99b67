//! Operator credentials.
//!
//! Resolved once per process from the environment, falling back to an
//! interactive prompt, and then passed by reference to whatever needs them.

use crate::error::{HarnessError, HarnessResult};
use std::fmt;
use std::io::{self, BufRead, Write};

/// Environment variable holding the operator user name.
pub const USERNAME_VAR: &str = "CFUSER";
/// Environment variable holding the operator password.
pub const PASSWORD_VAR: &str = "CFPASSWORD";
/// When set (to anything), a second-factor code is prompted per request.
pub const SECOND_FACTOR_VAR: &str = "ENABLE_2_FACTOR";

/// Source of interactive operator input.
pub trait Prompt {
    /// Ask for a visible value.
    fn read_line(&mut self, label: &str) -> io::Result<String>;

    /// Ask for a secret value.
    fn read_secret(&mut self, label: &str) -> io::Result<String> {
        self.read_line(label)
    }
}

/// Prompts on the controlling terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn read_line(&mut self, label: &str) -> io::Result<String> {
        let mut stdout = io::stdout();
        write!(stdout, "{label}")?;
        stdout.flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Operator user name and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Resolve from `CFUSER`/`CFPASSWORD`, prompting for whatever is unset.
    pub fn resolve(prompt: &mut impl Prompt) -> HarnessResult<Self> {
        Self::resolve_with(|name| std::env::var(name).ok(), prompt)
    }

    /// Resolve using `lookup` instead of the process environment.
    pub fn resolve_with(
        lookup: impl Fn(&str) -> Option<String>,
        prompt: &mut impl Prompt,
    ) -> HarnessResult<Self> {
        let username = match lookup(USERNAME_VAR) {
            Some(username) => username,
            None => prompt.read_line("Username: ")?,
        };
        let password = match lookup(PASSWORD_VAR) {
            Some(password) => password,
            None => prompt.read_secret("Password: ")?,
        };
        if username.is_empty() {
            return Err(HarnessError::config("Username must not be empty"));
        }
        Ok(Self { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Password with a second-factor code appended, as the identity service expects.
    pub fn password_with_code(&self, code: &str) -> String {
        format!("{}{code}", self.password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// How second-factor codes are obtained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SecondFactor {
    /// No code; an empty string is appended
    #[default]
    Disabled,
    /// Prompt the operator on every use
    Interactive,
    /// Always use the given code
    Fixed(String),
}

impl SecondFactor {
    /// `Interactive` when `ENABLE_2_FACTOR` is set, otherwise `Disabled`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        if lookup(SECOND_FACTOR_VAR).is_some() {
            Self::Interactive
        } else {
            Self::Disabled
        }
    }

    /// Obtain the code for one request; empty when disabled.
    pub fn code(&self, prompt: &mut impl Prompt) -> HarnessResult<String> {
        match self {
            Self::Disabled => Ok(String::new()),
            Self::Interactive => Ok(prompt.read_secret("2-Factor Authenticator Code: ")?),
            Self::Fixed(code) => Ok(code.clone()),
        }
    }
}
