//! Typed view over an application's `VCAP_SERVICES` document.
//!
//! The document maps a service label to the ordered list of bindings of that
//! service. [`ServiceBinding::parse`] picks the first identity-service
//! (`xsuaa`) binding and exposes its credentials through optional accessors.

use crate::error::{HarnessError, HarnessResult, Prerequisite};
use log::warn;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Service label of the identity service in `VCAP_SERVICES`.
pub const IDENTITY_SERVICE_LABEL: &str = "xsuaa";

/// A single entry of `VCAP_SERVICES`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BindingRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub credentials: Map<String, Value>,
}

/// Identity-service connection parameters of a deployed application.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceBinding {
    record: BindingRecord,
}

impl ServiceBinding {
    /// Parse a `VCAP_SERVICES` value.
    ///
    /// Only the identity-service entries are decoded; other services are
    /// left alone. Fails with a missing-prerequisite error when the document
    /// has no identity-service binding at all.
    pub fn parse(vcap_services: &Value) -> HarnessResult<Self> {
        let candidates = match vcap_services.get(IDENTITY_SERVICE_LABEL) {
            Some(entries) => Vec::<BindingRecord>::deserialize(entries)?,
            None => Vec::new(),
        };
        if candidates.len() > 1 {
            warn!(
                "Found {} {IDENTITY_SERVICE_LABEL} bindings, taking the first one!",
                candidates.len()
            );
        }
        candidates
            .into_iter()
            .next()
            .map(|record| Self { record })
            .ok_or_else(|| {
                HarnessError::not_found(Prerequisite::ServiceBinding, IDENTITY_SERVICE_LABEL)
            })
    }

    /// Look up a credentials property.
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.record.credentials.get(property)
    }

    /// Look up a credentials property that holds a string.
    pub fn get_str(&self, property: &str) -> Option<&str> {
        self.get(property).and_then(Value::as_str)
    }

    /// Token issuer (`url`).
    pub fn issuer_url(&self) -> Option<&str> {
        self.get_str("url")
    }

    /// Identity-service admin API (`apiurl`).
    pub fn admin_api_url(&self) -> Option<&str> {
        self.get_str("apiurl")
    }

    pub fn client_id(&self) -> Option<&str> {
        self.get_str("clientid")
    }

    pub fn client_secret(&self) -> Option<&str> {
        self.get_str("clientsecret")
    }

    /// Application name registered with the identity service.
    pub fn xsappname(&self) -> Option<&str> {
        self.get_str("xsappname")
    }

    /// Instance name of the bound service.
    pub fn instance_name(&self) -> Option<&str> {
        self.record.name.as_deref()
    }

    /// Like [`get_str`](Self::get_str), but a missing property is an error.
    pub fn require(&self, property: &str) -> HarnessResult<&str> {
        self.get_str(property).ok_or_else(|| {
            HarnessError::not_found(
                Prerequisite::ServiceBinding,
                format!("credentials property '{property}'"),
            )
        })
    }
}
