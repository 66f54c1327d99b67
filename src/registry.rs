//! Deployed application lookup through the Cloud Controller v3 API.

use crate::binding::ServiceBinding;
use crate::error::{HarnessError, HarnessResult, Prerequisite};
use crate::http::HttpClient;
use crate::platform::PlatformSession;
use log::{debug, error, warn};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

/// A deployed application and its identity-service binding.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployedAppRef {
    /// Cloud Controller guid
    pub guid: String,
    pub name: String,
    pub binding: ServiceBinding,
}

#[derive(Debug, Deserialize)]
struct Pagination {
    #[serde(default)]
    total_results: u64,
}

#[derive(Debug, Deserialize)]
struct Paginated<T> {
    #[serde(default)]
    pagination: Option<Pagination>,
    #[serde(default = "Vec::new")]
    resources: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct AppResource {
    guid: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AppEnvironment {
    system_env_json: SystemEnv,
}

#[derive(Debug, Deserialize)]
struct SystemEnv {
    #[serde(rename = "VCAP_SERVICES")]
    vcap_services: Value,
}

/// Take the first resource of a paginated listing, warning on ambiguity.
fn first_resource<T>(page: Paginated<T>) -> Option<T> {
    let total = page.pagination.map_or(0, |p| p.total_results);
    if total == 0 {
        return None;
    }
    if total > 1 {
        warn!("More than one resource found, taking the first one!");
    }
    page.resources.into_iter().next()
}

/// Resolves applications of the targeted space.
#[derive(Debug, Clone)]
pub struct DeploymentRegistry {
    http: HttpClient,
    session: PlatformSession,
}

impl DeploymentRegistry {
    pub fn new(http: HttpClient, session: PlatformSession) -> Self {
        Self { http, session }
    }

    /// Find `app_name` in the space and parse its identity-service binding.
    pub async fn resolve(&self, app_name: &str) -> HarnessResult<DeployedAppRef> {
        let mut url = Url::parse(&format!("{}/v3/apps", self.session.api_endpoint))?;
        url.query_pairs_mut()
            .append_pair("space_guids", &self.session.space_guid)
            .append_pair("names", app_name);

        let page: Paginated<AppResource> = self.get_json(url.as_str()).await?;
        let Some(app) = first_resource(page) else {
            error!("App {app_name} not found");
            return Err(HarnessError::not_found(Prerequisite::Application, app_name));
        };
        debug!("Resolved {app_name} to guid {}", app.guid);

        let env: AppEnvironment = self
            .get_json(&format!(
                "{}/v3/apps/{}/env",
                self.session.api_endpoint, app.guid
            ))
            .await?;
        let binding = ServiceBinding::parse(&env.system_env_json.vcap_services)?;

        Ok(DeployedAppRef {
            guid: app.guid,
            name: app.name.unwrap_or_else(|| app_name.to_string()),
            binding,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> HarnessResult<T> {
        let response = self
            .http
            .get(url, None, &[("Authorization", self.session.bearer_token.as_str())])
            .await;
        if !response.ok {
            return Err(HarnessError::unexpected(url, response.to_string()));
        }
        response
            .json()
            .map_err(|e| HarnessError::unexpected(url, e.to_string()))
    }
}
