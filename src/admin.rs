//! Identity-service administration (SCIM `Users` and `Groups` endpoints).
//!
//! The admin API only accepts client-credentials tokens of an `apiaccess`
//! service instance, so the client provisions one of those (plus a service
//! key) for itself. [`AdminAccessKey::release`] deletes both again.

use crate::error::{HarnessError, HarnessResult, Prerequisite};
use crate::http::{HttpClient, HttpResult};
use crate::platform::{CfCli, CommandRunner};
use crate::token::{Grant, TokenService};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Default instance name of the `apiaccess` service.
pub const ADMIN_SERVICE_NAME: &str = "api-access-service";

/// Origin recorded for group memberships added by the harness.
pub const MEMBER_ORIGIN: &str = "ldap";

/// Client credentials of a provisioned `apiaccess` service key.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminAccessKey {
    pub instance_name: String,
    pub key_name: String,
    pub client_id: String,
    pub client_secret: String,
}

impl AdminAccessKey {
    /// Service key name belonging to `instance_name`.
    pub fn key_name_for(instance_name: &str) -> String {
        format!("{instance_name}-sk")
    }

    /// Create the `apiaccess` instance and a service key, then read the key.
    pub async fn provision<R: CommandRunner>(
        cli: &CfCli<R>,
        instance_name: &str,
    ) -> HarnessResult<Self> {
        let key_name = Self::key_name_for(instance_name);
        cli.create_service("xsuaa", "apiaccess", instance_name, None, None)
            .await?;
        cli.create_service_key(instance_name, &key_name).await?;
        let data = cli.service_key(instance_name, &key_name).await?;

        let field = |name: &str| {
            data.get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    HarnessError::not_found(
                        Prerequisite::ServiceKey,
                        format!("{name} in {instance_name}/{key_name}"),
                    )
                })
        };
        let key = Self {
            instance_name: instance_name.to_string(),
            client_id: field("clientid")?,
            client_secret: field("clientsecret")?,
            key_name,
        };
        debug!("Created {key:?}");
        Ok(key)
    }

    /// Delete the service key, then the instance. Safe to call when either
    /// was never created.
    pub async fn release<R: CommandRunner>(
        cli: &CfCli<R>,
        instance_name: &str,
    ) -> HarnessResult<()> {
        let key_name = Self::key_name_for(instance_name);
        cli.delete_service_key(instance_name, &key_name).await?;
        cli.delete_service(instance_name).await?;
        Ok(())
    }
}

impl std::fmt::Debug for AdminAccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAccessKey")
            .field("instance_name", &self.instance_name)
            .field("key_name", &self.key_name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// User resource returned by the `Users` endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(rename = "userName", default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct UserList {
    #[serde(default)]
    resources: Vec<UserRecord>,
}

/// Body of a group membership request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupMember<'a> {
    pub value: &'a str,
    pub origin: &'a str,
    #[serde(rename = "type")]
    pub member_type: &'a str,
}

impl<'a> GroupMember<'a> {
    pub fn user(user_id: &'a str) -> Self {
        Self {
            value: user_id,
            origin: MEMBER_ORIGIN,
            member_type: "USER",
        }
    }
}

/// SCIM filter selecting a user by name.
pub fn user_name_filter(username: &str) -> String {
    format!("userName eq \"{username}\"")
}

/// Client for the identity-service admin API.
#[derive(Debug, Clone)]
pub struct IdentityAdminClient {
    http: HttpClient,
    tokens: TokenService,
    issuer_url: String,
    admin_api_url: String,
    key: AdminAccessKey,
}

impl IdentityAdminClient {
    pub fn new(
        http: HttpClient,
        issuer_url: impl Into<String>,
        admin_api_url: impl Into<String>,
        key: AdminAccessKey,
    ) -> Self {
        Self {
            tokens: TokenService::new(http.clone()),
            http,
            issuer_url: issuer_url.into(),
            admin_api_url: admin_api_url.into(),
            key,
        }
    }

    pub fn key(&self) -> &AdminAccessKey {
        &self.key
    }

    /// Look up a user by `userName`; zero results is a missing prerequisite.
    pub async fn lookup_user(&self, username: &str) -> HarnessResult<UserRecord> {
        let token = self.access_token().await?;
        let mut url = self.endpoint(&["Users"])?;
        url.query_pairs_mut()
            .append_pair("filter", &user_name_filter(username));

        let response = self.http.get(url.as_str(), Some(token.as_str()), &[]).await;
        let user_not_found = || {
            error!("Could not find user {username}");
            HarnessError::not_found(Prerequisite::User, username)
        };
        if !response.ok {
            return Err(user_not_found());
        }
        let users: UserList = response.json()?;
        users.resources.into_iter().next().ok_or_else(user_not_found)
    }

    /// Add a user to a group (role collection) as an `ldap` member.
    pub async fn add_user_to_group(&self, user_id: &str, group: &str) -> HarnessResult<HttpResult> {
        let token = self.access_token().await?;
        let url = self.endpoint(&["Groups", group, "members"])?;
        let body = serde_json::to_vec(&GroupMember::user(user_id))?;
        info!("Adding user {user_id} to group {group}");
        Ok(self
            .http
            .post(
                url.as_str(),
                Some(body),
                Some(token.as_str()),
                &[("Content-Type", "application/json")],
            )
            .await)
    }

    async fn access_token(&self) -> HarnessResult<String> {
        self.tokens
            .acquire(
                &self.issuer_url,
                &self.key.client_id,
                &self.key.client_secret,
                &Grant::ClientCredentials,
            )
            .await
            .map(|token| token.access_token)
            .ok_or_else(|| {
                HarnessError::not_found(Prerequisite::AccessToken, self.key.client_id.clone())
            })
    }

    fn endpoint(&self, segments: &[&str]) -> HarnessResult<Url> {
        let mut url = Url::parse(&self.admin_api_url)?;
        let invalid = || {
            HarnessError::config(format!("Invalid admin API URL {}", self.admin_api_url))
        };
        url.path_segments_mut()
            .map_err(|()| invalid())?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}
