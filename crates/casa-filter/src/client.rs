//! Remote policy client
//!
//! `PolicyClient` is the seam the engine drives; `NextDnsClient` implements
//! it against the NextDNS profile API. The first profile on the account is
//! discovered lazily and used for every subsequent call.

use crate::profile::{ParentalPatch, Profile};
use async_trait::async_trait;
use casa_net::{RestClient, RestError, RestResponse};
use hyper::Method;
use hyper::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const API_BASE: &str = "https://api.nextdns.io";

/// Errors from the remote policy API
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy API {path}: {source}")]
    Request {
        path: String,
        #[source]
        source: RestError,
    },

    #[error("no profiles available for this API key")]
    NoProfiles,

    #[error("malformed policy payload: {0}")]
    Malformed(String),
}

impl PolicyError {
    /// Remote status code, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            PolicyError::Request { source, .. } => source.status(),
            _ => None,
        }
    }
}

/// Operations the override engine needs from the remote policy service.
#[async_trait]
pub trait PolicyClient: Send + Sync {
    /// Fetch the full profile document.
    async fn fetch_profile(&self) -> Result<Profile, PolicyError>;

    /// Patch scalar flags and filter lists in one request.
    async fn patch_parental_control(&self, patch: &ParentalPatch) -> Result<(), PolicyError>;

    /// Set the `active` flag of an existing deny-list entry.
    async fn patch_denylist_entry(&self, domain: &str, active: bool) -> Result<(), PolicyError>;

    /// Create a deny-list entry.
    async fn create_denylist_entry(&self, domain: &str, active: bool) -> Result<(), PolicyError>;

    /// Delete a deny-list entry. Deleting an absent entry succeeds.
    async fn delete_denylist_entry(&self, domain: &str) -> Result<(), PolicyError>;

    /// Patch the privacy block.
    async fn patch_privacy(&self, updates: &serde_json::Value) -> Result<(), PolicyError>;
}

#[derive(Debug, Deserialize)]
struct ProfileList {
    data: Vec<ProfileRef>,
}

#[derive(Debug, Deserialize)]
struct ProfileRef {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProfileEnvelope {
    data: Profile,
}

/// NextDNS-backed policy client.
pub struct NextDnsClient {
    rest: Arc<RestClient>,
    headers: HeaderMap,
    profile_id: OnceCell<String>,
}

impl NextDnsClient {
    pub fn new(rest: Arc<RestClient>, api_key: &str) -> Result<Self, PolicyError> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(api_key).map_err(|_| {
            PolicyError::Malformed("API key contains invalid header characters".to_string())
        })?;
        headers.insert("X-Api-Key", value);

        Ok(Self {
            rest,
            headers,
            profile_id: OnceCell::new(),
        })
    }

    /// First profile on the account, discovered once.
    async fn profile_id(&self) -> Result<&str, PolicyError> {
        self.profile_id
            .get_or_try_init(|| async {
                let path = "/profiles";
                let response = self.call(Method::GET, path, None).await?;
                let list: ProfileList = response
                    .json()
                    .map_err(|e| PolicyError::Malformed(e.to_string()))?;
                let first = list.data.into_iter().next().ok_or(PolicyError::NoProfiles)?;
                info!(
                    "using policy profile {} ({})",
                    first.id,
                    first.name.as_deref().unwrap_or("unnamed")
                );
                Ok(first.id)
            })
            .await
            .map(String::as_str)
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<RestResponse, PolicyError> {
        let url = format!("{API_BASE}{path}");
        self.rest
            .request(method, &url, &self.headers, body)
            .await
            .map_err(|source| PolicyError::Request {
                path: path.to_string(),
                source,
            })
    }

    /// Deny-list entries are addressed by form-urlencoded domain.
    fn denylist_path(profile_id: &str, domain: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(domain.as_bytes()).collect();
        format!("/profiles/{profile_id}/denylist/{encoded}")
    }
}

#[async_trait]
impl PolicyClient for NextDnsClient {
    async fn fetch_profile(&self) -> Result<Profile, PolicyError> {
        let id = self.profile_id().await?.to_string();
        let response = self.call(Method::GET, &format!("/profiles/{id}"), None).await?;
        let envelope: ProfileEnvelope = response
            .json()
            .map_err(|e| PolicyError::Malformed(e.to_string()))?;

        let mut profile = envelope.data;
        profile.id = Some(id);
        Ok(profile)
    }

    async fn patch_parental_control(&self, patch: &ParentalPatch) -> Result<(), PolicyError> {
        let id = self.profile_id().await?.to_string();
        let body = serde_json::to_value(patch).map_err(|e| PolicyError::Malformed(e.to_string()))?;
        self.call(
            Method::PATCH,
            &format!("/profiles/{id}/parentalControl"),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn patch_denylist_entry(&self, domain: &str, active: bool) -> Result<(), PolicyError> {
        let id = self.profile_id().await?.to_string();
        let body = json!({ "active": active });
        self.call(
            Method::PATCH,
            &Self::denylist_path(&id, domain),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn create_denylist_entry(&self, domain: &str, active: bool) -> Result<(), PolicyError> {
        let id = self.profile_id().await?.to_string();
        let body = json!({ "id": domain, "active": active });
        self.call(
            Method::POST,
            &format!("/profiles/{id}/denylist"),
            Some(&body),
        )
        .await?;
        Ok(())
    }

    async fn delete_denylist_entry(&self, domain: &str) -> Result<(), PolicyError> {
        let id = self.profile_id().await?.to_string();
        match self
            .call(Method::DELETE, &Self::denylist_path(&id, domain), None)
            .await
        {
            Ok(_) => Ok(()),
            // Already gone counts as deleted
            Err(err) if err.status() == Some(404) => {
                debug!("deny-list entry {} was already absent", domain);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn patch_privacy(&self, updates: &serde_json::Value) -> Result<(), PolicyError> {
        let id = self.profile_id().await?.to_string();
        self.call(
            Method::PATCH,
            &format!("/profiles/{id}/privacy"),
            Some(updates),
        )
        .await?;
        Ok(())
    }
}
