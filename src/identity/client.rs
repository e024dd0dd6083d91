//! Cloud Identity API client for group membership management.
//!
//! Uses the Cloud Identity v1beta1 REST API.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::models::{
    ListMembershipsResponse, Membership, ModifyMembershipRolesRequest,
    ModifyMembershipRolesResponse, Operation,
};
use super::DirectoryApi;
use crate::auth::AccessToken;
use crate::config::Config;
use crate::error::ApiError;

/// Audit-log reason attached to every call.
const HEADER_REQUEST_REASON: &str = "x-goog-request-reason";

/// Project billed for quota.
const HEADER_USER_PROJECT: &str = "x-goog-user-project";

/// Audit and billing metadata attached to outgoing calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestMetadata {
    pub request_reason: String,
    pub quota_project: String,
}

impl RequestMetadata {
    /// Headers for the non-empty fields.
    pub fn headers(&self) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();

        for (name, value) in [
            (HEADER_REQUEST_REASON, &self.request_reason),
            (HEADER_USER_PROJECT, &self.quota_project),
        ] {
            if value.is_empty() {
                continue;
            }
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiError::InvalidOption(format!("{}: {}", name, e)))?;
            headers.insert(HeaderName::from_static(name), value);
        }

        Ok(headers)
    }
}

/// Cloud Identity API client.
pub struct CloudIdentityClient {
    http_client: Client,
    endpoint: String,
    access_token: AccessToken,
}

impl CloudIdentityClient {
    /// Create a new client carrying `metadata` on every request.
    pub fn new(
        config: &Config,
        metadata: &RequestMetadata,
        access_token: AccessToken,
    ) -> Result<Self, ApiError> {
        let http_client = Client::builder()
            .timeout(config.api.timeout())
            .connect_timeout(config.api.connect_timeout())
            .user_agent(config.app.user_agent.as_str())
            .default_headers(metadata.headers()?)
            .build()
            .map_err(ApiError::Transport)?;

        if !metadata.request_reason.is_empty() {
            debug!("Attaching request reason to API calls");
        }
        if !metadata.quota_project.is_empty() {
            debug!("Billing quota to project {}", metadata.quota_project);
        }

        Ok(Self {
            http_client,
            endpoint: config.endpoint().to_string(),
            access_token,
        })
    }

    /// Fetch a single page of memberships.
    async fn list_memberships_page(
        &self,
        parent: &str,
        page_token: Option<&str>,
    ) -> Result<ListMembershipsResponse, ApiError> {
        let url = memberships_url(&self.endpoint, parent);

        debug!("Listing memberships from {}", url);

        let mut request = self
            .http_client
            .get(&url)
            .bearer_auth(self.access_token.as_str());
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await?;
        read_json(response).await
    }
}

impl DirectoryApi for CloudIdentityClient {
    async fn list_memberships(&self, parent: &str) -> Result<Vec<Membership>, ApiError> {
        let mut memberships = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_memberships_page(parent, page_token.as_deref())
                .await?;
            let next = page.next_page().map(str::to_string);
            memberships.extend(page.memberships);

            match next {
                Some(token) if page_token.as_deref() == Some(token.as_str()) => {
                    warn!(
                        "Listing {} returned page token {} twice; stopping pagination",
                        parent, token
                    );
                    break;
                }
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!("Found {} memberships in {}", memberships.len(), parent);
        Ok(memberships)
    }

    async fn create_membership(
        &self,
        parent: &str,
        membership: &Membership,
    ) -> Result<Operation, ApiError> {
        let url = memberships_url(&self.endpoint, parent);

        info!(
            "Creating membership for {} in {}",
            membership.member_id().unwrap_or_default(),
            parent
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.access_token.as_str())
            .json(membership)
            .send()
            .await?;

        read_json(response).await
    }

    async fn get_operation(&self, name: &str) -> Result<Operation, ApiError> {
        let url = resource_url(&self.endpoint, name);

        debug!("Polling operation {}", name);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(self.access_token.as_str())
            .send()
            .await?;

        read_json(response).await
    }

    async fn modify_membership_roles(
        &self,
        name: &str,
        request: &ModifyMembershipRolesRequest,
    ) -> Result<Membership, ApiError> {
        if name.is_empty() {
            return Err(ApiError::InvalidOption(
                "membership name must not be empty".to_string(),
            ));
        }

        let url = format!("{}:modifyMembershipRoles", resource_url(&self.endpoint, name));

        info!("Modifying roles of {}", name);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.access_token.as_str())
            .json(request)
            .send()
            .await?;

        let body: ModifyMembershipRolesResponse = read_json(response).await?;
        Ok(body.membership)
    }
}

fn memberships_url(endpoint: &str, parent: &str) -> String {
    format!("{}/memberships", resource_url(endpoint, parent))
}

fn resource_url(endpoint: &str, name: &str) -> String {
    format!("{}/{}", endpoint, name.trim_start_matches('/'))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await?;
    parse_body(status, &body)
}

fn parse_body<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, ApiError> {
    if status.is_success() {
        return serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()));
    }

    let err = ApiError::from_response(status.as_u16(), body);
    if err.is_conflict() {
        debug!("Cloud Identity returned conflict: {}", err);
    } else {
        warn!("Cloud Identity request failed: HTTP {} - {}", status, body);
    }
    Err(err)
}
