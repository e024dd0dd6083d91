//! Ambient Google credentials.
//!
//! Resolves an OAuth2 access token without any interactive flow, trying in order:
//! an explicit token in the environment, application default credentials
//! (`authorized_user` refresh tokens or `service_account` keys), the GCE
//! metadata server, and finally the gcloud CLI.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::AccessToken;
use crate::error::AuthError;

/// Explicit access token override.
const ENV_ACCESS_TOKEN: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Path to an application default credentials file.
const ENV_CREDENTIALS_FILE: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Overrides the gcloud configuration directory.
const ENV_CLOUDSDK_CONFIG: &str = "CLOUDSDK_CONFIG";

/// Overrides the metadata server host, e.g. for emulators.
const ENV_METADATA_HOST: &str = "GCE_METADATA_HOST";

const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";

const ADC_FILE_NAME: &str = "application_default_credentials.json";

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Scope requested for service account tokens.
const GROUPS_SCOPE: &str = "https://www.googleapis.com/auth/cloud-identity.groups";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Google rejects assertions valid for longer than an hour.
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// HTTP request timeout.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The metadata server answers locally or not at all.
const METADATA_TIMEOUT: Duration = Duration::from_secs(2);

/// Where a token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Environment,
    AuthorizedUser,
    ServiceAccount,
    MetadataServer,
    Gcloud,
}

/// Application default credentials file contents.
///
/// Holds either an `authorized_user` refresh token or a `service_account` key;
/// the fields of the other kind stay empty.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
struct CredentialsFile {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    client_secret: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    client_email: String,
    #[serde(default)]
    private_key_id: String,
    #[serde(default)]
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

impl CredentialsFile {
    fn token_uri(&self) -> &str {
        self.token_uri
            .as_deref()
            .filter(|uri| !uri.is_empty())
            .unwrap_or(TOKEN_ENDPOINT)
    }
}

/// Claims of the self-signed JWT exchanged for a service account token.
#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Token response from the OAuth2 endpoint or the metadata server.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Resolves ambient credentials into an access token.
pub struct CredentialChain {
    http_client: reqwest::Client,
}

impl CredentialChain {
    pub fn new() -> Result<Self, AuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Client(e.to_string()))?;

        Ok(Self { http_client })
    }

    /// Obtain an access token from the first source that has one.
    pub async fn access_token(&self) -> Result<(AccessToken, TokenSource), AuthError> {
        if let Some(token) = token_from_env() {
            info!("Using access token from {}", ENV_ACCESS_TOKEN);
            return Ok((token, TokenSource::Environment));
        }

        if let Some(path) = credentials_file_path() {
            if let Some((token, source)) = self.token_from_credentials_file(&path).await? {
                info!("Using application default credentials from {:?}", path);
                return Ok((token, source));
            }
        }

        if let Some(token) = self.token_from_metadata_server().await {
            info!("Using metadata server credentials");
            return Ok((token, TokenSource::MetadataServer));
        }

        if let Some(token) = token_from_gcloud().await? {
            info!("Using gcloud credentials");
            return Ok((token, TokenSource::Gcloud));
        }

        Err(AuthError::NoCredentials)
    }

    /// Exchange application default credentials for an access token.
    ///
    /// Returns `Ok(None)` if the file is absent or of an unknown type.
    async fn token_from_credentials_file(
        &self,
        path: &Path,
    ) -> Result<Option<(AccessToken, TokenSource)>, AuthError> {
        if !path.exists() {
            debug!("No credentials file at {:?}", path);
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| AuthError::CredentialsFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let content = Zeroizing::new(content);

        let creds = parse_credentials_file(&content).map_err(|reason| {
            AuthError::CredentialsFile {
                path: path.display().to_string(),
                reason,
            }
        })?;

        match creds.kind.as_str() {
            "authorized_user" => {
                let params = [
                    ("client_id", creds.client_id.as_str()),
                    ("client_secret", creds.client_secret.as_str()),
                    ("grant_type", "refresh_token"),
                    ("refresh_token", creds.refresh_token.as_str()),
                ];
                let token = self.exchange(TOKEN_ENDPOINT, &params).await?;
                Ok(Some((token, TokenSource::AuthorizedUser)))
            }
            "service_account" => {
                debug!("Signing assertion for {}", creds.client_email);
                let assertion =
                    Zeroizing::new(service_account_assertion(&creds, Utc::now().timestamp())?);
                let params = [
                    ("grant_type", JWT_BEARER_GRANT),
                    ("assertion", assertion.as_str()),
                ];
                let token = self.exchange(creds.token_uri(), &params).await?;
                Ok(Some((token, TokenSource::ServiceAccount)))
            }
            other => {
                warn!(
                    "Credentials file {:?} has unsupported type '{}'; trying other sources",
                    path, other
                );
                Ok(None)
            }
        }
    }

    /// POST a token grant form and read back the access token.
    async fn exchange(&self, url: &str, params: &[(&str, &str)]) -> Result<AccessToken, AuthError> {
        let response = self
            .http_client
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!("Token exchange failed: HTTP {} - {}", status, error_body);
            return Err(AuthError::TokenExchangeFailed(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::TokenExchangeFailed(e.to_string()))?;

        debug!("Access token expires in {}s", token.expires_in);
        Ok(Zeroizing::new(token.access_token))
    }

    /// Ask the metadata server for the default service account's token.
    ///
    /// Any failure to reach the server means "not on GCP" and yields `None`.
    async fn token_from_metadata_server(&self) -> Option<AccessToken> {
        let host = env::var(ENV_METADATA_HOST).unwrap_or_else(|_| DEFAULT_METADATA_HOST.into());
        let url = format!(
            "http://{}/computeMetadata/v1/instance/service-accounts/default/token",
            host
        );

        let response = match self
            .http_client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .timeout(METADATA_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                debug!("Metadata server unavailable: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(
                "{}",
                AuthError::MetadataFailed(format!("HTTP {}", response.status()))
            );
            return None;
        }

        match response.json::<TokenResponse>().await {
            Ok(token) => Some(Zeroizing::new(token.access_token)),
            Err(e) => {
                warn!("{}", AuthError::MetadataFailed(e.to_string()));
                None
            }
        }
    }
}

fn token_from_env() -> Option<AccessToken> {
    env::var(ENV_ACCESS_TOKEN)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .map(Zeroizing::new)
}

/// `GOOGLE_APPLICATION_CREDENTIALS`, else gcloud's well-known ADC location.
fn credentials_file_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(ENV_CREDENTIALS_FILE) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    gcloud_config_dir().map(|dir| dir.join(ADC_FILE_NAME))
}

fn gcloud_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = env::var(ENV_CLOUDSDK_CONFIG) {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir));
        }
    }

    if cfg!(windows) {
        dirs::config_dir().map(|d| d.join("gcloud"))
    } else {
        dirs::home_dir().map(|d| d.join(".config").join("gcloud"))
    }
}

fn parse_credentials_file(content: &str) -> Result<CredentialsFile, String> {
    let creds: CredentialsFile = serde_json::from_str(content).map_err(|e| e.to_string())?;

    match creds.kind.as_str() {
        "authorized_user" if creds.client_id.is_empty() || creds.refresh_token.is_empty() => {
            Err("authorized_user credentials need client_id and refresh_token".to_string())
        }
        "service_account" if creds.client_email.is_empty() || creds.private_key.is_empty() => {
            Err("service_account credentials need client_email and private_key".to_string())
        }
        _ => Ok(creds),
    }
}

/// Sign the RS256 JWT a service account trades for an access token.
///
/// `now` is seconds since the epoch.
fn service_account_assertion(creds: &CredentialsFile, now: i64) -> Result<String, AuthError> {
    let key = EncodingKey::from_rsa_pem(creds.private_key.as_bytes())
        .map_err(|e| AuthError::AssertionFailed(e.to_string()))?;

    let mut header = Header::new(Algorithm::RS256);
    if !creds.private_key_id.is_empty() {
        header.kid = Some(creds.private_key_id.clone());
    }

    let claims = AssertionClaims {
        iss: &creds.client_email,
        scope: GROUPS_SCOPE,
        aud: creds.token_uri(),
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };

    jsonwebtoken::encode(&header, &claims, &key)
        .map_err(|e| AuthError::AssertionFailed(e.to_string()))
}

/// Run `gcloud auth print-access-token`.
///
/// Returns `Ok(None)` if gcloud is not installed.
async fn token_from_gcloud() -> Result<Option<AccessToken>, AuthError> {
    let output = match Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("gcloud not installed");
            return Ok(None);
        }
        Err(e) => return Err(AuthError::GcloudFailed(e.to_string())),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AuthError::GcloudFailed(stderr.trim().to_string()));
    }

    let token = Zeroizing::new(String::from_utf8_lossy(&output.stdout).trim().to_string());
    if token.is_empty() {
        return Err(AuthError::GcloudFailed("empty token".to_string()));
    }

    Ok(Some(token))
}
