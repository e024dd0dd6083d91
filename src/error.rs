//! Error types for the groupjit application.
//!
//! Uses `thiserror` for library-style errors with automatic `Display` and `Error` implementations.

use serde::Deserialize;
use thiserror::Error;

/// HTTP status the directory returns when the membership already exists.
pub const HTTP_CONFLICT: u16 = 409;

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Usage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Error getting cloudIdentityService {0}")]
    Client(#[from] ApiError),

    #[error(transparent)]
    Grant(#[from] GrantError),
}

/// Errors raised while resolving ambient credentials.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error(
        "No ambient credentials found. Set GOOGLE_OAUTH_ACCESS_TOKEN, configure application \
         default credentials, or run on a host with a metadata server"
    )]
    NoCredentials,

    #[error("Failed to read credentials file {path}: {reason}")]
    CredentialsFile { path: String, reason: String },

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("Failed to sign service account assertion: {0}")]
    AssertionFailed(String),

    #[error("Metadata server token request failed: {0}")]
    MetadataFailed(String),

    #[error("gcloud token request failed: {0}")]
    GcloudFailed(String),

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

/// Errors returned by the Cloud Identity API client.
///
/// `Status` carries the machine-readable HTTP code so callers can match on it
/// directly instead of inspecting message text.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("googleapi: Error {code}: {message}")]
    Status {
        code: u16,
        status: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to parse API response: {0}")]
    Decode(String),

    #[error("Invalid client option: {0}")]
    InvalidOption(String),
}

/// Google's JSON error envelope: `{"error": {"code", "message", "status"}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl ApiError {
    /// Build a structured error from a non-success HTTP response.
    pub fn from_response(code: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => Self::Status {
                code,
                status: envelope.error.status,
                message: envelope.error.message,
            },
            Err(_) => Self::Status {
                code,
                status: String::new(),
                message: body.trim().to_string(),
            },
        }
    }

    /// HTTP status code, if the remote side answered.
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true if the remote side rejected the call with 409 Conflict.
    pub fn is_conflict(&self) -> bool {
        self.code() == Some(HTTP_CONFLICT)
    }
}

/// Errors from the list / add-or-extend / poll sequence.
#[derive(Error, Debug)]
pub enum GrantError {
    #[error("Error Listing group members {0}")]
    List(#[source] ApiError),

    #[error("Error creating group membership {0}")]
    Create(#[source] ApiError),

    #[error("Error creating group membership: {user_id} is already a member of {parent} (use --autoExtend to extend) {source}")]
    AlreadyMember {
        user_id: String,
        parent: String,
        #[source]
        source: ApiError,
    },

    #[error("Error updating membership: no membership for {user_id} found under {parent}")]
    MembershipPathUnknown { user_id: String, parent: String },

    #[error("Error updating membership {0}")]
    Modify(#[source] ApiError),

    #[error("Error polling operation {0}")]
    Poll(#[source] ApiError),

    #[error("Error polling operation: operation has no name and is not done")]
    OperationUnnamed,

    #[error("Error adding group members: operation {name} did not complete within {waited_secs}s")]
    PollTimeout { name: String, waited_secs: u64 },

    #[error("Error adding group members {code}: {message}")]
    OperationFailed { code: i32, message: String },

    #[error("Error unmarshaling groups {0}")]
    Decode(String),

    #[error("Cancelled while waiting for operation")]
    Cancelled,

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl AppError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => 2,
            Self::Grant(GrantError::Cancelled) => 130,
            Self::Config(_) | Self::Auth(_) | Self::Client(_) | Self::Grant(_) => 1,
        }
    }
}

/// Configuration loading reports through `anyhow` context chains; keep the whole chain.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Config(format!("{:#}", err))
    }
}
