use crate::config::ConfigError;
use crate::state::StoreError;
use crate::types::ApiErrorBody;
use reqwest::StatusCode;
use thiserror::Error;

/// Why a session could not be kept alive. Cloned into every request that was
/// queued behind the failed refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    #[error("no refresh token is stored")]
    MissingRefreshToken,
    #[error("refresh rejected ({status})")]
    Rejected { status: u16, detail: Option<String> },
    #[error("refresh transport error: {0}")]
    Transport(String),
    #[error("refresh response malformed: {0}")]
    Malformed(String),
    #[error("credential store error: {0}")]
    Store(String),
    #[error("refresh abandoned before it settled")]
    Abandoned,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error")]
    Network(#[from] reqwest::Error),
    #[error("API error ({status})")]
    Status {
        status: StatusCode,
        body: Option<ApiErrorBody>,
    },
    #[error("session is no longer valid: {0}")]
    Session(RefreshError),
    #[error("invalid json")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Network(err) => err.status(),
            _ => None,
        }
    }

    /// True when no valid credential pair remains and the user has to sign in again.
    /// An abandoned refresh leaves the stored pair untouched, so it is not terminal.
    pub fn is_session_terminal(&self) -> bool {
        matches!(self, Self::Session(err) if *err != RefreshError::Abandoned)
    }

    /// Server-provided message, if the error body carried one.
    /// Id of an account that still needs OTP verification, when the server
    /// refused the request for that reason.
    pub fn pending_user_id(&self) -> Option<String> {
        match self {
            Self::Status { body: Some(body), .. } => body.pending_user_id(),
            _ => None,
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Status { body: Some(body), .. } => body.message(),
            Self::Session(RefreshError::Rejected { detail, .. }) => detail.as_deref(),
            _ => None,
        }
    }
}
