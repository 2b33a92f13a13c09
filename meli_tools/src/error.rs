use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The structured error body the marketplace attaches to failed API calls.
///
/// These are *data*, not exceptions: an answered-too-late error on a question, say, is
/// something callers branch on. They travel inside [`MeliResult::Failure`] rather than
/// through `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteApiError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub cause: Vec<serde_json::Value>,
}

impl std::fmt::Display for RemoteApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.error.as_deref().unwrap_or("api_error"), self.status, self.message)
    }
}

/// Outcome of a marketplace call that made it to the API: either the payload, or the
/// structured error the marketplace reported.
#[derive(Debug, Clone)]
pub enum MeliResult<T> {
    Success(T),
    Failure(RemoteApiError),
}

impl<T> MeliResult<T> {
    pub fn into_result(self) -> Result<T, RemoteApiError> {
        match self {
            Self::Success(v) => Ok(v),
            Self::Failure(e) => Err(e),
        }
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Self::Success(v) => Some(v),
            Self::Failure(_) => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }
}

/// Errors thrown by the marketplace client itself. Marketplace-reported error bodies are
/// *not* in here -- they come back as [`MeliResult::Failure`].
#[derive(Debug, Error)]
pub enum MeliApiError {
    #[error("Could not initialize marketplace client: {0}")]
    Initialization(String),
    /// Network-level failure (DNS, timeout, connection reset). Never retried by the
    /// client; marketplace writes are not known to be idempotent.
    #[error("Marketplace request failed in transit: {0}")]
    Transport(String),
    #[error("Could not deserialize marketplace response: {0}")]
    Json(String),
    /// The session is beyond saving: either a refreshed request still came back 401, or
    /// the refresh itself was rejected. The seller must re-link their account.
    #[error("Marketplace session is no longer authorized. The seller must re-link their account.")]
    Unauthorized,
}

impl MeliApiError {
    /// Machine-readable action code for clients, so an auth dead-end is distinguishable
    /// from ordinary failures.
    pub fn action(&self) -> Option<&'static str> {
        match self {
            Self::Unauthorized => Some("relink_marketplace"),
            _ => None,
        }
    }
}

/// Errors from the token refresh flow. `Clone` because concurrent refresh waiters all
/// receive the same result.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The marketplace rejected the refresh token. The stored credential is dead weight
    /// from here on; the caller must clear it and have the seller re-link.
    #[error("The marketplace rejected the token refresh: {0}")]
    LinkRevoked(String),
    #[error("Token refresh failed in transit: {0}")]
    Transport(String),
    #[error("Could not deserialize token endpoint response: {0}")]
    Json(String),
}
