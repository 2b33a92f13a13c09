use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// Query for the SSE updates route.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdatesQuery {
    /// The local user id to stream events for.
    pub id: i64,
}

/// Query delivered to the OAuth callback by the marketplace.
#[derive(Debug, Clone, Deserialize)]
pub struct OauthCallbackQuery {
    pub code: Option<String>,
    /// Carries the local user id that started the linking flow.
    pub state: Option<String>,
    pub error: Option<String>,
}
