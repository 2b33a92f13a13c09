//! OAuth token machinery: the raw token-endpoint client and the single-flight refresh
//! coordinator that sits on top of it.

use std::{
    collections::HashMap,
    pin::Pin,
    sync::{Arc, Mutex},
};

use futures::{future::Shared, Future, FutureExt};
use log::*;
use reqwest::Client;
use sgw_common::SellerId;

use crate::{
    config::MeliConfig,
    data_objects::TokenResponse,
    error::{AuthError, MeliApiError, MeliResult, RemoteApiError},
};

/// Client for the marketplace token endpoint.
#[derive(Clone)]
pub struct MeliOauth {
    config: MeliConfig,
    client: Arc<Client>,
}

impl MeliOauth {
    pub fn new(config: MeliConfig, client: Arc<Client>) -> Self {
        Self { config, client }
    }

    fn token_url(&self) -> String {
        format!("{}/oauth/token", self.config.api_url)
    }

    /// Exchange an authorization code for a token pair. Marketplace rejections (bad or
    /// reused code, mismatched redirect URL) come back as data so the linking flow can
    /// report them to the user.
    pub async fn exchange_code(&self, code: &str) -> Result<MeliResult<TokenResponse>, MeliApiError> {
        debug!("🔑️ Exchanging authorization code for tokens");
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.reveal().as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
        ];
        let response = self
            .client
            .post(self.token_url())
            .header("accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| MeliApiError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            let tokens =
                response.json::<TokenResponse>().await.map_err(|e| MeliApiError::Json(e.to_string()))?;
            info!("🔑️ Authorization code exchanged for seller {}", tokens.user_id);
            Ok(MeliResult::Success(tokens))
        } else {
            let body = response.text().await.map_err(|e| MeliApiError::Transport(e.to_string()))?;
            warn!("🔑️ Code exchange rejected with status {status}: {body}");
            Ok(MeliResult::Failure(parse_error_body(status.as_u16(), body)))
        }
    }

    /// Call the token endpoint with the `refresh_token` grant. An API-reported rejection
    /// means the link is dead: refresh tokens are single-use and the marketplace does
    /// not issue a second chance.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        debug!("🔑️ Requesting access token refresh");
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.reveal().as_str()),
            ("refresh_token", refresh_token),
        ];
        let response = self
            .client
            .post(self.token_url())
            .header("accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            let tokens = response.json::<TokenResponse>().await.map_err(|e| AuthError::Json(e.to_string()))?;
            info!("🔑️ Token refreshed for seller {}", tokens.user_id);
            Ok(tokens)
        } else {
            let body = response.text().await.map_err(|e| AuthError::Transport(e.to_string()))?;
            let err = parse_error_body(status.as_u16(), body);
            warn!("🔑️ Token refresh rejected: {err}");
            Err(AuthError::LinkRevoked(err.to_string()))
        }
    }
}

fn parse_error_body(status: u16, body: String) -> RemoteApiError {
    serde_json::from_str::<RemoteApiError>(&body)
        .unwrap_or(RemoteApiError { message: body, error: None, status, cause: Vec::new() })
}

type SharedRefresh = Shared<Pin<Box<dyn Future<Output = Result<TokenResponse, AuthError>> + Send>>>;

/// Process-wide coordinator for token refreshes.
///
/// Refresh tokens are single-use, so two concurrent refresh calls for the same seller
/// would invalidate each other. Refreshes are therefore single-flight per seller: the
/// first caller starts the refresh and every concurrent caller awaits the same shared
/// future and receives the same result. The in-flight entry is removed once the refresh
/// settles, whatever the outcome.
pub struct TokenAuthority {
    oauth: MeliOauth,
    in_flight: Mutex<HashMap<SellerId, SharedRefresh>>,
}

impl TokenAuthority {
    pub fn new(oauth: MeliOauth) -> Self {
        Self { oauth, in_flight: Mutex::new(HashMap::new()) }
    }

    /// Refresh the token pair for `seller_id`, joining an in-flight refresh if one
    /// exists.
    pub async fn refresh(&self, seller_id: SellerId, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let (fut, leader) = {
            let mut guard = self.in_flight.lock().expect("refresh map poisoned");
            match guard.get(&seller_id) {
                Some(fut) => {
                    debug!("🔑️ Joining in-flight token refresh for seller {seller_id}");
                    (fut.clone(), false)
                },
                None => {
                    let oauth = self.oauth.clone();
                    let token = refresh_token.to_string();
                    let fut = async move { oauth.refresh_access_token(&token).await }.boxed().shared();
                    guard.insert(seller_id, fut.clone());
                    (fut, true)
                },
            }
        };
        let result = fut.await;
        if leader {
            // Only the caller that started the refresh removes the entry. Followers that
            // join between completion and removal still get the fresh result.
            self.in_flight.lock().expect("refresh map poisoned").remove(&seller_id);
        }
        result
    }
}
