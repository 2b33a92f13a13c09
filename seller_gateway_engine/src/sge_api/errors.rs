use meli_tools::{MeliApiError, RemoteApiError};
use sgw_common::UserId;
use thiserror::Error;

use crate::{
    traits::{OrderStoreError, UserStoreError},
    vault::VaultError,
};

/// Failures inside the webhook processing flow. These never travel back to the
/// marketplace (the notification was acknowledged before processing began); the router
/// logs them and moves on.
#[derive(Debug, Error)]
pub enum NotificationFlowError {
    #[error("Marketplace call failed: {0}")]
    Api(#[from] MeliApiError),
    #[error("Marketplace reported an error for the notification resource: {0}")]
    Remote(RemoteApiError),
    #[error("Order storage failed: {0}")]
    OrderStore(#[from] OrderStoreError),
    #[error("User storage failed: {0}")]
    UserStore(#[from] UserStoreError),
    #[error("Stored credential could not be decrypted: {0}")]
    Vault(#[from] VaultError),
}

impl NotificationFlowError {
    /// True when the underlying cause is an authentication dead-end: the stored
    /// credential is no longer honoured and must be cleared.
    pub fn is_link_revoked(&self) -> bool {
        matches!(self, Self::Api(MeliApiError::Unauthorized))
    }
}

#[derive(Debug, Error)]
pub enum QuestionsApiError {
    #[error("Marketplace call failed: {0}")]
    Api(#[from] MeliApiError),
    #[error("Marketplace rejected the questions query: {0}")]
    Remote(RemoteApiError),
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("User {0} not found")]
    UserNotFound(UserId),
    #[error("The marketplace rejected the authorization code: {0}")]
    CodeRejected(RemoteApiError),
    #[error("Marketplace call failed: {0}")]
    Api(#[from] MeliApiError),
    #[error("Could not encrypt tokens: {0}")]
    Vault(#[from] VaultError),
    #[error("User storage failed: {0}")]
    Store(#[from] UserStoreError),
}
