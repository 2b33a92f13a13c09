use std::future::Future;

use sgw_common::{SellerId, UserId};
use thiserror::Error;

use crate::db_types::{AutoMessage, Credential, User};

#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("User {0} not found")]
    NotFound(UserId),
}

impl From<sqlx::Error> for UserStoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Persistence of local users and the marketplace credential embedded in each.
#[allow(async_fn_in_trait)]
pub trait UserStore: Clone + Send + Sync {
    fn create_user(&self, email: &str) -> impl Future<Output = Result<User, UserStoreError>> + Send;

    fn fetch_user_by_id(&self, id: UserId) -> impl Future<Output = Result<Option<User>, UserStoreError>> + Send;

    /// Resolve the local user that owns the given remote seller id. Unlinked sellers
    /// resolve to `None`; that is not an error.
    fn fetch_user_by_seller_id(
        &self,
        seller_id: SellerId,
    ) -> impl Future<Output = Result<Option<User>, UserStoreError>> + Send;

    /// Replace the stored credential (both ciphers, expiry and seller id) for a user.
    fn save_credential(
        &self,
        id: UserId,
        credential: &Credential,
    ) -> impl Future<Output = Result<(), UserStoreError>> + Send;

    /// Drop the stored credential entirely. Called when the marketplace revokes the
    /// link; the user must re-link before the gateway touches the API on their behalf.
    fn clear_credential(&self, id: UserId) -> impl Future<Output = Result<(), UserStoreError>> + Send;

    fn set_auto_message(
        &self,
        id: UserId,
        auto_message: &AutoMessage,
    ) -> impl Future<Output = Result<(), UserStoreError>> + Send;
}
