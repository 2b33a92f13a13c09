use std::future::Future;

use sgw_common::UserId;
use thiserror::Error;

use crate::db_types::{LocalOrder, NewLocalOrder};

#[derive(Debug, Error)]
pub enum OrderStoreError {
    #[error("Database error: {0}")]
    Database(String),
    /// A uniqueness constraint fired during insert: a record for the same cart or remote
    /// order id already exists. Under concurrent duplicate notifications this is the
    /// expected outcome for every handler but one.
    #[error("An order covering the same cart or remote order id already exists")]
    Duplicate,
    #[error("Order {0} not found")]
    NotFound(String),
}

impl From<sqlx::Error> for OrderStoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Duplicate,
            _ => Self::Database(e.to_string()),
        }
    }
}

/// Persistence of local order records and the dedup lookups the reconciler runs.
#[allow(async_fn_in_trait)]
pub trait OrderStore: Clone + Send + Sync {
    /// Look up the record for a cart order by `(user, cart_id)`.
    fn fetch_order_for_cart(
        &self,
        user_id: UserId,
        cart_id: i64,
    ) -> impl Future<Output = Result<Option<LocalOrder>, OrderStoreError>> + Send;

    /// Look up the record whose remote-id set contains the given remote order id.
    fn fetch_order_containing_remote_id(
        &self,
        user_id: UserId,
        remote_order_id: i64,
    ) -> impl Future<Output = Result<Option<LocalOrder>, OrderStoreError>> + Send;

    /// Insert a new record atomically (record plus its remote-id memberships).
    /// Returns [`OrderStoreError::Duplicate`] when a concurrent insert won the race.
    fn insert_order(
        &self,
        order: NewLocalOrder,
    ) -> impl Future<Output = Result<LocalOrder, OrderStoreError>> + Send;

    fn fetch_orders_for_user(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> impl Future<Output = Result<Vec<LocalOrder>, OrderStoreError>> + Send;
}
