//! `SqliteDatabase` is the concrete persistence backend for the seller gateway.
//! It implements the [`UserStore`] and [`OrderStore`] traits over a SQLite pool.

use std::fmt::Debug;

use sgw_common::{SellerId, UserId};
use sqlx::SqlitePool;

use super::db::{new_pool, orders, users};
use crate::{
    db_types::{AutoMessage, Credential, LocalOrder, NewLocalOrder, User},
    traits::{OrderStore, OrderStoreError, UserStore, UserStoreError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl UserStore for SqliteDatabase {
    async fn create_user(&self, email: &str) -> Result<User, UserStoreError> {
        let mut conn = self.pool.acquire().await.map_err(UserStoreError::from)?;
        users::insert_user(email, &mut *conn).await
    }

    async fn fetch_user_by_id(&self, id: UserId) -> Result<Option<User>, UserStoreError> {
        let mut conn = self.pool.acquire().await.map_err(UserStoreError::from)?;
        users::fetch_user_by_id(id, &mut *conn).await
    }

    async fn fetch_user_by_seller_id(&self, seller_id: SellerId) -> Result<Option<User>, UserStoreError> {
        let mut conn = self.pool.acquire().await.map_err(UserStoreError::from)?;
        users::fetch_user_by_seller_id(seller_id, &mut *conn).await
    }

    async fn save_credential(&self, id: UserId, credential: &Credential) -> Result<(), UserStoreError> {
        let mut conn = self.pool.acquire().await.map_err(UserStoreError::from)?;
        users::update_credential(id, credential, &mut *conn).await
    }

    async fn clear_credential(&self, id: UserId) -> Result<(), UserStoreError> {
        let mut conn = self.pool.acquire().await.map_err(UserStoreError::from)?;
        users::clear_credential(id, &mut *conn).await
    }

    async fn set_auto_message(&self, id: UserId, auto_message: &AutoMessage) -> Result<(), UserStoreError> {
        let mut conn = self.pool.acquire().await.map_err(UserStoreError::from)?;
        users::update_auto_message(id, auto_message, &mut *conn).await
    }
}

impl OrderStore for SqliteDatabase {
    async fn fetch_order_for_cart(&self, user_id: UserId, cart_id: i64) -> Result<Option<LocalOrder>, OrderStoreError> {
        let mut conn = self.pool.acquire().await.map_err(OrderStoreError::from)?;
        orders::fetch_order_for_cart(user_id, cart_id, &mut *conn).await
    }

    async fn fetch_order_containing_remote_id(
        &self,
        user_id: UserId,
        remote_order_id: i64,
    ) -> Result<Option<LocalOrder>, OrderStoreError> {
        let mut conn = self.pool.acquire().await.map_err(OrderStoreError::from)?;
        orders::fetch_order_containing_remote_id(user_id, remote_order_id, &mut *conn).await
    }

    async fn insert_order(&self, order: NewLocalOrder) -> Result<LocalOrder, OrderStoreError> {
        let mut tx = self.pool.begin().await.map_err(OrderStoreError::from)?;
        let inserted = orders::insert_order(order, &mut *tx).await?;
        tx.commit().await.map_err(OrderStoreError::from)?;
        Ok(inserted)
    }

    async fn fetch_orders_for_user(
        &self,
        user_id: UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LocalOrder>, OrderStoreError> {
        let mut conn = self.pool.acquire().await.map_err(OrderStoreError::from)?;
        orders::fetch_orders_for_user(user_id, limit, offset, &mut *conn).await
    }
}
