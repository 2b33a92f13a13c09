use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{FromRow, SqliteConnection};
use sgw_common::UserId;
use uuid::Uuid;

use crate::{
    db_types::{InvoiceStatus, LocalOrder, NewLocalOrder, SaleChannel, SearchStatus},
    traits::OrderStoreError,
};

#[derive(Debug, FromRow)]
struct OrderRow {
    id: String,
    user_id: i64,
    is_cart_order: bool,
    cart_id: Option<i64>,
    invoice_status: InvoiceStatus,
    search_status: SearchStatus,
    sale_channel: SaleChannel,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, remote_order_ids: Vec<i64>) -> LocalOrder {
        LocalOrder {
            id: self.id,
            user_id: UserId(self.user_id),
            is_cart_order: self.is_cart_order,
            cart_id: self.cart_id,
            remote_order_ids,
            invoice_status: self.invoice_status,
            search_status: self.search_status,
            sale_channel: self.sale_channel,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Insert a new order record together with its remote-id memberships. Run inside a
/// transaction so a crash can never leave memberships without a record or vice versa.
/// Uniqueness violations (concurrent duplicate create) map to
/// [`OrderStoreError::Duplicate`].
pub async fn insert_order(order: NewLocalOrder, conn: &mut SqliteConnection) -> Result<LocalOrder, OrderStoreError> {
    let id = Uuid::new_v4().to_string();
    let row: OrderRow = sqlx::query_as(
        r#"
            INSERT INTO local_orders (id, user_id, is_cart_order, cart_id, sale_channel)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
        "#,
    )
    .bind(&id)
    .bind(order.user_id.value())
    .bind(order.is_cart_order)
    .bind(order.cart_id)
    .bind(order.sale_channel)
    .fetch_one(&mut *conn)
    .await?;
    for remote_id in &order.remote_order_ids {
        sqlx::query("INSERT INTO local_order_remote_ids (order_id, user_id, remote_order_id) VALUES ($1, $2, $3)")
            .bind(&id)
            .bind(order.user_id.value())
            .bind(remote_id)
            .execute(&mut *conn)
            .await?;
    }
    debug!("📝️ Local order [{id}] inserted covering {} remote order(s)", order.remote_order_ids.len());
    Ok(row.into_order(order.remote_order_ids))
}

pub async fn fetch_order_for_cart(
    user_id: UserId,
    cart_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<LocalOrder>, OrderStoreError> {
    let row: Option<OrderRow> = sqlx::query_as("SELECT * FROM local_orders WHERE user_id = $1 AND cart_id = $2")
        .bind(user_id.value())
        .bind(cart_id)
        .fetch_optional(&mut *conn)
        .await?;
    attach_remote_ids(row, conn).await
}

pub async fn fetch_order_containing_remote_id(
    user_id: UserId,
    remote_order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<LocalOrder>, OrderStoreError> {
    let row: Option<OrderRow> = sqlx::query_as(
        r#"
            SELECT o.* FROM local_orders o
            JOIN local_order_remote_ids r ON r.order_id = o.id
            WHERE r.user_id = $1 AND r.remote_order_id = $2
        "#,
    )
    .bind(user_id.value())
    .bind(remote_order_id)
    .fetch_optional(&mut *conn)
    .await?;
    attach_remote_ids(row, conn).await
}

pub async fn fetch_orders_for_user(
    user_id: UserId,
    limit: i64,
    offset: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<LocalOrder>, OrderStoreError> {
    let rows: Vec<OrderRow> = sqlx::query_as(
        "SELECT * FROM local_orders WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id.value())
    .bind(limit)
    .bind(offset)
    .fetch_all(&mut *conn)
    .await?;
    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        let remote_ids = fetch_remote_ids(&row.id, conn).await?;
        orders.push(row.into_order(remote_ids));
    }
    Ok(orders)
}

async fn attach_remote_ids(
    row: Option<OrderRow>,
    conn: &mut SqliteConnection,
) -> Result<Option<LocalOrder>, OrderStoreError> {
    match row {
        Some(row) => {
            let remote_ids = fetch_remote_ids(&row.id, conn).await?;
            Ok(Some(row.into_order(remote_ids)))
        },
        None => Ok(None),
    }
}

async fn fetch_remote_ids(order_id: &str, conn: &mut SqliteConnection) -> Result<Vec<i64>, OrderStoreError> {
    let ids: Vec<(i64,)> =
        sqlx::query_as("SELECT remote_order_id FROM local_order_remote_ids WHERE order_id = $1 ORDER BY remote_order_id")
            .bind(order_id)
            .fetch_all(conn)
            .await?;
    Ok(ids.into_iter().map(|(id,)| id).collect())
}
