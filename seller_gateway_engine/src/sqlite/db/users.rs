use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{FromRow, SqliteConnection};
use sgw_common::{SellerId, UserId};

use crate::{
    db_types::{AutoMessage, Credential, User},
    traits::UserStoreError,
};

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    email: String,
    seller_id: Option<i64>,
    access_cipher: Option<String>,
    refresh_cipher: Option<String>,
    token_expires_ms: Option<i64>,
    auto_message_enabled: bool,
    auto_message_text: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId(row.id),
            email: row.email,
            credential: Credential {
                seller_id: row.seller_id.map(SellerId),
                access_cipher: row.access_cipher,
                refresh_cipher: row.refresh_cipher,
                token_expires_ms: row.token_expires_ms,
            },
            auto_message: AutoMessage { enabled: row.auto_message_enabled, message: row.auto_message_text },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub async fn insert_user(email: &str, conn: &mut SqliteConnection) -> Result<User, UserStoreError> {
    let row: UserRow = sqlx::query_as("INSERT INTO users (email) VALUES ($1) RETURNING *")
        .bind(email)
        .fetch_one(conn)
        .await?;
    debug!("📝️ User [{}] created with id {}", row.email, row.id);
    Ok(row.into())
}

pub async fn fetch_user_by_id(id: UserId, conn: &mut SqliteConnection) -> Result<Option<User>, UserStoreError> {
    let row: Option<UserRow> =
        sqlx::query_as("SELECT * FROM users WHERE id = $1").bind(id.value()).fetch_optional(conn).await?;
    Ok(row.map(User::from))
}

pub async fn fetch_user_by_seller_id(
    seller_id: SellerId,
    conn: &mut SqliteConnection,
) -> Result<Option<User>, UserStoreError> {
    let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE seller_id = $1")
        .bind(seller_id.value())
        .fetch_optional(conn)
        .await?;
    Ok(row.map(User::from))
}

pub async fn update_credential(
    id: UserId,
    credential: &Credential,
    conn: &mut SqliteConnection,
) -> Result<(), UserStoreError> {
    let result = sqlx::query(
        r#"
            UPDATE users SET
                seller_id = $1,
                access_cipher = $2,
                refresh_cipher = $3,
                token_expires_ms = $4,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $5
        "#,
    )
    .bind(credential.seller_id.map(|s| s.value()))
    .bind(credential.access_cipher.as_deref())
    .bind(credential.refresh_cipher.as_deref())
    .bind(credential.token_expires_ms)
    .bind(id.value())
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(UserStoreError::NotFound(id));
    }
    debug!("📝️ Credential updated for user {id}");
    Ok(())
}

pub async fn clear_credential(id: UserId, conn: &mut SqliteConnection) -> Result<(), UserStoreError> {
    let result = sqlx::query(
        r#"
            UPDATE users SET
                seller_id = NULL,
                access_cipher = NULL,
                refresh_cipher = NULL,
                token_expires_ms = NULL,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $1
        "#,
    )
    .bind(id.value())
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(UserStoreError::NotFound(id));
    }
    debug!("📝️ Credential cleared for user {id}");
    Ok(())
}

pub async fn update_auto_message(
    id: UserId,
    auto_message: &AutoMessage,
    conn: &mut SqliteConnection,
) -> Result<(), UserStoreError> {
    let result = sqlx::query(
        r#"
            UPDATE users SET
                auto_message_enabled = $1,
                auto_message_text = $2,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = $3
        "#,
    )
    .bind(auto_message.enabled)
    .bind(auto_message.message.as_str())
    .bind(id.value())
    .execute(conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(UserStoreError::NotFound(id));
    }
    Ok(())
}
