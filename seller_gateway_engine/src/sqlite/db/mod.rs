//! # SQLite database methods
//!
//! "Low-level" SQLite interactions, written as simple functions that accept a
//! `&mut SqliteConnection`. Callers obtain a connection from a pool, or open a
//! transaction and pass `&mut *tx` when several statements must land atomically.

use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

pub mod orders;
pub mod users;

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}
