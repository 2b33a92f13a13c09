use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sgw_common::{SellerId, UserId};
use sqlx::Type;

//--------------------------------------     Credential     ---------------------------------------

/// A seller's stored marketplace link: both token ciphers, the access-token expiry, and
/// the remote seller id.
///
/// Link state is atomic: either both ciphers are present (linked) or both are absent.
/// Created on OAuth code exchange, mutated on every refresh, cleared when a refresh is
/// irrecoverably rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub seller_id: Option<SellerId>,
    pub access_cipher: Option<String>,
    pub refresh_cipher: Option<String>,
    pub token_expires_ms: Option<i64>,
}

impl Credential {
    pub fn is_linked(&self) -> bool {
        self.access_cipher.is_some() && self.refresh_cipher.is_some()
    }

    /// True when the access token has expired at the given instant. An absent expiry
    /// counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.token_expires_ms {
            Some(expires_at) => now.timestamp_millis() >= expires_at,
            None => true,
        }
    }

    pub fn clear(&mut self) {
        self.access_cipher = None;
        self.refresh_cipher = None;
        self.token_expires_ms = None;
        self.seller_id = None;
    }
}

//--------------------------------------     AutoMessage     --------------------------------------

/// The seller-configured post-sale auto response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoMessage {
    pub enabled: bool,
    pub message: String,
}

//--------------------------------------     User     ---------------------------------------------

#[derive(Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub credential: Credential,
    pub auto_message: AutoMessage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     Order enums     --------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Emitted,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Pending,
    NotFound,
    Found,
    Delivered,
}

/// Where a sale originated. Marketplace orders carry a channel in their context field;
/// `Local` and `Shop` orders are entered by hand and never touch the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SaleChannel {
    #[sqlx(rename = "mercadolibre")]
    #[serde(rename = "mercadolibre")]
    MercadoLibre,
    #[sqlx(rename = "mercadoshops")]
    #[serde(rename = "mercadoshops")]
    MercadoShops,
    Local,
    Shop,
}

impl SaleChannel {
    /// Map the channel string from an order's context field. Orders without a context
    /// default to the main marketplace channel.
    pub fn from_order_context(channel: Option<&str>) -> Self {
        match channel {
            Some("mshops") => Self::MercadoShops,
            _ => Self::MercadoLibre,
        }
    }
}

//--------------------------------------     LocalOrder     ---------------------------------------

/// A new local order record, as assembled by the reconciler. The id and timestamps are
/// assigned on insert.
#[derive(Debug, Clone)]
pub struct NewLocalOrder {
    pub user_id: UserId,
    pub is_cart_order: bool,
    pub cart_id: Option<i64>,
    /// Every remote order id covered by this record: the full pack membership for cart
    /// orders, a singleton otherwise.
    pub remote_order_ids: Vec<i64>,
    pub sale_channel: SaleChannel,
}

/// The gateway's own record of a sale.
///
/// Uniqueness invariants (enforced in the schema): at most one record per
/// `(user, cart_id)` when a cart id is present, and a given `(user, remote order id)`
/// appears in at most one record. Records are created exactly once and never merged by
/// later duplicate notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalOrder {
    pub id: String,
    pub user_id: UserId,
    pub is_cart_order: bool,
    pub cart_id: Option<i64>,
    pub remote_order_ids: Vec<i64>,
    pub invoice_status: InvoiceStatus,
    pub search_status: SearchStatus,
    pub sale_channel: SaleChannel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
