//! Wire types for the marketplace REST API.
//!
//! Only the fields the gateway actually reads are modelled; everything else in the
//! (large) marketplace payloads is ignored by serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

//--------------------------------------  Notifications  ------------------------------------------

/// Topics the marketplace pushes webhook notifications for. Topic strings outside the
/// closed set deserialize to [`NotificationTopic::Unrecognized`] and are ignored
/// downstream rather than rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTopic {
    #[serde(rename = "orders_v2")]
    Orders,
    Questions,
    Items,
    Payments,
    Messages,
    Shipments,
    Invoices,
    Claims,
    #[serde(other)]
    Unrecognized,
}

impl std::fmt::Display for NotificationTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Orders => "orders_v2",
            Self::Questions => "questions",
            Self::Items => "items",
            Self::Payments => "payments",
            Self::Messages => "messages",
            Self::Shipments => "shipments",
            Self::Invoices => "invoices",
            Self::Claims => "claims",
            Self::Unrecognized => "unrecognized",
        };
        f.write_str(s)
    }
}

/// A webhook notification as delivered by the marketplace. At-least-once delivery:
/// duplicates and out-of-order arrivals are normal and must be tolerated downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// URI of the changed resource, e.g. `/orders/2195160686`.
    pub resource: String,
    /// The remote seller id the notification belongs to (not a local user id).
    pub user_id: i64,
    pub topic: NotificationTopic,
    #[serde(default)]
    pub application_id: Option<i64>,
    #[serde(default)]
    pub attempts: Option<u32>,
    #[serde(default)]
    pub sent: Option<DateTime<Utc>>,
    #[serde(default)]
    pub received: Option<DateTime<Utc>>,
}

//--------------------------------------  OAuth  --------------------------------------------------

/// Response from the marketplace token endpoint, for both the authorization-code and
/// refresh-token grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
    /// The remote seller id the tokens belong to.
    pub user_id: i64,
    pub refresh_token: String,
}

impl TokenResponse {
    /// Absolute expiry in epoch milliseconds, computed against the given clock.
    pub fn expires_at_ms(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() + self.expires_in * 1000
    }
}

//--------------------------------------  Orders  -------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Confirmed,
    PaymentRequired,
    PaymentInProcess,
    Paid,
    Cancelled,
    Invalid,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Shipping {
    #[serde(default)]
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Buyer {
    pub id: i64,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerRef {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemRef {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub item: OrderItemRef,
    pub quantity: u32,
    pub unit_price: f64,
}

/// The channel/site context the marketplace attaches to an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderContext {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
}

/// A marketplace order resource, as fetched from a notification's `resource` URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub status: OrderStatus,
    /// Present when the order was placed as part of a cart (pack); the pack must be
    /// expanded to enumerate its member orders.
    #[serde(default)]
    pub pack_id: Option<i64>,
    #[serde(default)]
    pub shipping: Shipping,
    pub buyer: Buyer,
    pub seller: SellerRef,
    #[serde(default)]
    pub order_items: Vec<OrderItem>,
    #[serde(default)]
    pub context: Option<OrderContext>,
    #[serde(default)]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub currency_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paging {
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdersSearch {
    pub results: Vec<Order>,
    pub paging: Paging,
}

/// Scope selector for the order search endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderSearchScope {
    #[default]
    All,
    Recent,
    Pending,
    Archived,
}

impl OrderSearchScope {
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::All => "",
            Self::Recent => "/recent",
            Self::Pending => "/pending",
            Self::Archived => "/archived",
        }
    }
}

//--------------------------------------  Packs  --------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackOrderRef {
    pub id: i64,
}

/// A cart (pack) grouping of orders placed together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pack {
    pub id: i64,
    #[serde(default)]
    pub orders: Vec<PackOrderRef>,
}

//--------------------------------------  Messages  -----------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageParty {
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub from: MessageParty,
    #[serde(default)]
    pub to: Option<MessageParty>,
    #[serde(default)]
    pub text: Option<String>,
}

/// The post-sale message thread attached to an order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageThread {
    #[serde(default)]
    pub messages: Vec<Message>,
}

//--------------------------------------  Questions  ----------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionStatus {
    Unanswered,
    Answered,
    ClosedUnanswered,
    UnderReview,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unanswered => "UNANSWERED",
            Self::Answered => "ANSWERED",
            Self::ClosedUnanswered => "CLOSED_UNANSWERED",
            Self::UnderReview => "UNDER_REVIEW",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAnswer {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub date_created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionFrom {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub text: String,
    pub status: String,
    pub item_id: String,
    #[serde(default)]
    pub date_created: Option<DateTime<Utc>>,
    pub from: QuestionFrom,
    #[serde(default)]
    pub answer: Option<QuestionAnswer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionsPage {
    pub total: i64,
    pub limit: i64,
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// Filters for the questions search endpoint. Per the marketplace contract, `from` and
/// `item` must be passed together; the remaining filters combine freely.
#[derive(Debug, Clone, Default)]
pub struct QuestionFilters {
    pub status: Option<QuestionStatus>,
    pub from: Option<i64>,
    pub item: Option<String>,
    pub sort: Option<QuestionSort>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct QuestionSort {
    pub fields: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

//--------------------------------------  Items & users  ------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemAttribute {
    pub id: String,
    #[serde(default)]
    pub value_name: Option<String>,
}

/// A projected view of a listing. The marketplace returns only the attributes asked for,
/// hence almost everything is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub available_quantity: Option<i64>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub secure_thumbnail: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub attributes: Option<Vec<ItemAttribute>>,
    #[serde(default)]
    pub shipping: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Active,
    Paused,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAddress {
    #[serde(default)]
    pub city: Option<String>,
}

/// Public profile of a marketplace user (typically a buyer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeliUser {
    pub id: i64,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub address: Option<UserAddress>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSearch {
    #[serde(default)]
    pub results: Vec<String>,
    pub paging: Paging,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn notification_deserializes_from_webhook_payload() {
        let json = r#"{
            "resource": "/orders/2195160686",
            "user_id": 468424240,
            "topic": "orders_v2",
            "application_id": 5503910054141466,
            "attempts": 1,
            "sent": "2021-10-27T14:15:10.000Z",
            "received": "2021-10-27T14:15:10.000Z"
        }"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(n.topic, NotificationTopic::Orders);
        assert_eq!(n.user_id, 468424240);
        assert_eq!(n.resource, "/orders/2195160686");
        assert_eq!(n.attempts, Some(1));
    }

    #[test]
    fn unknown_topics_map_to_unrecognized() {
        let json = r#"{"resource": "/vis/leads", "user_id": 1, "topic": "vis_leads"}"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(n.topic, NotificationTopic::Unrecognized);
    }

    #[test]
    fn order_deserializes_with_null_shipping_and_pack() {
        let json = r#"{
            "id": 123,
            "status": "paid",
            "pack_id": null,
            "shipping": {"id": null},
            "buyer": {"id": 9, "nickname": "COMPRADOR1", "first_name": "Ana"},
            "seller": {"id": 468424240},
            "order_items": [{"item": {"id": "MLA1", "title": "Libro usado"}, "quantity": 1, "unit_price": 100.0}],
            "context": {"channel": "marketplace", "site": "MLA"}
        }"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(order.pack_id.is_none());
        assert!(order.shipping.id.is_none());
        assert_eq!(order.order_items[0].item.id, "MLA1");
        assert_eq!(order.context.unwrap().channel.as_deref(), Some("marketplace"));
    }

    #[test]
    fn unknown_order_status_is_tolerated() {
        let json = r#"{
            "id": 5,
            "status": "under_review",
            "buyer": {"id": 1},
            "seller": {"id": 2}
        }"#;
        let order: Order = serde_json::from_str(json).unwrap();
        assert_eq!(order.status, OrderStatus::Other);
    }
}
