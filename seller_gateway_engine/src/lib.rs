//! # Seller Gateway Engine
//!
//! Core logic for the seller gateway: everything between the HTTP boundary and the
//! marketplace API client.
//!
//! The library is divided into three main sections:
//! 1. Database management ([`mod@sqlite`] behind the [`traits`] seams). Backends
//!    implement `UserStore` and `OrderStore`; a SQLite implementation is provided. The
//!    uniqueness guarantees the reconciliation flow relies on live in the schema, not in
//!    read-then-write application code.
//! 2. The gateway API ([`mod@sge_api`]). The webhook notification flow (resolve seller →
//!    authorize → dispatch → publish), idempotent order reconciliation, the
//!    auto-responder, the questions view and the account-linking flow.
//! 3. Event fan-out ([`mod@events`]). A per-user channel registry that bridges webhook
//!    processing to long-lived subscriber connections (e.g. SSE). Best-effort,
//!    at-most-once: a subscriber that is not registered at publish time never sees the
//!    event.

pub mod cache;
pub mod db_types;
pub mod events;
pub mod sge_api;
mod sqlite;
pub mod traits;
pub mod vault;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use sge_api::{
    errors::{LinkError, NotificationFlowError, QuestionsApiError},
    linking_api::LinkingApi,
    notification_api::{MeliSessionFactory, NotificationFlowApi, SessionFactory},
    questions_api::QuestionsApi,
};
pub use sqlite::SqliteDatabase;
