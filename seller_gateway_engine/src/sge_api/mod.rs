//! The gateway's public API: webhook ingestion, reconciliation, auto-response,
//! questions, and account linking.

pub mod auto_responder;
pub mod errors;
pub mod linking_api;
pub mod notification_api;
pub mod order_reconciler;
pub mod questions_api;
