//! The seams between the gateway flows and their collaborators.
//!
//! Backends implement [`UserStore`] and [`OrderStore`]; the webhook flow talks to the
//! marketplace through [`MarketplaceOps`] so that reconciliation logic can be exercised
//! without a network; [`Mailer`] is the fire-and-forget outbound mail contract.

mod mailer;
mod marketplace;
mod order_store;
mod user_store;

pub use mailer::{MailMessage, Mailer, NullMailer};
pub use marketplace::MarketplaceOps;
pub use order_store::{OrderStore, OrderStoreError};
pub use user_store::{UserStore, UserStoreError};

/// Convenience bound for backends that persist both users and orders (the common case:
/// one database implements everything).
pub trait GatewayDatabase: UserStore + OrderStore {}

impl<T> GatewayDatabase for T where T: UserStore + OrderStore {}
