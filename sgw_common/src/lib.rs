mod ids;
mod secret;

pub use ids::{SellerId, UserId};
pub use secret::Secret;
