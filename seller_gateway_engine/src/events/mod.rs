mod bus;
mod event_types;

pub use bus::{EventBus, EventStream};
pub use event_types::MarketplaceEvent;
