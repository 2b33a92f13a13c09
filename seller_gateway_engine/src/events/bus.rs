//! Per-user event fan-out.
//!
//! The bus keeps a concurrent multi-map of `user id -> live subscriber channels`.
//! Publishing is synchronous and best-effort: every channel registered at publish time
//! gets the event, nobody else ever does, and a subscriber that cannot keep up loses
//! events rather than blocking the publisher. There is no replay.

use std::{
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use dashmap::DashMap;
use futures_util::Stream;
use log::*;
use sgw_common::UserId;
use tokio::sync::mpsc;

use crate::events::MarketplaceEvent;

/// Events a single subscriber may have in flight before the bus starts dropping for
/// them. Live UIs only use events as a "go refetch" nudge, so a shallow buffer is fine.
const SUBSCRIBER_BUFFER: usize = 16;

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<MarketplaceEvent>,
}

/// The per-process event fan-out registry.
#[derive(Default)]
pub struct EventBus {
    channels: DashMap<UserId, Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscription for `user_id`. Multiple concurrent subscriptions per
    /// user are fine (multi-device); each receives every publish. The subscription
    /// unregisters itself when the returned stream is dropped.
    pub fn subscribe(self: &Arc<Self>, user_id: UserId) -> EventStream {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.channels.entry(user_id).or_default().push(Subscriber { id, sender });
        debug!("📡️ Subscriber {id} registered for user {user_id}");
        EventStream { bus: Arc::clone(self), user_id, id, receiver }
    }

    /// Fan an event out to every live subscription for the user. Publishing to a user
    /// with no subscribers is a no-op. Never blocks: a full subscriber buffer drops the
    /// event for that subscriber only.
    pub fn publish(&self, user_id: UserId, event: MarketplaceEvent) {
        let Some(mut subscribers) = self.channels.get_mut(&user_id) else {
            trace!("📡️ No subscribers for user {user_id}, dropping event");
            return;
        };
        subscribers.retain(|s| !s.sender.is_closed());
        for subscriber in subscribers.iter() {
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => {},
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        "📡️ Subscriber {} for user {user_id} is not keeping up; dropping event",
                        subscriber.id
                    );
                },
                Err(mpsc::error::TrySendError::Closed(_)) => {},
            }
        }
    }

    pub fn subscriber_count(&self, user_id: UserId) -> usize {
        self.channels.get(&user_id).map(|subs| subs.len()).unwrap_or(0)
    }

    fn unsubscribe(&self, user_id: UserId, id: u64) {
        if let Some(mut subscribers) = self.channels.get_mut(&user_id) {
            subscribers.retain(|s| s.id != id);
            if subscribers.is_empty() {
                drop(subscribers);
                self.channels.remove_if(&user_id, |_, subs| subs.is_empty());
            }
        }
        debug!("📡️ Subscriber {id} unregistered for user {user_id}");
    }
}

/// A live event subscription. Ends when dropped (disconnect) or when the process shuts
/// down; missed events are not replayed on reconnect.
pub struct EventStream {
    bus: Arc<EventBus>,
    user_id: UserId,
    id: u64,
    receiver: mpsc::Receiver<MarketplaceEvent>,
}

impl Stream for EventStream {
    type Item = MarketplaceEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.user_id, self.id);
    }
}
