//! The webhook ingestion flow.
//!
//! A notification moves through a short pipeline: resolve the owning local user from the
//! remote seller id, decrypt their stored credential into an ephemeral session, dispatch
//! by topic, and finally publish a "something changed" event to the user's live
//! connections. The HTTP boundary has already acknowledged the notification with a 200
//! before any of this runs, so nothing here ever propagates back to the marketplace --
//! failures are logged and the flow ends early.

use std::sync::Arc;

use chrono::Utc;
use log::*;
use meli_tools::{MeliApiFactory, Notification, NotificationTopic, Session, TokenResponse};
use sgw_common::SellerId;

use crate::{
    cache::QuestionCache,
    db_types::{Credential, User},
    events::{EventBus, MarketplaceEvent},
    sge_api::{errors::NotificationFlowError, order_reconciler},
    traits::{GatewayDatabase, MarketplaceOps},
    vault::CredentialVault,
};

/// Creates a per-call marketplace client from a decrypted session. A seam so the flow
/// can be driven against a scripted marketplace in tests.
pub trait SessionFactory: Send + Sync {
    type Api: MarketplaceOps;

    fn open_session(&self, session: Session) -> Self::Api;
}

/// Production factory: builds [`meli_tools::MeliApi`] clients over the shared connection
/// pool and refresh coordinator.
#[derive(Clone)]
pub struct MeliSessionFactory {
    factory: MeliApiFactory,
}

impl MeliSessionFactory {
    pub fn new(factory: MeliApiFactory) -> Self {
        Self { factory }
    }
}

impl SessionFactory for MeliSessionFactory {
    type Api = meli_tools::MeliApi;

    fn open_session(&self, session: Session) -> Self::Api {
        self.factory.session(session)
    }
}

/// The webhook notification flow.
#[derive(Clone)]
pub struct NotificationFlowApi<B, F>
where
    B: GatewayDatabase,
    F: SessionFactory + Clone,
{
    db: B,
    sessions: F,
    vault: CredentialVault,
    bus: Arc<EventBus>,
    cache: Arc<QuestionCache>,
}

impl<B, F> NotificationFlowApi<B, F>
where
    B: GatewayDatabase,
    F: SessionFactory + Clone,
{
    pub fn new(db: B, sessions: F, vault: CredentialVault, bus: Arc<EventBus>, cache: Arc<QuestionCache>) -> Self {
        Self { db, sessions, vault, bus, cache }
    }

    /// Entry point for an acknowledged webhook notification. Never fails outward.
    pub async fn handle_notification(&self, notification: Notification) {
        if let Err(e) = self.process(&notification).await {
            warn!(
                "📬️ Notification for seller {} ({}, {}) failed: {e}",
                notification.user_id, notification.topic, notification.resource
            );
        }
    }

    async fn process(&self, notification: &Notification) -> Result<(), NotificationFlowError> {
        let seller_id = SellerId(notification.user_id);
        let Some(user) = self.db.fetch_user_by_seller_id(seller_id).await? else {
            // Unknown or unlinked sellers are not errors; the marketplace fans
            // notifications out to every app installation.
            debug!("📬️ No local user for seller {seller_id}, ignoring notification");
            return Ok(());
        };
        if !user.credential.is_linked() {
            debug!("📬️ User {} has no stored credential, ignoring notification", user.id);
            return Ok(());
        }
        let session = self.decrypt_session(&user)?;
        let api = self.sessions.open_session(session);

        let outcome = match notification.topic {
            NotificationTopic::Orders => {
                order_reconciler::reconcile(&self.db, &api, &user, notification).await
            },
            NotificationTopic::Questions => {
                self.cache.invalidate(user.id);
                Ok(())
            },
            other => {
                trace!("📬️ Ignoring notification with topic {other}");
                return Ok(());
            },
        };

        // Finally semantics from here: the live UI learns that *something* changed for
        // this user even when the handler failed, and any tokens refreshed mid-call are
        // persisted so the next webhook starts from the fresh pair.
        self.bus.publish(user.id, MarketplaceEvent::from_notification(user.id, notification));
        if let Some(tokens) = api.take_refreshed_tokens().await {
            self.persist_refreshed_tokens(&user, tokens).await;
        }
        if let Err(e) = &outcome {
            if e.is_link_revoked() {
                warn!("📬️ Marketplace revoked the link for user {}; clearing stored credential", user.id);
                if let Err(clear_err) = self.db.clear_credential(user.id).await {
                    error!("📬️ Could not clear credential for user {}: {clear_err}", user.id);
                }
            }
        }
        outcome
    }

    fn decrypt_session(&self, user: &User) -> Result<Session, NotificationFlowError> {
        // is_linked() was checked by the caller; missing ciphers here mean a torn write
        // and surface as a vault error on the empty string rather than a panic.
        let access_cipher = user.credential.access_cipher.as_deref().unwrap_or_default();
        let refresh_cipher = user.credential.refresh_cipher.as_deref().unwrap_or_default();
        let access_token = self.vault.decrypt(access_cipher)?;
        let refresh_token = self.vault.decrypt(refresh_cipher)?;
        let seller_id = user.credential.seller_id.unwrap_or(SellerId(0));
        let mut session = Session::new(access_token, refresh_token, seller_id);
        if let Some(expires_at) = user.credential.token_expires_ms {
            session = session.with_expiry(expires_at);
        }
        Ok(session)
    }

    async fn persist_refreshed_tokens(&self, user: &User, tokens: TokenResponse) {
        let encrypted = self
            .vault
            .encrypt(&tokens.access_token)
            .and_then(|access| self.vault.encrypt(&tokens.refresh_token).map(|refresh| (access, refresh)));
        let (access_cipher, refresh_cipher) = match encrypted {
            Ok(pair) => pair,
            Err(e) => {
                error!("📬️ Could not encrypt refreshed tokens for user {}: {e}", user.id);
                return;
            },
        };
        let credential = Credential {
            seller_id: Some(SellerId(tokens.user_id)),
            access_cipher: Some(access_cipher),
            refresh_cipher: Some(refresh_cipher),
            token_expires_ms: Some(tokens.expires_at_ms(Utc::now())),
        };
        match self.db.save_credential(user.id, &credential).await {
            Ok(()) => debug!("📬️ Persisted refreshed tokens for user {}", user.id),
            Err(e) => error!("📬️ Could not persist refreshed tokens for user {}: {e}", user.id),
        }
    }
}
