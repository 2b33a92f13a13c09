//! The account-linking flow: OAuth code exchange, credential encryption and storage.

use std::sync::Arc;

use chrono::Utc;
use log::*;
use meli_tools::{MeliOauth, MeliResult};
use sgw_common::{SellerId, UserId};

use crate::{
    db_types::{Credential, User},
    sge_api::errors::LinkError,
    traits::{MailMessage, Mailer, UserStore},
    vault::CredentialVault,
};

#[derive(Clone)]
pub struct LinkingApi<B: UserStore> {
    db: B,
    oauth: MeliOauth,
    vault: CredentialVault,
    mailer: Arc<dyn Mailer>,
    /// Address to notify when a seller links their account, if any.
    notify_to: Option<String>,
}

impl<B: UserStore> LinkingApi<B> {
    pub fn new(
        db: B,
        oauth: MeliOauth,
        vault: CredentialVault,
        mailer: Arc<dyn Mailer>,
        notify_to: Option<String>,
    ) -> Self {
        Self { db, oauth, vault, mailer, notify_to }
    }

    /// Exchange the authorization code delivered to the OAuth callback and store the
    /// encrypted token pair on the user. Overwrites any previous link.
    pub async fn link_account(&self, user_id: UserId, code: &str) -> Result<User, LinkError> {
        let Some(mut user) = self.db.fetch_user_by_id(user_id).await? else {
            return Err(LinkError::UserNotFound(user_id));
        };
        let tokens = match self.oauth.exchange_code(code).await? {
            MeliResult::Success(tokens) => tokens,
            MeliResult::Failure(e) => return Err(LinkError::CodeRejected(e)),
        };
        user.credential = Credential {
            seller_id: Some(SellerId(tokens.user_id)),
            access_cipher: Some(self.vault.encrypt(&tokens.access_token)?),
            refresh_cipher: Some(self.vault.encrypt(&tokens.refresh_token)?),
            token_expires_ms: Some(tokens.expires_at_ms(Utc::now())),
        };
        self.db.save_credential(user.id, &user.credential).await?;
        info!("🔗️ User {} linked marketplace seller {}", user.id, tokens.user_id);
        if let Some(to) = &self.notify_to {
            self.mailer.send(MailMessage {
                to: to.clone(),
                subject: "New marketplace link".to_string(),
                body: format!("User {} linked seller account {}", user.email, tokens.user_id),
            });
        }
        Ok(user)
    }
}
