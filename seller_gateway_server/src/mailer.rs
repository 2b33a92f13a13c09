//! Outbound mail. Fire-and-forget by contract: sends happen on a background task and
//! failures are logged, never surfaced.

use std::sync::Arc;

use lettre::{message::Mailbox, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::*;
use seller_gateway_engine::traits::{MailMessage, Mailer, NullMailer};

use crate::{config::MailConfig, errors::ServerError};

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(smtp_url: &str, from: &str) -> Result<Self, ServerError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::from_url(smtp_url)
            .map_err(|e| ServerError::ConfigurationError(format!("Invalid SGW_SMTP_URL: {e}")))?
            .build();
        let from = from
            .parse::<Mailbox>()
            .map_err(|e| ServerError::ConfigurationError(format!("Invalid SGW_MAIL_FROM: {e}")))?;
        Ok(Self { transport, from })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, message: MailMessage) {
        let transport = self.transport.clone();
        let from = self.from.clone();
        tokio::spawn(async move {
            let to = match message.to.parse::<Mailbox>() {
                Ok(to) => to,
                Err(e) => {
                    warn!("📧️ Invalid recipient address {}: {e}", message.to);
                    return;
                },
            };
            let email = match Message::builder().from(from).to(to).subject(&message.subject).body(message.body) {
                Ok(email) => email,
                Err(e) => {
                    warn!("📧️ Could not build mail ({}): {e}", message.subject);
                    return;
                },
            };
            match transport.send(email).await {
                Ok(_) => debug!("📧️ Mail sent to {} ({})", message.to, message.subject),
                Err(e) => warn!("📧️ Could not send mail to {}: {e}", message.to),
            }
        });
    }
}

/// Build the configured mailer, falling back to the null mailer when SMTP is not set up.
pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>, ServerError> {
    match (&config.smtp_url, &config.from) {
        (Some(url), Some(from)) => {
            info!("📧️ Outbound mail configured via SMTP");
            Ok(Arc::new(SmtpMailer::new(url, from)?))
        },
        (Some(_), None) => Err(ServerError::ConfigurationError(
            "SGW_SMTP_URL is set but SGW_MAIL_FROM is not".to_string(),
        )),
        _ => Ok(Arc::new(NullMailer)),
    }
}
