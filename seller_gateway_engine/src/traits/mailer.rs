#[derive(Debug, Clone)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Fire-and-forget outbound mail. Implementations dispatch in the background and only
/// log failures; nothing in the gateway ever waits on a mail.
pub trait Mailer: Send + Sync {
    fn send(&self, message: MailMessage);
}

/// Drops every message on the floor (with a log line). Used when no mail transport is
/// configured.
pub struct NullMailer;

impl Mailer for NullMailer {
    fn send(&self, message: MailMessage) {
        log::info!("📧️ No mail transport configured; dropping mail to {} ({})", message.to, message.subject);
    }
}
