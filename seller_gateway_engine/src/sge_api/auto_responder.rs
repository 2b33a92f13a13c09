//! The seller-configured post-sale auto response.
//!
//! Sent when a paid order has no shipment yet. Idempotence lives here, not in the
//! caller: before sending, the order's message thread is checked and the send is skipped
//! if the seller already wrote anything. That check is the *only* dedup signal, and it is
//! what makes redelivered notifications safe.

use log::*;
use meli_tools::{MeliResult, Order};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{db_types::User, traits::MarketplaceOps};

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:(?:https?|ftp|file)://|www\.|ftp\.)(?:\([-A-Z0-9+&@#/%=~_|$?!:,.]*\)|[-A-Z0-9+&@#/%=~_|$?!:,.])*(?:\([-A-Z0-9+&@#/%=~_|$?!:,.]*\)|[A-Z0-9+&@#/%=~_|$])",
    )
    .expect("url regex is valid")
});

/// Send the seller's auto message for this order, unless it is disabled, empty, or the
/// seller has already messaged the buyer. Failures are logged and swallowed; the
/// enclosing reconciliation must not be aborted by messaging trouble.
pub async fn maybe_send<M: MarketplaceOps>(api: &M, user: &User, order: &Order) {
    if !user.auto_message.enabled || user.auto_message.message.is_empty() {
        return;
    }
    let thread = match api.fetch_order_messages(order.id).await {
        Ok(MeliResult::Success(thread)) => thread,
        Ok(MeliResult::Failure(e)) => {
            warn!("💬️ Could not fetch message thread for order {}: {e}", order.id);
            return;
        },
        Err(e) => {
            warn!("💬️ Could not fetch message thread for order {}: {e}", order.id);
            return;
        },
    };
    let seller_id = api.seller_id();
    if thread.messages.iter().any(|m| m.from.user_id == seller_id.value()) {
        debug!("💬️ Seller already messaged buyer for order {}, skipping auto response", order.id);
        return;
    }
    let text = render_auto_message(&user.auto_message.message, order);
    match api.send_order_message(order.id, order.buyer.id, &text).await {
        Ok(MeliResult::Success(_)) => {
            info!("💬️ Auto response sent for order {}", order.id);
        },
        Ok(MeliResult::Failure(e)) => {
            warn!("💬️ Marketplace rejected the auto response for order {}: {e}", order.id);
        },
        Err(e) => {
            warn!("💬️ Could not send auto response for order {}: {e}", order.id);
        },
    }
}

/// Substitute the template placeholders with order data (empty string when the data is
/// missing) and wrap any bare URLs in anchor tags.
pub fn render_auto_message(template: &str, order: &Order) -> String {
    let nickname = order.buyer.nickname.as_deref().unwrap_or("");
    let first_name = order.buyer.first_name.as_deref().unwrap_or("");
    let product =
        order.order_items.first().and_then(|item| item.item.title.as_deref()).unwrap_or("");
    let message = template
        .replacen("@USUARIO", nickname, 1)
        .replacen("@NOMBRE", first_name, 1)
        .replacen("@PRODUCTO", product, 1);
    linkify(&message)
}

fn linkify(text: &str) -> String {
    URL_RE.replace_all(text, |caps: &regex::Captures<'_>| {
        let link = &caps[0];
        format!("<a href=\"{link}\">{link}</a>")
    })
    .into_owned()
}
