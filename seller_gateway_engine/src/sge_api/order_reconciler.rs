//! Turning order notifications into local order records, exactly once.
//!
//! Notifications arrive at-least-once and in no particular order, so this flow is built
//! around idempotent creation: dedup by `(user, cart id)` for cart orders and by remote
//! order id membership otherwise, with the database's uniqueness constraints as the
//! backstop for concurrent duplicates. The record insert is deliberately the *last* step;
//! an abandoned reconciliation never leaves a partial write behind and is safe to rerun.

use log::*;
use meli_tools::{MeliResult, Notification, Order, OrderStatus};

use crate::{
    db_types::{NewLocalOrder, SaleChannel, User},
    sge_api::{auto_responder, errors::NotificationFlowError},
    traits::{MarketplaceOps, OrderStore, OrderStoreError},
};

/// Process one order notification for an authorized user.
pub async fn reconcile<B, M>(
    db: &B,
    api: &M,
    user: &User,
    notification: &Notification,
) -> Result<(), NotificationFlowError>
where
    B: OrderStore,
    M: MarketplaceOps,
{
    let order = match api.fetch_order_resource(&notification.resource).await? {
        MeliResult::Success(order) => order,
        MeliResult::Failure(e) => {
            warn!("📦️ Marketplace returned an error for {}: {e}", notification.resource);
            return Err(NotificationFlowError::Remote(e));
        },
    };

    // The auto response runs before the existence check: a redelivered notification for
    // an already-tracked order must still message the buyer if the first delivery could
    // not. The responder carries its own idempotence (the thread check).
    if order.status == OrderStatus::Paid && order.shipping.id.is_none() {
        auto_responder::maybe_send(api, user, &order).await;
    }

    let existing = match order.pack_id {
        Some(cart_id) => db.fetch_order_for_cart(user.id, cart_id).await?,
        None => db.fetch_order_containing_remote_id(user.id, order.id).await?,
    };
    if let Some(local) = existing {
        debug!("📦️ Order {} is already tracked locally as {}", order.id, local.id);
        return Ok(());
    }

    let remote_order_ids = expand_remote_ids(api, &order).await?;
    let sale_channel =
        SaleChannel::from_order_context(order.context.as_ref().and_then(|c| c.channel.as_deref()));
    let new_order = NewLocalOrder {
        user_id: user.id,
        is_cart_order: order.pack_id.is_some(),
        cart_id: order.pack_id,
        remote_order_ids,
        sale_channel,
    };
    match db.insert_order(new_order).await {
        Ok(local) => {
            info!("📦️ Created local order {} for remote order {}", local.id, order.id);
            Ok(())
        },
        Err(OrderStoreError::Duplicate) => {
            // A concurrent handler for a duplicate delivery beat us to the insert.
            info!("📦️ Remote order {} was created concurrently by another handler", order.id);
            Ok(())
        },
        Err(e) => Err(e.into()),
    }
}

/// The full set of remote order ids this record covers: the expanded pack membership for
/// cart orders, the order itself otherwise.
async fn expand_remote_ids<M: MarketplaceOps>(api: &M, order: &Order) -> Result<Vec<i64>, NotificationFlowError> {
    let Some(pack_id) = order.pack_id else {
        return Ok(vec![order.id]);
    };
    match api.fetch_pack(pack_id).await? {
        MeliResult::Success(pack) => Ok(pack.orders.iter().map(|o| o.id).collect()),
        MeliResult::Failure(e) => {
            warn!("📦️ Could not expand pack {pack_id}: {e}");
            Err(NotificationFlowError::Remote(e))
        },
    }
}
