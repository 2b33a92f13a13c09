use std::sync::Arc;

use meli_tools::{
    data_objects::{ItemSummary, MeliUser, MessageThread, Pack, QuestionFilters, QuestionsPage},
    MeliApi,
    MeliApiError,
    MeliResult,
    Order,
    TokenResponse,
};
use sgw_common::SellerId;

/// The marketplace operations the gateway flows need, abstracted so the flows can be
/// tested against a scripted marketplace.
///
/// [`MeliApi`] is the production implementation; each instance is bound to a single
/// seller session.
#[allow(async_fn_in_trait)]
pub trait MarketplaceOps: Send + Sync {
    fn seller_id(&self) -> SellerId;

    async fn fetch_order_resource(&self, resource: &str) -> Result<MeliResult<Order>, MeliApiError>;

    async fn fetch_pack(&self, pack_id: i64) -> Result<MeliResult<Pack>, MeliApiError>;

    async fn fetch_order_messages(&self, order_id: i64) -> Result<MeliResult<MessageThread>, MeliApiError>;

    async fn send_order_message(
        &self,
        msg_group_id: i64,
        buyer_id: i64,
        text: &str,
    ) -> Result<MeliResult<serde_json::Value>, MeliApiError>;

    async fn fetch_questions(&self, filters: &QuestionFilters) -> Result<MeliResult<QuestionsPage>, MeliApiError>;

    async fn fetch_item(&self, item_id: &str, attrs: &[&str]) -> Result<MeliResult<ItemSummary>, MeliApiError>;

    async fn fetch_user(&self, user_id: i64) -> Result<MeliResult<MeliUser>, MeliApiError>;

    /// Token pair from a mid-call refresh, handed over at most once so the caller can
    /// persist it.
    async fn take_refreshed_tokens(&self) -> Option<TokenResponse>;
}

impl MarketplaceOps for MeliApi {
    fn seller_id(&self) -> SellerId {
        MeliApi::seller_id(self)
    }

    async fn fetch_order_resource(&self, resource: &str) -> Result<MeliResult<Order>, MeliApiError> {
        self.get_order_resource(resource).await
    }

    async fn fetch_pack(&self, pack_id: i64) -> Result<MeliResult<Pack>, MeliApiError> {
        self.get_pack(pack_id).await
    }

    async fn fetch_order_messages(&self, order_id: i64) -> Result<MeliResult<MessageThread>, MeliApiError> {
        self.get_order_messages(order_id).await
    }

    async fn send_order_message(
        &self,
        msg_group_id: i64,
        buyer_id: i64,
        text: &str,
    ) -> Result<MeliResult<serde_json::Value>, MeliApiError> {
        self.send_message(msg_group_id, buyer_id, text).await
    }

    async fn fetch_questions(&self, filters: &QuestionFilters) -> Result<MeliResult<QuestionsPage>, MeliApiError> {
        self.get_questions(filters).await
    }

    async fn fetch_item(&self, item_id: &str, attrs: &[&str]) -> Result<MeliResult<ItemSummary>, MeliApiError> {
        self.get_item(item_id, attrs).await
    }

    async fn fetch_user(&self, user_id: i64) -> Result<MeliResult<MeliUser>, MeliApiError> {
        self.get_user_info(user_id).await
    }

    async fn take_refreshed_tokens(&self) -> Option<TokenResponse> {
        MeliApi::take_refreshed_tokens(self).await
    }
}

impl<M: MarketplaceOps> MarketplaceOps for Arc<M> {
    fn seller_id(&self) -> SellerId {
        (**self).seller_id()
    }

    async fn fetch_order_resource(&self, resource: &str) -> Result<MeliResult<Order>, MeliApiError> {
        (**self).fetch_order_resource(resource).await
    }

    async fn fetch_pack(&self, pack_id: i64) -> Result<MeliResult<Pack>, MeliApiError> {
        (**self).fetch_pack(pack_id).await
    }

    async fn fetch_order_messages(&self, order_id: i64) -> Result<MeliResult<MessageThread>, MeliApiError> {
        (**self).fetch_order_messages(order_id).await
    }

    async fn send_order_message(
        &self,
        msg_group_id: i64,
        buyer_id: i64,
        text: &str,
    ) -> Result<MeliResult<serde_json::Value>, MeliApiError> {
        (**self).send_order_message(msg_group_id, buyer_id, text).await
    }

    async fn fetch_questions(&self, filters: &QuestionFilters) -> Result<MeliResult<QuestionsPage>, MeliApiError> {
        (**self).fetch_questions(filters).await
    }

    async fn fetch_item(&self, item_id: &str, attrs: &[&str]) -> Result<MeliResult<ItemSummary>, MeliApiError> {
        (**self).fetch_item(item_id, attrs).await
    }

    async fn fetch_user(&self, user_id: i64) -> Result<MeliResult<MeliUser>, MeliApiError> {
        (**self).fetch_user(user_id).await
    }

    async fn take_refreshed_tokens(&self) -> Option<TokenResponse> {
        (**self).take_refreshed_tokens().await
    }
}
