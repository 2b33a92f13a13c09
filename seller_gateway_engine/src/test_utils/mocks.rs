use meli_tools::{
    data_objects::{ItemSummary, MeliUser, MessageThread, Order, Pack, QuestionFilters, QuestionsPage},
    MeliApiError,
    MeliResult,
    TokenResponse,
};
use mockall::mock;
use sgw_common::SellerId;

use crate::traits::MarketplaceOps;

mock! {
    pub Marketplace {}
    impl MarketplaceOps for Marketplace {
        fn seller_id(&self) -> SellerId;
        async fn fetch_order_resource(&self, resource: &str) -> Result<MeliResult<Order>, MeliApiError>;
        async fn fetch_pack(&self, pack_id: i64) -> Result<MeliResult<Pack>, MeliApiError>;
        async fn fetch_order_messages(&self, order_id: i64) -> Result<MeliResult<MessageThread>, MeliApiError>;
        async fn send_order_message(&self, msg_group_id: i64, buyer_id: i64, text: &str) -> Result<MeliResult<serde_json::Value>, MeliApiError>;
        async fn fetch_questions(&self, filters: &QuestionFilters) -> Result<MeliResult<QuestionsPage>, MeliApiError>;
        async fn fetch_item<'a>(&self, item_id: &str, attrs: &[&'a str]) -> Result<MeliResult<ItemSummary>, MeliApiError>;
        async fn fetch_user(&self, user_id: i64) -> Result<MeliResult<MeliUser>, MeliApiError>;
        async fn take_refreshed_tokens(&self) -> Option<TokenResponse>;
    }
}
