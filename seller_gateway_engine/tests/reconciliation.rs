//! End-to-end tests for the webhook flow: a real SQLite store underneath, a scripted
//! marketplace on the other side.

use std::sync::Arc;

use futures_util::StreamExt;
use meli_tools::{
    data_objects::{
        Buyer,
        Message,
        MessageParty,
        MessageThread,
        Order,
        OrderContext,
        OrderItem,
        OrderItemRef,
        Pack,
        PackOrderRef,
        SellerRef,
        Shipping,
    },
    MeliApiError,
    MeliResult,
    Notification,
    NotificationTopic,
    OrderStatus,
    Session,
    TokenResponse,
};
use seller_gateway_engine::{
    cache::QuestionCache,
    db_types::{AutoMessage, Credential, User},
    events::EventBus,
    sge_api::order_reconciler,
    test_utils::{
        mocks::MockMarketplace,
        prepare_env::{prepare_test_db, random_db_path},
    },
    traits::{OrderStore, UserStore},
    vault::CredentialVault,
    NotificationFlowApi,
    SessionFactory,
    SqliteDatabase,
};
use sgw_common::SellerId;

#[derive(Clone)]
struct FixedSessionFactory(Arc<MockMarketplace>);

impl SessionFactory for FixedSessionFactory {
    type Api = Arc<MockMarketplace>;

    fn open_session(&self, _session: Session) -> Self::Api {
        Arc::clone(&self.0)
    }
}

const SELLER: i64 = 468424240;

fn test_vault() -> CredentialVault {
    CredentialVault::new([3u8; 32])
}

async fn linked_user(db: &SqliteDatabase, vault: &CredentialVault, auto_message: Option<&str>) -> User {
    let user = db.create_user("seller@example.com").await.unwrap();
    let credential = Credential {
        seller_id: Some(SellerId(SELLER)),
        access_cipher: Some(vault.encrypt("access-token").unwrap()),
        refresh_cipher: Some(vault.encrypt("refresh-token").unwrap()),
        token_expires_ms: Some(i64::MAX),
    };
    db.save_credential(user.id, &credential).await.unwrap();
    if let Some(message) = auto_message {
        db.set_auto_message(user.id, &AutoMessage { enabled: true, message: message.to_string() })
            .await
            .unwrap();
    }
    db.fetch_user_by_id(user.id).await.unwrap().unwrap()
}

fn order_notification(resource: &str) -> Notification {
    Notification {
        resource: resource.to_string(),
        user_id: SELLER,
        topic: NotificationTopic::Orders,
        application_id: Some(5503910054141466),
        attempts: Some(1),
        sent: None,
        received: None,
    }
}

fn paid_order(id: i64, pack_id: Option<i64>) -> Order {
    Order {
        id,
        status: OrderStatus::Paid,
        pack_id,
        shipping: Shipping { id: None },
        buyer: Buyer { id: 9, nickname: Some("COMPRADOR1".into()), first_name: Some("Ana".into()) },
        seller: SellerRef { id: SELLER },
        order_items: vec![OrderItem {
            item: OrderItemRef { id: "MLA1".into(), title: Some("Libro usado".into()) },
            quantity: 1,
            unit_price: 100.0,
        }],
        context: Some(OrderContext { channel: Some("marketplace".into()), site: Some("MLA".into()) }),
        date_created: None,
        total_amount: Some(100.0),
        currency_id: Some("ARS".into()),
    }
}

fn flow_api(
    db: SqliteDatabase,
    api: MockMarketplace,
    bus: Arc<EventBus>,
    cache: Arc<QuestionCache>,
) -> NotificationFlowApi<SqliteDatabase, FixedSessionFactory> {
    NotificationFlowApi::new(db, FixedSessionFactory(Arc::new(api)), test_vault(), bus, cache)
}

#[tokio::test]
async fn paid_unshipped_order_creates_one_record_and_one_message() {
    let db = prepare_test_db(&random_db_path()).await;
    let vault = test_vault();
    let user = linked_user(&db, &vault, Some("Hola @NOMBRE! Gracias por comprar @PRODUCTO.")).await;

    let mut api = MockMarketplace::new();
    api.expect_seller_id().return_const(SellerId(SELLER));
    api.expect_fetch_order_resource()
        .withf(|resource| resource == "/orders/123")
        .returning(|_| Ok(MeliResult::Success(paid_order(123, None))));
    api.expect_fetch_order_messages()
        .returning(|_| Ok(MeliResult::Success(MessageThread { messages: vec![] })));
    api.expect_send_order_message()
        .withf(|group, buyer, text| {
            *group == 123 && *buyer == 9 && text == "Hola Ana! Gracias por comprar Libro usado."
        })
        .times(1)
        .returning(|_, _, _| Ok(MeliResult::Success(serde_json::json!({}))));

    order_reconciler::reconcile(&db, &api, &user, &order_notification("/orders/123"))
        .await
        .unwrap();

    let order = db.fetch_order_containing_remote_id(user.id, 123).await.unwrap().unwrap();
    assert_eq!(order.remote_order_ids, vec![123]);
    assert!(order.cart_id.is_none());
    assert!(!order.is_cart_order);
}

#[tokio::test]
async fn redelivered_notification_creates_no_second_record_or_message() {
    let db = prepare_test_db(&random_db_path()).await;
    let vault = test_vault();
    let user = linked_user(&db, &vault, Some("Gracias @USUARIO")).await;

    // First delivery: empty thread, message goes out.
    let mut api = MockMarketplace::new();
    api.expect_seller_id().return_const(SellerId(SELLER));
    api.expect_fetch_order_resource()
        .returning(|_| Ok(MeliResult::Success(paid_order(123, None))));
    api.expect_fetch_order_messages()
        .returning(|_| Ok(MeliResult::Success(MessageThread { messages: vec![] })));
    api.expect_send_order_message().times(1).returning(|_, _, _| Ok(MeliResult::Success(serde_json::json!({}))));
    order_reconciler::reconcile(&db, &api, &user, &order_notification("/orders/123")).await.unwrap();

    // Redelivery: the thread now carries the seller's message, so the responder no-ops,
    // and the existing record short-circuits creation.
    let mut api = MockMarketplace::new();
    api.expect_seller_id().return_const(SellerId(SELLER));
    api.expect_fetch_order_resource()
        .returning(|_| Ok(MeliResult::Success(paid_order(123, None))));
    api.expect_fetch_order_messages().returning(|_| {
        Ok(MeliResult::Success(MessageThread {
            messages: vec![Message { from: MessageParty { user_id: SELLER }, to: None, text: Some("Gracias".into()) }],
        }))
    });
    api.expect_send_order_message().times(0);
    order_reconciler::reconcile(&db, &api, &user, &order_notification("/orders/123")).await.unwrap();

    let orders = db.fetch_orders_for_user(user.id, 10, 0).await.unwrap();
    assert_eq!(orders.len(), 1);
}

#[tokio::test]
async fn cart_orders_are_expanded_and_deduped_by_cart_id() {
    let db = prepare_test_db(&random_db_path()).await;
    let vault = test_vault();
    let user = linked_user(&db, &vault, None).await;

    let mut api = MockMarketplace::new();
    api.expect_seller_id().return_const(SellerId(SELLER));
    api.expect_fetch_order_resource()
        .returning(|_| Ok(MeliResult::Success(paid_order(201, Some(9000)))));
    api.expect_fetch_order_messages()
        .returning(|_| Ok(MeliResult::Success(MessageThread::default())));
    api.expect_fetch_pack().withf(|id| *id == 9000).times(1).returning(|_| {
        Ok(MeliResult::Success(Pack {
            id: 9000,
            orders: vec![PackOrderRef { id: 201 }, PackOrderRef { id: 202 }, PackOrderRef { id: 203 }],
        }))
    });
    order_reconciler::reconcile(&db, &api, &user, &order_notification("/orders/201")).await.unwrap();

    let order = db.fetch_order_for_cart(user.id, 9000).await.unwrap().unwrap();
    assert!(order.is_cart_order);
    assert_eq!(order.remote_order_ids, vec![201, 202, 203]);

    // A notification for a sibling order in the same pack must not create a second record.
    let mut api = MockMarketplace::new();
    api.expect_seller_id().return_const(SellerId(SELLER));
    api.expect_fetch_order_resource()
        .returning(|_| Ok(MeliResult::Success(paid_order(202, Some(9000)))));
    api.expect_fetch_order_messages()
        .returning(|_| Ok(MeliResult::Success(MessageThread::default())));
    api.expect_fetch_pack().times(0);
    order_reconciler::reconcile(&db, &api, &user, &order_notification("/orders/202")).await.unwrap();

    assert_eq!(db.fetch_orders_for_user(user.id, 10, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn marketplace_error_on_resource_fetch_aborts_without_mutation() {
    let db = prepare_test_db(&random_db_path()).await;
    let vault = test_vault();
    let user = linked_user(&db, &vault, None).await;

    let mut api = MockMarketplace::new();
    api.expect_seller_id().return_const(SellerId(SELLER));
    api.expect_fetch_order_resource().returning(|_| {
        Ok(MeliResult::Failure(meli_tools::RemoteApiError {
            message: "Order not found".into(),
            error: Some("not_found".into()),
            status: 404,
            cause: vec![],
        }))
    });

    let result = order_reconciler::reconcile(&db, &api, &user, &order_notification("/orders/404")).await;
    assert!(result.is_err());
    assert!(db.fetch_orders_for_user(user.id, 10, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn notifications_for_unknown_sellers_end_silently() {
    let db = prepare_test_db(&random_db_path()).await;
    let bus = Arc::new(EventBus::new());
    let cache = Arc::new(QuestionCache::default());
    // The marketplace must never be called: no expectations set.
    let api = MockMarketplace::new();
    let flow = flow_api(db, api, Arc::clone(&bus), cache);

    flow.handle_notification(order_notification("/orders/1")).await;
    // Nothing to assert beyond "did not panic / did not call the marketplace"
}

#[tokio::test]
async fn notifications_for_unlinked_users_end_silently() {
    let db = prepare_test_db(&random_db_path()).await;
    // User exists but carries no credential.
    let user = db.create_user("unlinked@example.com").await.unwrap();
    assert!(!user.credential.is_linked());

    let bus = Arc::new(EventBus::new());
    let cache = Arc::new(QuestionCache::default());
    let api = MockMarketplace::new();
    let flow = flow_api(db, api, Arc::clone(&bus), cache);

    flow.handle_notification(order_notification("/orders/1")).await;
}

#[tokio::test]
async fn question_notifications_invalidate_the_cache_and_publish() {
    let db = prepare_test_db(&random_db_path()).await;
    let vault = test_vault();
    let user = linked_user(&db, &vault, None).await;

    let bus = Arc::new(EventBus::new());
    let cache = Arc::new(QuestionCache::default());
    cache.put(
        user.id,
        seller_gateway_engine::sge_api::questions_api::QuestionsOverview {
            total: 1,
            limit: 25,
            offset: 0,
            results: vec![],
        },
    );

    let mut api = MockMarketplace::new();
    api.expect_take_refreshed_tokens().returning(|| None);
    let flow = flow_api(db, api, Arc::clone(&bus), Arc::clone(&cache));

    let mut stream = bus.subscribe(user.id);
    let notification = Notification {
        topic: NotificationTopic::Questions,
        resource: "/questions/5036111111".to_string(),
        ..order_notification("/questions/5036111111")
    };
    flow.handle_notification(notification).await;

    assert!(cache.get(user.id).is_none());
    let event = stream.next().await.unwrap();
    assert_eq!(event.topic, NotificationTopic::Questions);
    assert_eq!(event.resource, "/questions/5036111111");
}

#[tokio::test]
async fn events_are_published_even_when_the_handler_fails() {
    let db = prepare_test_db(&random_db_path()).await;
    let vault = test_vault();
    let user = linked_user(&db, &vault, None).await;

    let bus = Arc::new(EventBus::new());
    let cache = Arc::new(QuestionCache::default());
    let mut api = MockMarketplace::new();
    api.expect_seller_id().return_const(SellerId(SELLER));
    api.expect_fetch_order_resource()
        .returning(|_| Err(MeliApiError::Transport("connection reset".into())));
    api.expect_take_refreshed_tokens().returning(|| None);
    let flow = flow_api(db, api, Arc::clone(&bus), cache);

    let mut stream = bus.subscribe(user.id);
    flow.handle_notification(order_notification("/orders/123")).await;

    let event = stream.next().await.unwrap();
    assert_eq!(event.topic, NotificationTopic::Orders);
}

#[tokio::test]
async fn refreshed_tokens_are_persisted_after_the_handler() {
    let db = prepare_test_db(&random_db_path()).await;
    let vault = test_vault();
    let user = linked_user(&db, &vault, None).await;

    let bus = Arc::new(EventBus::new());
    let cache = Arc::new(QuestionCache::default());
    let mut api = MockMarketplace::new();
    api.expect_seller_id().return_const(SellerId(SELLER));
    api.expect_fetch_order_resource()
        .returning(|_| Ok(MeliResult::Success(paid_order(123, None))));
    api.expect_fetch_order_messages()
        .returning(|_| Ok(MeliResult::Success(MessageThread::default())));
    api.expect_take_refreshed_tokens().times(1).returning(|| {
        Some(TokenResponse {
            access_token: "fresh-access".into(),
            token_type: "Bearer".into(),
            expires_in: 21600,
            scope: None,
            user_id: SELLER,
            refresh_token: "fresh-refresh".into(),
        })
    });
    let flow = flow_api(db.clone(), api, Arc::clone(&bus), cache);

    flow.handle_notification(order_notification("/orders/123")).await;

    let updated = db.fetch_user_by_id(user.id).await.unwrap().unwrap();
    let access = vault.decrypt(updated.credential.access_cipher.as_deref().unwrap()).unwrap();
    let refresh = vault.decrypt(updated.credential.refresh_cipher.as_deref().unwrap()).unwrap();
    assert_eq!(access, "fresh-access");
    assert_eq!(refresh, "fresh-refresh");
    assert!(updated.credential.token_expires_ms.unwrap() > 0);
}

#[tokio::test]
async fn a_revoked_link_clears_the_stored_credential() {
    let db = prepare_test_db(&random_db_path()).await;
    let vault = test_vault();
    let user = linked_user(&db, &vault, None).await;

    let bus = Arc::new(EventBus::new());
    let cache = Arc::new(QuestionCache::default());
    let mut api = MockMarketplace::new();
    api.expect_seller_id().return_const(SellerId(SELLER));
    api.expect_fetch_order_resource().returning(|_| Err(MeliApiError::Unauthorized));
    api.expect_take_refreshed_tokens().returning(|| None);
    let flow = flow_api(db.clone(), api, Arc::clone(&bus), cache);

    flow.handle_notification(order_notification("/orders/123")).await;

    let updated = db.fetch_user_by_id(user.id).await.unwrap().unwrap();
    assert!(!updated.credential.is_linked());
    assert!(updated.credential.seller_id.is_none());
}
