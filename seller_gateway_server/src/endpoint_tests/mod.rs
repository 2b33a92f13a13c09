use std::sync::Arc;

use actix_web::{test, web, App};
use meli_tools::{MeliApiFactory, MeliConfig, Notification, NotificationTopic};
use seller_gateway_engine::{
    cache::QuestionCache,
    events::EventBus,
    test_utils::prepare_env::{prepare_test_db, random_db_path},
    traits::NullMailer,
    vault::CredentialVault,
    LinkingApi,
    MeliSessionFactory,
    NotificationFlowApi,
    SqliteDatabase,
};

use crate::{
    config::AppUrls,
    helpers::WebhookJobs,
    routes::{health, marketplace_updates, MarketplaceWebhookRoute, OauthCallbackRoute},
};

struct TestState {
    bus: Arc<EventBus>,
    flow: NotificationFlowApi<SqliteDatabase, MeliSessionFactory>,
    linking: LinkingApi<SqliteDatabase>,
    jobs: WebhookJobs,
    urls: AppUrls,
}

impl TestState {
    async fn new() -> Self {
        let db = prepare_test_db(&random_db_path()).await;
        let vault = CredentialVault::new([9u8; 32]);
        let meli_factory = MeliApiFactory::new(&MeliConfig::default()).unwrap();
        let bus = Arc::new(EventBus::new());
        let cache = Arc::new(QuestionCache::default());
        let flow = NotificationFlowApi::new(
            db.clone(),
            MeliSessionFactory::new(meli_factory.clone()),
            vault.clone(),
            Arc::clone(&bus),
            cache,
        );
        let linking = LinkingApi::new(db.clone(), meli_factory.oauth(), vault, Arc::new(NullMailer), None);
        Self {
            bus,
            flow,
            linking,
            jobs: WebhookJobs::new(),
            urls: AppUrls { app_callback_url: "https://app.example.com/dashboard".to_string() },
        }
    }
}

macro_rules! test_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.flow.clone()))
                .app_data(web::Data::new($state.linking.clone()))
                .app_data(web::Data::from(Arc::clone(&$state.bus)))
                .app_data(web::Data::new($state.jobs.clone()))
                .app_data(web::Data::new($state.urls.clone()))
                .service(health)
                .service(marketplace_updates)
                .service(MarketplaceWebhookRoute::<SqliteDatabase>::new())
                .service(OauthCallbackRoute::<SqliteDatabase>::new()),
        )
        .await
    };
}

fn order_notification(seller: i64) -> Notification {
    Notification {
        resource: "/orders/123".to_string(),
        user_id: seller,
        topic: NotificationTopic::Orders,
        application_id: None,
        attempts: Some(1),
        sent: None,
        received: None,
    }
}

#[actix_web::test]
async fn health_check_works() {
    let state = TestState::new().await;
    let app = test_app!(state);
    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn webhook_is_acknowledged_with_200_before_processing() {
    let state = TestState::new().await;
    let app = test_app!(state);
    // Unknown seller: processing will end silently, but the ack must be a 200 either way.
    let req = test::TestRequest::post()
        .uri("/meli/notifications")
        .set_json(order_notification(999_999))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body: crate::data_objects::JsonResponse = test::read_body_json(resp).await;
    assert!(body.success);
    // Let the spawned processing task run to completion before the db goes away.
    assert!(state.jobs.wait_idle(std::time::Duration::from_secs(2)).await);
}

#[actix_web::test]
async fn malformed_webhook_payloads_are_rejected() {
    let state = TestState::new().await;
    let app = test_app!(state);
    let req = test::TestRequest::post()
        .uri("/meli/notifications")
        .insert_header(("content-type", "application/json"))
        .set_payload("{\"not\": \"a notification\"}")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[actix_web::test]
async fn updates_route_registers_a_subscriber_for_the_requested_user() {
    let state = TestState::new().await;
    let app = test_app!(state);
    let req = test::TestRequest::get().uri("/meli/updates?id=7").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
    assert_eq!(content_type, "text/event-stream");
    assert_eq!(state.bus.subscriber_count(sgw_common::UserId(7)), 1);
    // Dropping the response body ends the subscription.
    drop(resp);
    assert_eq!(state.bus.subscriber_count(sgw_common::UserId(7)), 0);
}

#[actix_web::test]
async fn oauth_errors_redirect_back_to_the_app() {
    let state = TestState::new().await;
    let app = test_app!(state);
    let req = test::TestRequest::get()
        .uri("/meli/oauth/callback?error=access_denied")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 302);
    let location = resp.headers().get("location").unwrap().to_str().unwrap();
    assert_eq!(location, "https://app.example.com/dashboard?error=access_denied");
}

#[actix_web::test]
async fn oauth_callback_without_code_is_a_bad_request() {
    let state = TestState::new().await;
    let app = test_app!(state);
    let req = test::TestRequest::get().uri("/meli/oauth/callback?state=1").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[actix_web::test]
async fn oauth_callback_with_a_bad_state_is_a_bad_request() {
    let state = TestState::new().await;
    let app = test_app!(state);
    let req = test::TestRequest::get()
        .uri("/meli/oauth/callback?code=TG-123&state=not-a-number")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
}
