use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use meli_tools::MeliApiFactory;
use seller_gateway_engine::{
    cache::QuestionCache,
    events::EventBus,
    traits::Mailer,
    vault::CredentialVault,
    LinkingApi,
    MeliSessionFactory,
    NotificationFlowApi,
    SqliteDatabase,
};

use crate::{
    config::{AppUrls, ServerConfig},
    errors::ServerError,
    helpers::WebhookJobs,
    mailer::build_mailer,
    routes::{health, marketplace_updates, MarketplaceWebhookRoute, OauthCallbackRoute},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let jobs = WebhookJobs::new();
    let grace = config.shutdown_grace;
    let srv = create_server_instance(config, db, jobs.clone())?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    // The webhook ack-then-process contract means tasks may still be running after the
    // listener stops. Give them a bounded grace period, then abandon them; an abandoned
    // reconciliation is redelivered by the marketplace and is safe to reprocess.
    if jobs.wait_idle(grace).await {
        info!("📬️ All in-flight webhook jobs completed before shutdown");
    }
    result
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    jobs: WebhookJobs,
) -> Result<Server, ServerError> {
    let vault = CredentialVault::from_base64_key(config.vault_key.reveal())
        .map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
    let meli_factory =
        MeliApiFactory::new(&config.meli).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let mailer: Arc<dyn Mailer> = build_mailer(&config.mail)?;
    let bus = Arc::new(EventBus::new());
    let cache = Arc::new(QuestionCache::default());
    let urls = AppUrls::from_config(&config);
    let notify_to = config.mail.link_notify_to.clone();

    let flow_api = NotificationFlowApi::new(
        db.clone(),
        MeliSessionFactory::new(meli_factory.clone()),
        vault.clone(),
        Arc::clone(&bus),
        Arc::clone(&cache),
    );
    let linking_api = LinkingApi::new(db, meli_factory.oauth(), vault, mailer, notify_to);

    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("sgw::access_log"))
            .app_data(web::Data::new(flow_api.clone()))
            .app_data(web::Data::new(linking_api.clone()))
            .app_data(web::Data::from(Arc::clone(&bus)))
            .app_data(web::Data::new(jobs.clone()))
            .app_data(web::Data::new(urls.clone()))
            .service(health)
            .service(marketplace_updates)
            .service(MarketplaceWebhookRoute::<SqliteDatabase>::new())
            .service(OauthCallbackRoute::<SqliteDatabase>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
