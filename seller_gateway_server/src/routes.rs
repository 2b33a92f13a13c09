//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two
//! MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Since each worker thread processes its requests sequentially, handlers which block
//! the current thread stop that worker from taking new requests. Anything long and
//! non-cpu-bound (I/O, database, marketplace calls) must be awaited, never blocked on.

use actix_web::{get, web, HttpResponse, Responder};
use futures::StreamExt;
use log::*;
use meli_tools::Notification;
use seller_gateway_engine::{
    events::EventBus,
    traits::{GatewayDatabase, UserStore},
    LinkingApi,
    MeliSessionFactory,
    NotificationFlowApi,
};
use sgw_common::UserId;

use crate::{
    config::AppUrls,
    data_objects::{JsonResponse, OauthCallbackQuery, UpdatesQuery},
    errors::ServerError,
    helpers::{sse_frame, WebhookJobs},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal) => {
        paste::paste! { pub struct [<$name:camel Route>];}
        paste::paste! {
                impl [<$name:camel Route>] {
                #[allow(clippy::new_without_default)]
                pub fn new() -> Self { Self }
            }
        }
        paste::paste! {
            impl actix_web::dev::HttpServiceFactory for [<$name:camel Route>] {
                fn register(self, config: &mut actix_web::dev::AppService) {
                    let res = actix_web::Resource::new($path)
                        .name(stringify!($name))
                        .guard(actix_web::guard::$method())
                        .to($name);
                    actix_web::dev::HttpServiceFactory::register(res, config);
                }
            }
        }
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Webhook  ----------------------------------------------------

route!(marketplace_webhook => Post "/meli/notifications" impl GatewayDatabase);
/// The marketplace webhook entrypoint.
///
/// The notification is acknowledged with a 200 *immediately* and processed on a
/// background task: the marketplace redelivers on anything else, and processing
/// latency must not leak into ingestion latency. Whatever happens downstream, the
/// sender never sees it.
pub async fn marketplace_webhook<TGatewayDatabase>(
    body: web::Json<Notification>,
    flow: web::Data<NotificationFlowApi<TGatewayDatabase, MeliSessionFactory>>,
    jobs: web::Data<WebhookJobs>,
) -> HttpResponse
where
    TGatewayDatabase: GatewayDatabase + 'static,
{
    let notification = body.into_inner();
    debug!(
        "📬️ Received {} notification for seller {} ({})",
        notification.topic, notification.user_id, notification.resource
    );
    let guard = jobs.begin();
    let flow = flow.into_inner();
    tokio::spawn(async move {
        flow.handle_notification(notification).await;
        drop(guard);
    });
    HttpResponse::Ok().json(JsonResponse::success("ok"))
}

//----------------------------------------------   SSE updates  ------------------------------------------------

/// Bridge the engine's event bus to a server-sent-events stream. The subscription
/// unregisters itself when the client disconnects and the stream is dropped.
#[get("/meli/updates")]
pub async fn marketplace_updates(query: web::Query<UpdatesQuery>, bus: web::Data<EventBus>) -> HttpResponse {
    let user_id = UserId(query.id);
    debug!("📡️ New live-update subscription for user {user_id}");
    let stream = bus.into_inner().subscribe(user_id);
    let body = stream.map(|event| Ok::<_, actix_web::Error>(sse_frame(&event)));
    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(body)
}

//----------------------------------------------   OAuth callback  ---------------------------------------------

route!(oauth_callback => Get "/meli/oauth/callback" impl UserStore);
/// OAuth redirect target. `state` carries the local user id that started the linking
/// flow; `code` is exchanged and the encrypted token pair stored on that user.
pub async fn oauth_callback<TUserStore>(
    query: web::Query<OauthCallbackQuery>,
    linking: web::Data<LinkingApi<TUserStore>>,
    urls: web::Data<AppUrls>,
) -> Result<HttpResponse, ServerError>
where
    TUserStore: UserStore + 'static,
{
    let query = query.into_inner();
    if let Some(error) = &query.error {
        info!("🔗️ Marketplace reported an authorization error: {error}");
        return Ok(redirect_to(&format!("{}?error={error}", urls.app_callback_url)));
    }
    let (Some(code), Some(state)) = (query.code.as_deref(), query.state.as_deref()) else {
        return Err(ServerError::InvalidRequestBody("Missing code or state in OAuth callback".to_string()));
    };
    let user_id = state
        .parse::<i64>()
        .map(UserId)
        .map_err(|_| ServerError::InvalidRequestBody("The state parameter is not a user id".to_string()))?;
    linking.link_account(user_id, code).await?;
    Ok(redirect_to(&urls.app_callback_url))
}

fn redirect_to(url: &str) -> HttpResponse {
    HttpResponse::Found().insert_header(("Location", url.to_string())).finish()
}
