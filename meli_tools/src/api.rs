//! The per-session marketplace client.
//!
//! A [`MeliApi`] is configured for exactly one call context (one HTTP request or one
//! webhook delivery) with that seller's decrypted token pair. It is never shared across
//! concurrent requests, so a refresh mid-flight can swap the session tokens without any
//! risk of bleeding tokens between sellers.

use std::sync::Arc;

use log::*;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use sgw_common::{Secret, SellerId};
use tokio::sync::Mutex;

use crate::{
    config::MeliConfig,
    data_objects::{
        ItemSearch,
        ItemStatus,
        ItemSummary,
        MeliUser,
        MessageThread,
        Order,
        OrderSearchScope,
        OrdersSearch,
        Pack,
        QuestionFilters,
        QuestionStatus,
        QuestionsPage,
        TokenResponse,
    },
    error::{AuthError, MeliApiError, MeliResult, RemoteApiError},
    oauth::TokenAuthority,
};

/// A seller's decrypted working credentials. Ephemeral: owned by one request or webhook
/// call stack and dropped when handling completes.
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: Secret<String>,
    pub refresh_token: Secret<String>,
    pub seller_id: SellerId,
    /// When the access token expires (epoch ms), if known. A session past its expiry is
    /// refreshed proactively rather than burning a request on a guaranteed 401.
    pub expires_at_ms: Option<i64>,
}

impl Session {
    pub fn new<S: Into<String>>(access_token: S, refresh_token: S, seller_id: SellerId) -> Self {
        Self {
            access_token: Secret::new(access_token.into()),
            refresh_token: Secret::new(refresh_token.into()),
            seller_id,
            expires_at_ms: None,
        }
    }

    pub fn with_expiry(mut self, expires_at_ms: i64) -> Self {
        self.expires_at_ms = Some(expires_at_ms);
        self
    }

    fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at_ms.map(|expires_at| now_ms >= expires_at).unwrap_or(false)
    }
}

struct SessionState {
    session: Session,
    refreshed: Option<TokenResponse>,
}

/// Typed client for the seller REST API, bound to a single [`Session`].
///
/// Every request carries `Authorization: Bearer <access token>`. On a 401 the client
/// refreshes through the shared [`TokenAuthority`] (single-flight per seller), swaps the
/// session tokens, and replays the request exactly once; a second 401, or a refresh the
/// marketplace rejects, surfaces as [`MeliApiError::Unauthorized`]. Marketplace error
/// bodies on other statuses are returned as [`MeliResult::Failure`] data. Transport
/// failures are never retried here.
pub struct MeliApi {
    base_url: String,
    client: Arc<Client>,
    authority: Arc<TokenAuthority>,
    seller_id: SellerId,
    state: Mutex<SessionState>,
}

impl MeliApi {
    pub fn new(base_url: String, client: Arc<Client>, authority: Arc<TokenAuthority>, session: Session) -> Self {
        let seller_id = session.seller_id;
        Self { base_url, client, authority, seller_id, state: Mutex::new(SessionState { session, refreshed: None }) }
    }

    pub fn seller_id(&self) -> SellerId {
        self.seller_id
    }

    /// The token pair obtained by a mid-call refresh, if one happened. Yields the pair at
    /// most once; the caller is expected to re-encrypt and persist it.
    pub async fn take_refreshed_tokens(&self) -> Option<TokenResponse> {
        self.state.lock().await.refreshed.take()
    }

    pub async fn request<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<B>,
    ) -> Result<MeliResult<T>, MeliApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut refreshed = false;
        // Proactive refresh: a session known to be past its expiry would only earn a 401.
        if self.session_expired().await {
            debug!("🛒️ Session for seller {} is past its expiry, refreshing before {path}", self.seller_id);
            self.refresh_session().await?;
            refreshed = true;
        }
        loop {
            let token = { self.state.lock().await.session.access_token.reveal().clone() };
            let mut req = self.client.request(method.clone(), &url).bearer_auth(token);
            if !params.is_empty() {
                req = req.query(params);
            }
            if let Some(body) = &body {
                req = req.json(body);
            }
            trace!("🛒️ {method} {url}");
            let response = req.send().await.map_err(|e| MeliApiError::Transport(e.to_string()))?;
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                if refreshed {
                    warn!("🛒️ Request to {path} was rejected again after a token refresh");
                    return Err(MeliApiError::Unauthorized);
                }
                debug!("🛒️ Received 401 from {path}, refreshing session and replaying once");
                refreshed = true;
                self.refresh_session().await?;
                continue;
            }
            if status.is_success() {
                trace!("🛒️ {method} {path} succeeded with {status}");
                return response
                    .json::<T>()
                    .await
                    .map(MeliResult::Success)
                    .map_err(|e| MeliApiError::Json(e.to_string()));
            }
            let code = status.as_u16();
            let text = response.text().await.map_err(|e| MeliApiError::Transport(e.to_string()))?;
            debug!("🛒️ {method} {path} answered {code}: {text}");
            let err = serde_json::from_str::<RemoteApiError>(&text)
                .unwrap_or(RemoteApiError { message: text, error: None, status: code, cause: Vec::new() });
            return Ok(MeliResult::Failure(err));
        }
    }

    async fn session_expired(&self) -> bool {
        let now_ms = chrono::Utc::now().timestamp_millis();
        self.state.lock().await.session.is_expired(now_ms)
    }

    async fn refresh_session(&self) -> Result<(), MeliApiError> {
        let refresh_token = { self.state.lock().await.session.refresh_token.reveal().clone() };
        let tokens = self.authority.refresh(self.seller_id, &refresh_token).await.map_err(|e| match e {
            AuthError::Transport(msg) => MeliApiError::Transport(msg),
            AuthError::Json(msg) => MeliApiError::Json(msg),
            AuthError::LinkRevoked(_) => MeliApiError::Unauthorized,
        })?;
        let mut state = self.state.lock().await;
        state.session.access_token = Secret::new(tokens.access_token.clone());
        state.session.refresh_token = Secret::new(tokens.refresh_token.clone());
        state.session.expires_at_ms = Some(tokens.expires_at_ms(chrono::Utc::now()));
        state.refreshed = Some(tokens);
        Ok(())
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<MeliResult<T>, MeliApiError> {
        self.request::<T, ()>(Method::GET, path, params, None).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        params: &[(&str, String)],
        body: B,
    ) -> Result<MeliResult<T>, MeliApiError> {
        self.request(Method::POST, path, params, Some(body)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: B,
    ) -> Result<MeliResult<T>, MeliApiError> {
        self.request(Method::PUT, path, &[], Some(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<MeliResult<T>, MeliApiError> {
        self.request::<T, ()>(Method::DELETE, path, &[], None).await
    }

    //--------------------------------------  Orders  ---------------------------------------------

    /// Fetch the resource a webhook notification points at, interpreted as an order.
    pub async fn get_order_resource(&self, resource: &str) -> Result<MeliResult<Order>, MeliApiError> {
        debug!("🛒️ Fetching notification resource {resource}");
        self.get(resource, &[]).await
    }

    pub async fn get_order(&self, order_id: i64) -> Result<MeliResult<Order>, MeliApiError> {
        self.get(&format!("/orders/{order_id}"), &[]).await
    }

    pub async fn get_orders(&self, scope: OrderSearchScope) -> Result<MeliResult<OrdersSearch>, MeliApiError> {
        let path = format!("/orders/search{}", scope.path_segment());
        let params = vec![("seller", self.seller_id.to_string()), ("sort", "date_desc".to_string())];
        self.get(&path, &params).await
    }

    /// Expand a cart (pack) into its member orders.
    pub async fn get_pack(&self, pack_id: i64) -> Result<MeliResult<Pack>, MeliApiError> {
        debug!("🛒️ Expanding pack {pack_id}");
        self.get(&format!("/packs/{pack_id}"), &[]).await
    }

    //--------------------------------------  Messages  -------------------------------------------

    /// Fetch the post-sale message thread for an order, without marking it read.
    pub async fn get_order_messages(&self, order_id: i64) -> Result<MeliResult<MessageThread>, MeliApiError> {
        let path = format!("/messages/packs/{order_id}/sellers/{}", self.seller_id);
        let params = vec![("mark_as_read", "false".to_string()), ("tag", "post_sale".to_string())];
        self.get(&path, &params).await
    }

    /// Send a post-sale message from the seller to a buyer in the given message group.
    pub async fn send_message(
        &self,
        msg_group_id: i64,
        buyer_id: i64,
        text: &str,
    ) -> Result<MeliResult<Value>, MeliApiError> {
        let path = format!("/messages/packs/{msg_group_id}/sellers/{}", self.seller_id);
        let params = vec![("tag", "post_sale".to_string())];
        let body = json!({
            "from": { "user_id": self.seller_id },
            "to": { "user_id": buyer_id },
            "text": text,
        });
        info!("🛒️ Sending post-sale message to buyer {buyer_id} in group {msg_group_id}");
        self.post(&path, &params, body).await
    }

    //--------------------------------------  Questions  ------------------------------------------

    /// Search seller questions. Defaults to the first 25 unanswered questions when no
    /// filters are given.
    pub async fn get_questions(&self, filters: &QuestionFilters) -> Result<MeliResult<QuestionsPage>, MeliApiError> {
        let mut params: Vec<(&str, String)> = Vec::new();
        // `from` + `item` is the one combination that replaces the seller filter
        if let (Some(from), Some(item)) = (filters.from, filters.item.as_ref()) {
            params.push(("from", from.to_string()));
            params.push(("item", item.clone()));
        } else {
            params.push(("seller_id", self.seller_id.to_string()));
        }
        let status = filters.status.unwrap_or(QuestionStatus::Unanswered);
        params.push(("status", status.as_str().to_string()));
        if let Some(sort) = &filters.sort {
            params.push(("sort_fields", sort.fields.clone()));
            params.push(("sort_types", sort.order.as_str().to_string()));
        }
        params.push(("limit", filters.limit.unwrap_or(25).to_string()));
        params.push(("offset", filters.offset.unwrap_or(0).to_string()));
        params.push(("api_version", "4".to_string()));
        self.get("/questions/search", &params).await
    }

    pub async fn answer_question(&self, question_id: i64, answer: &str) -> Result<MeliResult<Value>, MeliApiError> {
        let body = json!({ "question_id": question_id, "text": answer });
        self.post("/answers", &[], body).await
    }

    pub async fn delete_question(&self, question_id: i64) -> Result<MeliResult<Value>, MeliApiError> {
        self.delete(&format!("/questions/{question_id}")).await
    }

    //--------------------------------------  Items  ----------------------------------------------

    pub async fn get_item(&self, item_id: &str, attrs: &[&str]) -> Result<MeliResult<ItemSummary>, MeliApiError> {
        let mut params = Vec::new();
        if !attrs.is_empty() {
            params.push(("attributes", attrs.join(",")));
        }
        self.get(&format!("/items/{item_id}"), &params).await
    }

    pub async fn get_items(&self, ids: &[&str], attrs: &[&str]) -> Result<MeliResult<Value>, MeliApiError> {
        let mut params = vec![("ids", ids.join(","))];
        if !attrs.is_empty() {
            params.push(("attributes", attrs.join(",")));
        }
        self.get("/items", &params).await
    }

    pub async fn search_items(&self, query: &str, limit: Option<u32>) -> Result<MeliResult<ItemSearch>, MeliApiError> {
        let path = format!("/users/{}/items/search", self.seller_id);
        let params = vec![
            ("q", query.to_string()),
            ("status", "active".to_string()),
            ("limit", limit.unwrap_or(50).to_string()),
        ];
        self.get(&path, &params).await
    }

    pub async fn change_item_status(
        &self,
        item_id: &str,
        status: ItemStatus,
    ) -> Result<MeliResult<Value>, MeliApiError> {
        info!("🛒️ Changing status of item {item_id} to {}", status.as_str());
        self.put(&format!("/items/{item_id}"), json!({ "status": status.as_str() })).await
    }

    pub async fn change_item_stock(&self, item_id: &str, stock: i64) -> Result<MeliResult<Value>, MeliApiError> {
        self.put(&format!("/items/{item_id}"), json!({ "available_quantity": stock })).await
    }

    //--------------------------------------  Users  ----------------------------------------------

    pub async fn get_user_info(&self, user_id: i64) -> Result<MeliResult<MeliUser>, MeliApiError> {
        self.get(&format!("/users/{user_id}"), &[]).await
    }
}

/// Builds per-session [`MeliApi`] instances over a shared connection pool and refresh
/// coordinator. One of these lives for the process lifetime; clients come and go with
/// each request.
#[derive(Clone)]
pub struct MeliApiFactory {
    base_url: String,
    client: Arc<Client>,
    oauth: crate::oauth::MeliOauth,
    authority: Arc<TokenAuthority>,
}

impl MeliApiFactory {
    pub fn new(config: &MeliConfig) -> Result<Self, MeliApiError> {
        let client = Client::builder().build().map_err(|e| MeliApiError::Initialization(e.to_string()))?;
        let client = Arc::new(client);
        let oauth = crate::oauth::MeliOauth::new(config.clone(), Arc::clone(&client));
        let authority = Arc::new(TokenAuthority::new(oauth.clone()));
        Ok(Self { base_url: config.api_url.clone(), client, oauth, authority })
    }

    /// The shared token-endpoint client, for flows (like account linking) that need it
    /// outside a session.
    pub fn oauth(&self) -> crate::oauth::MeliOauth {
        self.oauth.clone()
    }

    pub fn session(&self, session: Session) -> MeliApi {
        MeliApi::new(self.base_url.clone(), Arc::clone(&self.client), Arc::clone(&self.authority), session)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use serde_json::json;
    use sgw_common::SellerId;
    use wiremock::{
        matchers::{body_string_contains, header, method, path},
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;
    use crate::{config::MeliConfig, oauth::MeliOauth};

    fn test_config(base_url: &str) -> MeliConfig {
        MeliConfig {
            api_url: base_url.to_string(),
            client_id: "12345".to_string(),
            client_secret: Secret::new("shhh".to_string()),
            redirect_url: "https://example.com/callback".to_string(),
        }
    }

    fn test_api(server: &MockServer) -> MeliApi {
        let config = test_config(&server.uri());
        let factory = MeliApiFactory::new(&config).unwrap();
        factory.session(Session::new("old-access", "old-refresh", SellerId(468424240)))
    }

    fn token_body() -> serde_json::Value {
        json!({
            "access_token": "new-access",
            "token_type": "Bearer",
            "expires_in": 21600,
            "scope": "offline_access read write",
            "user_id": 468424240,
            "refresh_token": "new-refresh"
        })
    }

    #[tokio::test]
    async fn successful_call_attaches_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders/123"))
            .and(header("Authorization", "Bearer old-access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 123,
                "status": "paid",
                "buyer": {"id": 9},
                "seller": {"id": 468424240}
            })))
            .mount(&server)
            .await;

        let api = test_api(&server);
        let order = api.get_order(123).await.unwrap().into_result().unwrap();
        assert_eq!(order.id, 123);
        assert!(api.take_refreshed_tokens().await.is_none());
    }

    #[tokio::test]
    async fn request_is_replayed_once_after_401() {
        let server = MockServer::start().await;
        // Stale token is rejected, refreshed token is accepted.
        Mock::given(method("GET"))
            .and(path("/orders/77"))
            .and(header("Authorization", "Bearer old-access"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orders/77"))
            .and(header("Authorization", "Bearer new-access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 77,
                "status": "confirmed",
                "buyer": {"id": 9},
                "seller": {"id": 468424240}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = test_api(&server);
        let order = api.get_order(77).await.unwrap().into_result().unwrap();
        assert_eq!(order.id, 77);
        let refreshed = api.take_refreshed_tokens().await.expect("refreshed tokens should be recorded");
        assert_eq!(refreshed.access_token, "new-access");
        assert_eq!(refreshed.refresh_token, "new-refresh");
        // The pair is handed over exactly once
        assert!(api.take_refreshed_tokens().await.is_none());
    }

    #[tokio::test]
    async fn expired_sessions_are_refreshed_proactively() {
        let server = MockServer::start().await;
        // The stale token is never presented: the only order call carries the new one.
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/orders/88"))
            .and(header("Authorization", "Bearer new-access"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 88,
                "status": "paid",
                "buyer": {"id": 9},
                "seller": {"id": 468424240}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let factory = MeliApiFactory::new(&config).unwrap();
        let session = Session::new("old-access", "old-refresh", SellerId(468424240)).with_expiry(1);
        let api = factory.session(session);
        let order = api.get_order(88).await.unwrap().into_result().unwrap();
        assert_eq!(order.id, 88);
        assert!(api.take_refreshed_tokens().await.is_some());
    }

    #[tokio::test]
    async fn second_401_surfaces_unauthorized_without_looping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders/5"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let api = test_api(&server);
        let err = api.get_order(5).await.unwrap_err();
        assert!(matches!(err, MeliApiError::Unauthorized));
        assert_eq!(err.action(), Some("relink_marketplace"));
    }

    #[tokio::test]
    async fn rejected_refresh_surfaces_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders/5"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "message": "refresh token is invalid",
                "error": "invalid_grant",
                "status": 400,
                "cause": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = test_api(&server);
        let err = api.get_order(5).await.unwrap_err();
        assert!(matches!(err, MeliApiError::Unauthorized));
    }

    #[tokio::test]
    async fn api_error_bodies_are_returned_as_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders/404404"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "message": "Order not found",
                "error": "not_found",
                "status": 404,
                "cause": []
            })))
            .mount(&server)
            .await;

        let api = test_api(&server);
        let result = api.get_order(404404).await.unwrap();
        let err = result.into_result().unwrap_err();
        assert_eq!(err.status, 404);
        assert_eq!(err.error.as_deref(), Some("not_found"));
    }

    #[tokio::test]
    async fn transport_failures_are_not_retried() {
        // Point at a server that is not listening.
        let config = test_config("http://127.0.0.1:9");
        let factory = MeliApiFactory::new(&config).unwrap();
        let api = factory.session(Session::new("a", "r", SellerId(1)));
        let err = api.get_order(1).await.unwrap_err();
        assert!(matches!(err, MeliApiError::Transport(_)));
    }

    #[tokio::test]
    async fn concurrent_refreshes_are_single_flight() {
        let server = MockServer::start().await;
        // A slow token endpoint so that all tasks pile up behind one refresh.
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body())
                    .set_delay(std::time::Duration::from_millis(100)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let client = Arc::new(reqwest::Client::new());
        let oauth = MeliOauth::new(config, client);
        let authority = Arc::new(TokenAuthority::new(oauth));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let authority = Arc::clone(&authority);
            handles.push(tokio::spawn(async move {
                authority.refresh(SellerId(468424240), "old-refresh").await
            }));
        }
        for handle in handles {
            let tokens = handle.await.unwrap().expect("all waiters share the single refresh result");
            assert_eq!(tokens.access_token, "new-access");
        }
        // wiremock verifies expect(1) on drop: exactly one token call was made
    }

    #[tokio::test]
    async fn refreshes_for_different_sellers_do_not_serialize() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(2)
            .mount(&server)
            .await;

        let config = test_config(&server.uri());
        let client = Arc::new(reqwest::Client::new());
        let authority = Arc::new(TokenAuthority::new(MeliOauth::new(config, client)));
        let a = authority.refresh(SellerId(1), "r1");
        let b = authority.refresh(SellerId(2), "r2");
        let (ra, rb) = tokio::join!(a, b);
        assert!(ra.is_ok());
        assert!(rb.is_ok());
    }
}
