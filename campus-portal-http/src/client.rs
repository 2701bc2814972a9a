//! HTTP client with bearer-token attachment and coordinated refresh.

use crate::config::{ClientConfig, RefreshTokenPolicy};
use crate::coordinator::{Join, RefreshCoordinator, RefreshCycle};
use crate::error::{ClientError, ClientResult, RefreshError};
use crate::queue::RefreshOutcome;
use crate::refresh::{HttpTokenRefresher, TokenRefresher};
use crate::request::{RequestDescriptor, RequestOptions};
use crate::session::{MemorySessionStore, SessionStore, TokenPair};
use parking_lot::Mutex;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Session lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Credentials were refreshed transparently.
    Refreshed,
    /// The session could not be recovered and credentials were cleared.
    /// The user has to log in again.
    Terminated,
}

/// HTTP client that attaches the stored access token to every request and
/// recovers from expired tokens with a single shared refresh.
///
/// Cloning is cheap; clones share the session, the refresh coordinator and
/// the connection pool.
#[derive(Clone)]
pub struct AuthenticatedClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: Client,
    config: ClientConfig,
    store: Arc<dyn SessionStore>,
    refresher: Arc<dyn TokenRefresher>,
    coordinator: Arc<RefreshCoordinator>,
    events: broadcast::Sender<SessionEvent>,
    teardown: Mutex<()>,
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("base_url", &self.inner.config.base_url.as_str())
            .field("coordinator", &self.inner.coordinator)
            .finish_non_exhaustive()
    }
}

impl AuthenticatedClient {
    /// Create a client with the default HTTP refresher.
    pub fn new(config: ClientConfig, store: Arc<dyn SessionStore>) -> ClientResult<Self> {
        AuthenticatedClientBuilder::new(config).store(store).build()
    }

    /// Create a builder.
    pub fn builder(config: ClientConfig) -> AuthenticatedClientBuilder {
        AuthenticatedClientBuilder::new(config)
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Get the session store.
    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.inner.store
    }

    /// Get the refresh coordinator.
    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.inner.coordinator
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Store credentials obtained at login.
    ///
    /// Authorization failures of requests sent before this call no longer
    /// trigger a refresh.
    pub fn start_session(&self, tokens: TokenPair) {
        let _guard = self.inner.teardown.lock();
        self.inner.store.set_tokens(tokens);
        self.inner.coordinator.reset_session();
        info!("Session started");
    }

    /// Forget credentials after a voluntary logout.
    pub fn end_session(&self) {
        let _guard = self.inner.teardown.lock();
        self.inner.store.clear();
        self.inner.coordinator.reset_session();
        info!("Session ended");
    }

    /// Execute a GET request and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let response = self
            .request(Method::GET, path, None, RequestOptions::default())
            .await?;
        decode(response).await
    }

    /// Execute a POST request and decode the JSON body.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.send_json(Method::POST, path, body).await
    }

    /// Execute a PUT request and decode the JSON body.
    pub async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.send_json(Method::PUT, path, body).await
    }

    /// Execute a PATCH request and decode the JSON body.
    pub async fn patch_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.send_json(Method::PATCH, path, body).await
    }

    /// Execute a DELETE request, discarding the body.
    pub async fn delete(&self, path: &str) -> ClientResult<()> {
        self.request(Method::DELETE, path, None, RequestOptions::default())
            .await?;
        Ok(())
    }

    /// Execute a prepared descriptor and decode the JSON body.
    ///
    /// An empty body decodes as JSON `null`.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        descriptor: RequestDescriptor,
    ) -> ClientResult<T> {
        let response = self.execute(descriptor).await?;
        decode(response).await
    }

    async fn send_json<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let body = serde_json::to_value(body)?;
        let response = self
            .request(method, path, Some(body), RequestOptions::default())
            .await?;
        decode(response).await
    }

    /// Execute a request.
    ///
    /// A 401 triggers at most one refresh (shared with every other request
    /// failing at the same time) and one retry with the new token. Any other
    /// non-2xx status is returned as [`ClientError::Http`].
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        options: RequestOptions,
    ) -> ClientResult<Response> {
        let mut descriptor = RequestDescriptor::new(method, path).with_options(options);
        if let Some(body) = body {
            descriptor = descriptor.with_body(body);
        }
        self.execute(descriptor).await
    }

    /// Execute a prepared descriptor, honouring its timeout and cancellation.
    pub async fn execute(&self, descriptor: RequestDescriptor) -> ClientResult<Response> {
        let deadline = descriptor.options.timeout;
        let cancel = descriptor.options.cancel.clone();

        let work = async {
            match deadline {
                Some(limit) => tokio::time::timeout(limit, self.inner.run(descriptor))
                    .await
                    .map_err(|_| ClientError::Timeout)?,
                None => self.inner.run(descriptor).await,
            }
        };

        // Dropping `work` withdraws this caller from any refresh queue.
        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Request cancelled by caller");
                    Err(ClientError::Cancelled)
                }
                result = work => result,
            },
            None => work.await,
        }
    }
}

impl Inner {
    async fn run(self: &Arc<Self>, descriptor: RequestDescriptor) -> ClientResult<Response> {
        if descriptor.options.public {
            let response = self.send(&descriptor, None).await?;
            return check_response(response).await;
        }

        // Generation first: tokens are stored before the generation moves.
        let generation = self.coordinator.generation();
        let token = self.store.access_token();

        let response = self.send(&descriptor, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_response(response).await;
        }
        drop(response);

        debug!(
            method = %descriptor.method,
            path = %descriptor.path,
            attempt = descriptor.attempt,
            "Authorization failed"
        );

        if descriptor.is_retry() {
            return Err(self.reject_retry(token.as_deref()));
        }

        let (retry_token, turn) = match self.coordinator.join(generation) {
            Join::Ended => return Err(ClientError::AuthExpired),
            Join::Stale => {
                let token = self.store.access_token().ok_or(ClientError::AuthExpired)?;
                (token, None)
            }
            Join::Leader { ticket, cycle } => {
                self.spawn_refresh(cycle);
                let (outcome, turn) = ticket.wait_turn().await;
                (outcome_token(outcome)?, turn)
            }
            Join::Follower(ticket) => {
                let (outcome, turn) = ticket.wait_turn().await;
                (outcome_token(outcome)?, turn)
            }
        };

        // Queued retries go out one at a time, oldest first. The turn passes
        // on once this retry's response has arrived.
        if let Some(turn) = &turn {
            turn.ready().await;
        }
        let retry = descriptor.retried();
        let response = self.send(&retry, Some(&retry_token)).await;
        drop(turn);

        let response = response?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(path = %retry.path, "Request rejected after refresh");
            return Err(self.reject_retry(Some(&retry_token)));
        }
        check_response(response).await
    }

    async fn send(&self, descriptor: &RequestDescriptor, token: Option<&str>) -> ClientResult<Response> {
        let url = self.config.endpoint(&descriptor.path)?;
        let timeout = descriptor
            .options
            .timeout
            .map_or(self.config.request_timeout, |t| t.min(self.config.request_timeout));

        debug!(
            method = %descriptor.method,
            url = %url,
            attempt = descriptor.attempt,
            authenticated = token.is_some(),
            "Making HTTP request"
        );

        let mut request = self
            .http
            .request(descriptor.method.clone(), url)
            .timeout(timeout);
        for (name, value) in &descriptor.options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &descriptor.body {
            request = request.json(body);
        }

        Ok(request.send().await?)
    }

    // The refresh runs detached from the leader so that a leader that times
    // out or is cancelled cannot strand the rest of the queue.
    fn spawn_refresh(self: &Arc<Self>, cycle: RefreshCycle) {
        let inner = self.clone();
        tokio::spawn(async move {
            let outcome = inner.refresh(cycle.session_epoch()).await;
            cycle.finish(outcome);
        });
    }

    async fn refresh(&self, epoch: u64) -> RefreshOutcome {
        match self.try_refresh().await {
            Ok(tokens) => {
                let _guard = self.teardown.lock();
                if self.coordinator.session_epoch() != epoch {
                    debug!("Discarding tokens refreshed for a previous session");
                    return RefreshOutcome::Expired;
                }
                let access_token = tokens.access_token.clone();
                self.store.set_tokens(tokens);
                info!("Access token refreshed");
                let _ = self.events.send(SessionEvent::Refreshed);
                RefreshOutcome::Refreshed { access_token }
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                self.terminate(epoch);
                RefreshOutcome::Expired
            }
        }
    }

    async fn try_refresh(&self) -> Result<TokenPair, RefreshError> {
        let refresh_token = self
            .store
            .refresh_token()
            .ok_or(RefreshError::MissingRefreshToken)?;

        let tokens = tokio::time::timeout(
            self.config.refresh_timeout,
            self.refresher.refresh(&refresh_token),
        )
        .await
        .map_err(|_| RefreshError::Timeout)??;

        match (tokens.refresh_token, self.config.refresh_token_policy) {
            (Some(rotated), _) => Ok(TokenPair::new(tokens.access_token, rotated)),
            (None, RefreshTokenPolicy::KeepExisting) => {
                Ok(TokenPair::new(tokens.access_token, refresh_token))
            }
            (None, RefreshTokenPolicy::RequireRotation) => Err(RefreshError::MissingRotation),
        }
    }

    /// A retried request was still unauthorized.
    ///
    /// Tears the session down unless a newer token has been stored since
    /// `used`, in which case the failure belongs to an older session.
    fn reject_retry(&self, used: Option<&str>) -> ClientError {
        if self.store.access_token().as_deref() == used {
            self.terminate(self.coordinator.session_epoch());
        }
        ClientError::AuthExpired
    }

    /// Clear credentials and announce termination, once per session.
    ///
    /// Does nothing if the session epoch moved past `epoch` in the meantime.
    fn terminate(&self, epoch: u64) {
        let _guard = self.teardown.lock();
        if self.coordinator.session_epoch() != epoch || !self.store.has_session() {
            return;
        }
        self.store.clear();
        warn!("Session terminated; credentials cleared");
        let _ = self.events.send(SessionEvent::Terminated);
    }
}

fn outcome_token(outcome: RefreshOutcome) -> ClientResult<String> {
    match outcome {
        RefreshOutcome::Refreshed { access_token } => Ok(access_token),
        RefreshOutcome::Expired => Err(ClientError::AuthExpired),
    }
}

/// Check an HTTP response and convert non-2xx statuses to errors.
async fn check_response(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), "Request failed");
    Err(ClientError::Http {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let bytes = response.bytes().await?;
    // Empty bodies decode as JSON null so that `()` and `Option<T>` work.
    let slice: &[u8] = if bytes.is_empty() { b"null" } else { &bytes };
    Ok(serde_json::from_slice(slice)?)
}

/// Builder for [`AuthenticatedClient`].
pub struct AuthenticatedClientBuilder {
    config: ClientConfig,
    http: Option<Client>,
    store: Option<Arc<dyn SessionStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl AuthenticatedClientBuilder {
    /// Create a new builder.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http: None,
            store: None,
            refresher: None,
        }
    }

    /// Set the underlying HTTP client.
    pub fn http_client(mut self, client: Client) -> Self {
        self.http = Some(client);
        self
    }

    /// Set the session store. Defaults to an empty [`MemorySessionStore`].
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the refresher. Defaults to [`HttpTokenRefresher`] on the configured path.
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Build the client.
    pub fn build(self) -> ClientResult<AuthenticatedClient> {
        let http = match self.http {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.config.request_timeout)
                .build()?,
        };

        let refresher: Arc<dyn TokenRefresher> = match self.refresher {
            Some(refresher) => refresher,
            None => Arc::new(HttpTokenRefresher::from_config(http.clone(), &self.config)?),
        };

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemorySessionStore::new()));
        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));

        Ok(AuthenticatedClient {
            inner: Arc::new(Inner {
                http,
                config: self.config,
                store,
                refresher,
                coordinator: RefreshCoordinator::new(),
                events,
                teardown: Mutex::new(()),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

    struct NoAuthorization;

    impl Match for NoAuthorization {
        fn matches(&self, request: &Request) -> bool {
            !request.headers.contains_key("authorization")
        }
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn client_for(server: &MockServer, store: Arc<MemorySessionStore>) -> AuthenticatedClient {
        init_tracing();
        let config = ClientConfig::parse(&server.uri()).unwrap();
        AuthenticatedClient::new(config, store).unwrap()
    }

    fn logged_in() -> Arc<MemorySessionStore> {
        Arc::new(MemorySessionStore::with_tokens(TokenPair::new("at-1", "rt-1")))
    }

    async fn mount_get(server: &MockServer, route: &str, token: &str, status: u16, body: Value) {
        Mock::given(method("GET"))
            .and(path(route))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn mount_refresh(server: &MockServer, response: ResponseTemplate, calls: u64) {
        Mock::given(method("POST"))
            .and(path("/user/auth/refresh"))
            .and(body_json(json!({"refreshToken": "rt-1"})))
            .respond_with(response)
            .expect(calls)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_attaches_bearer_token() {
        let server = MockServer::start().await;
        mount_get(&server, "/user/me", "at-1", 200, json!({"id": "u1"})).await;

        let client = client_for(&server, logged_in());
        let me: Value = client.get_json("/user/me").await.unwrap();
        assert_eq!(me["id"], "u1");
    }

    #[tokio::test]
    async fn test_transparent_refresh() {
        let server = MockServer::start().await;
        mount_get(&server, "/enrollment/grades/123", "at-1", 401, json!({})).await;
        mount_get(
            &server,
            "/enrollment/grades/123",
            "at-2",
            200,
            json!({"courseCode": "CSE101", "grade": "A"}),
        )
        .await;
        mount_refresh(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({"accessToken": "at-2"})),
            1,
        )
        .await;

        let store = logged_in();
        let client = client_for(&server, store.clone());
        let mut events = client.subscribe();

        let grades: Value = client.get_json("/enrollment/grades/123").await.unwrap();
        assert_eq!(grades["grade"], "A");

        // Refresh token kept because none was returned.
        assert_eq!(store.tokens(), Some(TokenPair::new("at-2", "rt-1")));
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Refreshed);
    }

    #[tokio::test]
    async fn test_concurrent_failures_share_one_refresh() {
        let server = MockServer::start().await;
        for route in ["/a", "/b", "/c"] {
            mount_get(&server, route, "at-1", 401, json!({})).await;
            mount_get(&server, route, "at-2", 200, json!({"route": route})).await;
        }
        mount_refresh(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "at-2", "refreshToken": "rt-2"}))
                .set_delay(Duration::from_millis(200)),
            1,
        )
        .await;

        let store = logged_in();
        let client = client_for(&server, store.clone());

        let (a, b, c) = tokio::join!(
            client.get_json::<Value>("/a"),
            client.get_json::<Value>("/b"),
            client.get_json::<Value>("/c"),
        );
        assert_eq!(a.unwrap()["route"], "/a");
        assert_eq!(b.unwrap()["route"], "/b");
        assert_eq!(c.unwrap()["route"], "/c");

        assert_eq!(store.tokens(), Some(TokenPair::new("at-2", "rt-2")));
        assert_eq!(client.coordinator().generation(), 1);
        assert_eq!(client.coordinator().pending(), 0);
        server.verify().await;
    }

    async fn until_pending(client: &AuthenticatedClient, count: usize) {
        for _ in 0..400 {
            if client.coordinator().pending() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("refresh queue never reached {count} callers");
    }

    fn paths_sent_with(requests: &[Request], token: &str) -> Vec<String> {
        let expected = format!("Bearer {token}");
        requests
            .iter()
            .filter(|r| {
                r.headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    == Some(expected.as_str())
            })
            .map(|r| r.url.path().to_string())
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queued_retries_are_issued_in_order() {
        let server = MockServer::start().await;
        for route in ["/a", "/b", "/c"] {
            mount_get(&server, route, "at-1", 401, json!({})).await;
        }
        // A slow first retry must still hold back the ones queued behind it.
        Mock::given(method("GET"))
            .and(path("/a"))
            .and(header("authorization", "Bearer at-2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"route": "/a"}))
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&server)
            .await;
        for route in ["/b", "/c"] {
            mount_get(&server, route, "at-2", 200, json!({"route": route})).await;
        }
        mount_refresh(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "at-2", "refreshToken": "rt-2"}))
                .set_delay(Duration::from_millis(500)),
            1,
        )
        .await;

        let client = client_for(&server, logged_in());
        let mut tasks = Vec::new();
        for (queued, route) in ["/a", "/b", "/c"].into_iter().enumerate() {
            let caller = client.clone();
            tasks.push(tokio::spawn(async move {
                caller.get_json::<Value>(route).await
            }));
            until_pending(&client, queued + 1).await;
        }

        for (task, route) in tasks.into_iter().zip(["/a", "/b", "/c"]) {
            assert_eq!(task.await.unwrap().unwrap()["route"], route);
        }

        let requests = server.received_requests().await.unwrap();
        assert_eq!(paths_sent_with(&requests, "at-2"), vec!["/a", "/b", "/c"]);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_failure_from_previous_session_does_not_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/me"))
            .and(header("authorization", "Bearer at-1"))
            .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(200)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/user/auth/refresh"))
            .respond_with(ResponseTemplate::new(400))
            .expect(0)
            .mount(&server)
            .await;

        let store = logged_in();
        let client = client_for(&server, store.clone());
        let mut events = client.subscribe();

        let caller = client.clone();
        let old = tokio::spawn(async move { caller.get_json::<Value>("/user/me").await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.start_session(TokenPair::new("at-9", "rt-9"));

        assert!(old.await.unwrap().unwrap_err().is_auth_expired());
        assert_eq!(store.tokens(), Some(TokenPair::new("at-9", "rt-9")));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        server.verify().await;
    }

    #[tokio::test]
    async fn test_unauthorized_after_refresh_does_not_loop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/academic/batches"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        mount_refresh(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({"accessToken": "at-2"})),
            1,
        )
        .await;

        let store = logged_in();
        let client = client_for(&server, store.clone());
        let mut events = client.subscribe();

        let err = client
            .get_json::<Value>("/academic/batches")
            .await
            .unwrap_err();
        assert!(err.is_auth_expired());
        assert!(!store.has_session());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Refreshed);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Terminated);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_refresh_rejection_expires_everyone() {
        let server = MockServer::start().await;
        for route in ["/a", "/b", "/c"] {
            mount_get(&server, route, "at-1", 401, json!({})).await;
        }
        mount_refresh(
            &server,
            ResponseTemplate::new(400)
                .set_body_string("invalid refresh token")
                .set_delay(Duration::from_millis(100)),
            1,
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/notification/unread"))
            .and(NoAuthorization)
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0})))
            .expect(1)
            .mount(&server)
            .await;

        let store = logged_in();
        let client = client_for(&server, store.clone());
        let mut events = client.subscribe();

        let (a, b, c) = tokio::join!(
            client.get_json::<Value>("/a"),
            client.get_json::<Value>("/b"),
            client.get_json::<Value>("/c"),
        );
        for result in [a, b, c] {
            assert!(result.unwrap_err().is_auth_expired());
        }

        assert!(!store.has_session());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Terminated);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

        // After teardown, requests go out without credentials.
        let unread: Value = client.get_json("/notification/unread").await.unwrap();
        assert_eq!(unread["count"], 0);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_disturb_others() {
        let server = MockServer::start().await;
        for route in ["/a", "/b", "/c"] {
            mount_get(&server, route, "at-1", 401, json!({})).await;
            mount_get(&server, route, "at-2", 200, json!({"route": route})).await;
        }
        mount_refresh(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "at-2"}))
                .set_delay(Duration::from_millis(300)),
            1,
        )
        .await;

        let client = client_for(&server, logged_in());
        let cancel = CancellationToken::new();

        let cancelled = client.request(
            Method::GET,
            "/b",
            None,
            RequestOptions::new().cancel_on(cancel.clone()),
        );
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        };

        let (a, b, c, _) = tokio::join!(
            client.get_json::<Value>("/a"),
            cancelled,
            client.get_json::<Value>("/c"),
            canceller,
        );

        assert!(matches!(b.unwrap_err(), ClientError::Cancelled));
        assert_eq!(a.unwrap()["route"], "/a");
        assert_eq!(c.unwrap()["route"], "/c");
        assert_eq!(client.coordinator().pending(), 0);
        server.verify().await;
    }

    #[tokio::test]
    async fn test_timed_out_leader_does_not_strand_queue() {
        let server = MockServer::start().await;
        for route in ["/a", "/b"] {
            mount_get(&server, route, "at-1", 401, json!({})).await;
            mount_get(&server, route, "at-2", 200, json!({"route": route})).await;
        }
        mount_refresh(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "at-2"}))
                .set_delay(Duration::from_millis(300)),
            1,
        )
        .await;

        let client = client_for(&server, logged_in());

        let impatient = client.request(
            Method::GET,
            "/a",
            None,
            RequestOptions::new().timeout(Duration::from_millis(150)),
        );
        let patient = async {
            // Join after the impatient caller has started the refresh.
            tokio::time::sleep(Duration::from_millis(50)).await;
            client.get_json::<Value>("/b").await
        };

        let (a, b) = tokio::join!(impatient, patient);
        assert!(matches!(a.unwrap_err(), ClientError::Timeout));
        assert_eq!(b.unwrap()["route"], "/b");
        server.verify().await;
    }

    #[tokio::test]
    async fn test_hanging_refresh_is_treated_as_failure() {
        let server = MockServer::start().await;
        mount_get(&server, "/a", "at-1", 401, json!({})).await;
        mount_refresh(
            &server,
            ResponseTemplate::new(200)
                .set_body_json(json!({"accessToken": "at-2"}))
                .set_delay(Duration::from_secs(5)),
            1,
        )
        .await;

        let store = logged_in();
        let config = ClientConfig::parse(&server.uri())
            .unwrap()
            .with_refresh_timeout(Duration::from_millis(100));
        let client = AuthenticatedClient::new(config, store.clone()).unwrap();

        let err = client.get_json::<Value>("/a").await.unwrap_err();
        assert!(err.is_auth_expired());
        assert!(!store.has_session());
    }

    #[tokio::test]
    async fn test_require_rotation_policy() {
        let server = MockServer::start().await;
        mount_get(&server, "/a", "at-1", 401, json!({})).await;
        mount_refresh(
            &server,
            ResponseTemplate::new(200).set_body_json(json!({"accessToken": "at-2"})),
            1,
        )
        .await;

        let store = logged_in();
        let config = ClientConfig::parse(&server.uri())
            .unwrap()
            .with_refresh_token_policy(RefreshTokenPolicy::RequireRotation);
        let client = AuthenticatedClient::new(config, store.clone()).unwrap();

        let err = client.get_json::<Value>("/a").await.unwrap_err();
        assert!(err.is_auth_expired());
        assert!(!store.has_session());
    }

    #[tokio::test]
    async fn test_no_refresh_token_skips_endpoint() {
        let server = MockServer::start().await;
        mount_get(&server, "/a", "at-1", 401, json!({})).await;
        mount_refresh(&server, ResponseTemplate::new(200), 0).await;

        let store = Arc::new(MemorySessionStore::with_tokens(TokenPair::access_only("at-1")));
        let client = client_for(&server, store.clone());

        let err = client.get_json::<Value>("/a").await.unwrap_err();
        assert!(err.is_auth_expired());
        assert!(!store.has_session());
        server.verify().await;
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/library/loans"))
            .respond_with(
                ResponseTemplate::new(422).set_body_json(json!({"message": "bookId required"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, ResponseTemplate::new(200), 0).await;

        let client = client_for(&server, logged_in());
        let err = client
            .post_json::<_, Value>("/library/loans", &json!({}))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(422));
        match err {
            ClientError::Http { body, .. } => assert!(body.contains("bookId required")),
            other => panic!("unexpected error: {other:?}"),
        }
        server.verify().await;
    }

    #[tokio::test]
    async fn test_connection_error_is_network() {
        let config = ClientConfig::parse("http://127.0.0.1:1").unwrap();
        let client = AuthenticatedClient::new(config, logged_in()).unwrap();

        let err = client.get_json::<Value>("/user/me").await.unwrap_err();
        assert!(err.is_network(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_delete_with_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/notification/42"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client_for(&server, logged_in());
        client.delete("/notification/42").await.unwrap();
    }

    #[tokio::test]
    async fn test_public_request_skips_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/auth/login"))
            .and(NoAuthorization)
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .expect(1)
            .mount(&server)
            .await;
        mount_refresh(&server, ResponseTemplate::new(200), 0).await;

        let store = logged_in();
        let client = client_for(&server, store.clone());
        let descriptor = RequestDescriptor::new(Method::POST, "/user/auth/login")
            .with_body(json!({"email": "a@b.edu", "password": "nope"}))
            .with_options(RequestOptions::new().public());

        let err = client.execute_json::<Value>(descriptor).await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(store.has_session());
        server.verify().await;
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let server = MockServer::start().await;
        let store = Arc::new(MemorySessionStore::new());
        let client = client_for(&server, store.clone());

        client.start_session(TokenPair::new("at-9", "rt-9"));
        assert_eq!(store.access_token().as_deref(), Some("at-9"));

        client.end_session();
        assert!(!store.has_session());
    }
}
