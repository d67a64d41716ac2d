use crate::config::ClientConfig;
use crate::error::{ApiError, RefreshError};
use crate::redact::redact_secrets;
use crate::refresh::{
    classify_failure, FailureClass, RefreshGate, RefreshLease, RefreshOutcome, RefreshPhase, Ticket,
};
use crate::request::ApiRequest;
use crate::state::{CredentialStore, Credentials, KeyringStore, SessionBus, SessionEvent};
use crate::types::{ApiErrorBody, RefreshPayload, RefreshedAccess};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

pub const REFRESH_PATH: &str = "token/refresh/";

fn bearer(token: &str) -> Option<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}")).ok()?;
    value.set_sensitive(true);
    Some(value)
}

async fn read_error_body(response: Response) -> Option<ApiErrorBody> {
    let text = response.text().await.ok()?;
    let body = ApiErrorBody::parse(&text);
    if body.is_none() && !text.trim().is_empty() {
        tracing::debug!(body = %redact_secrets(&text), "non-json error body");
    }
    body
}

/// Splits a response into success or `(status, parsed error body)`.
async fn check(response: Response) -> Result<Response, (StatusCode, Option<ApiErrorBody>)> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err((status, read_error_body(response).await))
}

fn store_error(err: impl std::fmt::Display) -> RefreshError {
    RefreshError::Store(err.to_string())
}

/// HTTP client for the ChezFlora API.
///
/// Every request carries the stored access token. A 401 on an expired token is
/// recovered by one shared refresh and a single replay; callers only see the
/// final outcome. Cheap to clone: clones share the credential store, the
/// refresh gate and the session bus.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    credentials: Credentials,
    gate: RefreshGate,
    session: SessionBus,
}

impl ApiClient {
    pub fn new(config: ClientConfig, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            http,
            credentials: Credentials::new(store, &config),
            config: Arc::new(config),
            gate: RefreshGate::new(),
            session: SessionBus::new(),
        })
    }

    /// Client whose credentials live in the OS keychain.
    pub fn with_keyring(config: ClientConfig) -> Result<Self, ApiError> {
        let store = Arc::new(KeyringStore::new(config.keyring_service.clone()));
        Self::new(config, store)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub(crate) fn session(&self) -> &SessionBus {
        &self.session
    }

    /// Session events, including the invalidation signal the shell uses to
    /// send the user back to sign in.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }

    pub fn refresh_phase(&self) -> RefreshPhase {
        self.gate.phase()
    }

    /// Requests parked behind the in-flight refresh.
    pub fn refresh_waiters(&self) -> usize {
        self.gate.pending()
    }

    pub(crate) fn gate(&self) -> &RefreshGate {
        &self.gate
    }

    async fn dispatch(&self, request: &ApiRequest, access: Option<&str>) -> Result<Response, ApiError> {
        let mut url = self.config.endpoint(&request.path)?;
        if !request.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(request.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(ACCEPT, "application/json")
            .headers(request.headers.clone());

        match access.map(bearer) {
            Some(Some(value)) => {
                tracing::debug!(method = %request.method, path = %request.path, "token attached");
                builder = builder.header(AUTHORIZATION, value);
            }
            Some(None) => {
                tracing::warn!(
                    method = %request.method,
                    path = %request.path,
                    "stored access token is not a valid header value; sending without it"
                );
            }
            None => {
                tracing::debug!(method = %request.method, path = %request.path, "no token available");
            }
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }

    /// Sends a request with the current access token and returns the
    /// successful response. Non-2xx statuses become [`ApiError::Status`].
    pub async fn send(&self, request: ApiRequest) -> Result<Response, ApiError> {
        let access = self.credentials.access_token()?;
        let response = self.dispatch(&request, access.as_deref()).await?;
        let (status, body) = match check(response).await {
            Ok(response) => return Ok(response),
            Err(failure) => failure,
        };

        match classify_failure(
            self.config.refresh_trigger,
            status,
            body.as_ref(),
            request.is_retried(),
        ) {
            FailureClass::ExpiredCredential => {}
            FailureClass::RetryExhausted | FailureClass::Terminal => {
                return Err(ApiError::Status { status, body });
            }
        }

        let Some(token) = self.recover(access.as_deref()).await? else {
            return Err(ApiError::Status { status, body });
        };
        let request = request.into_retry();
        let response = self.dispatch(&request, Some(&token)).await?;
        match check(response).await {
            Ok(response) => Ok(response),
            Err((status, body)) => {
                if classify_failure(self.config.refresh_trigger, status, body.as_ref(), true)
                    == FailureClass::RetryExhausted
                {
                    tracing::warn!(path = %request.path, "request rejected again after token refresh");
                }
                Err(ApiError::Status { status, body })
            }
        }
    }

    /// Sends without the stored token and without refresh recovery.
    pub(crate) async fn send_anonymous(&self, request: ApiRequest) -> Result<Response, ApiError> {
        let response = self.dispatch(&request, None).await?;
        check(response)
            .await
            .map_err(|(status, body)| ApiError::Status { status, body })
    }

    /// Token to replay with, or `None` when there is no session to recover.
    async fn recover(&self, rejected: Option<&str>) -> Result<Option<String>, ApiError> {
        if rejected.is_none() && self.credentials.refresh_token()?.is_none() {
            return Ok(None);
        }

        let lease = match self.gate.enter() {
            Ticket::Follower(waiter) => {
                return waiter.wait().await.map(Some).map_err(ApiError::Session);
            }
            Ticket::Leader(lease) => lease,
        };

        // Checked under the lease so no refresh can settle in between.
        let settled = match self.settled_since(rejected) {
            Ok(settled) => settled,
            Err(err) => {
                lease.settle(Err(store_error(&err)));
                return Err(err);
            }
        };
        match settled {
            Some(outcome) => {
                lease.settle(outcome.clone());
                outcome.map(Some).map_err(ApiError::Session)
            }
            None => self.lead_refresh(lease).await.map(Some),
        }
    }

    /// What already happened to the session since a request was rejected with
    /// `rejected`: the stored token moved on (replay with it) or the session was
    /// discarded (share that failure). `None` when a refresh is still needed.
    fn settled_since(&self, rejected: Option<&str>) -> Result<Option<RefreshOutcome>, ApiError> {
        let outcome = match (self.credentials.access_token()?, rejected) {
            (Some(current), _) if rejected != Some(current.as_str()) => {
                tracing::debug!("stored token changed since dispatch; replaying");
                Some(Ok(current))
            }
            (None, Some(_)) => {
                let failure = self
                    .gate
                    .last_failure()
                    .unwrap_or(RefreshError::MissingRefreshToken);
                tracing::debug!(error = %failure, "session already discarded");
                Some(Err(failure))
            }
            _ => None,
        };
        Ok(outcome)
    }

    /// Joins the in-flight refresh or starts one.
    pub(crate) async fn refresh_through_gate(&self) -> Result<String, ApiError> {
        match self.gate.enter() {
            Ticket::Follower(waiter) => waiter.wait().await.map_err(ApiError::Session),
            Ticket::Leader(lease) => self.lead_refresh(lease).await,
        }
    }

    async fn lead_refresh(&self, lease: RefreshLease) -> Result<String, ApiError> {
        match self.refresh_credentials().await {
            Ok(token) => {
                lease.settle(Ok(token.clone()));
                self.session.refreshed();
                Ok(token)
            }
            Err(err) => {
                // Cleared before the queue is released so no request can pick
                // up the dead pair in between.
                self.discard_session(&err);
                lease.settle(Err(err.clone()));
                self.session.invalidated(&err);
                Err(ApiError::Session(err))
            }
        }
    }

    fn discard_session(&self, err: &RefreshError) {
        let cleared = match err {
            RefreshError::MissingRefreshToken => self.credentials.clear_access(),
            _ => self.credentials.clear(),
        };
        if let Err(e) = cleared {
            tracing::warn!(error = %e, "failed to clear stored credentials");
        }
    }

    async fn refresh_credentials(&self) -> RefreshOutcome {
        let refresh = self
            .credentials
            .refresh_token()
            .map_err(store_error)?
            .ok_or(RefreshError::MissingRefreshToken)?;

        tracing::info!("refreshing access token");
        let url = self
            .config
            .endpoint(REFRESH_PATH)
            .map_err(|e| RefreshError::Malformed(e.to_string()))?;
        let transport = |e: reqwest::Error| RefreshError::Transport(redact_secrets(&e.to_string()).into_owned());

        let response = self
            .http
            .post(url)
            .header(ACCEPT, "application/json")
            .json(&RefreshPayload { refresh: &refresh })
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let detail = read_error_body(response)
                .await
                .and_then(|b| b.message().map(|m| redact_secrets(m).into_owned()));
            tracing::info!(status = status.as_u16(), "refresh rejected");
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let text = response.text().await.map_err(transport)?;
        let parsed: RefreshedAccess = serde_json::from_str(&text)
            .map_err(|e| RefreshError::Malformed(e.to_string()))?;
        let access = parsed.access.trim();
        if access.is_empty() {
            return Err(RefreshError::Malformed("empty access token".to_string()));
        }

        self.credentials.store_access(access).map_err(store_error)?;
        if let Some(rotated) = parsed.refresh.as_deref().filter(|r| !r.trim().is_empty()) {
            self.credentials.store_refresh(rotated).map_err(store_error)?;
        }
        tracing::info!(rotated = parsed.refresh.is_some(), "access token refreshed");
        Ok(access.to_string())
    }

    pub async fn request_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        let text = response.text().await?;
        // 204 and empty bodies decode as JSON null.
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        Ok(serde_json::from_str(text)?)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request_json(ApiRequest::get(path)).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(ApiRequest::put(path).json(body)?).await
    }

    pub async fn patch_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.request_json(ApiRequest::patch(path).json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(path)).await?;
        Ok(())
    }
}
