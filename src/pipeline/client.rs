//! The response side of the pipeline: send, inspect, refresh once, replay once.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::api::decode_response;
use crate::error::{ApiError, ApiResult};
use crate::events::{NoticeLevel, SessionEvent, SessionEvents};
use crate::pipeline::coordinator::RefreshCoordinator;
use crate::pipeline::decorator::RequestChain;
use crate::transport::{ApiRequest, HttpClient, SimpleHttpResponse};

/// Join a base URL and a path with exactly one slash between them
pub fn join_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Authenticated API client.
///
/// Every call is decorated, sent, and inspected. A 401 on a protected call
/// drives the [`RefreshCoordinator`] and the call is replayed exactly once
/// with the new credential. Everything else passes through untouched.
#[derive(Clone)]
pub struct ApiClient {
    http: Arc<dyn HttpClient>,
    base_url: String,
    chain: RequestChain,
    coordinator: RefreshCoordinator,
    events: SessionEvents,
}

impl ApiClient {
    pub fn new(
        http: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        chain: RequestChain,
        coordinator: RefreshCoordinator,
        events: SessionEvents,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            chain,
            coordinator,
            events,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Send a request through the pipeline.
    ///
    /// Non-401 failures are also announced as an error notice; 401s stay
    /// silent because the caller presents them in context.
    pub async fn send(&self, request: ApiRequest) -> ApiResult<SimpleHttpResponse> {
        let result = self.drive(request).await;
        if let Err(e) = &result {
            self.announce(e).await;
        }
        result
    }

    /// Send a request and decode its JSON payload
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> ApiResult<T> {
        let response = self.send(request).await?;
        match decode_response(&response) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.announce(&e).await;
                Err(e)
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.send_json(ApiRequest::get(path)).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResult<T> {
        let request = ApiRequest::post(path)
            .with_json(body)
            .map_err(ApiError::decode)?;
        self.send_json(request).await
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResult<T> {
        let request = ApiRequest::put(path)
            .with_json(body)
            .map_err(ApiError::decode)?;
        self.send_json(request).await
    }

    pub async fn delete(&self, path: &str) -> ApiResult<SimpleHttpResponse> {
        self.send(ApiRequest::delete(path)).await
    }

    async fn drive(&self, request: ApiRequest) -> ApiResult<SimpleHttpResponse> {
        let response = self.dispatch(&request).await?;
        if !response.is_unauthorized() {
            return into_result(response);
        }

        let unauthorized = ApiError::from_status(response.status(), response.body());

        if request.is_public() {
            debug!(request_id = %request.id(), path = request.path(), "Public request rejected");
            return Err(unauthorized);
        }

        if request.is_retry() {
            warn!(
                request_id = %request.id(),
                path = request.path(),
                "Credential rejected again after refresh, giving up"
            );
            return Err(unauthorized);
        }

        debug!(request_id = %request.id(), path = request.path(), "Authorization failed, ensuring fresh credential");

        match self.coordinator.ensure_fresh_credential().await {
            Ok(_) => {
                let retry = request.into_retry();
                let response = self.dispatch(&retry).await?;
                into_result(response)
            }
            Err(e) => {
                warn!(
                    request_id = %request.id(),
                    error = %e,
                    "Refresh failed, surfacing original authorization failure"
                );
                Err(unauthorized)
            }
        }
    }

    async fn dispatch(&self, request: &ApiRequest) -> ApiResult<SimpleHttpResponse> {
        let mut prepared = request.clone();
        self.chain.apply(&mut prepared);

        let body = prepared
            .body()
            .map(serde_json::to_string)
            .transpose()
            .map_err(ApiError::decode)?;
        let url = join_url(&self.base_url, prepared.path());

        debug!(
            request_id = %prepared.id(),
            method = %prepared.method(),
            path = prepared.path(),
            retried = prepared.is_retry(),
            "Sending request"
        );

        let response = self
            .http
            .execute(prepared.method(), &url, prepared.headers().clone(), body)
            .await
            .map_err(|e| ApiError::network(format!("{:#}", e)))?;

        debug!(
            request_id = %prepared.id(),
            status = response.status(),
            "Response received"
        );
        Ok(response)
    }

    async fn announce(&self, error: &ApiError) {
        if error.is_unauthorized() {
            return;
        }
        self.events
            .publish(SessionEvent::notice(NoticeLevel::Error, error.message()))
            .await;
    }
}

fn into_result(response: SimpleHttpResponse) -> ApiResult<SimpleHttpResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ApiError::from_status(response.status(), response.body()))
    }
}
