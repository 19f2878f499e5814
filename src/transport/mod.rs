//! HTTP transport seam for the request pipeline.
//!
//! Everything above this module speaks in [`ApiRequest`] and
//! [`SimpleHttpResponse`]; the [`HttpClient`] trait is the only place a real
//! network library is touched, which keeps the pipeline testable with
//! [`mock::MockHttpClient`].

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[cfg(test)]
pub mod mock;

/// Header carrying the bearer credential
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// HTTP method enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::DELETE => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::GET => reqwest::Method::GET,
            HttpMethod::POST => reqwest::Method::POST,
            HttpMethod::PUT => reqwest::Method::PUT,
            HttpMethod::PATCH => reqwest::Method::PATCH,
            HttpMethod::DELETE => reqwest::Method::DELETE,
        }
    }
}

/// Description of one outgoing API call.
///
/// The descriptor is what gets decorated, sent, and (at most once) replayed.
/// Header names are stored lowercase.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    id: Uuid,
    method: HttpMethod,
    path: String,
    body: Option<Value>,
    headers: HashMap<String, String>,
    retried: bool,
    public: bool,
}

impl ApiRequest {
    /// Create a new request for a path relative to the API base URL
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            body: None,
            headers: HashMap::new(),
            retried: false,
            public: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::DELETE, path)
    }

    /// Attach a raw JSON body
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize a value as the JSON body
    pub fn with_json<T: Serialize>(self, body: &T) -> serde_json::Result<Self> {
        Ok(self.with_body(serde_json::to_value(body)?))
    }

    /// Add a header
    pub fn with_header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.set_header(key, value);
        self
    }

    /// Mark the request as not carrying a session credential.
    ///
    /// A 401 on a public request is the caller's answer (bad password, etc.)
    /// and never drives a credential refresh.
    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn set_header(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
    }

    pub fn remove_header(&mut self, key: &str) -> Option<String> {
        self.headers.remove(&key.to_ascii_lowercase())
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn is_retry(&self) -> bool {
        self.retried
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    /// Turn this request into its single replay.
    ///
    /// The stale credential is dropped so the decorator attaches whatever the
    /// store holds at resend time.
    pub fn into_retry(mut self) -> Self {
        self.retried = true;
        self.headers.remove(AUTHORIZATION_HEADER);
        self
    }
}

/// A very simple version that only holds response data
#[derive(Debug, Clone)]
pub struct SimpleHttpResponse {
    /// HTTP status code
    status_code: u16,
    /// Response body
    body: String,
    /// Response headers
    headers: HashMap<String, String>,
}

impl SimpleHttpResponse {
    /// Create a new response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status_code: status,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Add a header
    pub fn with_header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Get the status code
    pub fn status(&self) -> u16 {
        self.status_code
    }

    /// Get a reference to the response body
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Look up a response header
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Get the body as text (consumes the response)
    pub fn text(self) -> String {
        self.body
    }

    /// Parse body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Check if successful (2xx status)
    pub fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code < 300
    }

    /// Check for an authorization failure (401)
    pub fn is_unauthorized(&self) -> bool {
        self.status_code == http::StatusCode::UNAUTHORIZED.as_u16()
    }
}

/// Trait for HTTP client operations, allowing for mocking
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform a request. An `Err` means no response was received at all.
    async fn execute(
        &self,
        method: HttpMethod,
        url: &str,
        headers: HashMap<String, String>,
        body: Option<String>,
    ) -> Result<SimpleHttpResponse>;

    /// Perform HTTP GET request and return a SimpleHttpResponse
    async fn get(&self, url: &str, headers: HashMap<String, String>) -> Result<SimpleHttpResponse> {
        self.execute(HttpMethod::GET, url, headers, None).await
    }

    /// Perform HTTP POST request and return a SimpleHttpResponse
    async fn post(
        &self,
        url: &str,
        headers: HashMap<String, String>,
        body: String,
    ) -> Result<SimpleHttpResponse> {
        self.execute(HttpMethod::POST, url, headers, Some(body))
            .await
    }
}

/// Implementation of HttpClient using reqwest
pub struct ReqwestHttpClient {
    /// Internal reqwest client
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a new ReqwestHttpClient
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a client whose every request is bounded by `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Create a new client with custom configuration
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(
        &self,
        method: HttpMethod,
        url: &str,
        headers: HashMap<String, String>,
        body: Option<String>,
    ) -> Result<SimpleHttpResponse> {
        let mut request = self.client.request(method.into(), url);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await?;

        let status = response.status().as_u16();
        let response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|value| (k.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.text().await?;

        let result = response_headers
            .into_iter()
            .fold(SimpleHttpResponse::new(status, body), |resp, (k, v)| {
                resp.with_header(k, v)
            });

        Ok(result)
    }
}
