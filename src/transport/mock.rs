//! Scriptable HttpClient for tests.
//!
//! Routes are keyed by method and full URL. A route can be held closed with
//! [`MockHttpClient::hold`] so tests can force several callers to pile up
//! behind an in-flight request before letting it finish.

use super::*;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

type Responder = Arc<dyn Fn(&RecordedRequest) -> Result<SimpleHttpResponse> + Send + Sync>;

/// A request observed by the mock
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl RecordedRequest {
    /// The bearer token carried by this request, if any
    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION_HEADER)
            .and_then(|v| v.strip_prefix("Bearer "))
    }

    pub fn json(&self) -> Option<Value> {
        self.body
            .as_deref()
            .and_then(|b| serde_json::from_str(b).ok())
    }
}

/// Handle that releases a held route
pub struct Gate {
    sender: watch::Sender<bool>,
}

impl Gate {
    pub fn open(&self) {
        let _ = self.sender.send(true);
    }
}

/// A mock HTTP client that returns predefined responses
#[derive(Clone, Default)]
pub struct MockHttpClient {
    routes: Arc<Mutex<HashMap<(HttpMethod, String), Responder>>>,
    gates: Arc<Mutex<HashMap<String, watch::Receiver<bool>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockHttpClient {
    /// Create a new mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler computing the response from the request
    pub fn mock_with<F>(&self, method: HttpMethod, url: impl Into<String>, handler: F)
    where
        F: Fn(&RecordedRequest) -> Result<SimpleHttpResponse> + Send + Sync + 'static,
    {
        self.routes
            .lock()
            .unwrap()
            .insert((method, url.into()), Arc::new(handler));
    }

    /// Register a fixed response
    pub fn mock_response(
        &self,
        method: HttpMethod,
        url: impl Into<String>,
        status: u16,
        body: impl Into<String>,
    ) {
        let body = body.into();
        self.mock_with(method, url, move |_| {
            Ok(SimpleHttpResponse::new(status, body.clone()))
        });
    }

    /// Register a JSON response
    pub fn mock_json<T: serde::Serialize>(
        &self,
        method: HttpMethod,
        url: impl Into<String>,
        status: u16,
        data: &T,
    ) -> Result<()> {
        let body = serde_json::to_string(data)?;
        self.mock_with(method, url, move |_| {
            Ok(SimpleHttpResponse::new(status, body.clone())
                .with_header("content-type", "application/json"))
        });
        Ok(())
    }

    /// Make a route fail without producing a response
    pub fn mock_network_error(&self, method: HttpMethod, url: impl Into<String>) {
        self.mock_with(method, url, |req| {
            Err(anyhow::anyhow!("connection refused: {}", req.url))
        });
    }

    /// Hold every request to `url` until the returned gate is opened
    pub fn hold(&self, url: impl Into<String>) -> Gate {
        let (sender, receiver) = watch::channel(false);
        self.gates.lock().unwrap().insert(url.into(), receiver);
        Gate { sender }
    }

    /// Get the list of recorded requests
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Recorded requests for one method and URL
    pub fn requests_to(&self, method: HttpMethod, url: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.url == url)
            .collect()
    }

    pub fn count(&self, method: HttpMethod, url: &str) -> usize {
        self.requests_to(method, url).len()
    }

    /// Yield until at least `n` requests to the route have been recorded
    pub async fn wait_for_requests(&self, method: HttpMethod, url: &str, n: usize) {
        while self.count(method, url) < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait::async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(
        &self,
        method: HttpMethod,
        url: &str,
        headers: HashMap<String, String>,
        body: Option<String>,
    ) -> Result<SimpleHttpResponse> {
        let recorded = RecordedRequest {
            method,
            url: url.to_string(),
            headers,
            body,
        };
        self.requests.lock().unwrap().push(recorded.clone());

        let gate = self.gates.lock().unwrap().get(url).cloned();
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }

        let responder = self
            .routes
            .lock()
            .unwrap()
            .get(&(method, url.to_string()))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No mock response configured for {} {}", method, url))?;

        responder(&recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_http_client() -> Result<()> {
        let client = MockHttpClient::new();

        client.mock_response(HttpMethod::GET, "https://example.com/api", 200, "Hello, world!");
        let test_data = serde_json::json!({
            "data": [{"id": "123", "name": "Test"}]
        });
        client.mock_json(HttpMethod::GET, "https://example.com/api/json", 200, &test_data)?;
        client.mock_response(HttpMethod::GET, "https://example.com/api/error", 404, "Not found");

        let response = client.get("https://example.com/api", HashMap::new()).await?;
        assert_eq!(response.status(), 200);
        assert_eq!(response.text(), "Hello, world!");

        let response = client
            .get("https://example.com/api/json", HashMap::new())
            .await?;
        let json: Value = response.json()?;
        assert_eq!(json, test_data);

        let response = client
            .get("https://example.com/api/error", HashMap::new())
            .await?;
        assert_eq!(response.status(), 404);

        // Unconfigured route behaves like a transport failure
        let result = client
            .get("https://example.com/not-found", HashMap::new())
            .await;
        assert!(result.is_err());

        let requests = client.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[0].url, "https://example.com/api");
        assert_eq!(requests[0].method, HttpMethod::GET);

        Ok(())
    }

    #[tokio::test]
    async fn test_held_route_waits_for_gate() -> Result<()> {
        let client = MockHttpClient::new();
        client.mock_response(HttpMethod::POST, "https://example.com/slow", 200, "done");
        let gate = client.hold("https://example.com/slow");

        let task = {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .post("https://example.com/slow", HashMap::new(), String::new())
                    .await
            })
        };

        client
            .wait_for_requests(HttpMethod::POST, "https://example.com/slow", 1)
            .await;
        assert!(!task.is_finished());

        gate.open();
        let response = task.await??;
        assert_eq!(response.body(), "done");
        Ok(())
    }
}
