//! Request-side hooks run on every outgoing call before it is sent.

use std::sync::Arc;

use tracing::trace;

use crate::credentials::CredentialStore;
use crate::transport::{ApiRequest, AUTHORIZATION_HEADER};

/// One step of request preparation
pub trait RequestHook: Send + Sync {
    fn name(&self) -> &'static str;

    fn prepare(&self, request: &mut ApiRequest);
}

/// Headers every call carries unless the caller set them already
pub struct DefaultHeaders {
    headers: Vec<(String, String)>,
}

impl DefaultHeaders {
    pub fn new() -> Self {
        Self {
            headers: vec![("content-type".to_string(), "application/json".to_string())],
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

impl Default for DefaultHeaders {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestHook for DefaultHeaders {
    fn name(&self) -> &'static str {
        "default_headers"
    }

    fn prepare(&self, request: &mut ApiRequest) {
        for (key, value) in &self.headers {
            if request.header(key).is_none() {
                request.set_header(key, value.clone());
            }
        }
    }
}

/// Attaches the access token held by the store at send time.
///
/// Nothing is cached between calls, so a refresh that lands between two
/// requests is picked up by the second one.
pub struct BearerDecorator {
    store: Arc<CredentialStore>,
}

impl BearerDecorator {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }
}

impl RequestHook for BearerDecorator {
    fn name(&self) -> &'static str {
        "bearer"
    }

    fn prepare(&self, request: &mut ApiRequest) {
        if let Some(pair) = self.store.get().filter(|p| !p.access_token.is_empty()) {
            request.set_header(AUTHORIZATION_HEADER, pair.bearer());
            trace!(request_id = %request.id(), "Attached bearer credential");
        }
    }
}

/// Ordered chain of request hooks
#[derive(Clone, Default)]
pub struct RequestChain {
    hooks: Vec<Arc<dyn RequestHook>>,
}

impl RequestChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(mut self, hook: Arc<dyn RequestHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn hook_names(&self) -> Vec<&'static str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    pub fn apply(&self, request: &mut ApiRequest) {
        for hook in &self.hooks {
            hook.prepare(request);
        }
    }
}
