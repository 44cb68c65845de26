//! The two demo middlewares installed into the shared `HttpClient`.
//!
//! `GuardLayer` runs first and answers blocked calls itself with a
//! synthetic 403. `ResponseObserver` runs last, next to the transport, and
//! hands successful JSON bodies to the flow engine without touching the
//! response the caller receives.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::guard::{request_path, BlockReason, RequestGuard};
use crate::http::{tap, HttpError, HttpRequest, HttpResponse, Middleware, MiddlewareStack, Next};
use crate::notify::{Notifier, ToastLevel};

pub const RESTRICTED_ERROR: &str = "demo_restricted";

/// Where intercepted traffic is reported.
pub trait ResponseSink: Send + Sync {
    /// Responses are only parsed while this is true.
    fn flow_active(&self) -> bool;

    fn on_api_response(&self, method: &str, url: &str, body: Value);

    fn on_request_blocked(&self, _method: &str, _path: &str, _reason: &BlockReason) {}
}

pub struct GuardLayer {
    guard: Arc<RequestGuard>,
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn ResponseSink>,
}

impl GuardLayer {
    pub fn new(guard: Arc<RequestGuard>, notifier: Arc<dyn Notifier>, sink: Arc<dyn ResponseSink>) -> Self {
        Self {
            guard,
            notifier,
            sink,
        }
    }
}

pub fn restricted_response(method: &str, path: &str, reason: &BlockReason) -> HttpResponse {
    HttpResponse::json(
        403,
        &json!({
            "error": RESTRICTED_ERROR,
            "message": reason.as_str(),
            "method": method,
            "path": path,
        }),
    )
}

#[async_trait]
impl Middleware for GuardLayer {
    fn name(&self) -> &str {
        "demo-guard"
    }

    async fn handle(&self, request: HttpRequest, next: Next<'_>) -> Result<HttpResponse, HttpError> {
        let Some(reason) = self.guard.evaluate(&request.method, &request.url) else {
            return next.run(request).await;
        };

        let path = request_path(&request.url);
        tracing::warn!(method = %request.method, %path, reason = %reason, "blocked demo request");
        self.notifier.toast(ToastLevel::Warning, reason.as_str());
        self.sink.on_request_blocked(&request.method, &path, &reason);
        Ok(restricted_response(&request.method, &path, &reason))
    }
}

pub struct ResponseObserver {
    sink: Arc<dyn ResponseSink>,
}

impl ResponseObserver {
    pub fn new(sink: Arc<dyn ResponseSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Middleware for ResponseObserver {
    fn name(&self) -> &str {
        "demo-observer"
    }

    async fn handle(&self, request: HttpRequest, next: Next<'_>) -> Result<HttpResponse, HttpError> {
        let method = request.method.clone();
        let url = request.url.clone();
        let response = next.run(request).await?;

        if response.is_success() && self.sink.flow_active() {
            let sink = Arc::clone(&self.sink);
            tap(&response, move |copy| {
                if !copy.is_json() {
                    return Ok(());
                }
                let body = serde_json::from_slice::<Value>(&copy.body)?;
                sink.on_api_response(&method, &url, body);
                Ok::<(), serde_json::Error>(())
            });
        }

        Ok(response)
    }
}

pub fn build_demo_stack(
    guard: Arc<RequestGuard>,
    notifier: Arc<dyn Notifier>,
    sink: Arc<dyn ResponseSink>,
) -> MiddlewareStack {
    MiddlewareStack::new()
        .with(GuardLayer::new(guard, notifier, Arc::clone(&sink)))
        .with(ResponseObserver::new(sink))
}
