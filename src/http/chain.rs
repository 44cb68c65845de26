use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{HttpError, HttpRequest, HttpResponse, Transport};

/// One layer around outbound calls. Call `next.run(request)` to continue,
/// or return a response directly to short-circuit.
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, request: HttpRequest, next: Next<'_>) -> Result<HttpResponse, HttpError>;
}

/// The rest of the chain, ending at the transport.
pub struct Next<'a> {
    layers: &'a [Arc<dyn Middleware>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    fn new(layers: &'a [Arc<dyn Middleware>], transport: &'a dyn Transport) -> Self {
        Self { layers, transport }
    }

    pub async fn run(self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        match self.layers.split_first() {
            Some((layer, rest)) => {
                layer
                    .handle(request, Next::new(rest, self.transport))
                    .await
            }
            None => self.transport.send(request).await,
        }
    }
}

#[derive(Clone, Default)]
pub struct MiddlewareStack {
    layers: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, layer: impl Middleware + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// The one outbound entry point. Installing a stack routes every later
/// call through it; uninstalling restores the bare transport.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    stack: Arc<RwLock<Option<Arc<MiddlewareStack>>>>,
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            stack: Arc::new(RwLock::new(None)),
        }
    }

    pub fn install(&self, stack: MiddlewareStack) -> Result<(), HttpError> {
        let mut slot = self
            .stack
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return Err(HttpError::AlreadyInstalled);
        }
        tracing::debug!(layers = ?stack.names(), "installed middleware stack");
        *slot = Some(Arc::new(stack));
        Ok(())
    }

    /// Returns whether a stack was removed.
    pub fn uninstall(&self) -> bool {
        let removed = self
            .stack
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .is_some();
        if removed {
            tracing::debug!("uninstalled middleware stack");
        }
        removed
    }

    pub fn is_installed(&self) -> bool {
        self.stack
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let stack = self
            .stack
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        match stack {
            Some(stack) => {
                Next::new(&stack.layers, self.transport.as_ref())
                    .run(request)
                    .await
            }
            None => self.transport.send(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubTransport;
    use serde_json::json;

    struct Tag(&'static str);

    #[async_trait]
    impl Middleware for Tag {
        fn name(&self) -> &str {
            self.0
        }

        async fn handle(
            &self,
            request: HttpRequest,
            next: Next<'_>,
        ) -> Result<HttpResponse, HttpError> {
            let mut response = next.run(request.with_header("x-layer", self.0)).await?;
            response.headers.push(super::super::Header {
                name: "x-seen".to_string(),
                value: self.0.to_string(),
            });
            Ok(response)
        }
    }

    struct Refuse;

    #[async_trait]
    impl Middleware for Refuse {
        fn name(&self) -> &str {
            "refuse"
        }

        async fn handle(&self, _: HttpRequest, _: Next<'_>) -> Result<HttpResponse, HttpError> {
            Ok(HttpResponse::json(403, &json!({"error": "refused"})))
        }
    }

    #[tokio::test]
    async fn layers_run_in_order_around_transport() {
        let transport = Arc::new(StubTransport::ok(json!({"ok": true})));
        let client = HttpClient::new(transport.clone());
        client
            .install(MiddlewareStack::new().with(Tag("outer")).with(Tag("inner")))
            .unwrap();

        let response = client.send(HttpRequest::get("http://x/api")).await.unwrap();
        let seen: Vec<_> = response
            .headers
            .iter()
            .filter(|h| h.name == "x-seen")
            .map(|h| h.value.as_str())
            .collect();
        assert_eq!(seen, vec!["inner", "outer"]);

        let sent = transport.requests();
        let layers: Vec<_> = sent[0]
            .headers
            .iter()
            .filter(|h| h.name == "x-layer")
            .map(|h| h.value.as_str())
            .collect();
        assert_eq!(layers, vec!["outer", "inner"]);
    }

    #[tokio::test]
    async fn short_circuit_never_reaches_transport() {
        let transport = Arc::new(StubTransport::ok(json!({})));
        let client = HttpClient::new(transport.clone());
        client.install(MiddlewareStack::new().with(Refuse)).unwrap();

        let response = client.send(HttpRequest::get("http://x/api")).await.unwrap();
        assert_eq!(response.status, 403);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn install_is_exclusive_and_uninstall_restores_bare_path() {
        let transport = Arc::new(StubTransport::ok(json!({})));
        let client = HttpClient::new(transport.clone());
        client.install(MiddlewareStack::new().with(Refuse)).unwrap();
        assert!(matches!(
            client.install(MiddlewareStack::new()),
            Err(HttpError::AlreadyInstalled)
        ));

        assert!(client.uninstall());
        assert!(!client.uninstall());
        let response = client.send(HttpRequest::get("http://x/api")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.requests().len(), 1);
    }
}
