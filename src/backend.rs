use std::error::Error;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::role::Role;

pub const TOKEN_PATH: &str = "/api/v1/demo/token";
pub const RESET_PATH: &str = "/api/v1/demo/reset";

/// Token response from the backend's demo endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoToken {
    pub access_token: String,
    pub role: Role,
    #[serde(default)]
    pub outlet_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub employee_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    #[error("demo backend request failed: {0}")]
    Transport(String),
    #[error("demo backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("demo backend response invalid: {0}")]
    InvalidResponse(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// The two calls the engine makes against the backend outside the
/// intercepted client.
#[async_trait]
pub trait DemoBackend: Send + Sync {
    async fn fetch_demo_token(&self, role: Role) -> BackendResult<DemoToken>;
    async fn reset_demo_data(&self) -> BackendResult<()>;
}

#[derive(Debug, Clone)]
pub struct HttpDemoBackend {
    client: reqwest::Client,
    api_base: String,
}

impl HttpDemoBackend {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_base)
    }

    pub fn with_client(client: reqwest::Client, api_base: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }
}

#[async_trait]
impl DemoBackend for HttpDemoBackend {
    async fn fetch_demo_token(&self, role: Role) -> BackendResult<DemoToken> {
        let response = self
            .client
            .post(self.url(TOKEN_PATH))
            .json(&serde_json::json!({ "role": role }))
            .send()
            .await
            .map_err(|err| BackendError::Transport(format_reqwest_error(&err)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token = response
            .json::<DemoToken>()
            .await
            .map_err(|err| BackendError::InvalidResponse(err.to_string()))?;
        if token.access_token.trim().is_empty() {
            return Err(BackendError::InvalidResponse(format!(
                "empty access token for role '{}'",
                role
            )));
        }
        if token.role != role {
            return Err(BackendError::InvalidResponse(format!(
                "requested role '{}' but backend issued '{}'",
                role, token.role
            )));
        }
        Ok(token)
    }

    async fn reset_demo_data(&self) -> BackendResult<()> {
        let response = self
            .client
            .post(self.url(RESET_PATH))
            .send()
            .await
            .map_err(|err| BackendError::Transport(format_reqwest_error(&err)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

pub(crate) fn format_reqwest_error(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut current: Option<&(dyn Error + 'static)> = error.source();
    while let Some(source) = current {
        message.push_str(": ");
        message.push_str(&source.to_string());
        current = source.source();
    }
    message
}
