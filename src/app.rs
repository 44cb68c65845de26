use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use crate::backend::HttpDemoBackend;
use crate::cli::{Cli, Command};
use crate::config::DemoConfig;
use crate::guard::{request_path, RequestGuard};
use crate::http::{HttpClient, HttpRequest, ReqwestTransport};
use crate::navigator::HistoryNavigator;
use crate::notify::ToastQueue;
use crate::orchestrator::{DemoServices, Orchestrator};
use crate::policy::PolicyTables;
use crate::role::Role;
use crate::vault::{CredentialVault, FileStorage};

pub fn run(cli: Cli) -> Result<(), String> {
    let cfg = load_config(&cli)?;

    match cli.command {
        Command::Flow => {
            let tables = load_tables(&cfg)?;
            print_json(&tables.flow.steps())
        }
        Command::Guard { method, url } => {
            let tables = load_tables(&cfg)?;
            print_json(&guard_report(&tables.guard, &method, &url))
        }
        Command::Resolve { capability } => {
            let tables = load_tables(&cfg)?;
            print_json(&resolve_report(&tables, &capability))
        }
        Command::Session { start } => run_session(cfg, start),
    }
}

fn load_config(cli: &Cli) -> Result<DemoConfig, String> {
    let mut cfg = DemoConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(api_base) = cli.api_base.as_deref() {
        cfg = cfg.with_api_base(api_base).map_err(|e| e.to_string())?;
    }
    if let Some(dir) = cli.policy_dir.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        cfg.policy_dir = Some(PathBuf::from(dir));
    }
    if let Some(path) = cli.storage.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        cfg.storage_path = PathBuf::from(path);
    }
    Ok(cfg)
}

fn load_tables(cfg: &DemoConfig) -> Result<PolicyTables, String> {
    PolicyTables::load(cfg.policy_dir.as_deref()).map_err(|e| e.to_string())
}

fn guard_report(guard: &RequestGuard, method: &str, url: &str) -> Value {
    let reason = guard.evaluate(method, url);
    json!({
        "method": method.trim().to_ascii_uppercase(),
        "url": url,
        "path": request_path(url),
        "blocked": reason.is_some(),
        "message": reason.map(|r| r.to_string()),
    })
}

fn resolve_report(tables: &PolicyTables, capability: &str) -> Value {
    let screen = tables.screens.screen_for(capability);
    json!({
        "capability": capability,
        "screen": screen.map(|s| s.id.clone()),
        "role": screen.map(|s| s.role),
        "route": screen.map(|s| s.route.clone()),
        "disabled": tables.guard.is_action_disabled(capability),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionCommand {
    Status,
    Start,
    Advance,
    GoTo(i64),
    Role(Role),
    Reset,
    Request {
        method: String,
        url: String,
        body: Option<Value>,
    },
    Toasts,
    Exit,
    Quit,
}

fn parse_session_command(line: &str) -> Result<SessionCommand, String> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    match head.to_ascii_lowercase().as_str() {
        "status" => Ok(SessionCommand::Status),
        "start" => Ok(SessionCommand::Start),
        "advance" | "next" => Ok(SessionCommand::Advance),
        "goto" => rest
            .parse::<i64>()
            .map(SessionCommand::GoTo)
            .map_err(|_| format!("goto expects a step index, got '{}'", rest)),
        "role" => rest.parse::<Role>().map(SessionCommand::Role),
        "reset" => Ok(SessionCommand::Reset),
        "request" => {
            let mut parts = rest.splitn(3, char::is_whitespace);
            let method = parts.next().unwrap_or_default().trim();
            let url = parts.next().unwrap_or_default().trim();
            if method.is_empty() || url.is_empty() {
                return Err("usage: request METHOD URL [JSON]".to_string());
            }
            let body = match parts.next().map(str::trim).filter(|v| !v.is_empty()) {
                Some(raw) => Some(
                    serde_json::from_str::<Value>(raw)
                        .map_err(|e| format!("request body is not JSON: {}", e))?,
                ),
                None => None,
            };
            Ok(SessionCommand::Request {
                method: method.to_string(),
                url: url.to_string(),
                body,
            })
        }
        "toasts" => Ok(SessionCommand::Toasts),
        "exit" => Ok(SessionCommand::Exit),
        "quit" | "q" => Ok(SessionCommand::Quit),
        other => Err(format!("unknown command '{}'", other)),
    }
}

struct Session {
    orchestrator: Orchestrator,
    navigator: Arc<HistoryNavigator>,
    toasts: Arc<ToastQueue>,
    api_base: String,
}

impl Session {
    fn build(cfg: &DemoConfig, tables: PolicyTables) -> Result<Self, String> {
        let storage = FileStorage::open(&cfg.storage_path).map_err(|e| {
            format!(
                "failed opening session storage '{}': {}",
                cfg.storage_path.display(),
                e
            )
        })?;
        let navigator = Arc::new(HistoryNavigator::new());
        let toasts = Arc::new(ToastQueue::new(cfg.toast_ttl));
        let services = DemoServices {
            backend: Arc::new(HttpDemoBackend::new(cfg.api_base.clone())),
            vault: CredentialVault::new(Arc::new(storage)),
            http: HttpClient::new(Arc::new(ReqwestTransport::default())),
            navigator: navigator.clone(),
            notifier: toasts.clone(),
        };
        Ok(Self {
            orchestrator: Orchestrator::new(tables, services, cfg.debounce),
            navigator,
            toasts,
            api_base: cfg.api_base.clone(),
        })
    }

    fn status(&self) -> Value {
        let snapshot = self.orchestrator.snapshot();
        let step = self.orchestrator.flow().step(snapshot.current_step_index);
        json!({
            "state": snapshot,
            "step": step.map(|s| json!({
                "id": s.id,
                "title": s.title,
                "description": s.description,
                "targetAction": s.target_action,
            })),
            "route": self.navigator.current(),
        })
    }

    fn changed(&self, changed: bool) -> Value {
        json!({ "changed": changed, "status": self.status() })
    }

    fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.api_base, url)
        } else {
            format!("{}/{}", self.api_base, url)
        }
    }

    /// `None` ends the session.
    async fn execute(&self, command: SessionCommand) -> Result<Option<Value>, String> {
        let orchestrator = &self.orchestrator;
        let output = match command {
            SessionCommand::Status => self.status(),
            SessionCommand::Start => self.changed(orchestrator.start_flow()),
            SessionCommand::Advance => self.changed(orchestrator.advance_flow()),
            SessionCommand::GoTo(index) => {
                let changed = usize::try_from(index)
                    .map(|index| orchestrator.go_to_step(index))
                    .unwrap_or(false);
                self.changed(changed)
            }
            SessionCommand::Role(role) => self.changed(orchestrator.switch_role(role)),
            SessionCommand::Reset => {
                orchestrator.reset_demo().await;
                self.changed(true)
            }
            SessionCommand::Request { method, url, body } => {
                let mut request = HttpRequest::new(method, self.absolute_url(&url));
                if let Some(body) = body {
                    request = request.with_json(&body);
                }
                let response = orchestrator
                    .http()
                    .send(request)
                    .await
                    .map_err(|e| e.to_string())?;
                let body = if response.is_json() {
                    serde_json::from_slice::<Value>(&response.body)
                        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&response.body).into_owned()))
                } else {
                    Value::String(String::from_utf8_lossy(&response.body).into_owned())
                };
                json!({ "status": response.status, "body": body })
            }
            SessionCommand::Toasts => serde_json::to_value(self.toasts.active()).map_err(|e| e.to_string())?,
            SessionCommand::Exit => {
                orchestrator.exit_demo();
                self.status()
            }
            SessionCommand::Quit => return Ok(None),
        };
        Ok(Some(output))
    }
}

fn run_session(cfg: DemoConfig, start: bool) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| e.to_string())?;
    runtime.block_on(session_loop(cfg, start))
}

async fn session_loop(cfg: DemoConfig, start: bool) -> Result<(), String> {
    let tables = load_tables(&cfg)?;
    let session = Session::build(&cfg, tables)?;

    let mut events = session.orchestrator.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(?event, "demo event"),
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if !session.orchestrator.initialize().await {
        tracing::warn!(api_base = %cfg.api_base, "demo not fully initialized; some roles are unavailable");
    }
    if start {
        session.orchestrator.start_flow();
    }
    print_json(&session.status())?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? {
        if line.trim().is_empty() {
            continue;
        }
        let result = match parse_session_command(&line) {
            Ok(command) => session.execute(command).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(Some(output)) => print_json(&output)?,
            Ok(None) => break,
            Err(err) => print_json(&json!({ "error": err }))?,
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let raw = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", raw);
    Ok(())
}
