use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "demoflow")]
#[command(about = "Guided multi-role demo engine: credential vault, request guard and flow runner")]
pub struct Cli {
    /// Demo backend base URL (overrides DEMOFLOW_API_BASE).
    #[arg(long, global = true)]
    pub api_base: Option<String>,
    /// Directory with flow.json / guard.json / screens.json overrides.
    #[arg(long, global = true)]
    pub policy_dir: Option<String>,
    /// Session storage file (overrides DEMOFLOW_STORAGE).
    #[arg(long, global = true)]
    pub storage: Option<String>,
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the flow script.
    Flow,
    /// Check whether a call would be blocked.
    Guard {
        #[arg(long)]
        method: String,
        #[arg(long)]
        url: String,
    },
    /// Resolve a capability to its screen route.
    Resolve {
        #[arg()]
        capability: String,
    },
    /// Run an interactive demo session reading commands from stdin.
    Session {
        /// Start the flow right after initialization.
        #[arg(long)]
        start: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_guard_with_global_flags() {
        let cli = Cli::try_parse_from([
            "demoflow",
            "guard",
            "--method",
            "DELETE",
            "--url",
            "/api/v1/orders/1",
            "--api-base",
            "http://localhost:9000",
        ])
        .unwrap();
        assert_eq!(cli.api_base.as_deref(), Some("http://localhost:9000"));
        match cli.command {
            Command::Guard { method, url } => {
                assert_eq!(method, "DELETE");
                assert_eq!(url, "/api/v1/orders/1");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn session_start_flag() {
        let cli = Cli::try_parse_from(["demoflow", "session", "--start"]).unwrap();
        assert!(matches!(cli.command, Command::Session { start: true }));
    }
}
