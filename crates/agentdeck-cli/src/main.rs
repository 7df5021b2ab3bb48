//! AgentDeck terminal frontend
//!
//! Reads chat lines from stdin, drives the command router and prints agent
//! events. Logs go to stderr so stdout carries only agent output and replies.

mod intent;

use agentdeck_core::{
    AgentEvent, AgentManager, CommandRouter, EventStream, ManagerConfig, OutputStream, RouterReply,
};
use anyhow::{bail, Context};
use intent::Input;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USAGE: &str = "usage: agentdeck [--config <path>] [--json]";

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    /// Print events as JSON lines instead of text
    json: bool,
}

impl Options {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut options = Options::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--json" => options.json = true,
                "--config" => {
                    let path = args.next().context("--config needs a path")?;
                    options.config = Some(PathBuf::from(path));
                }
                "-h" | "--help" => {
                    println!("{}", USAGE);
                    std::process::exit(0);
                }
                other => bail!("unknown argument '{}'\n{}", other, USAGE),
            }
        }
        Ok(options)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = Options::parse(std::env::args().skip(1))?;
    let config = match &options.config {
        Some(path) => ManagerConfig::load_from(path)?,
        None => ManagerConfig::load()?,
    };
    info!("Starting AgentDeck (default mode {:?})", config.default_mode);

    let manager = Arc::new(AgentManager::new(config));
    let router = CommandRouter::new(Arc::clone(&manager));
    let printer = tokio::spawn(print_events(manager.subscribe(), options.json));

    println!("{}", router.bootstrap().await);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let intent = match intent::classify(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Intent(intent) => intent,
        };
        match router.dispatch(intent).await {
            // The agent's own output is the answer
            RouterReply::Sent(id) => debug!("Sent input to {}", id),
            reply => println!("{}", reply),
        }
    }

    info!("Shutting down");
    manager.stop_all().await;
    drop(router);
    drop(manager);

    // Let the printer flush the final exit events
    let _ = tokio::time::timeout(Duration::from_millis(500), printer).await;
    Ok(())
}

async fn print_events(mut events: EventStream, json: bool) {
    while let Some(event) = events.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::error!("Failed to encode {}: {}", event.name(), e),
            }
            continue;
        }

        match event {
            AgentEvent::Output(output) => {
                let mut stdout = std::io::stdout().lock();
                let _ = match output.stream {
                    OutputStream::Stdout => write!(stdout, "{}", output.chunk),
                    OutputStream::Stderr => {
                        write!(stdout, "[{}:stderr] {}", output.agent_id, output.chunk)
                    }
                };
                let _ = stdout.flush();
            }
            AgentEvent::Exit(exit) => match exit.exit_code {
                Some(code) => println!("[{} exited with code {}]", exit.agent_id, code),
                None => println!("[{} exited]", exit.agent_id),
            },
            AgentEvent::Diagnostic(diag) => match diag.agent_id {
                Some(id) => println!("[{:?}] {}: {}", diag.level, id, diag.message),
                None => println!("[{:?}] {}", diag.level, diag.message),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> anyhow::Result<Options> {
        Options::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_options() {
        let options = parse(&["--json", "--config", "/tmp/deck.json"]).unwrap();
        assert!(options.json);
        assert_eq!(options.config, Some(PathBuf::from("/tmp/deck.json")));

        assert!(parse(&["--config"]).is_err());
        assert!(parse(&["--bogus"]).is_err());
    }
}
