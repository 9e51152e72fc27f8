mod app;
pub mod client;
mod config;
pub mod context;
pub mod error;
pub mod history;
mod render;
pub mod session;
pub mod types;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, mpsc};

use clap::Parser;
use tracing::{error, info};

use crate::app::{TerminalApp, UiMsg};
use crate::client::api::OllamaClient;
use crate::config::AppConfig;
use crate::error::prelude::ConfigError;
use crate::session::{Session, SessionSettings};

#[derive(Parser, Debug)]
#[command(name = "agentx")]
#[command(about = "Chat with a local Ollama model", long_about = None)]
struct Args {
    /// Path to agentx.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ollama host, e.g. localhost:11434
    #[arg(long)]
    host: Option<String>,

    /// Model name
    #[arg(short, long)]
    model: Option<String>,

    /// Directory that holds per-user session folders
    #[arg(long)]
    sessions_root: Option<String>,

    /// Skip the startup request that loads the model
    #[arg(long)]
    skip_handshake: bool,

    /// Write the resolved configuration to the config file and exit
    #[arg(long)]
    save_config: bool,
}

fn resolve_config(args: &Args) -> Result<AppConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };
    config.apply_env_overrides();
    if let Some(host) = &args.host {
        config.agentx.ollama_host = host.clone();
    }
    if let Some(model) = &args.model {
        config.agentx.ollama_model = model.clone();
    }
    if let Some(root) = &args.sessions_root {
        config.agentx.sessions_root = root.clone();
    }
    Ok(config)
}

fn main() -> ExitCode {
    // Before the subscriber, so RUST_LOG from .env applies.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dotenv {
        if !e.not_found() {
            error!(error = %e, "failed to load .env");
        }
    }

    let args = Args::parse();
    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "cannot load configuration");
            return ExitCode::FAILURE;
        }
    };

    if args.save_config {
        let saved = match &args.config {
            Some(path) => config.save_to(path),
            None => config.save(),
        };
        return match saved {
            Ok(()) => {
                info!("configuration saved");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "cannot save configuration");
                ExitCode::FAILURE
            }
        };
    }

    let transport = match OllamaClient::new(&config.agentx.ollama_host) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, host = %config.agentx.ollama_host, "invalid ollama host");
            return ExitCode::FAILURE;
        }
    };
    info!(host = %transport.base_url(), model = %config.agentx.ollama_model, "using ollama");

    let (tx, rx) = mpsc::channel();
    let sink_tx = tx.clone();
    let session = match Session::new(
        SessionSettings::from_config(&config),
        Arc::new(transport),
        move |event| {
            let _ = sink_tx.send(UiMsg::Session(event));
        },
    ) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "cannot start session");
            return ExitCode::FAILURE;
        }
    };

    if !args.skip_handshake {
        if let Err(e) = session.perform_service_handshake() {
            error!(error = %e, "startup handshake failed");
            return ExitCode::FAILURE;
        }
    }

    info!(folder = %session.session_folder().display(), "ready");
    TerminalApp::spawn_input_reader(tx);
    TerminalApp::new(session, rx).run();
    ExitCode::SUCCESS
}
