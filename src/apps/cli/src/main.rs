//! Explore CLI
//!
//! Line-based terminal client for the assistant chat service.

mod commands;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use commands::Command;
use explore_core::agentic::chat::AttachmentUpload;
use explore_core::service::config::parse_model_preference;
use explore_core::{ChatController, ExploreConfig, StaticCredentialProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "explore-cli")]
#[command(about = "Ask the Explore assistant from your terminal", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to <config dir>/explore/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bearer token for the chat service
    #[arg(long, env = "EXPLORE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Overrides api.base_url
    #[arg(long)]
    api_url: Option<String>,

    /// Overrides chat.model_preference (fast | thinking)
    #[arg(long)]
    model: Option<String>,

    /// Log filter, e.g. `info` or `explore_core=debug`
    #[arg(long, env = "EXPLORE_LOG", default_value = "warn")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<ExploreConfig> {
    let mut config = ExploreConfig::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }
    if let Some(model) = &cli.model {
        config.chat.model_preference = parse_model_preference(model)?;
    }
    config.validate()?;
    Ok(config)
}

async fn check_health(controller: &ChatController) {
    match controller.backend().health().await {
        Ok(status) if status.is_healthy() => info!("Chat service healthy: service={}", status.service),
        Ok(status) => {
            warn!("Chat service degraded: status={}", status.status);
            eprintln!("warning: chat service reports status '{}'", status.status);
        }
        Err(e) => {
            warn!("Chat service health check failed: error={}", e);
            eprintln!("warning: chat service unreachable ({})", e.user_message());
        }
    }
}

/// Starts `command` in the background so the prompt stays responsive.
fn dispatch(controller: &ChatController, command: Command) {
    let controller = controller.clone();
    match command {
        Command::Send(text) => {
            tokio::spawn(async move {
                if let Err(e) = controller.send_message(&text).await {
                    eprintln!("error: {}", e.user_message());
                }
            });
        }
        Command::Attach(path) => {
            tokio::spawn(async move {
                let upload = match AttachmentUpload::from_path(&path).await {
                    Ok(upload) => upload,
                    Err(e) => {
                        eprintln!("error: cannot read {}: {}", path.display(), e);
                        return;
                    }
                };
                // Failures are rendered from the snapshot's attachment errors.
                let _ = controller.add_attachment(upload).await;
            });
        }
        Command::Detach(filename) => {
            if !controller.remove_attachment(&filename) {
                eprintln!("no pending attachment named {}", filename);
            }
        }
        Command::Edit { index, text } => {
            let snapshot = controller.snapshot();
            let Some(turn) = snapshot.messages.iter().filter(|t| t.is_user()).nth(index - 1) else {
                eprintln!("no message #{} (see /history)", index);
                return;
            };
            let turn_id = turn.id.clone();
            tokio::spawn(async move {
                if let Err(e) = controller.edit_and_resend(&turn_id, &text).await {
                    eprintln!("error: {}", e.user_message());
                }
            });
        }
        Command::Regenerate => {
            tokio::spawn(async move {
                if let Err(e) = controller.regenerate_response().await {
                    eprintln!("error: {}", e.user_message());
                }
            });
        }
        Command::Cancel => controller.cancel_request(),
        Command::Clear => controller.clear_chat(),
        Command::History => print!("{}", render::history(&controller.snapshot())),
        Command::Help => println!("{}", commands::HELP),
        Command::Quit => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = load_config(&cli)?;
    let credentials = Arc::new(StaticCredentialProvider::new(cli.token.clone()));
    let controller = ChatController::from_config(&config, credentials)?;
    info!(
        "Explore CLI started: version={}, api={}, model={}",
        explore_core::VERSION,
        config.api.base_url,
        config.chat.model_preference.as_str()
    );

    check_health(&controller).await;
    if cli.token.is_none() {
        eprintln!("warning: no token given (--token or EXPLORE_TOKEN); requests will fail");
    }
    println!("Explore assistant. Type /help for commands.");

    let renderer = tokio::spawn(render::follow(controller.subscribe()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match commands::parse(&line) {
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => dispatch(&controller, command),
            Ok(None) => {}
            Err(e) => eprintln!("{}", e),
        }
    }

    controller.cancel_request();
    renderer.abort();
    Ok(())
}
