//! Orbit CLI entry point

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use orbit::adapters::{CliChannel, Interrupt};
use orbit::agent::{llm, Conversation};
use orbit::auth::{self, FileTokenStore, GoogleOAuthClient, TokenManager};
use orbit::config::{self, Config};
use orbit::google::GoogleApi;
use orbit::scheduler::{ScheduledTask, Scheduler};
use orbit::tools::{ToolContext, ToolRegistry};
use orbit::ui;

#[derive(Parser)]
#[command(name = "orbit")]
#[command(about = "🛰️ Orbit - chat with your Gmail and Google Calendar")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update ~/.orbit/config.json
    Init,

    /// Chat with the assistant
    Chat {
        /// Send a single message and exit
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Connect a Google account
    Connect,

    /// Show Google connection and model key status
    Status,

    /// Forget the connected Google account
    Disconnect,

    /// Check that a model API key is configured
    CheckKey,

    /// List scheduled tasks
    Tasks,

    /// Clear the conversation history
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => config::init()?,

        Commands::Chat { message } => {
            let config = config::load()?;
            // Refuse before reading any input
            config.require_model_credentials()?;
            run_chat(&config, message.as_deref()).await?;
        }

        Commands::Connect => {
            let config = config::load()?;
            config.require_google_client()?;
            let http = GoogleApi::build_http_client(&config)?;
            let oauth = GoogleOAuthClient::from_config(&config, http);
            let tokens = auth::connect(&oauth, &FileTokenStore::default_location()).await?;
            ui::print_success(&format!("Connected as {} <{}>", tokens.name, tokens.email));
        }

        Commands::Status => {
            let config = config::load()?;
            let status = auth::connection_status(&FileTokenStore::default_location());
            println!("🛰️ Orbit Status\n");
            println!("Model: {}", config.model);
            println!("Model API key: {}", if config.has_model_credentials() { "✓" } else { "not set" });
            match (status.connected, status.email, status.expired) {
                (true, Some(email), Some(true)) => {
                    println!("Google: {} (access token expired, will refresh on next use)", email)
                }
                (true, Some(email), _) => println!("Google: {} ✓", email),
                _ => println!("Google: not connected (run 'orbit connect')"),
            }
        }

        Commands::Disconnect => {
            auth::disconnect(&FileTokenStore::default_location())?;
            ui::print_success("Google account disconnected");
        }

        Commands::CheckKey => {
            let config = config::load()?;
            if config.has_model_credentials() {
                ui::print_success("Model API key is configured");
            } else {
                ui::print_error("Model API key is missing. Set OPENAI_API_KEY or run 'orbit init'.");
                std::process::exit(1);
            }
        }

        Commands::Tasks => {
            let tasks = stored_tasks()?;
            if tasks.is_empty() {
                println!("No scheduled tasks found.");
            }
            for task in tasks {
                println!("• {}  {}  ({})", task.id, task.description, task.trigger.describe());
            }
        }

        Commands::Clear => {
            let path = config::history_path();
            if path.exists() {
                std::fs::remove_file(&path).with_context(|| format!("removing {:?}", path))?;
            }
            ui::print_success("Conversation history cleared");
        }
    }

    Ok(())
}

/// Wire the gateway, scheduler, tools and model into a conversation.
///
/// Stored tasks are only armed when `arm_stored_tasks` is set; a single
/// message exits before anything fired could be run, so it only loads them.
fn build_conversation(
    config: &Config,
    arm_stored_tasks: bool,
) -> Result<(Conversation, mpsc::UnboundedReceiver<ScheduledTask>)> {
    let http = GoogleApi::build_http_client(config)?;
    let oauth = GoogleOAuthClient::from_config(config, http.clone());
    let tokens = TokenManager::new(Arc::new(FileTokenStore::default_location()), oauth);
    let google = GoogleApi::new(config, http, tokens);

    let (scheduler, fired) = Scheduler::new(Some(config::tasks_path()));
    if arm_stored_tasks {
        let restored = scheduler.restore()?;
        if restored > 0 {
            tracing::info!("Restored {} scheduled task(s)", restored);
        }
    } else {
        scheduler.adopt()?;
    }

    let mut registry = ToolRegistry::new_with_defaults();
    registry.require_confirmation(config.tools_requiring_confirmation.iter().cloned());

    let conversation = Conversation::new(
        llm::from_config(config)?,
        registry,
        ToolContext { google, scheduler },
        config.max_steps,
    )
    .with_history(config::history_path())?;

    Ok((conversation, fired))
}

async fn run_chat(config: &Config, message: Option<&str>) -> Result<()> {
    let (conversation, fired) = build_conversation(config, message.is_none())?;
    let interrupt = Interrupt::install();
    let mut channel = CliChannel::new(conversation, fired, interrupt);

    match message {
        Some(msg) => channel.run_once(msg).await?,
        None => {
            ui::print_header("Chat", &format!("{}  •  Gmail & Calendar", config.model));
            println!("  Type 'exit' to quit, '/clear' to start over. Ctrl+C stops a reply.");
            channel.run_interactive().await?;
        }
    }
    Ok(())
}

fn stored_tasks() -> Result<Vec<ScheduledTask>> {
    let path = config::tasks_path();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).with_context(|| format!("parsing {:?}", path))
}
