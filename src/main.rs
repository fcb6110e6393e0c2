use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod export;
mod handler;
mod shadow;
mod transcript;
mod tui;
mod ui;

use app::App;
use config::Config;
use shadow::ShadowClient;

#[derive(Parser)]
#[command(name = "shadow", version)]
#[command(about = "Chat with Shadow, the dark AI, from your terminal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Text-generation endpoint to query
    #[arg(long, env = "SHADOW_API_URL", global = true)]
    api_url: Option<String>,

    /// System prompt sent with every message
    #[arg(long, env = "SHADOW_PROMPT", global = true)]
    prompt: Option<String>,

    /// Directory transcript downloads are written to
    #[arg(long, global = true)]
    export_dir: Option<PathBuf>,

    /// Log file (the terminal belongs to the chat UI)
    #[arg(long, env = "SHADOW_LOG_FILE", global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive chat (default)
    Chat,
    /// Send a single message and print the reply
    Ask {
        /// Your message
        message: String,
    },
    /// Write the effective settings to the config file
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_path = match cli.log_file.clone() {
        Some(path) => path,
        None => default_log_path()?,
    };
    init_logging(&log_path)?;

    let overrides = Config {
        api_url: cli.api_url,
        system_prompt: cli.prompt,
        export_dir: cli.export_dir,
    };
    let config = Config::load()?.merge(overrides);

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_chat(&config).await,
        Commands::Ask { message } => ask_once(&config, &message).await,
        Commands::Config => {
            let path = config.resolved().save()?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

fn default_log_path() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .context("Could not determine local data directory")?;

    Ok(data_dir.join("shadow-chat").join("shadow.log"))
}

fn init_logging(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Could not open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .init();

    Ok(())
}

async fn run_chat(config: &Config) -> Result<()> {
    let client = ShadowClient::new(config.api_url(), config.system_prompt());
    let mut app = App::new(client, config.export_dir());

    info!(api_url = config.api_url(), "starting chat");

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;

            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event).await?,
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    info!(messages = app.transcript.len(), "chat closed");
    result
}

async fn ask_once(config: &Config, message: &str) -> Result<()> {
    match ask_reply(config, message).await {
        Some(reply) => println!("{reply}"),
        None => println!("Nothing to send."),
    }
    Ok(())
}

/// Run one message through the same send path as the chat screen and return
/// Shadow's reply. `None` when the message is blank.
async fn ask_reply(config: &Config, message: &str) -> Option<String> {
    let client = ShadowClient::new(config.api_url(), config.system_prompt());
    let mut app = App::new(client, config.export_dir());

    app.input = message.to_string();
    if !app.send_message() {
        return None;
    }

    while app.waiting {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        app.poll_reply().await;
    }

    app.transcript.last().map(|reply| reply.text.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadow::{test_server, SILENT_REPLY, UNREACHABLE_REPLY};

    fn config_for(url: &str) -> Config {
        Config {
            api_url: Some(url.to_string()),
            system_prompt: Some("be terse".to_string()),
            export_dir: None,
        }
    }

    #[tokio::test]
    async fn ask_returns_the_reply() {
        let server = test_server::spawn(200, r#"{"result":"From the dark"}"#).await;

        let reply = ask_reply(&config_for(&server.url), "  who goes there  ").await;

        assert_eq!(reply.as_deref(), Some("From the dark"));
        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].params.get("content").map(String::as_str), Some("who goes there"));
        assert_eq!(requests[0].params.get("prompt").map(String::as_str), Some("be terse"));
    }

    #[tokio::test]
    async fn ask_falls_back_like_the_chat_screen() {
        let server = test_server::spawn(200, "{}").await;
        assert_eq!(ask_reply(&config_for(&server.url), "hi").await.as_deref(), Some(SILENT_REPLY));

        let dead = test_server::dead_url().await;
        assert_eq!(ask_reply(&config_for(&dead), "hi").await.as_deref(), Some(UNREACHABLE_REPLY));
    }

    #[tokio::test]
    async fn ask_with_blank_message_sends_nothing() {
        let server = test_server::spawn(200, r#"{"result":"never"}"#).await;

        assert_eq!(ask_reply(&config_for(&server.url), "   ").await, None);
        assert!(server.requests().is_empty());
    }
}
