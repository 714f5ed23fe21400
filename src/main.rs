//! WhatsApp Assistant - Rust implementation
//!
//! Runs the bot daemon, or inspects a running one over HTTP.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use whatsapp_assistant_rs::bot::Bot;
use whatsapp_assistant_rs::bridge::BridgeTransport;
use whatsapp_assistant_rs::classifier::classify_text;
use whatsapp_assistant_rs::config::Config;
use whatsapp_assistant_rs::keepalive::KeepAlive;
use whatsapp_assistant_rs::responder::HttpReferenceSource;
use whatsapp_assistant_rs::transport::Transport;
use whatsapp_assistant_rs::web::{self, WebState};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// WhatsApp Assistant - auto-reply bot daemon
#[derive(Parser)]
#[command(name = "whatsapp-assistant-rs")]
#[command(about = "Run or inspect the WhatsApp auto-reply bot")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot (default)
    Run,

    /// Print the category a message would be classified as
    Classify {
        /// Message text
        text: String,
    },

    /// Query a running bot's health and status endpoints
    Status {
        /// Base URL of the running bot (defaults to localhost and $PORT)
        #[arg(long)]
        url: Option<String>,
    },

    /// Save the running bot's pairing QR code as PNG
    Qr {
        /// Output file
        #[arg(short, long, default_value = "qr.png")]
        out: PathBuf,

        /// Base URL of the running bot (defaults to localhost and $PORT)
        #[arg(long)]
        url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run().await,
        Commands::Classify { text } => {
            println!("{}", classify_text(&text));
            Ok(())
        }
        Commands::Status { url } => cmd_status(url).await,
        Commands::Qr { out, url } => cmd_qr(url, out).await,
    }
}

fn base_url(url: Option<String>) -> anyhow::Result<String> {
    match url {
        Some(u) => Ok(u.trim_end_matches('/').to_string()),
        None => {
            let config = Config::from_env()?;
            Ok(format!("http://127.0.0.1:{}", config.port))
        }
    }
}

async fn cmd_status(url: Option<String>) -> anyhow::Result<()> {
    let base = base_url(url)?;
    let client = reqwest::Client::new();

    for path in ["/health", "/status"] {
        let value: serde_json::Value = client
            .get(format!("{}{}", base, path))
            .send()
            .await
            .with_context(|| format!("Bot not reachable at {}", base))?
            .json()
            .await?;
        println!("{} {}", path, serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}

async fn cmd_qr(url: Option<String>, out: PathBuf) -> anyhow::Result<()> {
    let base = base_url(url)?;
    let response = reqwest::get(format!("{}/qrcode", base))
        .await
        .with_context(|| format!("Bot not reachable at {}", base))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        println!("No pairing code available (already paired?)");
        return Ok(());
    }

    let png = response.error_for_status()?.bytes().await?;
    std::fs::write(&out, &png).with_context(|| format!("Failed to write {}", out.display()))?;
    println!("QR code written to {}", out.display());
    Ok(())
}

async fn cmd_run() -> anyhow::Result<()> {
    // Panics are logged; the runtime keeps serving
    std::panic::set_hook(Box::new(|panic| {
        error!("Panic: {}", panic);
    }));

    let config = Config::from_env()?;
    info!("{} starting (Rust)", config.bot_name);
    info!("Media directory: {}", config.media_dir.display());

    let (transport, events) = BridgeTransport::spawn(&config)?;
    let references = HttpReferenceSource::new(
        &config.joke_api_url,
        &config.quote_api_url,
        config.api_timeout,
    )?;

    let bot = Arc::new(Bot::new(
        &config,
        transport.clone(),
        Arc::new(references),
    ));

    let web_state = WebState::new(bot.session(), &config.bot_name);
    let web_config = config.clone();
    tokio::spawn(async move {
        if let Err(e) = web::serve(&web_config, web_state).await {
            error!("HTTP server stopped: {}", e);
        }
    });

    if let Some(url) = &config.keepalive_url {
        let keepalive = KeepAlive::new(url, config.keepalive_interval)?;
        info!("Keep-alive pinging {} every {:?}", url, config.keepalive_interval);
        tokio::spawn(keepalive.run());
    }

    let bot_task = tokio::spawn(Arc::clone(&bot).run(events));

    let bridge_exited = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Shutting down");
            false
        }
        _ = bot_task => {
            error!("Bridge event stream ended");
            true
        }
    };

    // The bridge bounds its own logout and kills the child either way
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, transport.shutdown()).await {
        Ok(Ok(())) => info!("Session closed"),
        Ok(Err(e)) => warn!("Session close failed: {}", e),
        Err(_) => warn!("Session close timed out after {:?}", SHUTDOWN_TIMEOUT),
    }

    if bridge_exited {
        anyhow::bail!("bridge process exited");
    }
    Ok(())
}
