//! Parlor CLI - download packaged models and chat with a local engine.
//!
//! Logs go to stderr; stdout carries only command output and chat replies.

mod chat;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use parlor_core::{Assistant, DownloadProgress, EngineKind, ModelPreset, RetryConfig, SettingsStore};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "parlor")]
#[command(about = "Local model downloads and streaming chat", version)]
struct Args {
    /// Data directory (defaults to the platform data directory)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show whether a packaged model is fully downloaded
    Status {
        #[arg(long, default_value = "phi4-mini-onnx", value_parser = parse_preset)]
        preset: ModelPreset,
    },
    /// Download a packaged model
    Download {
        #[arg(long, default_value = "phi4-mini-onnx", value_parser = parse_preset)]
        preset: ModelPreset,

        /// Extra attempts after a failed run
        #[arg(long, default_value = "2")]
        retries: u32,
    },
    /// Chat with a completion server
    Chat {
        /// Server address (defaults to the saved setting)
        #[arg(long)]
        server_url: Option<String>,

        /// System prompt for this session only
        #[arg(long)]
        system_prompt: Option<String>,

        /// Chat markers of the served model: onnx or native (defaults to the saved engine)
        #[arg(long, value_parser = parse_engine)]
        template: Option<EngineKind>,
    },
    /// Read or change saved settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Show,
    SetEngine { kind: String },
    SetSystemPrompt { text: String },
    SetServerUrl { url: String },
}

fn parse_preset(s: &str) -> std::result::Result<ModelPreset, String> {
    ModelPreset::from_str(s).ok_or_else(|| {
        let known: Vec<_> = ModelPreset::ALL.iter().map(|p| p.as_str()).collect();
        format!("unknown preset '{}' (expected one of: {})", s, known.join(", "))
    })
}

fn parse_engine(s: &str) -> std::result::Result<EngineKind, String> {
    EngineKind::from_str(s)
        .ok_or_else(|| format!("unknown engine '{}' (expected onnx, native or server)", s))
}

fn init_logging(debug: bool) {
    // RUST_LOG wins over --debug when set.
    match EnvFilter::try_from_default_env() {
        Ok(filter) => FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init(),
        Err(_) => {
            let log_level = if debug { Level::DEBUG } else { Level::INFO };
            FmtSubscriber::builder()
                .with_max_level(log_level)
                .with_target(false)
                .with_thread_ids(false)
                .with_writer(std::io::stderr)
                .compact()
                .init()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let data_dir = match args.data_dir {
        Some(path) => path,
        None => Assistant::default_data_dir()?,
    };
    info!("Data directory: {}", data_dir.display());

    match args.command {
        Command::Status { preset } => status(data_dir, preset).await,
        Command::Download { preset, retries } => download(data_dir, preset, retries).await,
        Command::Chat {
            server_url,
            system_prompt,
            template,
        } => chat::run(data_dir, server_url, system_prompt, template).await,
        Command::Config { action } => config(data_dir, action),
    }
}

async fn status(data_dir: PathBuf, preset: ModelPreset) -> Result<()> {
    let assistant = Assistant::builder(data_dir).with_greeting(false).build().await?;
    let store = assistant.model_store(preset);
    let state = if assistant.is_model_available(preset).await {
        "complete"
    } else {
        "missing or incomplete"
    };
    println!(
        "{}: {} ({}, runs on the {} engine)",
        preset,
        state,
        store.directory().display(),
        preset.engine_kind()
    );
    Ok(())
}

async fn download(data_dir: PathBuf, preset: ModelPreset, retries: u32) -> Result<()> {
    let assistant = Assistant::builder(data_dir).with_greeting(false).build().await?;

    let mut progress = assistant.subscribe_download();
    let printer = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let event = progress.borrow_and_update().clone();
            match event {
                Some(DownloadProgress::ListingFiles { total_files }) => {
                    println!("Found {} files", total_files)
                }
                Some(DownloadProgress::DownloadingFile {
                    current_index,
                    total_files,
                    file_name,
                }) => println!("[{}/{}] {}", current_index, total_files, file_name),
                Some(DownloadProgress::Error { message }) => println!("Failed: {}", message),
                Some(DownloadProgress::Success) | None => {}
            }
        }
    });

    let retry = RetryConfig::new().with_max_attempts(retries.saturating_add(1));
    let outcome = assistant.download_model(preset, &retry).await?;
    drop(assistant);
    let _ = printer.await;

    match outcome {
        DownloadProgress::Success => {
            println!("{} is ready", preset);
            Ok(())
        }
        DownloadProgress::Error { message } => bail!("download of {} failed: {}", preset, message),
        other => bail!("download ended unexpectedly: {:?}", other),
    }
}

fn config(data_dir: PathBuf, action: ConfigAction) -> Result<()> {
    let store = SettingsStore::new(&data_dir);
    let settings = match action {
        ConfigAction::Show => store.load()?,
        ConfigAction::SetEngine { kind } => {
            let kind = parse_engine(&kind).map_err(anyhow::Error::msg)?;
            store.update(|s| s.selected_engine = kind.as_str().to_string())?
        }
        ConfigAction::SetSystemPrompt { text } => store.update(|s| s.system_prompt = text)?,
        ConfigAction::SetServerUrl { url } => store.update(|s| s.server_url = url)?,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&settings).context("Failed to format settings")?
    );
    Ok(())
}
