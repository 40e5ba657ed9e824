use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use tandem_config::TandemConfig;
use tandem_engine::{ChatOutcome, Engine, EngineOptions, WebhookDelivery};
use tandem_llm::OpenAiBackend;
use tandem_store::Store;

#[derive(Parser)]
#[command(name = "tandem", about = "Relationship-assistant scheduling engine")]
struct Cli {
    /// Config file path (defaults to ~/.tandem/config.json5)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatch loop until the process is terminated
    Run,
    /// Feed one chat message through the engine and print the reply
    Chat {
        /// Transport chat identifier of a registered user
        #[arg(long)]
        chat_id: String,

        /// Message text
        #[arg(short, long)]
        message: String,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => tandem_config::load_config_from(path)?,
        None => tandem_config::load_config()?,
    };

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Commands::Run => rt.block_on(run(config)),
        Commands::Chat { chat_id, message } => rt.block_on(chat(config, chat_id, message)),
    }
}

fn build_engine(config: &TandemConfig) -> anyhow::Result<Engine> {
    let store = Store::open(&config.database_path)?;
    let backend = Arc::new(OpenAiBackend::new(
        config.llm.base_url.clone(),
        config.llm.api_key.clone(),
        config.llm.model.clone(),
        Duration::from_secs(config.llm.request_timeout_secs),
    ));
    let delivery = Arc::new(WebhookDelivery::new(config.delivery.webhook_url.clone()));
    let options = EngineOptions {
        poll_interval: Duration::from_secs(config.poll_interval_secs),
        history_window: config.history_window,
        max_tool_rounds: config.llm.max_tool_rounds,
    };
    Ok(Engine::new(store, backend, delivery, options))
}

async fn run(config: TandemConfig) -> anyhow::Result<()> {
    info!(
        db = %config.database_path.display(),
        model = %config.llm.model,
        "Starting tandem"
    );
    let engine = build_engine(&config)?;
    engine.run().await;
    Ok(())
}

async fn chat(config: TandemConfig, chat_id: String, message: String) -> anyhow::Result<()> {
    let engine = build_engine(&config)?;
    match engine.handle_chat_turn(&chat_id, &message).await? {
        ChatOutcome::Reply(reply) => println!("{reply}"),
        ChatOutcome::UnknownUser => anyhow::bail!("no registered user for chat id {chat_id}"),
    }
    Ok(())
}
