//! CLI for caption-worker
//!
//! Subcommands:
//! - `serve` (default): run the worker until interrupted
//! - `request`: send one caption and print the reply (useful for smoke tests)

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use caption_worker::broker::{AmqpBroker, BrokerClient};
use caption_worker::client::CaptionClient;
use caption_worker::config::{Settings, load_config};
use caption_worker::dispatcher::Dispatcher;
use caption_worker::inference::HttpParaphraseEngine;
use caption_worker::utils::{WorkerError, logging};
use caption_worker::worker::{Worker, shutdown_signal};
use clap::{Parser, Subcommand};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "caption-worker", about = "Caption paraphrase worker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Consume caption requests until interrupted
    Serve,
    /// Send one caption through the queue and print the reply
    Request {
        caption: String,
        #[arg(long, default_value = "cli")]
        user_id: String,
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.logging.level);

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_worker(settings).await.map_err(Into::into),
        Command::Request {
            caption,
            user_id,
            timeout_secs,
        } => run_request(settings, &user_id, &caption, Duration::from_secs(timeout_secs)).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_worker(settings: Settings) -> Result<(), WorkerError> {
    let shutdown = shutdown_signal();
    let engine = HttpParaphraseEngine::new(&settings.inference)?;
    info!(endpoint = %settings.inference.endpoint, "Inference engine ready");

    let broker = AmqpBroker::connect(&settings.broker).await?;
    let worker = Worker::new(
        broker,
        Dispatcher::new(Arc::new(engine)),
        settings.broker.queue.clone(),
        settings.broker.consumer_tag.clone(),
    );

    worker.run(shutdown).await?;
    info!("Shutting down caption worker");
    Ok(())
}

async fn run_request(
    settings: Settings,
    user_id: &str,
    caption: &str,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let broker = AmqpBroker::connect(&settings.broker).await?;
    let client = CaptionClient::new(broker, settings.broker.queue.clone());

    let result = client.request(user_id, caption, timeout).await;
    client.broker().close().await?;

    let response = result?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
