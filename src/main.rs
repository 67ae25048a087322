mod backoff;
mod chain;
mod cli;
mod config;
mod json;
mod llm;
mod repair;

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::backoff::RetryPolicy;
use crate::chain::{ChainDriver, ChainProfile, ChainSnapshot, RunParams, StepClient};
use crate::cli::Cli;
use crate::config::Config;
use crate::llm::{LlmClient, OpenAiClient};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (RUST_LOG=debug for debug mode). Logs go to
    // stderr so stdout carries only the chain.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("reasoning_chain=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Loading configuration from {}", cli.config);
    let mut config = Config::load(&cli.config)?;
    if let Some(ref profile) = cli.profile {
        config.chain.profile = profile.clone();
    }

    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(&config.llm)?);
    info!("LLM: {}", llm.description());

    let repair = repair::from_config(&config.repair, llm.clone())?;
    info!("JSON repair: {}", repair.name());

    let retry = RetryPolicy::from(&config.retry);
    let client = StepClient::new(llm, repair, retry);
    let driver = ChainDriver::new(client, ChainProfile::from_config(&config.chain)?);
    info!("Chain profile: {}", driver.profile().name);

    let params = RunParams {
        max_steps: cli.max_steps.unwrap_or(config.chain.max_steps),
        temperature: cli.temperature.unwrap_or(config.chain.temperature),
        model: config.llm.resolve_model(cli.model.as_deref()),
    };

    run(&driver, &cli, params).await
}

/// Streams one run to stdout, step by step as they arrive.
async fn run(driver: &ChainDriver, cli: &Cli, params: RunParams) -> Result<()> {
    let stream = driver.start(&cli.prompt_text(), params)?.into_stream();
    tokio::pin!(stream);

    let mut stdout = std::io::stdout();
    let mut shown = 0;

    loop {
        let snapshot = tokio::select! {
            snapshot = stream.next() => snapshot,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, abandoning the run");
                return Ok(());
            }
        };
        let Some(snapshot) = snapshot else {
            break;
        };

        if !cli.json {
            for entry in &snapshot.steps()[shown..] {
                writeln!(stdout, "{}", cli::format_entry(entry))?;
            }
            stdout.flush()?;
        }
        shown = snapshot.steps().len();

        if let Some(total) = snapshot.total_thinking_time() {
            if !cli.json {
                writeln!(stdout, "Total thinking time: {:.2} seconds", total.as_secs_f64())?;
            }
        }
        if let ChainSnapshot::Complete(chain) = snapshot {
            if cli.json {
                writeln!(stdout, "{}", chain.to_json_pretty()?)?;
            }
        }
    }

    Ok(())
}
