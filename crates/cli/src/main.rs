//! Vigil review binary.
//!
//! Usage:
//!   vigil --file app.py
//!   vigil --file app.py --config vigil.toml --workers 3
//!   vigil --file app.py --provider ollama --worker-model llama3.2
//!
//! # Environment Variables
//!
//! - `OPENAI_API_KEY` / `ANTHROPIC_API_KEY` - provider credential
//! - `OPENAI_BASE_URL` - alternate OpenAI-compatible endpoint
//! - `VIGIL_COORDINATOR_MODEL`, `VIGIL_WORKER_MODEL`, `VIGIL_VALIDATOR_MODEL` - per-role models
//! - `RUST_LOG` - log filter

mod cli;
mod output;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vigil_common::Artifact;
use vigil_coordinator::{CancellationToken, Coordinator, ReviewConfig};

use crate::cli::{mask_secret, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "info,vigil_cli=debug,vigil_coordinator=debug,vigil_agents=debug,vigil_llm=debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match cli.config {
        Some(ref path) => ReviewConfig::from_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => ReviewConfig::default(),
    };
    config.apply_env();
    cli.apply_overrides(&mut config);
    config.validate()?;
    // Fails here, before any network call, when the credential is missing.
    config.resolve_credentials()?;

    if cli.debug {
        match config.provider.api_key.as_deref() {
            Some(key) => debug!(api_key = %mask_secret(key), "Credential resolved"),
            None => debug!("No credential configured"),
        }
    }

    let content = std::fs::read_to_string(&cli.file)
        .with_context(|| format!("Failed to read '{}'", cli.file.display()))?;
    let artifact = Artifact::new(content).with_identifier(cli.file.display().to_string());

    info!(
        file = %cli.file.display(),
        provider = %config.provider.provider,
        coordinator_model = %config.coordinator_model(),
        worker_model = %config.worker_model(),
        validator_model = %config.validator_model(),
        workers = config.worker_pool_size,
        "Starting review"
    );

    let service = config.build_service()?;
    let mut coordinator = Coordinator::from_config(&config, service)?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling review");
            interrupt.cancel();
        }
    });

    let report = coordinator.run(&artifact, &cancel).await;

    if let Some(ref err) = report.error {
        error!(error = %err, "Review failed, no report written");
        anyhow::bail!("review failed: {err}");
    }

    let paths = output::write_reports(&report, &cli.file, cli.output_dir.as_deref())?;
    println!("JSON report written to {}", paths.json.display());
    println!("Markdown report written to {}", paths.markdown.display());

    Ok(())
}
