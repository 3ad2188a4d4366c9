//! CLI argument parsing using clap

use std::path::PathBuf;

use clap::Parser;
use vigil_coordinator::ReviewConfig;

/// Vigil - multi-stage LLM code review
#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Source file to review
    #[arg(short = 'f', long, value_name = "PATH")]
    pub file: PathBuf,

    /// TOML configuration file
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// API key (overrides OPENAI_API_KEY / ANTHROPIC_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Alternate API endpoint (overrides OPENAI_BASE_URL)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Provider: openai, anthropic or ollama
    #[arg(long)]
    pub provider: Option<String>,

    /// Model for decomposition and synthesis (overrides VIGIL_COORDINATOR_MODEL)
    #[arg(long)]
    pub coordinator_model: Option<String>,

    /// Model for sub-task review (overrides VIGIL_WORKER_MODEL)
    #[arg(long)]
    pub worker_model: Option<String>,

    /// Model for validation (overrides VIGIL_VALIDATOR_MODEL)
    #[arg(long)]
    pub validator_model: Option<String>,

    /// Number of workers reviewing sub-tasks concurrently
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Abort the whole run after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Directory for the report files (default: current directory)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Verbose logging; shows a masked form of the API key
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Layer flags over `config`. Flags win over everything else.
    pub fn apply_overrides(&self, config: &mut ReviewConfig) {
        if let Some(ref provider) = self.provider {
            config.provider.provider = provider.clone();
        }
        if let Some(ref key) = self.api_key {
            config.provider.api_key = Some(key.clone());
        }
        if let Some(ref url) = self.base_url {
            config.provider.api_url = Some(url.clone());
        }
        if let Some(ref model) = self.coordinator_model {
            config.coordinator.model = Some(model.clone());
        }
        if let Some(ref model) = self.worker_model {
            config.worker.model = Some(model.clone());
        }
        if let Some(ref model) = self.validator_model {
            config.validator.model = Some(model.clone());
        }
        if let Some(workers) = self.workers {
            config.worker_pool_size = workers;
        }
        if let Some(secs) = self.timeout_secs {
            config.run_timeout_ms = Some(secs.saturating_mul(1000));
        }
    }
}

/// Show only the edges of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
