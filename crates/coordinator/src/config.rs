//! Configuration for a review run.
//!
//! Values are layered: built-in defaults, then the TOML file, then
//! environment overrides, then whatever the caller sets last (CLI flags).
//!
//! # File permissions
//!
//! On Unix, [`ReviewConfig::from_file`] refuses world-writable files and
//! world-readable files that hold an API key, and warns when a key is stored
//! in the file at all.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use vigil_common::{CallOptions, Result, VigilError};
use vigil_llm::{build_llm_client, GenerationService, LlmConfig, LlmGateway};

pub const COORDINATOR_MODEL_ENV: &str = "VIGIL_COORDINATOR_MODEL";
pub const WORKER_MODEL_ENV: &str = "VIGIL_WORKER_MODEL";
pub const VALIDATOR_MODEL_ENV: &str = "VIGIL_VALIDATOR_MODEL";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";

/// Model and sampling for one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSettings {
    /// Falls back to the provider's default model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl RoleSettings {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            model: None,
            temperature,
            max_tokens,
        }
    }

    pub fn call_options(&self) -> CallOptions {
        CallOptions::new(self.temperature, self.max_tokens)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Generation service connection
    pub provider: LlmConfig,

    /// Decomposition
    pub coordinator: RoleSettings,

    pub worker: RoleSettings,

    pub validator: RoleSettings,

    /// Final conclusion call; uses the coordinator's model unless set
    pub synthesis: RoleSettings,

    /// Workers available to the dispatch stage
    pub worker_pool_size: usize,

    /// Upper bound on a whole run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_timeout_ms: Option<u64>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            provider: LlmConfig::default(),
            coordinator: RoleSettings::new(0.5, 3072),
            worker: RoleSettings::new(0.4, 2048),
            validator: RoleSettings::new(0.3, 2048),
            synthesis: RoleSettings::new(0.6, 2048),
            worker_pool_size: 1,
            run_timeout_ms: None,
        }
    }
}

impl ReviewConfig {
    /// Load configuration from a TOML file, checking its permissions first.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        let config = Self::from_file_unchecked(path)?;

        if config.provider.api_key.is_some() {
            warn!(
                "API key found in config file '{}'. Prefer environment variables \
                 (OPENAI_API_KEY, ANTHROPIC_API_KEY).",
                path.display()
            );
        }

        Ok(config)
    }

    /// Load configuration from a TOML file without permission checks.
    pub fn from_file_unchecked(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Apply environment overrides read through `lookup`. Blank values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(model) = get(COORDINATOR_MODEL_ENV) {
            self.coordinator.model = Some(model);
        }
        if let Some(model) = get(WORKER_MODEL_ENV) {
            self.worker.model = Some(model);
        }
        if let Some(model) = get(VALIDATOR_MODEL_ENV) {
            self.validator.model = Some(model);
        }
        if self.provider.provider == "openai" {
            if let Some(url) = get(OPENAI_BASE_URL_ENV) {
                self.provider.api_url = Some(url);
            }
        }
    }

    /// Fill in the API key from the environment and fail when a provider
    /// that needs one has none. Must run before any network call.
    pub fn resolve_credentials(&mut self) -> Result<()> {
        self.resolve_credentials_with(|name| std::env::var(name).ok())
    }

    pub fn resolve_credentials_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        match self.provider.resolve_api_key_with(lookup) {
            Some(key) => {
                self.provider.api_key = Some(key);
                Ok(())
            }
            None if self.provider.requires_api_key() => Err(VigilError::Config(format!(
                "no API key for provider '{}' (set {} or pass --api-key)",
                self.provider.provider,
                self.provider.api_key_env_var().unwrap_or("an API key"),
            ))),
            None => Ok(()),
        }
    }

    /// Reject settings no run could use.
    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(VigilError::Config(
                "worker_pool_size must be at least 1".to_string(),
            ));
        }
        if self.run_timeout_ms == Some(0) {
            return Err(VigilError::Config(
                "run_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn coordinator_model(&self) -> &str {
        self.model_for(&self.coordinator)
    }

    pub fn worker_model(&self) -> &str {
        self.model_for(&self.worker)
    }

    pub fn validator_model(&self) -> &str {
        self.model_for(&self.validator)
    }

    pub fn synthesis_model(&self) -> &str {
        self.synthesis
            .model
            .as_deref()
            .unwrap_or_else(|| self.coordinator_model())
    }

    fn model_for<'a>(&'a self, role: &'a RoleSettings) -> &'a str {
        role.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.provider.default_model)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }

    /// Build the generation service: provider client stack behind a
    /// timeout-bounded gateway. Expects credentials to be resolved.
    pub fn build_service(&self) -> Result<Arc<dyn GenerationService>> {
        let client = build_llm_client(&self.provider)?;
        Ok(Arc::new(LlmGateway::new(client, self.provider.timeout())))
    }
}

/// Requirements:
/// - regular file
/// - not world-writable
/// - not world-readable when it looks like it holds an API key
#[cfg(unix)]
fn validate_config_file_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path).map_err(|e| {
        VigilError::Config(format!(
            "Failed to read config file '{}': {}",
            path.display(),
            e
        ))
    })?;

    if !metadata.is_file() {
        return Err(VigilError::Config(format!(
            "Config path '{}' is not a regular file",
            path.display()
        )));
    }

    let permission_bits = metadata.permissions().mode() & 0o777;

    if permission_bits & 0o002 != 0 {
        return Err(VigilError::Config(format!(
            "Config file '{}' is world-writable (mode {:04o}). Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let has_api_key =
        content.contains("api_key") && (content.contains("sk-") || content.contains("key ="));

    if has_api_key && permission_bits & 0o004 != 0 {
        return Err(VigilError::Config(format!(
            "Config file '{}' contains an API key but is world-readable (mode {:04o}). \
             Fix with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        )));
    }

    if has_api_key && permission_bits & 0o040 != 0 {
        warn!(
            "Config file '{}' contains an API key and is group-readable (mode {:04o}). \
             Consider: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const TOML_CONFIG: &str = r#"
worker_pool_size = 3
run_timeout_ms = 120000

[provider]
provider_type = "ollama"
default_model = "llama3.2"
api_url = "http://localhost:11434/v1"

[coordinator]
model = "llama3.1:70b"
temperature = 0.5
max_tokens = 3072

[worker]
temperature = 0.2
max_tokens = 1024
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ReviewConfig::default();
        assert_eq!(config.worker_pool_size, 1);
        assert_eq!(config.coordinator.call_options(), CallOptions::new(0.5, 3072));
        assert_eq!(config.worker.call_options(), CallOptions::new(0.4, 2048));
        assert_eq!(config.validator.call_options(), CallOptions::new(0.3, 2048));
        assert_eq!(config.synthesis.call_options(), CallOptions::new(0.6, 2048));
        assert_eq!(config.worker_model(), config.provider.default_model);
        assert!(config.run_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: ReviewConfig = toml::from_str(TOML_CONFIG).unwrap();
        assert_eq!(config.provider.provider, "ollama");
        assert_eq!(config.worker_pool_size, 3);
        assert_eq!(config.run_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.coordinator_model(), "llama3.1:70b");
        assert_eq!(config.synthesis_model(), "llama3.1:70b");
        assert_eq!(config.worker_model(), "llama3.2");
        assert_eq!(config.worker.call_options(), CallOptions::new(0.2, 1024));
        // Untouched sections keep their defaults
        assert_eq!(config.validator.call_options(), CallOptions::new(0.3, 2048));
    }

    #[test]
    fn test_env_overrides_models() {
        let mut config = ReviewConfig::default();
        config.apply_env_with(env(&[
            (COORDINATOR_MODEL_ENV, "gpt-4o"),
            (WORKER_MODEL_ENV, "gpt-4o-mini"),
            (VALIDATOR_MODEL_ENV, "  "),
            (OPENAI_BASE_URL_ENV, "https://proxy.example/v1"),
        ]));

        assert_eq!(config.coordinator_model(), "gpt-4o");
        assert_eq!(config.worker_model(), "gpt-4o-mini");
        assert_eq!(config.validator_model(), config.provider.default_model);
        assert_eq!(config.provider.api_url.as_deref(), Some("https://proxy.example/v1"));
    }

    #[test]
    fn test_openai_base_url_ignored_for_other_providers() {
        let mut config = ReviewConfig::default();
        config.provider.provider = "anthropic".into();
        config.apply_env_with(env(&[(OPENAI_BASE_URL_ENV, "https://proxy.example/v1")]));
        assert!(config.provider.api_url.is_none());
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let mut config = ReviewConfig::default();
        let err = config.resolve_credentials_with(env(&[])).unwrap_err();
        assert!(matches!(err, VigilError::Config(_)));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_key_from_env() {
        let mut config = ReviewConfig::default();
        config
            .resolve_credentials_with(env(&[("OPENAI_API_KEY", "sk-env")]))
            .unwrap();
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-env"));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let mut config = ReviewConfig::default();
        config.provider.provider = "ollama".into();
        assert!(config.resolve_credentials_with(env(&[])).is_ok());
        assert!(config.provider.api_key.is_none());
    }

    #[test]
    fn test_validate_rejects_empty_pool() {
        let config = ReviewConfig {
            worker_pool_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(VigilError::Config(_))));
    }

    #[test]
    fn test_build_service_with_key() {
        let mut config = ReviewConfig::default();
        config.provider.api_key = Some("sk-test".into());
        assert!(config.build_service().is_ok());
    }

    #[test]
    fn test_from_file_unchecked() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TOML_CONFIG.as_bytes()).unwrap();
        let config = ReviewConfig::from_file_unchecked(file.path()).unwrap();
        assert_eq!(config.worker_pool_size, 3);
    }

    #[test]
    fn test_from_file_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"worker_pool_size = \"many\"").unwrap();
        let err = ReviewConfig::from_file_unchecked(file.path()).unwrap_err();
        assert!(matches!(err, VigilError::TomlParse(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_from_file_rejects_world_writable() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TOML_CONFIG.as_bytes()).unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o666)).unwrap();

        let err = ReviewConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("world-writable"));
    }

    #[cfg(unix)]
    #[test]
    fn test_from_file_rejects_world_readable_key() {
        use std::os::unix::fs::PermissionsExt;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[provider]\napi_key = \"sk-secret\"\n").unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o644)).unwrap();

        let err = ReviewConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("world-readable"));

        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o600)).unwrap();
        let config = ReviewConfig::from_file(file.path()).unwrap();
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-secret"));
    }
}
