//! TOML-based configuration for STORMer
//!
//! Settings are read from `stormer.toml` and merged with environment variables.
//! Precedence is environment > file > defaults. API keys are only ever taken
//! from the environment (a `.env` file is loaded first via `dotenvy`); any key
//! written into the TOML file is ignored.
//!
//! # Search order
//!
//! 1. `./stormer.toml`
//! 2. `$HOME/.stormer/config.toml`

use crate::utils::http::is_valid_timeout;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Root configuration structure loaded from stormer.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StormerConfig {
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    #[serde(default)]
    pub tavily: TavilyConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub research: ResearchConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

// ============= Language Model Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    #[serde(default = "default_openrouter_model")]
    pub model: String,

    #[serde(default = "default_openrouter_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,
}

fn default_openrouter_model() -> String {
    "anthropic/claude-3-5-sonnet".to_string()
}

fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_timeout() -> f64 {
    10.0
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            model: default_openrouter_model(),
            base_url: default_openrouter_base_url(),
            timeout: default_timeout(),
        }
    }
}

// ============= Search Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TavilyConfig {
    #[serde(default = "default_tavily_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: f64,
}

fn default_tavily_base_url() -> String {
    "https://api.tavily.com".to_string()
}

impl Default for TavilyConfig {
    fn default() -> Self {
        Self {
            base_url: default_tavily_base_url(),
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchProvider {
    #[default]
    Tavily,
    DuckDuckGo,
}

impl std::str::FromStr for SearchProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "tavily" => Ok(Self::Tavily),
            "duckduckgo" | "ddg" => Ok(Self::DuckDuckGo),
            other => Err(ConfigError::ValidationError(format!(
                "Unknown search provider: {}. Use: tavily, duckduckgo",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SearchProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tavily => f.write_str("tavily"),
            Self::DuckDuckGo => f.write_str("duckduckgo"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub provider: SearchProvider,

    /// Results requested per query
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// If non-empty, only these hosts (and their subdomains) are accepted as sources
    #[serde(default)]
    pub allow_domains: Vec<String>,

    /// Hosts rejected in addition to the built-in deny list
    #[serde(default)]
    pub deny_domains: Vec<String>,
}

fn default_max_results() -> usize {
    5
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProvider::default(),
            max_results: default_max_results(),
            allow_domains: Vec::new(),
            deny_domains: Vec::new(),
        }
    }
}

// ============= Research Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Number of discovered perspectives (N), excluding the baseline
    #[serde(default = "default_perspectives")]
    pub perspectives: usize,

    /// Related topics surveyed during discovery (K)
    #[serde(default = "default_related_topics")]
    pub related_topics: usize,

    /// Rounds per conversation (M)
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,

    /// Search queries generated per question
    #[serde(default = "default_queries_per_question")]
    pub queries_per_question: usize,

    /// References retrieved per section
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Whole-run timeout in seconds (0 disables it)
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,

    #[serde(default = "default_max_concurrent_conversations")]
    pub max_concurrent_conversations: usize,

    #[serde(default = "default_max_concurrent_sections")]
    pub max_concurrent_sections: usize,
}

fn default_perspectives() -> usize {
    6
}

fn default_related_topics() -> usize {
    5
}

fn default_max_rounds() -> usize {
    5
}

fn default_queries_per_question() -> usize {
    3
}

fn default_top_k() -> usize {
    10
}

fn default_run_timeout_secs() -> u64 {
    1800
}

fn default_max_concurrent_conversations() -> usize {
    4
}

fn default_max_concurrent_sections() -> usize {
    4
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            perspectives: default_perspectives(),
            related_topics: default_related_topics(),
            max_rounds: default_max_rounds(),
            queries_per_question: default_queries_per_question(),
            top_k: default_top_k(),
            run_timeout_secs: default_run_timeout_secs(),
            max_concurrent_conversations: default_max_concurrent_conversations(),
            max_concurrent_sections: default_max_concurrent_sections(),
        }
    }
}

// ============= Retry & Logging Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON-formatted log lines
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ============= Secrets =============

/// API keys, sourced from the environment only.
#[derive(Clone, Default)]
pub struct Secrets {
    pub openrouter_api_key: Option<String>,
    pub tavily_api_key: Option<String>,
}

impl Secrets {
    /// Load `.env` (if present) and read keys from the process environment
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_map(&std::env::vars().collect())
    }

    pub fn from_map(env: &HashMap<String, String>) -> Self {
        let read = |name: &str| env.get(name).filter(|v| !v.trim().is_empty()).cloned();
        Self {
            openrouter_api_key: read("OPENROUTER_API_KEY"),
            tavily_api_key: read("TAVILY_API_KEY"),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Secrets")
            .field("openrouter_api_key", &redact(&self.openrouter_api_key))
            .field("tavily_api_key", &redact(&self.tavily_api_key))
            .finish()
    }
}

// ============= Configuration Loading & Validation =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for crate::types::AppError {
    fn from(err: ConfigError) -> Self {
        crate::types::AppError::Configuration(err.to_string())
    }
}

/// Find the configuration file in the standard locations
pub fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let home = std::env::var_os("HOME").map(PathBuf::from);
    find_config_in(&cwd, home.as_deref())
}

fn find_config_in(cwd: &Path, home: Option<&Path>) -> Option<PathBuf> {
    let local = cwd.join("stormer.toml");
    if local.is_file() {
        return Some(local);
    }

    let home_config = home?.join(".stormer").join("config.toml");
    home_config.is_file().then_some(home_config)
}

/// Section keys that must never be read from the file
const SECRET_KEYS: &[&str] = &["api_key", "api_key_env"];

impl StormerConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration text, dropping any API keys it contains
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut value: toml::Table = toml::from_str(content)?;
        for section in ["openrouter", "tavily"] {
            if let Some(toml::Value::Table(table)) = value.get_mut(section) {
                for key in SECRET_KEYS {
                    if table.remove(*key).is_some() {
                        warn!(section, "Ignoring API key found in configuration file; use the environment instead");
                    }
                }
            }
        }

        let config: StormerConfig = toml::Value::Table(value).try_into()?;
        Ok(config)
    }

    /// Resolve the effective configuration: explicit path, else the search
    /// order, else defaults; then environment overrides; then validation.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => match find_config_file() {
                Some(path) => {
                    debug!(path = %path.display(), "Loading configuration");
                    Self::load(path)?
                }
                None => Self::default(),
            },
        };

        config.apply_env_overrides(&std::env::vars().collect());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides. Unparseable numeric values are skipped.
    pub fn apply_env_overrides(&mut self, env: &HashMap<String, String>) {
        let get = |name: &str| env.get(name).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(v) = get("OPENROUTER_MODEL") {
            self.openrouter.model = v.to_string();
        }
        if let Some(v) = get("OPENROUTER_BASE_URL") {
            self.openrouter.base_url = v.to_string();
        }
        if let Some(v) = get("OPENROUTER_TIMEOUT") {
            match v.parse() {
                Ok(t) => self.openrouter.timeout = t,
                Err(_) => warn!(value = v, "Ignoring unparseable OPENROUTER_TIMEOUT"),
            }
        }
        if let Some(v) = get("TAVILY_BASE_URL") {
            self.tavily.base_url = v.to_string();
        }
        if let Some(v) = get("TAVILY_TIMEOUT") {
            match v.parse() {
                Ok(t) => self.tavily.timeout = t,
                Err(_) => warn!(value = v, "Ignoring unparseable TAVILY_TIMEOUT"),
            }
        }
        if let Some(v) = get("STORMER_SEARCH_PROVIDER") {
            match v.parse() {
                Ok(p) => self.search.provider = p,
                Err(e) => warn!(error = %e, "Ignoring STORMER_SEARCH_PROVIDER"),
            }
        }
    }

    /// Validate value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        let research = &self.research;
        let checks = [
            (research.perspectives >= 1, "research.perspectives must be at least 1"),
            (research.max_rounds >= 1, "research.max_rounds must be at least 1"),
            (research.top_k >= 1, "research.top_k must be at least 1"),
            (research.related_topics >= 1, "research.related_topics must be at least 1"),
            (
                research.queries_per_question >= 1,
                "research.queries_per_question must be at least 1",
            ),
            (
                research.max_concurrent_conversations >= 1,
                "research.max_concurrent_conversations must be at least 1",
            ),
            (
                research.max_concurrent_sections >= 1,
                "research.max_concurrent_sections must be at least 1",
            ),
            (self.search.max_results >= 1, "search.max_results must be at least 1"),
            (self.retry.max_attempts >= 1, "retry.max_attempts must be at least 1"),
            (self.retry.multiplier >= 1.0, "retry.multiplier must be at least 1.0"),
            (
                is_valid_timeout(self.openrouter.timeout),
                "openrouter.timeout must be positive and at most 86400 seconds",
            ),
            (
                is_valid_timeout(self.tavily.timeout),
                "tavily.timeout must be positive and at most 86400 seconds",
            ),
        ];

        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, message)) => Err(ConfigError::ValidationError(message.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = StormerConfig::default();
        assert_eq!(config.openrouter.model, "anthropic/claude-3-5-sonnet");
        assert_eq!(config.openrouter.base_url, "https://openrouter.ai/api/v1");
        assert_eq!(config.tavily.base_url, "https://api.tavily.com");
        assert_eq!(config.research.perspectives, 6);
        assert_eq!(config.research.max_rounds, 5);
        assert_eq!(config.research.top_k, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_file() {
        let config = StormerConfig::from_toml_str(
            r#"
[openrouter]
model = "openai/gpt-4o-mini"

[research]
perspectives = 3
max_rounds = 2

[search]
provider = "duckduckgo"
deny_domains = ["example.org"]
"#,
        )
        .unwrap();

        assert_eq!(config.openrouter.model, "openai/gpt-4o-mini");
        assert_eq!(config.openrouter.timeout, 10.0);
        assert_eq!(config.research.perspectives, 3);
        assert_eq!(config.research.max_rounds, 2);
        assert_eq!(config.research.top_k, 10);
        assert_eq!(config.search.provider, SearchProvider::DuckDuckGo);
        assert_eq!(config.search.deny_domains, vec!["example.org"]);
    }

    #[test]
    fn test_api_keys_in_file_are_ignored() {
        let config = StormerConfig::from_toml_str(
            r#"
[openrouter]
api_key = "sk-should-not-load"
model = "m"

[tavily]
api_key = "tvly-should-not-load"
"#,
        )
        .unwrap();

        assert_eq!(config.openrouter.model, "m");
        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("should-not-load"));
    }

    #[test]
    fn test_env_overrides_take_priority() {
        let mut config = StormerConfig::from_toml_str(
            r#"
[openrouter]
model = "from-file"
timeout = 30.0
"#,
        )
        .unwrap();

        config.apply_env_overrides(&env(&[
            ("OPENROUTER_MODEL", "from-env"),
            ("TAVILY_TIMEOUT", "4.5"),
            ("STORMER_SEARCH_PROVIDER", "ddg"),
        ]));

        assert_eq!(config.openrouter.model, "from-env");
        assert_eq!(config.openrouter.timeout, 30.0);
        assert_eq!(config.tavily.timeout, 4.5);
        assert_eq!(config.search.provider, SearchProvider::DuckDuckGo);
    }

    #[test]
    fn test_invalid_env_timeout_is_skipped() {
        let mut config = StormerConfig::default();
        config.apply_env_overrides(&env(&[("OPENROUTER_TIMEOUT", "soon"), ("OPENROUTER_BASE_URL", "")]));

        assert_eq!(config.openrouter.timeout, 10.0);
        assert_eq!(config.openrouter.base_url, "https://openrouter.ai/api/v1");
    }

    #[rstest::rstest]
    #[case("inf")]
    #[case("1e30")]
    #[case("NaN")]
    #[case("-1")]
    fn test_validation_rejects_unusable_timeouts(#[case] value: &str) {
        let mut config = StormerConfig::default();
        config.apply_env_overrides(&env(&[("OPENROUTER_TIMEOUT", value)]));

        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::ValidationError(msg)) if msg.contains("openrouter.timeout")));
    }

    #[test]
    fn test_validation_rejects_zero_rounds() {
        let config = StormerConfig::from_toml_str("[research]\nmax_rounds = 0\n").unwrap();
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::ValidationError(msg)) if msg.contains("max_rounds")));
    }

    #[test]
    fn test_load_missing_file() {
        let result = StormerConfig::load("/definitely/not/here/stormer.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_find_config_prefers_working_directory() {
        let cwd = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        fs::create_dir_all(home.path().join(".stormer")).unwrap();
        fs::write(home.path().join(".stormer/config.toml"), "").unwrap();

        let found = find_config_in(cwd.path(), Some(home.path())).unwrap();
        assert!(found.ends_with(".stormer/config.toml"));

        fs::write(cwd.path().join("stormer.toml"), "").unwrap();
        let found = find_config_in(cwd.path(), Some(home.path())).unwrap();
        assert_eq!(found, cwd.path().join("stormer.toml"));
    }

    #[test]
    fn test_secrets_from_map() {
        let secrets = Secrets::from_map(&env(&[("OPENROUTER_API_KEY", "sk"), ("TAVILY_API_KEY", " ")]));
        assert_eq!(secrets.openrouter_api_key.as_deref(), Some("sk"));
        assert!(secrets.tavily_api_key.is_none());
        assert!(!format!("{:?}", secrets).contains("sk"));
    }
}
