//! Configuration loading, validation, and management for factlayer.
//!
//! Loads configuration from `~/.factlayer/config.toml` with environment
//! variable overrides. Every threshold used by the budget enforcer, vault
//! selector, retrieval gateway, routing decision, and validators is a
//! default here rather than a constant in code, so deployments can
//! recalibrate without a rebuild.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.factlayer/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Response returned when the pipeline cannot produce an answer
    #[serde(default = "default_fallback_response")]
    pub fallback_response: String,

    /// Upper bound on a single generation call
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,

    /// Per-source token ceilings
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Vault section selection
    #[serde(default)]
    pub vault: VaultConfig,

    /// Memory retrieval gateway
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Model routing thresholds
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Validator chain settings
    #[serde(default)]
    pub validators: ValidatorConfig,

    /// Persistent store backend
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Session document cache
    #[serde(default)]
    pub session_cache: SessionCacheConfig,
}

fn default_fallback_response() -> String {
    "I'm having trouble putting an answer together right now. Could you ask me again in a moment?"
        .into()
}
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

// ── Budget ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_memory_tokens")]
    pub memory_tokens: usize,

    #[serde(default = "default_document_tokens")]
    pub document_tokens: usize,

    #[serde(default = "default_vault_tokens")]
    pub vault_tokens: usize,

    #[serde(default = "default_total_tokens")]
    pub total_tokens: usize,

    /// Minimum share of the target length a sentence boundary must retain
    #[serde(default = "default_sentence_boundary_ratio")]
    pub sentence_boundary_ratio: f32,
}

fn default_memory_tokens() -> usize {
    2_500
}
fn default_document_tokens() -> usize {
    3_000
}
fn default_vault_tokens() -> usize {
    9_000
}
fn default_total_tokens() -> usize {
    15_000
}
fn default_sentence_boundary_ratio() -> f32 {
    0.8
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            memory_tokens: default_memory_tokens(),
            document_tokens: default_document_tokens(),
            vault_tokens: default_vault_tokens(),
            total_tokens: default_total_tokens(),
            sentence_boundary_ratio: default_sentence_boundary_ratio(),
        }
    }
}

// ── Vault ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Token ceiling for selected vault content
    #[serde(default = "default_vault_tokens")]
    pub max_tokens: usize,

    /// Sections below this score are not accepted once one section is in
    #[serde(default = "default_min_section_score")]
    pub min_section_score: i64,

    /// Minimum score for a truncated final section
    #[serde(default = "default_partial_fit_min_score")]
    pub partial_fit_min_score: i64,

    /// Minimum remaining budget for a truncated final section
    #[serde(default = "default_partial_fit_min_remaining")]
    pub partial_fit_min_remaining_tokens: usize,

    /// A structural split is usable only if one section exceeds this
    #[serde(default = "default_min_section_chars")]
    pub min_section_chars: usize,

    /// Paragraph fallback merges paragraphs up to this size
    #[serde(default = "default_min_paragraph_chars")]
    pub min_paragraph_chars: usize,

    /// Last-resort fixed chunk size
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,

    /// Sentence-boundary retention ratio for truncated sections
    #[serde(default = "default_sentence_boundary_ratio")]
    pub sentence_boundary_ratio: f32,

    #[serde(default)]
    pub weights: ScoringWeights,
}

fn default_min_section_score() -> i64 {
    10
}
fn default_partial_fit_min_score() -> i64 {
    50
}
fn default_partial_fit_min_remaining() -> usize {
    500
}
fn default_min_section_chars() -> usize {
    100
}
fn default_min_paragraph_chars() -> usize {
    200
}
fn default_chunk_chars() -> usize {
    4_000
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_vault_tokens(),
            min_section_score: default_min_section_score(),
            partial_fit_min_score: default_partial_fit_min_score(),
            partial_fit_min_remaining_tokens: default_partial_fit_min_remaining(),
            min_section_chars: default_min_section_chars(),
            min_paragraph_chars: default_min_paragraph_chars(),
            chunk_chars: default_chunk_chars(),
            sentence_boundary_ratio: default_sentence_boundary_ratio(),
            weights: ScoringWeights::default(),
        }
    }
}

/// Section scoring weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "w_keyword")]
    pub keyword_occurrence: i64,
    #[serde(default = "w_exact_phrase")]
    pub exact_phrase: i64,
    #[serde(default = "w_header")]
    pub header: i64,
    #[serde(default = "w_directive")]
    pub directive_language: i64,
    #[serde(default = "w_business")]
    pub business_language: i64,
    #[serde(default = "w_legal")]
    pub legal_language: i64,
    #[serde(default = "w_folder")]
    pub folder_match: i64,
    #[serde(default = "w_file")]
    pub file_match: i64,
}

fn w_keyword() -> i64 {
    10
}
fn w_exact_phrase() -> i64 {
    100
}
fn w_header() -> i64 {
    20
}
fn w_directive() -> i64 {
    30
}
fn w_business() -> i64 {
    25
}
fn w_legal() -> i64 {
    40
}
fn w_folder() -> i64 {
    50
}
fn w_file() -> i64 {
    30
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            keyword_occurrence: w_keyword(),
            exact_phrase: w_exact_phrase(),
            header: w_header(),
            directive_language: w_directive(),
            business_language: w_business(),
            legal_language: w_legal(),
            folder_match: w_folder(),
            file_match: w_file(),
        }
    }
}

// ── Retrieval ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Hard cap on facts returned, applied after either path
    #[serde(default = "default_max_facts")]
    pub max_facts: usize,

    /// Candidate limit for the relevance query
    #[serde(default = "default_primary_limit")]
    pub primary_limit: usize,

    /// Candidate limit for the keyword fallback
    #[serde(default = "default_fallback_limit")]
    pub fallback_limit: usize,

    /// Token budget for rendered facts
    #[serde(default = "default_memory_tokens")]
    pub token_budget: usize,

    /// Skip retrieval for greetings and other trivial queries
    #[serde(default = "default_true")]
    pub skip_trivial_queries: bool,
}

fn default_max_facts() -> usize {
    15
}
fn default_primary_limit() -> usize {
    50
}
fn default_fallback_limit() -> usize {
    30
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_facts: default_max_facts(),
            primary_limit: default_primary_limit(),
            fallback_limit: default_fallback_limit(),
            token_budget: default_memory_tokens(),
            skip_trivial_queries: true,
        }
    }
}

// ── Routing ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_token_threshold")]
    pub token_threshold: usize,

    #[serde(default = "default_low_confidence")]
    pub low_confidence_threshold: f32,

    #[serde(default = "default_complexity_threshold")]
    pub complexity_threshold: f32,
}

fn default_token_threshold() -> usize {
    10_000
}
fn default_low_confidence() -> f32 {
    0.6
}
fn default_complexity_threshold() -> f32 {
    0.7
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            token_threshold: default_token_threshold(),
            low_confidence_threshold: default_low_confidence(),
            complexity_threshold: default_complexity_threshold(),
        }
    }
}

// ── Validators ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Validators to run, in order
    #[serde(default = "default_enabled_validators")]
    pub enabled: Vec<String>,

    /// Nouns an ordinal may refer to ("second code")
    #[serde(default = "default_ordinal_subjects")]
    pub ordinal_subjects: Vec<String>,

    #[serde(default = "default_min_year")]
    pub min_year: i32,

    #[serde(default = "default_min_duration")]
    pub min_duration_years: i32,

    #[serde(default = "default_max_duration")]
    pub max_duration_years: i32,

    /// Row limit for the single lookup a validator may issue
    #[serde(default = "default_lookup_limit")]
    pub lookup_limit: usize,

    /// Words that mark a question about a changeable personal attribute
    #[serde(default = "default_attribute_terms")]
    pub attribute_terms: Vec<String>,
}

/// Every validator name the chain understands, in default run order.
pub const KNOWN_VALIDATORS: &[&str] = &[
    "ordinal",
    "temporal",
    "ambiguity",
    "vehicle_recall",
    "conflict",
    "unicode_names",
];

fn default_enabled_validators() -> Vec<String> {
    KNOWN_VALIDATORS.iter().map(|s| s.to_string()).collect()
}
fn default_ordinal_subjects() -> Vec<String> {
    [
        "code", "key", "password", "pin", "number", "account", "address", "phone", "email",
        "card", "id", "car", "job", "pet", "child",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_min_year() -> i32 {
    1950
}
fn default_min_duration() -> i32 {
    1
}
fn default_max_duration() -> i32 {
    60
}
fn default_lookup_limit() -> usize {
    50
}
fn default_attribute_terms() -> Vec<String> {
    [
        "favorite", "favourite", "preferred", "current", "currently", "now", "latest", "still", "new",
        "address", "phone", "email", "employer", "job", "title", "salary", "plan", "status",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_validators(),
            ordinal_subjects: default_ordinal_subjects(),
            min_year: default_min_year(),
            min_duration_years: default_min_duration(),
            max_duration_years: default_max_duration(),
            lookup_limit: default_lookup_limit(),
            attribute_terms: default_attribute_terms(),
        }
    }
}

// ── Memory / session cache ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// "sqlite", "in_memory", or "none"
    #[serde(default = "default_memory_backend")]
    pub backend: String,

    /// SQLite database path
    #[serde(default = "default_memory_path")]
    pub path: String,
}

pub const KNOWN_MEMORY_BACKENDS: &[&str] = &["sqlite", "in_memory", "none"];

fn default_memory_backend() -> String {
    "sqlite".into()
}
fn default_memory_path() -> String {
    AppConfig::config_dir().join("facts.db").display().to_string()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: default_memory_backend(),
            path: default_memory_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCacheConfig {
    /// Maximum number of sessions held
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Seconds a session's documents stay valid after the last write
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

fn default_cache_capacity() -> usize {
    256
}
fn default_cache_ttl() -> u64 {
    3_600
}

impl Default for SessionCacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default path (~/.factlayer/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `FACTLAYER_MEMORY_PATH`
    /// - `FACTLAYER_VAULT_TOKENS`
    /// - `FACTLAYER_MAX_FACTS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = std::env::var("FACTLAYER_MEMORY_PATH") {
            self.memory.path = path;
        }
        if let Some(tokens) = env_usize("FACTLAYER_VAULT_TOKENS")? {
            self.budget.vault_tokens = tokens;
            self.vault.max_tokens = tokens;
        }
        if let Some(max) = env_usize("FACTLAYER_MAX_FACTS")? {
            self.retrieval.max_facts = max;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".factlayer")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.budget;
        if b.memory_tokens == 0 || b.document_tokens == 0 || b.vault_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "per-source token ceilings must be > 0".into(),
            ));
        }
        if b.memory_tokens + b.document_tokens + b.vault_tokens > b.total_tokens {
            return Err(ConfigError::ValidationError(format!(
                "per-source ceilings ({}) exceed total_tokens ({})",
                b.memory_tokens + b.document_tokens + b.vault_tokens,
                b.total_tokens
            )));
        }
        if !(b.sentence_boundary_ratio > 0.0 && b.sentence_boundary_ratio <= 1.0) {
            return Err(ConfigError::ValidationError(
                "sentence_boundary_ratio must be in (0.0, 1.0]".into(),
            ));
        }
        if self.vault.max_tokens == 0 || self.vault.chunk_chars == 0 {
            return Err(ConfigError::ValidationError(
                "vault max_tokens and chunk_chars must be > 0".into(),
            ));
        }
        if self.retrieval.max_facts == 0 {
            return Err(ConfigError::ValidationError("retrieval.max_facts must be > 0".into()));
        }
        let v = &self.validators;
        if v.min_duration_years < 1 || v.min_duration_years > v.max_duration_years {
            return Err(ConfigError::ValidationError(
                "validators duration range is empty or starts below 1".into(),
            ));
        }
        if let Some(unknown) = v.enabled.iter().find(|n| !KNOWN_VALIDATORS.contains(&n.as_str())) {
            return Err(ConfigError::ValidationError(format!("unknown validator '{unknown}'")));
        }
        if v.min_year < 1 {
            return Err(ConfigError::ValidationError("validators.min_year must be positive".into()));
        }
        if !KNOWN_MEMORY_BACKENDS.contains(&self.memory.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown memory backend '{}'",
                self.memory.backend
            )));
        }
        if self.session_cache.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "session_cache.capacity must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            budget: BudgetConfig::default(),
            vault: VaultConfig::default(),
            retrieval: RetrievalConfig::default(),
            routing: RoutingConfig::default(),
            validators: ValidatorConfig::default(),
            memory: MemoryConfig::default(),
            session_cache: SessionCacheConfig::default(),
            fallback_response: default_fallback_response(),
            generation_timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn env_usize(var: &str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| ConfigError::ValidationError(format!("{var}={raw}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.budget.memory_tokens, 2_500);
        assert_eq!(config.budget.document_tokens, 3_000);
        assert_eq!(config.budget.vault_tokens, 9_000);
        assert_eq!(config.retrieval.max_facts, 15);
        assert_eq!(config.vault.min_section_score, 10);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.vault.weights.exact_phrase, 100);
        assert_eq!(parsed.validators.enabled, config.validators.enabled);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
[vault]
min_section_score = 25

[vault.weights]
legal_language = 60
"#,
        )
        .unwrap();
        assert_eq!(parsed.vault.min_section_score, 25);
        assert_eq!(parsed.vault.weights.legal_language, 60);
        assert_eq!(parsed.vault.weights.header, 20);
        assert_eq!(parsed.budget.total_tokens, 15_000);
    }

    #[test]
    fn oversubscribed_budget_rejected() {
        let config = AppConfig {
            budget: BudgetConfig {
                vault_tokens: 12_000,
                ..BudgetConfig::default()
            },
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("exceed total_tokens"));
    }

    #[test]
    fn inverted_duration_range_rejected() {
        let config = AppConfig {
            validators: ValidatorConfig {
                min_duration_years: 10,
                max_duration_years: 5,
                ..ValidatorConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_validator_rejected() {
        let mut config = AppConfig::default();
        config.validators.enabled.push("spellcheck".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("spellcheck"));
    }

    #[test]
    fn unknown_memory_backend_rejected() {
        let mut config = AppConfig::default();
        config.memory.backend = "postgres".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("postgres"));

        for backend in KNOWN_MEMORY_BACKENDS {
            config.memory.backend = backend.to_string();
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.generation_timeout_secs, 60);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fallback_response = \"Try again later.\"\n[retrieval]\nmax_facts = 5").unwrap();
        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.fallback_response, "Try again later.");
        assert_eq!(config.retrieval.max_facts, 5);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[budget\nmemory_tokens = ").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("[budget]"));
        assert!(toml_str.contains("memory_tokens = 2500"));
    }
}
