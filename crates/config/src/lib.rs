//! Configuration loading and validation for the workshop engine.
//!
//! Loads `<data_dir>/config.toml` (default data dir `~/.workshop`) with
//! environment variable overrides. Every field has a default, so a missing
//! file or a partial file is valid. The defaults reproduce the engine's
//! long-standing fixed limits; the file only exists to tune them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Where workbenches live
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Model id used when a workbench does not pick one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Require a session consent grant before sending workbench data to a provider
    #[serde(default)]
    pub require_egress_consent: bool,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub loop_detection: LoopDetectionConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub receipts: ReceiptConfig,

    #[serde(default)]
    pub review: ReviewConfig,

    #[serde(default)]
    pub clutter: ClutterConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_data_dir() -> PathBuf {
    dirs_home().join(".workshop")
}
fn default_model() -> String {
    "openai:gpt-4o".into()
}

/// Turn and growth limits for the agent loop and the RPI phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_agent_turns")]
    pub max_agent_turns: usize,

    #[serde(default = "default_max_tool_calls_per_turn")]
    pub max_tool_calls_per_turn: usize,

    #[serde(default = "default_research_max_turns")]
    pub research_max_turns: usize,

    #[serde(default = "default_plan_max_turns")]
    pub plan_max_turns: usize,

    #[serde(default = "default_item_max_turns")]
    pub item_max_turns: usize,

    /// Plan may grow to `plan_inflation * original_count` items
    #[serde(default = "default_plan_inflation")]
    pub plan_inflation: usize,
}

fn default_max_agent_turns() -> usize {
    200
}
fn default_max_tool_calls_per_turn() -> usize {
    50
}
fn default_research_max_turns() -> usize {
    30
}
fn default_plan_max_turns() -> usize {
    10
}
fn default_item_max_turns() -> usize {
    30
}
fn default_plan_inflation() -> usize {
    2
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_agent_turns: default_max_agent_turns(),
            max_tool_calls_per_turn: default_max_tool_calls_per_turn(),
            research_max_turns: default_research_max_turns(),
            plan_max_turns: default_plan_max_turns(),
            item_max_turns: default_item_max_turns(),
            plan_inflation: default_plan_inflation(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopDetectionConfig {
    #[serde(default = "default_loop_window")]
    pub window: usize,

    #[serde(default = "default_loop_warn")]
    pub warn_threshold: usize,

    #[serde(default = "default_loop_stop")]
    pub stop_threshold: usize,
}

fn default_loop_window() -> usize {
    10
}
fn default_loop_warn() -> usize {
    3
}
fn default_loop_stop() -> usize {
    5
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            window: default_loop_window(),
            warn_threshold: default_loop_warn(),
            stop_threshold: default_loop_stop(),
        }
    }
}

/// Backoff for rate-limited provider responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    5
}
fn default_base_delay_ms() -> u64 {
    10_000
}
fn default_max_delay_ms() -> u64 {
    240_000
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptConfig {
    /// Results above this many bytes from data tools become receipts
    #[serde(default = "default_receipt_threshold")]
    pub size_threshold: usize,

    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,

    #[serde(default = "default_preview_lines")]
    pub preview_lines: usize,
}

fn default_receipt_threshold() -> usize {
    2048
}
fn default_preview_rows() -> usize {
    5
}
fn default_preview_lines() -> usize {
    20
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            size_threshold: default_receipt_threshold(),
            preview_rows: default_preview_rows(),
            preview_lines: default_preview_lines(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Combined before+after line count above which a diff is truncated
    #[serde(default = "default_max_diff_lines")]
    pub max_diff_lines: usize,

    #[serde(default = "default_max_proposal_content_bytes")]
    pub max_proposal_content_bytes: usize,
}

fn default_max_diff_lines() -> usize {
    5000
}
fn default_max_proposal_content_bytes() -> usize {
    1024 * 1024
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_diff_lines: default_max_diff_lines(),
            max_proposal_content_bytes: default_max_proposal_content_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClutterConfig {
    /// Minimum gap between clutter notifications
    #[serde(default = "default_emit_interval_ms")]
    pub emit_interval_ms: u64,
}

fn default_emit_interval_ms() -> u64 {
    250
}

impl Default for ClutterConfig {
    fn default() -> Self {
        Self {
            emit_interval_ms: default_emit_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default location.
    ///
    /// Priority: env vars > config file > defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let data_dir = std::env::var("WORKSHOP_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());
        Self::load_in(data_dir)
    }

    /// Load `<data_dir>/config.toml`. The given `data_dir` wins over the file.
    pub fn load_in(data_dir: PathBuf) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(&data_dir.join("config.toml"))?;
        config.data_dir = data_dir;

        if let Ok(model) = std::env::var("WORKSHOP_MODEL") {
            config.default_model = model;
        }

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

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    pub fn workbenches_dir(&self) -> PathBuf {
        self.data_dir.join("workbenches")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let loop_cfg = &self.loop_detection;
        if loop_cfg.window == 0 {
            return Err(ConfigError::ValidationError(
                "loop_detection.window must be > 0".into(),
            ));
        }
        if loop_cfg.warn_threshold == 0 || loop_cfg.warn_threshold >= loop_cfg.stop_threshold {
            return Err(ConfigError::ValidationError(
                "loop_detection.warn_threshold must be > 0 and below stop_threshold".into(),
            ));
        }
        if loop_cfg.stop_threshold > loop_cfg.window {
            return Err(ConfigError::ValidationError(
                "loop_detection.stop_threshold cannot exceed the window".into(),
            ));
        }

        let agent = &self.agent;
        if agent.max_agent_turns == 0
            || agent.research_max_turns == 0
            || agent.plan_max_turns == 0
            || agent.item_max_turns == 0
            || agent.max_tool_calls_per_turn == 0
        {
            return Err(ConfigError::ValidationError(
                "agent turn and tool-call limits must be > 0".into(),
            ));
        }
        if agent.plan_inflation < 1 {
            return Err(ConfigError::ValidationError(
                "agent.plan_inflation must be >= 1".into(),
            ));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::ValidationError(
                "retry.base_delay_ms cannot exceed retry.max_delay_ms".into(),
            ));
        }

        if self.receipts.size_threshold == 0 || self.review.max_diff_lines == 0 {
            return Err(ConfigError::ValidationError(
                "receipts.size_threshold and review.max_diff_lines must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            default_model: default_model(),
            require_egress_consent: false,
            agent: AgentConfig::default(),
            loop_detection: LoopDetectionConfig::default(),
            retry: RetryConfig::default(),
            receipts: ReceiptConfig::default(),
            review: ReviewConfig::default(),
            clutter: ClutterConfig::default(),
            logging: LoggingConfig::default(),
        }
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

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_agent_turns, 200);
        assert_eq!(config.loop_detection.stop_threshold, 5);
        assert_eq!(config.retry.max_delay(), Duration::from_secs(240));
        assert_eq!(config.receipts.size_threshold, 2048);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.agent.plan_inflation, 2);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: EngineConfig = toml::from_str(
            r#"
[retry]
base_delay_ms = 5

[loop_detection]
window = 8
"#,
        )
        .unwrap();
        assert_eq!(parsed.retry.base_delay_ms, 5);
        assert_eq!(parsed.retry.max_retries, 5);
        assert_eq!(parsed.loop_detection.window, 8);
        assert_eq!(parsed.loop_detection.warn_threshold, 3);
        assert_eq!(parsed.agent.item_max_turns, 30);
    }

    #[test]
    fn warn_at_or_above_stop_rejected() {
        let config = EngineConfig {
            loop_detection: LoopDetectionConfig {
                window: 10,
                warn_threshold: 5,
                stop_threshold: 5,
            },
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn stop_beyond_window_rejected() {
        let config = EngineConfig {
            loop_detection: LoopDetectionConfig {
                window: 4,
                warn_threshold: 3,
                stop_threshold: 5,
            },
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_plan_inflation_rejected() {
        let mut config = EngineConfig::default();
        config.agent.plan_inflation = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = EngineConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.review.max_diff_lines, 5000);
    }

    #[test]
    fn invalid_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "agent = 3").unwrap();
        let err = EngineConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = EngineConfig::default_toml();
        assert!(toml_str.contains("max_agent_turns"));
        assert!(toml_str.contains("[loop_detection]"));
    }
}
