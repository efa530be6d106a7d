//! Survey configuration stored in `survey.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::range::DEFAULT_RADIUS;
use crate::core::types::Window;
use crate::io::retry::RetryPolicy;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "survey.toml";

/// Survey configuration (TOML).
///
/// Missing fields default to the values the survey has always used, so an
/// absent file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SurveyConfig {
    /// Root directory for per-street result folders.
    pub data_dir: PathBuf,
    pub planner: PlannerConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub google: GoogleConfig,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PlannerConfig {
    /// Half-width of the auto window around the detected house number.
    pub radius: u32,
    /// Windows tried, in order, when detection fails. `[min, max]` pairs.
    pub fallback_windows: Vec<[u32; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Minimum gap between geocode probes.
    pub probe_delay_ms: u64,
    /// Minimum gap between image fetches.
    pub image_delay_ms: u64,
    /// Minimum gap between classifier calls.
    pub classify_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GoogleConfig {
    /// Environment variable holding the Maps API key.
    pub api_key_env: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub zoom: u8,
    pub image_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Vision command to spawn (e.g. `["llm", "-m", "gpt-4o-mini"]`).
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate captured classifier stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("garden_analysis_streets"),
            planner: PlannerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            google: GoogleConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            radius: DEFAULT_RADIUS,
            fallback_windows: vec![[1, 200], [100, 300], [200, 400]],
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            probe_delay_ms: 100,
            image_delay_ms: 100,
            classify_delay_ms: 100,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            api_key_env: "GOOGLE_MAPS_API_KEY".to_string(),
            base_url: "https://maps.googleapis.com/maps/api".to_string(),
            timeout_secs: 30,
            zoom: 20,
            image_size: 640,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 120,
            output_limit_bytes: 100_000,
        }
    }
}

impl SurveyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(anyhow!("data_dir must be non-empty"));
        }
        if self.planner.fallback_windows.is_empty() {
            return Err(anyhow!("planner.fallback_windows must be non-empty"));
        }
        for [min, max] in &self.planner.fallback_windows {
            if Window::new(*min, *max).is_none() {
                return Err(anyhow!(
                    "planner.fallback_windows entry [{min}, {max}] must satisfy 1 <= min <= max"
                ));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be > 0"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(anyhow!("retry.max_delay_ms must be >= retry.base_delay_ms"));
        }
        if self.google.timeout_secs == 0 {
            return Err(anyhow!("google.timeout_secs must be > 0"));
        }
        if self.google.image_size == 0 || self.google.image_size > 640 {
            return Err(anyhow!("google.image_size must be in 1..=640"));
        }
        if self.classifier.timeout_secs == 0 {
            return Err(anyhow!("classifier.timeout_secs must be > 0"));
        }
        if self.classifier.output_limit_bytes == 0 {
            return Err(anyhow!("classifier.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// Fallback windows as validated [`Window`]s.
    pub fn fallback_windows(&self) -> Vec<Window> {
        self.planner
            .fallback_windows
            .iter()
            .filter_map(|[min, max]| Window::new(*min, *max))
            .collect()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit.probe_delay_ms)
    }

    pub fn image_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit.image_delay_ms)
    }

    pub fn classify_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit.classify_delay_ms)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SurveyConfig::default()`.
pub fn load_config(path: &Path) -> Result<SurveyConfig> {
    if !path.exists() {
        let cfg = SurveyConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SurveyConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Write config to disk (used by `survey init`).
pub fn write_config(path: &Path, cfg: &SurveyConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}
