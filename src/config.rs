//! Process-wide settings
//!
//! Built once at startup and handed to each component's constructor.
//! Sources, lowest priority first:
//! 1. Built-in defaults (the system runs with no file and no tools installed)
//! 2. Optional TOML file (`SCORING_CONFIG`, default `./files/scoring.toml`)
//! 3. Environment variables (`SCORING_*`, `REDIS_URL`)

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_CONFIG_PATH: &str = "./files/scoring.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub redis_url: String,
    /// Redis list the request layer pushes submission ids onto
    pub queue_key: String,
    pub analyzers: AnalyzersConfig,
    pub sandbox: SandboxConfig,
    pub scoring: ScoringConfig,
    pub worker: WorkerConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            redis_url: "redis://localhost:6379".into(),
            queue_key: "scoring:queue".into(),
            analyzers: AnalyzersConfig::default(),
            sandbox: SandboxConfig::default(),
            scoring: ScoringConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct AnalyzersConfig {
    pub semgrep: SemgrepConfig,
    pub bandit: BanditConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SemgrepConfig {
    pub enabled: bool,
    pub binary: String,
    /// Rule files or directories passed as `--config`
    pub rules: Vec<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for SemgrepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: "semgrep".into(),
            rules: vec![PathBuf::from("./files/semgrep")],
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BanditConfig {
    pub enabled: bool,
    pub binary: String,
    pub timeout_secs: u64,
    /// Minimum reported severity (`--severity-level`)
    pub severity: String,
    /// Minimum reported confidence (`--confidence-level`)
    pub confidence: String,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: "bandit".into(),
            timeout_secs: 10,
            severity: "LOW".into(),
            confidence: "LOW".into(),
        }
    }
}

/// Which isolation strategy the sandbox uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxDriver {
    /// No sandbox stage at all
    #[serde(alias = "none")]
    Disabled,
    #[default]
    Local,
    #[serde(alias = "container", alias = "docker")]
    Containerized,
}

impl FromStr for SandboxDriver {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disabled" | "none" => Ok(Self::Disabled),
            "local" => Ok(Self::Local),
            "containerized" | "container" | "docker" => Ok(Self::Containerized),
            other => Err(format!(
                "unknown sandbox driver '{}' (expected local, containerized or disabled)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub driver: SandboxDriver,
    /// Wall-clock timeout per invocation, including container launch
    pub timeout_secs: u64,
    /// Interpreter used for the compile-only check
    pub python: String,
    /// Container runtime binary (docker, podman)
    pub runtime: String,
    pub image: String,
    pub memory_mb: u32,
    pub cpu_shares: u32,
    /// CPU-time ceiling for the local interpreter
    pub cpu_secs: u32,
    /// Overrides the driver's built-in deny-list when set
    pub deny_patterns: Option<Vec<String>>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            driver: SandboxDriver::default(),
            timeout_secs: 10,
            python: "python3".into(),
            runtime: "docker".into(),
            image: "python:3.12-slim".into(),
            memory_mb: 256,
            cpu_shares: 256,
            cpu_secs: 5,
            deny_patterns: None,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Score bands and the ceiling applied when the sandbox fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub full_score: u32,
    pub partial_score: u32,
    pub zero_score: u32,
    pub sandbox_failure_ceiling: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            full_score: 100,
            partial_score: 20,
            zero_score: 0,
            sandbox_failure_ceiling: 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Upper bound on how long `stop()` waits for the worker to drain
    pub stop_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            stop_timeout_secs: 5,
        }
    }
}

impl WorkerConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl Settings {
    /// Load settings from the optional config file and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = match std::env::var("SCORING_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            Err(_) => Self::default(),
        };

        settings.apply_overrides(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment-style overrides; `lookup` maps a variable name to its value
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SCORING_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = lookup("REDIS_URL") {
            self.redis_url = v;
        }
        if let Some(v) = lookup("SCORING_QUEUE_KEY") {
            self.queue_key = v;
        }

        let semgrep = &mut self.analyzers.semgrep;
        if let Some(v) = lookup("SCORING_SEMGREP_ENABLED") {
            semgrep.enabled = parse_value("SCORING_SEMGREP_ENABLED", &v)?;
        }
        if let Some(v) = lookup("SCORING_SEMGREP_BIN") {
            semgrep.binary = v;
        }
        if let Some(v) = lookup("SCORING_SEMGREP_RULES") {
            semgrep.rules = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Some(v) = lookup("SCORING_SEMGREP_TIMEOUT_SECS") {
            semgrep.timeout_secs = parse_value("SCORING_SEMGREP_TIMEOUT_SECS", &v)?;
        }

        let bandit = &mut self.analyzers.bandit;
        if let Some(v) = lookup("SCORING_BANDIT_ENABLED") {
            bandit.enabled = parse_value("SCORING_BANDIT_ENABLED", &v)?;
        }
        if let Some(v) = lookup("SCORING_BANDIT_BIN") {
            bandit.binary = v;
        }
        if let Some(v) = lookup("SCORING_BANDIT_TIMEOUT_SECS") {
            bandit.timeout_secs = parse_value("SCORING_BANDIT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("SCORING_BANDIT_SEVERITY") {
            bandit.severity = v;
        }
        if let Some(v) = lookup("SCORING_BANDIT_CONFIDENCE") {
            bandit.confidence = v;
        }

        let sandbox = &mut self.sandbox;
        if let Some(v) = lookup("SCORING_SANDBOX_DRIVER") {
            sandbox.driver = parse_value("SCORING_SANDBOX_DRIVER", &v)?;
        }
        if let Some(v) = lookup("SCORING_SANDBOX_TIMEOUT_SECS") {
            sandbox.timeout_secs = parse_value("SCORING_SANDBOX_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("SCORING_SANDBOX_PYTHON") {
            sandbox.python = v;
        }
        if let Some(v) = lookup("SCORING_SANDBOX_RUNTIME") {
            sandbox.runtime = v;
        }
        if let Some(v) = lookup("SCORING_SANDBOX_IMAGE") {
            sandbox.image = v;
        }
        if let Some(v) = lookup("SCORING_SANDBOX_MEMORY_MB") {
            sandbox.memory_mb = parse_value("SCORING_SANDBOX_MEMORY_MB", &v)?;
        }
        if let Some(v) = lookup("SCORING_SANDBOX_CPU_SHARES") {
            sandbox.cpu_shares = parse_value("SCORING_SANDBOX_CPU_SHARES", &v)?;
        }
        if let Some(v) = lookup("SCORING_SANDBOX_CPU_SECS") {
            sandbox.cpu_secs = parse_value("SCORING_SANDBOX_CPU_SECS", &v)?;
        }

        let scoring = &mut self.scoring;
        if let Some(v) = lookup("SCORING_FULL_SCORE") {
            scoring.full_score = parse_value("SCORING_FULL_SCORE", &v)?;
        }
        if let Some(v) = lookup("SCORING_PARTIAL_SCORE") {
            scoring.partial_score = parse_value("SCORING_PARTIAL_SCORE", &v)?;
        }
        if let Some(v) = lookup("SCORING_ZERO_SCORE") {
            scoring.zero_score = parse_value("SCORING_ZERO_SCORE", &v)?;
        }
        if let Some(v) = lookup("SCORING_SANDBOX_FAILURE_CEILING") {
            scoring.sandbox_failure_ceiling = parse_value("SCORING_SANDBOX_FAILURE_CEILING", &v)?;
        }

        if let Some(v) = lookup("SCORING_STOP_TIMEOUT_SECS") {
            self.worker.stop_timeout_secs = parse_value("SCORING_STOP_TIMEOUT_SECS", &v)?;
        }

        Ok(())
    }

    /// Reject settings that would break scoring invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scoring = &self.scoring;
        if scoring.full_score > 100 {
            return Err(invalid("scoring.full_score", "must be at most 100"));
        }
        if !(scoring.full_score > scoring.partial_score && scoring.partial_score > scoring.zero_score)
        {
            return Err(invalid(
                "scoring",
                "score bands must satisfy full_score > partial_score > zero_score",
            ));
        }
        if scoring.sandbox_failure_ceiling > 100 {
            return Err(invalid("scoring.sandbox_failure_ceiling", "must be at most 100"));
        }

        let timeouts = [
            ("analyzers.semgrep.timeout_secs", self.analyzers.semgrep.timeout_secs),
            ("analyzers.bandit.timeout_secs", self.analyzers.bandit.timeout_secs),
            ("sandbox.timeout_secs", self.sandbox.timeout_secs),
            ("worker.stop_timeout_secs", self.worker.stop_timeout_secs),
        ];
        for (key, value) in timeouts {
            if value == 0 {
                return Err(invalid(key, "must be greater than zero"));
            }
        }

        if let Some(patterns) = &self.sandbox.deny_patterns {
            for pattern in patterns {
                regex::Regex::new(pattern).map_err(|source| ConfigError::Pattern {
                    pattern: pattern.clone(),
                    source,
                })?;
            }
        }

        Ok(())
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| invalid(key, &e.to_string()))
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.to_string(),
    }
}
