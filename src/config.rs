//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.fairchance.toml` files.

use crate::analysis::dashboard::RECENT_LIMIT;
use crate::catalog::CatalogKind;
use crate::cli::{Args, Command, LoadTestArgs, Variant};
use crate::loadtest::metrics::Thresholds;
use crate::loadtest::{default_stages, LoadTestConfig, Stage};
use crate::store::RestConfig;
use crate::wizard::identity::MIN_USERNAME_LEN;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE: &str = ".fairchance.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend connection settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Survey settings.
    #[serde(default)]
    pub survey: SurveyConfig,

    /// Admin dashboard settings.
    #[serde(default)]
    pub admin: AdminConfig,

    /// Load generator settings.
    #[serde(default)]
    pub load_test: LoadTestSettings,
}

/// Backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Project URL; tables live under `{url}/rest/v1/`.
    #[serde(default = "default_url")]
    pub url: String,

    /// API key. Usually supplied through `SUPABASE_ANON_KEY` instead.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_batch_table")]
    pub batch_table: String,

    #[serde(default = "default_interest_table")]
    pub interest_table: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: String::new(),
            batch_table: default_batch_table(),
            interest_table: default_interest_table(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:54321".to_string()
}

fn default_batch_table() -> String {
    "decisions_batch".to_string()
}

fn default_interest_table() -> String {
    "interest_emails".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Survey settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyConfig {
    #[serde(default)]
    pub variant: Variant,

    /// Offense list walked by the flat variant.
    #[serde(default)]
    pub catalog: CatalogKind,

    #[serde(default = "default_min_username_len")]
    pub min_username_len: usize,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            variant: Variant::default(),
            catalog: CatalogKind::default(),
            min_username_len: default_min_username_len(),
        }
    }
}

fn default_min_username_len() -> usize {
    MIN_USERNAME_LEN
}

/// Admin dashboard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Most recent batches loaded for statistics.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,

    /// How often `stats --watch` polls for new batches.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_seconds: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            recent_limit: default_recent_limit(),
            poll_interval_seconds: default_poll_interval(),
        }
    }
}

fn default_recent_limit() -> usize {
    RECENT_LIMIT
}

fn default_poll_interval() -> u64 {
    5
}

/// Load generator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadTestSettings {
    #[serde(default = "default_matrix_id")]
    pub matrix_id: String,

    #[serde(default = "default_p95_threshold")]
    pub p95_threshold_ms: f64,

    /// Ratio of failed requests, 0.0 - 1.0.
    #[serde(default = "default_max_failure_rate")]
    pub max_failure_rate: f64,

    #[serde(default = "default_stages")]
    pub stages: Vec<Stage>,
}

impl Default for LoadTestSettings {
    fn default() -> Self {
        Self {
            matrix_id: default_matrix_id(),
            p95_threshold_ms: default_p95_threshold(),
            max_failure_rate: default_max_failure_rate(),
            stages: default_stages(),
        }
    }
}

fn default_matrix_id() -> String {
    "load-test-matrix".to_string()
}

fn default_p95_threshold() -> f64 {
    1000.0
}

fn default_max_failure_rate() -> f64 {
    0.05
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.fairchance.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only values the user actually supplied override the file.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref url) = args.url {
            self.backend.url = url.clone();
        }
        if let Some(ref api_key) = args.api_key {
            self.backend.api_key = api_key.clone();
        }
        if let Some(timeout) = args.timeout {
            self.backend.timeout_seconds = timeout;
        }

        match &args.command {
            Command::Collect(collect) => {
                if let Some(variant) = collect.variant {
                    self.survey.variant = variant;
                }
                if let Some(catalog) = collect.catalog {
                    self.survey.catalog = catalog;
                }
            }
            Command::Stats(stats) => {
                if let Some(catalog) = stats.catalog {
                    self.survey.catalog = catalog;
                }
                if let Some(limit) = stats.limit {
                    self.admin.recent_limit = limit;
                }
            }
            Command::Batches(batches) => {
                if let Some(limit) = batches.limit {
                    self.admin.recent_limit = limit;
                }
            }
            Command::LoadTest(load) => {
                if let Some(ref matrix_id) = load.matrix_id {
                    self.load_test.matrix_id = matrix_id.clone();
                }
                if let Some(p95) = load.p95_ms {
                    self.load_test.p95_threshold_ms = p95;
                }
                if let Some(rate) = load.max_failure_rate {
                    self.load_test.max_failure_rate = rate;
                }
            }
            Command::Catalog | Command::InitConfig => {}
        }

        self.admin.recent_limit = self.admin.recent_limit.clamp(1, RECENT_LIMIT);
    }

    /// Settings for the REST store.
    pub fn rest_config(&self) -> RestConfig {
        RestConfig {
            url: self.backend.url.clone(),
            api_key: self.backend.api_key.clone(),
            batch_table: self.backend.batch_table.clone(),
            interest_table: self.backend.interest_table.clone(),
            timeout_seconds: self.backend.timeout_seconds,
            poll_interval_seconds: self.admin.poll_interval_seconds,
        }
    }

    /// Settings for one load run.
    pub fn load_test_config(&self, args: &LoadTestArgs, show_progress: bool) -> LoadTestConfig {
        LoadTestConfig {
            url: self.backend.url.clone(),
            api_key: self.backend.api_key.clone(),
            matrix_id: self.load_test.matrix_id.clone(),
            stages: self.load_test.stages.clone(),
            thresholds: Thresholds {
                p95_ms: self.load_test.p95_threshold_ms,
                max_failure_rate: self.load_test.max_failure_rate,
            },
            scale: args.scale,
            max_vus: args.max_vus,
            timeout_seconds: self.backend.timeout_seconds,
            show_progress,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
