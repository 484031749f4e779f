// Tool settings
// Loaded from --config, $IPRTRACK_CONFIG, or ~/.config/iprtrack/config.toml

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use iprtrack_core::TaxId;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

/// Operator-curated noise and test entries that must never be appended.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "999999999",
    "52561056945",
    "3023011567",
    "5012060636",
    "007704726225",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// The registry workbook.
    pub path: PathBuf,
    /// Where timestamped snapshots go before each mutation.
    pub backup_dir: PathBuf,
    /// Take `<path>.lock` for mutating commands.
    pub lock: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("companies.xlsx"),
            backup_dir: PathBuf::from("backup"),
            lock: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Overwritten at the start of every run.
    pub file: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            file: PathBuf::from("changes.log"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    pub exclusions: Vec<String>,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            exclusions: DEFAULT_EXCLUSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameSettings {
    /// Canonical names containing one of these use the observed name as
    /// the folder name.
    pub merger_keywords: Vec<String>,
}

impl Default for NameSettings {
    fn default() -> Self {
        Self {
            merger_keywords: iprtrack_core::names::DEFAULT_MERGER_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusSettings {
    /// Company lookup endpoint (find by id, party).
    pub base_url: String,
    /// Name of the env var holding the API key.
    pub token_env: String,
    pub concurrency: usize,
}

impl Default for StatusSettings {
    fn default() -> Self {
        Self {
            base_url: "https://suggestions.dadata.ru/suggestions/api/4_1/rs/findById/party"
                .to_string(),
            token_env: "DADATA_API_KEY".to_string(),
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessSettings {
    /// Folder store resources endpoint.
    pub base_url: String,
    pub token_env: String,
    /// Remote folder holding one subfolder per company.
    pub root: String,
    /// Token ending the date part of a dated subfolder name.
    pub date_delimiter: String,
    pub concurrency: usize,
}

impl Default for FreshnessSettings {
    fn default() -> Self {
        Self {
            base_url: "https://cloud-api.yandex.net/v1/disk/resources".to_string(),
            token_env: "YADISK_TOKEN".to_string(),
            root: "disk:/ИПР".to_string(),
            date_delimiter: " на".to_string(),
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishSettings {
    pub base_url: String,
    /// Empty disables publication.
    pub spreadsheet_id: String,
    pub sheet_title: String,
    /// Numeric id of the sheet tab, used for formatting requests.
    pub sheet_id: u32,
    pub token_env: String,
    /// 1-based column of the remote sheet holding hand-maintained links.
    pub url_column: usize,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            base_url: "https://sheets.googleapis.com/v4/spreadsheets".to_string(),
            spreadsheet_id: String::new(),
            sheet_title: "Sheet1".to_string(),
            sheet_id: 0,
            token_env: "GOOGLE_SHEETS_TOKEN".to_string(),
            url_column: 6,
        }
    }
}

/// Bounded exponential backoff. Keys missing from a `[retry.*]` table
/// take that table's own defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Relative spread, 0.0..=1.0.
    pub jitter: f64,
}

impl RetryConfig {
    fn validate(&self, section: &str) -> Result<(), ConfigError> {
        if self.max_attempts < 1 {
            return Err(ConfigError::Validation(format!(
                "[{section}] max_attempts must be at least 1"
            )));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Validation(format!(
                "[{section}] base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Validation(format!(
                "[{section}] jitter must be within 0.0..=1.0, got {}",
                self.jitter
            )));
        }
        Ok(())
    }
}

impl RetryConfig {
    pub fn request_default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter: 0.2,
        }
    }

    pub fn batch_default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 5_000,
            max_delay_ms: 60_000,
            jitter: 0.2,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::request_default()
    }
}

/// The keys actually present in a `[retry.*]` table.
#[derive(Deserialize)]
struct RetryOverrides {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    jitter: Option<f64>,
}

impl RetryOverrides {
    fn over(self, base: RetryConfig) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            base_delay_ms: self.base_delay_ms.unwrap_or(base.base_delay_ms),
            max_delay_ms: self.max_delay_ms.unwrap_or(base.max_delay_ms),
            jitter: self.jitter.unwrap_or(base.jitter),
        }
    }
}

fn request_retry<'de, D: Deserializer<'de>>(d: D) -> Result<RetryConfig, D::Error> {
    RetryOverrides::deserialize(d).map(|o| o.over(RetryConfig::request_default()))
}

fn batch_retry<'de, D: Deserializer<'de>>(d: D) -> Result<RetryConfig, D::Error> {
    RetryOverrides::deserialize(d).map(|o| o.over(RetryConfig::batch_default()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Per HTTP request.
    #[serde(deserialize_with = "request_retry")]
    pub request: RetryConfig,
    /// Whole status/freshness batch.
    #[serde(deserialize_with = "batch_retry")]
    pub batch: RetryConfig,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            request: RetryConfig::request_default(),
            batch: RetryConfig::batch_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub registry: RegistrySettings,
    pub log: LogSettings,
    pub reconcile: ReconcileSettings,
    pub names: NameSettings,
    pub status: StatusSettings,
    pub freshness: FreshnessSettings,
    pub publish: PublishSettings,
    pub retry: RetrySettings,
}

impl Settings {
    /// `<config dir>/iprtrack/config.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("iprtrack")
            .join("config.toml")
    }

    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let settings: Settings =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from an explicit path (must exist), else the default path if it
    /// exists, else defaults. Returns the file actually read, if any.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => {
                let default = Self::default_path();
                if !default.exists() {
                    return Ok((Self::default(), None));
                }
                default
            }
        };

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let settings = Self::from_toml(&contents)?;
        Ok((settings, Some(path)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.status.concurrency < 1 {
            return Err(ConfigError::Validation(
                "[status] concurrency must be at least 1".into(),
            ));
        }
        if self.freshness.concurrency < 1 {
            return Err(ConfigError::Validation(
                "[freshness] concurrency must be at least 1".into(),
            ));
        }
        if self.publish.url_column < 1 {
            return Err(ConfigError::Validation(
                "[publish] url_column is 1-based".into(),
            ));
        }
        if self.registry.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation("[registry] path is empty".into()));
        }
        self.retry.request.validate("retry.request")?;
        self.retry.batch.validate("retry.batch")?;
        self.exclusion_set()?;
        Ok(())
    }

    /// Exclusions as normalized tax ids.
    pub fn exclusion_set(&self) -> Result<HashSet<TaxId>, ConfigError> {
        self.reconcile
            .exclusions
            .iter()
            .map(|raw| {
                TaxId::parse(raw).map_err(|e| {
                    ConfigError::Validation(format!("[reconcile] exclusion '{raw}': {e}"))
                })
            })
            .collect()
    }
}
