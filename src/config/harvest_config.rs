//! Harvest Configuration - service, data-source and detector tuning as TOML
//!
//! Every struct implements `Default` with the production values, so an empty
//! or missing config file yields a working service.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "HARVEST_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "harvest.toml";

/// Root configuration for the analytics service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// On-disk locations of cached snapshots, history and model artifacts
    #[serde(default)]
    pub data: DataConfig,

    /// Live map data source
    #[serde(default)]
    pub source: SourceConfig,

    /// Hybrid spike detector tuning
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Forecast generator tuning
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Historical-context spike detection
    #[serde(default)]
    pub historical: HistoricalConfig,
}

impl HarvestConfig {
    /// Load configuration using the standard search order:
    /// 1. `$HARVEST_CONFIG` environment variable
    /// 2. `./harvest.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from HARVEST_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from HARVEST_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "HARVEST_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./harvest.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./harvest.toml, using defaults");
                }
            }
        }

        info!("No harvest.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        // Unknown keys only warn; existing configs keep working
        for w in super::validation::validate_unknown_keys(&contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate tuning values for internal consistency.
    ///
    /// Collects every violation before failing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let d = &self.detection;
        if !(1..=3).contains(&d.min_votes) {
            errors.push(format!("detection.min_votes must be in 1..=3, got {}", d.min_votes));
        }
        if d.grouping_window == 0 {
            errors.push("detection.grouping_window must be > 0".to_string());
        }
        if d.seasonal_period < 2 {
            errors.push(format!(
                "detection.seasonal_period must be >= 2, got {}",
                d.seasonal_period
            ));
        }
        if d.peak_distance == 0 {
            errors.push("detection.peak_distance must be > 0".to_string());
        }
        if d.lof_neighbors == 0 {
            errors.push("detection.lof_neighbors must be > 0".to_string());
        }
        if !(d.lof_contamination > 0.0 && d.lof_contamination <= 0.5) {
            errors.push(format!(
                "detection.lof_contamination must be in (0, 0.5], got {}",
                d.lof_contamination
            ));
        }
        if !(0.0..=100.0).contains(&d.prominence_percentile) {
            errors.push(format!(
                "detection.prominence_percentile must be in [0, 100], got {}",
                d.prominence_percentile
            ));
        }
        if d.iqr_multiplier <= 0.0 {
            errors.push("detection.iqr_multiplier must be > 0".to_string());
        }
        if d.min_samples == 0 {
            errors.push("detection.min_samples must be > 0".to_string());
        }

        let s = &d.scale;
        if s.tiny_max_ccu >= s.small_max_ccu {
            errors.push(format!(
                "detection.scale.tiny_max_ccu ({:.0}) must be < small_max_ccu ({:.0})",
                s.tiny_max_ccu, s.small_max_ccu
            ));
        }
        for (name, value) in [
            ("tiny_floor", s.tiny_floor),
            ("small_floor", s.small_floor),
            ("normal_floor", s.normal_floor),
            ("tiny_mean_multiplier", s.tiny_mean_multiplier),
            ("small_mean_multiplier", s.small_mean_multiplier),
            ("normal_mean_multiplier", s.normal_mean_multiplier),
        ] {
            if value < 0.0 {
                errors.push(format!("detection.scale.{name} must be >= 0, got {value}"));
            }
        }

        if self.forecast.interval_multiplier < 0.0 {
            errors.push("forecast.interval_multiplier must be >= 0".to_string());
        }
        if self.historical.max_days == 0 {
            errors.push("historical.max_days must be > 0".to_string());
        }
        if self.source.timeout_secs == 0 {
            errors.push("source.timeout_secs must be > 0".to_string());
        }
        if self.server.addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!("server.addr '{}' is not a valid socket address", self.server.addr));
        }

        // NaN/Inf comparisons silently pass above
        let floats = [
            d.iqr_multiplier,
            d.prominence_percentile,
            d.lof_contamination,
            s.tiny_max_ccu,
            s.tiny_floor,
            s.tiny_mean_multiplier,
            s.small_max_ccu,
            s.small_floor,
            s.small_mean_multiplier,
            s.normal_floor,
            s.normal_mean_multiplier,
            self.forecast.interval_multiplier,
        ];
        if floats.iter().any(|v| !v.is_finite()) {
            errors.push("Config contains NaN or Inf values; all numbers must be finite".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_addr() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            cors_origins: Vec::new(),
        }
    }
}

// ============================================================================
// Data Directories
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Last-known-good live responses, `map_{code}.json`
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,

    /// Daily snapshots, `{code}/{YYYY-MM-DD}.json`
    #[serde(default = "default_historical_dir")]
    pub historical_dir: PathBuf,

    /// Model artifacts
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// Curated list of map codes for `collect`, `{"maps": [..]}`
    #[serde(default = "default_tracked_maps")]
    pub tracked_maps: PathBuf,
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("data/raw")
}
fn default_historical_dir() -> PathBuf {
    PathBuf::from("data/historical")
}
fn default_models_dir() -> PathBuf {
    PathBuf::from("data/models")
}
fn default_tracked_maps() -> PathBuf {
    PathBuf::from("data/tracked_maps.json")
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
            historical_dir: default_historical_dir(),
            models_dir: default_models_dir(),
            tracked_maps: default_tracked_maps(),
        }
    }
}

// ============================================================================
// Live Source
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// When false only the local cache is consulted
    #[serde(default = "default_true")]
    pub live_enabled: bool,
}

fn default_base_url() -> String {
    "https://fncreate.gg".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            live_enabled: true,
        }
    }
}

// ============================================================================
// Spike Detection
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Methods that must agree on a sample (1-3)
    #[serde(default = "default_min_votes")]
    pub min_votes: u8,

    /// Max gap between consensus samples of one event
    #[serde(default = "default_grouping_window")]
    pub grouping_window: usize,

    /// Samples per season (one day at 30-minute resolution)
    #[serde(default = "default_seasonal_period")]
    pub seasonal_period: usize,

    #[serde(default = "default_iqr_multiplier")]
    pub iqr_multiplier: f64,

    /// Minimum inter-peak distance, in samples
    #[serde(default = "default_peak_distance")]
    pub peak_distance: usize,

    #[serde(default = "default_prominence_percentile")]
    pub prominence_percentile: f64,

    #[serde(default = "default_lof_neighbors")]
    pub lof_neighbors: usize,

    /// Expected outlier fraction
    #[serde(default = "default_lof_contamination")]
    pub lof_contamination: f64,

    /// Shortest series the detector accepts
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    #[serde(default)]
    pub scale: ScaleTierConfig,
}

fn default_min_votes() -> u8 { 2 }
fn default_grouping_window() -> usize { 6 }
fn default_seasonal_period() -> usize { 48 }
fn default_iqr_multiplier() -> f64 { 1.5 }
fn default_peak_distance() -> usize { 6 }
fn default_prominence_percentile() -> f64 { 90.0 }
fn default_lof_neighbors() -> usize { 20 }
fn default_lof_contamination() -> f64 { 0.05 }
fn default_min_samples() -> usize { 50 }

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_votes: default_min_votes(),
            grouping_window: default_grouping_window(),
            seasonal_period: default_seasonal_period(),
            iqr_multiplier: default_iqr_multiplier(),
            peak_distance: default_peak_distance(),
            prominence_percentile: default_prominence_percentile(),
            lof_neighbors: default_lof_neighbors(),
            lof_contamination: default_lof_contamination(),
            min_samples: default_min_samples(),
            scale: ScaleTierConfig::default(),
        }
    }
}

/// Traffic tiers and the minimum spike magnitude required in each.
///
/// Floor for a tier is `max(floor, mean_ccu * mean_multiplier)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleTierConfig {
    /// Maps with max CCU below this are tiny
    #[serde(default = "default_tiny_max_ccu")]
    pub tiny_max_ccu: f64,
    #[serde(default = "default_tiny_floor")]
    pub tiny_floor: f64,
    #[serde(default = "default_tiny_mean_multiplier")]
    pub tiny_mean_multiplier: f64,

    /// Maps with max CCU below this are small
    #[serde(default = "default_small_max_ccu")]
    pub small_max_ccu: f64,
    #[serde(default = "default_small_floor")]
    pub small_floor: f64,
    #[serde(default = "default_small_mean_multiplier")]
    pub small_mean_multiplier: f64,

    #[serde(default = "default_normal_floor")]
    pub normal_floor: f64,
    #[serde(default = "default_normal_mean_multiplier")]
    pub normal_mean_multiplier: f64,
}

fn default_tiny_max_ccu() -> f64 { 20.0 }
fn default_tiny_floor() -> f64 { 10.0 }
fn default_tiny_mean_multiplier() -> f64 { 2.0 }
fn default_small_max_ccu() -> f64 { 50.0 }
fn default_small_floor() -> f64 { 15.0 }
fn default_small_mean_multiplier() -> f64 { 1.5 }
fn default_normal_floor() -> f64 { 20.0 }
fn default_normal_mean_multiplier() -> f64 { 0.25 }

impl Default for ScaleTierConfig {
    fn default() -> Self {
        Self {
            tiny_max_ccu: default_tiny_max_ccu(),
            tiny_floor: default_tiny_floor(),
            tiny_mean_multiplier: default_tiny_mean_multiplier(),
            small_max_ccu: default_small_max_ccu(),
            small_floor: default_small_floor(),
            small_mean_multiplier: default_small_mean_multiplier(),
            normal_floor: default_normal_floor(),
            normal_mean_multiplier: default_normal_mean_multiplier(),
        }
    }
}

// ============================================================================
// Forecast / Historical
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Confidence band half-width, in multiples of the model MAE
    #[serde(default = "default_interval_multiplier")]
    pub interval_multiplier: f64,
}

fn default_interval_multiplier() -> f64 {
    1.5
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            interval_multiplier: default_interval_multiplier(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalConfig {
    /// Use stored daily snapshots as context for spike detection
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Most recent snapshot days to concatenate
    #[serde(default = "default_max_days")]
    pub max_days: usize,
}

fn default_max_days() -> usize {
    7
}

impl Default for HistoricalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_days: default_max_days(),
        }
    }
}
