//! Trained Model Artifacts
//!
//! Models are trained offline and shipped as JSON artifacts: metadata
//! (feature names, error metrics, feature importances, categorical encoders)
//! plus a serialized estimator. The `ModelRegistry` loads them once at
//! startup and is passed to the service explicitly.
//!
//! A missing artifact is not fatal: the slot stays empty and every call that
//! needs it fails with `ModelError::Unavailable`.

pub mod estimator;
pub mod registry;

pub use estimator::{Estimator, Node, Tree};
pub use registry::{ModelInfo, ModelRegistry, ModelSlot, ModelStatus};

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{MapSnapshot, TrendFeatures};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to read model artifact {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse model artifact {0}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("Model uses unknown feature '{0}'")]
    UnknownFeature(String),

    #[error("Invalid model: {0}")]
    Invalid(String),

    #[error("Model '{model}' is not loaded")]
    Unavailable { model: String },
}

// ============================================================================
// Artifact Format
// ============================================================================

/// Label → integer mappings for categorical features.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Encoders {
    #[serde(default, rename = "type")]
    pub map_type: HashMap<String, i64>,
    #[serde(default)]
    pub tag: HashMap<String, i64>,
}

/// Map type used when a map's own type was unseen in training.
pub const FALLBACK_MAP_TYPE: &str = "uefn";

impl Encoders {
    pub fn encode_type(&self, map_type: &str) -> f64 {
        self.map_type
            .get(map_type)
            .or_else(|| self.map_type.get(FALLBACK_MAP_TYPE))
            .copied()
            .unwrap_or(0) as f64
    }

    pub fn encode_tag(&self, tag: &str) -> f64 {
        self.tag.get(tag).copied().unwrap_or(0) as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Estimator input order
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub mae: Option<f64>,
    #[serde(default)]
    pub r2_score: Option<f64>,
    #[serde(default)]
    pub training_samples: Option<u64>,
    #[serde(default)]
    pub test_samples: Option<u64>,
    #[serde(default)]
    pub feature_importances: HashMap<String, f64>,
    #[serde(default)]
    pub encoders: Encoders,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// A loaded, validated model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub metadata: ModelMetadata,
    pub estimator: Estimator,
}

impl ModelArtifact {
    /// Read and validate an artifact file.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ModelError::Io(path.to_path_buf(), e))?;
        let artifact: Self = serde_json::from_str(&contents)
            .map_err(|e| ModelError::Parse(path.to_path_buf(), e))?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Feature names must come from the known vocabulary and match the
    /// estimator's input width.
    pub fn validate(&self) -> Result<(), ModelError> {
        if let Some(unknown) = self
            .metadata
            .feature_names
            .iter()
            .find(|f| !KNOWN_FEATURES.contains(&f.as_str()))
        {
            return Err(ModelError::UnknownFeature(unknown.clone()));
        }
        self.estimator.validate(self.metadata.feature_names.len())
    }

    /// Evaluate the model for one map.
    pub fn predict(&self, inputs: &FeatureInputs<'_>) -> Result<f64, ModelError> {
        let x = self
            .metadata
            .feature_names
            .iter()
            .map(|name| inputs.value(name, &self.metadata.encoders))
            .collect::<Result<Vec<f64>, ModelError>>()?;
        self.estimator.predict(&x)
    }

    pub fn mae(&self) -> f64 {
        self.metadata.mae.unwrap_or(0.0)
    }
}

// ============================================================================
// Feature Vocabulary
// ============================================================================

/// Every feature name an artifact may reference.
pub const KNOWN_FEATURES: [&str; 16] = [
    "baseline_ccu",
    "trend_slope",
    "volatility",
    "recent_momentum",
    "current_ccu",
    "peak_ccu",
    "min_ccu",
    "creator_followers",
    "max_players",
    "num_tags",
    "xp_enabled",
    "version",
    "map_age_days",
    "growth_rate_7d",
    "type_encoded",
    "tag_encoded",
];

/// Everything a model input can be derived from.
#[derive(Debug, Clone, Copy)]
pub struct FeatureInputs<'a> {
    pub snapshot: &'a MapSnapshot,
    pub features: &'a TrendFeatures,
    /// Highest sample of the observed window
    pub peak_ccu: f64,
    /// Lowest sample of the observed window
    pub min_ccu: f64,
}

impl<'a> FeatureInputs<'a> {
    pub fn new(snapshot: &'a MapSnapshot, features: &'a TrendFeatures, series: &[f64]) -> Self {
        let peak_ccu = series.iter().copied().fold(0.0, f64::max);
        let min_ccu = if series.is_empty() {
            0.0
        } else {
            series.iter().copied().fold(f64::INFINITY, f64::min)
        };
        Self {
            snapshot,
            features,
            peak_ccu,
            min_ccu,
        }
    }

    pub fn value(&self, name: &str, encoders: &Encoders) -> Result<f64, ModelError> {
        let s = self.snapshot;
        let f = self.features;
        Ok(match name {
            "baseline_ccu" => f.baseline_ccu,
            "trend_slope" | "growth_rate_7d" => f.trend_slope,
            "volatility" => f.volatility,
            "recent_momentum" => f.recent_momentum,
            "current_ccu" => s.current_ccu,
            "peak_ccu" => self.peak_ccu,
            "min_ccu" => self.min_ccu,
            "creator_followers" => s.creator_followers as f64,
            "max_players" => f64::from(s.max_players),
            "num_tags" => f64::from(s.num_tags),
            "xp_enabled" => f64::from(u8::from(s.xp_enabled)),
            "version" => f64::from(s.version),
            "map_age_days" => s.map_age_days.map_or(0.0, f64::from),
            "type_encoded" => encoders.encode_type(&s.map_type),
            "tag_encoded" => encoders.encode_tag(&s.primary_tag),
            other => return Err(ModelError::UnknownFeature(other.to_string())),
        })
    }
}

// ============================================================================
// Peak-CCU Confidence
// ============================================================================

/// Typical peak CCU range seen in training.
pub const TYPICAL_PEAK_RANGE: std::ops::RangeInclusive<f64> = 1_000.0..=200_000.0;

/// Confidence label for a peak-CCU prediction, from input data quality.
pub fn peak_confidence(prediction: f64, snapshot: &MapSnapshot) -> &'static str {
    let mut score = 100;
    if !TYPICAL_PEAK_RANGE.contains(&prediction) {
        score -= 30;
    }
    if snapshot.current_ccu == 0.0 {
        score -= 20;
    }
    if snapshot.creator_followers == 0 {
        score -= 15;
    }
    if snapshot.version == 0 {
        score -= 10;
    }

    if score >= 70 {
        "high"
    } else if score >= 40 {
        "medium"
    } else {
        "low"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> MapSnapshot {
        MapSnapshot {
            map_type: "uefn".to_string(),
            primary_tag: "tycoon".to_string(),
            num_tags: 4,
            max_players: 16,
            xp_enabled: true,
            creator_followers: 12_000,
            version: 7,
            current_ccu: 850.0,
            ..MapSnapshot::placeholder("1234-5678-9012")
        }
    }

    #[test]
    fn test_peak_confidence_levels() {
        let s = snapshot();
        assert_eq!(peak_confidence(5_000.0, &s), "high");
        // out of range alone: 70
        assert_eq!(peak_confidence(500.0, &s), "high");

        let cold = MapSnapshot {
            current_ccu: 0.0,
            creator_followers: 0,
            ..snapshot()
        };
        assert_eq!(peak_confidence(5_000.0, &cold), "medium");
        assert_eq!(peak_confidence(500.0, &cold), "low");
    }

    #[test]
    fn test_encoders_fall_back() {
        let encoders = Encoders {
            map_type: [("uefn".to_string(), 3), ("creative".to_string(), 1)].into(),
            tag: [("tycoon".to_string(), 9)].into(),
        };
        assert_eq!(encoders.encode_type("creative"), 1.0);
        assert_eq!(encoders.encode_type("unheard-of"), 3.0);
        assert_eq!(encoders.encode_tag("tycoon"), 9.0);
        assert_eq!(encoders.encode_tag("racing"), 0.0);
    }

    #[test]
    fn test_unknown_feature_rejected_at_validation() {
        let artifact = ModelArtifact {
            metadata: ModelMetadata {
                name: "bad".to_string(),
                version: default_version(),
                feature_names: vec!["baseline_ccu".to_string(), "moon_phase".to_string()],
                mae: None,
                r2_score: None,
                training_samples: None,
                test_samples: None,
                feature_importances: HashMap::new(),
                encoders: Encoders::default(),
            },
            estimator: Estimator::Linear {
                intercept: 0.0,
                coefficients: vec![1.0, 1.0],
            },
        };
        assert!(matches!(
            artifact.validate(),
            Err(ModelError::UnknownFeature(f)) if f == "moon_phase"
        ));
    }

    #[test]
    fn test_feature_inputs_values() {
        let s = snapshot();
        let f = TrendFeatures {
            baseline_ccu: 400.0,
            trend_slope: 12.5,
            volatility: 0.3,
            recent_momentum: -4.0,
        };
        let inputs = FeatureInputs::new(&s, &f, &[300.0, 900.0, 120.0]);
        let enc = Encoders::default();
        assert_eq!(inputs.value("peak_ccu", &enc).unwrap(), 900.0);
        assert_eq!(inputs.value("min_ccu", &enc).unwrap(), 120.0);
        assert_eq!(inputs.value("growth_rate_7d", &enc).unwrap(), 12.5);
        assert_eq!(inputs.value("xp_enabled", &enc).unwrap(), 1.0);
        assert!(inputs.value("moon_phase", &enc).is_err());
    }
}
