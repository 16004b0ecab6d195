//! Model registry: one optional artifact per model slot, loaded at startup.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use super::{ModelArtifact, ModelError, ModelMetadata};

/// The models the service knows how to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSlot {
    /// Regressor: CCU 7 days out
    FutureCcu,
    /// Classifier: probability of a Discovery placement
    Discovery,
    /// Regressor: peak CCU
    PeakCcu,
}

impl ModelSlot {
    pub const ALL: [ModelSlot; 3] = [ModelSlot::FutureCcu, ModelSlot::Discovery, ModelSlot::PeakCcu];

    pub fn file_name(self) -> &'static str {
        match self {
            ModelSlot::FutureCcu => "future_ccu.json",
            ModelSlot::Discovery => "discovery.json",
            ModelSlot::PeakCcu => "peak_ccu.json",
        }
    }
}

impl std::fmt::Display for ModelSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelSlot::FutureCcu => write!(f, "future_ccu"),
            ModelSlot::Discovery => write!(f, "discovery"),
            ModelSlot::PeakCcu => write!(f, "peak_ccu"),
        }
    }
}

/// Load status of one slot.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub slot: ModelSlot,
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ModelMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Load status of every slot.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub models_dir: PathBuf,
    pub models: Vec<ModelStatus>,
}

/// Explicitly constructed holder of the loaded model artifacts.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models_dir: PathBuf,
    future_ccu: Option<ModelArtifact>,
    discovery: Option<ModelArtifact>,
    peak_ccu: Option<ModelArtifact>,
    /// Load failures, kept for `model_info`
    errors: Vec<(ModelSlot, String)>,
}

impl ModelRegistry {
    /// Load every artifact found in `dir`.
    ///
    /// Each slot loads independently; a missing or invalid artifact leaves
    /// its slot empty.
    pub fn load(dir: &Path) -> Self {
        let mut registry = Self {
            models_dir: dir.to_path_buf(),
            ..Self::default()
        };

        for slot in ModelSlot::ALL {
            let path = dir.join(slot.file_name());
            if !path.exists() {
                warn!(model = %slot, path = %path.display(), "Model artifact not found");
                registry.errors.push((slot, "artifact not found".to_string()));
                continue;
            }
            match ModelArtifact::load(&path) {
                Ok(artifact) => {
                    info!(
                        model = %slot,
                        name = %artifact.metadata.name,
                        version = %artifact.metadata.version,
                        features = artifact.metadata.feature_names.len(),
                        "Model loaded"
                    );
                    registry.set(slot, artifact);
                }
                Err(e) => {
                    warn!(model = %slot, error = %e, "Failed to load model artifact");
                    registry.errors.push((slot, e.to_string()));
                }
            }
        }
        registry
    }

    /// Registry with no models loaded.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder-style slot assignment.
    pub fn with_model(mut self, slot: ModelSlot, artifact: ModelArtifact) -> Self {
        self.set(slot, artifact);
        self
    }

    fn set(&mut self, slot: ModelSlot, artifact: ModelArtifact) {
        self.errors.retain(|(s, _)| *s != slot);
        *self.slot_mut(slot) = Some(artifact);
    }

    fn slot_mut(&mut self, slot: ModelSlot) -> &mut Option<ModelArtifact> {
        match slot {
            ModelSlot::FutureCcu => &mut self.future_ccu,
            ModelSlot::Discovery => &mut self.discovery,
            ModelSlot::PeakCcu => &mut self.peak_ccu,
        }
    }

    fn slot_ref(&self, slot: ModelSlot) -> Option<&ModelArtifact> {
        match slot {
            ModelSlot::FutureCcu => self.future_ccu.as_ref(),
            ModelSlot::Discovery => self.discovery.as_ref(),
            ModelSlot::PeakCcu => self.peak_ccu.as_ref(),
        }
    }

    /// The artifact in `slot`, or `Unavailable`.
    pub fn get(&self, slot: ModelSlot) -> Result<&ModelArtifact, ModelError> {
        self.slot_ref(slot).ok_or_else(|| ModelError::Unavailable {
            model: slot.to_string(),
        })
    }

    pub fn is_loaded(&self, slot: ModelSlot) -> bool {
        self.slot_ref(slot).is_some()
    }

    pub fn model_info(&self) -> ModelInfo {
        let models = ModelSlot::ALL
            .iter()
            .map(|&slot| {
                let artifact = self.slot_ref(slot);
                ModelStatus {
                    slot,
                    loaded: artifact.is_some(),
                    metadata: artifact.map(|a| a.metadata.clone()),
                    error: self
                        .errors
                        .iter()
                        .find(|(s, _)| *s == slot)
                        .map(|(_, e)| e.clone()),
                }
            })
            .collect();
        ModelInfo {
            models_dir: self.models_dir.clone(),
            models,
        }
    }
}
