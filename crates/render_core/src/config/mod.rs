//! Configuration system
//!
//! Tunables for the transform graph and the instancing pipeline. Files are
//! read as TOML or RON depending on their extension.

pub use serde::{Serialize, Deserialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

        Self::from_str_with_format(&contents, path)
    }

    /// Parse configuration text, picking the format from `path`'s extension
    fn from_str_with_format(contents: &str, path: &str) -> Result<Self, ConfigError> {
        if path.ends_with(".toml") {
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is outside its accepted range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration for the render core
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderCoreConfig {
    /// Transform graph settings
    pub transform: TransformConfig,

    /// Instance buffer and batching settings
    pub instancing: InstancingConfig,
}

impl Config for RenderCoreConfig {}

impl RenderCoreConfig {
    /// Check every section for out-of-range values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transform.validate()?;
        self.instancing.validate()
    }
}

/// Transform graph settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Maximum deviation accepted by the post-flush orthonormality check
    pub orthonormal_tolerance: f32,

    /// Check every touched rotation after a flush and warn on drift
    pub validate_after_flush: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            orthonormal_tolerance: crate::foundation::math::ORTHONORMAL_EPSILON,
            validate_after_flush: false,
        }
    }
}

impl TransformConfig {
    /// Reject out-of-range settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.orthonormal_tolerance > 0.0 && self.orthonormal_tolerance.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "transform.orthonormal_tolerance must be a positive finite number, got {}",
                self.orthonormal_tolerance
            )));
        }
        Ok(())
    }
}

/// Instance buffer layout and binding table settings
///
/// The canonical instance record is four model-matrix columns at
/// `model_matrix_slot..model_matrix_slot + 4` followed by one integer
/// attribute at `auxiliary_slot` carrying `auxiliary_index_count` indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancingConfig {
    /// First attribute slot of the model matrix columns
    pub model_matrix_slot: u32,

    /// Attribute slot of the auxiliary (texture) indices
    pub auxiliary_slot: u32,

    /// Number of auxiliary indices per instance (1..=4)
    pub auxiliary_index_count: usize,

    /// Capacity of the texture binding table
    pub texture_slots: usize,
}

impl Default for InstancingConfig {
    fn default() -> Self {
        Self {
            model_matrix_slot: 3,
            auxiliary_slot: 7,
            auxiliary_index_count: 3,
            texture_slots: 16,
        }
    }
}

impl InstancingConfig {
    /// Reject out-of-range settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=4).contains(&self.auxiliary_index_count) {
            return Err(ConfigError::Invalid(format!(
                "instancing.auxiliary_index_count must be within 1..=4, got {}",
                self.auxiliary_index_count
            )));
        }

        let matrix_slots = self.model_matrix_slot..self.model_matrix_slot.saturating_add(4);
        if matrix_slots.contains(&self.auxiliary_slot) {
            return Err(ConfigError::Invalid(format!(
                "instancing.auxiliary_slot {} overlaps model matrix slots {:?}",
                self.auxiliary_slot, matrix_slots
            )));
        }

        if self.texture_slots == 0 {
            return Err(ConfigError::Invalid(
                "instancing.texture_slots must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RenderCoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.instancing.model_matrix_slot, 3);
        assert_eq!(config.instancing.auxiliary_slot, 7);
        assert_eq!(config.instancing.auxiliary_index_count, 3);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let text = "[instancing]\ntexture_slots = 8\n";
        let config = RenderCoreConfig::from_str_with_format(text, "render.toml").unwrap();

        assert_eq!(config.instancing.texture_slots, 8);
        assert_eq!(config.instancing.auxiliary_slot, 7);
        assert_eq!(config.transform, TransformConfig::default());
    }

    #[test]
    fn test_ron_format() {
        let text = "(transform: (validate_after_flush: true))";
        let config = RenderCoreConfig::from_str_with_format(text, "render.ron").unwrap();
        assert!(config.transform.validate_after_flush);
    }

    #[test]
    fn test_unsupported_extension() {
        let result = RenderCoreConfig::from_str_with_format("", "render.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RenderCoreConfig::default();
        config.instancing.auxiliary_index_count = 5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RenderCoreConfig::default();
        config.instancing.auxiliary_slot = 5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RenderCoreConfig::default();
        config.transform.orthonormal_tolerance = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_save_and_load_toml() {
        let path = std::env::temp_dir().join("render_core_config_test.toml");
        let path = path.to_string_lossy().to_string();

        let mut config = RenderCoreConfig::default();
        config.instancing.texture_slots = 4;
        config.save_to_file(&path).unwrap();

        let loaded = RenderCoreConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_file(&path);
    }
}
