//! Culling configuration.
//!
//! Loaded once at context creation from TOML; every field has a
//! default, so an empty file (or no file) is a valid configuration.

use serde::Deserialize;

use crate::error::CullingError;

/// Tunables for the culling core.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CullingConfig {
    /// Region capacity allocated before the first growth event.
    pub initial_region_capacity: u32,
    /// Arena growth factor; growth targets `ceil(capacity * factor)`.
    pub growth_factor: f32,
    /// Bounded GPU fence wait before buffer release, in milliseconds.
    pub fence_timeout_ms: u64,
    /// Maximum draw distance in world units.
    pub max_draw_distance: f32,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            initial_region_capacity: 64,
            growth_factor: 1.2,
            fence_timeout_ms: 1_000,
            max_draw_distance: 1_024.0,
        }
    }
}

impl CullingConfig {
    /// Parses a TOML document, falling back to defaults per field.
    ///
    /// # Errors
    ///
    /// Returns [`CullingError::InvalidConfig`] on malformed TOML or
    /// out-of-range values.
    pub fn from_toml(text: &str) -> Result<Self, CullingError> {
        let config: Self =
            toml::from_str(text).map_err(|e| CullingError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`CullingError::InvalidConfig`] when a field is outside
    /// its usable range.
    pub fn validate(&self) -> Result<(), CullingError> {
        if self.initial_region_capacity == 0 {
            return Err(CullingError::InvalidConfig(
                "initial_region_capacity must be at least 1".into(),
            ));
        }
        if !(self.growth_factor > 1.0) {
            return Err(CullingError::InvalidConfig(format!(
                "growth_factor must be greater than 1.0, got {}",
                self.growth_factor
            )));
        }
        if self.fence_timeout_ms == 0 {
            return Err(CullingError::InvalidConfig(
                "fence_timeout_ms must be nonzero".into(),
            ));
        }
        if !(self.max_draw_distance > 0.0) {
            return Err(CullingError::InvalidConfig(format!(
                "max_draw_distance must be positive, got {}",
                self.max_draw_distance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_is_defaults() {
        let config = CullingConfig::from_toml("").unwrap();
        assert_eq!(config.initial_region_capacity, 64);
        assert!((config.growth_factor - 1.2).abs() < f32::EPSILON);
        assert_eq!(config.fence_timeout_ms, 1_000);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = CullingConfig::from_toml("initial_region_capacity = 8\n").unwrap();
        assert_eq!(config.initial_region_capacity, 8);
        assert_eq!(config.fence_timeout_ms, 1_000);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(CullingConfig::from_toml("chunk_size = 32\n").is_err());
    }

    #[test]
    fn test_invalid_growth_factor_rejected() {
        let err = CullingConfig::from_toml("growth_factor = 1.0\n").unwrap_err();
        assert!(matches!(err, CullingError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(CullingConfig::from_toml("initial_region_capacity = 0\n").is_err());
    }
}
