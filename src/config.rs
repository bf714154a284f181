//! Transfer parameters.
//!
//! Every transfer entry point takes a [`TransferConfig`] by reference; there
//! is no process-wide settings object. The struct deserializes with
//! defaults for missing fields, so a partial JSON file is a valid config.
//!
//! # Example
//!
//! ```
//! use remorph::config::TransferConfig;
//!
//! let config = TransferConfig::default()
//!     .with_vertex_threshold(5.0)
//!     .with_smoothing(3, 0.6)
//!     .sequential();
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{MeshError, Result};

/// Parameters shared by correspondence, projection and LOD retargeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Maximum distance between a target vertex and its source vertex.
    pub vertex_threshold: f64,

    /// Minimum normal agreement, in `[0, 1)`.
    ///
    /// A source vertex is compatible when `dot(n_source, n_target)` exceeds
    /// this value.
    pub normal_incompatibility_threshold: f64,

    /// Scale applied to projected deltas.
    pub multiplier: f64,

    /// Number of Laplacian passes over the projected deltas.
    pub smooth_iterations: u32,

    /// Blend toward the neighbour average per pass, in `[0, 1]`.
    pub smooth_strength: f64,

    /// Distance under which target vertices count as welded.
    pub merge_vertex_tolerance: f64,

    /// Whether to use parallel execution (default: true).
    pub parallel: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            vertex_threshold: 20.0,
            normal_incompatibility_threshold: 0.5,
            multiplier: 1.0,
            smooth_iterations: 0,
            smooth_strength: 1.0,
            merge_vertex_tolerance: 1e-4,
            parallel: true,
        }
    }
}

impl TransferConfig {
    /// Parameters for pushing deltas from a welded mesh onto its unwelded
    /// render mesh: tight threshold, no smoothing, unit multiplier.
    pub fn seam_transfer() -> Self {
        Self {
            vertex_threshold: 1.0,
            ..Self::default()
        }
    }

    /// Set the vertex distance threshold.
    pub fn with_vertex_threshold(mut self, threshold: f64) -> Self {
        self.vertex_threshold = threshold;
        self
    }

    /// Set the normal compatibility threshold.
    pub fn with_normal_threshold(mut self, threshold: f64) -> Self {
        self.normal_incompatibility_threshold = threshold;
        self
    }

    /// Set the delta multiplier.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set smoothing passes and strength.
    pub fn with_smoothing(mut self, iterations: u32, strength: f64) -> Self {
        self.smooth_iterations = iterations;
        self.smooth_strength = strength;
        self
    }

    /// Set the weld distance.
    pub fn with_merge_tolerance(mut self, tolerance: f64) -> Self {
        self.merge_vertex_tolerance = tolerance;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Check every field against its valid range.
    pub fn validate(&self) -> Result<()> {
        if !(self.vertex_threshold >= 0.0) {
            return Err(MeshError::invalid_param(
                "vertex_threshold",
                self.vertex_threshold,
                "must be non-negative",
            ));
        }
        if !(0.0..1.0).contains(&self.normal_incompatibility_threshold) {
            return Err(MeshError::invalid_param(
                "normal_incompatibility_threshold",
                self.normal_incompatibility_threshold,
                "must be in [0, 1)",
            ));
        }
        if !self.multiplier.is_finite() {
            return Err(MeshError::invalid_param(
                "multiplier",
                self.multiplier,
                "must be finite",
            ));
        }
        if !(0.0..=1.0).contains(&self.smooth_strength) {
            return Err(MeshError::invalid_param(
                "smooth_strength",
                self.smooth_strength,
                "must be in [0, 1]",
            ));
        }
        if !(self.merge_vertex_tolerance >= 0.0) {
            return Err(MeshError::invalid_param(
                "merge_vertex_tolerance",
                self.merge_vertex_tolerance,
                "must be non-negative",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TransferConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.vertex_threshold, 20.0);
        assert_eq!(config.normal_incompatibility_threshold, 0.5);
        assert!(config.parallel);
        assert!(TransferConfig::seam_transfer().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        assert!(TransferConfig::default()
            .with_normal_threshold(1.0)
            .validate()
            .is_err());
        assert!(TransferConfig::default()
            .with_vertex_threshold(f64::NAN)
            .validate()
            .is_err());
        assert!(TransferConfig::default()
            .with_smoothing(2, 1.5)
            .validate()
            .is_err());
        assert!(TransferConfig::default()
            .with_multiplier(f64::INFINITY)
            .validate()
            .is_err());
        assert!(TransferConfig::default()
            .with_merge_tolerance(-1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = TransferConfig::default()
            .with_multiplier(2.0)
            .with_smoothing(4, 0.25)
            .sequential();
        assert_eq!(config.multiplier, 2.0);
        assert_eq!(config.smooth_iterations, 4);
        assert_eq!(config.smooth_strength, 0.25);
        assert!(!config.parallel);
    }
}
