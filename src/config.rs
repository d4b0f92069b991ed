use std::path::PathBuf;

use crate::errors::{Result, SimError};

/// Simulation parameters. Defaults match the stock two-galaxy run.
#[derive(Clone, Debug)]
pub struct SimConfig {
    /// Total number of bodies across both galaxies.
    pub num_bodies: usize,
    /// Seed for the initial-condition generator.
    pub seed: u64,
    pub iterations: usize,
    /// Partition count for the body-range phases, and the intended size of
    /// the worker pool.
    pub parallelism: usize,
    /// Sector precision: the grid is 2^sector_exp sectors per axis.
    pub sector_exp: u32,
    /// Bodies a leaf bucket holds before it splits.
    pub leaf_cap: u32,
    /// Per-sector arena capacity; `None` derives it each iteration.
    pub chunk_cap: Option<usize>,
    /// Directory for SVG frames; `None` disables frame output.
    pub out_dir: Option<PathBuf>,
    pub verbose: bool,
    pub gravity: f64,
    pub dt: f64,
    /// Barnes-Hut opening angle.
    pub theta: f64,
    /// Softening distance below which pairwise interactions are skipped.
    pub epsilon: f64,
}

impl SimConfig {
    pub const DEFAULT_GRAVITY: f64 = 100.0;
    pub const DEFAULT_DT: f64 = 0.1;
    pub const DEFAULT_THETA: f64 = 0.5;
    pub const DEFAULT_EPSILON: f64 = 1e-5;

    pub fn sectors_per_axis(&self) -> usize {
        1 << self.sector_exp
    }

    pub fn sector_count(&self) -> usize {
        let per_axis = self.sectors_per_axis();
        per_axis * per_axis
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_bodies == 0 {
            return Err(SimError::InvalidConfig("need at least one body".into()));
        }
        if self.parallelism == 0 {
            return Err(SimError::InvalidConfig("parallelism must be >= 1".into()));
        }
        if self.leaf_cap == 0 {
            return Err(SimError::InvalidConfig(
                "leaf bucket size must be >= 1".into(),
            ));
        }
        if self.sector_exp > 12 {
            return Err(SimError::InvalidConfig(
                "sector precision must be <= 12".into(),
            ));
        }
        if self.chunk_cap == Some(0) {
            return Err(SimError::InvalidConfig(
                "arena capacity must be >= 1".into(),
            ));
        }
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(SimError::InvalidConfig("dt must be finite and > 0".into()));
        }
        if !self.gravity.is_finite() {
            return Err(SimError::InvalidConfig(
                "gravity constant must be finite".into(),
            ));
        }
        if !self.theta.is_finite() || self.theta < 0.0 {
            return Err(SimError::InvalidConfig(
                "theta must be finite and >= 0".into(),
            ));
        }
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(SimError::InvalidConfig(
                "epsilon must be finite and >= 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_bodies: 16384,
            seed: 213,
            iterations: 10,
            parallelism: 8,
            sector_exp: 4,
            leaf_cap: 32,
            chunk_cap: None,
            out_dir: None,
            verbose: false,
            gravity: Self::DEFAULT_GRAVITY,
            dt: Self::DEFAULT_DT,
            theta: Self::DEFAULT_THETA,
            epsilon: Self::DEFAULT_EPSILON,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_validation() {
        SimConfig::default().validate().expect("default is valid");
    }

    #[test]
    fn rejects_degenerate_values() {
        let cases = [
            SimConfig {
                num_bodies: 0,
                ..SimConfig::default()
            },
            SimConfig {
                parallelism: 0,
                ..SimConfig::default()
            },
            SimConfig {
                leaf_cap: 0,
                ..SimConfig::default()
            },
            SimConfig {
                chunk_cap: Some(0),
                ..SimConfig::default()
            },
            SimConfig {
                dt: 0.0,
                ..SimConfig::default()
            },
            SimConfig {
                theta: f64::NAN,
                ..SimConfig::default()
            },
        ];
        for config in cases {
            assert!(matches!(
                config.validate(),
                Err(SimError::InvalidConfig(_))
            ));
        }
    }
}
