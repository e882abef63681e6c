use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Stream ids passed to [`PipelineConfig::component_seed`].
pub mod stream {
    pub const POPULATION: u64 = 1;
    pub const SPLIT: u64 = 2;
    pub const FOREST: u64 = 3;
    pub const BOOSTING: u64 = 4;
    pub const CLUSTER: u64 = 5;
    pub const SEQUENCE: u64 = 6;
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogisticConfig {
    pub max_iter: usize,
    pub learning_rate: f64,
    /// L2 penalty strength; applied to the weights, never the bias.
    pub l2: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            max_iter: 1000,
            learning_rate: 0.1,
            l2: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 150,
            max_depth: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub seed: u64,
    pub population_size: usize,
    pub train_ratio: f64,
    pub cluster_count: usize,
    pub cluster_restarts: usize,
    pub cluster_max_iter: usize,
    pub window_periods: usize,
    pub window_features: usize,
    pub sequence_train_windows: usize,
    pub sequence_test_windows: usize,
    pub parallel_fit: bool,
    pub logistic: LogisticConfig,
    pub forest: ForestConfig,
    pub boosting: BoostingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            population_size: 100,
            train_ratio: 0.8,
            cluster_count: 3,
            cluster_restarts: 10,
            cluster_max_iter: 300,
            window_periods: 7,
            window_features: 5,
            sequence_train_windows: 80,
            sequence_test_windows: 20,
            parallel_fit: true,
            logistic: LogisticConfig::default(),
            forest: ForestConfig::default(),
            boosting: BoostingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Reads a JSON config file; missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(invalid(format!(
                "train_ratio must lie strictly between 0 and 1, got {}",
                self.train_ratio
            )));
        }
        if self.cluster_count == 0 {
            return Err(invalid("cluster_count must be positive"));
        }
        if self.cluster_restarts == 0 || self.cluster_max_iter == 0 {
            return Err(invalid("cluster_restarts and cluster_max_iter must be positive"));
        }
        if self.window_periods == 0 || self.window_features == 0 {
            return Err(invalid("sequence window shape must be positive in both dimensions"));
        }
        if self.sequence_train_windows == 0 || self.sequence_test_windows == 0 {
            return Err(invalid("sequence window counts must be positive"));
        }
        if self.logistic.max_iter == 0
            || self.forest.n_estimators == 0
            || self.forest.max_depth == 0
            || self.boosting.n_estimators == 0
            || self.boosting.max_depth == 0
        {
            return Err(invalid("model iteration counts and depths must be positive"));
        }
        if self.logistic.learning_rate <= 0.0
            || self.boosting.learning_rate <= 0.0
            || self.logistic.l2 < 0.0
        {
            return Err(invalid("learning rates must be positive and l2 non-negative"));
        }
        Ok(())
    }

    /// Checks the settings that depend on how many rows the population source
    /// actually produced, which for a CSV source is unknown until it is read.
    pub fn validate_population(&self, rows: usize) -> Result<()> {
        let test_rows = test_partition_size(rows, self.train_ratio);
        if test_rows == 0 || test_rows >= rows {
            return Err(invalid(format!(
                "population of {rows} cannot be split {} / {}",
                self.train_ratio,
                1.0 - self.train_ratio
            )));
        }
        if self.cluster_count > rows {
            return Err(invalid(format!(
                "cluster_count {} exceeds the {rows} population rows",
                self.cluster_count
            )));
        }
        Ok(())
    }

    /// Derives an independent seed for one stochastic component.
    pub fn component_seed(&self, component: u64) -> u64 {
        // splitmix64 step keeps derived seeds well separated.
        let mut z = self
            .seed
            .wrapping_add(component.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

/// Held-out row count for a split: the fractional remainder rounds up.
pub fn test_partition_size(rows: usize, train_ratio: f64) -> usize {
    ((rows as f64) * (1.0 - train_ratio) - 1e-9).ceil().max(0.0) as usize
}

fn invalid(message: impl Into<String>) -> PipelineError {
    PipelineError::Configuration(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn eighty_twenty_split_on_hundred_rows() {
        assert_eq!(test_partition_size(100, 0.8), 20);
        assert_eq!(test_partition_size(101, 0.8), 21);
    }

    #[test]
    fn rejects_bad_ratio_and_cluster_count() {
        let mut config = PipelineConfig::default();
        config.train_ratio = 1.0;
        assert!(matches!(config.validate(), Err(PipelineError::Configuration(_))));

        let mut config = PipelineConfig::default();
        config.cluster_count = 0;
        assert!(matches!(config.validate(), Err(PipelineError::Configuration(_))));

        let mut config = PipelineConfig::default();
        config.window_periods = 0;
        assert!(matches!(config.validate(), Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn population_checks_use_the_loaded_row_count() {
        let mut config = PipelineConfig::default();
        config.population_size = 1;
        assert!(config.validate().is_ok());
        assert!(config.validate_population(100).is_ok());
        assert!(matches!(
            config.validate_population(1),
            Err(PipelineError::Configuration(_))
        ));

        config.cluster_count = 6;
        assert!(config.validate_population(5).is_err());
        assert!(config.validate_population(6).is_ok());
    }

    #[test]
    fn config_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!(
            "burnout-config-{}.json",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, r#"{"seed": 11, "population_size": 60, "boosting": {"max_depth": 3}}"#)
            .unwrap();
        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.seed, 11);
        assert_eq!(config.population_size, 60);
        assert_eq!(config.boosting.max_depth, 3);
        assert_eq!(config.boosting.n_estimators, 100);
        assert_eq!(config.train_ratio, 0.8);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            PipelineConfig::from_file(&path),
            Err(PipelineError::Json(_))
        ));
        let _ = std::fs::remove_file(&path);

        assert!(matches!(
            PipelineConfig::from_file(&path),
            Err(PipelineError::Io(_))
        ));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"seed": 7, "forest": {"n_estimators": 10}}"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.forest.n_estimators, 10);
        assert_eq!(config.forest.max_depth, 10);
        assert_eq!(config.cluster_count, 3);
    }

    #[test]
    fn component_seeds_differ() {
        let config = PipelineConfig::default();
        assert_ne!(config.component_seed(1), config.component_seed(2));
        assert_eq!(config.component_seed(3), config.component_seed(3));
    }
}
