use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::classifier::tree::{mean_target, RegressionTree, TreeParams};
use crate::classifier::{
    ensure_signature, ensure_training_set, Classifier, Estimator, FeatureMatrix, InputSignature,
};
use crate::config::ForestConfig;
use crate::error::Result;

/// Bagged decision trees with `sqrt(width)` features drawn per split.
#[derive(Debug, Clone)]
pub struct RandomForest {
    config: ForestConfig,
    seed: u64,
}

impl RandomForest {
    pub fn new(config: ForestConfig, seed: u64) -> Self {
        Self { config, seed }
    }
}

impl Estimator for RandomForest {
    fn name(&self) -> &str {
        "Random Forest"
    }

    fn fit(&self, x: &FeatureMatrix, y: &[bool]) -> Result<Box<dyn Classifier>> {
        ensure_training_set(self.name(), x, y)?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let targets: Vec<f64> = y.iter().map(|&label| f64::from(u8::from(label))).collect();
        let params = TreeParams {
            max_depth: self.config.max_depth,
            min_samples_split: 2,
            max_features: Some(((x.width() as f64).sqrt() as usize).max(1)),
        };

        let n = x.len();
        let trees = (0..self.config.n_estimators)
            .map(|_| {
                let sample: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                RegressionTree::fit(x.rows(), &targets, &sample, &params, &mut rng, |leaf| {
                    mean_target(&targets, leaf)
                })
            })
            .collect::<Vec<_>>();

        tracing::debug!(model = self.name(), trees = trees.len(), "forest grown");
        Ok(Box::new(FittedForest {
            signature: x.signature().clone(),
            trees,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct FittedForest {
    signature: InputSignature,
    trees: Vec<RegressionTree>,
}

impl FittedForest {
    fn probability(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|tree| tree.predict(row)).sum::<f64>() / self.trees.len() as f64
    }
}

impl Classifier for FittedForest {
    fn name(&self) -> &str {
        "Random Forest"
    }

    fn signature(&self) -> &InputSignature {
        &self.signature
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<bool>> {
        ensure_signature(self.name(), &self.signature, x)?;
        // Averaged leaf probabilities; an exact 0.5 tie goes to the negative class.
        Ok(x.rows().iter().map(|row| self.probability(row) > 0.5).collect())
    }
}
