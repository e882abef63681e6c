use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::classifier::logistic::sigmoid;
use crate::classifier::tree::{RegressionTree, TreeParams};
use crate::classifier::{
    ensure_signature, ensure_training_set, Classifier, Estimator, FeatureMatrix, InputSignature,
};
use crate::config::BoostingConfig;
use crate::error::Result;

const PRIOR_CLAMP: f64 = 1e-6;
const HESSIAN_FLOOR: f64 = 1e-12;

/// Gradient-boosted regression trees on binomial log loss. Each stage fits
/// the residual `y - p` and sets leaf values with one Newton step.
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    config: BoostingConfig,
    seed: u64,
}

impl GradientBoosting {
    pub fn new(config: BoostingConfig, seed: u64) -> Self {
        Self { config, seed }
    }
}

impl Estimator for GradientBoosting {
    fn name(&self) -> &str {
        "Gradient Boosting"
    }

    fn fit(&self, x: &FeatureMatrix, y: &[bool]) -> Result<Box<dyn Classifier>> {
        ensure_training_set(self.name(), x, y)?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let labels: Vec<f64> = y.iter().map(|&label| f64::from(u8::from(label))).collect();
        let prior = (labels.iter().sum::<f64>() / labels.len() as f64)
            .clamp(PRIOR_CLAMP, 1.0 - PRIOR_CLAMP);
        let initial = (prior / (1.0 - prior)).ln();

        let params = TreeParams {
            max_depth: self.config.max_depth,
            min_samples_split: 2,
            max_features: None,
        };
        let indices: Vec<usize> = (0..x.len()).collect();
        let mut raw = vec![initial; x.len()];
        let mut stages = Vec::with_capacity(self.config.n_estimators);

        for _ in 0..self.config.n_estimators {
            let probabilities: Vec<f64> = raw.iter().map(|&r| sigmoid(r)).collect();
            let residuals: Vec<f64> = labels
                .iter()
                .zip(&probabilities)
                .map(|(label, p)| label - p)
                .collect();

            let tree = RegressionTree::fit(
                x.rows(),
                &residuals,
                &indices,
                &params,
                &mut rng,
                |leaf| {
                    let numerator: f64 = leaf.iter().map(|&i| residuals[i]).sum();
                    let denominator: f64 = leaf
                        .iter()
                        .map(|&i| probabilities[i] * (1.0 - probabilities[i]))
                        .sum();
                    if denominator.abs() < HESSIAN_FLOOR {
                        0.0
                    } else {
                        numerator / denominator
                    }
                },
            );

            for (value, row) in raw.iter_mut().zip(x.rows()) {
                *value += self.config.learning_rate * tree.predict(row);
            }
            stages.push(tree);
        }

        tracing::debug!(model = self.name(), stages = stages.len(), initial, "boosting stages fitted");
        Ok(Box::new(FittedBoosting {
            signature: x.signature().clone(),
            initial,
            learning_rate: self.config.learning_rate,
            stages,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct FittedBoosting {
    signature: InputSignature,
    initial: f64,
    learning_rate: f64,
    stages: Vec<RegressionTree>,
}

impl FittedBoosting {
    fn decision(&self, row: &[f64]) -> f64 {
        self.initial
            + self.learning_rate * self.stages.iter().map(|tree| tree.predict(row)).sum::<f64>()
    }
}

impl Classifier for FittedBoosting {
    fn name(&self) -> &str {
        "Gradient Boosting"
    }

    fn signature(&self) -> &InputSignature {
        &self.signature
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<bool>> {
        ensure_signature(self.name(), &self.signature, x)?;
        Ok(x.rows().iter().map(|row| sigmoid(self.decision(row)) > 0.5).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::fixtures::labeled_rows;
    use crate::models::{FeatureRow, Schema};

    fn small_boosting() -> GradientBoosting {
        GradientBoosting::new(
            BoostingConfig {
                n_estimators: 30,
                learning_rate: 0.1,
                max_depth: 3,
            },
            42,
        )
    }

    #[test]
    fn fits_formula_labels() {
        let (rows, labels) = labeled_rows();
        let x = FeatureMatrix::from_rows(&Schema::current(), &rows);
        let model = small_boosting().fit(&x, &labels).unwrap();
        assert!(model.accuracy(&x, &labels).unwrap() >= 0.95);
    }

    #[test]
    fn single_class_training_predicts_that_class() {
        let rows = vec![
            FeatureRow::new(0, 0, 0, 100, 1).unwrap(),
            FeatureRow::new(1, 0, 0, 99, 2).unwrap(),
            FeatureRow::new(2, 0, 0, 98, 1).unwrap(),
        ];
        let x = FeatureMatrix::from_rows(&Schema::current(), &rows);
        let model = small_boosting().fit(&x, &[false, false, false]).unwrap();
        assert_eq!(model.predict(&x).unwrap(), vec![false, false, false]);
    }

    #[test]
    fn refits_produce_independent_equal_models() {
        let (rows, labels) = labeled_rows();
        let x = FeatureMatrix::from_rows(&Schema::current(), &rows);
        let estimator = small_boosting();
        let first = estimator.fit(&x, &labels).unwrap();
        let second = estimator.fit(&x, &labels).unwrap();
        assert_eq!(first.predict(&x).unwrap(), second.predict(&x).unwrap());
    }
}
