use crate::classifier::{
    ensure_signature, ensure_training_set, Classifier, Estimator, FeatureMatrix, InputSignature,
};
use crate::config::LogisticConfig;
use crate::error::Result;

const GRADIENT_TOLERANCE: f64 = 1e-6;

/// L2-regularised logistic regression trained by full-batch gradient descent.
/// Starts from zero weights, so fitting is deterministic.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    config: LogisticConfig,
}

impl LogisticRegression {
    pub fn new(config: LogisticConfig) -> Self {
        Self { config }
    }
}

impl Estimator for LogisticRegression {
    fn name(&self) -> &str {
        "Logistic Regression"
    }

    fn fit(&self, x: &FeatureMatrix, y: &[bool]) -> Result<Box<dyn Classifier>> {
        ensure_training_set(self.name(), x, y)?;
        let (weights, bias) = fit_weights(x.rows(), y, &self.config);
        tracing::debug!(model = self.name(), ?weights, bias, "logistic weights fitted");
        Ok(Box::new(FittedLogistic {
            signature: x.signature().clone(),
            weights,
            bias,
        }))
    }
}

#[derive(Debug, Clone)]
pub struct FittedLogistic {
    signature: InputSignature,
    weights: Vec<f64>,
    bias: f64,
}

impl Classifier for FittedLogistic {
    fn name(&self) -> &str {
        "Logistic Regression"
    }

    fn signature(&self) -> &InputSignature {
        &self.signature
    }

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<bool>> {
        ensure_signature(self.name(), &self.signature, x)?;
        Ok(x
            .rows()
            .iter()
            .map(|row| probability(&self.weights, self.bias, row) > 0.5)
            .collect())
    }
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

pub fn probability(weights: &[f64], bias: f64, row: &[f64]) -> f64 {
    let z = weights.iter().zip(row).map(|(w, v)| w * v).sum::<f64>() + bias;
    sigmoid(z)
}

/// Minimises mean log loss plus `l2 / (2n) * |w|^2`. Returns `(weights, bias)`.
pub fn fit_weights<R: AsRef<[f64]>>(
    rows: &[R],
    labels: &[bool],
    config: &LogisticConfig,
) -> (Vec<f64>, f64) {
    let width = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
    let n = rows.len().max(1) as f64;
    let mut weights = vec![0.0; width];
    let mut bias = 0.0;

    for _ in 0..config.max_iter {
        let mut grad_w = vec![0.0; width];
        let mut grad_b = 0.0;
        for (row, label) in rows.iter().zip(labels) {
            let row = row.as_ref();
            let error = probability(&weights, bias, row) - if *label { 1.0 } else { 0.0 };
            for (g, v) in grad_w.iter_mut().zip(row) {
                *g += error * v;
            }
            grad_b += error;
        }

        let mut norm = 0.0;
        for (g, w) in grad_w.iter_mut().zip(&weights) {
            *g = *g / n + config.l2 * w / n;
            norm += *g * *g;
        }
        grad_b /= n;
        norm += grad_b * grad_b;

        for (w, g) in weights.iter_mut().zip(&grad_w) {
            *w -= config.learning_rate * g;
        }
        bias -= config.learning_rate * grad_b;

        if norm.sqrt() < GRADIENT_TOLERANCE {
            break;
        }
    }

    (weights, bias)
}
