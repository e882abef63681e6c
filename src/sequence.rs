//! Contract for the temporal scorer that reads fixed-shape weekly windows.
//!
//! The scorer runs beside the classifier bank and is reported on its own; its
//! verdicts never feed the ensemble vote.

use std::fmt;

use serde::Serialize;

use crate::classifier::logistic;
use crate::config::LogisticConfig;
use crate::error::{PipelineError, Result};

pub const DECISION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowShape {
    pub periods: usize,
    pub features: usize,
}

impl WindowShape {
    pub fn new(periods: usize, features: usize) -> Result<Self> {
        if periods == 0 || features == 0 {
            return Err(PipelineError::Configuration(format!(
                "window shape {periods}x{features} must be positive in both dimensions"
            )));
        }
        Ok(Self { periods, features })
    }
}

impl fmt::Display for WindowShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} periods x {} features", self.periods, self.features)
    }
}

/// Ordered per-period feature vectors, stored flattened period-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    shape: WindowShape,
    values: Vec<f64>,
}

impl Window {
    pub fn new(shape: WindowShape, periods: Vec<Vec<f64>>) -> Result<Self> {
        if periods.len() != shape.periods {
            return Err(PipelineError::schema_mismatch(
                "sequence window",
                shape,
                format!("{} periods", periods.len()),
            ));
        }
        if let Some((index, period)) = periods
            .iter()
            .enumerate()
            .find(|(_, p)| p.len() != shape.features)
        {
            return Err(PipelineError::schema_mismatch(
                "sequence window",
                shape,
                format!("{} features in period {index}", period.len()),
            ));
        }
        Ok(Self {
            shape,
            values: periods.into_iter().flatten().collect(),
        })
    }

    pub fn shape(&self) -> WindowShape {
        self.shape
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl AsRef<[f64]> for Window {
    fn as_ref(&self) -> &[f64] {
        &self.values
    }
}

pub trait SequenceScorer: Send + Sync {
    fn shape(&self) -> WindowShape;

    /// Probability that the window belongs to a burnout trajectory.
    fn probability(&self, window: &Window) -> Result<f64>;

    fn classify(&self, window: &Window) -> Result<bool> {
        Ok(self.probability(window)? > DECISION_THRESHOLD)
    }
}

/// Logistic model over the flattened window. Stands in for any scorer that
/// honours the same window contract.
#[derive(Debug, Clone)]
pub struct WindowedLogisticScorer {
    shape: WindowShape,
    weights: Vec<f64>,
    bias: f64,
}

impl WindowedLogisticScorer {
    pub fn fit(
        shape: WindowShape,
        windows: &[(Window, bool)],
        config: &LogisticConfig,
    ) -> Result<Self> {
        if windows.is_empty() {
            return Err(PipelineError::EmptyDataset("sequence training windows".into()));
        }
        for (window, _) in windows {
            ensure_shape(shape, window)?;
        }
        let inputs: Vec<&Window> = windows.iter().map(|(w, _)| w).collect();
        let labels: Vec<bool> = windows.iter().map(|(_, label)| *label).collect();
        let (weights, bias) = logistic::fit_weights(&inputs, &labels, config);
        Ok(Self {
            shape,
            weights,
            bias,
        })
    }
}

impl SequenceScorer for WindowedLogisticScorer {
    fn shape(&self) -> WindowShape {
        self.shape
    }

    fn probability(&self, window: &Window) -> Result<f64> {
        ensure_shape(self.shape, window)?;
        Ok(logistic::probability(&self.weights, self.bias, window.values()))
    }
}

fn ensure_shape(expected: WindowShape, window: &Window) -> Result<()> {
    if window.shape() != expected {
        return Err(PipelineError::schema_mismatch(
            "sequence scorer",
            expected,
            window.shape(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct SequenceEvaluation {
    pub shape: WindowShape,
    pub train_windows: usize,
    pub test_windows: usize,
    pub accuracy: f64,
    pub positive_verdicts: usize,
}

pub fn evaluate(
    scorer: &dyn SequenceScorer,
    train_windows: usize,
    test: &[(Window, bool)],
) -> Result<SequenceEvaluation> {
    if test.is_empty() {
        return Err(PipelineError::EmptyDataset("sequence test windows".into()));
    }
    let mut correct = 0usize;
    let mut positive_verdicts = 0usize;
    for (window, label) in test {
        let verdict = scorer.classify(window)?;
        if verdict {
            positive_verdicts += 1;
        }
        if verdict == *label {
            correct += 1;
        }
    }
    Ok(SequenceEvaluation {
        shape: scorer.shape(),
        train_windows,
        test_windows: test.len(),
        accuracy: correct as f64 / test.len() as f64,
        positive_verdicts,
    })
}
