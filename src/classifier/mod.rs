//! Binary burnout classifiers sharing one fit/predict contract.
//!
//! An [`Estimator`] holds hyperparameters only. Fitting it returns a fresh
//! boxed [`Classifier`] that owns its parameters and never changes again;
//! fitting the same estimator twice yields two independent models.
//!
//! Every fitted model remembers the [`InputSignature`] it was trained on and
//! refuses matrices with a different schema or feature space.

use std::fmt;

use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::models::{FeatureRow, Schema};

pub mod bank;
pub mod boosting;
pub mod forest;
pub mod logistic;
pub mod scaling;
mod tree;

pub use bank::{ClassifierBank, MemberSpec, ModelAccuracy, Preprocessing};
pub use boosting::GradientBoosting;
pub use forest::RandomForest;
pub use logistic::LogisticRegression;
pub use scaling::Standardizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FeatureSpace {
    Raw,
    Standardized,
}

/// Schema plus the feature space the values live in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputSignature {
    pub schema: Schema,
    pub space: FeatureSpace,
}

impl fmt::Display for InputSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let space = match self.space {
            FeatureSpace::Raw => "raw",
            FeatureSpace::Standardized => "standardized",
        };
        write!(f, "{space} {}", self.schema)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    signature: InputSignature,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn from_rows<'a>(schema: &Schema, rows: impl IntoIterator<Item = &'a FeatureRow>) -> Self {
        Self {
            signature: InputSignature {
                schema: schema.clone(),
                space: FeatureSpace::Raw,
            },
            rows: rows.into_iter().map(|row| row.project(schema)).collect(),
        }
    }

    pub(crate) fn with_space(schema: Schema, space: FeatureSpace, rows: Vec<Vec<f64>>) -> Self {
        Self {
            signature: InputSignature { schema, space },
            rows,
        }
    }

    pub fn signature(&self) -> &InputSignature {
        &self.signature
    }

    pub fn schema(&self) -> &Schema {
        &self.signature.schema
    }

    pub fn space(&self) -> FeatureSpace {
        self.signature.space
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.signature.schema.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Unfitted model configuration.
pub trait Estimator: Send + Sync {
    fn name(&self) -> &str;

    fn fit(&self, x: &FeatureMatrix, y: &[bool]) -> Result<Box<dyn Classifier>>;
}

/// A fitted, immutable binary classifier.
pub trait Classifier: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn signature(&self) -> &InputSignature;

    fn predict(&self, x: &FeatureMatrix) -> Result<Vec<bool>>;

    /// Fraction of rows in `x` whose prediction matches `y`.
    fn accuracy(&self, x: &FeatureMatrix, y: &[bool]) -> Result<f64> {
        let predictions = self.predict(x)?;
        accuracy_score(&predictions, y)
    }
}

pub fn accuracy_score(predictions: &[bool], truth: &[bool]) -> Result<f64> {
    if predictions.len() != truth.len() {
        return Err(PipelineError::Configuration(format!(
            "{} predictions cannot be scored against {} labels",
            predictions.len(),
            truth.len()
        )));
    }
    if truth.is_empty() {
        return Err(PipelineError::EmptyDataset("accuracy needs at least one row".into()));
    }
    let correct = predictions
        .iter()
        .zip(truth)
        .filter(|(p, t)| p == t)
        .count();
    Ok(correct as f64 / truth.len() as f64)
}

pub(crate) fn ensure_signature(model: &str, expected: &InputSignature, x: &FeatureMatrix) -> Result<()> {
    if x.signature() != expected {
        return Err(PipelineError::schema_mismatch(model, expected, x.signature()));
    }
    Ok(())
}

pub(crate) fn ensure_training_set(model: &str, x: &FeatureMatrix, y: &[bool]) -> Result<()> {
    if x.is_empty() {
        return Err(PipelineError::EmptyDataset(format!("{model} has no training rows")));
    }
    if x.len() != y.len() {
        return Err(PipelineError::Configuration(format!(
            "{model}: {} training rows but {} labels",
            x.len(),
            y.len()
        )));
    }
    if x.schema().is_empty() {
        return Err(PipelineError::Configuration(format!("{model}: schema has no features")));
    }
    Ok(())
}
