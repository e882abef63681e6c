use crate::classifier::{FeatureMatrix, FeatureSpace};
use crate::error::{PipelineError, Result};
use crate::models::Schema;

/// Zero-mean, unit-variance rescaling learned from training rows only.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardizer {
    schema: Schema,
    means: Vec<f64>,
    scales: Vec<f64>,
}

impl Standardizer {
    pub fn fit(x: &FeatureMatrix) -> Result<Self> {
        if x.space() != FeatureSpace::Raw {
            return Err(PipelineError::schema_mismatch(
                "standardizer",
                "raw features",
                x.signature(),
            ));
        }
        if x.is_empty() {
            return Err(PipelineError::EmptyDataset("standardizer has no rows to fit".into()));
        }

        let n = x.len() as f64;
        let width = x.width();
        let mut means = vec![0.0; width];
        for row in x.rows() {
            for (mean, value) in means.iter_mut().zip(row) {
                *mean += value / n;
            }
        }

        let mut scales = vec![0.0; width];
        for row in x.rows() {
            for ((scale, mean), value) in scales.iter_mut().zip(&means).zip(row) {
                *scale += (value - mean).powi(2) / n;
            }
        }
        for scale in scales.iter_mut() {
            *scale = scale.sqrt();
            // Constant columns pass through centred but unscaled.
            if *scale < f64::EPSILON {
                *scale = 1.0;
            }
        }

        Ok(Self {
            schema: x.schema().clone(),
            means,
            scales,
        })
    }

    pub fn transform(&self, x: &FeatureMatrix) -> Result<FeatureMatrix> {
        if x.space() != FeatureSpace::Raw || x.schema() != &self.schema {
            return Err(PipelineError::schema_mismatch(
                "standardizer",
                format!("raw {}", self.schema),
                x.signature(),
            ));
        }
        let rows = x
            .rows()
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.means)
                    .zip(&self.scales)
                    .map(|((value, mean), scale)| (value - mean) / scale)
                    .collect()
            })
            .collect();
        Ok(FeatureMatrix::with_space(
            self.schema.clone(),
            FeatureSpace::Standardized,
            rows,
        ))
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn scales(&self) -> &[f64] {
        &self.scales
    }
}
