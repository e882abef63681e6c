use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::classifier::FeatureMatrix;
use crate::config::test_partition_size;
use crate::error::{PipelineError, Result};
use crate::models::{Schema, ScoredRow, StudentRecord};
use crate::risk;

/// Applies the score formula to every raw row and tags the result with the
/// feature columns models are allowed to read from it.
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    name: String,
    input_schema: Schema,
}

impl DatasetBuilder {
    pub fn new(name: impl Into<String>, input_schema: Schema) -> Self {
        Self {
            name: name.into(),
            input_schema,
        }
    }

    pub fn build(&self, records: Vec<StudentRecord>) -> Dataset {
        Dataset {
            name: self.name.clone(),
            input_schema: self.input_schema.clone(),
            rows: records.into_iter().map(score_record).collect(),
        }
    }
}

pub fn score_record(record: StudentRecord) -> ScoredRow {
    let burnout_score = risk::burnout_score(&record.features);
    ScoredRow {
        student_id: record.student_id,
        features: record.features,
        burnout_score,
        risk_level: risk::risk_level(burnout_score),
        burnout_label: risk::burnout_label(burnout_score),
        historical_label: record.historical_label,
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    input_schema: Schema,
    rows: Vec<ScoredRow>,
}

#[derive(Debug, Clone)]
pub struct Split {
    pub train: Dataset,
    pub test: Dataset,
}

impl Dataset {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> &[ScoredRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn labels(&self) -> Vec<bool> {
        self.rows.iter().map(|row| row.burnout_label).collect()
    }

    /// Raw feature matrix for `schema`. Asking for a column this dataset does
    /// not offer is a schema mismatch.
    pub fn matrix(&self, schema: &Schema) -> Result<FeatureMatrix> {
        if !self.input_schema.contains_all(schema) {
            return Err(PipelineError::schema_mismatch(
                format!("{} dataset", self.name),
                &self.input_schema,
                schema,
            ));
        }
        Ok(FeatureMatrix::from_rows(
            schema,
            self.rows.iter().map(|row| &row.features),
        ))
    }

    /// Seeded shuffle split. The first `ceil(n * (1 - train_ratio))` shuffled
    /// rows form the test partition; the remainder trains.
    pub fn split(&self, train_ratio: f64, seed: u64) -> Result<Split> {
        if self.rows.is_empty() {
            return Err(PipelineError::EmptyDataset(format!(
                "{} dataset has no rows to split",
                self.name
            )));
        }
        if !(train_ratio > 0.0 && train_ratio < 1.0) {
            return Err(PipelineError::Configuration(format!(
                "train_ratio must lie strictly between 0 and 1, got {train_ratio}"
            )));
        }
        let test_rows = test_partition_size(self.rows.len(), train_ratio);
        if test_rows == 0 || test_rows >= self.rows.len() {
            return Err(PipelineError::Configuration(format!(
                "{} rows cannot be split with train_ratio {train_ratio}",
                self.rows.len()
            )));
        }

        let mut order: Vec<usize> = (0..self.rows.len()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));
        let (test, train) = order.split_at(test_rows);

        Ok(Split {
            train: self.subset(&format!("{} train", self.name), train),
            test: self.subset(&format!("{} test", self.name), test),
        })
    }

    fn subset(&self, name: &str, indices: &[usize]) -> Dataset {
        Dataset {
            name: name.to_string(),
            input_schema: self.input_schema.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

/// How well the formula agrees with hand-assigned historical labels.
#[derive(Debug, Clone, Serialize)]
pub struct BaselineCalibration {
    pub records: usize,
    pub labeled_records: usize,
    pub historical_positive: usize,
    pub formula_positive: usize,
    pub agreement: Option<f64>,
}

impl BaselineCalibration {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let labeled: Vec<(bool, bool)> = dataset
            .rows()
            .iter()
            .filter_map(|row| row.historical_label.map(|h| (h, row.burnout_label)))
            .collect();
        let agreeing = labeled.iter().filter(|(h, f)| h == f).count();

        Self {
            records: dataset.len(),
            labeled_records: labeled.len(),
            historical_positive: labeled.iter().filter(|(h, _)| *h).count(),
            formula_positive: dataset.rows().iter().filter(|r| r.burnout_label).count(),
            agreement: if labeled.is_empty() {
                None
            } else {
                Some(agreeing as f64 / labeled.len() as f64)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureRow, RiskLevel};
    use crate::source::{BaselineSource, DataSource, SyntheticSource};
    use uuid::Uuid;

    fn population(size: usize) -> Dataset {
        let records = SyntheticSource::new(size, 42).load().unwrap();
        DatasetBuilder::new("current", Schema::current()).build(records)
    }

    #[test]
    fn build_scores_each_row_in_order() {
        let records = vec![
            StudentRecord {
                student_id: Uuid::from_u128(1),
                features: FeatureRow::new(8, 3, 6, 42, 4).unwrap(),
                historical_label: None,
            },
            StudentRecord {
                student_id: Uuid::from_u128(2),
                features: FeatureRow::new(1, 0, 0, 100, 2).unwrap(),
                historical_label: None,
            },
        ];
        let dataset = DatasetBuilder::new("current", Schema::current()).build(records);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows()[0].burnout_score, 100);
        assert_eq!(dataset.rows()[0].risk_level, RiskLevel::High);
        assert!(dataset.rows()[0].burnout_label);
        assert_eq!(dataset.rows()[1].burnout_score, 15);
        assert_eq!(dataset.rows()[1].risk_level, RiskLevel::Low);
        assert_eq!(dataset.labels(), vec![true, false]);
    }

    #[test]
    fn split_is_eighty_twenty_and_reproducible() {
        let dataset = population(100);
        let first = dataset.split(0.8, 42).unwrap();
        let second = dataset.split(0.8, 42).unwrap();
        assert_eq!(first.train.len(), 80);
        assert_eq!(first.test.len(), 20);

        let ids = |d: &Dataset| d.rows().iter().map(|r| r.student_id).collect::<Vec<_>>();
        assert_eq!(ids(&first.train), ids(&second.train));
        assert_eq!(ids(&first.test), ids(&second.test));

        let train_ids = ids(&first.train);
        assert!(ids(&first.test).iter().all(|id| !train_ids.contains(id)));
    }

    #[test]
    fn different_seed_changes_partition() {
        let dataset = population(100);
        let a = dataset.split(0.8, 1).unwrap();
        let b = dataset.split(0.8, 2).unwrap();
        let ids = |d: &Dataset| d.rows().iter().map(|r| r.student_id).collect::<Vec<_>>();
        assert_ne!(ids(&a.test), ids(&b.test));
    }

    #[test]
    fn split_rejects_degenerate_inputs() {
        let dataset = population(1);
        assert!(matches!(
            dataset.split(0.8, 42),
            Err(PipelineError::Configuration(_))
        ));
        assert!(population(10).split(0.0, 42).is_err());
        let empty = DatasetBuilder::new("empty", Schema::current()).build(Vec::new());
        assert!(matches!(empty.split(0.8, 42), Err(PipelineError::EmptyDataset(_))));
    }

    #[test]
    fn baseline_does_not_offer_completion_drop() {
        let baseline = DatasetBuilder::new("baseline", Schema::baseline())
            .build(BaselineSource.load().unwrap());
        assert!(baseline.matrix(&Schema::baseline()).is_ok());
        assert!(matches!(
            baseline.matrix(&Schema::current()),
            Err(PipelineError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn calibration_counts_agreement() {
        let baseline = DatasetBuilder::new("baseline", Schema::baseline())
            .build(BaselineSource.load().unwrap());
        let calibration = BaselineCalibration::from_dataset(&baseline);
        assert_eq!(calibration.records, 20);
        assert_eq!(calibration.labeled_records, 20);
        assert_eq!(calibration.historical_positive, 12);
        let agreement = calibration.agreement.unwrap();
        assert!((0.0..=1.0).contains(&agreement));
    }
}
