use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cluster::ClusterAssignment;
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::models::{FeatureRow, StudentRecord};
use crate::sequence::{Window, WindowShape};

/// Supplies raw student rows to the dataset builder.
pub trait DataSource {
    fn name(&self) -> &str;
    fn load(&self) -> Result<Vec<StudentRecord>>;
}

// pending, missed, avg completion, overlapping, exam proximity, historical label
const BASELINE_ROWS: [(i64, i64, i64, i64, i64, bool); 20] = [
    (2, 0, 90, 1, 20, false),
    (5, 1, 65, 3, 10, false),
    (8, 3, 40, 6, 3, true),
    (1, 0, 95, 0, 30, false),
    (7, 2, 50, 5, 5, true),
    (10, 4, 30, 8, 2, true),
    (3, 1, 70, 2, 15, false),
    (6, 2, 45, 5, 7, true),
    (9, 3, 35, 7, 4, true),
    (4, 1, 75, 3, 18, false),
    (12, 5, 25, 9, 1, true),
    (8, 3, 38, 6, 4, true),
    (5, 1, 68, 3, 12, false),
    (11, 4, 32, 8, 3, true),
    (3, 0, 88, 1, 25, false),
    (7, 2, 52, 4, 6, true),
    (9, 3, 42, 6, 5, true),
    (4, 1, 72, 2, 16, false),
    (6, 2, 48, 5, 8, true),
    (10, 4, 28, 7, 2, true),
];

/// Curated historical records with hand-assigned burnout labels.
pub struct BaselineSource;

impl DataSource for BaselineSource {
    fn name(&self) -> &str {
        "baseline"
    }

    fn load(&self) -> Result<Vec<StudentRecord>> {
        BASELINE_ROWS
            .iter()
            .enumerate()
            .map(|(index, (pending, missed, completion, overlapping, exam, label))| {
                Ok(StudentRecord {
                    student_id: Uuid::from_u128(index as u128 + 1),
                    features: FeatureRow::new(*pending, *missed, *overlapping, *completion, *exam)?,
                    historical_label: Some(*label),
                })
            })
            .collect()
    }
}

/// Seeded uniform population. The same seed and size always yield the same
/// rows in the same order.
pub struct SyntheticSource {
    size: usize,
    seed: u64,
}

impl SyntheticSource {
    pub fn new(size: usize, seed: u64) -> Self {
        Self { size, seed }
    }
}

impl DataSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn load(&self) -> Result<Vec<StudentRecord>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..self.size)
            .map(|_| {
                let student_id = uuid::Builder::from_random_bytes(rng.random()).into_uuid();
                let pending = rng.random_range(0..15);
                let missed = rng.random_range(0..8);
                let completion = rng.random_range(20..100);
                let overlapping = rng.random_range(0..10);
                let exam = rng.random_range(1..30);
                Ok(StudentRecord {
                    student_id,
                    features: FeatureRow::new(pending, missed, overlapping, completion, exam)?,
                    historical_label: None,
                })
            })
            .collect()
    }
}

/// Population rows read from a CSV file with a header row. Rows without a
/// `student_id` get one derived from their position, so reloading the same
/// file yields the same ids.
pub struct CsvSource {
    path: PathBuf,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Deserialize)]
struct CsvRow {
    student_id: Option<Uuid>,
    pending_tasks: i64,
    missed_deadlines: i64,
    overlapping_tasks: i64,
    completion_rate: i64,
    exam_proximity: i64,
    burnout_risk: Option<i64>,
}

impl DataSource for CsvSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn load(&self) -> Result<Vec<StudentRecord>> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut records = Vec::new();

        for (position, result) in reader.deserialize::<CsvRow>().enumerate() {
            let row = result?;
            let historical_label = match row.burnout_risk {
                None => None,
                Some(0) => Some(false),
                Some(1) => Some(true),
                Some(value) => {
                    return Err(PipelineError::InvalidFeature {
                        field: "burnout_risk",
                        value,
                        reason: "historical labels must be 0 or 1",
                    })
                }
            };
            records.push(StudentRecord {
                student_id: row
                    .student_id
                    .unwrap_or_else(|| Uuid::from_u128(position as u128 + 1)),
                features: FeatureRow::new(
                    row.pending_tasks,
                    row.missed_deadlines,
                    row.overlapping_tasks,
                    row.completion_rate,
                    row.exam_proximity,
                )?,
                historical_label,
            });
        }

        Ok(records)
    }
}

/// Uniform `[0, 1)` windows with coin-flip labels.
pub fn synthetic_windows(
    shape: WindowShape,
    count: usize,
    rng: &mut StdRng,
) -> Result<Vec<(Window, bool)>> {
    (0..count)
        .map(|_| {
            let periods = (0..shape.periods)
                .map(|_| (0..shape.features).map(|_| rng.random::<f64>()).collect())
                .collect();
            Ok((Window::new(shape, periods)?, rng.random_bool(0.5)))
        })
        .collect()
}

#[derive(Serialize)]
struct ExportRow {
    student_id: Uuid,
    pending_tasks: u32,
    missed_deadlines: u32,
    overlapping_tasks: u32,
    completion_rate: u32,
    completion_drop: u32,
    exam_proximity: u32,
    burnout_score: u32,
    risk_level: String,
    burnout_risk: u8,
    risk_cluster: Option<usize>,
}

/// Writes scored rows, with their cluster id when an assignment over the
/// same dataset is given.
pub fn export_csv(
    path: &Path,
    dataset: &Dataset,
    clusters: Option<&ClusterAssignment>,
) -> Result<usize> {
    if let Some(clusters) = clusters {
        clusters.ensure_covers(dataset)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    for (position, row) in dataset.rows().iter().enumerate() {
        writer.serialize(ExportRow {
            student_id: row.student_id,
            pending_tasks: row.features.pending_tasks(),
            missed_deadlines: row.features.missed_deadlines(),
            overlapping_tasks: row.features.overlapping_tasks(),
            completion_rate: row.features.completion_rate(),
            completion_drop: row.features.completion_drop(),
            exam_proximity: row.features.exam_proximity(),
            burnout_score: row.burnout_score,
            risk_level: row.risk_level.to_string(),
            burnout_risk: u8::from(row.burnout_label),
            risk_cluster: clusters.and_then(|c| c.cluster_at(position)),
        })?;
    }
    writer.flush()?;
    Ok(dataset.len())
}
