use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// Named input columns a model can be fitted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    PendingTasks,
    MissedDeadlines,
    OverlappingTasks,
    ExamProximity,
    CompletionDrop,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::PendingTasks => "pending_tasks",
            Feature::MissedDeadlines => "missed_deadlines",
            Feature::OverlappingTasks => "overlapping_tasks",
            Feature::ExamProximity => "exam_proximity",
            Feature::CompletionDrop => "completion_drop",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of features. Two schemas are equal only when they list the
/// same features in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema(Vec<Feature>);

impl Schema {
    pub fn new(features: Vec<Feature>) -> Self {
        Self(features)
    }

    /// Five-column schema used for the current population.
    pub fn current() -> Self {
        Self(vec![
            Feature::PendingTasks,
            Feature::MissedDeadlines,
            Feature::OverlappingTasks,
            Feature::ExamProximity,
            Feature::CompletionDrop,
        ])
    }

    /// Baseline records are not offered `completion_drop` as a model input.
    pub fn baseline() -> Self {
        Self(vec![
            Feature::PendingTasks,
            Feature::MissedDeadlines,
            Feature::OverlappingTasks,
            Feature::ExamProximity,
        ])
    }

    pub fn features(&self) -> &[Feature] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains_all(&self, other: &Schema) -> bool {
        other.0.iter().all(|feature| self.0.contains(feature))
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Feature::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Behavioral signals for one student. Fields are validated on construction
/// and cannot be changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureRow {
    pending_tasks: u32,
    missed_deadlines: u32,
    overlapping_tasks: u32,
    completion_rate: u32,
    exam_proximity: u32,
}

impl FeatureRow {
    pub fn new(
        pending_tasks: i64,
        missed_deadlines: i64,
        overlapping_tasks: i64,
        completion_rate: i64,
        exam_proximity: i64,
    ) -> Result<Self> {
        Ok(Self {
            pending_tasks: count("pending_tasks", pending_tasks)?,
            missed_deadlines: count("missed_deadlines", missed_deadlines)?,
            overlapping_tasks: count("overlapping_tasks", overlapping_tasks)?,
            completion_rate: bounded(
                "completion_rate",
                completion_rate,
                0..=100,
                "expected a percentage in [0, 100]",
            )?,
            exam_proximity: bounded(
                "exam_proximity",
                exam_proximity,
                1..=i64::from(u32::MAX),
                "expected a positive number of days",
            )?,
        })
    }

    pub fn pending_tasks(&self) -> u32 {
        self.pending_tasks
    }

    pub fn missed_deadlines(&self) -> u32 {
        self.missed_deadlines
    }

    pub fn overlapping_tasks(&self) -> u32 {
        self.overlapping_tasks
    }

    pub fn completion_rate(&self) -> u32 {
        self.completion_rate
    }

    pub fn exam_proximity(&self) -> u32 {
        self.exam_proximity
    }

    pub fn completion_drop(&self) -> u32 {
        100 - self.completion_rate
    }

    pub fn value(&self, feature: Feature) -> f64 {
        let raw = match feature {
            Feature::PendingTasks => self.pending_tasks,
            Feature::MissedDeadlines => self.missed_deadlines,
            Feature::OverlappingTasks => self.overlapping_tasks,
            Feature::ExamProximity => self.exam_proximity,
            Feature::CompletionDrop => self.completion_drop(),
        };
        f64::from(raw)
    }

    pub fn project(&self, schema: &Schema) -> Vec<f64> {
        schema.features().iter().map(|f| self.value(*f)).collect()
    }
}

fn count(field: &'static str, value: i64) -> Result<u32> {
    if value < 0 {
        return Err(PipelineError::InvalidFeature {
            field,
            value,
            reason: "counts must be non-negative",
        });
    }
    u32::try_from(value).map_err(|_| PipelineError::InvalidFeature {
        field,
        value,
        reason: "count is too large",
    })
}

fn bounded(
    field: &'static str,
    value: i64,
    range: std::ops::RangeInclusive<i64>,
    reason: &'static str,
) -> Result<u32> {
    if !range.contains(&value) {
        return Err(PipelineError::InvalidFeature {
            field,
            value,
            reason,
        });
    }
    Ok(value as u32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw row handed over by a data source.
#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub student_id: Uuid,
    pub features: FeatureRow,
    pub historical_label: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ScoredRow {
    pub student_id: Uuid,
    pub features: FeatureRow,
    pub burnout_score: u32,
    pub risk_level: RiskLevel,
    pub burnout_label: bool,
    pub historical_label: Option<bool>,
}
