use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classifier::{ModelAccuracy, Preprocessing};
use crate::cluster::ClusterProfile;
use crate::dataset::BaselineCalibration;
use crate::ensemble::EnsembleOutcome;
use crate::error::Result;
use crate::models::{FeatureRow, RiskLevel};
use crate::risk::{self, ScoreBreakdown};
use crate::sequence::SequenceEvaluation;

#[derive(Debug, Clone, Serialize)]
pub struct Thresholds {
    pub low_max: u32,
    pub medium_max: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_max: risk::LOW_CEILING,
            medium_max: risk::MEDIUM_CEILING,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TestStudentResult {
    pub features: FeatureRow,
    pub score: u32,
    pub risk_level: RiskLevel,
    pub breakdown: ScoreBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub configured: usize,
    pub distinct: usize,
    pub inertia: f64,
    pub profiles: Vec<ClusterProfile>,
}

/// Everything one successful run reports.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub generated_at: DateTime<Utc>,
    pub seed: u64,
    pub formula: String,
    pub thresholds: Thresholds,
    pub baseline: BaselineCalibration,
    pub current_records: usize,
    pub train_records: usize,
    pub test_records: usize,
    pub test_student: TestStudentResult,
    pub model_accuracy: Vec<ModelAccuracy>,
    pub ensemble: EnsembleOutcome,
    pub clusters: ClusterSummary,
    pub sequence: SequenceEvaluation,
}

pub fn render_json(report: &EvaluationReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn render_breakdown(output: &mut String, breakdown: &ScoreBreakdown) {
    for item in &breakdown.contributions {
        let _ = writeln!(
            output,
            "- {}: {} x {} = {} points",
            item.feature, item.value, item.weight, item.points
        );
    }
    if breakdown.capped {
        let _ = writeln!(
            output,
            "- Uncapped total {} clamped to {}",
            breakdown.uncapped, breakdown.score
        );
    }
}

pub fn render_text(report: &EvaluationReport) -> String {
    let mut output = String::new();
    let t = &report.thresholds;

    let _ = writeln!(output, "# Burnout Risk Report");
    let _ = writeln!(
        output,
        "Generated {} (seed {})",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.seed
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Burnout Prediction Formula");
    let _ = writeln!(output, "{}", report.formula);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Thresholds");
    let _ = writeln!(output, "- Low Risk: score <= {}", t.low_max);
    let _ = writeln!(output, "- Medium Risk: {} < score <= {}", t.low_max, t.medium_max);
    let _ = writeln!(output, "- High Risk: score > {}", t.medium_max);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Data");
    let _ = writeln!(
        output,
        "- Historical training data: {} baseline records",
        report.baseline.records
    );
    match report.baseline.agreement {
        Some(agreement) => {
            let _ = writeln!(
                output,
                "- Baseline calibration: {} historical vs {} formula high-risk labels ({:.2}% agreement)",
                report.baseline.historical_positive,
                report.baseline.formula_positive,
                agreement * 100.0
            );
        }
        None => {
            let _ = writeln!(output, "- Baseline calibration: no historical labels");
        }
    }
    let _ = writeln!(
        output,
        "- Current dataset: {} student profiles ({} train / {} test)",
        report.current_records, report.train_records, report.test_records
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Test Student Analysis");
    let _ = writeln!(output, "Calculated burnout score: {}", report.test_student.score);
    let _ = writeln!(output, "Risk level: {}", report.test_student.risk_level);
    render_breakdown(&mut output, &report.test_student.breakdown);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Model Performance");
    for model in &report.model_accuracy {
        let features = match model.preprocessing {
            Preprocessing::Raw => "raw features",
            Preprocessing::Standardize => "standardized features",
        };
        let _ = writeln!(
            output,
            "- {} accuracy: {:.2}% ({})",
            model.model,
            model.accuracy * 100.0,
            features
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Ensemble Prediction");
    for vote in &report.ensemble.votes {
        let _ = writeln!(
            output,
            "- {}: {}",
            vote.model,
            if vote.high_risk { "high" } else { "low" }
        );
    }
    let _ = writeln!(
        output,
        "Ensemble prediction: {} (mean vote {:.3})",
        report.ensemble.verdict, report.ensemble.mean_vote
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Clusters");
    let _ = writeln!(
        output,
        "Risk clusters identified: {} of {} configured (inertia {:.1})",
        report.clusters.distinct, report.clusters.configured, report.clusters.inertia
    );
    for profile in &report.clusters.profiles {
        let _ = writeln!(
            output,
            "- Cluster {}: {} students, mean score {:.1}",
            profile.cluster, profile.size, profile.mean_score
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Temporal Model");
    let _ = writeln!(
        output,
        "Sequence model trained on {}-week patterns ({}) using {} windows",
        report.sequence.shape.periods, report.sequence.shape, report.sequence.train_windows
    );
    let _ = writeln!(
        output,
        "Holdout: {:.2}% accuracy over {} windows, {} flagged high risk",
        report.sequence.accuracy * 100.0,
        report.sequence.test_windows,
        report.sequence.positive_verdicts
    );

    output
}
