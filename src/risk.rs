use serde::Serialize;

use crate::models::{Feature, FeatureRow, RiskLevel};

pub const SCORE_CAP: u32 = 100;
pub const LOW_CEILING: u32 = 30;
pub const MEDIUM_CEILING: u32 = 60;

pub const FORMULA_TEXT: &str = "Score = (pendingTasks x 5) + (missedDeadlines x 10) + (overlappingTasks x 7) \
     + (completionDrop x 8) + (examProximity x 5), capped at 100";

const WEIGHTS: [(Feature, u32); 5] = [
    (Feature::PendingTasks, 5),
    (Feature::MissedDeadlines, 10),
    (Feature::OverlappingTasks, 7),
    (Feature::CompletionDrop, 8),
    (Feature::ExamProximity, 5),
];

/// Weighted contribution of a single feature before the cap is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contribution {
    pub feature: Feature,
    pub value: u32,
    pub weight: u32,
    pub points: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub contributions: Vec<Contribution>,
    pub uncapped: u64,
    pub score: u32,
    pub capped: bool,
}

/// Fixed-weight burnout score. Every term is non-negative, so only the upper
/// bound needs clamping and the result always lies in `[0, 100]`.
pub fn burnout_score(row: &FeatureRow) -> u32 {
    let uncapped = uncapped_score(row);
    uncapped.min(u64::from(SCORE_CAP)) as u32
}

pub fn risk_level(score: u32) -> RiskLevel {
    match score {
        0..=LOW_CEILING => RiskLevel::Low,
        _ if score <= MEDIUM_CEILING => RiskLevel::Medium,
        _ => RiskLevel::High,
    }
}

pub fn burnout_label(score: u32) -> bool {
    score > MEDIUM_CEILING
}

pub fn score_breakdown(row: &FeatureRow) -> ScoreBreakdown {
    let mut contributions: Vec<Contribution> = WEIGHTS
        .iter()
        .map(|(feature, weight)| {
            let value = row.value(*feature) as u32;
            Contribution {
                feature: *feature,
                value,
                weight: *weight,
                points: u64::from(value) * u64::from(*weight),
            }
        })
        .collect();
    contributions.sort_by(|a, b| b.points.cmp(&a.points));

    let uncapped = uncapped_score(row);
    ScoreBreakdown {
        contributions,
        uncapped,
        score: burnout_score(row),
        capped: uncapped > u64::from(SCORE_CAP),
    }
}

fn uncapped_score(row: &FeatureRow) -> u64 {
    WEIGHTS
        .iter()
        .map(|(feature, weight)| row.value(*feature) as u64 * u64::from(*weight))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pending: i64, missed: i64, overlapping: i64, completion: i64, exam: i64) -> FeatureRow {
        FeatureRow::new(pending, missed, overlapping, completion, exam).unwrap()
    }

    #[test]
    fn tiers_follow_exact_boundaries() {
        assert_eq!(risk_level(0), RiskLevel::Low);
        assert_eq!(risk_level(30), RiskLevel::Low);
        assert_eq!(risk_level(31), RiskLevel::Medium);
        assert_eq!(risk_level(60), RiskLevel::Medium);
        assert_eq!(risk_level(61), RiskLevel::High);
        assert_eq!(risk_level(100), RiskLevel::High);
    }

    #[test]
    fn label_is_strictly_above_sixty() {
        assert!(!burnout_label(60));
        assert!(burnout_label(61));
    }

    #[test]
    fn reference_student_is_capped_high() {
        let student = row(8, 3, 6, 42, 4);
        let breakdown = score_breakdown(&student);
        assert_eq!(breakdown.uncapped, 596);
        assert!(breakdown.capped);
        assert_eq!(burnout_score(&student), 100);
        assert_eq!(risk_level(burnout_score(&student)), RiskLevel::High);
        assert_eq!(breakdown.contributions[0].feature, Feature::CompletionDrop);
        assert_eq!(breakdown.contributions[0].points, 464);
    }

    #[test]
    fn small_inputs_are_not_clamped() {
        let student = row(1, 0, 0, 100, 2);
        assert_eq!(burnout_score(&student), 15);
        assert!(!score_breakdown(&student).capped);
    }

    #[test]
    fn score_is_monotone_in_each_input() {
        let base = [2i64, 1, 1, 97, 1];
        for index in 0..5 {
            let mut previous = 0;
            for step in 0..12 {
                let mut values = base;
                if index == 3 {
                    // A higher completion rate lowers the drop, so walk it downwards.
                    values[3] = base[3] - step;
                } else {
                    values[index] = base[index] + step;
                }
                let score = burnout_score(&row(values[0], values[1], values[2], values[3], values[4]));
                assert!(score >= previous, "feature {index} step {step}");
                assert!(score <= SCORE_CAP);
                previous = score;
            }
        }
    }

    #[test]
    fn huge_counts_do_not_overflow() {
        let student = row(i64::from(u32::MAX), i64::from(u32::MAX), 0, 0, 1);
        assert_eq!(burnout_score(&student), 100);
    }
}
