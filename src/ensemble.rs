use std::fmt;

use serde::Serialize;

use crate::classifier::bank::Vote;
use crate::classifier::ClassifierBank;
use crate::error::{PipelineError, Result};
use crate::models::FeatureRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Low,
    High,
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Low => "Low Risk",
            Verdict::High => "High Risk",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EnsembleOutcome {
    pub votes: Vec<Vote>,
    pub mean_vote: f64,
    pub verdict: Verdict,
}

/// Unweighted vote: the mean of the 0/1 votes rounded half up.
pub fn combine(votes: &[bool]) -> Result<Verdict> {
    if votes.is_empty() {
        return Err(PipelineError::Configuration(
            "ensemble needs at least one vote".into(),
        ));
    }
    let high = votes.iter().filter(|v| **v).count();
    // mean >= 0.5  <=>  2 * high >= n, without float rounding.
    if 2 * high >= votes.len() {
        Ok(Verdict::High)
    } else {
        Ok(Verdict::Low)
    }
}

/// Collects one vote per bank member (each applying its own preprocessing)
/// and combines them.
pub fn decide(bank: &ClassifierBank, row: &FeatureRow) -> Result<EnsembleOutcome> {
    let votes = bank.votes(row)?;
    let flags: Vec<bool> = votes.iter().map(|v| v.high_risk).collect();
    let verdict = combine(&flags)?;
    let mean_vote = flags.iter().filter(|v| **v).count() as f64 / flags.len() as f64;
    tracing::info!(mean_vote, verdict = %verdict, "ensemble decided");
    Ok(EnsembleOutcome {
        votes,
        mean_vote,
        verdict,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoostingConfig, ForestConfig, PipelineConfig};
    use crate::dataset::DatasetBuilder;
    use crate::models::Schema;
    use crate::source::{DataSource, SyntheticSource};

    #[test]
    fn majority_of_three() {
        assert_eq!(combine(&[true, false, true]).unwrap(), Verdict::High);
        assert_eq!(combine(&[true, false, false]).unwrap(), Verdict::Low);
        assert_eq!(combine(&[true, true, false]).unwrap(), Verdict::High);
        assert_eq!(combine(&[false, false, true]).unwrap(), Verdict::Low);
        assert_eq!(combine(&[true, true, true]).unwrap(), Verdict::High);
        assert_eq!(combine(&[false, false, false]).unwrap(), Verdict::Low);
    }

    #[test]
    fn even_split_rounds_up() {
        assert_eq!(combine(&[true, false]).unwrap(), Verdict::High);
        assert_eq!(combine(&[true, true, false, false]).unwrap(), Verdict::High);
        assert_eq!(combine(&[true, false, false, false]).unwrap(), Verdict::Low);
    }

    #[test]
    fn verdict_labels() {
        assert_eq!(Verdict::High.to_string(), "High Risk");
        assert_eq!(Verdict::Low.to_string(), "Low Risk");
    }

    #[test]
    fn no_votes_is_an_error() {
        assert!(matches!(combine(&[]), Err(PipelineError::Configuration(_))));
    }

    #[test]
    fn unfit_bank_cannot_decide() {
        let bank = ClassifierBank::standard(&PipelineConfig::default());
        let row = FeatureRow::new(8, 3, 6, 42, 4).unwrap();
        assert!(matches!(decide(&bank, &row), Err(PipelineError::UnfitModel(_))));
    }

    #[test]
    fn fitted_bank_votes_once_per_member() {
        let config = PipelineConfig {
            forest: ForestConfig {
                n_estimators: 15,
                max_depth: 5,
            },
            boosting: BoostingConfig {
                n_estimators: 15,
                learning_rate: 0.1,
                max_depth: 3,
            },
            ..PipelineConfig::default()
        };
        let records = SyntheticSource::new(100, 42).load().unwrap();
        let dataset = DatasetBuilder::new("current", Schema::current()).build(records);
        let split = dataset.split(0.8, 42).unwrap();
        let mut bank = ClassifierBank::standard(&config);
        bank.fit(&split.train).unwrap();

        let row = FeatureRow::new(8, 3, 6, 42, 4).unwrap();
        let outcome = decide(&bank, &row).unwrap();
        assert_eq!(outcome.votes.len(), 3);
        assert!((0.0..=1.0).contains(&outcome.mean_vote));
        let flags: Vec<bool> = outcome.votes.iter().map(|v| v.high_risk).collect();
        assert_eq!(outcome.verdict, combine(&flags).unwrap());
    }
}
