use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;

use crate::classifier::{
    Classifier, Estimator, FeatureMatrix, GradientBoosting, LogisticRegression, RandomForest,
    Standardizer,
};
use crate::config::{stream, PipelineConfig};
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::models::{FeatureRow, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Preprocessing {
    Raw,
    /// Standardize with statistics learned from the training partition.
    Standardize,
}

/// One bank slot: which estimator, on which columns, with which preprocessing.
#[derive(Clone)]
pub struct MemberSpec {
    pub estimator: Arc<dyn Estimator>,
    pub schema: Schema,
    pub preprocessing: Preprocessing,
}

impl MemberSpec {
    pub fn new(
        estimator: impl Estimator + 'static,
        schema: Schema,
        preprocessing: Preprocessing,
    ) -> Self {
        Self {
            estimator: Arc::new(estimator),
            schema,
            preprocessing,
        }
    }

    pub fn name(&self) -> &str {
        self.estimator.name()
    }
}

#[derive(Debug)]
struct FittedMember {
    scaler: Option<Standardizer>,
    model: Box<dyn Classifier>,
}

impl FittedMember {
    fn prepare(&self, x: &FeatureMatrix) -> Result<FeatureMatrix> {
        match &self.scaler {
            Some(scaler) => scaler.transform(x),
            None => Ok(x.clone()),
        }
    }
}

struct Member {
    spec: MemberSpec,
    fitted: Option<FittedMember>,
}

impl Member {
    fn fitted(&self) -> Result<&FittedMember> {
        self.fitted
            .as_ref()
            .ok_or_else(|| PipelineError::UnfitModel(self.spec.name().to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelAccuracy {
    pub model: String,
    pub preprocessing: Preprocessing,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Vote {
    pub model: String,
    pub high_risk: bool,
}

/// Independent classifiers trained on the same partition. Members never share
/// parameters, so they can be fitted in any order or concurrently.
#[derive(Default)]
pub struct ClassifierBank {
    members: Vec<Member>,
}

impl ClassifierBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logistic regression on standardized features plus a forest and a
    /// boosted ensemble on raw features, all over the five-column schema.
    pub fn standard(config: &PipelineConfig) -> Self {
        Self::new()
            .with_member(MemberSpec::new(
                LogisticRegression::new(config.logistic.clone()),
                Schema::current(),
                Preprocessing::Standardize,
            ))
            .with_member(MemberSpec::new(
                RandomForest::new(config.forest.clone(), config.component_seed(stream::FOREST)),
                Schema::current(),
                Preprocessing::Raw,
            ))
            .with_member(MemberSpec::new(
                GradientBoosting::new(
                    config.boosting.clone(),
                    config.component_seed(stream::BOOSTING),
                ),
                Schema::current(),
                Preprocessing::Raw,
            ))
    }

    pub fn with_member(mut self, spec: MemberSpec) -> Self {
        self.members.push(Member { spec, fitted: None });
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.spec.name()).collect()
    }

    pub fn is_fitted(&self) -> bool {
        !self.members.is_empty() && self.members.iter().all(|m| m.fitted.is_some())
    }

    /// Fits every member on `train`. A refit replaces each member's model
    /// with a newly built one.
    pub fn fit(&mut self, train: &Dataset) -> Result<()> {
        self.ensure_members()?;
        let fitted = self
            .members
            .iter()
            .map(|member| fit_member(&member.spec, train))
            .collect::<Result<Vec<_>>>()?;
        self.install(fitted);
        Ok(())
    }

    /// Same result as [`ClassifierBank::fit`], with each member fitted on its
    /// own blocking task.
    pub async fn fit_concurrent(&mut self, train: &Dataset) -> Result<()> {
        self.ensure_members()?;
        let train = Arc::new(train.clone());
        let mut tasks = JoinSet::new();

        for (index, member) in self.members.iter().enumerate() {
            let spec = member.spec.clone();
            let train = Arc::clone(&train);
            tasks.spawn_blocking(move || (index, fit_member(&spec, &train)));
        }

        let mut slots: Vec<Option<FittedMember>> = self.members.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined?;
            slots[index] = Some(result?);
        }

        let fitted = slots
            .into_iter()
            .zip(&self.members)
            .map(|(slot, member)| {
                slot.ok_or_else(|| PipelineError::UnfitModel(member.spec.name().to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        self.install(fitted);
        Ok(())
    }

    /// Accuracy of every member on the held-out partition, in member order.
    pub fn evaluate(&self, test: &Dataset) -> Result<Vec<ModelAccuracy>> {
        let labels = test.labels();
        self.members
            .iter()
            .map(|member| {
                let fitted = member.fitted()?;
                let x = fitted.prepare(&test.matrix(&member.spec.schema)?)?;
                let accuracy = fitted.model.accuracy(&x, &labels)?;
                tracing::info!(model = member.spec.name(), accuracy, "model evaluated");
                Ok(ModelAccuracy {
                    model: member.spec.name().to_string(),
                    preprocessing: member.spec.preprocessing,
                    accuracy,
                })
            })
            .collect()
    }

    /// One vote per member for a single row. Fails on the first unfit member.
    pub fn votes(&self, row: &FeatureRow) -> Result<Vec<Vote>> {
        self.ensure_members()?;
        self.members
            .iter()
            .map(|member| {
                let fitted = member.fitted()?;
                let x = fitted.prepare(&FeatureMatrix::from_rows(&member.spec.schema, [row]))?;
                let prediction = fitted.model.predict(&x)?;
                let high_risk = prediction.first().copied().ok_or_else(|| {
                    PipelineError::EmptyDataset(format!(
                        "{} returned no prediction",
                        member.spec.name()
                    ))
                })?;
                Ok(Vote {
                    model: member.spec.name().to_string(),
                    high_risk,
                })
            })
            .collect()
    }

    fn ensure_members(&self) -> Result<()> {
        if self.members.is_empty() {
            return Err(PipelineError::Configuration(
                "classifier bank has no members".into(),
            ));
        }
        Ok(())
    }

    fn install(&mut self, fitted: Vec<FittedMember>) {
        for (member, fitted) in self.members.iter_mut().zip(fitted) {
            member.fitted = Some(fitted);
        }
    }
}

fn fit_member(spec: &MemberSpec, train: &Dataset) -> Result<FittedMember> {
    let raw = train.matrix(&spec.schema)?;
    let labels = train.labels();
    let (scaler, x) = match spec.preprocessing {
        Preprocessing::Raw => (None, raw),
        Preprocessing::Standardize => {
            let scaler = Standardizer::fit(&raw)?;
            let x = scaler.transform(&raw)?;
            (Some(scaler), x)
        }
    };
    let model = spec.estimator.fit(&x, &labels)?;
    tracing::debug!(
        model = spec.name(),
        rows = x.len(),
        signature = %model.signature(),
        "member fitted"
    );
    Ok(FittedMember { scaler, model })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoostingConfig, ForestConfig};
    use crate::dataset::DatasetBuilder;
    use crate::source::{BaselineSource, DataSource, SyntheticSource};

    fn quick_config() -> PipelineConfig {
        PipelineConfig {
            forest: ForestConfig {
                n_estimators: 20,
                max_depth: 6,
            },
            boosting: BoostingConfig {
                n_estimators: 20,
                learning_rate: 0.1,
                max_depth: 3,
            },
            ..PipelineConfig::default()
        }
    }

    fn population() -> Dataset {
        let records = SyntheticSource::new(100, 42).load().unwrap();
        DatasetBuilder::new("current", Schema::current()).build(records)
    }

    #[test]
    fn standard_bank_has_three_members() {
        let bank = ClassifierBank::standard(&quick_config());
        assert_eq!(
            bank.names(),
            vec!["Logistic Regression", "Random Forest", "Gradient Boosting"]
        );
        assert!(!bank.is_fitted());
    }

    #[test]
    fn unfit_bank_fails_fast() {
        let bank = ClassifierBank::standard(&quick_config());
        let row = FeatureRow::new(8, 3, 6, 42, 4).unwrap();
        assert!(matches!(bank.votes(&row), Err(PipelineError::UnfitModel(_))));
        assert!(matches!(
            bank.evaluate(&population()),
            Err(PipelineError::UnfitModel(_))
        ));
    }

    #[test]
    fn empty_bank_is_a_configuration_error() {
        let mut bank = ClassifierBank::new();
        assert!(matches!(
            bank.fit(&population()),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn evaluation_is_bounded_and_repeatable() {
        let split = population().split(0.8, 42).unwrap();
        let mut bank = ClassifierBank::standard(&quick_config());
        bank.fit(&split.train).unwrap();
        assert!(bank.is_fitted());

        let first = bank.evaluate(&split.test).unwrap();
        let second = bank.evaluate(&split.test).unwrap();
        assert_eq!(first.len(), 3);
        for (a, b) in first.iter().zip(&second) {
            assert!((0.0..=1.0).contains(&a.accuracy));
            assert_eq!(a.accuracy, b.accuracy);
        }
    }

    #[test]
    fn baseline_schema_cannot_train_current_members() {
        let baseline = DatasetBuilder::new("baseline", Schema::baseline())
            .build(BaselineSource.load().unwrap());
        let mut bank = ClassifierBank::standard(&quick_config());
        assert!(matches!(
            bank.fit(&baseline),
            Err(PipelineError::SchemaMismatch { .. })
        ));
        assert!(!bank.is_fitted());
    }

    #[tokio::test]
    async fn concurrent_fit_matches_sequential_fit() {
        let split = population().split(0.8, 42).unwrap();
        let mut sequential = ClassifierBank::standard(&quick_config());
        sequential.fit(&split.train).unwrap();
        let mut concurrent = ClassifierBank::standard(&quick_config());
        concurrent.fit_concurrent(&split.train).await.unwrap();

        let a = sequential.evaluate(&split.test).unwrap();
        let b = concurrent.evaluate(&split.test).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.model, y.model);
            assert_eq!(x.accuracy, y.accuracy);
        }

        let row = FeatureRow::new(8, 3, 6, 42, 4).unwrap();
        let high = |bank: &ClassifierBank| -> Vec<bool> {
            bank.votes(&row).unwrap().iter().map(|v| v.high_risk).collect()
        };
        assert_eq!(high(&sequential), high(&concurrent));
    }
}
