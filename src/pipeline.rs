use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::classifier::ClassifierBank;
use crate::cluster::RiskClusterer;
use crate::config::{stream, PipelineConfig};
use crate::dataset::{BaselineCalibration, DatasetBuilder};
use crate::ensemble;
use crate::error::{PipelineError, Result};
use crate::models::{FeatureRow, Schema};
use crate::report::{ClusterSummary, EvaluationReport, TestStudentResult, Thresholds};
use crate::risk;
use crate::sequence::{self, WindowShape, WindowedLogisticScorer};
use crate::source::{self, BaselineSource, DataSource};

/// Runs every stage once, in order. Any failure aborts the run and no report
/// is produced.
pub async fn run(
    config: &PipelineConfig,
    population: &dyn DataSource,
    test_row: FeatureRow,
) -> Result<EvaluationReport> {
    config.validate()?;

    let baseline = DatasetBuilder::new("baseline", Schema::baseline()).build(BaselineSource.load()?);
    let calibration = BaselineCalibration::from_dataset(&baseline);
    tracing::info!(
        records = calibration.records,
        agreement = ?calibration.agreement,
        "baseline scored"
    );

    let current =
        DatasetBuilder::new("current", Schema::current()).build(population.load()?);
    if current.is_empty() {
        return Err(PipelineError::EmptyDataset(format!(
            "{} source produced no rows",
            population.name()
        )));
    }
    config.validate_population(current.len())?;
    tracing::info!(source = population.name(), records = current.len(), "population scored");

    let split = current.split(config.train_ratio, config.component_seed(stream::SPLIT))?;
    tracing::info!(train = split.train.len(), test = split.test.len(), "population split");

    let mut bank = ClassifierBank::standard(config);
    if config.parallel_fit {
        bank.fit_concurrent(&split.train).await?;
    } else {
        bank.fit(&split.train)?;
    }
    let accuracies = bank.evaluate(&split.test)?;

    let clusterer = RiskClusterer::new(
        config.cluster_count,
        config.cluster_restarts,
        config.cluster_max_iter,
        config.component_seed(stream::CLUSTER),
    )?;
    let clusters = clusterer.fit_predict(&current, &Schema::current())?;
    tracing::info!(
        distinct = clusters.distinct_clusters(),
        inertia = clusters.inertia(),
        "population clustered"
    );

    let test_score = risk::burnout_score(&test_row);
    let ensemble = ensemble::decide(&bank, &test_row)?;

    let shape = WindowShape::new(config.window_periods, config.window_features)?;
    let mut rng = StdRng::seed_from_u64(config.component_seed(stream::SEQUENCE));
    let train_windows = source::synthetic_windows(shape, config.sequence_train_windows, &mut rng)?;
    let test_windows = source::synthetic_windows(shape, config.sequence_test_windows, &mut rng)?;
    let scorer = WindowedLogisticScorer::fit(shape, &train_windows, &config.logistic)?;
    let sequence = sequence::evaluate(&scorer, train_windows.len(), &test_windows)?;
    tracing::info!(
        shape = %shape,
        accuracy = sequence.accuracy,
        "sequence scorer evaluated"
    );

    Ok(EvaluationReport {
        generated_at: chrono::Utc::now(),
        seed: config.seed,
        formula: risk::FORMULA_TEXT.to_string(),
        thresholds: Thresholds::default(),
        baseline: calibration,
        current_records: current.len(),
        train_records: split.train.len(),
        test_records: split.test.len(),
        test_student: TestStudentResult {
            features: test_row,
            score: test_score,
            risk_level: risk::risk_level(test_score),
            breakdown: risk::score_breakdown(&test_row),
        },
        model_accuracy: accuracies,
        ensemble,
        clusters: ClusterSummary {
            configured: clusters.k(),
            distinct: clusters.distinct_clusters(),
            inertia: clusters.inertia(),
            profiles: clusters.profiles(&current)?,
        },
        sequence,
    })
}
