use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("schema mismatch for {model}: expected {expected}, found {found}")]
    SchemaMismatch {
        model: String,
        expected: String,
        found: String,
    },

    #[error("model {0} has not been fitted")]
    UnfitModel(String),

    #[error("invalid value {value} for {field}: {reason}")]
    InvalidFeature {
        field: &'static str,
        value: i64,
        reason: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("empty dataset: {0}")]
    EmptyDataset(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("model fitting task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PipelineError {
    pub fn schema_mismatch(
        model: impl Into<String>,
        expected: impl std::fmt::Display,
        found: impl std::fmt::Display,
    ) -> Self {
        PipelineError::SchemaMismatch {
            model: model.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}
