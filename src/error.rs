use thiserror::Error;

/// Everything that can stop a load or forecast run. All of these surface
/// synchronously to the UI; nothing is retried.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid input data: {0}")]
    DataValidation(String),

    #[error("no aggregatable rows in the dataset")]
    EmptyDataset,

    #[error("model fitting failed: {0}")]
    ModelFit(String),

    #[error("forecast horizon must be at least 1, got {0}")]
    InvalidHorizon(usize),
}

pub type Result<T> = std::result::Result<T, AppError>;
