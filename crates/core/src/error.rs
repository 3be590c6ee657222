use thiserror::Error;

pub type PracticeResult<T> = Result<T, PracticeError>;

#[derive(Error, Debug)]
pub enum PracticeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid record at index {index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    #[error("Invalid date `{0}`: expected M/D/YY, M/D/YYYY or YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid month key `{0}`: expected YYYY-MM")]
    InvalidMonthKey(String),

    #[error("Unknown period `{0}`")]
    UnknownPeriod(String),

    #[error("Computation error: {0}")]
    Computation(String),

    #[error("Remote metrics error: {0}")]
    Remote(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
