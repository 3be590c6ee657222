//! Synthetic practice data. Produces `DemoData` bundles from a declarative
//! `PracticeConfig`; payments come out as the same `PaymentRecord`s the
//! analytics engine consumes.

pub mod config;
pub mod generator;

use thiserror::Error;

pub use config::{ClinicianConfig, PracticeConfig};
pub use generator::DemoGenerator;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("invalid practice config: {0}")]
    InvalidConfig(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
