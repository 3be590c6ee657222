//! Practice analytics: record store, aggregation engine, churn
//! classification, monthly snapshots and report decks.

pub mod churn;
pub mod engine;
pub mod slides;
pub mod snapshot;
pub mod source;
pub mod store;

pub use churn::ChurnClassifier;
pub use engine::MetricsEngine;
pub use slides::Slide;
pub use snapshot::{ClinicianMetrics, MonthMetrics};
pub use source::{MetricsSource, MetricsState, RemoteMetricsClient};
pub use store::RecordStore;
