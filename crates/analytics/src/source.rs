//! Where month metrics come from: the remote metrics endpoint when one is
//! configured, otherwise local computation over the record store.

use practice_core::types::{MonthKey, PracticeSettings};
use practice_core::{PracticeError, PracticeResult};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::snapshot::{self, MonthMetrics};
use crate::store::RecordStore;

/// Client for a remote `GET /api/metrics` endpoint.
#[derive(Debug, Clone)]
pub struct RemoteMetricsClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct MonthEnvelope {
    metrics: MonthMetrics,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: String,
    #[serde(default)]
    debug: Option<String>,
}

impl RemoteMetricsClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> PracticeResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PracticeError::Remote(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub async fn fetch_month(&self, key: MonthKey) -> PracticeResult<MonthMetrics> {
        let url = format!("{}/api/metrics", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("month", key.to_string())])
            .send()
            .await
            .map_err(|e| PracticeError::Remote(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = match response.json::<ErrorEnvelope>().await {
                Ok(body) => match body.debug {
                    Some(debug) => format!("{}: {debug}", body.error),
                    None => body.error,
                },
                Err(_) => "no error body".to_string(),
            };
            return Err(PracticeError::Remote(format!("{status}: {detail}")));
        }

        let envelope: MonthEnvelope = response
            .json()
            .await
            .map_err(|e| PracticeError::Remote(e.to_string()))?;
        Ok(envelope.metrics)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsOrigin {
    Remote,
    Local,
}

/// Outcome of a metrics load, as handed to a presentation layer. Errors are
/// folded in here instead of propagating.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MetricsState {
    #[default]
    Loading,
    Ready {
        metrics: MonthMetrics,
        origin: MetricsOrigin,
    },
    Failed {
        error: String,
    },
}

impl MetricsState {
    pub fn is_loading(&self) -> bool {
        matches!(self, MetricsState::Loading)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            MetricsState::Failed { error } => Some(error),
            _ => None,
        }
    }
}

pub struct MetricsSource<'a> {
    remote: Option<RemoteMetricsClient>,
    store: &'a RecordStore,
    settings: &'a PracticeSettings,
}

impl<'a> MetricsSource<'a> {
    pub fn local(store: &'a RecordStore, settings: &'a PracticeSettings) -> Self {
        Self {
            remote: None,
            store,
            settings,
        }
    }

    pub fn with_remote(mut self, remote: RemoteMetricsClient) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Remote first, local on any remote failure. Never returns an error;
    /// failures end up in `MetricsState::Failed`.
    pub async fn load_month(&self, key: MonthKey) -> MetricsState {
        if let Some(remote) = &self.remote {
            match remote.fetch_month(key).await {
                Ok(metrics) => {
                    metrics::counter!("metrics_source.remote_hits").increment(1);
                    return MetricsState::Ready {
                        metrics,
                        origin: MetricsOrigin::Remote,
                    };
                }
                Err(e) => {
                    warn!(error = %e, month = %key, "Remote metrics unavailable, computing locally");
                    metrics::counter!("metrics_source.remote_failures").increment(1);
                }
            }
        }

        match self.compute_local(key) {
            Ok(metrics) => MetricsState::Ready {
                metrics,
                origin: MetricsOrigin::Local,
            },
            Err(e) => MetricsState::Failed {
                error: e.to_string(),
            },
        }
    }

    fn compute_local(&self, key: MonthKey) -> PracticeResult<MonthMetrics> {
        if self.store.is_empty() {
            return Err(PracticeError::Computation(
                "no payment records loaded and no remote dataset available".to_string(),
            ));
        }
        debug!(month = %key, records = self.store.len(), "Computing month metrics locally");
        Ok(snapshot::month_metrics(self.store.records(), self.settings, key))
    }
}
