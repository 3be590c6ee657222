//! Per-month metrics snapshots as served by the metrics endpoint.

use practice_core::period::DateInterval;
use practice_core::types::{MonthKey, PaymentRecord, PracticeSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::engine::{self, MetricsEngine};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClinicianMetrics {
    pub id: String,
    pub name: String,
    pub revenue: f64,
    pub sessions: usize,
    pub active_clients: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthMetrics {
    /// `YYYY-MM`
    pub month: String,
    pub label: String,
    pub revenue: f64,
    pub sessions: usize,
    pub active_clients: usize,
    pub new_clients: usize,
    pub churned_clients: usize,
    pub retention_rate: Option<f64>,
    pub capacity_utilization: f64,
    /// One entry per clinician id. Clinicians sharing a display name stay
    /// separate.
    pub clinicians: Vec<ClinicianMetrics>,
}

/// Compute the metrics for one month.
pub fn month_metrics(records: &[PaymentRecord], settings: &PracticeSettings, key: MonthKey) -> MonthMetrics {
    let engine = MetricsEngine::new(records);
    let interval = DateInterval::spanning(key, key);
    let in_month = engine.records_in(&interval);
    let sessions = engine::session_count(&in_month);

    MonthMetrics {
        month: key.to_string(),
        label: key.label(),
        revenue: round_cents(engine::revenue(&in_month)),
        sessions,
        active_clients: engine::active_clients(&in_month),
        new_clients: engine.new_clients_in(&interval).len(),
        churned_clients: engine
            .churned_clients_for_month(key.month0 as i32, key.year, settings.churn_window_days)
            .len(),
        retention_rate: engine.retention_rate(key).map(round_rate),
        capacity_utilization: round_rate(engine::capacity_utilization(sessions, settings, &interval)),
        clinicians: clinician_breakdown(&in_month),
    }
}

/// Metrics for every month present in the records, keyed by `YYYY-MM`.
pub fn all_month_metrics(records: &[PaymentRecord], settings: &PracticeSettings) -> BTreeMap<String, MonthMetrics> {
    MetricsEngine::new(records)
        .available_months()
        .into_iter()
        .map(|key| (key.to_string(), month_metrics(records, settings, key)))
        .collect()
}

/// Per-clinician totals, highest revenue first.
pub fn clinician_breakdown(records: &[&PaymentRecord]) -> Vec<ClinicianMetrics> {
    let revenue = engine::revenue_by_clinician(records);
    let sessions = engine::sessions_by_clinician(records);

    let mut names: BTreeMap<&str, &str> = BTreeMap::new();
    let mut clients: BTreeMap<&str, Vec<&PaymentRecord>> = BTreeMap::new();
    for record in records {
        names
            .entry(record.clinician_id.as_str())
            .or_insert(record.clinician.as_str());
        clients
            .entry(record.clinician_id.as_str())
            .or_default()
            .push(record);
    }

    let mut out: Vec<ClinicianMetrics> = names
        .into_iter()
        .map(|(id, name)| ClinicianMetrics {
            id: id.to_string(),
            name: name.to_string(),
            revenue: round_cents(revenue.get(id).copied().unwrap_or(0.0)),
            sessions: sessions.get(id).copied().unwrap_or(0),
            active_clients: clients.get(id).map(|r| engine::active_clients(r)).unwrap_or(0),
        })
        .collect();
    out.sort_by(|a, b| {
        b.revenue
            .total_cmp(&a.revenue)
            .then_with(|| a.id.cmp(&b.id))
    });
    out
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round_rate(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::record;

    #[test]
    fn test_month_metrics() {
        let mut records = vec![
            record("a", "c1", "1/5/24", 100.0),
            record("b", "c2", "1/9/24", 80.125),
            record("a", "c1", "2/10/24", 150.0),
        ];
        // Same display name, different clinician id.
        records[1].clinician = records[0].clinician.clone();

        let settings = PracticeSettings::default();
        let january = month_metrics(&records, &settings, MonthKey::new(0, 2024));
        assert_eq!(january.month, "2024-01");
        assert_eq!(january.label, "Jan 2024");
        assert_eq!(january.revenue, 180.13);
        assert_eq!(january.sessions, 2);
        assert_eq!(january.new_clients, 2);
        assert_eq!(january.clinicians.len(), 2);
        assert_eq!(january.clinicians[0].id, "c1");
        assert_eq!(january.clinicians[0].name, january.clinicians[1].name);
        assert!(january.retention_rate.is_none());

        let february = month_metrics(&records, &settings, MonthKey::new(1, 2024));
        assert_eq!(february.retention_rate, Some(0.5));
    }

    #[test]
    fn test_all_month_metrics_keys() {
        let records = vec![
            record("a", "c1", "11/5/23", 100.0),
            record("a", "c1", "1/5/24", 100.0),
        ];
        let all = all_month_metrics(&records, &PracticeSettings::default());
        let keys: Vec<&str> = all.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["2023-11", "2024-01"]);
    }

    #[test]
    fn test_month_without_records_is_zeroed() {
        let records = vec![record("a", "c1", "1/5/24", 100.0)];
        let metrics = month_metrics(&records, &PracticeSettings::default(), MonthKey::new(5, 2030));
        assert_eq!(metrics.revenue, 0.0);
        assert_eq!(metrics.sessions, 0);
        assert!(metrics.clinicians.is_empty());
    }

    #[test]
    fn test_oversized_churn_window_does_not_panic() {
        let records = vec![record("a", "c1", "1/5/24", 100.0)];
        let settings = PracticeSettings {
            churn_window_days: 1_000_000_000_000,
            ..PracticeSettings::default()
        };
        let metrics = month_metrics(&records, &settings, MonthKey::new(0, 2024));
        assert_eq!(metrics.churned_clients, 0);
        assert_eq!(metrics.sessions, 1);
    }
}
