//! Aggregation engine: revenue, sessions, client sets and per-clinician
//! breakdowns over payment records.
//!
//! Every function is pure: results depend only on the records passed in and
//! the query. Nothing is cached between calls.

use chrono::NaiveDate;
use practice_core::period::{month_interval, DateInterval};
use practice_core::types::{
    Consultation, ConsultationStage, MonthKey, MonthlyDataPoint, PaymentRecord, PracticeSettings,
};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use utoipa::ToSchema;

use crate::churn::ChurnClassifier;

/// Sum of `amount`.
pub fn revenue<R: Borrow<PaymentRecord>>(records: &[R]) -> f64 {
    records.iter().map(|r| r.borrow().amount).sum()
}

/// One record is one billable session.
pub fn session_count<R: Borrow<PaymentRecord>>(records: &[R]) -> usize {
    records.len()
}

/// Distinct client ids, sorted.
pub fn active_client_ids<R: Borrow<PaymentRecord>>(records: &[R]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.borrow().client_id.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

pub fn active_clients<R: Borrow<PaymentRecord>>(records: &[R]) -> usize {
    active_client_ids(records).len()
}

/// Revenue keyed by clinician id.
pub fn revenue_by_clinician<R: Borrow<PaymentRecord>>(records: &[R]) -> BTreeMap<String, f64> {
    let mut out: BTreeMap<String, f64> = BTreeMap::new();
    for record in records {
        let record = record.borrow();
        *out.entry(record.clinician_id.clone()).or_default() += record.amount;
    }
    out
}

/// Session count keyed by clinician id.
pub fn sessions_by_clinician<R: Borrow<PaymentRecord>>(records: &[R]) -> BTreeMap<String, usize> {
    let mut out: BTreeMap<String, usize> = BTreeMap::new();
    for record in records {
        *out.entry(record.borrow().clinician_id.clone()).or_default() += 1;
    }
    out
}

/// Sessions delivered as a share of bookable capacity over the interval.
pub fn capacity_utilization(sessions: usize, settings: &PracticeSettings, interval: &DateInterval) -> f64 {
    let capacity = f64::from(settings.weekly_capacity) * interval.days() as f64 / 7.0;
    if capacity > 0.0 {
        sessions as f64 / capacity
    } else {
        0.0
    }
}

/// Consultation counts per stage for consultations requested in the interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    pub total: usize,
    pub inquiry: usize,
    pub scheduled: usize,
    pub completed: usize,
    pub converted: usize,
    pub lost: usize,
    /// Converted over decided (converted + lost); zero when nothing is decided.
    pub conversion_rate: f64,
}

pub fn consultation_pipeline(consultations: &[Consultation], interval: &DateInterval) -> PipelineSummary {
    let mut counts: HashMap<ConsultationStage, usize> = HashMap::new();
    let mut total = 0;
    for consultation in consultations.iter().filter(|c| interval.contains(c.requested_on)) {
        *counts.entry(consultation.stage).or_default() += 1;
        total += 1;
    }
    let count = |stage| counts.get(&stage).copied().unwrap_or(0);
    let converted = count(ConsultationStage::Converted);
    let lost = count(ConsultationStage::Lost);
    let decided = converted + lost;

    PipelineSummary {
        total,
        inquiry: count(ConsultationStage::Inquiry),
        scheduled: count(ConsultationStage::Scheduled),
        completed: count(ConsultationStage::Completed),
        converted,
        lost,
        conversion_rate: if decided > 0 {
            converted as f64 / decided as f64
        } else {
            0.0
        },
    }
}

/// Dataset-level queries. Borrows the full record set because "new" and
/// "churned" depend on each client's global first and last appearance, not
/// just the queried window.
#[derive(Debug, Clone, Copy)]
pub struct MetricsEngine<'a> {
    records: &'a [PaymentRecord],
}

impl<'a> MetricsEngine<'a> {
    pub fn new(records: &'a [PaymentRecord]) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &'a [PaymentRecord] {
        self.records
    }

    /// Records paid inside the interval.
    pub fn records_in(&self, interval: &DateInterval) -> Vec<&'a PaymentRecord> {
        self.records
            .iter()
            .filter(|r| interval.contains(r.date_paid))
            .collect()
    }

    pub fn records_for_month(&self, month0: i32, year: i32) -> Vec<&'a PaymentRecord> {
        self.records_in(&month_interval(month0, year))
    }

    /// Each client's earliest payment date across the whole dataset.
    pub fn first_appearances(&self) -> HashMap<&'a str, NaiveDate> {
        let mut first: HashMap<&'a str, NaiveDate> = HashMap::new();
        for record in self.records {
            first
                .entry(record.client_id.as_str())
                .and_modify(|d| *d = (*d).min(record.date_paid))
                .or_insert(record.date_paid);
        }
        first
    }

    /// Clients whose first-ever payment falls in the interval, sorted.
    pub fn new_clients_in(&self, interval: &DateInterval) -> Vec<String> {
        let mut ids: Vec<String> = self
            .first_appearances()
            .into_iter()
            .filter(|(_, first)| interval.contains(*first))
            .map(|(id, _)| id.to_string())
            .collect();
        ids.sort();
        ids
    }

    pub fn new_clients(&self, month0: i32, year: i32) -> Vec<String> {
        self.new_clients_in(&month_interval(month0, year))
    }

    /// Clients whose projected churn date (last session + window) falls in
    /// the month.
    pub fn churned_clients_for_month(&self, month0: i32, year: i32, window_days: i64) -> Vec<String> {
        ChurnClassifier::new(window_days).churned_in(self.records, &month_interval(month0, year))
    }

    /// Distinct months with at least one payment, ascending.
    pub fn available_months(&self) -> Vec<MonthKey> {
        self.records
            .iter()
            .map(|r| MonthKey::from_date(r.date_paid))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Share of the previous month's active clients who are active again in
    /// this month. `None` when the previous month had no clients.
    pub fn retention_rate(&self, key: MonthKey) -> Option<f64> {
        let prev = key.prev();
        let before: BTreeSet<&str> = self
            .records_for_month(prev.month0 as i32, prev.year)
            .into_iter()
            .map(|r| r.client_id.as_str())
            .collect();
        if before.is_empty() {
            return None;
        }
        let now: BTreeSet<&str> = self
            .records_for_month(key.month0 as i32, key.year)
            .into_iter()
            .map(|r| r.client_id.as_str())
            .collect();
        let retained = before.intersection(&now).count();
        Some(retained as f64 / before.len() as f64)
    }

    pub fn monthly_data_point(&self, month0: i32, year: i32, window_days: i64) -> MonthlyDataPoint {
        let key = MonthKey::new(month0, year);
        let in_month = self.records_for_month(month0, year);
        MonthlyDataPoint {
            month: key.month0,
            year: key.year,
            revenue: revenue(&in_month),
            sessions: session_count(&in_month),
            active_clients: active_clients(&in_month),
            new_clients: self.new_clients(month0, year).len(),
            churned_clients: self.churned_clients_for_month(month0, year, window_days).len(),
        }
    }

    /// One data point per available month, ascending.
    pub fn monthly_series(&self, window_days: i64) -> Vec<MonthlyDataPoint> {
        self.available_months()
            .into_iter()
            .map(|key| self.monthly_data_point(key.month0 as i32, key.year, window_days))
            .collect()
    }
}
