//! Immutable in-memory store of payment records, loaded once at startup.

use chrono::NaiveDate;
use practice_core::types::{parse_record_date, Clinician, PaymentRecord};
use practice_core::{PracticeError, PracticeResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::engine::MetricsEngine;

/// Read-only record set. There are no mutation methods; build a new store
/// to change the data.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<PaymentRecord>,
}

impl RecordStore {
    /// Validate and wrap a record set.
    pub fn new(records: Vec<PaymentRecord>) -> PracticeResult<Self> {
        for (index, record) in records.iter().enumerate() {
            validate(index, record)?;
        }
        Ok(Self { records })
    }

    /// Load a JSON array of payment records.
    pub fn load_json(path: impl AsRef<Path>) -> PracticeResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(json: &str) -> PracticeResult<Self> {
        let raw: Vec<serde_json::Value> = serde_json::from_str(json)?;
        let records = raw
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                serde_json::from_value::<PaymentRecord>(value).map_err(|e| {
                    PracticeError::InvalidRecord {
                        index,
                        reason: e.to_string(),
                    }
                })
            })
            .collect::<PracticeResult<Vec<_>>>()?;
        Self::new(records)
    }

    /// Parse a billing-system CSV export. The header row names the columns;
    /// matching ignores case, spaces and underscores. Quoted fields may hold
    /// commas, escaped quotes and line breaks.
    pub fn from_csv_str(input: &str) -> PracticeResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(input.as_bytes());

        let header = reader
            .headers()
            .map_err(|e| PracticeError::Computation(format!("CSV header: {e}")))?;
        let normalized: csv::StringRecord = header.iter().map(normalize_column).collect();
        for column in REQUIRED_COLUMNS {
            if !normalized.iter().any(|h| h == *column) {
                return Err(PracticeError::Computation(format!(
                    "CSV export is missing column `{column}`"
                )));
            }
        }
        reader.set_headers(normalized);

        let records = reader
            .deserialize::<CsvRow>()
            .enumerate()
            .map(|(index, row)| {
                let row = row.map_err(|e| PracticeError::InvalidRecord {
                    index,
                    reason: e.to_string(),
                })?;
                row.into_record(index)
            })
            .collect::<PracticeResult<Vec<_>>>()?;
        Self::new(records)
    }

    pub fn records(&self) -> &[PaymentRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn engine(&self) -> MetricsEngine<'_> {
        MetricsEngine::new(&self.records)
    }

    /// Distinct clinicians by id, sorted by name then id.
    pub fn clinicians(&self) -> Vec<Clinician> {
        let mut by_id: BTreeMap<&str, &str> = BTreeMap::new();
        for record in &self.records {
            by_id
                .entry(record.clinician_id.as_str())
                .or_insert(record.clinician.as_str());
        }
        let mut clinicians: Vec<Clinician> = by_id
            .into_iter()
            .map(|(id, name)| Clinician {
                id: id.to_string(),
                name: name.to_string(),
            })
            .collect();
        clinicians.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        clinicians
    }

    /// Earliest and latest payment dates.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.records.iter().map(|r| r.date_paid).min()?;
        let last = self.records.iter().map(|r| r.date_paid).max()?;
        Some((first, last))
    }
}

fn validate(index: usize, record: &PaymentRecord) -> PracticeResult<()> {
    let invalid = |reason: &str| PracticeError::InvalidRecord {
        index,
        reason: reason.to_string(),
    };
    if record.client_id.trim().is_empty() {
        return Err(invalid("clientId is empty"));
    }
    if record.clinician_id.trim().is_empty() {
        return Err(invalid("clinicianId is empty"));
    }
    if !record.amount.is_finite() {
        return Err(invalid("amount is not a finite number"));
    }
    Ok(())
}

// ─── CSV export ─────────────────────────────────────────────────────────────

const REQUIRED_COLUMNS: &[&str] = &["clinicianid", "clinician", "datepaid", "clientid", "amount"];

fn normalize_column(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect::<String>()
        .to_lowercase()
}

/// One export row, keyed by normalized column names. Unknown columns are
/// ignored.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "clinicianid")]
    clinician_id: String,
    clinician: String,
    #[serde(rename = "datepaid")]
    date_paid: String,
    #[serde(rename = "appointmentdate", default)]
    appointment_date: Option<String>,
    #[serde(rename = "cptcode", default)]
    cpt_code: Option<String>,
    #[serde(rename = "clientid")]
    client_id: String,
    amount: String,
}

impl CsvRow {
    fn into_record(self, index: usize) -> PracticeResult<PaymentRecord> {
        let invalid = |reason: String| PracticeError::InvalidRecord { index, reason };

        let date_paid = parse_record_date(&self.date_paid).map_err(|e| invalid(e.to_string()))?;
        let appointment_date = self
            .appointment_date
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(parse_record_date)
            .transpose()
            .map_err(|e| invalid(e.to_string()))?;
        let amount_raw: String = self
            .amount
            .chars()
            .filter(|c| *c != '$' && *c != ',')
            .collect();
        let amount = amount_raw
            .parse::<f64>()
            .map_err(|_| invalid(format!("invalid amount `{}`", self.amount)))?;

        Ok(PaymentRecord {
            clinician_id: self.clinician_id,
            clinician: self.clinician,
            date_paid,
            appointment_date,
            cpt_code: self.cpt_code.unwrap_or_default(),
            client_id: self.client_id,
            amount,
        })
    }
}
