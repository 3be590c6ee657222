use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{PracticeError, PracticeResult};

/// Days of inactivity after which a client counts as churned.
pub const DEFAULT_CHURN_WINDOW_DAYS: i64 = 60;

/// Longest accepted churn window (ten years).
pub const MAX_CHURN_WINDOW_DAYS: i64 = 3650;

/// Accept a churn window in `0..=MAX_CHURN_WINDOW_DAYS`.
pub fn validate_churn_window(days: i64) -> PracticeResult<i64> {
    if (0..=MAX_CHURN_WINDOW_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(PracticeError::Config(format!(
            "churn window must be between 0 and {MAX_CHURN_WINDOW_DAYS} days, got {days}"
        )))
    }
}

/// A single paid session. The full set of these is the only input to every
/// computed metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub clinician_id: String,
    pub clinician: String,
    #[serde(with = "record_date")]
    pub date_paid: NaiveDate,
    #[serde(default, with = "record_date::option")]
    pub appointment_date: Option<NaiveDate>,
    #[serde(default)]
    pub cpt_code: String,
    pub client_id: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Clinician {
    pub id: String,
    pub name: String,
}

/// One month of derived practice metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyDataPoint {
    /// Zero-based month (0 = January).
    pub month: u32,
    pub year: i32,
    pub revenue: f64,
    pub sessions: usize,
    pub active_clients: usize,
    pub new_clients: usize,
    pub churned_clients: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChurnedClient {
    pub client_id: String,
    pub last_session_date: NaiveDate,
    pub days_since_last_session: i64,
}

/// Manually maintained practice configuration. Not derived from records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PracticeSettings {
    #[serde(default = "default_practice_name")]
    pub practice_name: String,
    /// Bookable sessions per week across all clinicians.
    #[serde(default = "default_weekly_capacity")]
    pub weekly_capacity: u32,
    #[serde(default = "default_attendance_rate")]
    pub attendance_rate: f64,
    #[serde(default = "default_notes_compliance_rate")]
    pub notes_compliance_rate: f64,
    #[serde(default = "default_churn_window_days")]
    pub churn_window_days: i64,
    #[serde(default = "default_target_monthly_revenue")]
    pub target_monthly_revenue: f64,
}

fn default_practice_name() -> String {
    "Behavioral Health Practice".to_string()
}
fn default_weekly_capacity() -> u32 {
    120
}
fn default_attendance_rate() -> f64 {
    0.92
}
fn default_notes_compliance_rate() -> f64 {
    0.95
}
fn default_churn_window_days() -> i64 {
    DEFAULT_CHURN_WINDOW_DAYS
}
fn default_target_monthly_revenue() -> f64 {
    60_000.0
}

impl PracticeSettings {
    /// Reject values no metric can be computed from.
    pub fn validate(&self) -> PracticeResult<()> {
        validate_churn_window(self.churn_window_days)?;
        for (name, rate) in [
            ("attendanceRate", self.attendance_rate),
            ("notesComplianceRate", self.notes_compliance_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(PracticeError::Config(format!("{name} must be between 0 and 1, got {rate}")));
            }
        }
        Ok(())
    }
}

impl Default for PracticeSettings {
    fn default() -> Self {
        Self {
            practice_name: default_practice_name(),
            weekly_capacity: default_weekly_capacity(),
            attendance_rate: default_attendance_rate(),
            notes_compliance_rate: default_notes_compliance_rate(),
            churn_window_days: default_churn_window_days(),
            target_monthly_revenue: default_target_monthly_revenue(),
        }
    }
}

// ─── Consultations ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStage {
    Inquiry,
    Scheduled,
    Completed,
    Converted,
    Lost,
}

impl ConsultationStage {
    pub const ALL: &'static [ConsultationStage] = &[
        Self::Inquiry,
        Self::Scheduled,
        Self::Completed,
        Self::Converted,
        Self::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inquiry => "inquiry",
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Converted => "converted",
            Self::Lost => "lost",
        }
    }
}

impl fmt::Display for ConsultationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A prospective client moving through the intake pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consultation {
    pub id: Uuid,
    pub client_name: String,
    pub clinician_id: Option<String>,
    pub requested_on: NaiveDate,
    pub stage: ConsultationStage,
}

// ─── Generated bundle ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub clinician_id: String,
    pub first_session: NaiveDate,
    /// Set once the client has stopped attending.
    pub churned_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub client_id: String,
    pub clinician_id: String,
    pub date: NaiveDate,
    pub cpt_code: String,
    pub attended: bool,
}

/// Everything the synthetic generator produces for one practice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemoData {
    pub practice_name: String,
    pub clinicians: Vec<Clinician>,
    pub clients: Vec<Client>,
    pub sessions: Vec<Session>,
    pub payments: Vec<PaymentRecord>,
    pub consultations: Vec<Consultation>,
    pub monthly: Vec<MonthlyDataPoint>,
}

// ─── Month keys ─────────────────────────────────────────────────────────────

/// A calendar month, ordered year-major. Formats as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct MonthKey {
    pub year: i32,
    /// Zero-based month (0 = January).
    pub month0: u32,
}

impl MonthKey {
    /// Build a key, rolling out-of-range months into adjacent years.
    pub fn new(month0: i32, year: i32) -> Self {
        let total = i64::from(year) * 12 + i64::from(month0);
        let year = total.div_euclid(12).clamp(-262_000, 262_000) as i32;
        let month0 = total.rem_euclid(12) as u32;
        Self { year, month0 }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month0: date.month0(),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month0 + 1, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.next()
            .first_day()
            .pred_opt()
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn next(&self) -> Self {
        Self::new(self.month0 as i32 + 1, self.year)
    }

    pub fn prev(&self) -> Self {
        Self::new(self.month0 as i32 - 1, self.year)
    }

    pub fn offset(&self, months: i32) -> Self {
        Self::new(self.month0 as i32 + months, self.year)
    }

    /// Human label such as `Jan 2024`.
    pub fn label(&self) -> String {
        self.first_day().format("%b %Y").to_string()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month0 + 1)
    }
}

impl FromStr for MonthKey {
    type Err = PracticeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PracticeError::InvalidMonthKey(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self {
            year,
            month0: month - 1,
        })
    }
}

impl From<MonthKey> for String {
    fn from(key: MonthKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for MonthKey {
    type Error = PracticeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ─── Record dates ───────────────────────────────────────────────────────────

/// Parse a payment date as exported by the billing system (`1/5/24`,
/// `1/5/2024`) or in ISO form (`2024-01-05`).
pub fn parse_record_date(raw: &str) -> PracticeResult<NaiveDate> {
    let s = raw.trim();
    let invalid = || PracticeError::InvalidDate(raw.to_string());

    if s.contains('/') {
        let mut parts = s.split('/');
        let (Some(m), Some(d), Some(y), None) = (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let month: u32 = m.parse().map_err(|_| invalid())?;
        let day: u32 = d.parse().map_err(|_| invalid())?;
        let mut year: i32 = y.parse().map_err(|_| invalid())?;
        if y.len() <= 2 {
            year += 2000;
        }
        return NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid);
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| invalid())
}

/// Serde adapter for record dates. Writes ISO, reads any supported form.
pub mod record_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_record_date(&raw).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use chrono::NaiveDate;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
            match date {
                Some(date) => super::serialize(date, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
            match Option::<String>::deserialize(d)? {
                Some(raw) if !raw.trim().is_empty() => super::super::parse_record_date(&raw)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                _ => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_and_iso_dates() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(parse_record_date("1/5/24").unwrap(), expected);
        assert_eq!(parse_record_date("01/05/2024").unwrap(), expected);
        assert_eq!(parse_record_date("2024-01-05").unwrap(), expected);
    }

    #[test]
    fn test_parse_rejects_malformed_dates() {
        assert!(parse_record_date("13/1/24").is_err());
        assert!(parse_record_date("2/30/24").is_err());
        assert!(parse_record_date("yesterday").is_err());
        assert!(parse_record_date("1/5").is_err());
    }

    #[test]
    fn test_payment_record_from_export_json() {
        let json = r#"{
            "clinicianId": "c1",
            "clinician": "Dr. Rivera",
            "datePaid": "2/10/24",
            "appointmentDate": "",
            "cptCode": "90837",
            "clientId": "a",
            "amount": 150.0
        }"#;
        let record: PaymentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.date_paid, NaiveDate::from_ymd_opt(2024, 2, 10).unwrap());
        assert!(record.appointment_date.is_none());

        let out = serde_json::to_string(&record).unwrap();
        assert!(out.contains("\"datePaid\":\"2024-02-10\""));
    }

    #[test]
    fn test_month_key_normalizes_overflow() {
        assert_eq!(MonthKey::new(12, 2024), MonthKey { year: 2025, month0: 0 });
        assert_eq!(MonthKey::new(-1, 2024), MonthKey { year: 2023, month0: 11 });
        assert_eq!(MonthKey::new(-13, 2024), MonthKey { year: 2022, month0: 11 });
    }

    #[test]
    fn test_month_key_parse_and_display() {
        let key: MonthKey = "2024-02".parse().unwrap();
        assert_eq!(key, MonthKey { year: 2024, month0: 1 });
        assert_eq!(key.to_string(), "2024-02");
        assert_eq!(key.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(key.label(), "Feb 2024");

        assert!("2024-13".parse::<MonthKey>().is_err());
        assert!("2024-1".parse::<MonthKey>().is_err());
        assert!("24-01".parse::<MonthKey>().is_err());
    }

    #[test]
    fn test_settings_defaults_fill_missing_fields() {
        let settings: PracticeSettings =
            serde_json::from_str(r#"{"weeklyCapacity": 80}"#).unwrap();
        assert_eq!(settings.weekly_capacity, 80);
        assert_eq!(settings.churn_window_days, DEFAULT_CHURN_WINDOW_DAYS);
    }

    #[test]
    fn test_churn_window_bounds() {
        assert_eq!(validate_churn_window(0).unwrap(), 0);
        assert_eq!(validate_churn_window(MAX_CHURN_WINDOW_DAYS).unwrap(), MAX_CHURN_WINDOW_DAYS);
        assert!(validate_churn_window(-1).is_err());
        assert!(validate_churn_window(1_000_000_000_000).is_err());

        let settings = PracticeSettings {
            churn_window_days: -30,
            ..PracticeSettings::default()
        };
        assert!(settings.validate().is_err());
        assert!(PracticeSettings::default().validate().is_ok());
    }
}
