//! Declarative practice configuration driving the generator.

use practice_core::types::MonthKey;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::GeneratorError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicianConfig {
    pub name: String,
    /// Active clients the clinician aims to carry.
    pub target_caseload: u32,
    pub session_fee: f64,
    /// Average sessions per active client per month.
    #[serde(default = "default_sessions_per_client")]
    pub sessions_per_client: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeConfig {
    #[serde(default = "default_practice_name")]
    pub practice_name: String,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_start_month")]
    pub start_month: MonthKey,
    #[serde(default = "default_months")]
    pub months: u32,
    #[serde(default = "default_clinicians")]
    pub clinicians: Vec<ClinicianConfig>,
    /// Upper bound on intakes per clinician per month.
    #[serde(default = "default_max_new_clients")]
    pub max_new_clients_per_clinician: u32,
    #[serde(default = "default_churn_probability")]
    pub monthly_churn_probability: f64,
    #[serde(default = "default_attendance_rate")]
    pub attendance_rate: f64,
    #[serde(default = "default_consultations_per_month")]
    pub consultations_per_month: u32,
    #[serde(default = "default_conversion_rate")]
    pub consultation_conversion_rate: f64,
}

fn default_practice_name() -> String {
    "Behavioral Health Practice".to_string()
}
fn default_seed() -> u64 {
    42
}
fn default_start_month() -> MonthKey {
    MonthKey::new(1, 2023)
}
fn default_months() -> u32 {
    35
}
fn default_sessions_per_client() -> f64 {
    3.2
}
fn default_max_new_clients() -> u32 {
    4
}
fn default_churn_probability() -> f64 {
    0.08
}
fn default_attendance_rate() -> f64 {
    0.92
}
fn default_consultations_per_month() -> u32 {
    14
}
fn default_conversion_rate() -> f64 {
    0.55
}
fn default_clinicians() -> Vec<ClinicianConfig> {
    let clinician = |name: &str, target_caseload, session_fee| ClinicianConfig {
        name: name.to_string(),
        target_caseload,
        session_fee,
        sessions_per_client: default_sessions_per_client(),
    };
    vec![
        clinician("Dr. Maya Chen", 28, 185.0),
        clinician("Jordan Alvarez, LCSW", 32, 150.0),
        clinician("Priya Natarajan, LMFT", 26, 160.0),
        clinician("Sam Okafor, LPC", 22, 140.0),
    ]
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            practice_name: default_practice_name(),
            seed: default_seed(),
            start_month: default_start_month(),
            months: default_months(),
            clinicians: default_clinicians(),
            max_new_clients_per_clinician: default_max_new_clients(),
            monthly_churn_probability: default_churn_probability(),
            attendance_rate: default_attendance_rate(),
            consultations_per_month: default_consultations_per_month(),
            consultation_conversion_rate: default_conversion_rate(),
        }
    }
}

impl PracticeConfig {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, GeneratorError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GeneratorError> {
        let invalid = |msg: String| Err(GeneratorError::InvalidConfig(msg));
        if self.months == 0 {
            return invalid("months must be at least 1".to_string());
        }
        if self.clinicians.is_empty() {
            return invalid("at least one clinician is required".to_string());
        }
        for (name, rate) in [
            ("monthlyChurnProbability", self.monthly_churn_probability),
            ("attendanceRate", self.attendance_rate),
            ("consultationConversionRate", self.consultation_conversion_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return invalid(format!("{name} must be between 0 and 1, got {rate}"));
            }
        }
        for clinician in &self.clinicians {
            if clinician.session_fee < 0.0 || !clinician.session_fee.is_finite() {
                return invalid(format!("{} has an invalid session fee", clinician.name));
            }
            if clinician.sessions_per_client < 0.0 || !clinician.sessions_per_client.is_finite() {
                return invalid(format!("{} has an invalid session rate", clinician.name));
            }
        }
        Ok(())
    }

    pub fn last_month(&self) -> MonthKey {
        self.start_month.offset(self.months as i32 - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PracticeConfig::default();
        config.validate().unwrap();
        assert_eq!(config.last_month(), MonthKey::new(11, 2025));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PracticeConfig =
            serde_json::from_str(r#"{"seed": 7, "startMonth": "2024-01", "months": 6}"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.start_month, MonthKey::new(0, 2024));
        assert_eq!(config.clinicians.len(), 4);
    }

    #[test]
    fn test_rejects_bad_rates() {
        let config = PracticeConfig {
            attendance_rate: 1.2,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(GeneratorError::InvalidConfig(_))));

        let config = PracticeConfig {
            clinicians: Vec::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("practice.json");
        std::fs::write(&path, r#"{"practiceName": "Harbor Counseling", "months": 12}"#).unwrap();
        let config = PracticeConfig::load_json(&path).unwrap();
        assert_eq!(config.practice_name, "Harbor Counseling");
        assert_eq!(config.months, 12);
    }
}
