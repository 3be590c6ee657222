//! Practice settings store: explicit load/save of `PracticeSettings` as JSON.

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PracticeError, PracticeResult};
use crate::types::{validate_churn_window, PracticeSettings};

/// Owns the practice settings and the file they persist to.
/// Passed by reference to whatever needs the settings; nothing global.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    settings: PracticeSettings,
}

impl SettingsStore {
    /// Load settings from `path`. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> PracticeResult<Self> {
        let path = path.as_ref().to_path_buf();
        let settings = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let settings: PracticeSettings = serde_json::from_str(&contents)?;
            settings.validate()?;
            debug!(path = %path.display(), "Loaded practice settings");
            settings
        } else {
            debug!(path = %path.display(), "No settings file, using defaults");
            PracticeSettings::default()
        };
        Ok(Self { path, settings })
    }

    /// Write the current settings, creating parent directories as needed.
    pub fn save(&self) -> PracticeResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        std::fs::write(&self.path, json)?;
        info!(path = %self.path.display(), "Saved practice settings");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &PracticeSettings {
        &self.settings
    }

    pub fn into_settings(self) -> PracticeSettings {
        self.settings
    }

    /// Set one field by its camelCase name.
    pub fn set(&mut self, key: &str, value: &str) -> PracticeResult<()> {
        let bad = |e: String| PracticeError::Config(format!("invalid value `{value}` for `{key}`: {e}"));
        let s = &mut self.settings;
        match key {
            "practiceName" => s.practice_name = value.to_string(),
            "weeklyCapacity" => {
                s.weekly_capacity = value.parse::<u32>().map_err(|e| bad(e.to_string()))?
            }
            "attendanceRate" => s.attendance_rate = parse_rate(value).map_err(bad)?,
            "notesComplianceRate" => s.notes_compliance_rate = parse_rate(value).map_err(bad)?,
            "churnWindowDays" => {
                let days = value.parse::<i64>().map_err(|e| bad(e.to_string()))?;
                s.churn_window_days = validate_churn_window(days).map_err(|e| bad(e.to_string()))?
            }
            "targetMonthlyRevenue" => {
                s.target_monthly_revenue = value.parse::<f64>().map_err(|e| bad(e.to_string()))?
            }
            other => return Err(PracticeError::Config(format!("unknown setting `{other}`"))),
        }
        Ok(())
    }
}

fn parse_rate(value: &str) -> Result<f64, String> {
    let rate: f64 = value.parse().map_err(|e: std::num::ParseFloatError| e.to_string())?;
    if (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err("rate must be between 0 and 1".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::load(dir.path().join("settings.json")).unwrap();
        assert_eq!(store.settings(), &PracticeSettings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let mut store = SettingsStore::load(&path).unwrap();
        store.set("weeklyCapacity", "96").unwrap();
        store.set("practiceName", "Harbor Counseling").unwrap();
        store.save().unwrap();

        let reloaded = SettingsStore::load(&path).unwrap();
        assert_eq!(reloaded.settings().weekly_capacity, 96);
        assert_eq!(reloaded.settings().practice_name, "Harbor Counseling");
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SettingsStore::load(dir.path().join("s.json")).unwrap();
        assert!(store.set("attendanceRate", "1.5").is_err());
        assert!(store.set("weeklyCapacity", "many").is_err());
        assert!(store.set("favoriteColor", "blue").is_err());
    }

    #[test]
    fn test_churn_window_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        let mut store = SettingsStore::load(&path).unwrap();
        assert!(store.set("churnWindowDays", "1000000000000").is_err());
        assert!(store.set("churnWindowDays", "-5").is_err());
        assert_eq!(store.settings().churn_window_days, 60);
        store.set("churnWindowDays", "90").unwrap();
        assert_eq!(store.settings().churn_window_days, 90);

        std::fs::write(&path, r#"{"churnWindowDays": 99999999}"#).unwrap();
        assert!(matches!(SettingsStore::load(&path), Err(PracticeError::Config(_))));
    }
}
