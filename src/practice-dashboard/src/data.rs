//! Startup data: payment records and practice settings.

use anyhow::Context;
use practice_analytics::RecordStore;
use practice_core::config::DataConfig;
use practice_core::{PracticeSettings, SettingsStore};
use practice_generator::{DemoGenerator, PracticeConfig};
use std::path::Path;
use tracing::info;

/// Load records from `records_path` (JSON, or CSV by extension), or
/// generate a synthetic practice when no path is configured.
pub fn load_records(data: &DataConfig) -> anyhow::Result<(RecordStore, Option<String>)> {
    if let Some(path) = data.records_path.as_deref() {
        let store = if is_csv(path) {
            let contents =
                std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            RecordStore::from_csv_str(&contents)?
        } else {
            RecordStore::load_json(path)?
        };
        info!(path, records = store.len(), "Loaded payment records");
        return Ok((store, None));
    }

    let mut practice = match data.generator_config_path.as_deref() {
        Some(path) => PracticeConfig::load_json(path)
            .with_context(|| format!("loading generator config {path}"))?,
        None => PracticeConfig::default(),
    };
    if data.generator_config_path.is_none() {
        practice.seed = data.seed;
    }
    let demo = DemoGenerator::new(practice)?.generate();
    info!(
        seed = data.seed,
        records = demo.payments.len(),
        "No records file configured, serving generated data"
    );
    Ok((RecordStore::new(demo.payments)?, Some(demo.practice_name)))
}

/// Settings from `settings_path` when set; defaults otherwise. A generated
/// practice lends its name to default settings.
pub fn load_settings(data: &DataConfig, generated_name: Option<String>) -> anyhow::Result<PracticeSettings> {
    if let Some(path) = data.settings_path.as_deref() {
        return Ok(SettingsStore::load(path)?.into_settings());
    }
    let mut settings = PracticeSettings::default();
    if let Some(name) = generated_name {
        settings.practice_name = name;
    }
    Ok(settings)
}

fn is_csv(path: &str) -> bool {
    Path::new(path)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}
