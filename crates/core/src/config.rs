use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `PRACTICE_DASHBOARD__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub data: DataConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for bearer tokens. Requests fail with 500 when unset.
    #[serde(default)]
    pub token_secret: Option<String>,
    #[serde(default = "default_max_token_age_hours")]
    pub max_token_age_hours: i64,
    /// Include the diagnostic `debug` string in error bodies.
    #[serde(default = "default_include_debug")]
    pub include_debug: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_primary_origin")]
    pub primary_origin: String,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Answer unknown origins with the primary origin instead of omitting
    /// the allow-origin header.
    #[serde(default)]
    pub fallback_to_primary: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// JSON array of payment records. Synthetic data is generated when unset.
    #[serde(default)]
    pub records_path: Option<String>,
    #[serde(default)]
    pub settings_path: Option<String>,
    /// Generator configuration used when no records file is given.
    #[serde(default)]
    pub generator_config_path: Option<String>,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

// Default functions
fn default_node_id() -> String {
    "dashboard-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_max_token_age_hours() -> i64 {
    24
}
fn default_include_debug() -> bool {
    true
}
fn default_primary_origin() -> String {
    "https://dashboard.practice.example".to_string()
}
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}
fn default_seed() -> u64 {
    42
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            max_token_age_hours: default_max_token_age_hours(),
            include_debug: default_include_debug(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            primary_origin: default_primary_origin(),
            allowed_origins: default_allowed_origins(),
            fallback_to_primary: false,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            records_path: None,
            settings_path: None,
            generator_config_path: None,
            seed: default_seed(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
            data: DataConfig::default(),
        }
    }
}

impl CorsConfig {
    /// Whether `origin` is on the allow-list.
    pub fn is_allowed(&self, origin: &str) -> bool {
        origin == self.primary_origin || self.allowed_origins.iter().any(|o| o == origin)
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("PRACTICE_DASHBOARD")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("cors.allowed_origins"),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.http_port, 8080);
        assert_eq!(config.auth.max_token_age_hours, 24);
        assert!(config.auth.token_secret.is_none());
        assert!(!config.cors.fallback_to_primary);
    }

    #[test]
    fn test_cors_allow_list() {
        let cors = CorsConfig {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "https://staging.practice.example".to_string(),
            ],
            ..Default::default()
        };
        assert!(cors.is_allowed("https://dashboard.practice.example"));
        assert!(cors.is_allowed("https://staging.practice.example"));
        assert!(!cors.is_allowed("https://evil.example"));
    }
}
