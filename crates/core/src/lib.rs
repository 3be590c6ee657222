pub mod config;
pub mod error;
pub mod period;
pub mod settings;
pub mod types;

pub use config::AppConfig;
pub use error::{PracticeError, PracticeResult};
pub use period::{month_interval, DateInterval, NamedPeriod};
pub use settings::SettingsStore;
pub use types::{MonthKey, PaymentRecord, PracticeSettings};
