use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub upstream_url: Url,
    /// Comma-separated club codes sent with every upstream request.
    pub club_codes: String,
    pub reference_timezone: String,
    pub refresh_interval_secs: u64,
    pub upstream_timeout_secs: u64,
    /// SQLite file backing the catalog. The catalog lives in memory when unset.
    pub database_path: Option<PathBuf>,
    pub debug: bool,
    pub enable_swagger: bool,
    pub port: u16,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            // Load from environment variables with APP_ prefix
            .add_source(Environment::with_prefix("APP"))
            .set_default(
                "upstream_url",
                "https://www.lesmills.co.nz/api/timetable/get-timetable-epi",
            )?
            .set_default("club_codes", "01,09,13,06")?
            .set_default("reference_timezone", "Pacific/Auckland")?
            .set_default("refresh_interval_secs", 6 * 60 * 60)?
            .set_default("upstream_timeout_secs", 30)?
            .set_default("debug", false)?
            .set_default("enable_swagger", true)?
            .set_default("port", 9000)?
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.timezone()?;
        if settings.refresh_interval_secs == 0 {
            return Err(ConfigError::Message(
                "refresh_interval_secs must be greater than zero".into(),
            ));
        }
        Ok(settings)
    }

    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.reference_timezone.parse::<Tz>().map_err(|err| {
            ConfigError::Message(format!(
                "invalid reference_timezone '{}': {err}",
                self.reference_timezone
            ))
        })
    }

    pub fn club_codes(&self) -> Vec<String> {
        self.club_codes
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}
