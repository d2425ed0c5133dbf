//! Worker configuration (§10.4): `EngineConfig` layered with the settings
//! only the binary needs (database URL, bind info) via `figment`, the same
//! TOML-file-then-env-prefix pattern used for materialization config.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use scheduler_core::config::EngineConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WorkerConfig {
    pub database_url: String,
    #[serde(flatten)]
    pub engine: EngineConfig,
}

impl WorkerConfig {
    /// Loads `worker.toml` (if present in the working directory), then
    /// overlays `SCHEDULER_`-prefixed environment variables on top, so a
    /// deployment can override any single field without a file edit.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("worker.toml"))
            .merge(Env::prefixed("SCHEDULER_"))
            .extract()
    }
}

/// Detects the host's IANA timezone, falling back to UTC, for use as the
/// `--timezone` default when adding an owner interactively.
pub fn detect_system_timezone() -> String {
    if let Ok(tz) = std::env::var("TZ") {
        if chrono_tz::Tz::from_str_insensitive(&tz).is_ok() {
            return tz;
        }
    }

    if let Ok(tz) = iana_time_zone::get_timezone() {
        if chrono_tz::Tz::from_str_insensitive(&tz).is_ok() {
            return tz;
        }
    }

    "UTC".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_system_timezone_never_panics() {
        let _ = detect_system_timezone();
    }
}
