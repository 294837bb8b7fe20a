//! Environment-driven configuration (spec §6: "Configuration").

use std::path::PathBuf;

/// Runtime configuration read once at startup. Every field has a documented
/// default so a bare environment still produces a working configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `ALEXANDRIA_DB_PATH` — explicit database file path, bypassing
    /// project discovery.
    pub db_path: Option<PathBuf>,
    /// `ALEXANDRIA_AUTO_CHECKPOINT_THRESHOLD` — events between checkpoints.
    pub auto_checkpoint_threshold: u32,
    /// `ALEXANDRIA_DISCLOSURE_THRESHOLD` — events before progressive
    /// disclosure fires.
    pub disclosure_threshold: u32,
    /// `ALEXANDRIA_ERROR_BURST_THRESHOLD` — consecutive errors that
    /// escalate the disclosure level.
    pub error_burst_threshold: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            auto_checkpoint_threshold: 10,
            disclosure_threshold: 15,
            error_burst_threshold: 3,
        }
    }
}

impl Config {
    /// Load configuration from the process environment, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            db_path: std::env::var("ALEXANDRIA_DB_PATH").ok().map(PathBuf::from),
            auto_checkpoint_threshold: env_u32("ALEXANDRIA_AUTO_CHECKPOINT_THRESHOLD", defaults.auto_checkpoint_threshold),
            disclosure_threshold: env_u32("ALEXANDRIA_DISCLOSURE_THRESHOLD", defaults.disclosure_threshold),
            error_burst_threshold: env_u32("ALEXANDRIA_ERROR_BURST_THRESHOLD", defaults.error_burst_threshold),
        }
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
