//! Dispenser configuration.
//!
//! All tunable parameters for one dispenser station.  Values are read from
//! a JSON file (missing fields take their defaults) and may be overridden
//! on the command line.  Everything is range-checked by [`validate`] before
//! the hardware is touched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What to do with units below one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// Dispense whole chunks only and report the remainder in the outcome.
    #[default]
    Truncate,
    /// Refuse quantities that are not a whole number of chunks.
    Reject,
}

/// Station configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispenserConfig {
    // --- Serial link ---
    /// Serial port name (`/dev/ttyACM0`, `COM4`, ...).
    pub port: String,
    pub baud_rate: u32,
    /// Wait after opening the port while the controller reboots and homes.
    pub boot_settle_ms: u64,

    // --- Chunking ---
    /// Units released by one dispense command.
    pub chunk_size: u32,
    pub remainder_policy: RemainderPolicy,
    /// Lowest and highest slot index the hardware accepts.
    pub min_slot: u16,
    pub max_slot: u16,

    // --- Timing ---
    /// Deadline for a chunk acknowledgement.
    pub response_timeout_ms: u64,
    /// Pause after each acknowledged chunk while the mechanism finishes.
    pub settle_delay_ms: u32,
    /// Deadline for RFID scan and homing exchanges.
    pub long_operation_timeout_ms: u64,

    // --- Token vocabulary ---
    pub dispense_directive: String,
    pub ack_token: String,
    pub busy_token: String,
    pub scan_directive: String,
    pub home_directive: String,

    // --- Files ---
    /// Patient/inventory store document.
    pub store_path: PathBuf,
    /// Append-only reconciliation journal.
    pub journal_path: PathBuf,
}

impl Default for DispenserConfig {
    fn default() -> Self {
        Self {
            // Serial
            port: "/dev/ttyACM0".into(),
            baud_rate: 9600,
            boot_settle_ms: 2000,

            // Chunking
            chunk_size: 10,
            remainder_policy: RemainderPolicy::Truncate,
            min_slot: 1,
            max_slot: 4,

            // Timing
            response_timeout_ms: 1000,
            settle_delay_ms: 500,
            long_operation_timeout_ms: 6000,

            // Tokens
            dispense_directive: "DISPENSE".into(),
            ack_token: "DISPENSE_COMPLETE".into(),
            busy_token: "BUSY".into(),
            scan_directive: "SCAN".into(),
            home_directive: "HOME".into(),

            // Files
            store_path: PathBuf::from("medvend-store.json"),
            journal_path: PathBuf::from("medvend-reconciliation.jsonl"),
        }
    }
}

impl DispenserConfig {
    /// Load from `path`, or return defaults when no path is given or the
    /// file does not exist.  The result is validated either way.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p).map_err(|source| ConfigError::Io {
                    path: p.display().to_string(),
                    source,
                })?;
                let cfg: Self = serde_json::from_str(&text)?;
                info!("config: loaded {}", p.display());
                cfg
            }
            Some(p) => {
                info!("config: {} not found, using defaults", p.display());
                Self::default()
            }
            None => Self::default(),
        };
        validate(&config)?;
        Ok(config)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn long_operation_timeout(&self) -> Duration {
        Duration::from_millis(self.long_operation_timeout_ms)
    }

    pub fn boot_settle(&self) -> Duration {
        Duration::from_millis(self.boot_settle_ms)
    }
}

fn valid_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= 24
        && token
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
}

/// Range-check every field.  Invalid values are rejected, never clamped.
pub fn validate(cfg: &DispenserConfig) -> Result<(), ConfigError> {
    if cfg.port.trim().is_empty() {
        return Err(ConfigError::ValidationFailed("port must not be empty"));
    }
    if ![1200, 2400, 4800, 9600, 19_200, 38_400, 57_600, 115_200].contains(&cfg.baud_rate) {
        return Err(ConfigError::ValidationFailed(
            "baud_rate must be a standard rate 1200–115200",
        ));
    }
    if cfg.boot_settle_ms > 30_000 {
        return Err(ConfigError::ValidationFailed(
            "boot_settle_ms must be 0–30000",
        ));
    }
    if !(1..=1000).contains(&cfg.chunk_size) {
        return Err(ConfigError::ValidationFailed("chunk_size must be 1–1000"));
    }
    if cfg.min_slot > cfg.max_slot {
        return Err(ConfigError::ValidationFailed(
            "min_slot must not exceed max_slot",
        ));
    }
    if !(50..=30_000).contains(&cfg.response_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "response_timeout_ms must be 50–30000",
        ));
    }
    if cfg.settle_delay_ms > 10_000 {
        return Err(ConfigError::ValidationFailed(
            "settle_delay_ms must be 0–10000",
        ));
    }
    if !(cfg.response_timeout_ms..=120_000).contains(&cfg.long_operation_timeout_ms) {
        return Err(ConfigError::ValidationFailed(
            "long_operation_timeout_ms must be response_timeout_ms–120000",
        ));
    }
    for token in [
        &cfg.dispense_directive,
        &cfg.ack_token,
        &cfg.busy_token,
        &cfg.scan_directive,
        &cfg.home_directive,
    ] {
        if !valid_token(token) {
            return Err(ConfigError::ValidationFailed(
                "tokens must be 1–24 chars of A–Z, 0–9 or _",
            ));
        }
    }
    if cfg.ack_token == cfg.busy_token {
        return Err(ConfigError::ValidationFailed(
            "ack_token and busy_token must differ",
        ));
    }
    Ok(())
}
