//! Configuration for the demo server, loaded from an optional TOML file.
//!
//! Durations are written in seconds (fractions allowed) and converted
//! into [`RoomConfig`] on load.
//!
//! ```toml
//! bind = "0.0.0.0:8080"
//! opening_balance = 1000
//!
//! [rooms]
//! call_interval_secs = 3
//! start_delay_secs = 10
//!
//! [[hall]]
//! name = "Main hall"
//! stake = 10
//! ```

use std::path::Path;
use std::time::Duration;

use bingo::prelude::{Amount, RoomConfig, RoomSettings};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level file layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HallConfig {
    /// Address the WebSocket listener binds to.
    pub bind: String,
    /// Balance every new user starts with in the in-memory wallet.
    pub opening_balance: Amount,
    /// How often the reaper sweeps idle rooms.
    pub reaper_period_secs: f64,
    pub rooms: RoomTimings,
    /// Rooms created at boot.
    pub hall: Vec<RoomSettings>,
}

impl Default for HallConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            opening_balance: 1_000,
            reaper_period_secs: 30.0,
            rooms: RoomTimings::default(),
            hall: vec![RoomSettings::new("Main hall", 10)],
        }
    }
}

impl HallConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    pub fn reaper_period(&self) -> Duration {
        secs(self.reaper_period_secs)
    }
}

/// `[rooms]`: the seconds-based mirror of [`RoomConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomTimings {
    pub call_interval_secs: f64,
    pub start_delay_secs: f64,
    pub max_players: usize,
    pub max_cards: usize,
    pub max_generated_cards: usize,
    pub wallet_timeout_secs: f64,
    pub idle_timeout_secs: f64,
    pub draw_seed: Option<u64>,
}

impl Default for RoomTimings {
    fn default() -> Self {
        let defaults = RoomConfig::default();
        Self {
            call_interval_secs: defaults.call_interval.as_secs_f64(),
            start_delay_secs: defaults.start_delay.as_secs_f64(),
            max_players: defaults.max_players,
            max_cards: defaults.max_cards,
            max_generated_cards: defaults.max_generated_cards,
            wallet_timeout_secs: defaults.wallet_timeout.as_secs_f64(),
            idle_timeout_secs: defaults.idle_timeout.as_secs_f64(),
            draw_seed: defaults.draw_seed,
        }
    }
}

impl RoomTimings {
    pub fn to_room_config(&self) -> RoomConfig {
        RoomConfig {
            call_interval: secs(self.call_interval_secs),
            start_delay: secs(self.start_delay_secs),
            max_players: self.max_players,
            max_cards: self.max_cards,
            max_generated_cards: self.max_generated_cards,
            wallet_timeout: secs(self.wallet_timeout_secs),
            idle_timeout: secs(self.idle_timeout_secs),
            draw_seed: self.draw_seed,
            ..RoomConfig::default()
        }
    }
}

/// Negative or non-finite values become zero; `RoomConfig` clamps later.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
