//! Room configuration.

use std::time::Duration;

use bingo_protocol::Amount;
use bingo_tick::ClockConfig;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Process-wide settings shared by every room a [`RoomManager`] hosts.
///
/// [`RoomManager`]: crate::RoomManager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Time between two number calls.
    pub call_interval: Duration,

    /// Time between `start` and the first call.
    pub start_delay: Duration,

    /// Seat limit for rooms created without their own.
    pub max_players: usize,

    /// Cards one participant may bring into a room.
    pub max_cards: usize,

    /// Cards one `generate_cards` request may produce.
    pub max_generated_cards: usize,

    /// Upper bound on any single wallet call.
    pub wallet_timeout: Duration,

    /// How long a room may sit without connections before the reaper
    /// acts on it.
    pub idle_timeout: Duration,

    /// Room actor command channel capacity.
    pub channel_size: usize,

    /// Fixed seed for draw order. Only for tests and demos; `None`
    /// draws from OS entropy.
    pub draw_seed: Option<u64>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            call_interval: Duration::from_secs(3),
            start_delay: Duration::from_secs(10),
            max_players: 100,
            max_cards: 2,
            max_generated_cards: 10,
            wallet_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
            channel_size: 64,
            draw_seed: None,
        }
    }
}

impl RoomConfig {
    /// Clamp values that would make a room unusable.
    pub fn validated(mut self) -> Self {
        if self.max_players == 0 {
            tracing::warn!("max_players of 0 raised to 1");
            self.max_players = 1;
        }
        if self.max_cards == 0 {
            tracing::warn!("max_cards of 0 raised to 1");
            self.max_cards = 1;
        }
        self.channel_size = self.channel_size.max(1);
        self
    }

    /// The draw clock settings for one room.
    pub fn clock_config(&self) -> ClockConfig {
        ClockConfig::new(self.call_interval, self.start_delay)
    }
}

// ---------------------------------------------------------------------------
// RoomSettings
// ---------------------------------------------------------------------------

/// Per-room parameters chosen at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSettings {
    pub name: String,
    /// Price of one seat; also each seat's share of the pot.
    pub stake: Amount,
    /// Overrides [`RoomConfig::max_players`].
    pub max_players: Option<usize>,
}

impl RoomSettings {
    pub fn new(name: impl Into<String>, stake: Amount) -> Self {
        Self {
            name: name.into(),
            stake,
            max_players: None,
        }
    }

    pub fn with_max_players(mut self, max_players: usize) -> Self {
        self.max_players = Some(max_players);
        self
    }
}
