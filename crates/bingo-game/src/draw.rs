//! The per-room draw sequence.
//!
//! A [`DrawSequencer`] holds one permutation of `1..=75` and a cursor.
//! The drawn prefix is the room's call log: ordered, duplicate-free,
//! and at most 75 long.

use std::fmt;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Highest number in a standard 75-ball game.
pub const MAX_NUMBER: u8 = 75;

/// The B/I/N/G/O band a number belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Letter {
    B,
    I,
    N,
    G,
    O,
}

impl Letter {
    /// Returns the band for `number`, or `None` outside `1..=75`.
    pub fn of(number: u8) -> Option<Self> {
        match number {
            1..=15 => Some(Self::B),
            16..=30 => Some(Self::I),
            31..=45 => Some(Self::N),
            46..=60 => Some(Self::G),
            61..=75 => Some(Self::O),
            _ => None,
        }
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Self::B => 'B',
            Self::I => 'I',
            Self::N => 'N',
            Self::G => 'G',
            Self::O => 'O',
        };
        write!(f, "{c}")
    }
}

/// A called number with its letter band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ball {
    pub number: u8,
    pub letter: Letter,
}

impl fmt::Display for Ball {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.letter, self.number)
    }
}

/// Result of asking the sequencer for the next number.
///
/// `Exhausted` is a normal terminal condition, not an error: it means
/// all 75 numbers have been called and the draw loop must stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Draw {
    Called(Ball),
    Exhausted,
}

/// Owns one room's shuffled permutation of `1..=75`.
///
/// The permutation is materialized lazily by [`shuffle`](Self::shuffle)
/// when the room starts, never at construction. If [`next`](Self::next)
/// is reached first it shuffles on demand.
#[derive(Debug, Clone, Default)]
pub struct DrawSequencer {
    order: Option<Vec<u8>>,
    cursor: usize,
    /// `drawn[n]` is set once `n` has been called. Index 0 is unused.
    drawn: Vec<bool>,
}

impl DrawSequencer {
    /// Creates an unshuffled sequencer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a sequencer over a fixed order.
    ///
    /// Returns `None` unless `order` is a permutation of `1..=75`.
    /// Intended for deterministic tests and replays.
    pub fn from_order(order: Vec<u8>) -> Option<Self> {
        let mut seen = vec![false; usize::from(MAX_NUMBER) + 1];
        if order.len() != usize::from(MAX_NUMBER) {
            return None;
        }
        for &n in &order {
            let slot = seen.get_mut(usize::from(n)).filter(|_| n != 0)?;
            if *slot {
                return None;
            }
            *slot = true;
        }
        Some(Self {
            order: Some(order),
            cursor: 0,
            drawn: vec![false; usize::from(MAX_NUMBER) + 1],
        })
    }

    /// Shuffles with the thread-local RNG. No-op if already shuffled.
    pub fn shuffle(&mut self) {
        self.shuffle_with(&mut rand::rng());
    }

    /// Shuffles with a caller-supplied RNG. No-op if already shuffled,
    /// so the permutation is decided exactly once.
    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.order.is_some() {
            return;
        }
        let mut order: Vec<u8> = (1..=MAX_NUMBER).collect();
        order.shuffle(rng);
        self.order = Some(order);
        self.drawn = vec![false; usize::from(MAX_NUMBER) + 1];
    }

    /// Whether the permutation has been materialized.
    pub fn is_shuffled(&self) -> bool {
        self.order.is_some()
    }

    /// Draws the next number, or reports exhaustion.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Draw {
        if self.order.is_none() {
            self.shuffle();
        }
        let Some(&number) = self
            .order
            .as_ref()
            .and_then(|order| order.get(self.cursor))
        else {
            return Draw::Exhausted;
        };
        self.cursor += 1;
        self.drawn[usize::from(number)] = true;
        match Letter::of(number) {
            Some(letter) => Draw::Called(Ball { number, letter }),
            None => Draw::Exhausted,
        }
    }

    /// The call log: numbers drawn so far, in draw order.
    pub fn drawn(&self) -> &[u8] {
        match &self.order {
            Some(order) => &order[..self.cursor],
            None => &[],
        }
    }

    /// Returns `true` if `number` has already been called.
    pub fn is_drawn(&self, number: u8) -> bool {
        self.drawn.get(usize::from(number)).copied().unwrap_or(false)
    }

    /// How many numbers have been called.
    pub fn count(&self) -> usize {
        self.cursor
    }

    /// How many numbers are left to call.
    pub fn remaining(&self) -> usize {
        usize::from(MAX_NUMBER) - self.cursor
    }
}
