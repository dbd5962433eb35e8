//! Bingo rules for the Bingo Hall server.
//!
//! Everything in this crate is pure: no I/O, no shared state, no clocks.
//! The room engine composes these pieces and owns the only mutable copy.
//!
//! # Key types
//!
//! - [`Card`] — an immutable 5×5 card with a free centre cell
//! - [`DrawSequencer`] — a room's shuffled 1..=75 permutation and cursor
//! - [`MarkMask`] / [`evaluate`] — win detection over a card
//! - [`Letter`] — the B/I/N/G/O band of a number

mod card;
mod draw;
mod error;
mod win;

pub use card::{Card, COLUMN_RANGES, FREE, SIZE, generate, generate_with};
pub use draw::{Ball, Draw, DrawSequencer, Letter, MAX_NUMBER};
pub use error::CardError;
pub use win::{MarkMask, WinLine, evaluate};
