//! Win evaluation.
//!
//! The evaluator never sees client-declared state: callers build a
//! [`MarkMask`] from server-held marks and pass it in. It accepts any
//! mask, including ones legitimate play could never produce.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::card::{Card, SIZE};

/// A 5×5 marked-cell bitmap. The free centre always reads as marked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkMask {
    cells: [[bool; SIZE]; SIZE],
}

impl MarkMask {
    /// A mask with nothing marked (the free cell still counts).
    pub fn empty() -> Self {
        Self::default()
    }

    /// A mask with every cell marked.
    pub fn full() -> Self {
        Self {
            cells: [[true; SIZE]; SIZE],
        }
    }

    /// Wraps a raw grid.
    pub fn from_cells(cells: [[bool; SIZE]; SIZE]) -> Self {
        Self { cells }
    }

    /// Projects a set of marked numbers onto `card`'s grid.
    ///
    /// Numbers not on the card are ignored.
    pub fn from_marked(card: &Card, marked: &BTreeSet<u8>) -> Self {
        let mut mask = Self::empty();
        for &number in marked {
            if let Some((row, col)) = card.position_of(number) {
                mask.cells[row][col] = true;
            }
        }
        mask
    }

    /// Marks `(row, col)`.
    pub fn set(&mut self, row: usize, col: usize) {
        self.cells[row][col] = true;
    }

    /// Whether `(row, col)` counts as marked on `card`.
    pub fn is_marked(&self, card: &Card, row: usize, col: usize) -> bool {
        self.cells[row][col] || card.is_free(row, col)
    }
}

/// The line that completed a bingo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum WinLine {
    /// 1-based row, top to bottom.
    Row(u8),
    /// 1-based column, left to right.
    Column(u8),
    /// Top-left to bottom-right.
    Diagonal,
    /// Top-right to bottom-left.
    AntiDiagonal,
}

impl fmt::Display for WinLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Row(n) => write!(f, "Row {n}"),
            Self::Column(n) => write!(f, "Column {n}"),
            Self::Diagonal => write!(f, "Diagonal \\"),
            Self::AntiDiagonal => write!(f, "Diagonal /"),
        }
    }
}

/// Checks `card` against `mask` and returns the first completed line.
///
/// Lines are checked rows 1..5, then columns 1..5, then the main
/// diagonal, then the anti-diagonal. When several lines are complete
/// the first one in that order is reported.
pub fn evaluate(card: &Card, mask: &MarkMask) -> Option<WinLine> {
    let marked = |row: usize, col: usize| mask.is_marked(card, row, col);

    if let Some(row) = (0..SIZE).find(|&r| (0..SIZE).all(|c| marked(r, c))) {
        return Some(WinLine::Row(row as u8 + 1));
    }
    if let Some(col) = (0..SIZE).find(|&c| (0..SIZE).all(|r| marked(r, c))) {
        return Some(WinLine::Column(col as u8 + 1));
    }
    if (0..SIZE).all(|i| marked(i, i)) {
        return Some(WinLine::Diagonal);
    }
    if (0..SIZE).all(|i| marked(i, SIZE - 1 - i)) {
        return Some(WinLine::AntiDiagonal);
    }
    None
}
