//! Bingo cards and the card generator.

use std::fmt;

use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};

use crate::CardError;

/// Side length of a card.
pub const SIZE: usize = 5;

/// Sentinel stored in the free centre cell.
pub const FREE: u8 = 0;

/// Inclusive number band for each column, left to right (B, I, N, G, O).
pub const COLUMN_RANGES: [(u8, u8); SIZE] =
    [(1, 15), (16, 30), (31, 45), (46, 60), (61, 75)];

const CENTRE: usize = SIZE / 2;

/// An immutable 5×5 bingo card, stored row-major.
///
/// Column `c` holds five distinct numbers from `COLUMN_RANGES[c]`,
/// except the centre cell which is always [`FREE`].
///
/// Serializes as a plain `[[u8; 5]; 5]` grid. Deserialization runs the
/// same validation as [`Card::from_rows`], so a malformed grid from the
/// store or the wire is rejected instead of silently accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[[u8; 5]; 5]", into = "[[u8; 5]; 5]")]
pub struct Card {
    rows: [[u8; SIZE]; SIZE],
}

impl Card {
    /// Samples a fresh card from `rng`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut rows = [[FREE; SIZE]; SIZE];
        for (col, &(min, max)) in COLUMN_RANGES.iter().enumerate() {
            let span = usize::from(max - min) + 1;
            let picks = index::sample(rng, span, SIZE);
            for (row, offset) in picks.into_iter().enumerate() {
                rows[row][col] = min + offset as u8;
            }
        }
        rows[CENTRE][CENTRE] = FREE;
        Self { rows }
    }

    /// Builds a card from an explicit row-major grid.
    ///
    /// # Errors
    /// Returns [`CardError`] if any column breaks its band, repeats a
    /// number, or the centre is not [`FREE`].
    pub fn from_rows(rows: [[u8; SIZE]; SIZE]) -> Result<Self, CardError> {
        let centre = rows[CENTRE][CENTRE];
        if centre != FREE {
            return Err(CardError::CentreNotFree(centre));
        }

        for (col, &(min, max)) in COLUMN_RANGES.iter().enumerate() {
            let mut seen = [false; SIZE * 3];
            for (row, cells) in rows.iter().enumerate() {
                if row == CENTRE && col == CENTRE {
                    continue;
                }
                let value = cells[col];
                if !(min..=max).contains(&value) {
                    return Err(CardError::OutOfRange {
                        row,
                        col,
                        value,
                        min,
                        max,
                    });
                }
                let slot = usize::from(value - min);
                if seen[slot] {
                    return Err(CardError::DuplicateInColumn { col, value });
                }
                seen[slot] = true;
            }
        }

        Ok(Self { rows })
    }

    /// The grid, row-major.
    pub fn rows(&self) -> &[[u8; SIZE]; SIZE] {
        &self.rows
    }

    /// The value at `(row, col)`; [`FREE`] for the centre.
    pub fn number_at(&self, row: usize, col: usize) -> u8 {
        self.rows[row][col]
    }

    /// Returns `true` if `(row, col)` is the free cell.
    pub fn is_free(&self, row: usize, col: usize) -> bool {
        row == CENTRE && col == CENTRE
    }

    /// Finds the cell holding `number`, if the card has it.
    ///
    /// The free sentinel is never "found": `position_of(FREE)` is `None`.
    pub fn position_of(&self, number: u8) -> Option<(usize, usize)> {
        if number == FREE {
            return None;
        }
        // A number can only live in its own column.
        let col = COLUMN_RANGES
            .iter()
            .position(|&(min, max)| (min..=max).contains(&number))?;
        (0..SIZE)
            .find(|&row| self.rows[row][col] == number)
            .map(|row| (row, col))
    }

    /// Returns `true` if `number` appears on the card.
    pub fn contains(&self, number: u8) -> bool {
        self.position_of(number).is_some()
    }

    /// Iterates over the 24 playable numbers (everything but the free cell).
    pub fn numbers(&self) -> impl Iterator<Item = u8> + '_ {
        self.rows
            .iter()
            .flatten()
            .copied()
            .filter(|&n| n != FREE)
    }
}

impl TryFrom<[[u8; SIZE]; SIZE]> for Card {
    type Error = CardError;

    fn try_from(rows: [[u8; SIZE]; SIZE]) -> Result<Self, Self::Error> {
        Self::from_rows(rows)
    }
}

impl From<Card> for [[u8; SIZE]; SIZE] {
    fn from(card: Card) -> Self {
        card.rows
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  B  I  N  G  O")?;
        for row in &self.rows {
            for &n in row {
                if n == FREE {
                    write!(f, " **")?;
                } else {
                    write!(f, " {n:>2}")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Generates `n` independent cards from the thread-local RNG.
///
/// Cards are not deduplicated; two calls may in principle return the
/// same grid.
pub fn generate(n: usize) -> Vec<Card> {
    generate_with(&mut rand::rng(), n)
}

/// Generates `n` cards from a caller-supplied RNG (seed it for tests).
pub fn generate_with<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<Card> {
    (0..n).map(|_| Card::random(rng)).collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    const SAMPLE: [[u8; SIZE]; SIZE] = [
        [1, 16, 31, 46, 61],
        [2, 17, 32, 47, 62],
        [3, 18, FREE, 48, 63],
        [4, 19, 34, 49, 64],
        [5, 20, 35, 50, 65],
    ];

    #[test]
    fn test_generate_columns_stay_in_range_and_distinct() {
        let mut rng = StdRng::seed_from_u64(7);
        for card in generate_with(&mut rng, 200) {
            for (col, &(min, max)) in COLUMN_RANGES.iter().enumerate() {
                let mut values: Vec<u8> = (0..SIZE)
                    .filter(|&row| !card.is_free(row, col))
                    .map(|row| card.number_at(row, col))
                    .collect();
                assert!(values.iter().all(|v| (min..=max).contains(v)));
                values.sort_unstable();
                values.dedup();
                let expected = if col == CENTRE { SIZE - 1 } else { SIZE };
                assert_eq!(values.len(), expected, "column {col} repeats");
            }
            assert_eq!(card.number_at(2, 2), FREE);
        }
    }

    #[test]
    fn test_generate_returns_requested_count() {
        assert_eq!(generate(3).len(), 3);
        assert!(generate(0).is_empty());
    }

    #[test]
    fn test_generate_with_same_seed_is_deterministic() {
        let a = generate_with(&mut StdRng::seed_from_u64(42), 4);
        let b = generate_with(&mut StdRng::seed_from_u64(42), 4);
        assert_eq!(a, b);
    }

    #[test]
    fn test_from_rows_accepts_valid_grid() {
        let card = Card::from_rows(SAMPLE).expect("valid card");
        assert_eq!(card.number_at(0, 0), 1);
        assert_eq!(card.numbers().count(), 24);
    }

    #[test]
    fn test_from_rows_rejects_out_of_range() {
        let mut rows = SAMPLE;
        rows[0][1] = 40;
        assert!(matches!(
            Card::from_rows(rows),
            Err(CardError::OutOfRange { row: 0, col: 1, value: 40, .. })
        ));
    }

    #[test]
    fn test_from_rows_rejects_duplicate_in_column() {
        let mut rows = SAMPLE;
        rows[1][0] = 1;
        assert_eq!(
            Card::from_rows(rows),
            Err(CardError::DuplicateInColumn { col: 0, value: 1 })
        );
    }

    #[test]
    fn test_from_rows_rejects_filled_centre() {
        let mut rows = SAMPLE;
        rows[2][2] = 33;
        assert_eq!(Card::from_rows(rows), Err(CardError::CentreNotFree(33)));
    }

    #[test]
    fn test_position_of_finds_number_in_its_column() {
        let card = Card::from_rows(SAMPLE).unwrap();
        assert_eq!(card.position_of(47), Some((1, 3)));
        assert_eq!(card.position_of(75), None);
        assert_eq!(card.position_of(FREE), None);
        assert!(card.contains(65));
        assert!(!card.contains(0));
    }

    #[test]
    fn test_card_serializes_as_plain_grid() {
        let card = Card::from_rows(SAMPLE).unwrap();
        let json = serde_json::to_value(card).unwrap();
        assert_eq!(json[2][2], 0);
        assert_eq!(json[4][0], 5);

        let back: Card = serde_json::from_value(json).unwrap();
        assert_eq!(back, card);
    }

    #[test]
    fn test_card_deserialize_rejects_invalid_grid() {
        let bad = serde_json::json!([
            [1, 16, 31, 46, 61],
            [2, 17, 32, 47, 62],
            [3, 18, 33, 48, 63],
            [4, 19, 34, 49, 64],
            [5, 20, 35, 50, 65]
        ]);
        assert!(serde_json::from_value::<Card>(bad).is_err());
    }
}
