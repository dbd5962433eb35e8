//! Error types for the rules layer.

/// Errors raised when validating a hand-built card.
///
/// Generated cards never produce these; they only come from
/// [`Card::from_rows`](crate::Card::from_rows).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CardError {
    /// A cell holds a number outside its column's band.
    #[error("cell ({row}, {col}) holds {value}, outside {min}..={max}")]
    OutOfRange {
        row: usize,
        col: usize,
        value: u8,
        min: u8,
        max: u8,
    },

    /// The same number appears twice in one column.
    #[error("column {col} contains {value} more than once")]
    DuplicateInColumn { col: usize, value: u8 },

    /// The centre cell must be the free sentinel.
    #[error("centre cell must be free, found {0}")]
    CentreNotFree(u8),
}
