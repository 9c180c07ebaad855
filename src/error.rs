use thiserror::Error;

use crate::grid_config::Direction;
use crate::SlotId;

/// Why a search was abandoned before it could finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Interruption {
    #[error("timed out")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}

/// The ways a fill attempt can end without a solution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FillFailure {
    /// No dictionary word of the right length matches the letters already in the slot.
    #[error("No words fit slot {number}{}", .direction.abbreviation())]
    StructuralInfeasible {
        slot_id: SlotId,
        number: u32,
        direction: Direction,
    },

    /// Arc consistency (or the forced pre-assignments that follow it) ruled out every option for
    /// this slot.
    #[error("no solution: constraint propagation emptied slot {slot_id}")]
    PropagationInfeasible { slot_id: SlotId },

    #[error("no solution: search space exhausted")]
    SearchExhausted,

    #[error("fill {0}")]
    Interrupted(Interruption),
}

impl FillFailure {
    /// Did we give up rather than prove there's no fill?
    pub fn is_interrupted(&self) -> bool {
        matches!(self, FillFailure::Interrupted(_))
    }
}

/// Problems with the shape of a solve request. The solver itself assumes these have been ruled
/// out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("got {scores} scores for {words} words")]
    ScoreCountMismatch { words: usize, scores: usize },

    #[error("grid width must be positive")]
    ZeroWidth,

    #[error("{cells} cells don't divide into rows of width {width}")]
    RaggedGrid { cells: usize, width: usize },

    #[error("slot {slot_id} declares length {length} but has {cells} cells")]
    SlotLengthMismatch {
        slot_id: SlotId,
        length: usize,
        cells: usize,
    },

    #[error("slot {slot_id} references cell {cell}, but the grid only has {cell_count} cells")]
    CellOutOfRange {
        slot_id: SlotId,
        cell: usize,
        cell_count: usize,
    },
}

/// Problems building a grid from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("grid template has no rows")]
    EmptyTemplate,

    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("invalid cell value {0:?}")]
    InvalidCell(String),
}
