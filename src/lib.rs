//! Crossword autofill: given a grid with some letters already placed, a scored word list, and the
//! grid's slots, find one word per slot so that every crossing agrees.
//!
//! The pipeline is index -> initial domains -> crossings -> AC-3 -> backtracking search. It can be
//! run synchronously with `find_fill`, or on a worker thread with `solver::Autofill`, which speaks
//! a small command/event protocol with progress reporting and cancellation.

pub mod arc_consistency;
pub mod backtracking_search;
pub mod domains;
pub mod error;
pub mod grid_config;
pub mod solver;
pub mod word_index;

use instant::Duration;

pub use backtracking_search::{
    find_fill, Choice, FillMonitor, FillOptions, FillSuccess, NoMonitor, Statistics,
};
pub use error::{FillFailure, GridError, Interruption, RequestError};
pub use grid_config::{Cell, Crossing, Direction, Grid, SlotConfig};
pub use solver::{Autofill, Command, Event, SolveId, SolveRequest};
pub use word_index::WordIndex;

/// The expected maximum length for a single slot.
pub const MAX_SLOT_LENGTH: usize = 21;

/// Slots shorter than this aren't filled.
pub const MIN_SLOT_LENGTH: usize = 3;

/// Score given to every word when the caller doesn't supply scores.
pub const DEFAULT_WORD_SCORE: i32 = 50;

/// Upper bound of the uniform jitter added to each word's score when ordering a domain.
pub const SCORE_JITTER: f32 = 15.0;

/// How many arcs AC-3 will process before giving up and handing partially-pruned domains to the
/// search.
pub const AC3_ITERATION_CAP: usize = 200_000;

/// How many levels of recursion between progress reports.
pub const PROGRESS_INTERVAL: usize = 3;

/// Wall-clock budget for a single solve.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// An identifier for a given slot, based on its index in the request's slot list.
pub type SlotId = usize;

/// An identifier for a given word, based on its index within the word index's bucket for its
/// length.
pub type WordId = usize;

/// An index into the row-major cell array of a grid.
pub type CellIndex = usize;

/// The current candidates for a slot, in the order they should be tried.
pub type Domain = Vec<WordId>;
