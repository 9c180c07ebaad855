//! This module implements grid-filling as a recursive backtracking search. Before searching we
//! index the dictionary, build each slot's initial domain, and prune the domains with AC-3. The
//! search itself picks the unfilled slot with the fewest remaining options (MRV), tries its words
//! in domain order, and forward-checks each candidate against its crossings, shrinking their
//! domains for the duration of the attempt and restoring them from an undo log on the way back
//! out.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};

use bit_set::BitSet;
use instant::{Duration, Instant};
use log::{debug, info};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use crate::arc_consistency::{establish_arc_consistency, Ac3Outcome};
use crate::domains::initial_domains;
use crate::error::{FillFailure, Interruption};
use crate::grid_config::{build_crossings, Cell, Crossings, SlotConfig};
use crate::solver::SolveRequest;
use crate::word_index::WordIndex;
use crate::{
    Domain, SlotId, WordId, AC3_ITERATION_CAP, DEFAULT_TIMEOUT, PROGRESS_INTERVAL, SCORE_JITTER,
};

/// Knobs for a single fill attempt.
#[derive(Debug, Clone)]
pub struct FillOptions {
    /// Give up (as `Interrupted(Timeout)`) once this much time has passed.
    pub timeout: Duration,
    /// Seed for domain ordering. `None` seeds from entropy, so repeated solves vary.
    pub rng_seed: Option<u64>,
    pub ac3_iteration_cap: usize,
    /// Report progress every this many levels of recursion.
    pub progress_interval: usize,
    pub score_jitter: f32,
}

impl Default for FillOptions {
    fn default() -> Self {
        FillOptions {
            timeout: DEFAULT_TIMEOUT,
            rng_seed: None,
            ac3_iteration_cap: AC3_ITERATION_CAP,
            progress_interval: PROGRESS_INTERVAL,
            score_jitter: SCORE_JITTER,
        }
    }
}

/// The caller's view into a running fill: it can ask us to stop, and it hears about progress.
/// Cancellation is cooperative; we poll `is_cancelled` once per AC-3 arc and at every step of
/// the search.
pub trait FillMonitor {
    fn is_cancelled(&mut self) -> bool;

    fn on_progress(&mut self, _filled: usize, _total: usize, _message: Option<&str>) {}
}

/// A monitor that never cancels and ignores progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMonitor;

impl FillMonitor for NoMonitor {
    fn is_cancelled(&mut self) -> bool {
        false
    }
}

impl FillMonitor for AtomicBool {
    fn is_cancelled(&mut self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

impl FillMonitor for &AtomicBool {
    fn is_cancelled(&mut self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// A struct recording a slot assignment made during the filling process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub slot_id: SlotId,
    pub word_id: WordId,
}

/// A struct tracking statistics about the filling process.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    pub states: u64,
    pub backtracks: u64,
    pub ac3_arcs: usize,
    pub ac3_capped: bool,
    pub preassigned: usize,
    pub duration: Duration,
}

/// A struct representing the results of a fill operation.
#[derive(Debug, Clone)]
pub struct FillSuccess {
    pub statistics: Statistics,
    pub choices: Vec<Choice>,
    /// The input grid with every slot's word written in.
    pub cells: Vec<Cell>,
}

/// Any slot that AC-3 left with a single option is filled before the search starts. Those words
/// are forced, so the duplicate rule doesn't apply between them. Forced words that cross still
/// have to agree, since AC-3 may have stopped at its cap before checking them against each other.
fn preassign_forced_slots(
    index: &WordIndex,
    slots: &[SlotConfig],
    crossings: &[Crossings],
    domains: &[Domain],
) -> Result<Vec<Option<WordId>>, FillFailure> {
    let mut assignment: Vec<Option<WordId>> = Vec::with_capacity(slots.len());

    for (slot_id, domain) in domains.iter().enumerate() {
        match domain.as_slice() {
            [] => return Err(FillFailure::PropagationInfeasible { slot_id }),
            &[word_id] => assignment.push(Some(word_id)),
            _ => assignment.push(None),
        }
    }

    for (slot_id, slot_crossings) in crossings.iter().enumerate() {
        let Some(word_id) = assignment[slot_id] else {
            continue;
        };
        let word = index.word(slots[slot_id].length, word_id);

        for crossing in slot_crossings {
            if let Some(other_word_id) = assignment[crossing.other_slot] {
                let other_word = index.word(slots[crossing.other_slot].length, other_word_id);
                if word.glyphs[crossing.my_pos] != other_word.glyphs[crossing.other_pos] {
                    return Err(FillFailure::PropagationInfeasible { slot_id });
                }
            }
        }
    }

    Ok(assignment)
}

/// Domains we've narrowed while trying one candidate, with what they were before.
type UndoLog = Vec<(SlotId, Domain)>;

/// Everything a single search owns. Nothing here outlives the call to `find_fill`.
struct Search<'a, M: FillMonitor + ?Sized> {
    index: &'a WordIndex,
    slots: &'a [SlotConfig],
    crossings: &'a [Crossings],
    domains: Vec<Domain>,
    assignment: Vec<Option<WordId>>,
    /// `None` when the timeout is too long to represent, which means no limit.
    deadline: Option<Instant>,
    progress_interval: usize,
    monitor: &'a mut M,
    statistics: Statistics,
    interruption: Option<Interruption>,
}

impl<'a, M: FillMonitor + ?Sized> Search<'a, M> {
    /// Have we run out of time or been told to stop? Once this returns true it keeps returning
    /// true.
    fn is_interrupted(&mut self) -> bool {
        if self.interruption.is_none() {
            if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                self.interruption = Some(Interruption::Timeout);
            } else if self.monitor.is_cancelled() {
                self.interruption = Some(Interruption::Cancelled);
            }
        }

        self.interruption.is_some()
    }

    /// MRV: the unassigned slot with the smallest domain, ties going to the lowest slot id.
    fn choose_slot(&self) -> Option<SlotId> {
        (0..self.slots.len())
            .filter(|&slot_id| self.assignment[slot_id].is_none())
            .min_by_key(|&slot_id| self.domains[slot_id].len())
    }

    fn filled_count(&self) -> usize {
        self.assignment.iter().filter(|choice| choice.is_some()).count()
    }

    /// Words already used by slots of the given length.
    fn used_words(&self, length: usize) -> BitSet {
        let mut used = BitSet::with_capacity(self.index.words_of_length(length).len());
        for (slot, choice) in self.slots.iter().zip(&self.assignment) {
            match choice {
                Some(word_id) if slot.length == length => {
                    used.insert(*word_id);
                }
                _ => {}
            }
        }
        used
    }

    /// Check `word_id` against each of the slot's crossings. Assigned crossings must already
    /// agree; unassigned ones get their domains narrowed to words with the matching letter, with
    /// the prior domain pushed onto `undo_log`. Returns false as soon as a crossing can't be
    /// satisfied, in which case `undo_log` may hold partial changes the caller must restore.
    fn forward_check(&mut self, slot_id: SlotId, word_id: WordId, undo_log: &mut UndoLog) -> bool {
        let (index, slots, crossings) = (self.index, self.slots, self.crossings);
        let word = index.word(slots[slot_id].length, word_id);

        for crossing in &crossings[slot_id] {
            let letter = word.glyphs[crossing.my_pos];
            let other_words = index.words_of_length(slots[crossing.other_slot].length);

            if let Some(other_word_id) = self.assignment[crossing.other_slot] {
                if other_words[other_word_id].glyphs[crossing.other_pos] != letter {
                    return false;
                }
                continue;
            }

            let filtered: Domain = self.domains[crossing.other_slot]
                .iter()
                .copied()
                .filter(|&other_word_id| {
                    other_words[other_word_id].glyphs[crossing.other_pos] == letter
                })
                .collect();

            if filtered.is_empty() {
                return false;
            }

            if filtered.len() < self.domains[crossing.other_slot].len() {
                let prior = mem::replace(&mut self.domains[crossing.other_slot], filtered);
                undo_log.push((crossing.other_slot, prior));
            }
        }

        true
    }

    /// Put back every domain recorded in `undo_log`, newest first.
    fn restore(&mut self, undo_log: &mut UndoLog) {
        while let Some((slot_id, prior)) = undo_log.pop() {
            self.domains[slot_id] = prior;
        }
    }

    /// Fill the remaining slots, returning true once every slot has a word. On false, the
    /// assignment and domains are as they were when we were called.
    fn backtrack(&mut self, depth: usize) -> bool {
        if self.is_interrupted() {
            return false;
        }
        self.statistics.states += 1;

        let Some(slot_id) = self.choose_slot() else {
            return true;
        };

        if depth % self.progress_interval == 0 {
            let filled = self.filled_count();
            self.monitor.on_progress(filled, self.slots.len(), None);
        }

        let used = self.used_words(self.slots[slot_id].length);
        let mut undo_log: UndoLog = Vec::new();

        // The chosen slot's own domain isn't touched while we try its candidates: forward
        // checking only narrows unassigned crossing slots, and deeper levels restore whatever
        // they change before returning false.
        for candidate_idx in 0..self.domains[slot_id].len() {
            if self.is_interrupted() {
                return false;
            }

            let word_id = self.domains[slot_id][candidate_idx];
            if used.contains(word_id) {
                continue;
            }

            if self.forward_check(slot_id, word_id, &mut undo_log) {
                self.assignment[slot_id] = Some(word_id);
                if self.backtrack(depth + 1) {
                    return true;
                }
                self.assignment[slot_id] = None;
                self.statistics.backtracks += 1;
            }

            self.restore(&mut undo_log);
        }

        false
    }

    /// Write each slot's word into a copy of the input cells.
    fn render_cells(&self, cells: &[Cell]) -> Vec<Cell> {
        let mut result = cells.to_vec();
        for (slot, choice) in self.slots.iter().zip(&self.assignment) {
            let Some(word_id) = choice else {
                continue;
            };
            let word = self.index.word(slot.length, *word_id);
            for (&cell, &glyph) in slot.cells.iter().zip(&word.glyphs) {
                result[cell] = Cell::Letter(glyph);
            }
        }
        result
    }
}

/// Search for a fill for the given request. The request is assumed to be well-formed (see
/// `SolveRequest::validate`).
pub fn find_fill(
    request: &SolveRequest,
    options: &FillOptions,
    monitor: &mut dyn FillMonitor,
) -> Result<FillSuccess, FillFailure> {
    let start = Instant::now();
    let deadline = start.checked_add(options.timeout);
    let mut statistics = Statistics::default();

    if request.slots.is_empty() {
        return Ok(FillSuccess {
            statistics,
            choices: vec![],
            cells: request.cells.clone(),
        });
    }

    let index = WordIndex::build(&request.words, request.scores.as_deref());

    let mut rng = match options.rng_seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };

    let mut domains = initial_domains(
        &index,
        &request.slots,
        &request.cells,
        options.score_jitter,
        &mut rng,
    )?;

    let crossings = build_crossings(&request.slots);

    let report = establish_arc_consistency(
        &index,
        &request.slots,
        &crossings,
        &mut domains,
        options.ac3_iteration_cap,
        monitor,
    )?;
    statistics.ac3_arcs = report.arcs_processed;
    statistics.ac3_capped = report.outcome == Ac3Outcome::Capped;

    let assignment = preassign_forced_slots(&index, &request.slots, &crossings, &domains)?;
    statistics.preassigned = assignment.iter().filter(|choice| choice.is_some()).count();

    let mut search = Search {
        index: &index,
        slots: &request.slots,
        crossings: &crossings,
        domains,
        assignment,
        deadline,
        progress_interval: options.progress_interval.max(1),
        monitor,
        statistics,
        interruption: None,
    };

    if !search.backtrack(0) {
        return Err(match search.interruption {
            Some(interruption) => {
                info!(
                    "Fill {} after {} states ({:?})",
                    interruption,
                    search.statistics.states,
                    start.elapsed()
                );
                FillFailure::Interrupted(interruption)
            }
            None => {
                debug!(
                    "Search exhausted after {} states and {} backtracks",
                    search.statistics.states, search.statistics.backtracks
                );
                FillFailure::SearchExhausted
            }
        });
    }

    let cells = search.render_cells(&request.cells);
    let choices = search
        .assignment
        .iter()
        .enumerate()
        .filter_map(|(slot_id, choice)| choice.map(|word_id| Choice { slot_id, word_id }))
        .collect();

    let mut statistics = search.statistics;
    statistics.duration = start.elapsed();
    info!("Found a fill: {:?}", statistics);

    Ok(FillSuccess {
        statistics,
        choices,
        cells,
    })
}
