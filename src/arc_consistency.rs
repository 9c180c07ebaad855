//! This module contains a crossword-specific version of AC-3. Our constraints are per-letter
//! rather than per-word: a word stays in a slot's domain as long as, for every crossing, the
//! crossing slot's domain still has at least one word with the same letter in the shared cell.
//!
//! Propagation runs until nothing else can be removed, a domain empties out (the grid has no
//! fill), the caller cancels, or we hit an iteration cap. The cap isn't a failure: the search can
//! cope with domains that are only partly pruned, it just has to backtrack more.

use std::collections::{HashSet, VecDeque};

use log::debug;

use crate::backtracking_search::FillMonitor;
use crate::error::{FillFailure, Interruption};
use crate::grid_config::{Crossing, Crossings, SlotConfig};
use crate::word_index::WordIndex;
use crate::{Domain, SlotId};

/// A directed arc: revise `slot_id`'s domain against the slot on the other side of `crossing`.
#[derive(Debug, Clone, Copy)]
struct DirectedArc {
    slot_id: SlotId,
    crossing: Crossing,
}

/// How a propagation pass ended, when it didn't find a contradiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ac3Outcome {
    /// Every remaining word is supported across every crossing.
    Complete,
    /// We stopped at the iteration cap with arcs still queued.
    Capped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ac3Report {
    pub outcome: Ac3Outcome,
    pub arcs_processed: usize,
}

/// Prune `domains` in place until every word in every domain has support in each crossing slot.
/// On `PropagationInfeasible` or `Interrupted` the domains are left partly pruned and shouldn't
/// be used.
pub fn establish_arc_consistency(
    index: &WordIndex,
    slots: &[SlotConfig],
    crossings: &[Crossings],
    domains: &mut [Domain],
    iteration_cap: usize,
    monitor: &mut dyn FillMonitor,
) -> Result<Ac3Report, FillFailure> {
    let mut queue: VecDeque<DirectedArc> = crossings
        .iter()
        .enumerate()
        .flat_map(|(slot_id, slot_crossings)| {
            slot_crossings
                .iter()
                .map(move |&crossing| DirectedArc { slot_id, crossing })
        })
        .collect();

    let mut supported_letters: HashSet<char> = HashSet::new();
    let mut arcs_processed = 0;

    while let Some(DirectedArc { slot_id, crossing }) = queue.pop_front() {
        if monitor.is_cancelled() {
            return Err(FillFailure::Interrupted(Interruption::Cancelled));
        }

        if arcs_processed >= iteration_cap {
            debug!(
                "AC-3 stopped at its cap of {} arcs with {} still queued",
                iteration_cap,
                queue.len() + 1
            );
            return Ok(Ac3Report {
                outcome: Ac3Outcome::Capped,
                arcs_processed,
            });
        }
        arcs_processed += 1;

        let Crossing {
            my_pos,
            other_slot,
            other_pos,
        } = crossing;

        // Which letters can the other slot still put in the shared cell?
        let other_words = index.words_of_length(slots[other_slot].length);
        supported_letters.clear();
        supported_letters.extend(
            domains[other_slot]
                .iter()
                .map(|&word_id| other_words[word_id].glyphs[other_pos]),
        );

        // Drop any of our words that need some other letter there.
        let my_words = index.words_of_length(slots[slot_id].length);
        let before = domains[slot_id].len();
        domains[slot_id]
            .retain(|&word_id| supported_letters.contains(&my_words[word_id].glyphs[my_pos]));

        if domains[slot_id].len() == before {
            continue;
        }

        if domains[slot_id].is_empty() {
            debug!("AC-3 emptied slot {}", slots[slot_id].label());
            return Err(FillFailure::PropagationInfeasible { slot_id });
        }

        // Losing words here may cost our other neighbors their support, so they need another
        // look. The slot we were just revised against can't have lost anything from this.
        for &neighbor in &crossings[slot_id] {
            if neighbor.other_slot != other_slot {
                queue.push_back(DirectedArc {
                    slot_id: neighbor.other_slot,
                    crossing: Crossing {
                        my_pos: neighbor.other_pos,
                        other_slot: slot_id,
                        other_pos: neighbor.my_pos,
                    },
                });
            }
        }
    }

    debug!("AC-3 reached a fixpoint after {} arcs", arcs_processed);

    Ok(Ac3Report {
        outcome: Ac3Outcome::Complete,
        arcs_processed,
    })
}
