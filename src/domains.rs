use log::info;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::Rng;
use smallvec::SmallVec;

use crate::error::FillFailure;
use crate::grid_config::{Cell, SlotConfig};
use crate::word_index::{LetterConstraint, WordIndex};
use crate::{Domain, MAX_SLOT_LENGTH};

/// The letters already present in a slot, as constraints on its word.
pub fn fixed_letters(
    slot: &SlotConfig,
    cells: &[Cell],
) -> SmallVec<[LetterConstraint; MAX_SLOT_LENGTH]> {
    slot.cells
        .iter()
        .enumerate()
        .filter_map(|(pos, &cell)| {
            cells[cell]
                .letter()
                .map(|letter| LetterConstraint { pos, letter })
        })
        .collect()
}

/// Put the best words first. Each word is ranked by its score plus a random bump in
/// `[0, jitter)`, so repeated solves of the same grid don't always reach for the same words. With
/// no scores to go on, we just shuffle.
pub fn order_domain(
    domain: &mut Domain,
    index: &WordIndex,
    len: usize,
    jitter: f32,
    rng: &mut SmallRng,
) {
    if !index.has_scores() {
        domain.shuffle(rng);
        return;
    }

    domain.sort_by_cached_key(|&word_id| {
        let bump = rng.gen::<f32>() * jitter;
        -(((index.score(len, word_id) as f32 + bump) * 1000.0) as i64)
    });
}

/// Build the starting domain for every slot from the dictionary and the letters already in the
/// grid. If any slot has nothing that fits, there's no point going further, so we fail right away
/// naming that slot.
pub fn initial_domains(
    index: &WordIndex,
    slots: &[SlotConfig],
    cells: &[Cell],
    jitter: f32,
    rng: &mut SmallRng,
) -> Result<Vec<Domain>, FillFailure> {
    let mut domains: Vec<Domain> = Vec::with_capacity(slots.len());

    for (slot_id, slot) in slots.iter().enumerate() {
        let mut domain = index.matching_indices(slot.length, &fixed_letters(slot, cells));

        if domain.is_empty() {
            info!("No words fit slot {}", slot.label());
            return Err(FillFailure::StructuralInfeasible {
                slot_id,
                number: slot.number,
                direction: slot.direction,
            });
        }

        order_domain(&mut domain, index, slot.length, jitter, rng);
        domains.push(domain);
    }

    Ok(domains)
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::{fixed_letters, initial_domains, order_domain};
    use crate::error::FillFailure;
    use crate::grid_config::{Direction, Grid};
    use crate::word_index::{LetterConstraint, WordIndex};

    #[test]
    fn test_fixed_letters_come_from_grid() {
        let grid = Grid::from_template("C.T\n...\n...").expect("valid template");
        let slots = grid.slots();

        assert_eq!(
            fixed_letters(&slots[0], &grid.cells).to_vec(),
            vec![
                LetterConstraint { pos: 0, letter: 'C' },
                LetterConstraint { pos: 2, letter: 'T' },
            ]
        );
        assert!(fixed_letters(&slots[1], &grid.cells).is_empty());
    }

    #[test]
    fn test_pattern_domain_contains_exactly_matches() {
        let grid = Grid::from_template("C.T\n###\n###").expect("valid template");
        let index = WordIndex::build(&["CAT", "COT", "CUT", "DOG", "CAR"], None);
        let mut rng = SmallRng::seed_from_u64(7);

        let domains = initial_domains(&index, &grid.slots(), &grid.cells, 15.0, &mut rng)
            .expect("domain should not be empty");

        let mut words: Vec<_> = domains[0]
            .iter()
            .map(|&id| index.word(3, id).string.as_str())
            .collect();
        words.sort();
        assert_eq!(words, vec!["CAT", "COT", "CUT"]);
    }

    #[test]
    fn test_ordering_prefers_high_scores() {
        let index = WordIndex::build(&["LOW", "MID", "TOP"], Some(&[0, 50, 100][..]));
        let mut rng = SmallRng::seed_from_u64(1);

        // The score gaps are wider than the jitter, so the order is fixed.
        for _ in 0..20 {
            let mut domain = vec![0, 1, 2];
            order_domain(&mut domain, &index, 3, 15.0, &mut rng);
            assert_eq!(domain, vec![2, 1, 0]);
        }
    }

    #[test]
    fn test_unscored_domains_are_shuffled_permutations() {
        let words: Vec<String> = (0..26u8)
            .map(|i| format!("{}AA", (b'A' + i) as char))
            .collect();
        let index = WordIndex::build(&words, None);
        let mut rng = SmallRng::seed_from_u64(3);

        let mut domain: Vec<usize> = (0..26).collect();
        order_domain(&mut domain, &index, 3, 15.0, &mut rng);

        assert_ne!(domain, (0..26).collect::<Vec<_>>());
        domain.sort();
        assert_eq!(domain, (0..26).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_domain_names_the_slot() {
        // Only 3-letter words, but 4A needs four letters.
        let grid = Grid::from_template(
            "
            ...#
            ....
            ....
            #...
            ",
        )
        .expect("valid template");
        let index = WordIndex::build(&["CAT", "DOG"], None);
        let mut rng = SmallRng::seed_from_u64(0);

        let failure = initial_domains(&index, &grid.slots(), &grid.cells, 15.0, &mut rng)
            .expect_err("4-letter slots can't be filled");

        assert_eq!(
            failure,
            FillFailure::StructuralInfeasible {
                slot_id: 1,
                number: 4,
                direction: Direction::Across,
            }
        );
        assert_eq!(failure.to_string(), "No words fit slot 4A");
    }
}
