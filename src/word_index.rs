use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use bit_set::BitSet;
use log::debug;
use smallvec::SmallVec;

use crate::{WordId, DEFAULT_WORD_SCORE, MAX_SLOT_LENGTH};

/// A struct representing a word that can be chosen for a slot of its length.
#[derive(Debug, Clone)]
pub struct Word {
    pub string: String,
    pub glyphs: SmallVec<[char; MAX_SLOT_LENGTH]>,
    pub score: i32,
}

/// A requirement that the letter at `pos` in a word be `letter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LetterConstraint {
    pub pos: usize,
    pub letter: char,
}

/// For a single word length: position -> letter -> ids of the words with that letter there.
type PositionIndex = Vec<HashMap<char, BitSet>>;

/// The dictionary, bucketed by length, with an index from (length, position, letter) to the words
/// that have that letter in that position. Built once per solve and read-only afterwards.
pub struct WordIndex {
    words: Vec<Vec<Word>>,
    pos_index: Vec<PositionIndex>,
    has_scores: bool,
}

impl Debug for WordIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordIndex")
            .field(
                "words",
                &(["(", &self.word_count().to_string(), " entries)"].join("")),
            )
            .field("has_scores", &self.has_scores)
            .finish()
    }
}

impl WordIndex {
    /// Index the given words. `scores` runs parallel to `words`; any word without a score gets
    /// `DEFAULT_WORD_SCORE`. Word contents aren't validated.
    pub fn build<S: AsRef<str>>(words: &[S], scores: Option<&[i32]>) -> WordIndex {
        let mut index = WordIndex {
            words: vec![],
            pos_index: vec![],
            has_scores: scores.is_some(),
        };

        for (idx, word) in words.iter().enumerate() {
            let word = word.as_ref();
            let glyphs: SmallVec<[char; MAX_SLOT_LENGTH]> = word.chars().collect();
            let len = glyphs.len();
            let score = scores
                .and_then(|scores| scores.get(idx).copied())
                .unwrap_or(DEFAULT_WORD_SCORE);

            if index.words.len() <= len {
                index.words.resize_with(len + 1, Vec::new);
                index.pos_index.resize_with(len + 1, Vec::new);
            }

            let positions = &mut index.pos_index[len];
            if positions.is_empty() {
                positions.resize_with(len, HashMap::new);
            }

            let word_id = index.words[len].len();
            for (pos, &glyph) in glyphs.iter().enumerate() {
                positions[pos].entry(glyph).or_default().insert(word_id);
            }

            index.words[len].push(Word {
                string: word.to_string(),
                glyphs,
                score,
            });
        }

        debug!(
            "Indexed {} words across {} lengths",
            index.word_count(),
            index.words.iter().filter(|bucket| !bucket.is_empty()).count()
        );

        index
    }

    /// Total number of indexed words.
    pub fn word_count(&self) -> usize {
        self.words.iter().map(|bucket| bucket.len()).sum()
    }

    /// Did the caller supply scores? If not, domains get shuffled instead of score-ordered.
    pub fn has_scores(&self) -> bool {
        self.has_scores
    }

    pub fn words_of_length(&self, len: usize) -> &[Word] {
        self.words.get(len).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn word(&self, len: usize, word_id: WordId) -> &Word {
        &self.words[len][word_id]
    }

    pub fn score(&self, len: usize, word_id: WordId) -> i32 {
        self.words[len][word_id].score
    }

    /// Return the ids, in ascending order, of every word of length `len` that satisfies all of
    /// the given constraints.
    pub fn matching_indices(&self, len: usize, constraints: &[LetterConstraint]) -> Vec<WordId> {
        if constraints.is_empty() {
            return (0..self.words_of_length(len).len()).collect();
        }

        let Some(positions) = self.pos_index.get(len) else {
            return vec![];
        };

        let mut candidate_sets: SmallVec<[&BitSet; MAX_SLOT_LENGTH]> =
            SmallVec::with_capacity(constraints.len());

        for constraint in constraints {
            match positions
                .get(constraint.pos)
                .and_then(|by_letter| by_letter.get(&constraint.letter))
            {
                Some(set) => candidate_sets.push(set),
                None => return vec![],
            }
        }

        // Start from the most restrictive constraint so each intersection works on as little as
        // possible.
        candidate_sets.sort_by_cached_key(|set| set.len());

        let mut result = candidate_sets[0].clone();
        for set in &candidate_sets[1..] {
            if result.is_empty() {
                break;
            }
            result.intersect_with(set);
        }

        result.iter().collect()
    }
}
