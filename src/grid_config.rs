use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::GridError;
use crate::{CellIndex, SlotId, MAX_SLOT_LENGTH, MIN_SLOT_LENGTH};

/// Direction that a slot is facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Across,
    Down,
}

impl Direction {
    /// The letter used after a clue number, as in "5A".
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Direction::Across => "A",
            Direction::Down => "D",
        }
    }
}

/// The contents of a single grid cell. On the wire this is a string: `"#"` for a block, `""` for
/// an empty cell, or the letter itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Cell {
    Black,
    Empty,
    Letter(char),
}

impl Cell {
    pub fn letter(&self) -> Option<char> {
        match self {
            Cell::Letter(letter) => Some(*letter),
            _ => None,
        }
    }
}

impl TryFrom<String> for Cell {
    type Error = GridError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let mut chars = value.chars();
        match (chars.next(), chars.next()) {
            (None, _) => Ok(Cell::Empty),
            (Some('#'), None) => Ok(Cell::Black),
            (Some(letter), None) => Ok(Cell::Letter(letter)),
            _ => Err(GridError::InvalidCell(value)),
        }
    }
}

impl From<Cell> for String {
    fn from(cell: Cell) -> Self {
        match cell {
            Cell::Black => "#".to_string(),
            Cell::Empty => String::new(),
            Cell::Letter(letter) => letter.to_string(),
        }
    }
}

/// A slot in the grid: a maximal run of white cells in one direction, identified by its index in
/// the slot list and labeled by its clue number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub cells: Vec<CellIndex>,
    pub length: usize,
    pub direction: Direction,
    pub number: u32,
}

impl SlotConfig {
    /// "5A", "12D", etc.
    pub fn label(&self) -> String {
        format!("{}{}", self.number, self.direction.abbreviation())
    }
}

/// A crossing between one slot and another: our cell `my_pos` is the same grid cell as the
/// other slot's cell `other_pos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossing {
    pub my_pos: usize,
    pub other_slot: SlotId,
    pub other_pos: usize,
}

pub type Crossings = SmallVec<[Crossing; MAX_SLOT_LENGTH]>;

/// For each slot, every place it shares a cell with another slot. Each cell is visited once; when
/// a later slot reaches a cell that's already claimed, we record the crossing in both directions
/// for every earlier claimant.
pub fn build_crossings(slots: &[SlotConfig]) -> Vec<Crossings> {
    let mut crossings: Vec<Crossings> = slots.iter().map(|_| SmallVec::new()).collect();
    let mut claimants_by_cell: HashMap<CellIndex, SmallVec<[(SlotId, usize); 2]>> = HashMap::new();

    for (slot_id, slot) in slots.iter().enumerate() {
        for (pos, &cell) in slot.cells.iter().enumerate() {
            let claimants = claimants_by_cell.entry(cell).or_default();

            for &(other_slot, other_pos) in claimants.iter() {
                crossings[slot_id].push(Crossing {
                    my_pos: pos,
                    other_slot,
                    other_pos,
                });
                crossings[other_slot].push(Crossing {
                    my_pos: other_pos,
                    other_slot: slot_id,
                    other_pos: pos,
                });
            }

            claimants.push((slot_id, pos));
        }
    }

    crossings
}

/// A rectangular grid of cells, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    pub cells: Vec<Cell>,
}

impl Grid {
    /// Parse a grid from a string template, with `#` representing blocks, `.` or `_` representing
    /// empty cells, and anything else representing a letter. Surrounding whitespace and blank
    /// lines are ignored.
    pub fn from_template(template: &str) -> Result<Grid, GridError> {
        let rows: Vec<Vec<Cell>> = template
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.chars()
                    .map(|c| match c {
                        '#' => Cell::Black,
                        '.' | '_' => Cell::Empty,
                        letter => Cell::Letter(letter.to_ascii_uppercase()),
                    })
                    .collect()
            })
            .collect();

        let width = rows.first().map(Vec::len).ok_or(GridError::EmptyTemplate)?;

        for (row, cells) in rows.iter().enumerate() {
            if cells.len() != width {
                return Err(GridError::RaggedRow {
                    row,
                    expected: width,
                    found: cells.len(),
                });
            }
        }

        Ok(Grid {
            width,
            height: rows.len(),
            cells: rows.into_iter().flatten().collect(),
        })
    }

    /// An empty grid with no blocks.
    pub fn open(width: usize, height: usize) -> Grid {
        Grid {
            width,
            height,
            cells: vec![Cell::Empty; width * height],
        }
    }

    fn is_black(&self, row: isize, col: isize) -> bool {
        if row < 0 || col < 0 || row as usize >= self.height || col as usize >= self.width {
            return true;
        }
        self.cells[row as usize * self.width + col as usize] == Cell::Black
    }

    fn run_length(&self, row: usize, col: usize, direction: Direction) -> usize {
        let (dr, dc) = match direction {
            Direction::Across => (0, 1),
            Direction::Down => (1, 0),
        };
        (0..)
            .take_while(|&step| {
                !self.is_black((row + dr * step) as isize, (col + dc * step) as isize)
            })
            .count()
    }

    /// Number the grid and list its slots: every across slot in numbering order, then every down
    /// slot. A cell gets a number if it begins an across or down run of at least
    /// `MIN_SLOT_LENGTH` cells; shorter runs aren't slots.
    pub fn slots(&self) -> Vec<SlotConfig> {
        let mut across: Vec<SlotConfig> = vec![];
        let mut down: Vec<SlotConfig> = vec![];
        let mut number = 0;

        for row in 0..self.height {
            for col in 0..self.width {
                let (r, c) = (row as isize, col as isize);
                if self.is_black(r, c) {
                    continue;
                }

                let across_len = if self.is_black(r, c - 1) {
                    self.run_length(row, col, Direction::Across)
                } else {
                    0
                };
                let down_len = if self.is_black(r - 1, c) {
                    self.run_length(row, col, Direction::Down)
                } else {
                    0
                };

                let starts_across = across_len >= MIN_SLOT_LENGTH;
                let starts_down = down_len >= MIN_SLOT_LENGTH;
                if !starts_across && !starts_down {
                    continue;
                }

                number += 1;

                if starts_across {
                    across.push(SlotConfig {
                        cells: (0..across_len).map(|i| row * self.width + col + i).collect(),
                        length: across_len,
                        direction: Direction::Across,
                        number,
                    });
                }
                if starts_down {
                    down.push(SlotConfig {
                        cells: (0..down_len).map(|i| (row + i) * self.width + col).collect(),
                        length: down_len,
                        direction: Direction::Down,
                        number,
                    });
                }
            }
        }

        across.extend(down);
        across
    }

    /// Copy letters from a filled cell array (as returned by a solve) into this grid, leaving
    /// blocks alone.
    pub fn fill_from(&mut self, cells: &[Cell]) {
        for (cell, &filled) in self.cells.iter_mut().zip(cells) {
            if *cell != Cell::Black {
                if let Cell::Letter(letter) = filled {
                    *cell = Cell::Letter(letter);
                }
            }
        }
    }

    /// Render the grid in the same format `from_template` accepts.
    pub fn render(&self) -> String {
        self.cells
            .chunks(self.width.max(1))
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        Cell::Black => '#',
                        Cell::Empty => '.',
                        Cell::Letter(letter) => *letter,
                    })
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Display for Grid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}
