//! The solve controller. An `Autofill` owns a worker thread that takes `Command`s off one channel
//! and answers with `Event`s on another, so callers (a UI thread, say) never block on a fill.
//!
//! While a fill is running the worker keeps polling its command channel. `Cancel` stops the
//! current fill, which still reports `Done` with no result. A new `Solve` replaces the current
//! fill outright: the old one stops quietly, with no `Done`, and the new one starts.

use std::sync::mpsc::{self, Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::backtracking_search::{find_fill, FillMonitor, FillOptions};
use crate::error::{FillFailure, RequestError};
use crate::grid_config::{Cell, Grid, SlotConfig};

/// Solves are numbered from 1 in the order an `Autofill` receives them.
pub type SolveId = u64;

/// Everything needed to fill one grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveRequest {
    pub words: Vec<String>,
    /// Parallel to `words`. Without scores, each slot's candidates are tried in random order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<Vec<i32>>,
    pub slots: Vec<SlotConfig>,
    /// Row-major, `width` cells per row.
    pub cells: Vec<Cell>,
    pub width: usize,
}

impl SolveRequest {
    /// Build a request for `grid`, numbering its slots the usual way.
    pub fn from_grid(grid: &Grid, words: Vec<String>, scores: Option<Vec<i32>>) -> SolveRequest {
        SolveRequest {
            words,
            scores,
            slots: grid.slots(),
            cells: grid.cells.clone(),
            width: grid.width,
        }
    }

    /// Check that the request hangs together: scores line up with words, the cells make a
    /// rectangle, and every slot stays inside it.
    pub fn validate(&self) -> Result<(), RequestError> {
        if let Some(scores) = &self.scores {
            if scores.len() != self.words.len() {
                return Err(RequestError::ScoreCountMismatch {
                    words: self.words.len(),
                    scores: scores.len(),
                });
            }
        }

        if self.width == 0 {
            return Err(RequestError::ZeroWidth);
        }
        if self.cells.len() % self.width != 0 {
            return Err(RequestError::RaggedGrid {
                cells: self.cells.len(),
                width: self.width,
            });
        }

        for (slot_id, slot) in self.slots.iter().enumerate() {
            if slot.length != slot.cells.len() {
                return Err(RequestError::SlotLengthMismatch {
                    slot_id,
                    length: slot.length,
                    cells: slot.cells.len(),
                });
            }
            if let Some(&cell) = slot.cells.iter().find(|&&cell| cell >= self.cells.len()) {
                return Err(RequestError::CellOutOfRange {
                    slot_id,
                    cell,
                    cell_count: self.cells.len(),
                });
            }
        }

        Ok(())
    }
}

/// Messages into the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Solve(SolveRequest),
    Cancel,
}

/// Messages out of the worker. Every solve that isn't superseded ends with exactly one `Done`,
/// and its `Progress` events all arrive before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Progress {
        solve_id: SolveId,
        filled: usize,
        total: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Done {
        solve_id: SolveId,
        /// The filled cells, or `None` if there's no fill or we gave up.
        result: Option<Vec<Cell>>,
        /// True if the solve was cancelled or timed out, rather than proven impossible.
        interrupted: bool,
    },
}

/// Why the worker stopped polling during a solve.
enum Stop {
    Cancelled,
    Superseded(SolveRequest),
    Disconnected,
}

/// The worker's `FillMonitor`: checks for new commands and forwards progress as events.
struct CommandPoll<'a> {
    commands: &'a Receiver<Command>,
    events: &'a Sender<Event>,
    solve_id: SolveId,
    stop: Option<Stop>,
}

impl FillMonitor for CommandPoll<'_> {
    fn is_cancelled(&mut self) -> bool {
        if self.stop.is_none() {
            self.stop = match self.commands.try_recv() {
                Ok(Command::Cancel) => Some(Stop::Cancelled),
                Ok(Command::Solve(request)) => Some(Stop::Superseded(request)),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => Some(Stop::Disconnected),
            };
        }

        self.stop.is_some()
    }

    fn on_progress(&mut self, filled: usize, total: usize, message: Option<&str>) {
        // A send only fails once the controller is gone, and the next poll will notice that.
        let _ = self.events.send(Event::Progress {
            solve_id: self.solve_id,
            filled,
            total,
            message: message.map(str::to_string),
        });
    }
}

/// The message shown when a slot has no candidates at all, as in "No words fit slot 5A".
fn describe_failure(failure: &FillFailure) -> Option<String> {
    match failure {
        FillFailure::StructuralInfeasible { .. } => Some(failure.to_string()),
        _ => None,
    }
}

fn run_worker(commands: Receiver<Command>, events: Sender<Event>, options: FillOptions) {
    let mut last_solve_id: SolveId = 0;
    let mut pending: Option<SolveRequest> = None;

    loop {
        let request = match pending.take() {
            Some(request) => request,
            None => match commands.recv() {
                Ok(Command::Solve(request)) => request,
                Ok(Command::Cancel) => {
                    debug!("Ignoring cancel with no solve running");
                    continue;
                }
                Err(RecvError) => return,
            },
        };

        last_solve_id += 1;
        let solve_id = last_solve_id;
        let total = request.slots.len();

        if let Err(err) = request.validate() {
            warn!("Rejecting solve {}: {}", solve_id, err);
            let _ = events.send(Event::Progress {
                solve_id,
                filled: 0,
                total,
                message: Some(err.to_string()),
            });
            let _ = events.send(Event::Done {
                solve_id,
                result: None,
                interrupted: false,
            });
            continue;
        }

        info!(
            "Starting solve {}: {} slots, {} words",
            solve_id,
            total,
            request.words.len()
        );

        let mut poll = CommandPoll {
            commands: &commands,
            events: &events,
            solve_id,
            stop: None,
        };
        let outcome = find_fill(&request, &options, &mut poll);

        match poll.stop {
            Some(Stop::Superseded(next)) => {
                debug!("Solve {} superseded", solve_id);
                pending = Some(next);
                continue;
            }
            Some(Stop::Disconnected) => return,
            Some(Stop::Cancelled) | None => {}
        }

        let done = match outcome {
            Ok(success) => Event::Done {
                solve_id,
                result: Some(success.cells),
                interrupted: false,
            },
            Err(failure) => {
                info!("Solve {} failed: {}", solve_id, failure);
                if let Some(message) = describe_failure(&failure) {
                    let _ = events.send(Event::Progress {
                        solve_id,
                        filled: 0,
                        total,
                        message: Some(message),
                    });
                }
                Event::Done {
                    solve_id,
                    result: None,
                    interrupted: failure.is_interrupted(),
                }
            }
        };

        if events.send(done).is_err() {
            return;
        }
    }
}

/// A handle on a background fill worker. Dropping it stops any running fill and joins the
/// worker thread.
pub struct Autofill {
    commands: Option<Sender<Command>>,
    events: Receiver<Event>,
    worker: Option<JoinHandle<()>>,
    last_solve_id: SolveId,
}

impl Default for Autofill {
    fn default() -> Self {
        Autofill::new()
    }
}

impl Autofill {
    pub fn new() -> Autofill {
        Autofill::with_options(FillOptions::default())
    }

    pub fn with_options(options: FillOptions) -> Autofill {
        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        let worker = thread::spawn(move || run_worker(command_rx, event_tx, options));

        Autofill {
            commands: Some(command_tx),
            events: event_rx,
            worker: Some(worker),
            last_solve_id: 0,
        }
    }

    fn send(&self, command: Command) {
        if let Some(commands) = &self.commands {
            // If the worker has died, `recv` reports the disconnect.
            let _ = commands.send(command);
        }
    }

    /// Start filling `request`, replacing any solve that's still running. Events for this solve
    /// carry the returned id.
    pub fn solve(&mut self, request: SolveRequest) -> SolveId {
        self.last_solve_id += 1;
        self.send(Command::Solve(request));
        self.last_solve_id
    }

    /// Stop the running solve, if there is one.
    pub fn cancel(&self) {
        self.send(Command::Cancel);
    }

    pub fn recv(&self) -> Result<Event, RecvError> {
        self.events.recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Event, RecvTimeoutError> {
        self.events.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<Event, TryRecvError> {
        self.events.try_recv()
    }
}

impl Drop for Autofill {
    fn drop(&mut self) {
        self.commands.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use serde_json::json;

    use super::{Autofill, Command, Event, SolveId, SolveRequest};
    use crate::backtracking_search::FillOptions;
    use crate::error::RequestError;
    use crate::grid_config::{Cell, Direction, Grid};

    fn words(list: &str) -> Vec<String> {
        list.split_whitespace().map(str::to_string).collect()
    }

    fn seeded_autofill() -> Autofill {
        Autofill::with_options(FillOptions {
            rng_seed: Some(5),
            ..FillOptions::default()
        })
    }

    /// #.#
    /// ...
    /// #.#
    fn plus_request() -> SolveRequest {
        let grid = Grid::from_template("#.#\n...\n#.#").expect("valid template");
        SolveRequest::from_grid(&grid, words("CAT DOG CAR RAT"), Some(vec![90, 80, 70, 60]))
    }

    /// An open 21x21 grid and a dictionary of random 21-letter words. It has no fill, and
    /// proving that would take far longer than any test runs.
    fn hopeless_request() -> SolveRequest {
        let mut rng = SmallRng::seed_from_u64(21);
        let dictionary: Vec<String> = (0..500)
            .map(|_| {
                (0..21)
                    .map(|_| rng.gen_range(b'A'..=b'E') as char)
                    .collect::<String>()
            })
            .collect();
        SolveRequest::from_grid(&Grid::open(21, 21), dictionary, None)
    }

    fn events_until_done(autofill: &Autofill, solve_id: SolveId) -> Vec<Event> {
        let mut events = vec![];
        loop {
            let event = autofill
                .recv_timeout(Duration::from_secs(10))
                .expect("worker should finish the solve");
            let done = matches!(event, Event::Done { solve_id: id, .. } if id == solve_id);
            events.push(event);
            if done {
                return events;
            }
        }
    }

    #[test]
    fn test_commands_parse_from_json() {
        let command: Command = serde_json::from_value(json!({
            "type": "solve",
            "words": ["CAT", "DOG"],
            "scores": [90, 80],
            "slots": [{ "cells": [0, 1, 2], "length": 3, "direction": "across", "number": 1 }],
            "cells": ["", "#", "T"],
            "width": 3,
        }))
        .expect("valid solve command");

        let Command::Solve(request) = command else {
            panic!("expected a solve command");
        };
        assert_eq!(request.words, vec!["CAT", "DOG"]);
        assert_eq!(request.scores, Some(vec![90, 80]));
        assert_eq!(request.slots[0].direction, Direction::Across);
        assert_eq!(request.cells, vec![Cell::Empty, Cell::Black, Cell::Letter('T')]);

        let unscored: Command = serde_json::from_value(json!({
            "type": "solve",
            "words": [],
            "slots": [],
            "cells": [],
            "width": 1,
        }))
        .expect("scores are optional");
        assert!(matches!(unscored, Command::Solve(SolveRequest { scores: None, .. })));

        let cancel: Command =
            serde_json::from_value(json!({ "type": "cancel" })).expect("valid cancel command");
        assert_eq!(cancel, Command::Cancel);

        assert!(serde_json::from_value::<Command>(json!({
            "type": "solve",
            "words": [],
            "slots": [],
            "cells": ["AB"],
            "width": 1,
        }))
        .is_err());
    }

    #[test]
    fn test_events_serialize_to_json() {
        let done = Event::Done {
            solve_id: 3,
            result: Some(vec![Cell::Letter('A'), Cell::Black, Cell::Empty]),
            interrupted: false,
        };
        assert_eq!(
            serde_json::to_value(&done).expect("serializable"),
            json!({ "type": "done", "solve_id": 3, "result": ["A", "#", ""], "interrupted": false })
        );

        let progress = Event::Progress {
            solve_id: 3,
            filled: 4,
            total: 10,
            message: None,
        };
        assert_eq!(
            serde_json::to_value(&progress).expect("serializable"),
            json!({ "type": "progress", "solve_id": 3, "filled": 4, "total": 10 })
        );

        let failed = Event::Done {
            solve_id: 4,
            result: None,
            interrupted: true,
        };
        assert_eq!(
            serde_json::to_value(&failed).expect("serializable"),
            json!({ "type": "done", "solve_id": 4, "result": null, "interrupted": true })
        );
    }

    #[test]
    fn test_validation() {
        assert_eq!(plus_request().validate(), Ok(()));

        let mut request = plus_request();
        request.scores = Some(vec![1]);
        assert_eq!(
            request.validate(),
            Err(RequestError::ScoreCountMismatch { words: 4, scores: 1 })
        );

        let mut request = plus_request();
        request.width = 2;
        assert_eq!(
            request.validate(),
            Err(RequestError::RaggedGrid { cells: 9, width: 2 })
        );

        let mut request = plus_request();
        request.slots[1].cells[2] = 9;
        assert_eq!(
            request.validate(),
            Err(RequestError::CellOutOfRange { slot_id: 1, cell: 9, cell_count: 9 })
        );

        let mut request = plus_request();
        request.slots[0].length = 4;
        assert!(matches!(
            request.validate(),
            Err(RequestError::SlotLengthMismatch { slot_id: 0, .. })
        ));
    }

    #[test]
    fn test_solve_reports_progress_then_done() {
        let mut autofill = seeded_autofill();
        let request = plus_request();

        let solve_id = autofill.solve(request.clone());
        assert_eq!(solve_id, 1);

        let events = events_until_done(&autofill, solve_id);

        let (last, earlier) = events.split_last().expect("at least a done event");
        assert!(!earlier.is_empty());
        assert!(earlier.iter().all(|event| matches!(
            event,
            Event::Progress { solve_id: 1, total: 2, .. }
        )));

        let Event::Done { result: Some(cells), interrupted: false, .. } = last else {
            panic!("expected a fill, got {last:?}");
        };
        // The two slots share the middle cell, and the blocks stay put.
        assert!(matches!(cells[4], Cell::Letter(_)));
        assert_eq!(cells[0], Cell::Black);
        assert_eq!(cells.iter().filter(|&&cell| cell == Cell::Black).count(), 4);
    }

    #[test]
    fn test_structural_failure_names_the_slot() {
        let mut autofill = seeded_autofill();
        let grid = Grid::from_template("....\n#..#\n#..#").expect("valid template");

        let solve_id = autofill.solve(SolveRequest::from_grid(&grid, words("CAT DOG"), None));
        let events = events_until_done(&autofill, solve_id);

        assert_eq!(
            events,
            vec![
                Event::Progress {
                    solve_id,
                    filled: 0,
                    total: 3,
                    message: Some("No words fit slot 1A".to_string()),
                },
                Event::Done {
                    solve_id,
                    result: None,
                    interrupted: false,
                },
            ]
        );
    }

    #[test]
    fn test_invalid_request_is_rejected() {
        let mut autofill = seeded_autofill();
        let mut request = plus_request();
        request.width = 0;

        let solve_id = autofill.solve(request);
        let events = events_until_done(&autofill, solve_id);

        assert_eq!(
            events,
            vec![
                Event::Progress {
                    solve_id,
                    filled: 0,
                    total: 2,
                    message: Some("grid width must be positive".to_string()),
                },
                Event::Done {
                    solve_id,
                    result: None,
                    interrupted: false,
                },
            ]
        );
    }

    #[test]
    fn test_cancel_stops_a_long_solve() {
        let mut autofill = Autofill::new();

        let solve_id = autofill.solve(hopeless_request());
        autofill.cancel();

        let events = events_until_done(&autofill, solve_id);

        assert!(matches!(
            events.last(),
            Some(Event::Done {
                result: None,
                interrupted: true,
                ..
            })
        ));
    }

    #[test]
    fn test_cancel_while_idle_is_ignored() {
        let mut autofill = seeded_autofill();

        autofill.cancel();
        let solve_id = autofill.solve(plus_request());
        let events = events_until_done(&autofill, solve_id);

        assert!(matches!(
            events.last(),
            Some(Event::Done { result: Some(_), .. })
        ));
    }

    #[test]
    fn test_new_solve_supersedes_running_one() {
        let mut autofill = seeded_autofill();

        let first = autofill.solve(hopeless_request());
        let second = autofill.solve(plus_request());
        assert_eq!((first, second), (1, 2));

        let events = events_until_done(&autofill, second);

        assert!(!events
            .iter()
            .any(|event| matches!(event, Event::Done { solve_id, .. } if *solve_id == first)));
        assert!(matches!(
            events.last(),
            Some(Event::Done { result: Some(_), interrupted: false, .. })
        ));
    }
}
