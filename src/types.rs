//! This module defines the core data structures and types used throughout the engine,
//! including tape symbols, transitions, run status, and error types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::Rule;

/// A single tape cell value.
pub type Symbol = u32;

/// Binary zero.
pub const ZERO: Symbol = 0;
/// Binary one.
pub const ONE: Symbol = 1;
/// Marks the beginning of the `A` working register.
pub const MARKER_A: Symbol = 2;
/// Marks the beginning of the `B` working register.
pub const MARKER_B: Symbol = 3;
/// Marks the beginning of the `C` working register.
pub const MARKER_C: Symbol = 4;
/// Separator cell. Belongs to no section.
pub const SEPARATOR: Symbol = 5;
/// Marks the beginning of a generic storage cell.
pub const STORAGE_MARKER: Symbol = 6;

/// The state every freshly loaded machine starts in.
pub const START_STATE: &str = "START";
/// The distinguished state that stops a run.
pub const HALT_STATE: &str = "END";
/// Output shown until a run completes, or when there is no `A` section.
pub const NO_OUTPUT: &str = "?";
/// The maximum allowed size for a program text in bytes.
pub const MAX_PROGRAM_SIZE: usize = 1 << 20; // 1MB

/// Represents the possible directions the head can move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Move the head one position to the left.
    Left,
    /// Move the head one position to the right.
    Right,
    /// Keep the head in the same position.
    Stay,
}

impl Direction {
    /// Signed head displacement of this move.
    pub fn offset(self) -> i64 {
        match self {
            Direction::Left => -1,
            Direction::Right => 1,
            Direction::Stay => 0,
        }
    }

    /// Applies the move to `head`, returning `None` when it would leave `[0, len)`.
    pub fn apply(self, head: usize, len: usize) -> Option<usize> {
        let next = match self {
            Direction::Left => head.checked_sub(1)?,
            Direction::Right => head + 1,
            Direction::Stay => head,
        };

        (next < len).then_some(next)
    }
}

/// A single transition, identified by the `(state, read)` pair it is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    /// The symbol written under the head.
    pub write: Symbol,
    /// Where the head moves after writing.
    pub direction: Direction,
    /// The state the machine transitions to.
    pub next_state: String,
    /// Ordinal of the `#asm` block this instruction was emitted for (0 before the first one).
    pub source_index: usize,
}

/// Lookup table from `(state, read symbol)` to the transition to apply.
pub type InstructionTable = HashMap<(String, Symbol), Instruction>;

/// Whether the run loop is currently active.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// A periodic task is live.
    Running,
    /// No task is scheduled.
    #[default]
    Paused,
}

/// Why an unthrottled run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// The halt state was reached and the output extracted.
    Halted,
    /// The current assembly line carries a breakpoint.
    Breakpoint,
    /// A step failed; the message is in the published `error` field.
    Error,
    /// The step budget ran out before the machine halted.
    StepLimit,
}

/// Progress of an assembly listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsmStatus {
    /// Not reached yet.
    Pending,
    /// The block currently executing.
    Current,
    /// Finished; its section snapshot is frozen.
    Completed,
}

/// Represents various errors that can occur while loading or executing a program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Indicates a syntax error in the program text.
    #[error("Program parsing error: {0}")]
    ParseError(#[from] Box<pest::error::Error<Rule>>),
    /// Indicates a line that is well-formed syntactically but cannot be loaded.
    #[error("Malformed program line {line}: {message}")]
    MalformedProgramLine { line: usize, message: String },
    /// Indicates that there's no instruction for the current state and symbol.
    #[error("No instruction for state {state} and read {symbol}")]
    MissingTransition { state: String, symbol: Symbol },
    /// Indicates that the head left the tape.
    #[error("Head out of bounds: position {head} on a tape of length {len}")]
    HeadOutOfBounds { head: i64, len: usize },
    /// Indicates a breakpoint index outside the assembly listing.
    #[error("No assembly line at index {0}")]
    InvalidBreakpoint(usize),
    /// Indicates a run speed outside the supported range.
    #[error("Invalid speed: {0}")]
    InvalidSpeed(u32),
    /// Indicates an operation that needs a loaded program.
    #[error("No program loaded")]
    NotReady,
    /// Indicates an error related to file system operations.
    #[error("File error: {0}")]
    FileError(String),
    /// Indicates an unreadable or invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}
