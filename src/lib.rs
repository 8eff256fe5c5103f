//! This crate provides the execution engine for compiled Turing machine programs.
//! It includes modules for parsing program text, partitioning the tape into decoded
//! sections, stepping forward and backward with breakpoints, and driving timed runs
//! while correlating execution with the assembly listing the program was built from.

pub mod assembly;
pub mod config;
pub mod history;
pub mod loader;
pub mod machine;
pub mod parser;
pub mod runner;
pub mod sections;
pub mod types;

/// Re-exports the `Rule` enum from the parser module, used by the `pest` grammar.
pub use crate::parser::Rule;
/// Re-exports the assembly listing types.
pub use assembly::{AssemblyListing, AssemblySourceLine};
/// Re-exports the engine configuration.
pub use config::EngineConfig;
/// Re-exports the `ProgramLoader` struct from the loader module.
pub use loader::ProgramLoader;
/// Re-exports the engine and its published snapshot.
pub use machine::{Snapshot, SubscriptionId, TuringMachine};
/// Re-exports the `parse` function and parsed `Program` from the parser module.
pub use parser::{parse, Program};
/// Re-exports the run task handle.
pub use runner::Task;
/// Re-exports the section analyzer entry points.
pub use sections::{build_sections, decode, update_sections, SectionColor, TapeSection};
/// Re-exports the core types.
pub use types::{
    AsmStatus, Direction, EngineError, Instruction, InstructionTable, RunOutcome, RunStatus,
    Symbol, MAX_PROGRAM_SIZE,
};
