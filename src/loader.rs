//! This module provides the `ProgramLoader` struct, responsible for reading program
//! text from files or strings and handing it to the parser.

use crate::parser::{parse, Program};
use crate::types::EngineError;
use std::fs;
use std::path::Path;

/// `ProgramLoader` is a utility struct for loading programs.
pub struct ProgramLoader;

impl ProgramLoader {
    /// Reads the raw program text from the specified file path.
    ///
    /// The machine keeps this text so that `reset` can re-parse it.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` with the file contents.
    /// * `Err(EngineError::FileError)` if the file cannot be read.
    pub fn read_program(path: &Path) -> Result<String, EngineError> {
        fs::read_to_string(path).map_err(|e| {
            EngineError::FileError(format!("Failed to read file {}: {}", path.display(), e))
        })
    }

    /// Loads and parses a program from the specified file path.
    ///
    /// # Arguments
    ///
    /// * `path` - A reference to the `Path` of the program file to load.
    ///
    /// # Returns
    ///
    /// * `Ok(Program)` if the file is successfully read and parsed.
    /// * `Err(EngineError::FileError)` if the file cannot be read.
    /// * `Err(EngineError::ParseError)` if the file content is not a valid program.
    pub fn load_program(path: &Path) -> Result<Program, EngineError> {
        parse(&Self::read_program(path)?)
    }

    /// Parses a program from the provided string content, e.g. the output of the
    /// compiler captured in memory.
    pub fn load_program_from_string(content: &str) -> Result<Program, EngineError> {
        parse(content)
    }
}
