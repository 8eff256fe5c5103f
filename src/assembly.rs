//! Source correlation between the running machine and the assembly listing it was
//! compiled from. Every `#asm` directive becomes one [`AssemblySourceLine`]; the
//! [`AssemblyListing`] tracks which block is executing and freezes a copy of the
//! tape sections whenever a block completes.

use serde::{Deserialize, Serialize};

use crate::sections::TapeSection;
use crate::types::{AsmStatus, EngineError};

/// One `#asm` block of the program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblySourceLine {
    /// The assembly text following the directive.
    pub text: String,
    pub status: AsmStatus,
    /// Execution pauses while this line is current and the flag is set.
    pub breakpoint: bool,
    /// Sections as they were when the block completed. Empty until then.
    pub sections: Vec<TapeSection>,
}

impl AssemblySourceLine {
    pub fn new(text: String, status: AsmStatus) -> Self {
        Self {
            text,
            status,
            breakpoint: false,
            sections: Vec::new(),
        }
    }
}

/// The ordered assembly listing together with the ordinal of the block being executed.
///
/// Ordinals are 1-based: ordinal `k` names `lines[k - 1]` and ordinal 0 names no line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyListing {
    lines: Vec<AssemblySourceLine>,
    current: usize,
}

impl AssemblyListing {
    pub fn new(lines: Vec<AssemblySourceLine>) -> Self {
        Self { lines, current: 0 }
    }

    pub fn lines(&self) -> &[AssemblySourceLine] {
        &self.lines
    }

    /// Ordinal of the block the last executed instruction belonged to.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// The line whose status is [`AsmStatus::Current`], if any.
    pub fn current_line(&self) -> Option<&AssemblySourceLine> {
        self.lines
            .iter()
            .find(|line| line.status == AsmStatus::Current)
    }

    /// Returns `true` when the current line carries a breakpoint.
    pub fn at_breakpoint(&self) -> bool {
        self.current_line().is_some_and(|line| line.breakpoint)
    }

    /// Flips the breakpoint flag of the line at `index` (0-based).
    pub fn toggle_breakpoint(&mut self, index: usize) -> Result<bool, EngineError> {
        let line = self
            .lines
            .get_mut(index)
            .ok_or(EngineError::InvalidBreakpoint(index))?;

        line.breakpoint = !line.breakpoint;
        Ok(line.breakpoint)
    }

    /// Moves execution to the block with ordinal `target`.
    ///
    /// Every current line is completed with a copy of `sections`, then the target line
    /// (if it exists) becomes current. When the target is already current only the
    /// tracked ordinal changes. Passing 0 finalizes the open block without opening another.
    pub fn advance(&mut self, target: usize, sections: &[TapeSection]) {
        let entry = target.checked_sub(1);

        let already_current = entry
            .and_then(|i| self.lines.get(i))
            .is_some_and(|line| line.status == AsmStatus::Current);

        if !already_current {
            for line in &mut self.lines {
                if line.status == AsmStatus::Current {
                    line.status = AsmStatus::Completed;
                    line.sections = sections.to_vec();
                }
            }

            if let Some(line) = entry.and_then(|i| self.lines.get_mut(i)) {
                line.status = AsmStatus::Current;
            }

            log::debug!("assembly block {} -> {}", self.current, target);
        }

        self.current = target;
    }
}
