//! This module defines the `TuringMachine` struct, the execution engine. It owns the
//! tape, the instruction table, the section layout and the assembly listing, applies
//! transitions one at a time, keeps the step-back history and drives timed runs.
//!
//! Runtime errors never escape [`TuringMachine::step`]; they are recorded in the
//! published `error` field and the machine pauses, so a host can show them and keep going.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::assembly::{AssemblyListing, AssemblySourceLine};
use crate::config::EngineConfig;
use crate::history::{History, HistoryEntry};
use crate::loader::ProgramLoader;
use crate::parser::{parse, Program};
use crate::runner::{RunController, Task};
use crate::sections::{build_sections, update_sections, TapeSection};
use crate::types::{EngineError, InstructionTable, RunOutcome, RunStatus, Symbol, NO_OUTPUT};

/// Identifies a registered listener.
pub type SubscriptionId = usize;

type Listener = Box<dyn FnMut(&Snapshot)>;

/// Everything the engine publishes, as one value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tape: Vec<Symbol>,
    pub head: usize,
    pub state: String,
    pub step_count: usize,
    pub ready: bool,
    pub status: RunStatus,
    pub speed: u32,
    pub error: Option<String>,
    /// The high-level program reassembled from `#program` directives.
    pub source: String,
    /// `"{state}-{symbol under head}"` after the last step.
    pub current_instruction: String,
    pub output: String,
    pub sections: Vec<TapeSection>,
    pub assembly: Vec<AssemblySourceLine>,
    pub current_asm_index: usize,
}

/// The Turing machine engine.
///
/// A single instance owns all mutable state. Hosts observe it through
/// [`subscribe`](Self::subscribe) or [`snapshot`](Self::snapshot) and drive timed runs
/// by calling [`tick`](Self::tick) with the [`Task`] returned from [`run`](Self::run).
pub struct TuringMachine {
    config: EngineConfig,
    instructions: InstructionTable,
    tape: Vec<Symbol>,
    head: usize,
    state: String,
    step_count: usize,
    sections: Vec<TapeSection>,
    assembly: AssemblyListing,
    current_instruction: String,
    output: String,
    error: Option<String>,
    source: String,
    ready: bool,
    program_text: Option<String>,
    history: History,
    runner: RunController,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: SubscriptionId,
}

impl Default for TuringMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TuringMachine {
    /// Creates an empty, not-ready machine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an empty, not-ready machine.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            instructions: InstructionTable::new(),
            tape: Vec::new(),
            head: 0,
            state: config.start_state.clone(),
            step_count: 0,
            sections: Vec::new(),
            assembly: AssemblyListing::default(),
            current_instruction: String::new(),
            output: NO_OUTPUT.to_string(),
            error: None,
            source: String::new(),
            ready: false,
            program_text: None,
            history: History::new(config.history_limit),
            runner: RunController::new(config.default_speed, config.max_speed, config.burst_steps),
            listeners: Vec::new(),
            next_subscription: 0,
            config,
        }
    }

    /// Loads a program from text, replacing whatever was loaded before.
    ///
    /// The text is kept so that [`reset`](Self::reset) can re-parse it. On failure the
    /// machine is left cleared and not ready, and the error is also recorded in the
    /// published `error` field.
    pub fn load(&mut self, text: &str) -> Result<(), EngineError> {
        self.clear_state();
        self.program_text = Some(text.to_string());

        let result = parse(text).map(|program| self.install(program));
        if let Err(e) = &result {
            log::warn!("failed to load program: {e}");
            self.ready = false;
            self.error = Some(e.to_string());
        }

        self.publish();
        result
    }

    /// Reads a program file and loads it.
    pub fn load_file(&mut self, path: &Path) -> Result<(), EngineError> {
        let text = ProgramLoader::read_program(path)?;
        self.load(&text)
    }

    fn install(&mut self, program: Program) {
        log::info!(
            "loaded program: {} tape cells, {} instructions, {} assembly lines",
            program.tape.len(),
            program.instructions.len(),
            program.assembly.len()
        );

        self.tape = program.tape;
        self.head = program.head;
        self.instructions = program.instructions;
        self.assembly = AssemblyListing::new(program.assembly);
        self.source = program.source;
        self.sections = build_sections(&self.tape);
        update_sections(&mut self.sections, &self.tape);
        self.ready = true;
    }

    /// Executes a single transition.
    ///
    /// Does nothing on a machine that is not ready. A missing transition, an
    /// out-of-bounds head or a breakpoint on the current assembly line pauses the
    /// machine without touching the tape, head or state.
    pub fn step(&mut self) {
        if !self.ready {
            return;
        }

        self.apply_step();
        self.publish();
    }

    /// Applies one transition. Returns why the machine stopped instead, if it did.
    fn apply_step(&mut self) -> Option<RunOutcome> {
        let len = self.tape.len();

        let Some(&symbol) = self.tape.get(self.head) else {
            self.fail(EngineError::HeadOutOfBounds {
                head: self.head as i64,
                len,
            });
            return Some(RunOutcome::Error);
        };

        let key = (self.state.clone(), symbol);
        let Some(instruction) = self.instructions.get(&key).cloned() else {
            self.fail(EngineError::MissingTransition {
                state: key.0,
                symbol,
            });
            return Some(RunOutcome::Error);
        };

        if self.assembly.at_breakpoint() {
            log::debug!("breakpoint hit at step {}", self.step_count);
            self.runner.cancel();
            return Some(RunOutcome::Breakpoint);
        }

        let Some(next_head) = instruction.direction.apply(self.head, len) else {
            self.fail(EngineError::HeadOutOfBounds {
                head: self.head as i64 + instruction.direction.offset(),
                len,
            });
            return Some(RunOutcome::Error);
        };

        let entry = self.capture();
        self.history.push(entry);

        self.tape[self.head] = instruction.write;
        self.head = next_head;
        self.state = instruction.next_state;
        self.step_count += 1;
        self.current_instruction = format!("{}-{}", self.state, self.tape[self.head]);
        update_sections(&mut self.sections, &self.tape);

        log::trace!(
            "step {}: {}-{} -> {}",
            self.step_count,
            key.0,
            symbol,
            self.current_instruction
        );

        if instruction.source_index != self.assembly.current_index() {
            self.assembly.advance(instruction.source_index, &self.sections);
        }

        None
    }

    fn fail(&mut self, error: EngineError) {
        log::warn!("{error}");
        self.error = Some(error.to_string());
        self.runner.cancel();
    }

    /// Undoes the most recent step. A no-op when there is nothing to undo.
    pub fn step_back(&mut self) {
        if let Some(entry) = self.history.pop() {
            self.restore(entry);
            self.error = None;
            update_sections(&mut self.sections, &self.tape);
            log::debug!("stepped back to step {}", self.step_count);
        }

        self.publish();
    }

    fn capture(&self) -> HistoryEntry {
        HistoryEntry {
            state: self.state.clone(),
            head: self.head,
            tape: self.tape.clone(),
            current_instruction: self.current_instruction.clone(),
            assembly: self.assembly.clone(),
            step_count: self.step_count,
        }
    }

    fn restore(&mut self, entry: HistoryEntry) {
        self.state = entry.state;
        self.head = entry.head;
        self.tape = entry.tape;
        self.current_instruction = entry.current_instruction;
        self.assembly = entry.assembly;
        self.step_count = entry.step_count;
    }

    /// Starts a timed run and returns the handle to pass to [`tick`](Self::tick).
    ///
    /// Returns the live handle if already running, or `None` if nothing is loaded.
    pub fn run(&mut self) -> Option<Task> {
        if !self.ready {
            return None;
        }

        let task = self.runner.start();
        self.publish();
        Some(task)
    }

    /// Performs one tick of the run loop.
    ///
    /// Ticks from a cancelled handle are ignored. Otherwise the machine takes one step,
    /// or a whole burst at maximum speed, stopping as soon as it pauses itself or
    /// reaches the halt state. Returns `true` while the task should keep being scheduled.
    pub fn tick(&mut self, task: Task) -> bool {
        if !self.runner.is_live(&task) {
            return false;
        }

        for _ in 0..self.runner.steps_per_tick() {
            if self.is_halted() {
                self.finish();
                break;
            }
            if self.apply_step().is_some() {
                break;
            }
        }

        if self.runner.is_running() && self.is_halted() {
            self.finish();
        }

        self.publish();
        self.runner.is_running()
    }

    /// Runs without a timer until the machine halts, stops itself, or has taken
    /// `max_steps` steps.
    ///
    /// Any live task is cancelled first and listeners are notified once, at the end.
    pub fn run_to_completion(&mut self, max_steps: usize) -> Result<RunOutcome, EngineError> {
        if !self.ready {
            return Err(EngineError::NotReady);
        }

        self.runner.cancel();
        let start = self.step_count;

        let mut outcome = None;
        for _ in 0..max_steps {
            if self.is_halted() {
                break;
            }
            if let Some(stop) = self.apply_step() {
                outcome = Some(stop);
                break;
            }
        }

        let outcome = match outcome {
            Some(stop) => stop,
            None if self.is_halted() => {
                self.finish();
                RunOutcome::Halted
            }
            None => {
                log::warn!("step limit of {max_steps} reached in state {}", self.state);
                RunOutcome::StepLimit
            }
        };

        log::debug!("unthrottled run took {} steps: {:?}", self.step_count - start, outcome);
        self.publish();
        Ok(outcome)
    }

    /// Halt procedure: closes the open assembly block and extracts the output from
    /// section `A`.
    fn finish(&mut self) {
        self.runner.cancel();
        self.assembly.advance(0, &self.sections);
        update_sections(&mut self.sections, &self.tape);

        self.output = self
            .sections
            .iter()
            .find(|section| section.name == "A")
            .map(|section| section.value.clone())
            .unwrap_or_else(|| NO_OUTPUT.to_string());

        log::info!(
            "halted after {} steps with output {}",
            self.step_count,
            self.output
        );
    }

    /// Stops the run loop.
    pub fn pause(&mut self) {
        self.runner.cancel();
        self.publish();
    }

    /// Changes the run speed (ticks per second, `1..=max_speed`).
    ///
    /// When running, the task is restarted and the new handle is returned.
    pub fn set_speed(&mut self, speed: u32) -> Result<Option<Task>, EngineError> {
        let task = self.runner.set_speed(speed)?;
        self.publish();
        Ok(task)
    }

    /// Toggles the breakpoint on the assembly line at `index`, returning the new flag.
    pub fn set_breakpoint(&mut self, index: usize) -> Result<bool, EngineError> {
        let enabled = self.assembly.toggle_breakpoint(index)?;
        self.publish();
        Ok(enabled)
    }

    /// Cancels any run and returns every field to its empty default.
    pub fn clear(&mut self) {
        self.clear_state();
        self.publish();
    }

    fn clear_state(&mut self) {
        self.runner.reset(self.config.default_speed);
        self.instructions.clear();
        self.tape.clear();
        self.head = 0;
        self.state = self.config.start_state.clone();
        self.step_count = 0;
        self.output = NO_OUTPUT.to_string();
        self.error = None;
        self.source.clear();
        self.history.clear();
        self.assembly = AssemblyListing::default();
        self.sections.clear();
        self.current_instruction.clear();
    }

    /// Clears the machine and re-parses the program text it was last loaded with.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        match self.program_text.take() {
            Some(text) => self.load(&text),
            None => {
                self.clear();
                Err(EngineError::NotReady)
            }
        }
    }

    /// Clears the machine, marks it not ready and forgets the program text.
    pub fn delete(&mut self) {
        self.clear_state();
        self.ready = false;
        self.program_text = None;
        self.publish();
    }

    /// Registers a listener called with a fresh [`Snapshot`] after every command.
    pub fn subscribe(&mut self, listener: impl FnMut(&Snapshot) + 'static) -> SubscriptionId {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(other, _)| *other != id);
        self.listeners.len() != before
    }

    fn publish(&mut self) {
        if self.listeners.is_empty() {
            return;
        }

        let snapshot = self.snapshot();
        for (_, listener) in self.listeners.iter_mut() {
            listener(&snapshot);
        }
    }

    /// Builds a copy of every published field.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tape: self.tape.clone(),
            head: self.head,
            state: self.state.clone(),
            step_count: self.step_count,
            ready: self.ready,
            status: self.runner.status(),
            speed: self.runner.speed(),
            error: self.error.clone(),
            source: self.source.clone(),
            current_instruction: self.current_instruction.clone(),
            output: self.output.clone(),
            sections: self.sections.clone(),
            assembly: self.assembly.lines().to_vec(),
            current_asm_index: self.assembly.current_index(),
        }
    }

    /// Checks if the machine is in the configured halt state.
    pub fn is_halted(&self) -> bool {
        self.state == self.config.halt_state
    }

    /// The live run task, if running.
    pub fn task(&self) -> Option<Task> {
        self.runner.task()
    }

    pub fn tape(&self) -> &[Symbol] {
        &self.tape
    }

    pub fn head(&self) -> usize {
        self.head
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn status(&self) -> RunStatus {
        self.runner.status()
    }

    pub fn speed(&self) -> u32 {
        self.runner.speed()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn current_instruction(&self) -> &str {
        &self.current_instruction
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn sections(&self) -> &[TapeSection] {
        &self.sections
    }

    pub fn assembly(&self) -> &[AssemblySourceLine] {
        self.assembly.lines()
    }

    pub fn current_asm_index(&self) -> usize {
        self.assembly.current_index()
    }

    pub fn instructions(&self) -> &InstructionTable {
        &self.instructions
    }

    /// Number of steps that can currently be undone.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AsmStatus;
    use std::cell::RefCell;
    use std::rc::Rc;

    // Increments register A (011 -> 100) in two assembly blocks, 8 steps in total.
    const INCREMENT: &str = "5 !2 0 1 1 3 0 0 0 4 5
#program let a = 3;
#program return a + 1;
#asm SEEK A
START 2 2 R seek
seek 0 0 R seek
seek 1 1 R seek
seek 3 3 L carry
#asm INC A
carry 1 0 L carry
carry 0 1 S END
";

    fn loaded() -> TuringMachine {
        let mut machine = TuringMachine::new();
        machine.load(INCREMENT).unwrap();
        machine
    }

    fn run_to_end(machine: &mut TuringMachine) -> usize {
        let mut ticks = 0;
        let mut task = machine.run();
        while let Some(t) = task {
            ticks += 1;
            if !machine.tick(t) {
                break;
            }
            task = machine.task();
        }
        ticks
    }

    fn statuses(machine: &TuringMachine) -> Vec<AsmStatus> {
        machine.assembly().iter().map(|line| line.status).collect()
    }

    #[test]
    fn test_load() {
        let machine = loaded();

        assert!(machine.is_ready());
        assert_eq!(machine.tape(), &[5, 2, 0, 1, 1, 3, 0, 0, 0, 4, 5]);
        assert_eq!(machine.head(), 1);
        assert_eq!(machine.state(), "START");
        assert_eq!(machine.step_count(), 0);
        assert_eq!(machine.status(), RunStatus::Paused);
        assert_eq!(machine.output(), "?");
        assert_eq!(machine.source(), "let a = 3;\nreturn a + 1;\n");
        assert_eq!(machine.instructions().len(), 6);
        assert_eq!(statuses(&machine), vec![AsmStatus::Current, AsmStatus::Pending]);

        let sections: Vec<_> = machine
            .sections()
            .iter()
            .map(|s| (s.name.as_str(), s.value.as_str()))
            .collect();
        assert_eq!(sections, vec![("A", "3"), ("B", "0")]);
    }

    #[test]
    fn test_load_head_marker() {
        let mut machine = TuringMachine::new();
        machine.load("0 1 !1 0 1").unwrap();

        assert_eq!(machine.tape(), &[0, 1, 1, 0, 1]);
        assert_eq!(machine.head(), 2);
    }

    #[test]
    fn test_load_failure_is_recorded() {
        let mut machine = loaded();
        let result = machine.load("0 1\nbroken line");

        assert!(matches!(result, Err(EngineError::ParseError(_))));
        assert!(!machine.is_ready());
        assert!(machine.error().is_some());
        assert!(machine.tape().is_empty());
    }

    #[test]
    fn test_single_step() {
        let mut machine = loaded();
        machine.step();

        assert_eq!(machine.state(), "seek");
        assert_eq!(machine.head(), 2);
        assert_eq!(machine.step_count(), 1);
        assert_eq!(machine.current_instruction(), "seek-0");
        assert_eq!(machine.current_asm_index(), 1);
        assert_eq!(statuses(&machine), vec![AsmStatus::Current, AsmStatus::Pending]);
        assert_eq!(machine.history_len(), 1);
    }

    #[test]
    fn test_step_crosses_assembly_block() {
        let mut machine = loaded();
        for _ in 0..6 {
            machine.step();
        }

        assert_eq!(machine.current_asm_index(), 2);
        assert_eq!(
            statuses(&machine),
            vec![AsmStatus::Completed, AsmStatus::Current]
        );
        // Snapshot taken right after the first INC step wrote 0 over the low bit.
        assert_eq!(machine.assembly()[0].sections[0].value, "2");
    }

    #[test]
    fn test_missing_transition() {
        let mut machine = TuringMachine::new();
        machine.load("5 !0 1 5").unwrap();
        machine.step();

        assert_eq!(
            machine.error(),
            Some("No instruction for state START and read 0")
        );
        assert_eq!(machine.tape(), &[5, 0, 1, 5]);
        assert_eq!(machine.head(), 1);
        assert_eq!(machine.state(), "START");
        assert_eq!(machine.step_count(), 0);
        assert_eq!(machine.status(), RunStatus::Paused);
        assert_eq!(machine.history_len(), 0);
    }

    #[test]
    fn test_missing_transition_stops_run() {
        let mut machine = TuringMachine::new();
        machine.load("5 !0 1 5\nSTART 0 0 R next").unwrap();

        let task = machine.run().unwrap();
        assert!(machine.tick(task));
        assert!(!machine.tick(task));

        assert_eq!(machine.status(), RunStatus::Paused);
        assert_eq!(machine.step_count(), 1);
        assert!(machine.error().unwrap().contains("state next"));
    }

    #[test]
    fn test_head_out_of_bounds() {
        let mut machine = TuringMachine::new();
        machine.load("!0 1\nSTART 0 1 L END").unwrap();
        machine.step();

        assert_eq!(
            machine.error(),
            Some("Head out of bounds: position -1 on a tape of length 2")
        );
        assert_eq!(machine.tape(), &[0, 1]);
        assert_eq!(machine.head(), 0);
        assert_eq!(machine.step_count(), 0);
    }

    #[test]
    fn test_head_out_of_bounds_on_the_right() {
        let mut machine = TuringMachine::new();
        machine.load("5 !1\nSTART 1 0 R END").unwrap();
        machine.step();

        assert_eq!(
            machine.error(),
            Some("Head out of bounds: position 2 on a tape of length 2")
        );
        assert_eq!(machine.tape(), &[5, 1]);
        assert_eq!(machine.head(), 1);
        assert_eq!(machine.state(), "START");
        assert_eq!(machine.step_count(), 0);
        assert_eq!(machine.history_len(), 0);
    }

    #[test]
    fn test_step_on_empty_tape() {
        let mut machine = TuringMachine::new();
        machine.load("").unwrap();
        machine.step();

        assert!(machine.error().unwrap().contains("Head out of bounds"));
    }

    #[test]
    fn test_step_when_not_ready() {
        let mut machine = TuringMachine::new();
        machine.step();

        assert_eq!(machine.error(), None);
        assert_eq!(machine.run(), None);
    }

    #[test]
    fn test_step_back_restores_initial_snapshot() {
        // Covers both block boundaries, the halting step and a failing step past END.
        for n in 0..=9 {
            let mut machine = loaded();
            let initial = machine.snapshot();

            for _ in 0..n {
                machine.step();
            }
            for _ in 0..n {
                machine.step_back();
            }
            assert_eq!(machine.snapshot(), initial, "after {n} steps");

            machine.step_back();
            assert_eq!(machine.snapshot(), initial, "after {n} steps");
        }
    }

    #[test]
    fn test_step_back_clears_error() {
        let mut machine = TuringMachine::new();
        machine.load("5 !0 1 5\nSTART 0 0 R next").unwrap();
        machine.step();
        machine.step();
        assert!(machine.error().is_some());

        machine.step_back();
        assert_eq!(machine.error(), None);
        assert_eq!(machine.state(), "START");
        assert_eq!(machine.head(), 1);
    }

    #[test]
    fn test_step_after_step_back_overwrites_branch() {
        let mut machine = loaded();
        machine.step();
        machine.step();
        machine.step_back();
        machine.step();

        assert_eq!(machine.step_count(), 2);
        assert_eq!(machine.history_len(), 2);
    }

    #[test]
    fn test_run_to_halt() {
        let mut machine = loaded();
        let ticks = run_to_end(&mut machine);

        assert_eq!(ticks, 8);
        assert_eq!(machine.state(), "END");
        assert_eq!(machine.step_count(), 8);
        assert_eq!(machine.status(), RunStatus::Paused);
        assert_eq!(machine.task(), None);
        assert_eq!(machine.output(), "4");
        assert_eq!(machine.current_asm_index(), 0);
        assert_eq!(
            statuses(&machine),
            vec![AsmStatus::Completed, AsmStatus::Completed]
        );
        assert_eq!(machine.assembly()[1].sections[0].value, "4");
        assert_eq!(machine.error(), None);
    }

    #[test]
    fn test_run_at_max_speed_uses_bursts() {
        let mut machine = loaded();
        machine.set_speed(1000).unwrap();

        let ticks = run_to_end(&mut machine);

        assert_eq!(ticks, 1);
        assert_eq!(machine.step_count(), 8);
        assert_eq!(machine.output(), "4");
    }

    #[test]
    fn test_run_to_completion() {
        let mut machine = loaded();
        let task = machine.run().unwrap();

        assert_eq!(machine.run_to_completion(100), Ok(RunOutcome::Halted));
        assert_eq!(machine.state(), "END");
        assert_eq!(machine.step_count(), 8);
        assert_eq!(machine.output(), "4");
        assert_eq!(machine.status(), RunStatus::Paused);
        assert_eq!(
            statuses(&machine),
            vec![AsmStatus::Completed, AsmStatus::Completed]
        );
        assert!(!machine.tick(task));
    }

    #[test]
    fn test_run_to_completion_stops_at_breakpoint() {
        let mut machine = loaded();
        machine.set_breakpoint(1).unwrap();

        assert_eq!(machine.run_to_completion(100), Ok(RunOutcome::Breakpoint));
        assert_eq!(machine.step_count(), 6);
        assert_eq!(machine.state(), "carry");
        assert_eq!(machine.output(), "?");
        assert_eq!(machine.error(), None);
    }

    #[test]
    fn test_run_to_completion_stops_on_missing_transition() {
        let mut machine = TuringMachine::new();
        machine.load("5 !0 1 5\nSTART 0 0 R next").unwrap();

        assert_eq!(machine.run_to_completion(100), Ok(RunOutcome::Error));
        assert_eq!(machine.step_count(), 1);
        assert!(machine.error().unwrap().contains("state next"));
    }

    #[test]
    fn test_run_to_completion_step_limit() {
        let mut machine = loaded();

        assert_eq!(machine.run_to_completion(3), Ok(RunOutcome::StepLimit));
        assert_eq!(machine.step_count(), 3);
        assert_eq!(machine.output(), "?");
        assert_eq!(machine.error(), None);

        // A second call picks up where the first one stopped.
        assert_eq!(machine.run_to_completion(5), Ok(RunOutcome::Halted));
        assert_eq!(machine.step_count(), 8);
        assert_eq!(machine.output(), "4");
    }

    #[test]
    fn test_run_to_completion_publishes_once() {
        let mut machine = loaded();
        let count = Rc::new(RefCell::new(0));

        let sink = Rc::clone(&count);
        machine.subscribe(move |_| *sink.borrow_mut() += 1);
        machine.run_to_completion(100).unwrap();

        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_run_to_completion_when_not_ready() {
        let mut machine = TuringMachine::new();
        assert_eq!(machine.run_to_completion(10), Err(EngineError::NotReady));
    }

    #[test]
    fn test_output_without_a_section() {
        let mut machine = TuringMachine::new();
        machine.load("5 !1 1 5\nSTART 1 0 S END").unwrap();
        run_to_end(&mut machine);

        assert_eq!(machine.state(), "END");
        assert_eq!(machine.output(), "?");
    }

    #[test]
    fn test_breakpoint_blocks_step_and_run() {
        let mut machine = loaded();
        assert_eq!(machine.set_breakpoint(0), Ok(true));

        machine.step();
        assert_eq!(machine.step_count(), 0);
        assert_eq!(machine.status(), RunStatus::Paused);

        let task = machine.run().unwrap();
        assert!(!machine.tick(task));
        assert_eq!(machine.step_count(), 0);
        assert_eq!(machine.status(), RunStatus::Paused);

        let task = machine.run().unwrap();
        assert!(!machine.tick(task));
        assert_eq!(machine.step_count(), 0);

        assert_eq!(machine.set_breakpoint(0), Ok(false));
        run_to_end(&mut machine);
        assert_eq!(machine.output(), "4");
    }

    #[test]
    fn test_breakpoint_on_later_block() {
        let mut machine = loaded();
        machine.set_breakpoint(1).unwrap();

        run_to_end(&mut machine);

        assert_eq!(machine.step_count(), 6);
        assert_eq!(machine.state(), "carry");
        assert_eq!(machine.status(), RunStatus::Paused);
        assert_eq!(machine.output(), "?");
    }

    #[test]
    fn test_invalid_breakpoint() {
        let mut machine = loaded();
        assert_eq!(
            machine.set_breakpoint(2),
            Err(EngineError::InvalidBreakpoint(2))
        );
    }

    #[test]
    fn test_pause_cancels_task() {
        let mut machine = loaded();
        let task = machine.run().unwrap();
        assert_eq!(machine.status(), RunStatus::Running);

        machine.pause();
        assert_eq!(machine.status(), RunStatus::Paused);
        assert!(!machine.tick(task));
        assert_eq!(machine.step_count(), 0);
    }

    #[test]
    fn test_set_speed_restarts_task() {
        let mut machine = loaded();
        let old = machine.run().unwrap();

        let new = machine.set_speed(20).unwrap().unwrap();
        assert_eq!(machine.status(), RunStatus::Running);
        assert_eq!(new.period(), std::time::Duration::from_millis(50));

        assert!(!machine.tick(old));
        assert_eq!(machine.step_count(), 0);
        assert!(machine.tick(new));
        assert_eq!(machine.step_count(), 1);
    }

    #[test]
    fn test_invalid_speed() {
        let mut machine = loaded();
        assert_eq!(machine.set_speed(0), Err(EngineError::InvalidSpeed(0)));
        assert_eq!(machine.speed(), 10);
    }

    #[test]
    fn test_reset_matches_fresh_load() {
        let fresh = loaded();

        for n in 0..=9 {
            let mut machine = loaded();
            machine.set_speed(50).unwrap();
            for _ in 0..n {
                machine.step();
            }
            let stale = machine.run().unwrap();

            machine.reset().unwrap();

            assert_eq!(machine.snapshot(), fresh.snapshot(), "after {n} steps");
            assert_eq!(machine.instructions(), fresh.instructions());
            assert_eq!(machine.history_len(), 0);
            assert!(!machine.tick(stale));
        }
    }

    #[test]
    fn test_load_over_stepped_machine() {
        let mut machine = loaded();
        for _ in 0..6 {
            machine.step();
        }
        assert_eq!(machine.current_asm_index(), 2);

        machine.load("5 2 !1 5\nSTART 1 0 S END").unwrap();

        assert_eq!(machine.history_len(), 0);
        assert_eq!(machine.step_count(), 0);
        assert_eq!(machine.current_asm_index(), 0);
        assert_eq!(machine.state(), "START");
        assert_eq!(machine.tape(), &[5, 2, 1, 5]);
        assert!(machine.assembly().is_empty());
        assert_eq!(machine.source(), "");
    }

    #[test]
    fn test_clear() {
        let mut machine = loaded();
        machine.step();
        machine.clear();

        assert!(machine.tape().is_empty());
        assert!(machine.instructions().is_empty());
        assert!(machine.sections().is_empty());
        assert!(machine.assembly().is_empty());
        assert_eq!(machine.state(), "START");
        assert_eq!(machine.step_count(), 0);
        assert_eq!(machine.output(), "?");
        assert_eq!(machine.source(), "");
        assert_eq!(machine.history_len(), 0);
        assert_eq!(machine.speed(), 10);
    }

    #[test]
    fn test_delete() {
        let mut machine = loaded();
        machine.delete();

        assert!(!machine.is_ready());
        assert!(machine.tape().is_empty());
        assert_eq!(machine.reset(), Err(EngineError::NotReady));
        assert!(!machine.is_ready());
    }

    #[test]
    fn test_custom_halt_state() {
        let config = EngineConfig {
            halt_state: "HALT".to_string(),
            ..EngineConfig::default()
        };
        let mut machine = TuringMachine::with_config(config);
        machine.load("5 2 !1 5\nSTART 1 0 S HALT").unwrap();

        run_to_end(&mut machine);

        assert!(machine.is_halted());
        assert_eq!(machine.output(), "0");
    }

    #[test]
    fn test_history_limit() {
        let config = EngineConfig {
            history_limit: Some(3),
            ..EngineConfig::default()
        };
        let mut machine = TuringMachine::with_config(config);
        machine.load(INCREMENT).unwrap();
        for _ in 0..6 {
            machine.step();
        }

        assert_eq!(machine.history_len(), 3);
        for _ in 0..5 {
            machine.step_back();
        }
        assert_eq!(machine.step_count(), 3);
    }

    #[test]
    fn test_subscribe_receives_snapshots() {
        let mut machine = loaded();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&seen);
        let id = machine.subscribe(move |snapshot| sink.borrow_mut().push(snapshot.clone()));

        machine.step();
        machine.set_breakpoint(1).unwrap();
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(seen.borrow()[0].step_count, 1);
        assert!(seen.borrow()[1].assembly[1].breakpoint);

        assert!(machine.unsubscribe(id));
        assert!(!machine.unsubscribe(id));
        machine.step();
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_snapshot_serializes() {
        let machine = loaded();
        let json = serde_json::to_value(machine.snapshot()).unwrap();

        assert_eq!(json["status"], "paused");
        assert_eq!(json["sections"][0]["color"], "red");
        assert_eq!(json["assembly"][0]["status"], "current");
    }
}
