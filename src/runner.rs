//! The run controller: tracks whether a periodic run task is live, at what speed,
//! and hands out [`Task`] handles so a host timer can drive ticks.
//!
//! The engine never owns a timer. `run()` hands out a handle, and the host calls
//! `tick(handle)` once per [`Task::period`]. Every cancellation bumps a generation
//! counter, so a handle issued before a pause, reset or speed change no longer
//! matches and its ticks are ignored.

use std::time::Duration;

use crate::types::{EngineError, RunStatus};

/// Handle to a scheduled run task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Task {
    generation: u64,
    period: Duration,
}

impl Task {
    /// Time the host should wait between ticks.
    pub fn period(&self) -> Duration {
        self.period
    }
}

#[derive(Debug)]
pub struct RunController {
    status: RunStatus,
    speed: u32,
    max_speed: u32,
    burst_steps: usize,
    generation: u64,
}

impl RunController {
    pub fn new(speed: u32, max_speed: u32, burst_steps: usize) -> Self {
        Self {
            status: RunStatus::Paused,
            speed,
            max_speed,
            burst_steps,
            generation: 0,
        }
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    /// Interval between ticks: one second divided by the speed.
    pub fn period(&self) -> Duration {
        Duration::from_millis(1000) / self.speed.max(1)
    }

    /// Steps to perform per tick. At maximum speed a tick runs a whole burst.
    pub fn steps_per_tick(&self) -> usize {
        if self.speed == self.max_speed {
            self.burst_steps
        } else {
            1
        }
    }

    /// Starts a new task, or returns the live one if already running.
    pub fn start(&mut self) -> Task {
        if !self.is_running() {
            self.generation += 1;
            self.status = RunStatus::Running;
            log::debug!("run started at speed {}", self.speed);
        }

        self.handle()
    }

    /// Cancels the live task, if any.
    pub fn cancel(&mut self) {
        if self.is_running() {
            log::debug!("run paused");
        }

        self.generation += 1;
        self.status = RunStatus::Paused;
    }

    /// The live task handle, if running.
    pub fn task(&self) -> Option<Task> {
        self.is_running().then(|| self.handle())
    }

    /// Returns `true` if `task` is the handle of the live task.
    pub fn is_live(&self, task: &Task) -> bool {
        self.is_running() && task.generation == self.generation
    }

    /// Updates the speed. A running task is restarted so the new period applies at once.
    pub fn set_speed(&mut self, speed: u32) -> Result<Option<Task>, EngineError> {
        if speed == 0 || speed > self.max_speed {
            return Err(EngineError::InvalidSpeed(speed));
        }

        self.speed = speed;
        log::debug!("speed set to {speed}");

        if self.is_running() {
            self.cancel();
            return Ok(Some(self.start()));
        }

        Ok(None)
    }

    /// Returns to the paused state at `speed`, invalidating any handle.
    pub fn reset(&mut self, speed: u32) {
        self.cancel();
        self.speed = speed;
    }

    fn handle(&self) -> Task {
        Task {
            generation: self.generation,
            period: self.period(),
        }
    }
}
