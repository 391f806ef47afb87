use std::time::{Duration, Instant};

use serde::Serialize;

/// Pipeline phase timed by [`TimeCalc`], in cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    SetInput = 0,
    Invoke = 1,
    GetOutput = 2,
}

pub const PHASE_COUNT: usize = 3;

/// Elapsed time per phase of the most recent input → invoke → output cycle.
#[derive(Debug, Default)]
pub struct TimeCalc {
    laps: [Duration; PHASE_COUNT],
    last: Option<Phase>,
}

/// Bucket values as reported by `info`, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Laps {
    pub set_input: u64,
    pub invoke: u64,
    pub get_output: u64,
}

impl TimeCalc {
    /// Clears every bucket; the next recorded phase opens a fresh cycle.
    pub fn begin_cycle(&mut self) {
        self.laps = Default::default();
        self.last = None;
    }

    /// Adds `elapsed` to the bucket of `phase`.
    ///
    /// Going back to an earlier phase, or invoking twice in a row, starts a
    /// new cycle. Repeated input writes or output reads accumulate.
    pub fn record(&mut self, phase: Phase, elapsed: Duration) {
        if let Some(last) = self.last {
            if phase < last || (phase == Phase::Invoke && last == Phase::Invoke) {
                self.begin_cycle();
            }
        }
        self.laps[phase as usize] += elapsed;
        self.last = Some(phase);
    }

    /// Runs `f` and records how long it took under `phase`.
    pub fn measure<T>(&mut self, phase: Phase, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.record(phase, start.elapsed());
        out
    }

    pub fn lap(&self, phase: Phase) -> Duration {
        self.laps[phase as usize]
    }

    pub fn total(&self) -> Duration {
        self.laps.iter().sum::<Duration>()
    }

    pub fn laps(&self) -> Laps {
        let us = |phase: Phase| self.lap(phase).as_micros() as u64;
        Laps {
            set_input: us(Phase::SetInput),
            invoke: us(Phase::Invoke),
            get_output: us(Phase::GetOutput),
        }
    }
}
