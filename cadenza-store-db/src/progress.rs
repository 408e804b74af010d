// SPDX-FileCopyrightText: 2026 Cadenza contributors
// SPDX-License-Identifier: MIT

//! Progress reporting for bulk operations.

/// Answer from a progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressResult {
    Continue,
    /// Stop at the next row boundary and undo partial work
    Cancel,
}

/// Polled between rows of a bulk copy or import.
pub trait Progress {
    fn update(&mut self, done: u64, total: u64) -> ProgressResult;
}

impl<F> Progress for F
where
    F: FnMut(u64, u64) -> ProgressResult,
{
    fn update(&mut self, done: u64, total: u64) -> ProgressResult {
        self(done, total)
    }
}

/// Progress sink that never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn update(&mut self, _done: u64, _total: u64) -> ProgressResult {
        ProgressResult::Continue
    }
}
