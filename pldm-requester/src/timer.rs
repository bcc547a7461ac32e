// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Deadline timers, polled against a millisecond clock.

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum TimerState {
    /// Not armed
    Idle,
    /// Armed, with milliseconds remaining
    Pending(u64),
    /// Fired. The timer is now disarmed.
    Expired,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Timer {
    deadline: Option<u64>,
}

impl Timer {
    pub fn arm(&mut self, now: u64, duration: u64) {
        self.deadline = Some(now.saturating_add(duration));
    }

    /// May be called on an idle timer.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Milliseconds until expiry, or `None` when idle.
    pub fn remaining(&self, now: u64) -> Option<u64> {
        self.deadline.map(|d| d.saturating_sub(now))
    }

    /// Checks for expiry.
    ///
    /// A timer returns `Expired` once, then is idle until re-armed.
    pub fn check(&mut self, now: u64) -> TimerState {
        match self.deadline {
            None => TimerState::Idle,
            Some(d) if now >= d => {
                self.deadline = None;
                TimerState::Expired
            }
            Some(d) => TimerState::Pending(d - now),
        }
    }
}
