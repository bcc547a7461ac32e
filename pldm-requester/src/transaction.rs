// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! A single outstanding request, with retries
#[allow(unused)]
use log::{debug, error, info, trace, warn};

use mctp::Eid;

use crate::timer::{Timer, TimerState};
use crate::{EngineError, InstanceId, Result, Transport};

/// Identifies an outstanding transaction.
///
/// Responses are matched to requests by the full key.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TransactionKey {
    /// Remote endpoint
    pub eid: Eid,
    /// Instance ID of the request
    pub iid: InstanceId,
    /// PLDM type
    pub typ: u8,
    /// PLDM command
    pub cmd: u8,
}

/// Transaction state
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    /// Not yet sent
    Created,
    /// Initial request sent
    Sent,
    /// Waiting for a response to the latest attempt
    AwaitingResponse,
    /// Resending after an attempt timed out
    Retrying,
    /// A response was received
    Completed,
    /// Retries or instance expiry ran out
    TimedOut,
    /// Cancelled by the requester
    Cancelled,
}

impl State {
    /// Returns `true` for states that end the transaction.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Cancelled)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RetryPoll {
    /// No retry timer armed
    Idle,
    /// Milliseconds until the next attempt expires
    Pending(u64),
    /// The final attempt expired
    Exhausted,
}

/// Retry state machine for one request.
///
/// Each attempt waits `response_timeout` for a response. After the
/// initial send, up to `retries` resends are made. The transaction owns
/// the completion callback `C`, which can only be taken once.
pub(crate) struct Transaction<C> {
    key: TransactionKey,
    /// Complete encoded request, resent verbatim
    request: Vec<u8>,
    retries_left: u8,
    retry_timer: Timer,
    state: State,
    callback: Option<C>,
}

impl<C> core::fmt::Debug for Transaction<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Transaction")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("retries_left", &self.retries_left)
            .field("request length", &self.request.len())
            .finish_non_exhaustive()
    }
}

impl<C> Transaction<C> {
    pub fn new(
        key: TransactionKey,
        request: Vec<u8>,
        retries: u8,
        callback: C,
    ) -> Self {
        Self {
            key,
            request,
            retries_left: retries,
            retry_timer: Timer::default(),
            state: State::Created,
            callback: Some(callback),
        }
    }

    pub fn key(&self) -> &TransactionKey {
        &self.key
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Sends the initial request and arms the retry timer.
    ///
    /// A send failure is returned to the caller and not retried.
    pub fn start(
        &mut self,
        transport: &mut impl Transport,
        now: u64,
        response_timeout: u64,
    ) -> Result<()> {
        debug_assert_eq!(self.state, State::Created);

        transport.send(self.key.eid, &self.request).map_err(|e| {
            debug!("Send failed for {:?}: {e}", self.key);
            EngineError::Transport(e)
        })?;
        self.state = State::Sent;
        trace!("sent {:?}", self.key);

        self.retry_timer.arm(now, response_timeout);
        self.state = State::AwaitingResponse;
        Ok(())
    }

    /// Checks the retry timer, resending if it expired.
    ///
    /// A failed resend still consumes the attempt, the response timeout
    /// applies as though it was sent.
    pub fn poll_retry(
        &mut self,
        transport: &mut impl Transport,
        now: u64,
        response_timeout: u64,
    ) -> RetryPoll {
        if self.state.is_terminal() {
            return RetryPoll::Idle;
        }

        match self.retry_timer.check(now) {
            TimerState::Idle => RetryPoll::Idle,
            TimerState::Pending(t) => RetryPoll::Pending(t),
            TimerState::Expired if self.retries_left == 0 => {
                trace!("retries exhausted {:?}", self.key);
                RetryPoll::Exhausted
            }
            TimerState::Expired => {
                self.retries_left -= 1;
                self.state = State::Retrying;
                debug!(
                    "Retrying {:?}, {} retries left",
                    self.key, self.retries_left
                );
                if let Err(e) = transport.send(self.key.eid, &self.request) {
                    warn!("Resend failed for {:?}: {e}", self.key);
                }
                self.retry_timer.arm(now, response_timeout);
                self.state = State::AwaitingResponse;
                RetryPoll::Pending(response_timeout)
            }
        }
    }

    /// Milliseconds until the retry timer fires.
    pub fn retry_remaining(&self, now: u64) -> Option<u64> {
        self.retry_timer.remaining(now)
    }

    /// Disarms the retry timer. May be called repeatedly.
    pub fn stop(&mut self) {
        self.retry_timer.disarm();
    }

    /// Moves to a terminal state and stops.
    ///
    /// Returns `false` if the transaction had already terminated, in which
    /// case the state is unchanged.
    pub fn terminate(&mut self, state: State) -> bool {
        debug_assert!(state.is_terminal());
        self.stop();
        if self.state.is_terminal() {
            trace!("{:?} already terminated as {:?}", self.key, self.state);
            return false;
        }
        trace!("{:?} {:?} -> {:?}", self.key, self.state, state);
        self.state = state;
        true
    }

    /// Takes the completion callback. Returns `None` after the first call.
    pub fn take_callback(&mut self) -> Option<C> {
        self.callback.take()
    }
}
