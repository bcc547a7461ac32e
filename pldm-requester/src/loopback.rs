// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! In-process transport
//!
//! [`Loopback`] queues sent messages for a simulated responder to
//! consume, rather than delivering them to a real endpoint. It is used
//! for tests and demonstrations.

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use core::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use mctp::Eid;

use crate::Transport;

/// A [`Transport`] that queues outbound messages.
///
/// Clones share the same queue, so one clone can be given to a
/// [`Handler`](crate::Handler) while another is used to retrieve the
/// sent messages.
#[derive(Debug, Default, Clone)]
pub struct Loopback {
    queue: Rc<RefCell<VecDeque<(Eid, Vec<u8>)>>>,
    fail: Rc<Cell<bool>>,
    sent: Rc<Cell<usize>>,
}

impl Loopback {
    /// Create a new empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Retrieves the oldest sent message and its destination.
    pub fn pop(&self) -> Option<(Eid, Vec<u8>)> {
        self.queue.borrow_mut().pop_front()
    }

    /// Returns the number of queued messages
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Returns `true` if no messages are queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the total number of messages successfully sent
    pub fn sent_count(&self) -> usize {
        self.sent.get()
    }

    /// Makes subsequent sends fail with [`mctp::Error::TxFailure`].
    pub fn set_fail(&self, fail: bool) {
        self.fail.set(fail)
    }
}

impl Transport for Loopback {
    fn send(&mut self, eid: Eid, msg: &[u8]) -> mctp::Result<()> {
        if self.fail.get() {
            trace!("loopback send to {eid} failing");
            return Err(mctp::Error::TxFailure);
        }
        trace!("loopback send to {eid}, {} bytes", msg.len());
        self.queue.borrow_mut().push_back((eid, msg.to_vec()));
        self.sent.set(self.sent.get() + 1);
        Ok(())
    }
}
