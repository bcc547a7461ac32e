// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Outstanding transaction registry
#[allow(unused)]
use log::{debug, error, info, trace, warn};

use mctp::Eid;
use pldm::{PldmHeader, PldmRequest, PldmResponse};

use crate::timer::{Timer, TimerState};
use crate::transaction::{RetryPoll, Transaction};
use crate::{
    Config, EngineError, InstanceId, InstanceIdAllocator, Result, State,
    TransactionKey, Transport,
};

/// Completion callback for [`Handler::register_request`].
///
/// Called exactly once, with the response or the reason there is none.
/// The `Handler` is passed back so that the callback can issue further
/// requests.
pub type ResponseCallback<T> =
    Box<dyn FnOnce(&mut Handler<T>, Result<PldmResponse>)>;

struct Entry<T> {
    xfer: Transaction<ResponseCallback<T>>,
    // Backstop for the transaction's own retry timer
    expiry: Timer,
}

struct Slot<T> {
    // Incremented whenever the entry is removed, so that a stale
    // (index, generation) reference can't match a later transaction.
    generation: u32,
    entry: Option<Entry<T>>,
}

/// Registry of outstanding PLDM requests.
///
/// The `Handler` sends requests through a [`Transport`], matches inbound
/// responses to them by [`TransactionKey`] and runs their timers. Every
/// registered request completes exactly once, by a matched response,
/// by timing out, or by cancellation. Its instance ID is freed on
/// completion.
///
/// Time is supplied by the caller through [`update()`](Self::update),
/// which should be called again after the returned interval.
pub struct Handler<T> {
    transport: T,
    config: Config,
    iids: InstanceIdAllocator,

    // Indices are stable while an entry is live. Free slots are reused.
    slots: Vec<Slot<T>>,

    /// Monotonic time in milliseconds, from the last `update()`
    now: u64,
}

impl<T: Transport> Handler<T> {
    /// Create a new `Handler`.
    ///
    /// Fails with [`EngineError::Pldm`] if the `config` is invalid.
    pub fn new(transport: T, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            config,
            iids: InstanceIdAllocator::new(),
            slots: Vec::new(),
            now: 0,
        })
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Returns the clock value from the last [`update()`](Self::update).
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Allocates an instance ID for a request to `eid`.
    ///
    /// See [`InstanceIdAllocator::allocate`].
    pub fn alloc_instance_id(&mut self, eid: Eid) -> Result<InstanceId> {
        self.iids.allocate(eid)
    }

    /// Frees an instance ID that was not used for a registered request.
    ///
    /// Registered requests free their own instance ID on completion.
    pub fn free_instance_id(&mut self, eid: Eid, iid: InstanceId) {
        self.iids.free(eid, iid)
    }

    /// Returns the instance ID allocator
    pub fn instance_ids(&self) -> &InstanceIdAllocator {
        &self.iids
    }

    /// Returns the number of outstanding transactions
    pub fn outstanding(&self) -> usize {
        self.live().count()
    }

    /// Returns the state of an outstanding transaction.
    ///
    /// Completed transactions are removed, so return `None`.
    pub fn state(&self, key: &TransactionKey) -> Option<State> {
        self.live()
            .find(|e| e.xfer.key() == key)
            .map(|e| e.xfer.state())
    }

    /// Sends a request and registers it for a response.
    ///
    /// `iid` should have been allocated with
    /// [`alloc_instance_id()`](Self::alloc_instance_id). On success the
    /// `callback` will be called exactly once, from a later call to
    /// [`handle_response()`](Self::handle_response),
    /// [`update()`](Self::update) or
    /// [`cancel_request()`](Self::cancel_request).
    ///
    /// On failure nothing is registered, the callback is dropped, and
    /// `iid` remains allocated to the caller.
    /// [`EngineError::DuplicateKey`] is returned if the same key is already
    /// outstanding, which is left unaffected.
    pub fn register_request(
        &mut self,
        eid: Eid,
        iid: InstanceId,
        req: &PldmRequest,
        callback: ResponseCallback<T>,
    ) -> Result<TransactionKey> {
        let key = TransactionKey {
            eid,
            iid,
            typ: req.typ,
            cmd: req.cmd,
        };

        if self.find_live(&key).is_some() {
            debug!("Duplicate transaction {key:?}");
            return Err(EngineError::DuplicateKey(key));
        }

        if !self.iids.is_allocated(eid, iid) {
            trace!("{key:?} iid wasn't allocated");
        }

        let msg = req.encode(iid.0)?;
        let mut xfer =
            Transaction::new(key, msg, self.config.retries, callback);
        xfer.start(
            &mut self.transport,
            self.now,
            self.config.response_timeout,
        )?;

        let mut expiry = Timer::default();
        expiry.arm(self.now, self.config.instance_expiry);

        let entry = Entry { xfer, expiry };
        match self.slots.iter_mut().find(|s| s.entry.is_none()) {
            Some(slot) => slot.entry = Some(entry),
            None => self.slots.push(Slot {
                generation: 0,
                entry: Some(entry),
            }),
        }
        trace!("registered {key:?}");
        Ok(key)
    }

    /// Handles a response message.
    ///
    /// `rest` is the message following the PLDM header, starting with the
    /// completion code.
    ///
    /// Returns `true` if the response matched an outstanding transaction.
    /// Unmatched responses are dropped. Their instance ID is freed unless
    /// it belongs to another registered transaction, including one that
    /// has timed out and is waiting to be removed.
    pub fn handle_response(
        &mut self,
        eid: Eid,
        iid: InstanceId,
        typ: u8,
        cmd: u8,
        rest: &[u8],
    ) -> bool {
        let key = TransactionKey { eid, iid, typ, cmd };

        let Some((idx, generation)) = self.find_live(&key) else {
            debug!("Unmatched response {key:?}");
            // Entries awaiting removal still own their iid until finish()
            let held = self
                .slots
                .iter()
                .filter_map(|s| s.entry.as_ref())
                .any(|e| {
                    let k = e.xfer.key();
                    k.eid == eid && k.iid == iid
                });
            if !held {
                self.iids.free(eid, iid);
            }
            return false;
        };

        if let Some(ent) = self.slots[idx].entry.as_mut() {
            ent.expiry.disarm();
            ent.xfer.terminate(State::Completed);
        }

        let res = PldmResponse::from_parts(iid.0, typ, cmd, rest).map_err(|e| {
            debug!("Bad response for {key:?}: {e}");
            EngineError::ProtocolViolation(format!("{e}"))
        });
        self.finish(idx, generation, res);
        true
    }

    /// Handles an inbound PLDM message from `eid`.
    ///
    /// Responses are passed to [`handle_response()`](Self::handle_response).
    /// Returns `Ok(false)` for request messages, which are not handled
    /// here and may be passed to a responder instead.
    pub fn inbound(&mut self, eid: Eid, msg: &[u8]) -> pldm::Result<bool> {
        let (hdr, rest) = PldmHeader::decode(msg)?;
        if hdr.request {
            trace!("Request from {eid}, cmd {:02x}", hdr.cmd);
            return Ok(false);
        }
        self.handle_response(eid, InstanceId(hdr.iid), hdr.typ, hdr.cmd, rest);
        Ok(true)
    }

    /// Cancels an outstanding transaction.
    ///
    /// The callback is called with [`EngineError::Cancelled`]. Returns
    /// `false` if the transaction isn't outstanding.
    pub fn cancel_request(&mut self, key: &TransactionKey) -> bool {
        let Some((idx, generation)) = self.find_live(key) else {
            return false;
        };
        if let Some(ent) = self.slots[idx].entry.as_mut() {
            ent.expiry.disarm();
            ent.xfer.terminate(State::Cancelled);
        }
        self.finish(idx, generation, Err(EngineError::Cancelled));
        true
    }

    /// Updates the clock, running retries and timeouts.
    ///
    /// `now_millis` is a monotonic clock in milliseconds. Returns the time
    /// until the next timer is due, or `u64::MAX` if none are pending.
    pub fn update(&mut self, now_millis: u64) -> u64 {
        if now_millis < self.now {
            warn!("Clock went backwards, {} < {}", now_millis, self.now);
        } else {
            self.now = now_millis;
        }
        let now = self.now;

        // Timed out transactions are marked here, then completed after
        // the scan. Callbacks may register or complete other transactions.
        let mut expired = Vec::new();
        let Self {
            slots,
            transport,
            config,
            ..
        } = self;
        for (idx, slot) in slots.iter_mut().enumerate() {
            let Some(ent) = slot.entry.as_mut() else {
                continue;
            };
            if ent.xfer.state().is_terminal() {
                continue;
            }

            if ent.expiry.check(now) == TimerState::Expired {
                debug!("Instance expired for {:?}", ent.xfer.key());
                ent.xfer.terminate(State::TimedOut);
                expired.push((idx, slot.generation));
                continue;
            }

            let r =
                ent.xfer.poll_retry(transport, now, config.response_timeout);
            if r == RetryPoll::Exhausted {
                debug!("No response for {:?}", ent.xfer.key());
                ent.expiry.disarm();
                ent.xfer.terminate(State::TimedOut);
                expired.push((idx, slot.generation));
            }
        }

        for (idx, generation) in expired {
            self.finish(idx, generation, Err(EngineError::TimedOut));
        }

        self.next_timeout()
    }

    /// Returns the time until the next timer is due, or `u64::MAX`.
    pub fn next_timeout(&self) -> u64 {
        self.live()
            .flat_map(|e| {
                [e.expiry.remaining(self.now), e.xfer.retry_remaining(self.now)]
            })
            .flatten()
            .min()
            .unwrap_or(u64::MAX)
    }

    /// Iterates over entries that haven't terminated
    fn live(&self) -> impl Iterator<Item = &Entry<T>> {
        self.slots
            .iter()
            .filter_map(|s| s.entry.as_ref())
            .filter(|e| !e.xfer.state().is_terminal())
    }

    /// Returns the slot index and generation of a non-terminated entry.
    ///
    /// Entries that have terminated but not yet been removed are not
    /// found, so a late response for them is treated as unmatched.
    fn find_live(&self, key: &TransactionKey) -> Option<(usize, u32)> {
        self.slots.iter().enumerate().find_map(|(i, s)| {
            s.entry
                .as_ref()
                .filter(|e| {
                    e.xfer.key() == key && !e.xfer.state().is_terminal()
                })
                .map(|_| (i, s.generation))
        })
    }

    /// Removes a terminated entry, frees its instance ID and calls its
    /// callback.
    fn finish(
        &mut self,
        idx: usize,
        generation: u32,
        result: Result<PldmResponse>,
    ) {
        let Some(slot) = self.slots.get_mut(idx) else {
            debug_assert!(false, "bad slot index");
            return;
        };
        if slot.generation != generation {
            trace!("stale slot {idx} generation {generation}");
            return;
        }
        let Some(mut ent) = slot.entry.take() else {
            return;
        };
        slot.generation = slot.generation.wrapping_add(1);

        debug_assert!(ent.xfer.state().is_terminal());
        ent.expiry.disarm();
        ent.xfer.stop();

        let key = *ent.xfer.key();
        self.iids.free(key.eid, key.iid);
        trace!("finished {key:?} as {:?}", ent.xfer.state());

        match ent.xfer.take_callback() {
            Some(cb) => cb(self, result),
            None => debug_assert!(false, "callback already taken"),
        }
    }
}
