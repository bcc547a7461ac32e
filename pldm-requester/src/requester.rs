// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Async request/response on top of [`Handler`]
#[allow(unused)]
use log::{debug, error, info, trace, warn};

use core::cell::RefCell;
use std::rc::Rc;

use embassy_sync::signal::Signal;
use mctp::Eid;
use pldm::{PldmRequest, PldmResponse};

use crate::{
    Config, EngineError, Handler, ResponseCallback, Result, Transport,
};

type RawMutex = embassy_sync::blocking_mutex::raw::NoopRawMutex;
type BlockingMutex<T> =
    embassy_sync::blocking_mutex::Mutex<RawMutex, RefCell<T>>;

type ResponseSignal = Signal<RawMutex, Result<PldmResponse>>;

/// Awaitable PLDM requester.
///
/// Wraps a [`Handler`] so that requests can be awaited, from any number
/// of concurrent tasks on one executor. The hosting event loop must pass
/// received messages to [`inbound()`](Self::inbound) and call
/// [`update()`](Self::update) to run timeouts, otherwise pending requests
/// will never complete.
pub struct Requester<T> {
    inner: BlockingMutex<Handler<T>>,
}

impl<T: Transport> Requester<T> {
    /// Create a new `Requester` sending through `transport`.
    pub fn new(transport: T, config: Config) -> Result<Self> {
        Ok(Self::with_handler(Handler::new(transport, config)?))
    }

    /// Create a `Requester` from an existing `Handler`.
    pub fn with_handler(handler: Handler<T>) -> Self {
        Self {
            inner: BlockingMutex::new(RefCell::new(handler)),
        }
    }

    /// Returns a copy of the configuration
    pub fn config(&self) -> Config {
        self.with(|h| h.config().clone())
    }

    /// Runs `f` with the underlying `Handler`.
    ///
    /// `f` must not call back into this `Requester`.
    pub fn with<R>(&self, f: impl FnOnce(&mut Handler<T>) -> R) -> R {
        self.inner.lock(|h| f(&mut h.borrow_mut()))
    }

    /// Updates the clock. See [`Handler::update`].
    pub fn update(&self, now_millis: u64) -> u64 {
        self.with(|h| h.update(now_millis))
    }

    /// Handles a received message. See [`Handler::inbound`].
    pub fn inbound(&self, eid: Eid, msg: &[u8]) -> pldm::Result<bool> {
        self.with(|h| h.inbound(eid, msg))
    }

    /// Returns the number of outstanding transactions
    pub fn outstanding(&self) -> usize {
        self.with(|h| h.outstanding())
    }

    /// Sends a request to `eid` and waits for the response.
    ///
    /// An instance ID is allocated for the request and freed when it
    /// completes. The response may have a failure completion code, this
    /// is left to the caller to check.
    ///
    /// Fails with [`EngineError::TimedOut`] once retries are exhausted or
    /// the instance ID expires. If the returned future is dropped the
    /// request remains outstanding until it completes or times out, and
    /// the result is discarded.
    pub async fn send_and_await(
        &self,
        eid: Eid,
        req: &PldmRequest,
    ) -> Result<PldmResponse> {
        let signal = Rc::new(ResponseSignal::new());
        let s = signal.clone();
        let cb: ResponseCallback<T> = Box::new(move |_h, r| s.signal(r));

        let key = self.with(|h| {
            let iid = h.alloc_instance_id(eid)?;
            h.register_request(eid, iid, req, cb).inspect_err(|e| {
                // A duplicate key means the iid belongs to that transaction
                if !matches!(e, EngineError::DuplicateKey(_)) {
                    h.free_instance_id(eid, iid);
                }
            })
        })?;
        trace!("awaiting {key:?}");

        let resp = signal.wait().await?;
        if resp.typ != req.typ || resp.cmd != req.cmd {
            return Err(EngineError::ProtocolViolation(format!(
                "Response type {} cmd 0x{:02x} for request type {} cmd 0x{:02x}",
                resp.typ, resp.cmd, req.typ, req.cmd
            )));
        }
        Ok(resp)
    }
}
