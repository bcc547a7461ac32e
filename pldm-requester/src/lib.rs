// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * PLDM requester engine.
 *
 * Copyright (c) 2025 Code Construct
 */

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! PLDM Requester
//!
//! This crate turns a datagram transport into correlated, retried PLDM
//! request/response transactions.
//!
//! - [`InstanceIdAllocator`] hands out per-endpoint instance IDs.
//! - [`Handler`] owns the outstanding transactions, matches responses to
//!   them and runs their timers. Completion is delivered to a callback.
//! - [`Requester`] wraps a `Handler` so that callers can `.await`
//!   responses instead.
//! - [`reassemble`] retrieves records that span multiple response parts.
//!
//! The hosting event loop passes received messages to
//! [`Requester::inbound`] and calls [`Requester::update`] with a
//! monotonic clock to drive timeouts.

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use mctp::Eid;
use pldm::PldmError;
use thiserror::Error;

pub mod config;
pub mod control;
mod handler;
mod instance;
pub mod loopback;
mod multipart;
mod requester;
mod timer;
mod transaction;

pub use config::Config;
pub use handler::{Handler, ResponseCallback};
pub use instance::{InstanceId, InstanceIdAllocator};
pub use multipart::{reassemble, Part, PartTransfer};
pub use requester::Requester;
pub use transaction::{State, TransactionKey};

/// Errors from the requester engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// No instance IDs are available for the endpoint
    #[error("Instance ID pool exhausted")]
    ExhaustedPool,
    /// A transaction with the same key is already outstanding
    #[error("Duplicate transaction {0:?}")]
    DuplicateKey(TransactionKey),
    /// The transport failed to send a request
    #[error("Transport error: {0}")]
    Transport(mctp::Error),
    /// No response was received
    #[error("Timed out waiting for response")]
    TimedOut,
    /// The transaction was cancelled before a response arrived
    #[error("Transaction cancelled")]
    Cancelled,
    /// A response didn't match its request
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    /// PLDM encoding or decoding failure
    #[error("PLDM error: {0}")]
    Pldm(#[from] PldmError),
}

/// Requester engine result type
pub type Result<T> = core::result::Result<T, EngineError>;

/// Errors from multipart record retrieval
#[derive(Error, Debug)]
pub enum ReassemblyError {
    /// A part request failed
    #[error("{0}")]
    Engine(#[from] EngineError),
    /// The responder returned a failure completion code
    #[error("Command failed with completion code 0x{0:02x}")]
    Completion(u8),
    /// The record exceeded the size or part limit
    #[error("Record too large")]
    Overflow,
    /// Inconsistent transfer flags or handles
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    /// A part couldn't be encoded or decoded
    #[error("PLDM error: {0}")]
    Pldm(#[from] PldmError),
}

/// Outbound message transport.
///
/// Sends complete PLDM messages to a remote endpoint. Sending is
/// fire-and-forget: responses arrive separately through
/// [`Handler::inbound`] or [`Requester::inbound`].
///
/// Closures `FnMut(Eid, &[u8]) -> mctp::Result<()>` implement `Transport`.
pub trait Transport {
    /// Send a message to `eid`.
    fn send(&mut self, eid: Eid, msg: &[u8]) -> mctp::Result<()>;
}

impl<F> Transport for F
where
    F: FnMut(Eid, &[u8]) -> mctp::Result<()>,
{
    fn send(&mut self, eid: Eid, msg: &[u8]) -> mctp::Result<()> {
        self(eid, msg)
    }
}
