// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Requester configuration
//!
//! Times are in milliseconds.

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use pldm::PldmError;

/// Number of resends after the initial attempt.
pub const DEFAULT_RETRIES: u8 = 2;

/// Time to wait for a response to each attempt.
pub const DEFAULT_RESPONSE_TIMEOUT: u64 = 2000;

/// Time after which an outstanding instance ID is reclaimed regardless of
/// the retry state.
///
/// Exceeds the default retry window of
/// `(DEFAULT_RETRIES + 1) * DEFAULT_RESPONSE_TIMEOUT`.
pub const DEFAULT_INSTANCE_EXPIRY: u64 = 8000;

/// Largest record the multipart reassembler will accept.
pub const DEFAULT_MAX_RECORD_SIZE: usize = 64 * 1024;

/// Maximum number of parts requested for a single record.
pub const DEFAULT_MAX_PARTS: usize = 512;

/// Maximum number of endpoints with outstanding instance IDs.
pub const MAX_ENDPOINTS: usize = 32;

/// Configuration for a [`Handler`](crate::Handler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of resends after the initial attempt
    pub retries: u8,
    /// Per-attempt response timeout, milliseconds
    pub response_timeout: u64,
    /// Instance ID expiry backstop, milliseconds
    pub instance_expiry: u64,
    /// Reassembly cap on accumulated record size, bytes
    pub max_record_size: usize,
    /// Reassembly cap on the number of parts
    pub max_parts: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            instance_expiry: DEFAULT_INSTANCE_EXPIRY,
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            max_parts: DEFAULT_MAX_PARTS,
        }
    }
}

impl Config {
    /// Checks the configuration.
    ///
    /// Zero timeouts or reassembly limits are rejected. An instance expiry
    /// shorter than the retry window is allowed but will preempt the final
    /// attempts, so a warning is logged.
    pub fn validate(&self) -> pldm::Result<()> {
        if self.response_timeout == 0 || self.instance_expiry == 0 {
            debug!("Zero timeout in {self:?}");
            return Err(PldmError::InvalidArgument);
        }

        if self.max_record_size == 0 || self.max_parts == 0 {
            debug!("Zero reassembly limit in {self:?}");
            return Err(PldmError::InvalidArgument);
        }

        let window = self.retry_window();
        if self.instance_expiry <= window {
            warn!(
                "Instance expiry {} ms is within the retry window {} ms",
                self.instance_expiry, window
            );
        }
        Ok(())
    }

    /// Returns the time taken by all attempts of an unanswered request,
    /// `(retries + 1) * response_timeout`.
    pub fn retry_window(&self) -> u64 {
        self.response_timeout.saturating_mul(self.retries as u64 + 1)
    }

    /// Sets `instance_expiry` to one response timeout beyond the retry
    /// window.
    pub fn expiry_after_retries(&mut self) {
        self.instance_expiry =
            self.retry_window().saturating_add(self.response_timeout);
    }
}
