// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Multipart record retrieval
#[allow(unused)]
use log::{debug, error, info, trace, warn};

use mctp::Eid;
use pldm::{CCode, PldmRequest, PldmResponse, TransferFlag, TransferOperation};

use crate::{ReassemblyError, Requester, Transport};

/// One part of a multipart response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Position of this part within the record
    pub flag: TransferFlag,
    /// Handle to request the following part. Zero on the final part.
    pub next_handle: u32,
    /// Record data carried by this part
    pub data: Vec<u8>,
}

/// A command that transfers a record in parts.
///
/// Implementations hold the record selector, and build the command
/// specific request and response encodings around the generic
/// handle/flag sequence driven by [`reassemble`].
pub trait PartTransfer {
    /// Builds a request for the part at `handle`.
    ///
    /// The first request has handle 0 and
    /// [`TransferOperation::FirstPart`].
    fn request(
        &mut self,
        handle: u32,
        op: TransferOperation,
    ) -> pldm::Result<PldmRequest>;

    /// Decodes a successful response.
    ///
    /// Only called for responses with a success completion code.
    fn decode(&mut self, resp: &PldmResponse) -> pldm::Result<Part>;
}

/// Retrieves a complete record from `eid`.
///
/// Parts are requested in sequence, each using the handle from the
/// previous part, until a part with an end transfer flag. Their data is
/// concatenated in order.
///
/// Limits are taken from the [`Config`](crate::Config). Exceeding
/// `max_record_size` or `max_parts` fails with
/// [`ReassemblyError::Overflow`]. Out of order transfer flags, an empty
/// non-final part, or a non-final part without a next handle fail with
/// [`ReassemblyError::ProtocolViolation`]. No partial record is
/// returned on failure.
pub async fn reassemble<T: Transport>(
    req: &Requester<T>,
    eid: Eid,
    xfer: &mut impl PartTransfer,
) -> Result<Vec<u8>, ReassemblyError> {
    let config = req.config();
    let mut record = Vec::new();
    let mut handle = 0;
    let mut op = TransferOperation::FirstPart;

    for n in 0..config.max_parts {
        let r = xfer.request(handle, op)?;
        let resp = req.send_and_await(eid, &r).await?;
        if resp.cc != CCode::SUCCESS as u8 {
            debug!("Part {n} from {eid} failed, cc 0x{:02x}", resp.cc);
            return Err(ReassemblyError::Completion(resp.cc));
        }

        let part = xfer.decode(&resp)?;
        trace!(
            "part {n} handle {handle:#x} flag {:?} next {:#x} len {}",
            part.flag,
            part.next_handle,
            part.data.len()
        );

        if part.flag.is_start() != (n == 0) {
            return Err(ReassemblyError::ProtocolViolation(format!(
                "Transfer flag {:?} for part {n}",
                part.flag
            )));
        }

        let end = part.flag.is_end();
        if !end && part.data.is_empty() {
            return Err(ReassemblyError::ProtocolViolation(format!(
                "Empty part {n} with flag {:?}",
                part.flag
            )));
        }

        if record.len() + part.data.len() > config.max_record_size {
            debug!(
                "Record from {eid} exceeds {} bytes",
                config.max_record_size
            );
            return Err(ReassemblyError::Overflow);
        }
        record.extend_from_slice(&part.data);

        if end {
            trace!("record complete, {} bytes in {} parts", record.len(), n + 1);
            return Ok(record);
        }

        if part.next_handle == 0 {
            return Err(ReassemblyError::ProtocolViolation(format!(
                "No next handle with flag {:?}",
                part.flag
            )));
        }
        handle = part.next_handle;
        op = TransferOperation::NextPart;
    }

    debug!("Record from {eid} exceeds {} parts", config.max_parts);
    Err(ReassemblyError::Overflow)
}
