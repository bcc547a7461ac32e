// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! PDR repository requester
#[allow(unused)]
use log::{debug, error, info, trace, warn};

use std::collections::HashSet;

use crc::{Crc, Digest, CRC_8_SMBUS};
use deku::{DekuContainerRead, DekuContainerWrite};
use num_traits::FromPrimitive;

use mctp::Eid;
use pldm::{
    ccode_result, proto_error, PldmRequest, PldmResponse, TransferFlag,
    TransferOperation,
};
use pldm_requester::{
    reassemble, EngineError, Part, PartTransfer, ReassemblyError, Requester,
    Transport,
};

use crate::proto::*;
use crate::PLDM_TYPE_PLATFORM;

/// `transferCRC` over a complete multipart PDR
static PDR_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Bytes requested per GetPDR part
pub const PDR_REQUEST_COUNT: u16 = 255;

/// Limit on the number of records walked by [`get_pdr_repository`]
pub const MAX_REPOSITORY_RECORDS: usize = 4096;

/// A retrieved Platform Descriptor Record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdr {
    /// Common PDR header
    pub header: PdrHeader,
    /// Type specific record data following the header
    pub data: Vec<u8>,
    /// Handle of the following record in the repository, 0 for the last
    pub next_record_handle: u32,
}

impl Pdr {
    /// Returns the PDR type, if known
    pub fn pdr_type(&self) -> Option<PdrType> {
        PdrType::from_u8(self.header.pdr_type)
    }
}

/// GetPDR parts for one record
struct PdrTransfer {
    record_handle: u32,
    record_change_number: u16,
    next_record_handle: u32,
    crc: Option<Digest<'static, u8>>,
}

impl PdrTransfer {
    fn new(record_handle: u32) -> Self {
        Self {
            record_handle,
            record_change_number: 0,
            next_record_handle: 0,
            crc: None,
        }
    }
}

impl PartTransfer for PdrTransfer {
    fn request(
        &mut self,
        handle: u32,
        op: TransferOperation,
    ) -> pldm::Result<PldmRequest> {
        let req = GetPDRReq {
            record_handle: self.record_handle,
            data_transfer_handle: handle,
            transfer_operation_flag: op as u8,
            request_count: PDR_REQUEST_COUNT,
            record_change_number: match op {
                TransferOperation::FirstPart => 0,
                TransferOperation::NextPart => self.record_change_number,
            },
        };
        Ok(PldmRequest::new_data(
            PLDM_TYPE_PLATFORM,
            Cmd::GetPDR as u8,
            req.to_bytes()?,
        ))
    }

    fn decode(&mut self, resp: &PldmResponse) -> pldm::Result<Part> {
        let ((rest, _), r) = GetPDRResp::from_bytes((&resp.data, 0))?;
        let flag = TransferFlag::try_from(r.transfer_flag)?;

        if flag == TransferFlag::Start {
            // Later parts must name the same revision of the record
            let ((_, _), hdr) = PdrHeader::from_bytes((&r.record_data, 0))?;
            self.record_change_number = hdr.record_change_number;
            self.crc = Some(PDR_CRC.digest());
        }

        if let Some(crc) = self.crc.as_mut() {
            crc.update(&r.record_data);
        }

        if flag == TransferFlag::End {
            let Some(&expect) = rest.first() else {
                return Err(proto_error!("Missing GetPDR transferCRC"));
            };
            let crc = self.crc.take().map(|c| c.finalize());
            if crc != Some(expect) {
                debug!("PDR CRC {crc:02x?}, expected {expect:02x}");
                return Err(proto_error!("PDR transferCRC mismatch"));
            }
        } else if !rest.is_empty() {
            debug!("{} extra GetPDR response bytes", rest.len());
        }

        self.next_record_handle = r.next_record_handle;
        Ok(Part {
            flag,
            next_handle: r.next_data_transfer_handle,
            data: r.record_data,
        })
    }
}

/// Retrieves one PDR.
///
/// `record_handle` 0 selects the first record in the repository.
/// Records spanning multiple parts are reassembled and their
/// `transferCRC` checked.
pub async fn get_pdr<T: Transport>(
    req: &Requester<T>,
    eid: Eid,
    record_handle: u32,
) -> Result<Pdr, ReassemblyError> {
    let mut xfer = PdrTransfer::new(record_handle);
    let record = reassemble(req, eid, &mut xfer).await?;

    let ((rest, _), header) = PdrHeader::from_bytes((&record, 0))
        .map_err(|e| ReassemblyError::Pldm(e.into()))?;
    if rest.len() != header.data_length as usize {
        return Err(ReassemblyError::ProtocolViolation(format!(
            "PDR {} data length {}, received {}",
            header.record_handle,
            header.data_length,
            rest.len()
        )));
    }

    Ok(Pdr {
        data: rest.to_vec(),
        header,
        next_record_handle: xfer.next_record_handle,
    })
}

/// Retrieves every PDR in the repository, in repository order.
///
/// Fails with [`ReassemblyError::ProtocolViolation`] if the next record
/// handles form a loop, or [`ReassemblyError::Overflow`] beyond
/// [`MAX_REPOSITORY_RECORDS`].
pub async fn get_pdr_repository<T: Transport>(
    req: &Requester<T>,
    eid: Eid,
) -> Result<Vec<Pdr>, ReassemblyError> {
    let mut pdrs = Vec::new();
    let mut seen = HashSet::new();
    let mut handle = 0;

    loop {
        if pdrs.len() >= MAX_REPOSITORY_RECORDS {
            debug!("More than {MAX_REPOSITORY_RECORDS} PDRs from {eid}");
            return Err(ReassemblyError::Overflow);
        }

        let pdr = get_pdr(req, eid, handle).await?;
        let next = pdr.next_record_handle;
        trace!(
            "PDR handle {} type {} len {}, next {next}",
            pdr.header.record_handle,
            pdr.header.pdr_type,
            pdr.data.len()
        );
        seen.insert(pdr.header.record_handle);
        pdrs.push(pdr);

        if next == 0 {
            break;
        }
        if seen.contains(&next) {
            return Err(ReassemblyError::ProtocolViolation(format!(
                "PDR next record handle {next} repeats"
            )));
        }
        handle = next;
    }

    debug!("{} PDRs from {eid}", pdrs.len());
    Ok(pdrs)
}

/// Retrieves PDR repository information.
pub async fn get_pdr_repository_info<T: Transport>(
    req: &Requester<T>,
    eid: Eid,
) -> Result<GetPDRRepositoryInfoResp, EngineError> {
    let r =
        PldmRequest::new(PLDM_TYPE_PLATFORM, Cmd::GetPDRRepositoryInfo as u8);
    let resp = req.send_and_await(eid, &r).await?;
    ccode_result(resp.cc)?;

    let ((rest, _), info) =
        GetPDRRepositoryInfoResp::from_bytes((&resp.data, 0))
            .map_err(pldm::PldmError::from)?;
    if !rest.is_empty() {
        debug!("Extra GetPDRRepositoryInfo response");
    }
    Ok(info)
}
