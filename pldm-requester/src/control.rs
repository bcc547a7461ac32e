// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! PLDM Control (type 0) requester helpers
//!
//! Terminus discovery commands, issued through a [`Requester`].
#[allow(unused)]
use log::{debug, error, info, trace, warn};

use crc::{Crc, CRC_32_ISO_HDLC};
use deku::{DekuContainerRead, DekuContainerWrite};

use mctp::Eid;
use pldm::control::{self, Cmd, PLDM_TYPE_CONTROL};
use pldm::{
    ccode_result, PldmRequest, PldmResponse, TransferFlag, TransferOperation,
};

use crate::{reassemble, Part, PartTransfer, ReassemblyError, Requester};
use crate::{Result, Transport};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn request(
    cmd: Cmd,
    body: &impl DekuContainerWrite,
) -> pldm::Result<PldmRequest> {
    let data = body.to_bytes()?;
    Ok(PldmRequest::new_data(PLDM_TYPE_CONTROL, cmd as u8, data))
}

/// Decodes a fixed size response body
fn decode<'a, T: DekuContainerRead<'a>>(data: &'a [u8]) -> pldm::Result<T> {
    let ((rest, _), r) = T::from_bytes((data, 0))?;
    if !rest.is_empty() {
        debug!("{} extra response bytes", rest.len());
    }
    Ok(r)
}

/// Returns set bit positions of a little endian bitmask
fn bitmask_values(mask: &[u8]) -> Vec<u8> {
    (0..mask.len() * 8)
        .filter(|b| mask[b / 8] & (1 << (b % 8)) != 0)
        .map(|b| b as u8)
        .collect()
}

async fn command<T: Transport>(
    req: &Requester<T>,
    eid: Eid,
    r: &PldmRequest,
) -> Result<PldmResponse> {
    let resp = req.send_and_await(eid, r).await?;
    ccode_result(resp.cc)?;
    Ok(resp)
}

/// Perform a Get TID request.
pub async fn get_tid<T: Transport>(req: &Requester<T>, eid: Eid) -> Result<u8> {
    let r = PldmRequest::new(PLDM_TYPE_CONTROL, Cmd::GetTID as u8);
    let resp = command(req, eid, &r).await?;
    let tid: control::GetTIDResp = decode(&resp.data)?;
    Ok(tid.tid)
}

/// Perform a Get PLDM Types request.
///
/// Returns the supported PLDM types in ascending order.
pub async fn get_pldm_types<T: Transport>(
    req: &Requester<T>,
    eid: Eid,
) -> Result<Vec<u8>> {
    let r = PldmRequest::new(PLDM_TYPE_CONTROL, Cmd::GetPLDMTypes as u8);
    let resp = command(req, eid, &r).await?;
    let types: control::GetPLDMTypesResp = decode(&resp.data)?;
    Ok(bitmask_values(&types.types))
}

/// Perform a Get PLDM Commands request.
///
/// Returns the supported command codes of `pldm_type` at `version`, in
/// ascending order.
pub async fn get_pldm_commands<T: Transport>(
    req: &Requester<T>,
    eid: Eid,
    pldm_type: u8,
    version: u32,
) -> Result<Vec<u8>> {
    let body = control::GetPLDMCommandsReq { pldm_type, version };
    let r = request(Cmd::GetPLDMCommands, &body)?;
    let resp = command(req, eid, &r).await?;
    let cmds: control::GetPLDMCommandsResp = decode(&resp.data)?;
    Ok(bitmask_values(&cmds.commands))
}

struct VersionTransfer {
    pldm_type: u8,
}

impl PartTransfer for VersionTransfer {
    fn request(
        &mut self,
        handle: u32,
        op: TransferOperation,
    ) -> pldm::Result<PldmRequest> {
        let body = control::GetPLDMVersionReq {
            xfer_handle: handle,
            xfer_op: op as u8,
            pldm_type: self.pldm_type,
        };
        request(Cmd::GetPLDMVersion, &body)
    }

    fn decode(&mut self, resp: &PldmResponse) -> pldm::Result<Part> {
        let ((rest, _), v) =
            control::GetPLDMVersionResp::from_bytes((&resp.data, 0))?;
        Ok(Part {
            flag: TransferFlag::try_from(v.xfer_flag)?,
            next_handle: v.next_handle,
            data: rest.to_vec(),
        })
    }
}

/// Perform a Get PLDM Version request, retrieving all parts.
///
/// Returns the supported versions of `pldm_type`, each an encoded
/// `ver32`. The trailing CRC-32 of the version data is checked.
pub async fn get_pldm_version<T: Transport>(
    req: &Requester<T>,
    eid: Eid,
    pldm_type: u8,
) -> core::result::Result<Vec<u32>, ReassemblyError> {
    let mut xfer = VersionTransfer { pldm_type };
    let data = reassemble(req, eid, &mut xfer).await?;

    if data.len() < 8 || data.len() % 4 != 0 {
        return Err(ReassemblyError::ProtocolViolation(format!(
            "Bad version data length {}",
            data.len()
        )));
    }

    let (versions, crc) = data.split_at(data.len() - 4);
    let expect = CRC32.checksum(versions);
    let crc = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
    if crc != expect {
        debug!("Version CRC {crc:08x}, expected {expect:08x}");
        return Err(ReassemblyError::ProtocolViolation(
            "Version data CRC mismatch".into(),
        ));
    }

    Ok(versions
        .chunks_exact(4)
        .map(|v| u32::from_le_bytes([v[0], v[1], v[2], v[3]]))
        .collect())
}
