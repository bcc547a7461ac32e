// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * PLDM Messaging Control and Discovery ("PLDM Control") definitions.
 *
 * Copyright (c) 2025 Code Construct
 */

//! PLDM Messaging Control and Discovery ("PLDM Control" / type 0) messaging
//! support.
//!
//! This module provides wire definitions for the PLDM control requests
//! used during terminus discovery.

use deku::{DekuRead, DekuWrite};

use crate::{proto_error, PldmError, Result};

/// PLDM type for Messaging Control and Discovery
pub const PLDM_TYPE_CONTROL: u8 = 0;

/// PLDM Control command codes
#[allow(missing_docs)]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
#[repr(u8)]
#[non_exhaustive]
pub enum Cmd {
    SetTID = 0x01,
    GetTID = 0x02,
    GetPLDMVersion = 0x03,
    GetPLDMTypes = 0x04,
    GetPLDMCommands = 0x05,
    SelectPLDMVersion = 0x06,
    NegotiateTransferParameters = 0x07,
    MultipartSend = 0x08,
    MultipartReceive = 0x09,
}

impl TryFrom<u8> for Cmd {
    type Error = PldmError;

    fn try_from(value: u8) -> Result<Self> {
        let c = match value {
            0x01 => Self::SetTID,
            0x02 => Self::GetTID,
            0x03 => Self::GetPLDMVersion,
            0x04 => Self::GetPLDMTypes,
            0x05 => Self::GetPLDMCommands,
            0x06 => Self::SelectPLDMVersion,
            0x07 => Self::NegotiateTransferParameters,
            0x08 => Self::MultipartSend,
            0x09 => Self::MultipartReceive,
            v => {
                return Err(proto_error!(
                    "Unknown PLDM control command",
                    "{v:02x}"
                ));
            }
        };
        Ok(c)
    }
}

/// Get TID response
#[allow(missing_docs)]
#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone)]
pub struct GetTIDResp {
    pub tid: u8,
}

/// Get PLDM Types response
#[allow(missing_docs)]
#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone)]
pub struct GetPLDMTypesResp {
    /// Bitmask of supported types, bit 0 of byte 0 is type 0.
    pub types: [u8; 8],
}

/// Get PLDM Version request
#[allow(missing_docs)]
#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone)]
#[deku(endian = "little")]
pub struct GetPLDMVersionReq {
    pub xfer_handle: u32,
    /// A [`TransferOperation`](crate::TransferOperation) value
    pub xfer_op: u8,
    pub pldm_type: u8,
}

/// Get PLDM Version response, fixed portion
///
/// The version data part follows in the remainder of the message.
#[allow(missing_docs)]
#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone)]
#[deku(endian = "little")]
pub struct GetPLDMVersionResp {
    pub next_handle: u32,
    /// A [`TransferFlag`](crate::TransferFlag) value
    pub xfer_flag: u8,
}

/// Get PLDM Commands request
#[allow(missing_docs)]
#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone)]
#[deku(endian = "little")]
pub struct GetPLDMCommandsReq {
    pub pldm_type: u8,
    pub version: u32,
}

/// Get PLDM Commands response
#[allow(missing_docs)]
#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone)]
pub struct GetPLDMCommandsResp {
    /// Bitmask of supported commands, bit 0 of byte 0 is command 0.
    pub commands: [u8; 32],
}
