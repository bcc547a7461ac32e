// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * PLDM base message definitions.
 *
 * Copyright (c) 2023-2025 Code Construct
 */

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Platform Level Data Model (PLDM) base protocol support
//!
//! This crate implements the base message framing for PLDM: the common
//! header, completion codes, and the multipart transfer enumerations
//! shared by every PLDM type. Higher level crates build requesters and
//! responders on top of these.

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use thiserror::Error;

pub mod control;

/// Maximum size of a PLDM message, defining our buffer sizes.
pub const PLDM_MAX_MSGSIZE: usize = 1024;

/// Length of a PLDM request header
pub const PLDM_REQ_HEADER_LEN: usize = 3;

/// Length of a PLDM response header, including the completion code
pub const PLDM_RESP_HEADER_LEN: usize = 4;

/// Largest PLDM instance ID. Instance IDs are a 5 bit field.
pub const PLDM_MAX_INSTANCE_ID: u8 = 0x1f;

const HDR_RQ: u8 = 0x80;
const HDR_D: u8 = 0x40;
const HDR_IID_MASK: u8 = 0x1f;
const HDR_VER_MASK: u8 = 0xc0;
const HDR_TYPE_MASK: u8 = 0x3f;

/// Generic PLDM error type
#[derive(Error, Debug)]
pub enum PldmError {
    /// PLDM protocol error
    #[error("PLDM protocol error: {0}")]
    Protocol(String),
    /// MCTP communication error
    #[error("MCTP error: {0}")]
    Mctp(mctp::Error),
    /// Insufficient buffer space available
    #[error("No buffer space available")]
    NoSpace,
    /// Invalid argument
    #[error("Invalid argument")]
    InvalidArgument,
}

impl PldmError {
    /// Construct a new PLDM protocol error with a description
    pub fn new_proto(s: String) -> Self {
        Self::Protocol(s)
    }
}

impl From<mctp::Error> for PldmError {
    fn from(e: mctp::Error) -> PldmError {
        PldmError::Mctp(e)
    }
}

impl From<deku::DekuError> for PldmError {
    fn from(e: deku::DekuError) -> PldmError {
        trace!("deku error {e}");
        match e {
            deku::DekuError::Incomplete(_) => {
                PldmError::Protocol("Short message".into())
            }
            _ => PldmError::Protocol(format!("Bad message: {e}")),
        }
    }
}

/// PLDM protocol return type
pub type Result<T> = core::result::Result<T, PldmError>;

/// Creates a [`PldmError::Protocol`] from a description and optional
/// format arguments.
///
/// ```
/// # use pldm::proto_error;
/// let e = proto_error!("Unexpected command", "{:02x}", 0x51);
/// ```
#[macro_export]
macro_rules! proto_error {
    ($msg: expr, $($arg:tt)+) => {
        $crate::PldmError::Protocol(format!(
            "{}: {}",
            $msg,
            format_args!($($arg)+)
        ))
    };
    ($msg: expr) => {
        $crate::PldmError::Protocol(::core::convert::Into::into($msg))
    };
}

/// Generic PLDM completion codes, from DSP0240.
///
/// Command-specific codes (0x80 and above) are defined by each PLDM type.
#[allow(missing_docs)]
#[repr(u8)]
#[allow(non_camel_case_types)]
#[derive(FromPrimitive, Debug, PartialEq, Eq, Copy, Clone)]
pub enum CCode {
    SUCCESS = 0,
    ERROR = 1,
    ERROR_INVALID_DATA = 2,
    ERROR_INVALID_LENGTH = 3,
    ERROR_NOT_READY = 4,
    ERROR_UNSUPPORTED_PLDM_CMD = 5,
    ERROR_INVALID_PLDM_TYPE = 32,
}

/// Returns `Ok` for a successful completion code.
pub fn ccode_result(cc: u8) -> Result<()> {
    match CCode::from_u8(cc) {
        Some(CCode::SUCCESS) => Ok(()),
        Some(e) => Err(proto_error!("Error response", "{e:?}")),
        None => Err(proto_error!("Error response", "0x{cc:02x}")),
    }
}

/// Transfer flag of a multipart response part.
///
/// Used by GetPLDMVersion, GetPDR, GetBIOSTable and friends to indicate
/// where a part sits within the complete record.
#[allow(missing_docs)]
#[derive(FromPrimitive, Debug, PartialEq, Eq, Copy, Clone)]
#[repr(u8)]
pub enum TransferFlag {
    Start = 0x01,
    Middle = 0x02,
    End = 0x04,
    StartAndEnd = 0x05,
}

impl TransferFlag {
    /// Returns `true` for a part that completes the record.
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End | Self::StartAndEnd)
    }

    /// Returns `true` for a part that begins the record.
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start | Self::StartAndEnd)
    }
}

impl TryFrom<u8> for TransferFlag {
    type Error = PldmError;

    fn try_from(value: u8) -> Result<Self> {
        Self::from_u8(value)
            .ok_or_else(|| proto_error!("Unknown transfer flag", "{value:02x}"))
    }
}

/// Transfer operation flag of a multipart request.
#[allow(missing_docs)]
#[derive(FromPrimitive, Debug, PartialEq, Eq, Copy, Clone)]
#[repr(u8)]
pub enum TransferOperation {
    NextPart = 0x00,
    FirstPart = 0x01,
}

/// Decoded PLDM message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PldmHeader {
    /// Request bit. Clear for responses.
    pub request: bool,
    /// Datagram bit, for unacknowledged requests
    pub datagram: bool,
    /// PLDM Instance ID
    pub iid: u8,
    /// PLDM type
    pub typ: u8,
    /// PLDM command code
    pub cmd: u8,
}

impl PldmHeader {
    /// Decodes a header, returning it along with the remainder of the
    /// message.
    ///
    /// For responses the remainder begins with the completion code.
    pub fn decode(msg: &[u8]) -> Result<(Self, &[u8])> {
        let Some((hdr, rest)) = msg.split_first_chunk::<PLDM_REQ_HEADER_LEN>()
        else {
            return Err(proto_error!("Short message", "{} bytes", msg.len()));
        };

        if hdr[1] & HDR_VER_MASK != 0 {
            return Err(proto_error!(
                "Unsupported header version",
                "{}",
                hdr[1] >> 6
            ));
        }

        let h = Self {
            request: hdr[0] & HDR_RQ != 0,
            datagram: hdr[0] & HDR_D != 0,
            iid: hdr[0] & HDR_IID_MASK,
            typ: hdr[1] & HDR_TYPE_MASK,
            cmd: hdr[2],
        };
        Ok((h, rest))
    }

    fn encode(&self) -> [u8; PLDM_REQ_HEADER_LEN] {
        let mut b0 = self.iid & HDR_IID_MASK;
        if self.request {
            b0 |= HDR_RQ;
        }
        if self.datagram {
            b0 |= HDR_D;
        }
        [b0, self.typ & HDR_TYPE_MASK, self.cmd]
    }
}

/// Base PLDM request type
///
/// The instance ID is not part of the request, it is assigned when the
/// request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PldmRequest {
    /// PLDM type.
    pub typ: u8,
    /// PLDM command code
    pub cmd: u8,
    /// PLDM command data payload
    pub data: Vec<u8>,
}

impl PldmRequest {
    /// Create a new PLDM request for a given PLDM message type and command
    /// number, with an empty payload.
    pub fn new(typ: u8, cmd: u8) -> Self {
        Self::new_data(typ, cmd, Vec::new())
    }

    /// Create a new PLDM request with a data payload.
    pub fn new_data(typ: u8, cmd: u8, data: Vec<u8>) -> Self {
        Self { typ, cmd, data }
    }

    /// Set the data payload for this request
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    /// Encodes the complete request message with an instance ID.
    ///
    /// Returns [`PldmError::InvalidArgument`] for an out of range
    /// instance ID or type.
    pub fn encode(&self, iid: u8) -> Result<Vec<u8>> {
        if iid > PLDM_MAX_INSTANCE_ID || self.typ > HDR_TYPE_MASK {
            return Err(PldmError::InvalidArgument);
        }
        let hdr = PldmHeader {
            request: true,
            datagram: false,
            iid,
            typ: self.typ,
            cmd: self.cmd,
        };
        let mut tx_buf =
            Vec::with_capacity(self.data.len() + PLDM_REQ_HEADER_LEN);
        tx_buf.extend_from_slice(&hdr.encode());
        tx_buf.extend_from_slice(&self.data);
        Ok(tx_buf)
    }

    /// Create a response to this request with the given instance ID, and
    /// the type and command from this request.
    pub fn response(&self, iid: u8) -> PldmResponse {
        PldmResponse {
            iid,
            typ: self.typ,
            cmd: self.cmd,
            cc: CCode::SUCCESS as u8,
            data: Vec::new(),
        }
    }
}

/// Base PLDM response type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PldmResponse {
    /// PLDM Instance ID
    pub iid: u8,
    /// PLDM type
    pub typ: u8,
    /// PLDM command code (defined by the original request)
    pub cmd: u8,
    /// PLDM completion code
    pub cc: u8,
    /// PLDM response data payload. Does not include the cc field.
    pub data: Vec<u8>,
}

impl PldmResponse {
    /// Constructs a response from header fields and the message
    /// remainder following the header.
    ///
    /// `rest` must contain at least the completion code.
    pub fn from_parts(iid: u8, typ: u8, cmd: u8, rest: &[u8]) -> Result<Self> {
        let Some((cc, data)) = rest.split_first() else {
            return Err(proto_error!("Short response, no completion code"));
        };
        Ok(Self {
            iid,
            typ,
            cmd,
            cc: *cc,
            data: data.to_vec(),
        })
    }

    /// Decodes a complete response message.
    pub fn decode(msg: &[u8]) -> Result<Self> {
        let (hdr, rest) = PldmHeader::decode(msg)?;
        if hdr.request {
            return Err(proto_error!("Expected a response, got a request"));
        }
        Self::from_parts(hdr.iid, hdr.typ, hdr.cmd, rest)
    }

    /// Set the data payload for this response
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = data;
    }

    /// Encodes the complete response message.
    pub fn encode(&self) -> Vec<u8> {
        let hdr = PldmHeader {
            request: false,
            datagram: false,
            iid: self.iid,
            typ: self.typ,
            cmd: self.cmd,
        };
        let mut tx_buf =
            Vec::with_capacity(self.data.len() + PLDM_RESP_HEADER_LEN);
        tx_buf.extend_from_slice(&hdr.encode());
        tx_buf.push(self.cc);
        tx_buf.extend_from_slice(&self.data);
        tx_buf
    }
}
