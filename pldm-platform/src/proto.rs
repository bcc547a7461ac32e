// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! PLDM Platform wire definitions for PDR repository access
#[allow(unused)]
use log::{debug, error, info, trace, warn};

use num_derive::FromPrimitive;

use deku::{deku_derive, DekuRead, DekuWrite};

/// PLDM Platform Commands
#[allow(missing_docs)]
#[derive(FromPrimitive, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Cmd {
    GetPDRRepositoryInfo = 0x50,
    GetPDR = 0x51,
    FindPDR = 0x52,
    GetPDRRepositorySignature = 0x53,
    RunInitAgent = 0x58,
}

/// PLDM platform response codes
#[allow(missing_docs)]
mod plat_codes {
    pub const INVALID_DATA_TRANSFER_HANDLE: u8 = 0x80;
    pub const INVALID_TRANSFER_OPERATION_FLAG: u8 = 0x81;
    pub const INVALID_RECORD_HANDLE: u8 = 0x82;
    pub const INVALID_RECORD_CHANGE_NUMBER: u8 = 0x83;
    pub const TRANSFER_TIMEOUT: u8 = 0x84;
    pub const REPOSITORY_UPDATE_IN_PROGRESS: u8 = 0x85;
}

pub use plat_codes::*;

/// Length of the common PDR header
pub const PDR_HEADER_LEN: usize = 10;

/// PDR types
#[allow(missing_docs)]
#[derive(FromPrimitive, Debug, PartialEq, Eq, Copy, Clone)]
#[repr(u8)]
pub enum PdrType {
    TerminusLocator = 1,
    NumericSensor = 2,
    NumericSensorInitialization = 3,
    StateSensor = 4,
    StateSensorInitialization = 5,
    SensorAuxiliaryNames = 6,
    OemUnit = 7,
    OemStateSet = 8,
    NumericEffecter = 9,
    NumericEffecterInitialization = 10,
    StateEffecter = 11,
    StateEffecterInitialization = 12,
    EffecterAuxiliaryNames = 13,
    EffecterOemSemantic = 14,
    EntityAssociation = 15,
    EntityAuxiliaryNames = 16,
    OemEntityIdHandle = 17,
    InterruptAssociation = 18,
    EventLog = 19,
    FruRecordSet = 20,
    CompactNumericSensor = 21,
    RedfishResource = 22,
    RedfishEntityAssociation = 23,
    RedfishActionPdr = 24,
    Oem = 126,
}

/// Repository state, from GetPDRRepositoryInfo
#[allow(missing_docs)]
#[derive(FromPrimitive, Debug, PartialEq, Eq, Copy, Clone)]
#[repr(u8)]
pub enum RepositoryState {
    Available = 0,
    UpdateInProgress = 1,
    Failed = 2,
}

/// GetPDRRepositoryInfo response
#[allow(missing_docs)]
#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone)]
#[deku(endian = "little")]
pub struct GetPDRRepositoryInfoResp {
    /// A [`RepositoryState`] value
    pub repository_state: u8,
    /// timestamp104
    pub update_time: [u8; 13],
    /// timestamp104
    pub oem_update_time: [u8; 13],
    pub record_count: u32,
    pub repository_size: u32,
    pub largest_record_size: u32,
    pub data_transfer_handle_timeout: u8,
}

/// GetPDR request
#[allow(missing_docs)]
#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone)]
#[deku(endian = "little")]
pub struct GetPDRReq {
    pub record_handle: u32,
    pub data_transfer_handle: u32,
    /// A [`TransferOperation`](pldm::TransferOperation) value
    pub transfer_operation_flag: u8,
    pub request_count: u16,
    /// Zero for the first part, otherwise from the PDR header
    pub record_change_number: u16,
}

/// GetPDR response
///
/// A `transferCRC` byte follows the record data when `transfer_flag`
/// is `End`.
#[allow(missing_docs)]
#[deku_derive(DekuRead, DekuWrite)]
#[derive(Debug, PartialEq, Eq, Clone)]
#[deku(endian = "little")]
pub struct GetPDRResp {
    pub next_record_handle: u32,
    pub next_data_transfer_handle: u32,
    /// A [`TransferFlag`](pldm::TransferFlag) value
    pub transfer_flag: u8,
    #[deku(temp, temp_value = "self.record_data.len() as u16")]
    response_count: u16,
    #[deku(count = "response_count")]
    pub record_data: Vec<u8>,
}

/// Common header at the start of each PDR
#[allow(missing_docs)]
#[derive(Debug, DekuRead, DekuWrite, PartialEq, Eq, Clone)]
#[deku(endian = "little")]
pub struct PdrHeader {
    pub record_handle: u32,
    pub version: u8,
    /// A [`PdrType`] value
    pub pdr_type: u8,
    pub record_change_number: u16,
    /// Length of the record following the header
    pub data_length: u16,
}
