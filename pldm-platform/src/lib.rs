// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

#![forbid(unsafe_code)]

//! PLDM Platform Monitoring and Control (type 2)
//!
//! Retrieval of the Platform Descriptor Record (PDR) repository from a
//! terminus, using [`pldm_requester`].

pub mod proto;
pub mod requester;

pub use requester::{get_pdr, get_pdr_repository, get_pdr_repository_info, Pdr};

/// PLDM type for Platform Monitoring and Control
pub const PLDM_TYPE_PLATFORM: u8 = 2;
