// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! Simulated PLDM Control responder for integration tests

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use crc::{Crc, CRC_32_ISO_HDLC};
use deku::{DekuContainerRead, DekuContainerWrite};
use futures::{pin_mut, select, FutureExt};
use std::future::Future;

use mctp::Eid;
use pldm::control::{
    Cmd, GetPLDMCommandsReq, GetPLDMVersionReq, GetPLDMVersionResp,
    PLDM_TYPE_CONTROL,
};
use pldm::{CCode, PldmHeader, PldmRequest, TransferFlag};
use pldm_requester::loopback::Loopback;
use pldm_requester::Requester;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Clock advance per scheduling round, milliseconds
pub const TICK: u64 = 10;

pub fn start_log() {
    let _ = env_logger::Builder::new()
        .filter(None, log::LevelFilter::Trace)
        .is_test(true)
        .try_init();
}

fn bitmask<const N: usize>(values: &[u8]) -> [u8; N] {
    let mut m = [0u8; N];
    for v in values {
        m[*v as usize / 8] |= 1 << (v % 8);
    }
    m
}

pub struct Terminus {
    pub eid: Eid,
    pub tid: u8,
    pub types: Vec<u8>,
    pub commands: Vec<u8>,
    pub versions: Vec<u32>,
    /// Version data bytes per GetPLDMVersion part
    pub part_size: usize,
    /// Drop every n-th request. 0 for no loss.
    pub drop_every: usize,
    /// Never respond
    pub silent: bool,
    /// Respond to a batch of requests in reverse order
    pub reverse: bool,
    pub corrupt_crc: bool,
    /// Count of requests received, including dropped ones
    pub received: usize,
}

impl Terminus {
    pub fn new(eid: Eid) -> Self {
        Self {
            eid,
            tid: 0x42,
            types: vec![0, 2],
            commands: vec![2, 3, 4, 5],
            versions: vec![0xf1f1f000, 0xf1f0f000],
            part_size: 64,
            drop_every: 0,
            silent: false,
            reverse: false,
            corrupt_crc: false,
            received: 0,
        }
    }

    pub fn version_data(&self) -> Vec<u8> {
        let mut d: Vec<u8> =
            self.versions.iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut crc = CRC32.checksum(&d);
        if self.corrupt_crc {
            crc ^= 1;
        }
        d.extend_from_slice(&crc.to_le_bytes());
        d
    }

    fn version_part(&self, body: &[u8]) -> Vec<u8> {
        let ((_, _), r) = GetPLDMVersionReq::from_bytes((body, 0)).unwrap();
        let data = self.version_data();
        let off = r.xfer_handle as usize;
        let end = (off + self.part_size).min(data.len());
        let last = end == data.len();
        let flag = match (off == 0, last) {
            (true, true) => TransferFlag::StartAndEnd,
            (true, false) => TransferFlag::Start,
            (false, true) => TransferFlag::End,
            (false, false) => TransferFlag::Middle,
        };
        let v = GetPLDMVersionResp {
            next_handle: if last { 0 } else { end as u32 },
            xfer_flag: flag as u8,
        };
        let mut d = v.to_bytes().unwrap();
        d.extend_from_slice(&data[off..end]);
        d
    }

    /// Returns a response message, or `None` if the request is dropped.
    pub fn respond(&mut self, msg: &[u8]) -> Option<Vec<u8>> {
        self.received += 1;
        if self.silent
            || (self.drop_every != 0 && self.received % self.drop_every == 0)
        {
            trace!("terminus dropping request {}", self.received);
            return None;
        }

        let (hdr, body) = PldmHeader::decode(msg).unwrap();
        assert!(hdr.request);
        let mut resp = PldmRequest::new(hdr.typ, hdr.cmd).response(hdr.iid);

        if hdr.typ != PLDM_TYPE_CONTROL {
            resp.cc = CCode::ERROR_INVALID_PLDM_TYPE as u8;
            return Some(resp.encode());
        }

        match Cmd::try_from(hdr.cmd) {
            Ok(Cmd::GetTID) => resp.set_data(vec![self.tid]),
            Ok(Cmd::GetPLDMTypes) => {
                resp.set_data(bitmask::<8>(&self.types).to_vec())
            }
            Ok(Cmd::GetPLDMCommands) => {
                let ((_, _), r) =
                    GetPLDMCommandsReq::from_bytes((body, 0)).unwrap();
                if r.pldm_type == PLDM_TYPE_CONTROL {
                    resp.set_data(bitmask::<32>(&self.commands).to_vec())
                } else {
                    resp.cc = CCode::ERROR_INVALID_PLDM_TYPE as u8
                }
            }
            Ok(Cmd::GetPLDMVersion) => resp.set_data(self.version_part(body)),
            _ => resp.cc = CCode::ERROR_UNSUPPORTED_PLDM_CMD as u8,
        }
        Some(resp.encode())
    }
}

/// Responds to requests and advances the clock.
pub async fn serve(
    req: &Requester<Loopback>,
    lo: &Loopback,
    t: &mut Terminus,
) -> ! {
    let mut now = req.with(|h| h.now());
    loop {
        smol::future::yield_now().await;

        let mut batch = Vec::new();
        while let Some((eid, msg)) = lo.pop() {
            assert_eq!(eid, t.eid);
            batch.push(msg);
        }
        if t.reverse {
            batch.reverse();
        }
        for msg in batch {
            if let Some(resp) = t.respond(&msg) {
                req.inbound(t.eid, &resp).unwrap();
            }
        }

        now += TICK;
        req.update(now);
    }
}

/// Runs `test` to completion against a simulated terminus.
pub fn run<F: Future>(
    req: &Requester<Loopback>,
    lo: &Loopback,
    t: &mut Terminus,
    test: F,
) -> F::Output {
    smol::block_on(async {
        let s = serve(req, lo, t).fuse();
        let test = test.fuse();
        pin_mut!(s, test);
        select! {
            r = test => r,
            _ = s => unreachable!(),
        }
    })
}
