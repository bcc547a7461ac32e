// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

#[allow(unused)]
use log::{debug, error, info, trace, warn};

use crc::{Crc, CRC_8_SMBUS};
use deku::{DekuContainerRead, DekuContainerWrite};
use futures::{pin_mut, select, FutureExt};
use std::future::Future;

use mctp::Eid;
use pldm::{CCode, PldmHeader, PldmRequest, TransferFlag, TransferOperation};
use pldm_platform::proto::*;
use pldm_platform::{
    get_pdr, get_pdr_repository, get_pdr_repository_info, PLDM_TYPE_PLATFORM,
};
use pldm_requester::loopback::Loopback;
use pldm_requester::{Config, ReassemblyError, Requester};

const EID: Eid = Eid(40);

fn start_log() {
    let _ = env_logger::Builder::new()
        .filter(None, log::LevelFilter::Trace)
        .is_test(true)
        .try_init();
}

fn pdr(record_handle: u32, pdr_type: PdrType, body: &[u8]) -> Vec<u8> {
    let hdr = PdrHeader {
        record_handle,
        version: 1,
        pdr_type: pdr_type as u8,
        record_change_number: 0x10 + record_handle as u16,
        data_length: body.len() as u16,
    };
    let mut d = hdr.to_bytes().unwrap();
    d.extend_from_slice(body);
    d
}

/// A terminus holding a PDR repository
struct Repository {
    records: Vec<(u32, Vec<u8>)>,
    /// Largest part returned, limited further by the request count
    max_part: usize,
    /// Next record handle of the last record
    last_next: u32,
    corrupt_crc: bool,
    requests: Vec<GetPDRReq>,
}

impl Repository {
    fn new() -> Self {
        let big: Vec<u8> = (0..600u32).map(|i| i as u8).collect();
        Self {
            records: vec![
                (1, pdr(1, PdrType::TerminusLocator, &[1, 2, 3, 4])),
                (2, pdr(2, PdrType::NumericSensor, &big)),
                (5, pdr(5, PdrType::StateSensor, &[9; 20])),
            ],
            max_part: 255,
            last_next: 0,
            corrupt_crc: false,
            requests: Vec::new(),
        }
    }

    fn get_pdr(&mut self, body: &[u8]) -> (u8, Vec<u8>) {
        let ((_, _), r) = GetPDRReq::from_bytes((body, 0)).unwrap();
        self.requests.push(r.clone());

        let idx = if r.record_handle == 0 {
            Some(0)
        } else {
            self.records.iter().position(|(h, _)| *h == r.record_handle)
        };
        let Some(idx) = idx else {
            return (INVALID_RECORD_HANDLE, vec![]);
        };
        let record = &self.records[idx].1;
        let next_record_handle = self
            .records
            .get(idx + 1)
            .map_or(self.last_next, |(h, _)| *h);

        let off = r.data_transfer_handle as usize;
        if r.transfer_operation_flag == TransferOperation::NextPart as u8 {
            let ((_, _), hdr) = PdrHeader::from_bytes((record, 0)).unwrap();
            if r.record_change_number != hdr.record_change_number {
                return (INVALID_RECORD_CHANGE_NUMBER, vec![]);
            }
        }
        if off >= record.len() {
            return (INVALID_DATA_TRANSFER_HANDLE, vec![]);
        }

        let count = self.max_part.min(r.request_count as usize);
        let end = (off + count).min(record.len());
        let flag = match (off == 0, end == record.len()) {
            (true, true) => TransferFlag::StartAndEnd,
            (true, false) => TransferFlag::Start,
            (false, true) => TransferFlag::End,
            (false, false) => TransferFlag::Middle,
        };
        let resp = GetPDRResp {
            next_record_handle,
            next_data_transfer_handle: if flag.is_end() { 0 } else { end as u32 },
            transfer_flag: flag as u8,
            record_data: record[off..end].to_vec(),
        };
        let mut d = resp.to_bytes().unwrap();
        if flag == TransferFlag::End {
            let mut crc = Crc::<u8>::new(&CRC_8_SMBUS).checksum(record);
            if self.corrupt_crc {
                crc ^= 0xff;
            }
            d.push(crc);
        }
        (0, d)
    }

    fn repository_info(&self) -> Vec<u8> {
        GetPDRRepositoryInfoResp {
            repository_state: RepositoryState::Available as u8,
            update_time: [0; 13],
            oem_update_time: [0; 13],
            record_count: self.records.len() as u32,
            repository_size: self
                .records
                .iter()
                .map(|r| r.1.len() as u32)
                .sum(),
            largest_record_size: 610,
            data_transfer_handle_timeout: 0,
        }
        .to_bytes()
        .unwrap()
    }

    fn respond(&mut self, msg: &[u8]) -> Vec<u8> {
        let (hdr, body) = PldmHeader::decode(msg).unwrap();
        assert_eq!(hdr.typ, PLDM_TYPE_PLATFORM);
        let mut resp = PldmRequest::new(hdr.typ, hdr.cmd).response(hdr.iid);
        if hdr.cmd == Cmd::GetPDR as u8 {
            let (cc, data) = self.get_pdr(body);
            resp.cc = cc;
            resp.set_data(data);
        } else if hdr.cmd == Cmd::GetPDRRepositoryInfo as u8 {
            resp.set_data(self.repository_info());
        } else {
            resp.cc = CCode::ERROR_UNSUPPORTED_PLDM_CMD as u8;
        }
        resp.encode()
    }
}

async fn serve(
    req: &Requester<Loopback>,
    lo: &Loopback,
    repo: &mut Repository,
) -> ! {
    let mut now = req.with(|h| h.now());
    loop {
        smol::future::yield_now().await;
        while let Some((eid, msg)) = lo.pop() {
            req.inbound(eid, &repo.respond(&msg)).unwrap();
        }
        now += 10;
        req.update(now);
    }
}

fn setup() -> (Requester<Loopback>, Loopback) {
    start_log();
    let lo = Loopback::new();
    let req = Requester::new(lo.clone(), Config::default()).unwrap();
    (req, lo)
}

fn run<F: Future>(
    req: &Requester<Loopback>,
    lo: &Loopback,
    repo: &mut Repository,
    test: F,
) -> F::Output {
    let r = smol::block_on(async {
        let s = serve(req, lo, repo).fuse();
        let t = test.fuse();
        pin_mut!(s, t);
        select! {
            r = t => r,
            _ = s => unreachable!(),
        }
    });
    assert_eq!(req.outstanding(), 0);
    r
}

#[test]
fn repository() {
    let (req, lo) = setup();
    let mut repo = Repository::new();
    let pdrs = run(&req, &lo, &mut repo, get_pdr_repository(&req, EID))
        .unwrap();

    assert_eq!(pdrs.len(), 3);
    let handles: Vec<u32> =
        pdrs.iter().map(|p| p.header.record_handle).collect();
    assert_eq!(handles, [1, 2, 5]);
    assert_eq!(pdrs[0].pdr_type(), Some(PdrType::TerminusLocator));
    assert_eq!(pdrs[0].data, [1, 2, 3, 4]);
    assert_eq!(pdrs[1].pdr_type(), Some(PdrType::NumericSensor));
    assert_eq!(pdrs[1].data.len(), 600);
    assert!(pdrs[1].data.iter().enumerate().all(|(i, d)| *d == i as u8));
    assert_eq!(pdrs[2].next_record_handle, 0);

    // One request each for the small records, three for the 610 byte one
    assert_eq!(repo.requests.len(), 5);
    let big: Vec<_> =
        repo.requests.iter().filter(|r| r.record_handle == 2).collect();
    assert_eq!(
        big.iter().map(|r| r.data_transfer_handle).collect::<Vec<_>>(),
        [0, 255, 510]
    );
    assert_eq!(big[0].record_change_number, 0);
    assert_eq!(big[1].record_change_number, 0x12);
    assert_eq!(big[2].record_change_number, 0x12);
}

#[test]
fn single_record() {
    let (req, lo) = setup();
    let mut repo = Repository::new();
    let p = run(&req, &lo, &mut repo, get_pdr(&req, EID, 5)).unwrap();
    assert_eq!(p.header.record_handle, 5);
    assert_eq!(p.pdr_type(), Some(PdrType::StateSensor));
    assert_eq!(p.data, [9; 20]);
    assert_eq!(repo.requests.len(), 1);
}

#[test]
fn small_parts() {
    let (req, lo) = setup();
    let mut repo = Repository::new();
    repo.max_part = 12;
    let p = run(&req, &lo, &mut repo, get_pdr(&req, EID, 2)).unwrap();
    assert_eq!(p.data.len(), 600);
    assert_eq!(repo.requests.len(), 610usize.div_ceil(12));
}

#[test]
fn bad_crc() {
    let (req, lo) = setup();
    let mut repo = Repository::new();
    repo.corrupt_crc = true;
    let r = run(&req, &lo, &mut repo, get_pdr(&req, EID, 2));
    assert!(matches!(r, Err(ReassemblyError::Pldm(_))));

    // Single part records carry no CRC
    let r = run(&req, &lo, &mut repo, get_pdr(&req, EID, 1));
    assert!(r.is_ok());
}

#[test]
fn invalid_handle() {
    let (req, lo) = setup();
    let mut repo = Repository::new();
    let r = run(&req, &lo, &mut repo, get_pdr(&req, EID, 3));
    assert!(matches!(
        r,
        Err(ReassemblyError::Completion(INVALID_RECORD_HANDLE))
    ));
}

#[test]
fn handle_loop() {
    let (req, lo) = setup();
    let mut repo = Repository::new();
    repo.last_next = 2;
    let r = run(&req, &lo, &mut repo, get_pdr_repository(&req, EID));
    assert!(matches!(r, Err(ReassemblyError::ProtocolViolation(_))));
}

#[test]
fn repository_info() {
    let (req, lo) = setup();
    let mut repo = Repository::new();
    let info =
        run(&req, &lo, &mut repo, get_pdr_repository_info(&req, EID)).unwrap();
    assert_eq!(info.repository_state, RepositoryState::Available as u8);
    assert_eq!(info.record_count, 3);
}
