// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * PLDM requester demonstration against a simulated terminus.
 *
 * Copyright (c) 2025 Code Construct
 */
#[allow(unused)]
use log::{debug, error, info, trace, warn};

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use argh::FromArgs;
use crc::{Crc, CRC_32_ISO_HDLC};
use deku::{DekuContainerRead, DekuContainerWrite};
use futures::{pin_mut, select, FutureExt};

use mctp::Eid;
use pldm::control::{Cmd, GetPLDMVersionReq, GetPLDMVersionResp};
use pldm::{CCode, PldmHeader, PldmRequest, TransferFlag};
use pldm_requester::control::{get_pldm_types, get_pldm_version, get_tid};
use pldm_requester::loopback::Loopback;
use pldm_requester::{Config, Requester};

const EID: Eid = Eid(8);

/// Longest sleep between event loop iterations, milliseconds
const POLL_INTERVAL: u64 = 5;

#[derive(FromArgs, Debug)]
#[argh(description = "PLDM requester over a simulated lossy loopback")]
struct Args {
    #[argh(switch, short = 'd')]
    /// debug logging
    debug: bool,

    #[argh(switch)]
    /// trace logging
    trace: bool,

    /// drop every n-th request, 0 for none
    #[argh(option, default = "0")]
    drop_every: usize,

    /// number of retries
    #[argh(option)]
    retries: Option<u8>,

    /// per-attempt response timeout, milliseconds
    #[argh(option)]
    timeout: Option<u64>,

    /// version data bytes per response part
    #[argh(option, default = "6")]
    part_size: usize,

    /// number of discovery rounds
    #[argh(option, default = "1")]
    count: usize,
}

/// A terminus that responds to a few PLDM Control commands
struct SimTerminus {
    drop_every: usize,
    part_size: usize,
    received: usize,
    version_data: Vec<u8>,
}

impl SimTerminus {
    fn new(drop_every: usize, part_size: usize) -> Self {
        let crc = Crc::<u32>::new(&CRC_32_ISO_HDLC);
        let mut version_data: Vec<u8> = [0xf1f0f000u32, 0xf1f1f000]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let sum = crc.checksum(&version_data);
        version_data.extend_from_slice(&sum.to_le_bytes());

        Self {
            drop_every,
            part_size,
            received: 0,
            version_data,
        }
    }

    fn respond(&mut self, msg: &[u8]) -> Result<Option<Vec<u8>>> {
        self.received += 1;
        if self.drop_every != 0 && self.received % self.drop_every == 0 {
            info!("Terminus dropped request {}", self.received);
            return Ok(None);
        }

        let (hdr, body) = PldmHeader::decode(msg)?;
        let mut resp = PldmRequest::new(hdr.typ, hdr.cmd).response(hdr.iid);
        match Cmd::try_from(hdr.cmd) {
            Ok(Cmd::GetTID) => resp.set_data(vec![0x1d]),
            Ok(Cmd::GetPLDMTypes) => {
                let mut types = vec![0u8; 8];
                // Control and Platform
                types[0] = 0b101;
                resp.set_data(types)
            }
            Ok(Cmd::GetPLDMVersion) => {
                let ((_, _), v) = GetPLDMVersionReq::from_bytes((body, 0))?;
                let data = &self.version_data;
                let off = v.xfer_handle as usize;
                if off >= data.len() {
                    bail!("Bad version handle {off}");
                }
                let end = (off + self.part_size).min(data.len());
                let flag = match (off == 0, end == data.len()) {
                    (true, true) => TransferFlag::StartAndEnd,
                    (true, false) => TransferFlag::Start,
                    (false, true) => TransferFlag::End,
                    (false, false) => TransferFlag::Middle,
                };
                let next_handle = if flag.is_end() { 0 } else { end as u32 };
                let mut d = GetPLDMVersionResp {
                    next_handle,
                    xfer_flag: flag as u8,
                }
                .to_bytes()?;
                d.extend_from_slice(&data[off..end]);
                resp.set_data(d)
            }
            _ => resp.cc = CCode::ERROR_UNSUPPORTED_PLDM_CMD as u8,
        }
        Ok(Some(resp.encode()))
    }
}

/// Delivers requests to the terminus and runs timers.
async fn event_loop(
    req: &Requester<Loopback>,
    lo: &Loopback,
    term: &mut SimTerminus,
) -> Result<()> {
    let start = Instant::now();
    loop {
        while let Some((eid, msg)) = lo.pop() {
            if let Some(resp) = term.respond(&msg)? {
                req.inbound(eid, &resp)?;
            }
        }

        let now = start.elapsed().as_millis() as u64;
        let next = req.update(now);
        smol::Timer::after(Duration::from_millis(next.min(POLL_INTERVAL)))
            .await;
    }
}

async fn discover(req: &Requester<Loopback>) -> Result<()> {
    let tid = get_tid(req, EID).await.context("Get TID failed")?;
    let types = get_pldm_types(req, EID)
        .await
        .context("Get PLDM Types failed")?;
    println!("TID {tid}, types {types:?}");

    for t in types {
        let versions = get_pldm_version(req, EID, t)
            .await
            .with_context(|| format!("Get PLDM Version failed for {t}"))?;
        println!("  type {t} versions {versions:08x?}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();

    let level = if args.trace {
        log::LevelFilter::Trace
    } else if args.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .init();

    let mut config = Config::default();
    if let Some(r) = args.retries {
        config.retries = r;
    }
    if let Some(t) = args.timeout {
        config.response_timeout = t;
    }
    config.expiry_after_retries();

    let lo = Loopback::new();
    let req = Requester::new(lo.clone(), config)?;
    let mut term = SimTerminus::new(args.drop_every, args.part_size.max(1));

    smol::block_on(async {
        let ev = event_loop(&req, &lo, &mut term).fuse();
        let run = async {
            for _ in 0..args.count {
                discover(&req).await?;
            }
            Ok::<_, anyhow::Error>(())
        }
        .fuse();
        pin_mut!(ev, run);
        select! {
            r = run => r,
            r = ev => r,
        }
    })?;

    info!(
        "{} requests sent, {} received by terminus",
        lo.sent_count(),
        term.received
    );
    Ok(())
}
