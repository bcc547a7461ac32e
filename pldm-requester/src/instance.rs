// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * Copyright (c) 2025 Code Construct
 */

//! PLDM instance ID allocation
#[allow(unused)]
use log::{debug, error, info, trace, warn};

use heapless::LinearMap;

use mctp::Eid;
use pldm::PLDM_MAX_INSTANCE_ID;

use crate::config::MAX_ENDPOINTS;
use crate::{EngineError, Result};

/// A PLDM instance ID, 0 to 31.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct InstanceId(pub u8);

impl core::fmt::Display for InstanceId {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        self.0.fmt(fmt)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct EidInstances {
    // Bitmask of allocated instance IDs
    used: u32,
    // Search starts here, so that a freed ID isn't immediately reused.
    // A late response to an expired request is then unlikely to match
    // a newer request.
    next: u8,
}

/// Per-endpoint pool of instance IDs.
///
/// At most one instance ID value is allocated for an endpoint at a time.
#[derive(Debug, Default)]
pub struct InstanceIdAllocator {
    eids: LinearMap<Eid, EidInstances, MAX_ENDPOINTS>,
}

impl InstanceIdAllocator {
    /// Create an empty allocator
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an unused instance ID for `eid`.
    ///
    /// Returns [`EngineError::ExhaustedPool`] if all 32 instance IDs are
    /// allocated for `eid`, or if too many endpoints have outstanding
    /// instance IDs.
    pub fn allocate(&mut self, eid: Eid) -> Result<InstanceId> {
        let ent = self.entry(eid)?;

        let start = ent.next;
        for n in 0..=PLDM_MAX_INSTANCE_ID {
            let i = (start + n) & PLDM_MAX_INSTANCE_ID;
            let bit = 1u32 << i;
            if ent.used & bit == 0 {
                ent.used |= bit;
                ent.next = (i + 1) & PLDM_MAX_INSTANCE_ID;
                trace!("allocated iid {i} for eid {eid}");
                return Ok(InstanceId(i));
            }
        }

        debug!("No free instance IDs for eid {eid}");
        Err(EngineError::ExhaustedPool)
    }

    /// Releases an instance ID.
    ///
    /// Freeing an ID that isn't allocated has no effect.
    pub fn free(&mut self, eid: Eid, iid: InstanceId) {
        if iid.0 > PLDM_MAX_INSTANCE_ID {
            debug!("Free of invalid iid {iid}");
            return;
        }
        if let Some(ent) = self.eids.get_mut(&eid) {
            if ent.used & (1 << iid.0) != 0 {
                trace!("freed iid {iid} for eid {eid}");
            }
            ent.used &= !(1 << iid.0);
        }
    }

    /// Returns `true` if `iid` is currently allocated for `eid`.
    pub fn is_allocated(&self, eid: Eid, iid: InstanceId) -> bool {
        iid.0 <= PLDM_MAX_INSTANCE_ID
            && self
                .eids
                .get(&eid)
                .is_some_and(|ent| ent.used & (1 << iid.0) != 0)
    }

    /// Returns the number of allocated instance IDs for `eid`.
    pub fn in_use(&self, eid: Eid) -> usize {
        self.eids
            .get(&eid)
            .map_or(0, |ent| ent.used.count_ones() as usize)
    }

    /// Finds or creates the entry for `eid`.
    ///
    /// When full, an endpoint with no allocated IDs is evicted.
    fn entry(&mut self, eid: Eid) -> Result<&mut EidInstances> {
        if !self.eids.contains_key(&eid) {
            let mut r = self.eids.insert(eid, EidInstances::default());
            if r.is_err() {
                let idle = self
                    .eids
                    .iter()
                    .find(|(_e, ent)| ent.used == 0)
                    .map(|(e, _ent)| *e);
                if let Some(idle) = idle {
                    trace!("evicting idle eid {idle}");
                    self.eids.remove(&idle);
                    r = self.eids.insert(eid, EidInstances::default());
                }
            }
            if r.is_err() {
                debug!("Too many endpoints for iid allocation");
                return Err(EngineError::ExhaustedPool);
            }
        }
        // Present, checked above
        self.eids.get_mut(&eid).ok_or(EngineError::ExhaustedPool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EID: Eid = Eid(9);

    #[test]
    fn exhaust() {
        let mut a = InstanceIdAllocator::new();
        let mut seen = 0u32;
        for _ in 0..32 {
            let i = a.allocate(EID).unwrap();
            assert_eq!(seen & (1 << i.0), 0, "duplicate {i}");
            seen |= 1 << i.0;
        }
        assert_eq!(seen, u32::MAX);
        assert_eq!(a.in_use(EID), 32);
        assert!(matches!(a.allocate(EID), Err(EngineError::ExhaustedPool)));

        // Other endpoints are independent
        a.allocate(Eid(10)).unwrap();

        a.free(EID, InstanceId(17));
        assert_eq!(a.allocate(EID).unwrap(), InstanceId(17));
    }

    #[test]
    fn free_idempotent() {
        let mut a = InstanceIdAllocator::new();
        let i = a.allocate(EID).unwrap();
        assert!(a.is_allocated(EID, i));
        a.free(EID, i);
        a.free(EID, i);
        assert!(!a.is_allocated(EID, i));
        assert_eq!(a.in_use(EID), 0);

        // Never allocated, or unknown endpoint
        a.free(EID, InstanceId(30));
        a.free(Eid(99), InstanceId(0));
        a.free(EID, InstanceId(200));
        assert_eq!(a.in_use(EID), 0);
    }

    #[test]
    fn not_reused_immediately() {
        let mut a = InstanceIdAllocator::new();
        let i1 = a.allocate(EID).unwrap();
        a.free(EID, i1);
        let i2 = a.allocate(EID).unwrap();
        assert_ne!(i1, i2);
    }

    #[test]
    fn endpoint_limit() {
        let mut a = InstanceIdAllocator::new();
        for e in 0..MAX_ENDPOINTS {
            a.allocate(Eid(e as u8 + 8)).unwrap();
        }
        let extra = Eid(200);
        assert!(matches!(a.allocate(extra), Err(EngineError::ExhaustedPool)));

        // An idle endpoint can be evicted
        a.free(Eid(8), InstanceId(0));
        a.allocate(extra).unwrap();
        assert_eq!(a.in_use(Eid(8)), 0);
    }

    proptest! {
        #[test]
        fn allocations_unique(ops in prop::collection::vec(
            (any::<bool>(), 0u8..32), 0..300)) {
            let mut a = InstanceIdAllocator::new();
            let mut held = Vec::<InstanceId>::new();

            for (alloc, n) in ops {
                if alloc {
                    match a.allocate(EID) {
                        Ok(i) => {
                            prop_assert!(!held.contains(&i));
                            held.push(i);
                        }
                        Err(_) => prop_assert_eq!(held.len(), 32),
                    }
                } else if !held.is_empty() {
                    let i = held.swap_remove(n as usize % held.len());
                    a.free(EID, i);
                }
                prop_assert_eq!(a.in_use(EID), held.len());
            }
        }
    }
}
