//! Domain level compatibility
//!
//! The domain level is the cluster-wide feature baseline every member must
//! support. This version accepts levels in `[MIN_DOMAIN_LEVEL,
//! MAX_DOMAIN_LEVEL]`; each mode narrows that range further.

use std::fmt;

use crate::config::Mode;
use crate::errors::{ReplicaError, ReplicaResult};

/// Lowest level this version can join
pub const MIN_DOMAIN_LEVEL: u32 = 0;
/// Highest level this version can join
pub const MAX_DOMAIN_LEVEL: u32 = 1;

/// Cluster domain level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DomainLevel(pub u32);

impl DomainLevel {
    /// Level of clusters that predate the domain level entry
    pub const LEGACY: DomainLevel = DomainLevel(0);

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DomainLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Levels a mode accepts, inclusive.
///
/// Bundle mode is the legacy path and only works at level 0; promotion
/// needs the replication managers introduced at level 1.
pub fn mode_bounds(mode: Mode) -> (u32, u32) {
    match mode {
        Mode::Bundle => (MIN_DOMAIN_LEVEL, 0),
        Mode::Promotion => (1, MAX_DOMAIN_LEVEL),
    }
}

/// Reject levels outside the mode bounds or the supported range.
pub fn check_domain_level(level: DomainLevel, mode: Mode) -> ReplicaResult<()> {
    let current = level.value();
    let (lower, upper) = mode_bounds(mode);

    if current < lower {
        return Err(ReplicaError::compatibility(
            current,
            "You must provide a file generated by ipa-replica-prepare to create a replica \
             when the domain is at level 0.",
        ));
    }

    if !(MIN_DOMAIN_LEVEL..=MAX_DOMAIN_LEVEL).contains(&current) {
        return Err(ReplicaError::compatibility(
            current,
            "This version does not support the Domain Level which is currently set for \
             this domain. The Domain Level needs to be raised before installing a replica \
             with this version is allowed to be installed within this domain.",
        ));
    }

    if current > upper {
        return Err(ReplicaError::compatibility(
            current,
            "You cannot use a replica file to join a replica when the domain is above \
             level 0. Please join the system to the domain by running ipa-client-install \
             first, then try again without a replica file.",
        ));
    }

    Ok(())
}
