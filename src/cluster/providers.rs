//! Optional service providers
//!
//! Some cluster services run on a subset of members. A replica that wants a
//! clone of one must fetch key material from a member providing it.

use std::collections::BTreeMap;
use std::fmt;

/// Optional cluster service kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ServiceKind {
    CertificateAuthority,
    KeyRecoveryAuthority,
}

impl ServiceKind {
    /// Name the cluster registers the service under
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CertificateAuthority => "CA",
            Self::KeyRecoveryAuthority => "KRA",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service kind → member currently providing it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderMap {
    providers: BTreeMap<ServiceKind, String>,
}

impl ProviderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ServiceKind, host: impl Into<String>) {
        self.providers.insert(kind, host.into());
    }

    pub fn get(&self, kind: ServiceKind) -> Option<&str> {
        self.providers.get(&kind).map(String::as_str)
    }

    pub fn contains(&self, kind: ServiceKind) -> bool {
        self.providers.contains_key(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
