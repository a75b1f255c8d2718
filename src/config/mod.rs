//! Configuration subsystem
//!
//! - `options`: every installer option with its default
//! - `paths`: local state paths and external programs (JSON file)
//! - `replica`: the resolved, immutable per-run configuration
//! - `bundle`: transfer bundle extraction
//! - `join_state`: local domain-join client state
//! - `endpoint`: the endpoint description file
//! - `resolver`: builds a `ReplicaConfiguration` for either mode

pub mod bundle;
pub mod endpoint;
pub mod join_state;
mod options;
mod paths;
mod replica;
mod resolver;

pub use bundle::{pkcs12_info, BundleError, BundleInfo, Pkcs12Info, TransferBundle};
pub use endpoint::{realm_to_suffix, EndpointDescription};
pub use join_state::{client_configured, JoinState};
pub use options::{DnsOptions, InstallOptions};
pub use paths::SystemPaths;
pub use replica::{
    CheckFlags, ClientFlags, Credential, FeatureFlags, Mode, ReplicaConfiguration,
};
pub use resolver::{verify_fqdn, ConfigResolver};
