//! Transfer bundle extraction
//!
//! A transfer bundle is a tar archive produced by an existing member. It
//! carries `realm_info.json` and the certificate material the new replica
//! starts from. Extraction goes into the run's working directory, which the
//! cleanup guard removes on every exit path.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tar::Archive;

use crate::errors::ReplicaError;

use super::replica::Credential;

/// Manifest file name inside the bundle
pub const REALM_INFO: &str = "realm_info.json";
/// Trusted CA certificate of the cluster, always present
pub const CA_CERT: &str = "ca.crt";
/// CA key material; presence means the bundle can seed a CA clone
pub const CA_P12: &str = "cacert.p12";
/// Registration-authority agent certificate
pub const RA_P12: &str = "ra.p12";

/// Bundle error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleErrorCode {
    /// File does not exist
    Missing,
    /// File could not be opened or unpacked
    Unreadable,
    /// Unpacked but contents are not a usable bundle
    Invalid,
    /// A listed file does not match its checksum
    Checksum,
}

impl BundleErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "BUNDLE_MISSING",
            Self::Unreadable => "BUNDLE_UNREADABLE",
            Self::Invalid => "BUNDLE_INVALID",
            Self::Checksum => "BUNDLE_CHECKSUM",
        }
    }
}

/// Bundle error with context
#[derive(Debug)]
pub struct BundleError {
    code: BundleErrorCode,
    message: String,
    source: Option<io::Error>,
}

impl BundleError {
    fn new(code: BundleErrorCode, message: impl Into<String>, source: Option<io::Error>) -> Self {
        Self {
            code,
            message: message.into(),
            source,
        }
    }

    pub fn missing(path: &Path) -> Self {
        Self::new(
            BundleErrorCode::Missing,
            format!("Replica file {} does not exist", path.display()),
            None,
        )
    }

    pub fn unreadable(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(BundleErrorCode::Unreadable, message, Some(source))
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(BundleErrorCode::Invalid, message, None)
    }

    pub fn checksum(name: &str) -> Self {
        Self::new(
            BundleErrorCode::Checksum,
            format!("Checksum mismatch for {} in replica file", name),
            None,
        )
    }

    pub fn code(&self) -> BundleErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)?;
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for BundleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<BundleError> for ReplicaError {
    fn from(e: BundleError) -> Self {
        ReplicaError::configuration(e.to_string())
    }
}

pub type BundleResult<T> = Result<T, BundleError>;

/// Contents of `realm_info.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleInfo {
    pub realm_name: String,
    pub domain_name: String,
    /// Host the bundle was prepared for
    pub host_name: String,
    /// Member that prepared the bundle
    pub master_host_name: String,
    #[serde(default)]
    pub subject_base: Option<String>,
    #[serde(default)]
    pub version: Option<u32>,
    /// Optional CRC32 of bundled files, keyed by file name
    #[serde(default)]
    pub checksums: BTreeMap<String, u32>,
}

/// Certificate and pin pair used to seed a service's certificate database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkcs12Info {
    pub cert_path: PathBuf,
    pub pin: Credential,
}

/// Look up `cert_name` and its pin file in `dir`.
///
/// Absent certificate means the service creates its own; a present
/// certificate with an unreadable pin is an error.
pub fn pkcs12_info(dir: &Path, cert_name: &str, pin_name: &str) -> BundleResult<Option<Pkcs12Info>> {
    let cert_path = dir.join(cert_name);
    if !cert_path.is_file() {
        return Ok(None);
    }

    let pin_path = dir.join(pin_name);
    let pin = fs::read_to_string(&pin_path).map_err(|e| {
        BundleError::unreadable(format!("Failed to read {}", pin_path.display()), e)
    })?;

    Ok(Some(Pkcs12Info {
        cert_path,
        pin: Credential::new(pin.trim()),
    }))
}

/// An extracted transfer bundle
#[derive(Debug, Clone)]
pub struct TransferBundle {
    pub info: BundleInfo,
    dir: PathBuf,
}

impl TransferBundle {
    /// Unpack `archive_path` into `dest_dir` and validate its contents.
    pub fn extract(archive_path: &Path, dest_dir: &Path) -> BundleResult<Self> {
        if !archive_path.is_file() {
            return Err(BundleError::missing(archive_path));
        }

        let file = File::open(archive_path).map_err(|e| {
            BundleError::unreadable(
                format!("Failed to open replica file {}", archive_path.display()),
                e,
            )
        })?;

        let mut archive = Archive::new(file);
        archive.unpack(dest_dir).map_err(|e| {
            BundleError::unreadable(
                format!("Failed to extract replica file {}", archive_path.display()),
                e,
            )
        })?;

        let info = Self::read_info(dest_dir)?;
        let bundle = Self {
            info,
            dir: dest_dir.to_path_buf(),
        };
        bundle.validate()?;
        Ok(bundle)
    }

    fn read_info(dir: &Path) -> BundleResult<BundleInfo> {
        let path = dir.join(REALM_INFO);
        let content = fs::read_to_string(&path).map_err(|_| {
            BundleError::invalid(format!("Missing {} in replica file", REALM_INFO))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| BundleError::invalid(format!("Invalid {}: {}", REALM_INFO, e)))
    }

    fn validate(&self) -> BundleResult<()> {
        if self.info.realm_name.is_empty() || self.info.master_host_name.is_empty() {
            return Err(BundleError::invalid(
                "realm_info.json must name the realm and the master host",
            ));
        }

        if !self.dir.join(CA_CERT).is_file() {
            return Err(BundleError::invalid(
                "CA cert file is not available. Please run ipa-replica-prepare \
                 to create a new replica file.",
            ));
        }

        for (name, expected) in &self.info.checksums {
            let bytes = fs::read(self.dir.join(name)).map_err(|e| {
                BundleError::unreadable(format!("Failed to read {} from replica file", name), e)
            })?;
            if crc32fast::hash(&bytes) != *expected {
                return Err(BundleError::checksum(name));
            }
        }

        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Bundle can seed a CA clone
    pub fn carries_ca_material(&self) -> bool {
        self.dir.join(CA_P12).is_file()
    }
}
