//! Endpoint description file
//!
//! A `[global]` key/value file naming this host's realm, domain and local
//! service endpoints. Written provisionally during preflight (owner-only)
//! and authoritatively during commit (world-readable, the gateway reads it).

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::errors::{ReplicaError, ReplicaResult};

use super::replica::ReplicaConfiguration;

/// Mode of the provisional file
pub const PROVISIONAL_MODE: u32 = 0o600;
/// Mode of the final file
pub const FINAL_MODE: u32 = 0o644;

const KEY_ORDER: [&str; 10] = [
    "host",
    "basedn",
    "realm",
    "domain",
    "xmlrpc_uri",
    "ldap_uri",
    "enable_ra",
    "ra_plugin",
    "dogtag_version",
    "mode",
];

/// `EXAMPLE.COM` → `dc=example,dc=com`
pub fn realm_to_suffix(realm: &str) -> String {
    realm
        .to_lowercase()
        .split('.')
        .filter(|label| !label.is_empty())
        .map(|label| format!("dc={}", label))
        .collect::<Vec<_>>()
        .join(",")
}

/// `EXAMPLE.COM` → `EXAMPLE-COM`
pub fn realm_to_serverid(realm: &str) -> String {
    realm.replace('.', "-")
}

/// Local-socket URI of the directory instance serving `realm`
pub fn realm_to_ldapi_uri(realm: &str) -> String {
    format!(
        "ldapi://%2fvar%2frun%2fslapd-{}.socket",
        realm_to_serverid(realm)
    )
}

/// Parse the `[global]` section of a key/value file.
///
/// Lines outside `[global]`, blank lines and `#` comments are ignored.
/// Both `key=value` and `key = value` are accepted.
pub fn parse_global(text: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    let mut in_global = false;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            in_global = &line[1..line.len() - 1] == "global";
            continue;
        }
        if !in_global {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    values
}

/// Contents of the endpoint description file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescription {
    values: BTreeMap<String, String>,
}

impl EndpointDescription {
    /// Describe the new replica.
    pub fn for_replica(config: &ReplicaConfiguration, ca_enabled: bool) -> Self {
        let mut values = BTreeMap::new();
        values.insert("host".to_string(), config.host_name.clone());
        values.insert("basedn".to_string(), realm_to_suffix(&config.realm_name));
        values.insert("realm".to_string(), config.realm_name.clone());
        values.insert("domain".to_string(), config.domain_name.clone());
        values.insert(
            "xmlrpc_uri".to_string(),
            format!("https://{}/ipa/xml", config.host_name),
        );
        values.insert("ldap_uri".to_string(), realm_to_ldapi_uri(&config.realm_name));
        if ca_enabled {
            values.insert("enable_ra".to_string(), "True".to_string());
            values.insert("ra_plugin".to_string(), "dogtag".to_string());
            values.insert("dogtag_version".to_string(), "10".to_string());
        } else {
            values.insert("enable_ra".to_string(), "False".to_string());
            values.insert("ra_plugin".to_string(), "none".to_string());
        }
        values.insert("mode".to_string(), "production".to_string());
        Self { values }
    }

    /// Keep keys of an existing client file this description does not set.
    ///
    /// `server` is dropped: the host now serves itself.
    pub fn merged_over(mut self, existing: &BTreeMap<String, String>) -> Self {
        for (key, value) in existing {
            if key == "server" {
                continue;
            }
            self.values.entry(key.clone()).or_insert_with(|| value.clone());
        }
        self
    }

    pub fn parse(text: &str) -> Self {
        Self {
            values: parse_global(text),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn ca_enabled(&self) -> bool {
        self.get("enable_ra") == Some("True")
    }

    /// Render with well-known keys first, the rest in key order.
    pub fn render(&self) -> String {
        let mut out = String::from("[global]\n");
        for key in KEY_ORDER {
            if let Some(value) = self.values.get(key) {
                out.push_str(&format!("{}={}\n", key, value));
            }
        }
        for (key, value) in &self.values {
            if !KEY_ORDER.contains(&key.as_str()) {
                out.push_str(&format!("{}={}\n", key, value));
            }
        }
        out
    }

    /// Write readable only by this process; preflight bootstrap uses it.
    pub fn write_provisional(&self, path: &Path) -> ReplicaResult<()> {
        self.write_with_mode(path, PROVISIONAL_MODE)
    }

    /// Write world-readable; the gateway service reads it.
    pub fn write_final(&self, path: &Path) -> ReplicaResult<()> {
        self.write_with_mode(path, FINAL_MODE)
    }

    /// Write a sibling temp file, fsync it, then rename it over `path`.
    ///
    /// A failed write leaves the previous file untouched.
    fn write_with_mode(&self, path: &Path, mode: u32) -> ReplicaResult<()> {
        let io_err = |e: std::io::Error| {
            ReplicaError::configuration(format!(
                "Failed to write endpoint file {}: {}",
                path.display(),
                e
            ))
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let temp_path = temp_path_for(path);
        let written = write_synced(&temp_path, self.render().as_bytes(), mode)
            .and_then(|()| fs::rename(&temp_path, path));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(io_err(e));
        }

        // The rename is durable only once the directory is synced.
        if let Some(parent) = path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_synced(path: &Path, content: &[u8], mode: u32) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)?;
    file.write_all(content)?;
    // A leftover temp file keeps its old mode on open.
    file.set_permissions(fs::Permissions::from_mode(mode))?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::options::DnsOptions;
    use crate::config::replica::{CheckFlags, ClientFlags, FeatureFlags, Mode};
    use tempfile::TempDir;

    fn config() -> ReplicaConfiguration {
        ReplicaConfiguration {
            mode: Mode::Bundle,
            realm_name: "EXAMPLE.COM".to_string(),
            domain_name: "example.com".to_string(),
            host_name: "replica.example.com".to_string(),
            master_host_name: "master.example.com".to_string(),
            ca_host_name: None,
            ip_addresses: Vec::new(),
            credential: None,
            principal: None,
            admin_password: None,
            subject_base: "O=EXAMPLE.COM".to_string(),
            ca_material: false,
            features: FeatureFlags::default(),
            client: ClientFlags::default(),
            checks: CheckFlags::default(),
            dns: DnsOptions::default(),
            work_dir: "/tmp/work".into(),
        }
    }

    #[test]
    fn test_realm_helpers() {
        assert_eq!(realm_to_suffix("EXAMPLE.COM"), "dc=example,dc=com");
        assert_eq!(realm_to_serverid("EXAMPLE.COM"), "EXAMPLE-COM");
        assert_eq!(
            realm_to_ldapi_uri("EXAMPLE.COM"),
            "ldapi://%2fvar%2frun%2fslapd-EXAMPLE-COM.socket"
        );
    }

    #[test]
    fn test_render_contains_required_keys() {
        let text = EndpointDescription::for_replica(&config(), true).render();

        assert!(text.starts_with("[global]\n"));
        assert!(text.contains("host=replica.example.com\n"));
        assert!(text.contains("basedn=dc=example,dc=com\n"));
        assert!(text.contains("realm=EXAMPLE.COM\n"));
        assert!(text.contains("domain=example.com\n"));
        assert!(text.contains("xmlrpc_uri=https://replica.example.com/ipa/xml\n"));
        assert!(text.contains("enable_ra=True\n"));
    }

    #[test]
    fn test_parse_reads_only_global_section() {
        let parsed = parse_global(
            "[global]\nhost = client.example.com\n# note\nserver=master.example.com\n[other]\nhost=nope\n",
        );
        assert_eq!(parsed.get("host").unwrap(), "client.example.com");
        assert_eq!(parsed.get("server").unwrap(), "master.example.com");
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_merge_drops_server_and_keeps_unknown_keys() {
        let existing = parse_global("[global]\nserver=master.example.com\nverbose=True\n");
        let merged = EndpointDescription::for_replica(&config(), false).merged_over(&existing);

        assert_eq!(merged.get("server"), None);
        assert_eq!(merged.get("verbose"), Some("True"));
        assert!(!merged.ca_enabled());
    }

    #[test]
    fn test_provisional_then_final_widens_mode() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ipa").join("default.conf");
        let desc = EndpointDescription::for_replica(&config(), false);

        desc.write_provisional(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, PROVISIONAL_MODE);

        desc.write_final(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, FINAL_MODE);

        let reread = EndpointDescription::parse(&fs::read_to_string(&path).unwrap());
        assert_eq!(reread, desc);
    }

    #[test]
    fn test_failed_write_keeps_previous_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("default.conf");
        let previous = "[global]\nhost=client.example.com\nserver=master.example.com\n";
        fs::write(&path, previous).unwrap();
        // A directory where the temp file goes makes the write fail.
        fs::create_dir(temp.path().join("default.conf.tmp")).unwrap();

        let desc = EndpointDescription::for_replica(&config(), true);
        assert!(desc.write_final(&path).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), previous);
    }

    #[test]
    fn test_write_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("default.conf");
        fs::write(&path, "[global]\nhost=old.example.com\n").unwrap();

        EndpointDescription::for_replica(&config(), true).write_final(&path).unwrap();

        assert!(!temp.path().join("default.conf.tmp").exists());
        assert!(fs::read_to_string(&path).unwrap().contains("host=replica.example.com\n"));
    }
}
