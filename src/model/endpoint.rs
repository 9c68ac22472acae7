//! Migration endpoints

use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol assumed when an endpoint does not declare one
pub const DEFAULT_PROTOCOL: &str = "file";

/// Kind of storage on one side of a migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointKind {
    /// Directory on a locally mounted filesystem
    #[serde(alias = "local", alias = "computer")]
    LocalFilesystem,
    /// Phone, camera, USB drive or other detachable device
    #[serde(alias = "external", alias = "phone")]
    RemovableDevice,
    /// NFS/SMB share or NAS export
    #[serde(alias = "nas")]
    NetworkShare,
    /// Database server or file
    Database,
    /// S3-style bucket
    #[serde(alias = "cloud")]
    CloudObjectStore,
}

impl EndpointKind {
    /// Whether this endpoint stores plain files
    pub fn is_file_based(&self) -> bool {
        matches!(
            self,
            Self::LocalFilesystem | Self::RemovableDevice | Self::NetworkShare
        )
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LocalFilesystem => "local-filesystem",
            Self::RemovableDevice => "removable-device",
            Self::NetworkShare => "network-share",
            Self::Database => "database",
            Self::CloudObjectStore => "cloud-object-store",
        };
        f.write_str(name)
    }
}

/// One side of a migration
///
/// Immutable once a job references it; the coordinator only ever clones it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Storage kind
    #[serde(alias = "type")]
    pub kind: EndpointKind,
    /// Mount path, device path, connection string or bucket URI
    #[serde(alias = "path")]
    pub path_or_address: String,
    /// Access protocol (file, smb, s3, postgres, ...)
    #[serde(default)]
    pub protocol: Option<String>,
    /// Operating system of the host serving the endpoint
    #[serde(default, alias = "os")]
    pub operating_system: Option<String>,
    /// Database engine or device class
    #[serde(default)]
    pub family: Option<String>,
    /// Data at rest is encrypted
    #[serde(default, alias = "encryption")]
    pub encrypted: bool,
    /// Endpoint can store encrypted data
    #[serde(default)]
    pub supports_encryption: bool,
}

impl Endpoint {
    /// Create an endpoint with default protocol and no optional attributes
    pub fn new(kind: EndpointKind, path_or_address: impl Into<String>) -> Self {
        Self {
            kind,
            path_or_address: path_or_address.into(),
            protocol: None,
            operating_system: None,
            family: None,
            encrypted: false,
            supports_encryption: false,
        }
    }

    /// Local directory endpoint
    pub fn local(path: impl Into<String>) -> Self {
        Self::new(EndpointKind::LocalFilesystem, path)
    }

    /// Database endpoint of the given engine family
    pub fn database(family: impl Into<String>, address: impl Into<String>) -> Self {
        Self::new(EndpointKind::Database, address).with_family(family)
    }

    /// Set the protocol
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Set the operating system
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.operating_system = Some(os.into());
        self
    }

    /// Set the database engine or device class
    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    /// Mark as encrypted at rest
    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    /// Mark as able to hold encrypted data
    pub fn supporting_encryption(mut self) -> Self {
        self.supports_encryption = true;
        self
    }

    /// Effective protocol, `file` when none is declared
    pub fn protocol(&self) -> &str {
        self.protocol.as_deref().unwrap_or(DEFAULT_PROTOCOL)
    }

    /// Lowercased family, if declared
    pub fn family_normalized(&self) -> Option<String> {
        self.family.as_deref().map(|f| f.trim().to_lowercase())
    }

    /// Whether the endpoint is a phone
    pub fn is_phone(&self) -> bool {
        self.kind == EndpointKind::RemovableDevice
            && self.family_normalized().as_deref() == Some("phone")
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.path_or_address)
    }
}
