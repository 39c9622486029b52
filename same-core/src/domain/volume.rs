//! Shared volume types

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::quantity::Capacity;

/// How a persistent volume claim may be mounted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    ReadWriteOnce,
    ReadOnlyMany,
    ReadWriteMany,
}

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::ReadWriteOnce => "ReadWriteOnce",
            AccessMode::ReadOnlyMany => "ReadOnlyMany",
            AccessMode::ReadWriteMany => "ReadWriteMany",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown access mode '{0}'")]
pub struct InvalidAccessMode(pub String);

impl std::str::FromStr for AccessMode {
    type Err = InvalidAccessMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ReadWriteOnce" | "RWO" => Ok(AccessMode::ReadWriteOnce),
            "ReadOnlyMany" | "ROX" => Ok(AccessMode::ReadOnlyMany),
            "ReadWriteMany" | "RWX" => Ok(AccessMode::ReadWriteMany),
            other => Err(InvalidAccessMode(other.to_string())),
        }
    }
}

/// A persistent storage claim declared once per graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    pub capacity: Capacity,
    pub access_mode: AccessMode,
    /// `None` means dynamically provisioned by the cluster default class
    pub storage_class: Option<String>,
}

/// Reference to a declared volume, returned by `declare_volume`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VolumeHandle {
    name: String,
}

impl VolumeHandle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach this volume at `path`
    pub fn at(&self, path: impl Into<String>) -> Mount {
        Mount {
            volume: self.name.clone(),
            path: path.into(),
        }
    }
}

/// A volume attachment recorded on an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub volume: String,
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_mode_short_forms() {
        assert_eq!("RWX".parse::<AccessMode>(), Ok(AccessMode::ReadWriteMany));
        assert_eq!("ReadOnlyMany".parse::<AccessMode>(), Ok(AccessMode::ReadOnlyMany));
        assert_eq!(AccessMode::ReadWriteOnce.as_str(), "ReadWriteOnce");
    }

    #[test]
    fn test_unknown_access_mode() {
        let err = "ReadWriteSometimes".parse::<AccessMode>().unwrap_err();
        assert_eq!(err, InvalidAccessMode("ReadWriteSometimes".to_string()));
        assert_eq!(err.to_string(), "unknown access mode 'ReadWriteSometimes'");
    }
}
