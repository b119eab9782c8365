//! Live platform queries consumed by the executor.

use std::{
    collections::HashSet,
    sync::{PoisonError, RwLock},
};

use crate::{config::DeviceConfig, descriptor::normalize_permission};

/// Whether the app's signing certificate matches the reference certificates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignatureMatch {
    pub platform: bool,
    pub gms: bool,
}

/// Device the permission tests run against.
pub trait Platform: Send + Sync {
    /// Current platform SDK version.
    fn sdk_version(&self) -> u32;

    /// Current grant state of `permission` for the app under test. Queried fresh on every call.
    fn is_permission_granted(&self, permission: &str) -> bool;

    /// Compares the app's signing certificate against the platform and GMS certificates.
    fn signature_match(&self) -> SignatureMatch;
}

/// Platform backed by a fixed device profile. Grants can be changed at runtime.
#[derive(Debug, Default)]
pub struct StaticPlatform {
    sdk: u32,
    granted: RwLock<HashSet<String>>,
    signature: SignatureMatch,
}

impl StaticPlatform {
    pub fn new(sdk: u32) -> StaticPlatform {
        StaticPlatform {
            sdk,
            ..Default::default()
        }
    }

    pub fn from_config(device: &DeviceConfig) -> StaticPlatform {
        StaticPlatform::new(device.sdk)
            .with_granted(&device.granted)
            .with_signature(SignatureMatch {
                platform: device.platform_signature,
                gms: device.gms_signature,
            })
    }

    pub fn with_granted<I, S>(self, permissions: I) -> StaticPlatform
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for permission in permissions {
            self.grant(permission.as_ref());
        }
        self
    }

    pub fn with_signature(mut self, signature: SignatureMatch) -> StaticPlatform {
        self.signature = signature;
        self
    }

    pub fn grant(&self, permission: &str) {
        self.granted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize_permission(permission));
    }

    pub fn revoke(&self, permission: &str) {
        self.granted
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&normalize_permission(permission));
    }
}

impl Platform for StaticPlatform {
    fn sdk_version(&self) -> u32 {
        self.sdk
    }

    fn is_permission_granted(&self, permission: &str) -> bool {
        self.granted
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&normalize_permission(permission))
    }

    fn signature_match(&self) -> SignatureMatch {
        self.signature
    }
}
