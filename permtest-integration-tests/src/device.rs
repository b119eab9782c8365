//! Simulated device the sample modules run against.
//!
//! Test bodies call [`guarded_call`] in place of a privileged platform API: the call goes
//! through when the permission is granted and raises a security denial otherwise.

use once_cell::sync::Lazy;
use permtest::{
    descriptor::normalize_permission, get_config, Platform, ProbeError, ProbeResult,
    StaticPlatform,
};
use std::sync::Arc;

static DEVICE: Lazy<Arc<StaticPlatform>> =
    Lazy::new(|| Arc::new(StaticPlatform::from_config(&get_config().device)));

pub fn platform() -> Arc<StaticPlatform> {
    DEVICE.clone()
}

pub fn guarded_call(permission: &str) -> ProbeResult {
    if DEVICE.is_permission_granted(permission) {
        Ok(())
    } else {
        Err(ProbeError::security(format!(
            "caller does not hold {}",
            normalize_permission(permission)
        )))
    }
}

/// Revokes every permission the sample modules touch, then grants `granted`.
#[cfg(test)]
pub fn grant_only(granted: &[&str]) {
    for permission in crate::SAMPLE_PERMISSIONS {
        DEVICE.revoke(permission);
    }
    for permission in granted {
        DEVICE.grant(permission);
    }
}
