use permtest::{get_config, ProbeError, ProbeResult};

use crate::device::guarded_call;

/// Dangerous runtime permissions every device has to enforce.
#[permtest::module(
    name = "Core Test Cases",
    label = "Run Core Tests",
    prflabel = "Core permissions",
    priority = 0
)]
pub struct CoreTestModule {
    #[preference(label = "Enable runtime confirmation", key = "core_enable_runtime")]
    enable_runtime: bool,
}

impl Default for CoreTestModule {
    fn default() -> Self {
        CoreTestModule {
            enable_runtime: get_config()
                .preference("core_enable_runtime")
                .unwrap_or(false),
        }
    }
}

#[permtest::tests]
impl CoreTestModule {
    #[permission_test("CAMERA")]
    fn test_camera(&self) -> ProbeResult {
        guarded_call("CAMERA")
    }

    #[permission_test("READ_CONTACTS")]
    fn test_read_contacts(&self) -> ProbeResult {
        guarded_call("READ_CONTACTS")
    }

    #[permission_test("RECORD_AUDIO")]
    fn test_record_audio(&self) -> ProbeResult {
        guarded_call("RECORD_AUDIO")
    }

    #[permission_test("POST_NOTIFICATIONS", sdk_min = 33)]
    fn test_post_notifications(&self) -> ProbeResult {
        guarded_call("POST_NOTIFICATIONS")
    }

    // Scoped storage replaced this permission.
    #[permission_test("WRITE_EXTERNAL_STORAGE", sdk_max = 28)]
    fn test_write_external_storage(&self) -> ProbeResult {
        guarded_call("WRITE_EXTERNAL_STORAGE")
    }

    #[permission_test("ACCESS_FINE_LOCATION", requested = ["ACCESS_COARSE_LOCATION"])]
    fn test_fine_location(&self) -> ProbeResult {
        if !self.enable_runtime {
            return Err(ProbeError::bypass("runtime confirmation is disabled"));
        }
        guarded_call("ACCESS_FINE_LOCATION")
    }
}

impl permtest::PermissionModule for CoreTestModule {}
