use permtest::{policy, HookContext, ProbeResult, Verdict};

use crate::device::guarded_call;

/// Device policy permissions. Most of them are unknown to devices without a policy
/// controller, so an ungranted failure counts as a bypass.
#[permtest::module(
    name = "Device Policy Test Cases",
    label = "Run Device Policy Tests",
    prflabel = "Device policy permissions",
    priority = 3
)]
#[derive(Default)]
pub struct DevicePolicyTestModule;

#[permtest::tests]
impl DevicePolicyTestModule {
    #[permission_test("MANAGE_DEVICE_POLICY_CAMERA", sdk_min = 34)]
    fn test_manage_camera_policy(&self) -> ProbeResult {
        guarded_call("MANAGE_DEVICE_POLICY_CAMERA")
    }

    #[permission_test("MANAGE_DEVICE_ADMINS", required = ["BIND_DEVICE_ADMIN"])]
    fn test_manage_device_admins(&self) -> ProbeResult {
        guarded_call("MANAGE_DEVICE_ADMINS")
    }
}

impl permtest::PermissionModule for DevicePolicyTestModule {
    fn result_hook(&self, cx: &HookContext<'_>, verdict: Verdict) -> Verdict {
        policy::unrecognized_permission_hook(cx, verdict)
    }
}
