use permtest::{
    descriptor::TestDescriptor, eyre, verdict::GRANTED_MESSAGE, PrepareContext, PrepareInfo,
    ProbeResult, Verdict,
};
use tracing::*;

use crate::device::guarded_call;

/// Permissions declared by the GMS core package, evaluated in one sweep during prepare.
pub const GMS_PERMISSIONS: &[&str] = &[
    "com.google.android.gms.permission.AD_ID",
    "com.google.android.c2dm.permission.RECEIVE",
    "com.google.android.gms.permission.ACTIVITY_RECOGNITION",
];

pub const READ_GSERVICES: &str = "com.google.android.providers.gsf.permission.READ_GSERVICES";

#[permtest::module(
    name = "GMS Test Cases",
    label = "Run GMS Tests",
    prflabel = "GMS permissions",
    priority = 4
)]
#[derive(Default)]
pub struct GmsTestModule;

#[permtest::tests]
impl GmsTestModule {
    #[permission_test("com.google.android.providers.gsf.permission.READ_GSERVICES")]
    fn test_read_gservices(&self) -> ProbeResult {
        guarded_call(READ_GSERVICES)
    }
}

impl permtest::PermissionModule for GmsTestModule {
    fn prepare(&self, cx: &mut PrepareContext<'_>) -> eyre::Result<PrepareInfo> {
        let gms_signed = cx.signature().gms;
        let mut info = PrepareInfo {
            count_tests: GMS_PERMISSIONS.len(),
            ..Default::default()
        };

        for permission in GMS_PERMISSIONS {
            let descriptor = TestDescriptor::adhoc(permission);
            let verdict = if !gms_signed {
                info.count_bypassed += 1;
                Verdict::bypass(descriptor, "app is not signed with the GMS certificate")
            } else if cx.platform().is_permission_granted(permission) {
                info.count_passed += 1;
                Verdict {
                    api_successful: true,
                    granted: true,
                    gms_signature_match: true,
                    ..Verdict::new(descriptor, true).with_message(GRANTED_MESSAGE)
                }
            } else {
                info.count_errors += 1;
                Verdict {
                    gms_signature_match: true,
                    ..Verdict::new(descriptor, false)
                        .with_message("GMS signed app was not granted the permission")
                }
            };
            cx.report(verdict);
        }

        debug!(
            "swept {} GMS permissions: {} errors, {} bypassed",
            info.count_tests, info.count_errors, info.count_bypassed
        );
        cx.set_additional_tests(GMS_PERMISSIONS.len());
        Ok(info)
    }
}
