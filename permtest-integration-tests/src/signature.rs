use permtest::{eyre, policy, HookContext, PrepareContext, PrepareInfo, ProbeResult, Verdict};

use crate::device::guarded_call;

/// Signature permissions, held only by platform signed apps.
#[permtest::module(
    name = "Signature Test Cases",
    label = "Run Signature Tests",
    prflabel = "Signature permissions",
    priority = 2,
    sync
)]
#[derive(Default)]
pub struct SignatureTestModule;

#[permtest::tests]
impl SignatureTestModule {
    #[permission_test("REBOOT")]
    fn test_reboot(&self) -> ProbeResult {
        guarded_call("REBOOT")
    }

    #[permission_test("INSTALL_PACKAGES")]
    fn test_install_packages(&self) -> ProbeResult {
        guarded_call("INSTALL_PACKAGES")
    }

    #[permission_test("READ_LOGS", development_protection)]
    fn test_read_logs(&self) -> eyre::Result<()> {
        guarded_call("READ_LOGS")?;
        Ok(())
    }
}

impl permtest::PermissionModule for SignatureTestModule {
    fn prepare(&self, cx: &mut PrepareContext<'_>) -> eyre::Result<PrepareInfo> {
        policy::signature_prepare(cx);
        Ok(PrepareInfo::default())
    }

    fn result_hook(&self, cx: &HookContext<'_>, verdict: Verdict) -> Verdict {
        policy::development_protection_hook(cx, verdict)
    }
}
