//! Fixture modules for unit tests. The traits are implemented by hand here since the
//! attribute macros expand to paths of the `permtest` facade crate.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    descriptor::{TestCase, TestDescriptor},
    info::PrepareInfo,
    module::{
        HookContext, Module, ModuleDeclaration, ModuleMetadata, PermissionModule,
        PermissionTests, PrepareContext,
    },
    preference::PreferenceDecl,
    probe::{ProbeError, ProbeResult},
    verdict::Verdict,
};

#[derive(Debug, Default)]
pub(crate) struct CoreTestModule;

impl CoreTestModule {
    fn test_camera(&self) -> ProbeResult {
        Ok(())
    }

    fn test_read_contacts(&self) -> ProbeResult {
        Err(ProbeError::security("Permission Denial: reading contacts"))
    }

    fn test_future_api(&self) -> ProbeResult {
        Ok(())
    }
}

impl ModuleMetadata for CoreTestModule {
    fn declaration() -> ModuleDeclaration {
        ModuleDeclaration {
            name: "Core Test Cases".into(),
            label: "Run Core Tests".into(),
            prflabel: "Core Test Cases".into(),
            priority: 1,
            sync: false,
        }
    }

    fn preferences() -> Vec<PreferenceDecl> {
        vec![PreferenceDecl::bool(
            "Enable runtime confirmation",
            "core_enable_runtime",
            false,
        )]
    }
}

impl PermissionTests for CoreTestModule {
    fn test_cases() -> Vec<TestCase<Self>> {
        vec![
            TestCase::new(
                TestDescriptor::new("CAMERA", "test_camera"),
                Self::test_camera,
            ),
            TestCase::new(
                TestDescriptor::new("READ_CONTACTS", "test_read_contacts"),
                Self::test_read_contacts,
            ),
            TestCase::new(
                TestDescriptor::new("FUTURE_API", "test_future_api").sdk_max(30),
                Self::test_future_api,
            ),
        ]
    }
}

impl PermissionModule for CoreTestModule {}

/// Behaves as its `behavior` names. Every case targets `PROBE`; cases past the first carry
/// preconditions.
#[derive(Debug, Default)]
pub(crate) struct ProbeModule {
    behavior: String,
}

impl ProbeModule {
    fn probe(&self) -> ProbeResult {
        match self.behavior.as_str() {
            "ok" => Ok(()),
            "security" => Err(ProbeError::security("denied by probe")),
            "service" => Err(ProbeError::from_null_pointer(
                "[npe_system_service] probe service is absent",
            )),
            "null_arg" => Err(ProbeError::from_null_pointer(
                "Attempt to invoke interface method on a null object reference",
            )),
            "null" => Err(ProbeError::from_null_pointer("probe is null")),
            "missing" => Err(ProbeError::MissingMethod("probe()".into())),
            "unexpected" => Err(ProbeError::unexpected("probe plumbing broke")),
            "bypass" => Err(ProbeError::bypass("probe is not applicable")),
            "panic" => panic!("probe panicked"),
            other => Err(ProbeError::Other(format!("unknown behavior {other}"))),
        }
    }
}

impl ModuleMetadata for ProbeModule {
    fn declaration() -> ModuleDeclaration {
        ModuleDeclaration::new("Probe Test Cases")
    }
}

impl PermissionTests for ProbeModule {
    fn test_cases() -> Vec<TestCase<Self>> {
        vec![
            TestCase::new(TestDescriptor::new("PROBE", "test_probe"), Self::probe),
            TestCase::new(
                TestDescriptor::new("PROBE", "test_probe_sdk_min").sdk_min(35),
                Self::probe,
            ),
            TestCase::new(
                TestDescriptor::new("PROBE", "test_probe_required").required(["BLUETOOTH_CONNECT"]),
                Self::probe,
            ),
            TestCase::new(
                TestDescriptor::new("PROBE", "test_probe_ignored").ignore(true),
                Self::probe,
            ),
        ]
    }
}

impl PermissionModule for ProbeModule {}

pub(crate) fn probe_module(behavior: &str) -> Module {
    Module::new(ProbeModule {
        behavior: behavior.to_string(),
    })
}

/// Sync module recording how many of its bodies overlap.
#[derive(Debug, Default)]
pub(crate) struct SyncTestModule {
    pub(crate) active: Arc<AtomicUsize>,
    pub(crate) max_active: Arc<AtomicUsize>,
}

impl SyncTestModule {
    fn overlap(&self) -> ProbeResult {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

impl ModuleMetadata for SyncTestModule {
    fn declaration() -> ModuleDeclaration {
        ModuleDeclaration {
            sync: true,
            ..ModuleDeclaration::new("Sync Test Cases")
        }
    }
}

impl PermissionTests for SyncTestModule {
    fn test_cases() -> Vec<TestCase<Self>> {
        ["FIRST", "SECOND", "THIRD"]
            .into_iter()
            .map(|p| TestCase::new(TestDescriptor::new(p, "test_overlap"), Self::overlap))
            .collect()
    }
}

impl PermissionModule for SyncTestModule {}

/// Prepare phase reports a bypass and an error, and declares two additional tests.
#[derive(Debug, Default)]
pub(crate) struct PrepareReportModule;

impl PrepareReportModule {
    fn test_internet(&self) -> ProbeResult {
        Ok(())
    }
}

impl ModuleMetadata for PrepareReportModule {
    fn declaration() -> ModuleDeclaration {
        ModuleDeclaration::new("Prepare Report Test Cases")
    }
}

impl PermissionTests for PrepareReportModule {
    fn test_cases() -> Vec<TestCase<Self>> {
        vec![TestCase::new(
            TestDescriptor::new("INTERNET", "test_internet"),
            Self::test_internet,
        )]
    }
}

impl PermissionModule for PrepareReportModule {
    fn prepare(&self, cx: &mut PrepareContext<'_>) -> eyre::Result<PrepareInfo> {
        cx.set_additional_tests(2);
        cx.report(Verdict::bypass(
            TestDescriptor::adhoc("com.example.permission.OPTIONAL"),
            "optional package is not installed",
        ));
        cx.report(
            Verdict::new(TestDescriptor::adhoc("com.example.permission.REQUIRED"), false)
                .with_message("declared permission is not protected"),
        );
        Ok(PrepareInfo {
            count_tests: 2,
            count_errors: 1,
            count_bypassed: 1,
            count_passed: 0,
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct FailingPrepareModule;

impl FailingPrepareModule {
    fn test_unreachable(&self) -> ProbeResult {
        Ok(())
    }
}

impl ModuleMetadata for FailingPrepareModule {
    fn declaration() -> ModuleDeclaration {
        ModuleDeclaration::new("Failing Prepare Test Cases")
    }
}

impl PermissionTests for FailingPrepareModule {
    fn test_cases() -> Vec<TestCase<Self>> {
        vec![TestCase::new(
            TestDescriptor::new("UNREACHABLE", "test_unreachable"),
            Self::test_unreachable,
        )]
    }
}

impl PermissionModule for FailingPrepareModule {
    fn prepare(&self, _cx: &mut PrepareContext<'_>) -> eyre::Result<PrepareInfo> {
        eyre::bail!("target package is not installed")
    }
}

#[derive(Debug, Default)]
pub(crate) struct EmptyTestModule;

impl ModuleMetadata for EmptyTestModule {
    fn declaration() -> ModuleDeclaration {
        ModuleDeclaration::new("Empty Test Cases")
    }
}

impl PermissionTests for EmptyTestModule {
    fn test_cases() -> Vec<TestCase<Self>> {
        Vec::new()
    }
}

impl PermissionModule for EmptyTestModule {}

/// One test whose body sleeps for `delay`.
#[derive(Debug, Default)]
pub(crate) struct SlowTestModule {
    pub(crate) delay: Duration,
}

impl SlowTestModule {
    fn test_slow(&self) -> ProbeResult {
        std::thread::sleep(self.delay);
        Ok(())
    }
}

impl ModuleMetadata for SlowTestModule {
    fn declaration() -> ModuleDeclaration {
        ModuleDeclaration::new("Slow Test Cases")
    }
}

impl PermissionTests for SlowTestModule {
    fn test_cases() -> Vec<TestCase<Self>> {
        vec![TestCase::new(
            TestDescriptor::new("SLOW", "test_slow"),
            Self::test_slow,
        )]
    }
}

impl PermissionModule for SlowTestModule {}

/// Marks every failed verdict as bypassed.
#[derive(Debug, Default)]
pub(crate) struct HookTestModule;

impl HookTestModule {
    fn test_denied(&self) -> ProbeResult {
        Err(ProbeError::security("denied"))
    }
}

impl ModuleMetadata for HookTestModule {
    fn declaration() -> ModuleDeclaration {
        ModuleDeclaration::new("Hook Test Cases")
    }
}

impl PermissionTests for HookTestModule {
    fn test_cases() -> Vec<TestCase<Self>> {
        vec![TestCase::new(
            TestDescriptor::new("DENIED", "test_denied"),
            Self::test_denied,
        )]
    }
}

impl PermissionModule for HookTestModule {
    fn result_hook(&self, _cx: &HookContext<'_>, mut verdict: Verdict) -> Verdict {
        if !verdict.success {
            verdict.bypassed = true;
        }
        verdict
    }
}
