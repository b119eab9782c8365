//! # Modules
//!
//! A module is a cohesive set of permission tests sharing setup, a result hook and an
//! enabled toggle. Three traits describe one:
//!
//! - [`ModuleMetadata`], generated by `#[permtest::module]` on the struct
//! - [`PermissionTests`], generated by `#[permtest::tests]` on the impl block holding the
//!   test methods
//! - [`PermissionModule`], written by hand to override `prepare` and `result_hook`
//!
//! [`Module`] erases the concrete type so a suite can hold heterogeneous modules.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{
    descriptor::{TestCase, TestDescriptor, TestFn},
    info::{ModuleInfo, PrepareInfo},
    platform::{Platform, SignatureMatch},
    preference::{preference_key, PreferenceDecl, PreferenceStore},
    probe::ProbeResult,
    registry,
    runner::Environment,
    verdict::Verdict,
    Error,
};

/// Module level metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDeclaration {
    /// Display name, also the title of the module's info.
    pub name: String,
    pub label: String,
    /// Label of the enable toggle in the settings screen.
    pub prflabel: String,
    pub priority: i32,
    /// Throttle the module's test threads to one at a time.
    pub sync: bool,
}

impl ModuleDeclaration {
    pub fn new(name: impl Into<String>) -> ModuleDeclaration {
        ModuleDeclaration {
            name: name.into(),
            label: "module label".into(),
            prflabel: "prflabel".into(),
            priority: 0,
            sync: false,
        }
    }
}

pub trait ModuleMetadata {
    fn declaration() -> ModuleDeclaration;

    /// Boolean preferences declared on the module's fields, in declaration order.
    fn preferences() -> Vec<PreferenceDecl> {
        Vec::new()
    }
}

pub trait PermissionTests: Sized {
    /// Test cases in declaration order.
    fn test_cases() -> Vec<TestCase<Self>>;
}

pub trait PermissionModule: ModuleMetadata + PermissionTests + Send + Sync + 'static {
    /// Runs before the module's tests. Verdicts reported through the context are delivered
    /// to the consumer right away; their counts belong in the returned [`PrepareInfo`].
    fn prepare(&self, _cx: &mut PrepareContext<'_>) -> eyre::Result<PrepareInfo> {
        Ok(PrepareInfo::default())
    }

    /// Post-processes every verdict of the module before it is counted.
    fn result_hook(&self, _cx: &HookContext<'_>, verdict: Verdict) -> Verdict {
        verdict
    }
}

/// What a module's prepare phase can see and change.
pub struct PrepareContext<'a> {
    env: &'a Environment,
    inverse_for_platform_testing: &'a AtomicBool,
    additional_tests: usize,
    reports: Vec<Verdict>,
}

impl<'a> PrepareContext<'a> {
    pub(crate) fn new(
        env: &'a Environment,
        inverse_for_platform_testing: &'a AtomicBool,
        additional_tests: usize,
    ) -> PrepareContext<'a> {
        PrepareContext {
            env,
            inverse_for_platform_testing,
            additional_tests,
            reports: Vec::new(),
        }
    }

    pub fn platform(&self) -> &dyn Platform {
        self.env.platform()
    }

    pub fn preferences(&self) -> &dyn PreferenceStore {
        self.env.preferences()
    }

    pub fn signature(&self) -> SignatureMatch {
        self.env.signature()
    }

    pub fn inverse_test_result(&self) -> bool {
        self.env.options().inverse_test_result
    }

    pub fn set_inverse_for_platform_testing(&mut self, inverse: bool) {
        self.inverse_for_platform_testing
            .store(inverse, Ordering::SeqCst);
    }

    /// Declares tests evaluated outside of the test methods, e.g. a sweep over every
    /// permission a package declares.
    pub fn set_additional_tests(&mut self, count: usize) {
        self.additional_tests = count;
    }

    /// Reports a verdict produced by the prepare phase itself.
    pub fn report(&mut self, verdict: Verdict) {
        self.reports.push(verdict);
    }

    pub(crate) fn finish(self) -> (usize, Vec<Verdict>) {
        (self.additional_tests, self.reports)
    }
}

/// What a result hook can see.
pub struct HookContext<'a> {
    env: &'a Environment,
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(env: &'a Environment) -> HookContext<'a> {
        HookContext { env }
    }

    pub fn platform(&self) -> &dyn Platform {
        self.env.platform()
    }

    pub fn signature(&self) -> SignatureMatch {
        self.env.signature()
    }

    pub fn inverse_test_result(&self) -> bool {
        self.env.options().inverse_test_result
    }
}

trait ErasedModule: Send + Sync {
    fn invoke(&self, index: usize, method: &str) -> crate::Result<ProbeResult>;
    fn prepare(&self, cx: &mut PrepareContext<'_>) -> eyre::Result<PrepareInfo>;
    fn result_hook(&self, cx: &HookContext<'_>, verdict: Verdict) -> Verdict;
}

struct Erased<M> {
    key: String,
    module: M,
    runs: Vec<TestFn<M>>,
}

impl<M: PermissionModule> ErasedModule for Erased<M> {
    fn invoke(&self, index: usize, method: &str) -> crate::Result<ProbeResult> {
        let run = self
            .runs
            .get(index)
            .ok_or_else(|| Error::EntryPointNotFound {
                module: self.key.clone(),
                method: method.to_string(),
            })?;
        Ok(run(&self.module))
    }

    fn prepare(&self, cx: &mut PrepareContext<'_>) -> eyre::Result<PrepareInfo> {
        self.module.prepare(cx)
    }

    fn result_hook(&self, cx: &HookContext<'_>, verdict: Verdict) -> Verdict {
        self.module.result_hook(cx, verdict)
    }
}

/// Shared handle test threads use to reach their module.
#[derive(Clone)]
pub(crate) struct ModuleHandle {
    inner: Arc<dyn ErasedModule>,
    inverse_for_platform_testing: Arc<AtomicBool>,
}

impl ModuleHandle {
    pub(crate) fn invoke(&self, index: usize, method: &str) -> crate::Result<ProbeResult> {
        self.inner.invoke(index, method)
    }

    pub(crate) fn result_hook(&self, cx: &HookContext<'_>, verdict: Verdict) -> Verdict {
        self.inner.result_hook(cx, verdict)
    }

    pub(crate) fn inverse_for_platform_testing(&self) -> bool {
        self.inverse_for_platform_testing.load(Ordering::SeqCst)
    }
}

/// The executable unit a suite is made of.
pub struct Module {
    key: String,
    declaration: ModuleDeclaration,
    descriptors: Arc<[TestDescriptor]>,
    preferences: Vec<PreferenceDecl>,
    handle: ModuleHandle,
    pub(crate) enabled: bool,
    pub(crate) info: ModuleInfo,
}

impl Module {
    pub fn new<M: PermissionModule>(module: M) -> Module {
        let key = preference_key(std::any::type_name::<M>());
        let declaration = M::declaration();
        let (descriptors, runs): (Vec<_>, Vec<_>) = registry::test_cases::<M>()
            .into_iter()
            .map(|case| (case.descriptor, case.run))
            .unzip();

        let mut info = ModuleInfo::new(declaration.name.clone(), key.clone());
        info.count_tests = descriptors.len();

        Module {
            handle: ModuleHandle {
                inner: Arc::new(Erased {
                    key: key.clone(),
                    module,
                    runs,
                }),
                inverse_for_platform_testing: Arc::new(AtomicBool::new(false)),
            },
            key,
            declaration,
            descriptors: descriptors.into(),
            preferences: registry::preferences::<M>(),
            enabled: true,
            info,
        }
    }

    /// Preference key derived from the module's type name.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn title(&self) -> &str {
        &self.declaration.name
    }

    pub fn declaration(&self) -> &ModuleDeclaration {
        &self.declaration
    }

    pub fn descriptors(&self) -> &[TestDescriptor] {
        &self.descriptors
    }

    pub fn preferences(&self) -> &[PreferenceDecl] {
        &self.preferences
    }

    pub fn info(&self) -> &ModuleInfo {
        &self.info
    }

    /// Enabled state as read at the start of the module's last run.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_sync(&self) -> bool {
        self.declaration.sync
    }

    pub fn inverse_for_platform_testing(&self) -> bool {
        self.handle.inverse_for_platform_testing()
    }

    pub fn set_inverse_for_platform_testing(&self, inverse: bool) {
        self.handle
            .inverse_for_platform_testing
            .store(inverse, Ordering::SeqCst);
    }

    /// Number of tests the module is expected to report, declared and additional.
    pub fn test_count(&self) -> usize {
        self.descriptors.len() + self.info.count_additional_tests
    }

    pub(crate) fn handle(&self) -> ModuleHandle {
        self.handle.clone()
    }

    pub(crate) fn shared_descriptors(&self) -> Arc<[TestDescriptor]> {
        self.descriptors.clone()
    }

    pub(crate) fn prepare(
        &self,
        env: &Environment,
    ) -> (eyre::Result<PrepareInfo>, usize, Vec<Verdict>) {
        let mut cx = PrepareContext::new(
            env,
            &self.handle.inverse_for_platform_testing,
            self.info.count_additional_tests,
        );
        let prepared = self.handle.inner.prepare(&mut cx);
        let (additional_tests, reports) = cx.finish();
        (prepared, additional_tests, reports)
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("key", &self.key)
            .field("declaration", &self.declaration)
            .field("descriptors", &self.descriptors)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{CoreTestModule, SyncTestModule};
    use pretty_assertions::assert_eq;

    #[test]
    fn module_from_declarations() {
        let module = Module::new(CoreTestModule::default());
        assert_eq!(module.key(), "core_test_module");
        assert_eq!(module.title(), "Core Test Cases");
        assert!(!module.is_sync());
        assert_eq!(module.info().count_tests, module.descriptors().len());
        assert_eq!(
            module
                .descriptors()
                .iter()
                .map(|d| d.method.as_str())
                .collect::<Vec<_>>(),
            vec!["test_camera", "test_read_contacts", "test_future_api"]
        );
    }

    #[test]
    fn sync_declaration() {
        let module = Module::new(SyncTestModule::default());
        assert!(module.is_sync());
        assert_eq!(module.key(), "sync_test_module");
    }

    #[test]
    fn invoke_unknown_entry_point() {
        let module = Module::new(CoreTestModule::default());
        let err = module.handle().invoke(42, "test_missing").unwrap_err();
        assert_eq!(
            err.to_string(),
            "entry point \"test_missing\" not found in module \"core_test_module\""
        );
    }

    #[test]
    fn inverse_flag_is_shared_with_handles() {
        let module = Module::new(CoreTestModule::default());
        let handle = module.handle();
        module.set_inverse_for_platform_testing(true);
        assert!(handle.inverse_for_platform_testing());
    }
}
