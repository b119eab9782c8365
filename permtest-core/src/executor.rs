//! # Test execution
//!
//! Runs one permission test to a single [`Verdict`]:
//!
//! 1. preconditions (required grants, SDK range, ignore flag) turn into bypasses
//! 2. the body runs with panics caught
//! 3. the failure, if any, is classified by [`ProbeError::disposition`]
//! 4. a healthy call with the permission granted reports [`GRANTED_MESSAGE`]
//! 5. the module's result hook post-processes the verdict
//!
//! In inverse mode a denial is the expected outcome, so the success value of a
//! failed call flips.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex},
};
use tokio::{sync::mpsc, sync::OwnedSemaphorePermit, task::JoinHandle};
use tracing::*;

use crate::{
    descriptor::TestDescriptor,
    module::{HookContext, ModuleHandle},
    platform::Platform,
    probe::{Disposition, ProbeError, ProbeResult},
    runner::{panic_message, Environment},
    verdict::{Verdict, GRANTED_MESSAGE},
};

/// Message of a verdict whose API call raised nothing.
const NO_MESSAGE: &str = "(none)";

/// What a test thread hands back to the control task.
#[derive(Debug)]
pub(crate) struct Delivery {
    pub(crate) module_index: usize,
    pub(crate) case_index: usize,
    pub(crate) outcome: Outcome,
}

/// Semaphore permits held on behalf of a running test. Whoever releases first, the test
/// thread on delivery or the control task on timeout, gives them back.
#[derive(Debug, Clone)]
pub(crate) struct Lease(Arc<Mutex<Vec<OwnedSemaphorePermit>>>);

impl Lease {
    pub(crate) fn new(permits: Vec<OwnedSemaphorePermit>) -> Lease {
        Lease(Arc::new(Mutex::new(permits)))
    }

    pub(crate) fn release(&self) {
        let permits = match self.0.lock() {
            Ok(mut permits) => std::mem::take(&mut *permits),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        drop(permits);
    }
}

#[derive(Debug)]
pub(crate) enum Outcome {
    Verdict(Box<Verdict>),
    /// The test could not produce a verdict at all.
    Aborted(String),
}

fn check_preconditions(descriptor: &TestDescriptor, platform: &dyn Platform) -> ProbeResult {
    let permission = &descriptor.permission;
    if let Some(missing) = descriptor
        .required_permissions
        .iter()
        .find(|p| !platform.is_permission_granted(p))
    {
        return Err(ProbeError::bypass(format!(
            "{permission} : `{missing}` permission should be granted to run ."
        )));
    }

    let sdk = platform.sdk_version();
    if sdk < descriptor.sdk_min {
        return Err(ProbeError::bypass(format!(
            "{permission} : SDK{sdk} is not supported to run.(SDK MIN:{})",
            descriptor.sdk_min
        )));
    }
    if sdk > descriptor.sdk_max {
        return Err(ProbeError::bypass(format!(
            "{permission} : SDK{sdk} is not supported to run.(SDK MAX:{})",
            descriptor.sdk_max
        )));
    }

    if descriptor.ignore {
        return Err(ProbeError::bypass(format!(
            "{permission} is set to be ignored for some reasons. Please. Check source code."
        )));
    }
    Ok(())
}

fn invoke(
    module: &ModuleHandle,
    case_index: usize,
    descriptor: &TestDescriptor,
) -> crate::Result<ProbeResult> {
    match catch_unwind(AssertUnwindSafe(|| module.invoke(case_index, &descriptor.method))) {
        Ok(result) => result,
        Err(payload) => Ok(Err(ProbeError::Other(panic_message(
            &descriptor.method,
            payload.as_ref(),
        )))),
    }
}

/// Polarity of every verdict of `module`.
pub(crate) fn is_inverse(module: &ModuleHandle, env: &Environment) -> bool {
    env.options().inverse_test_result || module.inverse_for_platform_testing()
}

/// Runs the test at `case_index` of `module` and evaluates its verdict.
///
/// Fails only when the module has no entry point for the descriptor.
pub(crate) fn execute(
    module: &ModuleHandle,
    case_index: usize,
    descriptor: &TestDescriptor,
    env: &Environment,
) -> crate::Result<Verdict> {
    let platform = env.platform();
    let is_inverse = is_inverse(module, env);
    let success_value = !is_inverse;
    let failure_value = is_inverse;

    let granted = platform.is_permission_granted(&descriptor.permission);
    let result = match check_preconditions(descriptor, platform) {
        Ok(()) => invoke(module, case_index, descriptor)?,
        Err(bypass) => Err(bypass),
    };

    let mut success = success_value;
    let mut bypassed = false;
    let mut api_successful = true;
    let mut message = NO_MESSAGE.to_string();
    let mut cause = None;

    if let Err(e) = result {
        api_successful = false;
        match e.disposition() {
            Disposition::Bypass => {
                success = true;
                bypassed = true;
            }
            Disposition::Executed => {}
            Disposition::Failure => success = failure_value,
        }
        message = e.message();
        trace!("{}: {message}", descriptor.method);
        cause = Some(Arc::new(e));
    }

    if api_successful && granted {
        success = success_value;
        message = GRANTED_MESSAGE.to_string();
    }

    let signature = env.signature();
    let verdict = Verdict {
        source: descriptor.clone(),
        success,
        bypassed,
        api_successful,
        granted: platform.is_permission_granted(&descriptor.permission),
        platform_signature_match: signature.platform,
        gms_signature_match: signature.gms,
        development_protection: descriptor.development_protection,
        is_inverse,
        message,
        cause,
    };

    let cx = HookContext::new(env);
    Ok(module.result_hook(&cx, verdict).normalize())
}

/// Launches a test on its own blocking thread. The lease is released once the verdict has
/// been handed over.
pub(crate) fn spawn(
    module: ModuleHandle,
    module_index: usize,
    case_index: usize,
    descriptor: TestDescriptor,
    env: Arc<Environment>,
    tx: mpsc::UnboundedSender<Delivery>,
    lease: Lease,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let outcome = match catch_unwind(AssertUnwindSafe(|| {
            execute(&module, case_index, &descriptor, &env)
        })) {
            Ok(Ok(verdict)) => Outcome::Verdict(Box::new(verdict)),
            Ok(Err(e)) => Outcome::Aborted(e.to_string()),
            Err(payload) => Outcome::Aborted(panic_message(&descriptor.method, payload.as_ref())),
        };

        let delivery = Delivery {
            module_index,
            case_index,
            outcome,
        };
        if tx.send(delivery).is_err() {
            debug!("control task is gone; dropping verdict of {}", descriptor.method);
        }
        lease.release();
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        module::Module,
        platform::{SignatureMatch, StaticPlatform},
        preference::MemoryPreferenceStore,
        runner::Options,
        testing::{probe_module, CoreTestModule},
    };
    use test_case::test_case;

    fn env(platform: StaticPlatform, inverse_test_result: bool) -> Environment {
        Environment::new(Arc::new(platform), Arc::new(MemoryPreferenceStore::new())).with_options(
            Options {
                inverse_test_result,
                ..Default::default()
            },
        )
    }

    fn run(module: &Module, index: usize, env: &Environment) -> Verdict {
        execute(&module.handle(), index, &module.descriptors()[index], env).unwrap()
    }

    // (success, bypassed, api_successful)
    #[test_case("ok", false, false => (true, false, true); "healthy denied normal")]
    #[test_case("ok", true, false => (true, false, true); "healthy granted normal")]
    #[test_case("ok", false, true => (false, false, true); "healthy denied inverse")]
    #[test_case("ok", true, true => (false, false, true); "healthy granted inverse")]
    #[test_case("security", false, false => (false, false, false); "security normal")]
    #[test_case("security", false, true => (true, false, false); "security inverse")]
    #[test_case("service", false, false => (true, true, false); "service unavailable normal")]
    #[test_case("service", false, true => (true, true, false); "service unavailable inverse")]
    #[test_case("null_arg", false, false => (true, false, false); "null argument normal")]
    #[test_case("null_arg", false, true => (false, false, false); "null argument inverse")]
    #[test_case("null", false, false => (false, false, false); "null dereference")]
    #[test_case("missing", false, false => (false, false, false); "missing method")]
    #[test_case("unexpected", false, false => (false, false, false); "unexpected failure")]
    #[test_case("panic", false, false => (false, false, false); "panicking body")]
    #[test_case("panic", false, true => (true, false, false); "panicking body inverse")]
    #[test_case("bypass", false, false => (true, true, false); "explicit bypass normal")]
    #[test_case("bypass", false, true => (true, true, false); "explicit bypass inverse")]
    fn classification(behavior: &str, granted: bool, inverse: bool) -> (bool, bool, bool) {
        let mut platform = StaticPlatform::new(34);
        if granted {
            platform = platform.with_granted(["PROBE"]);
        }
        let module = probe_module(behavior);
        let verdict = run(&module, 0, &env(platform, inverse));
        assert_eq!(verdict.is_inverse, inverse);
        (verdict.success, verdict.bypassed, verdict.api_successful)
    }

    #[test]
    fn granted_message() {
        let platform = StaticPlatform::new(34).with_granted(["PROBE"]);
        let verdict = run(&probe_module("ok"), 0, &env(platform, false));
        assert!(verdict.granted);
        assert_eq!(verdict.message, GRANTED_MESSAGE);
    }

    #[test]
    fn healthy_without_grant_keeps_placeholder_message() {
        let verdict = run(&probe_module("ok"), 0, &env(StaticPlatform::new(34), false));
        assert!(!verdict.granted);
        assert_eq!(verdict.message, "(none)");
    }

    #[test]
    fn failure_message_is_preserved() {
        let verdict = run(
            &probe_module("security"),
            0,
            &env(StaticPlatform::new(34), false),
        );
        assert_eq!(verdict.message, "denied by probe");
        assert!(verdict.cause.is_some());
    }

    #[test]
    fn sdk_above_max_bypasses_without_running() {
        let module = Module::new(CoreTestModule::default());
        // test_future_api declares sdk_max = 30
        let verdict = run(&module, 2, &env(StaticPlatform::new(34), false));
        assert!(verdict.bypassed);
        assert!(verdict.success);
        assert!(!verdict.api_successful);
        assert_eq!(
            verdict.message,
            "android.permission.FUTURE_API : SDK34 is not supported to run.(SDK MAX:30)"
        );
    }

    #[test]
    fn sdk_below_min_bypasses_without_running() {
        let verdict = run(&probe_module("panic"), 1, &env(StaticPlatform::new(34), false));
        assert!(verdict.bypassed);
        assert_eq!(
            verdict.message,
            "android.permission.PROBE : SDK34 is not supported to run.(SDK MIN:35)"
        );
    }

    #[test]
    fn missing_required_permission_bypasses() {
        let verdict = run(&probe_module("panic"), 2, &env(StaticPlatform::new(34), true));
        assert!(verdict.bypassed);
        assert!(verdict.success);
        assert_eq!(
            verdict.message,
            "android.permission.PROBE : `android.permission.BLUETOOTH_CONNECT` permission should be granted to run ."
        );
    }

    #[test]
    fn ignored_test_bypasses() {
        let verdict = run(&probe_module("panic"), 3, &env(StaticPlatform::new(34), false));
        assert!(verdict.bypassed);
        assert_eq!(
            verdict.message,
            "android.permission.PROBE is set to be ignored for some reasons. Please. Check source code."
        );
    }

    #[test]
    fn platform_testing_inverse_flag() {
        let module = probe_module("security");
        module.set_inverse_for_platform_testing(true);
        let verdict = run(&module, 0, &env(StaticPlatform::new(34), false));
        assert!(verdict.is_inverse);
        assert!(verdict.success);
    }

    #[test]
    fn signature_flags_are_copied() {
        let platform = StaticPlatform::new(34).with_signature(SignatureMatch {
            platform: true,
            gms: true,
        });
        let verdict = run(&probe_module("ok"), 0, &env(platform, false));
        assert!(verdict.platform_signature_match);
        assert!(verdict.gms_signature_match);
    }

    #[test]
    fn idempotent_for_fixed_platform_state() {
        let module = probe_module("security");
        let env = env(StaticPlatform::new(34).with_granted(["CAMERA"]), false);
        let first = run(&module, 0, &env);
        let second = run(&module, 0, &env);
        assert_eq!(
            (first.success, first.bypassed, first.api_successful, first.message),
            (
                second.success,
                second.bypassed,
                second.api_successful,
                second.message
            )
        );
    }

    #[test]
    fn entry_point_not_found() {
        let module = probe_module("ok");
        let descriptor = TestDescriptor::new("PROBE", "test_elsewhere");
        let err = execute(
            &module.handle(),
            7,
            &descriptor,
            &env(StaticPlatform::new(34), false),
        )
        .unwrap_err();
        assert!(matches!(err, crate::Error::EntryPointNotFound { .. }));
    }

    #[tokio::test]
    async fn spawned_test_delivers_once() {
        let module = probe_module("security");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let env = Arc::new(env(StaticPlatform::new(34), false));
        spawn(
            module.handle(),
            3,
            0,
            module.descriptors()[0].clone(),
            env,
            tx,
            Lease::new(Vec::new()),
        )
        .await
        .unwrap();

        let delivery = rx.recv().await.unwrap();
        assert_eq!((delivery.module_index, delivery.case_index), (3, 0));
        let Outcome::Verdict(verdict) = delivery.outcome else {
            panic!("expected a verdict");
        };
        assert!(!verdict.success);
        assert!(rx.recv().await.is_none());
    }
}
