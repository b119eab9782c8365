//! # Suite coordination
//!
//! Only one suite may run per process. [`SuiteCoordinator::start`] claims the process wide
//! slot, hands the suite to a sequencer on a dedicated control task and returns a
//! [`SuiteRun`] to await. The slot is released when the control task ends.

use chrono::Utc;
use eyre::WrapErr;
use once_cell::sync::Lazy;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::task::JoinHandle;
use tracing::*;

use crate::{
    info::{ModuleInfo, SuiteInfo},
    runner::Environment,
    sequencer::Sequencer,
    suite::{Suite, SuiteReport},
    verdict::Verdict,
    Error,
};

type Callback<T> = Option<Box<dyn FnMut(&T) + Send>>;

/// Consumer callbacks. All of them run on the control task, one at a time.
#[derive(Default)]
pub struct Callbacks {
    verdict: Callback<Verdict>,
    suite_start: Callback<SuiteInfo>,
    suite_finish: Callback<SuiteInfo>,
    module_start: Callback<ModuleInfo>,
    module_finish: Callback<ModuleInfo>,
    module_control: Callback<ModuleInfo>,
    test_control: Callback<ModuleInfo>,
}

macro_rules! callback {
    ($name:ident, $fire:ident, $t:ty) => {
        pub fn $name(mut self, f: impl FnMut(&$t) + Send + 'static) -> Self {
            self.$name = Some(Box::new(f));
            self
        }

        pub(crate) fn $fire(&mut self, value: &$t) {
            if let Some(f) = self.$name.as_mut() {
                f(value);
            }
        }
    };
}

impl Callbacks {
    pub fn new() -> Callbacks {
        Callbacks::default()
    }

    callback!(verdict, fire_verdict, Verdict);
    callback!(suite_start, fire_suite_start, SuiteInfo);
    callback!(suite_finish, fire_suite_finish, SuiteInfo);
    callback!(module_start, fire_module_start, ModuleInfo);
    callback!(module_finish, fire_module_finish, ModuleInfo);
    // Invoked after every test delivery of a module.
    callback!(module_control, fire_module_control, ModuleInfo);
    callback!(test_control, fire_test_control, ModuleInfo);
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("verdict", &self.verdict.is_some())
            .field("suite_start", &self.suite_start.is_some())
            .field("suite_finish", &self.suite_finish.is_some())
            .field("module_start", &self.module_start.is_some())
            .field("module_finish", &self.module_finish.is_some())
            .field("module_control", &self.module_control.is_some())
            .field("test_control", &self.test_control.is_some())
            .finish()
    }
}

static COORDINATOR: Lazy<SuiteCoordinator> = Lazy::new(SuiteCoordinator::new);

#[derive(Debug)]
pub struct SuiteCoordinator {
    running: Arc<AtomicBool>,
}

/// Clears the running flag when the control task ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SuiteCoordinator {
    /// The coordinator shared by the whole process.
    pub fn global() -> &'static SuiteCoordinator {
        &COORDINATOR
    }

    pub(crate) fn new() -> SuiteCoordinator {
        SuiteCoordinator {
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Starts `suite` on a new control task. Must be called within a tokio runtime.
    ///
    /// Fails with [`Error::SuiteAlreadyRunning`] while another suite is in progress; in that
    /// case nothing is scheduled and no callback fires.
    pub fn start(
        &self,
        mut suite: Suite,
        env: Arc<Environment>,
        callbacks: Callbacks,
    ) -> crate::Result<SuiteRun> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("refusing to start \"{}\": {}", suite.title(), Error::SuiteAlreadyRunning);
            return Err(Error::SuiteAlreadyRunning);
        }
        let guard = RunningGuard(self.running.clone());

        suite.info.start_time = Some(Utc::now());
        info!("starting suite \"{}\"", suite.title());
        let sequencer = Sequencer::new(suite, env, callbacks);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            sequencer.run().await
        });

        Ok(SuiteRun { handle })
    }
}

/// A suite run in progress.
#[derive(Debug)]
pub struct SuiteRun {
    handle: JoinHandle<Suite>,
}

impl SuiteRun {
    /// Waits for the suite to finish.
    pub async fn wait(self) -> eyre::Result<SuiteReport> {
        let suite = self.handle.await.wrap_err("suite control task failed")?;
        Ok(SuiteReport::new(suite))
    }
}
