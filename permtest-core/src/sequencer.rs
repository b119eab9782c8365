//! # Suite sequencing
//!
//! The sequencer owns the suite for the duration of a run and is the only place verdicts
//! are counted and callbacks are invoked. It walks the modules in order:
//!
//! ```text
//! for each module:
//!     read enabled preference, reset info, prepare
//!     disabled  -> mark skipped, count as completed, module-finish, next
//!     prepare failed -> log error, mark skipped, module-finish, next
//!     module-start
//!     for each descriptor: take permits, spawn test thread, wait up to join_timeout
//!     module-finish
//!     wait until every launched test delivered (or test_timeout elapsed)
//! suite-finish
//! ```
//!
//! Test threads deliver over an mpsc channel. Every wait on the control task also drains
//! that channel, so verdicts are processed in arrival order while launching goes on.
//!
//! A test of a sync module holds the module gate until it delivers, and with
//! `concurrency` set every test holds a worker permit. A test that outlives `test_timeout`
//! is reported as failed and its permits are handed back, so a hung body never stalls
//! the rest of the suite.

use itertools::Itertools;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, OwnedSemaphorePermit, Semaphore},
    time::{sleep_until, Instant},
};
use tracing::*;

use crate::{
    coordinator::Callbacks,
    executor::{self, Delivery, Lease, Outcome},
    info::{LogEntry, LogKind, PrepareInfo},
    runner::{emit, Environment, Message},
    suite::Suite,
    verdict::Verdict,
};

/// Bookkeeping of the module whose tests are in flight.
struct ModuleRun {
    index: usize,
    /// `true` while the test at that case index has not delivered.
    pending: Vec<bool>,
    outstanding: usize,
    /// Permits of launched tests, indexed by case.
    leases: Vec<Option<Lease>>,
}

impl ModuleRun {
    fn new(index: usize, launched: usize) -> ModuleRun {
        ModuleRun {
            index,
            pending: vec![true; launched],
            outstanding: launched,
            leases: vec![None; launched],
        }
    }

    /// Marks a case as delivered. Returns `false` when it was not pending.
    fn settle(&mut self, case_index: usize) -> bool {
        match self.pending.get_mut(case_index) {
            Some(pending) if *pending => {
                *pending = false;
                self.outstanding -= 1;
                if let Some(lease) = self.leases.get_mut(case_index) {
                    *lease = None;
                }
                true
            }
            _ => false,
        }
    }

    /// Cases launched that have not delivered yet.
    fn running(&self) -> Vec<usize> {
        self.pending
            .iter()
            .zip(&self.leases)
            .positions(|(pending, lease)| *pending && lease.is_some())
            .collect()
    }
}

pub(crate) struct Sequencer {
    suite: Suite,
    env: Arc<Environment>,
    callbacks: Callbacks,
    position: usize,
    tx: mpsc::UnboundedSender<Delivery>,
    rx: mpsc::UnboundedReceiver<Delivery>,
    workers: Option<Arc<Semaphore>>,
    current: Option<ModuleRun>,
    started: Instant,
}

impl Sequencer {
    pub(crate) fn new(suite: Suite, env: Arc<Environment>, callbacks: Callbacks) -> Sequencer {
        let (tx, rx) = mpsc::unbounded_channel();
        let workers = env
            .options()
            .concurrency
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        Sequencer {
            suite,
            env,
            callbacks,
            position: 0,
            tx,
            rx,
            workers,
            current: None,
            started: Instant::now(),
        }
    }

    pub(crate) async fn run(mut self) -> Suite {
        self.started = Instant::now();
        self.reset_suite();
        debug!("suite \"{}\" started", self.suite.info.title);
        self.callbacks.fire_suite_start(&self.suite.info);
        emit(Message::SuiteStart(self.suite.info.clone()));

        self.position = 0;
        while self.position < self.suite.modules.len() {
            let index = self.position;
            self.position += 1;
            if self.start_module(index).await {
                self.await_module(index).await;
            }
        }

        self.suite.info.elapsed_time = self.started.elapsed();
        debug!("suite \"{}\" finished: {}", self.suite.info.title, self.suite.info);
        self.callbacks.fire_suite_finish(&self.suite.info);
        emit(Message::SuiteFinish(self.suite.info.clone()));
        self.suite
    }

    fn reset_suite(&mut self) {
        let info = &mut self.suite.info;
        info.count_errors = 0;
        info.count_bypassed = 0;
        info.count_tests = 0;
        info.count_completed = 0;
        info.elapsed_time = Duration::ZERO;
        info.count_modules = self.suite.modules.len();
    }

    /// Prepares and launches the module at `index`. Returns `true` when tests are in flight.
    async fn start_module(&mut self, index: usize) -> bool {
        let env = self.env.clone();
        let module = &mut self.suite.modules[index];
        module.enabled = env.preferences().get_bool(module.key(), true);
        module.info.reset();

        let (prepared, additional_tests, reports) = module.prepare(&env);
        module.info.count_additional_tests = additional_tests;
        let launched = module.descriptors().len();

        if !module.enabled {
            let count = prepared.as_ref().map_or(0, |p| p.count_tests) + launched;
            module.info.skipped = true;
            module.info.count_tests = count;
            if !reports.is_empty() {
                debug!(
                    "dropping {} prepare reports of disabled module {}",
                    reports.len(),
                    module.key()
                );
            }
            debug!("module {} is disabled; skipping {count} tests", module.key());
            self.suite.info.count_tests += count;
            self.suite.info.count_completed += count;
            self.finish_module(index);
            return false;
        }

        let prepared = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                error!("failed to prepare module {}: {e:#}", module.key());
                module.info.skipped = true;
                module.info.count_errors = 1;
                module.info.log.push(LogEntry {
                    kind: LogKind::Error,
                    name: module.title().to_string(),
                    description: format!("{e:#}"),
                });
                self.suite.info.count_errors += 1;
                self.finish_module(index);
                return false;
            }
        };

        self.apply_prepare(index, &prepared, reports);

        let module = &self.suite.modules[index];
        self.callbacks.fire_module_start(&module.info);
        emit(Message::ModuleStart(module.info.clone()));
        debug!("module {} started with {launched} tests", module.key());

        self.current = Some(ModuleRun::new(index, launched));
        self.launch(index).await;
        self.finish_module(index);
        launched > 0
    }

    fn apply_prepare(&mut self, index: usize, prepared: &PrepareInfo, reports: Vec<Verdict>) {
        let module = &mut self.suite.modules[index];
        module.info.count_tests = prepared.count_tests + module.descriptors().len();
        module.info.count_errors = prepared.count_errors;
        module.info.count_bypassed = prepared.count_bypassed;
        module
            .info
            .log
            .extend(reports.iter().filter_map(LogEntry::from_verdict));

        let suite = &mut self.suite.info;
        suite.count_tests += module.info.count_tests;
        suite.count_errors += prepared.count_errors;
        suite.count_bypassed += prepared.count_bypassed;
        suite.count_completed += prepared.count_tests;

        let key = module.key().to_string();
        for verdict in reports {
            self.callbacks.fire_verdict(&verdict);
            emit(Message::Verdict(key.clone(), Box::new(verdict)));
        }
    }

    fn finish_module(&mut self, index: usize) {
        let info = &self.suite.modules[index].info;
        self.callbacks.fire_module_finish(info);
        emit(Message::ModuleFinish(info.clone()));
    }

    /// Spawns one thread per descriptor, in declaration order.
    async fn launch(&mut self, index: usize) {
        let module = &self.suite.modules[index];
        let handle = module.handle();
        let descriptors = module.shared_descriptors();
        let key = module.key().to_string();
        let gate = module.is_sync().then(|| Arc::new(Semaphore::new(1)));
        let workers = self.workers.clone();
        let join_timeout = self.env.options().join_timeout;

        for (case_index, descriptor) in descriptors.iter().enumerate() {
            let mut permits = Vec::new();
            for semaphore in gate.iter().chain(workers.iter()) {
                match self.acquire(index, semaphore).await {
                    Some(permit) => permits.push(permit),
                    None => debug!("{key}: no permit for {}; launching anyway", descriptor.method),
                }
            }
            let lease = Lease::new(permits);
            if let Some(lease_slot) = self
                .current
                .as_mut()
                .and_then(|run| run.leases.get_mut(case_index))
            {
                *lease_slot = Some(lease.clone());
            }

            trace!("{key}: launching {}", descriptor.method);
            let join = executor::spawn(
                handle.clone(),
                index,
                case_index,
                descriptor.clone(),
                self.env.clone(),
                self.tx.clone(),
                lease,
            );

            let deadline = Instant::now() + join_timeout;
            match self.serve_until(join, Some(deadline)).await {
                Some(Ok(())) => {}
                Some(Err(e)) => error!("{key}: test thread of {} failed: {e}", descriptor.method),
                None => {
                    warn!(
                        "{key}: {} still running after {join_timeout:?}; detaching",
                        descriptor.method
                    );
                    self.suite.modules[index].info.count_detached += 1;
                    emit(Message::Detached(key.clone(), Box::new(descriptor.clone())));
                }
            }
        }
    }

    /// Takes a permit of `semaphore`. Each time `test_timeout` passes without one, the
    /// running tests of the module are timed out, which hands their permits back.
    async fn acquire(
        &mut self,
        index: usize,
        semaphore: &Arc<Semaphore>,
    ) -> Option<OwnedSemaphorePermit> {
        loop {
            let deadline = self
                .env
                .options()
                .test_timeout
                .map(|timeout| Instant::now() + timeout);
            match self.serve_until(semaphore.clone().acquire_owned(), deadline).await {
                Some(Ok(permit)) => return Some(permit),
                Some(Err(_)) => return None,
                None => {
                    if self.time_out(index) == 0 {
                        return None;
                    }
                }
            }
        }
    }

    /// Waits until every launched test of the module delivered.
    async fn await_module(&mut self, index: usize) {
        let deadline = self
            .env
            .options()
            .test_timeout
            .map(|timeout| Instant::now() + timeout);

        while self
            .current
            .as_ref()
            .is_some_and(|run| run.index == index && run.outstanding > 0)
        {
            // `None` only on timeout; the sequencer holds a sender itself.
            let delivery = tokio::select! {
                delivery = self.rx.recv() => delivery,
                _ = sleep_until(deadline.unwrap_or_else(far_future)), if deadline.is_some() => None,
            };
            match delivery {
                Some(delivery) => self.deliver(delivery),
                None => {
                    self.time_out(index);
                    break;
                }
            }
        }
        self.current = None;
    }

    /// Drives `fut` to completion while servicing deliveries. `None` once `deadline` passed.
    async fn serve_until<F: Future>(
        &mut self,
        fut: F,
        deadline: Option<Instant>,
    ) -> Option<F::Output> {
        tokio::pin!(fut);
        let sleep = sleep_until(deadline.unwrap_or_else(far_future));
        tokio::pin!(sleep);
        loop {
            let delivery = tokio::select! {
                biased;
                out = &mut fut => return Some(out),
                _ = &mut sleep, if deadline.is_some() => return None,
                delivery = self.rx.recv() => delivery,
            };
            if let Some(delivery) = delivery {
                self.deliver(delivery);
            }
        }
    }

    fn deliver(&mut self, delivery: Delivery) {
        let Delivery {
            module_index,
            case_index,
            outcome,
        } = delivery;

        let settled = self
            .current
            .as_mut()
            .filter(|run| run.index == module_index)
            .is_some_and(|run| run.settle(case_index));
        if !settled {
            debug!("discarding late delivery of case {case_index} in module #{module_index}");
            return;
        }

        match outcome {
            Outcome::Verdict(verdict) => self.accept(module_index, *verdict),
            Outcome::Aborted(reason) => {
                error!("{reason}");
                self.suite.info.count_completed += 1;
            }
        }
        let info = &self.suite.modules[module_index].info;
        self.callbacks.fire_module_control(info);
        self.callbacks.fire_test_control(info);
    }

    fn accept(&mut self, module_index: usize, verdict: Verdict) {
        let module = &mut self.suite.modules[module_index];
        module.info.record(&verdict);
        self.suite.info.record(&verdict);
        trace!("{}", verdict.summary());
        self.callbacks.fire_verdict(&verdict);
        emit(Message::Verdict(module.key().to_string(), Box::new(verdict)));
    }

    /// Reports every running test of the module as a failure and releases its permits.
    /// Returns how many tests were timed out.
    fn time_out(&mut self, index: usize) -> usize {
        let Some(run) = self.current.as_ref().filter(|run| run.index == index) else {
            return 0;
        };
        let running = run.running();
        for lease in running.iter().filter_map(|&case| run.leases[case].as_ref()) {
            lease.release();
        }

        let timeout = self.env.options().test_timeout.unwrap_or_default();
        let module = &self.suite.modules[index];
        let is_inverse = executor::is_inverse(&module.handle(), &self.env);
        let descriptors = module.shared_descriptors();
        for &case_index in &running {
            let descriptor = descriptors[case_index].clone();
            warn!("{} did not finish within {timeout:?}", descriptor.method);
            let verdict = Verdict {
                is_inverse,
                ..Verdict::new(descriptor, false)
                    .with_message(format!("test did not finish within {timeout:?}"))
            };
            self.deliver(Delivery {
                module_index: index,
                case_index,
                outcome: Outcome::Verdict(Box::new(verdict)),
            });
        }
        running.len()
    }
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365)
}
