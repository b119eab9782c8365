//! Runner plumbing shared by the sequencer, the executor and reporters: the event channel,
//! run options and the environment tests run against.
use eyre::WrapErr;
use once_cell::sync::{Lazy, OnceCell};
use std::{
    ops::Deref,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::broadcast;
use tracing::*;

use crate::{
    config::Config,
    descriptor::TestDescriptor,
    info::{ModuleInfo, SuiteInfo},
    platform::{Platform, SignatureMatch, StaticPlatform},
    preference::{MemoryPreferenceStore, PreferenceStore},
    verdict::Verdict,
    ModuleName,
};

pub static CHANNEL: Lazy<Mutex<Option<broadcast::Sender<Message>>>> =
    Lazy::new(|| Mutex::new(Some(broadcast::channel(1000).0)));

pub fn publish(msg: Message) -> eyre::Result<()> {
    let Ok(guard) = CHANNEL.lock() else {
        eyre::bail!("failed to acquire runner channel lock");
    };
    let Some(tx) = guard.deref() else {
        eyre::bail!("runner channel has been already closed");
    };

    tx.send(msg)
        .wrap_err("failed to publish message to the runner channel")?;

    Ok(())
}

/// Subscribe to the channel to see the real-time suite execution events.
pub fn subscribe() -> eyre::Result<broadcast::Receiver<Message>> {
    let Ok(guard) = CHANNEL.lock() else {
        eyre::bail!("failed to acquire runner channel lock");
    };
    let Some(tx) = guard.deref() else {
        eyre::bail!("runner channel has been already closed");
    };

    Ok(tx.subscribe())
}

/// Publishes without failing the run. Nobody listening is the common case.
pub(crate) fn emit(msg: Message) {
    if let Err(e) = publish(msg) {
        trace!("{e:#}");
    }
}

#[derive(Debug, Clone)]
pub enum Message {
    SuiteStart(SuiteInfo),
    ModuleStart(ModuleInfo),
    Verdict(ModuleName, Box<Verdict>),
    /// A test thread outlived the join bound. Its verdict still arrives later.
    Detached(ModuleName, Box<TestDescriptor>),
    ModuleFinish(ModuleInfo),
    SuiteFinish(SuiteInfo),
}

/// Knobs of a suite run.
#[derive(Debug, Clone)]
pub struct Options {
    /// Expect every API call to be denied.
    pub inverse_test_result: bool,
    /// How long the sequencer waits for a test thread after launching it.
    pub join_timeout: Duration,
    /// Outstanding tests of a module are reported as failures after this long.
    pub test_timeout: Option<Duration>,
    /// Maximum number of test threads running at once.
    pub concurrency: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            inverse_test_result: false,
            join_timeout: Duration::from_secs(1),
            test_timeout: None,
            concurrency: None,
        }
    }
}

impl From<&Config> for Options {
    fn from(cfg: &Config) -> Self {
        Options {
            inverse_test_result: cfg.inverse_test_result,
            join_timeout: cfg.join_timeout,
            test_timeout: cfg.test_timeout,
            concurrency: cfg.concurrency,
        }
    }
}

/// Everything a suite run reads from the outside world.
pub struct Environment {
    platform: Arc<dyn Platform>,
    preferences: Arc<dyn PreferenceStore>,
    options: Options,
    signature: OnceCell<SignatureMatch>,
}

impl Environment {
    pub fn new(platform: Arc<dyn Platform>, preferences: Arc<dyn PreferenceStore>) -> Environment {
        Environment {
            platform,
            preferences,
            options: Options::default(),
            signature: OnceCell::new(),
        }
    }

    /// Environment backed by the device profile and preferences of `permtest.toml`.
    pub fn from_config(cfg: &Config) -> Environment {
        Environment::new(
            Arc::new(StaticPlatform::from_config(&cfg.device)),
            Arc::new(MemoryPreferenceStore::with_values(cfg.preferences.clone())),
        )
        .with_options(Options::from(cfg))
    }

    pub fn with_options(mut self, options: Options) -> Environment {
        self.options = options;
        self
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    pub fn preferences(&self) -> &dyn PreferenceStore {
        self.preferences.as_ref()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Signature comparison, computed on first use.
    pub fn signature(&self) -> SignatureMatch {
        *self
            .signature
            .get_or_init(|| self.platform.signature_match())
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("options", &self.options)
            .field("signature", &self.signature.get())
            .finish_non_exhaustive()
    }
}

/// Extracts the message of a caught panic.
pub(crate) fn panic_message(name: &str, payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("{name} failed with message: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("{name} failed with message: {message}")
    } else {
        format!("{name} failed with unknown message")
    }
}
