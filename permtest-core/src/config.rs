//! # Configuration Module
//!
//! Handles loading permtest configuration from `permtest.toml` and the environment.
//!
//! ## Config File Location
//!
//! 1. If `PERMTEST_CONFIG` environment variable is set, load from that path
//! 2. Otherwise, load from `permtest.toml` in the current directory
//!
//! A missing `permtest.toml` is not an error; every key has a default.
//!
//! ## Configuration Structure
//!
//! ```toml
//! inverse_test_result = false
//! join_timeout = "1s"
//! test_timeout = "30s"
//! concurrency = 8
//!
//! [device]
//! sdk = 34
//! granted = ["CAMERA", "android.permission.READ_CONTACTS"]
//! platform_signature = false
//! gms_signature = false
//!
//! [preferences]
//! core_test_module = true
//! core_enable_runtime = false
//!
//! [[suites]]
//! name = "Signature Tests"
//! label = "Run Signature/Runtime Test"
//! modules = ["runtime_test_module", "signature_test_module"]
//! ```
//!
//! ## Environment
//!
//! - `PERMTEST_PREF_<KEY>=true|false` overrides the preference `<key>`
//! - `PERMTEST_INVERSE_TEST_RESULT=true|false` overrides `inverse_test_result`
//! - `PERMTEST_SDK=<n>` overrides `device.sdk`

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::{collections::HashMap, io::Read, path::Path, str::FromStr, time::Duration};
use tracing::*;

use crate::{Error, Result};

/// Environment variable name for specifying the config file path.
const PERMTEST_CONFIG_ENV: &str = "PERMTEST_CONFIG";

static PREFIX: &str = "PERMTEST";

static CONFIG: Lazy<Config> = Lazy::new(|| {
    let _ = dotenv::dotenv();
    Config::load().unwrap_or_else(|e| {
        error!("{e}");
        Config::default()
    })
});

/// Get the process-wide configuration, loading it on first use.
pub fn get_config() -> &'static Config {
    &CONFIG
}

/// permtest's configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Swap which raw outcome counts as success for every module.
    pub inverse_test_result: bool,
    /// How long the sequencer waits for a test thread before launching the next one.
    #[serde(with = "humantime_serde")]
    pub join_timeout: Duration,
    /// How long a module waits for outstanding verdicts before synthesizing timeouts.
    #[serde(with = "humantime_serde")]
    pub test_timeout: Option<Duration>,
    /// Maximum number of test threads running at once. Unbounded when unset.
    pub concurrency: Option<usize>,
    pub device: DeviceConfig,
    pub preferences: HashMap<String, bool>,
    pub suites: Vec<SuiteConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            inverse_test_result: false,
            join_timeout: Duration::from_secs(1),
            test_timeout: None,
            concurrency: None,
            device: DeviceConfig::default(),
            preferences: HashMap::new(),
            suites: Vec::new(),
        }
    }
}

/// Device profile used by [`crate::platform::StaticPlatform`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub sdk: u32,
    pub granted: Vec<String>,
    pub platform_signature: bool,
    pub gms_signature: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            sdk: 34,
            granted: Vec::new(),
            platform_signature: false,
            gms_signature: false,
        }
    }
}

/// A suite assembled from registered modules.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuiteConfig {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub details: String,
    /// Preference keys of the modules, in run order.
    pub modules: Vec<String>,
}

impl Config {
    /// Load permtest configuration from path.
    fn load_from(path: &Path) -> Result<Config> {
        let Ok(mut file) = std::fs::File::open(path) else {
            let mut cfg = Config::default();
            cfg.load_env();
            return Ok(cfg);
        };

        let mut buf = String::new();
        file.read_to_string(&mut buf)
            .map_err(|e| Error::LoadError(e.to_string()))?;

        let mut cfg: Config = toml::from_str(&buf).map_err(|e| {
            Error::LoadError(format!(
                "failed to deserialize permtest.toml into permtest::Config: {e}"
            ))
        })?;

        debug!("permtest.toml was successfully loaded: {cfg:#?}");

        cfg.load_env();

        Ok(cfg)
    }

    /// Load permtest configuration.
    ///
    /// Loading order:
    /// 1. If `PERMTEST_CONFIG` env var is set, load from that path
    /// 2. Otherwise, load from `permtest.toml` in the current directory
    fn load() -> Result<Config> {
        match std::env::var(PERMTEST_CONFIG_ENV) {
            Ok(path) => {
                let path = Path::new(&path);

                // Detect misuse: if it doesn't look like a file path, error out
                if path.extension().is_none_or(|ext| ext != "toml")
                    && !path.to_string_lossy().contains(std::path::MAIN_SEPARATOR)
                    && !path.to_string_lossy().contains('/')
                {
                    return Err(Error::LoadError(format!(
                        "{PERMTEST_CONFIG_ENV} should be a path to a config file, not a config value. \
                         Got: {path:?}. Use {PREFIX}_<KEY>=value for config values instead."
                    )));
                }

                if !path.exists() {
                    return Err(Error::LoadError(format!(
                        "Config file specified by {PERMTEST_CONFIG_ENV} not found: {path:?}"
                    )));
                }

                debug!("Loading config from {PERMTEST_CONFIG_ENV}={path:?}");
                Config::load_from(path)
            }
            Err(_) => Config::load_from(Path::new("permtest.toml")),
        }
    }

    /// Apply `PERMTEST_*` environment overrides.
    fn load_env(&mut self) {
        let pref_prefix = format!("{PREFIX}_PREF_");
        debug!("Loading preferences from env");
        for (k, v) in std::env::vars() {
            let Some(key) = k.strip_prefix(&pref_prefix) else {
                continue;
            };
            match v.parse::<bool>() {
                Ok(value) => {
                    self.preferences.insert(key.to_lowercase(), value);
                }
                Err(e) => warn!("ignoring {k}={v:?}: {e}"),
            }
        }

        if let Some(inverse) = env_value(&format!("{PREFIX}_INVERSE_TEST_RESULT")) {
            self.inverse_test_result = inverse;
        }
        if let Some(sdk) = env_value(&format!("{PREFIX}_SDK")) {
            self.device.sdk = sdk;
        }

        debug!("permtest configuration loaded from env: {self:#?}");
    }

    /// Get a preference declared in `[preferences]` or the environment.
    pub fn preference(&self, key: impl AsRef<str>) -> Result<bool> {
        let key = key.as_ref();
        self.preferences
            .get(key)
            .copied()
            .ok_or_else(|| Error::ValueNotFound(key.to_string()))
    }

    /// Find a configured suite by name.
    pub fn suite(&self, name: &str) -> Option<&SuiteConfig> {
        self.suites.iter().find(|suite| suite.name == name)
    }
}

fn env_value<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = std::env::var(key).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!("ignoring {key}={value:?}: {e}");
            None
        }
    }
}
