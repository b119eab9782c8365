//! # Permtest Core
//!
//! Core functionality for the permtest permission conformance framework.
//!
//! A permission test calls a privileged platform API and reports whether the outcome
//! matches the expectation implied by the permission's grant state. Tests are grouped
//! into modules, modules into suites, and a suite is run by the coordinator.
//!
//! ## Architecture (block diagram)
//!
//! ```text
//! +---------------------+      +---------------------+      +---------------------+
//! | module definitions  | ---> | coordinator         | ---> | sequencer           |
//! | #[permtest::module] |      | one suite / process |      | control task        |
//! | #[permission_test]  |      +---------------------+      | counters, callbacks |
//! +---------------------+                                   +---------------------+
//!            |                                                 |            ^
//!            v                                           spawn |            | deliver
//! +---------------------+                                      v            |
//! | registry            |                               +---------------------+
//! | descriptors, prefs  |                               | executor            |
//! +---------------------+                               | one thread per test |
//!                                                       +---------------------+
//!                                                                 |
//! +---------------------+      +---------------------+            v
//! | reporter (output)   | <--- | event channel       |     +---------------------+
//! | List/Table/Null     |      | runner::subscribe   |     | platform queries    |
//! +---------------------+      +---------------------+     | grants, sdk, certs  |
//!                                                          +---------------------+
//! ```
//!
//! Most users should use the main `permtest` crate rather than importing `permtest-core`
//! directly.

pub mod config;
pub mod coordinator;
pub mod descriptor;
pub mod error;
mod executor;
pub mod info;
pub mod module;
pub mod platform;
pub mod policy;
pub mod preference;
pub mod probe;
pub mod registry;
pub mod reporter;
#[doc(hidden)]
pub mod runner;
mod sequencer;
pub mod suite;
pub mod verdict;

#[cfg(test)]
mod testing;

// Re-export error handling crates
pub use anyhow;
pub use eyre;

/// Type alias for module names in events.
///
/// A module name is the preference key derived from the module's type name, e.g.
/// `core_test_module`.
pub type ModuleName = String;

// Re-export key functionality
pub use config::{get_config, Config, DeviceConfig, SuiteConfig};
pub use coordinator::{Callbacks, SuiteCoordinator, SuiteRun};
pub use descriptor::{TestCase, TestDescriptor};
pub use error::{Error, Result};
pub use info::{LogEntry, LogKind, ModuleInfo, PrepareInfo, SuiteInfo};
pub use module::{
    HookContext, Module, ModuleDeclaration, ModuleMetadata, PermissionModule, PermissionTests,
    PrepareContext,
};
pub use platform::{Platform, SignatureMatch, StaticPlatform};
pub use preference::{MemoryPreferenceStore, PreferenceDecl, PreferenceStore};
pub use probe::{ProbeError, ProbeResult};
pub use reporter::{ListReporter, NullReporter, Reporter, ReporterType, TableReporter};
pub use runner::{Environment, Options};
pub use suite::{Suite, SuiteReport};
pub use verdict::Verdict;
