//! # permtest - Permission Enforcement Certification Runner
//!
//! permtest runs permission tests: each test calls a privileged platform API and checks
//! that the platform allows the call exactly when the permission is granted. Tests are
//! grouped into modules, modules into suites.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use permtest::{eyre, ProbeError, ProbeResult};
//!
//! #[permtest::module(name = "Camera Test Cases", priority = 1)]
//! #[derive(Default)]
//! struct CameraTestModule {
//!     #[preference(label = "Use front camera", key = "camera_front")]
//!     front: bool,
//! }
//!
//! #[permtest::tests]
//! impl CameraTestModule {
//!     #[permission_test("CAMERA")]
//!     fn test_open_camera(&self) -> ProbeResult {
//!         Err(ProbeError::security("camera access denied"))
//!     }
//!
//!     #[permission_test("RECORD_AUDIO", sdk_min = 23)]
//!     fn test_record_audio(&self) -> eyre::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! impl permtest::PermissionModule for CameraTestModule {}
//!
//! #[permtest::main]
//! #[tokio::main]
//! async fn main() -> eyre::Result<()> {
//!     let catalog = run();
//!     permtest::App::new().run(catalog).await
//! }
//! ```
//!
//! ## Outcomes
//!
//! A test body returns `Ok(())` when the call went through. A [`ProbeError`] classifies
//! the failure: a security denial is the expected outcome for a denied permission,
//! anything else is an error. Bodies returning `eyre::Result` or `anyhow::Result` are
//! accepted as well; their errors count as unexpected.
//!
//! ## Configuration
//!
//! Device profile, preferences and named suites are read from `permtest.toml`, see
//! [`Config`].

// Lets the attribute macros, which emit `::permtest::` paths, be used inside this crate.
extern crate self as permtest;

mod app;
mod catalog;

pub use app::App;
pub use catalog::{Catalog, ModuleFactory, ALL_MODULES};
pub use permtest_core::{self, *};
pub use permtest_derive::{main, module, tests};

// Re-exported for the code generated by `#[permtest::module]` and `#[permtest::main]`.
#[doc(hidden)]
pub use inventory;

/// A module compiled into the binary, submitted by `#[permtest::module]`.
pub struct ModuleRegistration {
    pub name: &'static str,
    pub factory: ModuleFactory,
}

inventory::collect!(ModuleRegistration);
