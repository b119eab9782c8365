//! Every module compiled into the binary, and the suites built from them.

use itertools::Itertools;
use permtest_core::{Config, Module, Suite};
use tracing::*;

/// Creates a fresh instance of a registered module.
pub type ModuleFactory = fn() -> Module;

/// Name of the suite running every registered module.
pub const ALL_MODULES: &str = "all";

#[derive(Debug, Default)]
pub struct Catalog {
    factories: Vec<(&'static str, ModuleFactory)>,
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog::default()
    }

    pub fn add_module(&mut self, name: &'static str, factory: ModuleFactory) {
        trace!("registered module {name}");
        self.factories.push((name, factory));
    }

    /// Fresh module instances ordered by priority, then by key.
    pub fn modules(&self) -> Vec<Module> {
        self.factories
            .iter()
            .map(|(_, factory)| factory())
            .sorted_by(|a, b| {
                a.declaration()
                    .priority
                    .cmp(&b.declaration().priority)
                    .then_with(|| a.key().cmp(b.key()))
            })
            .collect()
    }

    pub fn module(&self, key: &str) -> Option<Module> {
        self.modules().into_iter().find(|module| module.key() == key)
    }

    pub fn all_modules(&self) -> Suite {
        Suite::new("All Modules")
            .with_key(ALL_MODULES)
            .with_label("Run All Modules")
            .with_details("every registered module ordered by priority")
            .with_modules(self.modules())
    }

    /// Suite of the given module keys, in the given order.
    pub fn select(&self, keys: &[String]) -> eyre::Result<Suite> {
        Ok(Suite::new("Selected Modules")
            .with_details(keys.join(", "))
            .with_modules(self.pick(keys)?))
    }

    fn pick(&self, keys: &[String]) -> eyre::Result<Vec<Module>> {
        let mut modules = self.modules();
        keys.iter()
            .map(|key| {
                let pos = modules
                    .iter()
                    .position(|module| module.key() == key)
                    .ok_or_else(|| eyre::eyre!("unknown module \"{key}\""))?;
                Ok(modules.remove(pos))
            })
            .collect()
    }

    /// Resolves a suite name: [`ALL_MODULES`], a suite of `permtest.toml`, or a module key.
    pub fn suite(&self, name: &str, cfg: &Config) -> eyre::Result<Suite> {
        if name == ALL_MODULES {
            return Ok(self.all_modules());
        }
        if let Some(suite) = cfg.suite(name) {
            return Ok(Suite::new(&suite.name)
                .with_label(suite.label.clone().unwrap_or_else(|| suite.name.clone()))
                .with_details(suite.details.clone())
                .with_modules(self.pick(&suite.modules)?));
        }
        let module = self
            .module(name)
            .ok_or_else(|| eyre::eyre!("no suite or module named \"{name}\""))?;
        Ok(Suite::single(module))
    }

    /// `(name, details)` of every suite [`Catalog::suite`] resolves.
    pub fn suites(&self, cfg: &Config) -> Vec<(String, String)> {
        let all = self.all_modules();
        std::iter::once((ALL_MODULES.to_string(), all.info().details.clone()))
            .chain(
                cfg.suites
                    .iter()
                    .map(|suite| (suite.name.clone(), suite.details.clone())),
            )
            .chain(
                all.modules()
                    .iter()
                    .map(|module| (module.key().to_string(), module.title().to_string())),
            )
            .collect()
    }
}
