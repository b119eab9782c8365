//! Ordered collections of modules run as one unit.

use crate::{
    info::{ModuleInfo, SuiteInfo},
    module::Module,
    preference::preference_key,
};

/// Details of a suite built around a single module.
pub const SINGLE_MODULE_DETAILS: &str = "read from module";

#[derive(Debug)]
pub struct Suite {
    key: String,
    label: String,
    pub(crate) info: SuiteInfo,
    pub(crate) modules: Vec<Module>,
}

impl Suite {
    pub fn new(title: impl Into<String>) -> Suite {
        let title = title.into();
        Suite {
            key: preference_key(&title.replace(' ', "")),
            label: title.clone(),
            info: SuiteInfo {
                title,
                ..Default::default()
            },
            modules: Vec::new(),
        }
    }

    /// Suite that runs exactly `module`.
    pub fn single(module: Module) -> Suite {
        Suite {
            key: module.key().to_string(),
            label: module.declaration().label.clone(),
            info: SuiteInfo {
                title: module.title().to_string(),
                details: SINGLE_MODULE_DETAILS.into(),
                ..Default::default()
            },
            modules: Vec::new(),
        }
        .with_module(module)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Suite {
        self.label = label.into();
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Suite {
        self.info.details = details.into();
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Suite {
        self.key = key.into();
        self
    }

    pub fn with_module(mut self, module: Module) -> Suite {
        self.modules.push(module);
        self.info.count_modules = self.modules.len();
        self
    }

    pub fn with_modules(self, modules: impl IntoIterator<Item = Module>) -> Suite {
        modules.into_iter().fold(self, Suite::with_module)
    }

    pub fn title(&self) -> &str {
        &self.info.title
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn info(&self) -> &SuiteInfo {
        &self.info
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Tests the suite is expected to report, declared and additional.
    pub fn test_count(&self) -> usize {
        self.modules.iter().map(Module::test_count).sum()
    }
}

/// Outcome of a finished suite run.
#[derive(Debug)]
pub struct SuiteReport {
    suite: Suite,
}

impl SuiteReport {
    pub(crate) fn new(suite: Suite) -> SuiteReport {
        SuiteReport { suite }
    }

    pub fn info(&self) -> &SuiteInfo {
        &self.suite.info
    }

    pub fn modules(&self) -> impl Iterator<Item = &ModuleInfo> {
        self.suite.modules.iter().map(Module::info)
    }

    /// Info of the module with preference key `key`.
    pub fn module(&self, key: &str) -> Option<&ModuleInfo> {
        self.modules().find(|info| info.module == key)
    }

    pub fn has_errors(&self) -> bool {
        self.suite.info.count_errors > 0
    }

    /// Gives the suite back so it can be run again.
    pub fn into_suite(self) -> Suite {
        self.suite
    }
}
