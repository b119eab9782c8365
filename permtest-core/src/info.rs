//! Aggregates the sequencer maintains while a suite runs.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::verdict::Verdict;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum LogKind {
    Error,
    Bypassed,
}

/// Anomaly recorded in a module log. Successes are counted but never logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub kind: LogKind,
    pub name: String,
    pub description: String,
}

impl LogEntry {
    /// Log entry for a verdict, if the verdict is an anomaly.
    pub fn from_verdict(verdict: &Verdict) -> Option<LogEntry> {
        let kind = if verdict.bypassed {
            LogKind::Bypassed
        } else if verdict.is_error() {
            LogKind::Error
        } else {
            return None;
        };
        Some(LogEntry {
            kind,
            name: verdict.permission().to_string(),
            description: verdict.message.clone(),
        })
    }
}

/// Counts a module's prepare phase reports before any test thread starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrepareInfo {
    pub count_tests: usize,
    pub count_errors: usize,
    pub count_bypassed: usize,
    pub count_passed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleInfo {
    pub title: String,
    /// Preference key of the owning module.
    pub module: String,
    pub count_tests: usize,
    pub count_errors: usize,
    pub count_bypassed: usize,
    pub count_additional_tests: usize,
    /// Tests that were still running when the sequencer stopped waiting for them.
    pub count_detached: usize,
    pub skipped: bool,
    pub log: Vec<LogEntry>,
}

impl ModuleInfo {
    pub fn new(title: impl Into<String>, module: impl Into<String>) -> ModuleInfo {
        ModuleInfo {
            title: title.into(),
            module: module.into(),
            ..Default::default()
        }
    }

    /// Clears the outcome of a previous run, keeping identity and additional test count.
    pub(crate) fn reset(&mut self) {
        self.count_tests = 0;
        self.count_errors = 0;
        self.count_bypassed = 0;
        self.count_detached = 0;
        self.skipped = false;
        self.log.clear();
    }

    /// Counts a delivered verdict and logs it when it is an anomaly.
    pub(crate) fn record(&mut self, verdict: &Verdict) {
        if verdict.bypassed {
            self.count_bypassed += 1;
        } else if verdict.is_error() {
            self.count_errors += 1;
        }
        if let Some(entry) = LogEntry::from_verdict(verdict) {
            self.log.push(entry);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SuiteInfo {
    pub title: String,
    pub details: String,
    pub count_modules: usize,
    pub count_errors: usize,
    pub count_bypassed: usize,
    /// Verdicts expected from every module started or skipped so far.
    pub count_tests: usize,
    /// Verdicts observed, plus the full test count of skipped modules.
    pub count_completed: usize,
    pub start_time: Option<DateTime<Utc>>,
    pub elapsed_time: Duration,
}

impl SuiteInfo {
    pub(crate) fn record(&mut self, verdict: &Verdict) {
        if verdict.bypassed {
            self.count_bypassed += 1;
        } else if verdict.is_error() {
            self.count_errors += 1;
        }
        self.count_completed += 1;
    }
}

impl std::fmt::Display for SuiteInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "title={} details={} count_modules={} count_errors={} count_bypassed={} elapsed_time={:?}",
            self.title,
            self.details,
            self.count_modules,
            self.count_errors,
            self.count_bypassed,
            self.elapsed_time
        )
    }
}

impl std::fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "title={} count_tests={} count_errors={} count_bypassed={}",
            self.title, self.count_tests, self.count_errors, self.count_bypassed
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::descriptor::TestDescriptor;
    use pretty_assertions::assert_eq;

    #[test]
    fn record_logs_only_anomalies() {
        let mut info = ModuleInfo::new("Core", "core_test_module");
        info.record(&Verdict::new(TestDescriptor::adhoc("A"), true));
        info.record(&Verdict::new(TestDescriptor::adhoc("B"), false).with_message("denied"));
        info.record(&Verdict::bypass(TestDescriptor::adhoc("C"), "sdk"));

        assert_eq!(info.count_errors, 1);
        assert_eq!(info.count_bypassed, 1);
        assert_eq!(
            info.log,
            vec![
                LogEntry {
                    kind: LogKind::Error,
                    name: "android.permission.B".into(),
                    description: "denied".into(),
                },
                LogEntry {
                    kind: LogKind::Bypassed,
                    name: "android.permission.C".into(),
                    description: "sdk".into(),
                },
            ]
        );
    }

    #[test]
    fn reset_keeps_identity() {
        let mut info = ModuleInfo::new("Core", "core_test_module");
        info.count_additional_tests = 3;
        info.record(&Verdict::new(TestDescriptor::adhoc("B"), false));
        info.skipped = true;
        info.reset();

        assert_eq!(info.title, "Core");
        assert_eq!(info.count_additional_tests, 3);
        assert_eq!(info.count_errors, 0);
        assert!(info.log.is_empty());
        assert!(!info.skipped);
    }

    #[test]
    fn log_kind_display() {
        assert_eq!(LogKind::Bypassed.to_string(), "bypassed");
        assert_eq!("error".parse::<LogKind>().ok(), Some(LogKind::Error));
    }
}
