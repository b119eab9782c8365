use console::{style, Term};
use eyre::WrapErr;
use indexmap::IndexMap;
use tabled::{settings::Style, Table, Tabled};
use tokio::sync::broadcast;
use tracing::*;

use crate::{
    descriptor::TestDescriptor,
    info::{ModuleInfo, SuiteInfo},
    runner::Message,
    verdict::Verdict,
    ModuleName,
};

/// Reporter trait. The trait is based on the "template method" pattern.
/// You can implement on_xxx methods to hook into the suite run. This way is enough for most usecases.
/// If you need more control, you can override the "run" method.
///
/// `rx` has to be subscribed before the suite starts, otherwise early events are missed.
#[async_trait::async_trait]
pub trait Reporter {
    async fn run(&mut self, mut rx: broadcast::Receiver<Message>) -> eyre::Result<()> {
        loop {
            match rx.recv().await {
                Ok(Message::SuiteStart(info)) => self.on_suite_start(info).await?,
                Ok(Message::ModuleStart(info)) => self.on_module_start(info).await?,
                Ok(Message::Verdict(module, verdict)) => self.on_verdict(module, verdict).await?,
                Ok(Message::Detached(module, descriptor)) => {
                    self.on_detached(module, descriptor).await?
                }
                Ok(Message::ModuleFinish(info)) => self.on_module_finish(info).await?,
                Ok(Message::SuiteFinish(info)) => {
                    self.on_suite_finish(info).await?;
                    break;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("runner channel has been closed");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("reporter lagged behind by {n} messages");
                    continue;
                }
            }
        }

        Ok(())
    }

    async fn on_suite_start(&mut self, _info: SuiteInfo) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when a module passed its prepare phase and is about to launch tests.
    async fn on_module_start(&mut self, _info: ModuleInfo) -> eyre::Result<()> {
        Ok(())
    }

    async fn on_verdict(&mut self, _module: ModuleName, _verdict: Box<Verdict>) -> eyre::Result<()> {
        Ok(())
    }

    /// Called when the runner stopped waiting for a test thread. Its verdict arrives later.
    async fn on_detached(
        &mut self,
        _module: ModuleName,
        _descriptor: Box<TestDescriptor>,
    ) -> eyre::Result<()> {
        Ok(())
    }

    /// Called once all tests of the module are launched, or when the module is skipped.
    async fn on_module_finish(&mut self, _info: ModuleInfo) -> eyre::Result<()> {
        Ok(())
    }

    async fn on_suite_finish(&mut self, _info: SuiteInfo) -> eyre::Result<()> {
        Ok(())
    }
}

/// Built-in reporters selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum ReporterType {
    Null,
    List,
    Table,
}

impl ReporterType {
    pub fn reporter(self) -> Box<dyn Reporter + Send> {
        match self {
            ReporterType::Null => Box::new(NullReporter),
            ReporterType::List => Box::new(ListReporter::new()),
            ReporterType::Table => Box::new(TableReporter::new()),
        }
    }
}

pub struct NullReporter;

#[async_trait::async_trait]
impl Reporter for NullReporter {}

/// Prints one line per verdict.
pub struct ListReporter {
    terminal: Term,
}

impl ListReporter {
    pub fn new() -> ListReporter {
        ListReporter {
            terminal: Term::stdout(),
        }
    }
}

impl Default for ListReporter {
    fn default() -> Self {
        ListReporter::new()
    }
}

#[async_trait::async_trait]
impl Reporter for ListReporter {
    async fn on_suite_start(&mut self, info: SuiteInfo) -> eyre::Result<()> {
        self.terminal
            .write_line(&format!("{} {}", style("Suite").bold(), info.title))?;
        if !info.details.is_empty() {
            write(&self.terminal, format!("  {}", info.details))?;
        }
        Ok(())
    }

    async fn on_verdict(&mut self, module: ModuleName, verdict: Box<Verdict>) -> eyre::Result<()> {
        let status = if verdict.bypassed {
            style("-").yellow()
        } else if verdict.success {
            style("✓").green()
        } else {
            style("✘").red()
        };
        self.terminal
            .write_line(&format!("{status} [{module}] {}", verdict.summary()))?;
        Ok(())
    }

    async fn on_detached(
        &mut self,
        module: ModuleName,
        descriptor: Box<TestDescriptor>,
    ) -> eyre::Result<()> {
        write(
            &self.terminal,
            format!("  [{module}] {} is still running", descriptor.method),
        )
    }

    async fn on_module_finish(&mut self, info: ModuleInfo) -> eyre::Result<()> {
        if info.skipped {
            write(
                &self.terminal,
                format!("  [{}] skipped {} tests", info.module, info.count_tests),
            )?;
        }
        Ok(())
    }

    async fn on_suite_finish(&mut self, info: SuiteInfo) -> eyre::Result<()> {
        let errors = if info.count_errors > 0 {
            style(info.count_errors).red()
        } else {
            style(info.count_errors).green()
        };
        self.terminal.write_line(&format!(
            "{} errors, {} bypassed, {}/{} completed in {:?}",
            errors, info.count_bypassed, info.count_completed, info.count_tests, info.elapsed_time
        ))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Tabled)]
struct ModuleRow {
    #[tabled(rename = "Module")]
    title: String,
    #[tabled(rename = "Tests")]
    tests: usize,
    #[tabled(rename = "Passed")]
    passed: usize,
    #[tabled(rename = "Errors")]
    errors: usize,
    #[tabled(rename = "Bypassed")]
    bypassed: usize,
    #[tabled(rename = "Skipped")]
    skipped: bool,
}

/// Prints a per module summary table when the suite finishes.
pub struct TableReporter {
    terminal: Term,
    rows: IndexMap<ModuleName, ModuleRow>,
}

impl TableReporter {
    pub fn new() -> TableReporter {
        TableReporter {
            terminal: Term::stdout(),
            rows: IndexMap::new(),
        }
    }

    fn row(&mut self, info: &ModuleInfo) -> &mut ModuleRow {
        let row = self.rows.entry(info.module.clone()).or_default();
        row.title.clone_from(&info.title);
        row.tests = info.count_tests;
        row
    }

    fn render(&self) -> String {
        Table::new(self.rows.values()).with(Style::modern()).to_string()
    }
}

impl Default for TableReporter {
    fn default() -> Self {
        TableReporter::new()
    }
}

#[async_trait::async_trait]
impl Reporter for TableReporter {
    async fn on_suite_start(&mut self, _info: SuiteInfo) -> eyre::Result<()> {
        self.rows.clear();
        Ok(())
    }

    async fn on_module_start(&mut self, info: ModuleInfo) -> eyre::Result<()> {
        // prepare phase verdicts were published before this event and are already counted
        let row = self.row(&info);
        row.errors = info.count_errors;
        row.bypassed = info.count_bypassed;
        Ok(())
    }

    async fn on_verdict(&mut self, module: ModuleName, verdict: Box<Verdict>) -> eyre::Result<()> {
        let row = self.rows.entry(module).or_default();
        if verdict.bypassed {
            row.bypassed += 1;
        } else if verdict.is_error() {
            row.errors += 1;
        } else {
            row.passed += 1;
        }
        Ok(())
    }

    async fn on_module_finish(&mut self, info: ModuleInfo) -> eyre::Result<()> {
        let row = self.row(&info);
        row.skipped |= info.skipped;
        if info.skipped {
            row.errors = info.count_errors;
        }
        Ok(())
    }

    async fn on_suite_finish(&mut self, info: SuiteInfo) -> eyre::Result<()> {
        self.terminal.write_line(&self.render())?;
        self.terminal.write_line(&format!(
            "{}: {} errors, {} bypassed in {:?}",
            info.title, info.count_errors, info.count_bypassed, info.elapsed_time
        ))?;
        Ok(())
    }
}

fn write(term: &Term, s: impl AsRef<str>) -> eyre::Result<()> {
    let colored = style(s.as_ref()).dim();
    term.write_line(&format!("{colored}"))
        .wrap_err("failed to write character on terminal")
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    fn verdict(permission: &str, success: bool, bypassed: bool) -> Box<Verdict> {
        Box::new(Verdict {
            bypassed,
            ..Verdict::new(TestDescriptor::new(permission, "test"), success)
        })
    }

    #[tokio::test]
    async fn table_rows() -> eyre::Result<()> {
        let (tx, rx) = broadcast::channel(16);
        let mut core = ModuleInfo::new("Core Test Cases", "core_test_module");
        core.count_tests = 3;
        let mut gms = ModuleInfo::new("GMS Test Cases", "gms_test_module");
        gms.count_tests = 2;
        gms.skipped = true;

        tx.send(Message::SuiteStart(SuiteInfo::default()))?;
        tx.send(Message::ModuleStart(core.clone()))?;
        tx.send(Message::Verdict("core_test_module".into(), verdict("CAMERA", true, false)))?;
        tx.send(Message::Verdict("core_test_module".into(), verdict("READ_CONTACTS", false, false)))?;
        tx.send(Message::Verdict("core_test_module".into(), verdict("FUTURE_API", true, true)))?;
        tx.send(Message::ModuleFinish(core))?;
        tx.send(Message::ModuleFinish(gms))?;
        tx.send(Message::SuiteFinish(SuiteInfo::default()))?;

        let mut reporter = TableReporter::new();
        reporter.run(rx).await?;

        assert_eq!(
            reporter.rows.values().cloned().collect::<Vec<_>>(),
            vec![
                ModuleRow {
                    title: "Core Test Cases".into(),
                    tests: 3,
                    passed: 1,
                    errors: 1,
                    bypassed: 1,
                    skipped: false,
                },
                ModuleRow {
                    title: "GMS Test Cases".into(),
                    tests: 2,
                    passed: 0,
                    errors: 0,
                    bypassed: 0,
                    skipped: true,
                },
            ]
        );
        assert!(reporter.render().contains("Core Test Cases"));
        Ok(())
    }

    #[test_case("list" => ReporterType::List; "list")]
    #[test_case("table" => ReporterType::Table; "table")]
    #[test_case("null" => ReporterType::Null; "null")]
    fn reporter_type_from_str(s: &str) -> ReporterType {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn run_stops_on_closed_channel() -> eyre::Result<()> {
        let (tx, rx) = broadcast::channel::<Message>(1);
        drop(tx);
        NullReporter.run(rx).await
    }
}
