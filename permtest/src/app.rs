use clap::{value_parser, Arg, ArgAction, Command as ClapCommand};
use console::{style, Term};
use itertools::Itertools;
use permtest_core::{
    get_config, runner, Callbacks, Config, Environment, MemoryPreferenceStore, Options, Platform,
    Reporter, ReporterType, Suite, SuiteCoordinator,
};
use std::{
    collections::{HashMap, VecDeque},
    str::FromStr,
    sync::Arc,
};
use strum::IntoEnumIterator;
use tracing::*;

use crate::{Catalog, ALL_MODULES};

/// Build the CLI with clap's builder pattern
fn build_cli<'a>(third_party_reporters: impl Iterator<Item = &'a String>) -> ClapCommand {
    let mut reporter_choices: VecDeque<_> = third_party_reporters.map(|s| s.to_string()).collect();
    for reporter in ReporterType::iter().rev() {
        reporter_choices.push_front(reporter.to_string());
    }
    ClapCommand::new("permtest")
        .about("permtest CLI runs permission enforcement suites and lists modules, test cases and preferences")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .subcommand(
            ClapCommand::new("test")
                .about("Run a suite in CLI mode")
                .arg(Arg::new("suite")
                    .short('s')
                    .long("suite")
                    .help("Suite to run: \"all\", a suite from permtest.toml or a module key")
                    .default_value(ALL_MODULES))
                .arg(Arg::new("modules")
                    .short('m')
                    .long("modules")
                    .help("Run only these modules, in this order. --modules core_test_module,signature_test_module")
                    .value_delimiter(',')
                    .action(ArgAction::Append))
                .arg(Arg::new("inverse")
                    .long("inverse")
                    .help("Expect every permission to be denied (inverse test result)")
                    .action(ArgAction::SetTrue))
                .arg(Arg::new("capture-rust")
                    .long("capture-rust")
                    .help("Print permtest's internal logs and the logs of your modules. Filtered by RUST_LOG")
                    .action(ArgAction::SetTrue))
                .arg(Arg::new("reporters")
                    .long("reporters")
                    .help(format!("Specify the reporters to use in comma-separated string. Default is \"list\". [possible values: {}]", reporter_choices.into_iter().join(", ")))
                    .value_delimiter(',')
                    .action(ArgAction::Append))
                .arg(Arg::new("concurrency")
                    .short('c')
                    .long("concurrency")
                    .help("Specify the maximum number of test threads running at once. When unspecified, tests are not throttled")
                    .value_parser(value_parser!(usize)))
                .arg(Arg::new("color")
                    .long("color")
                    .help("Produce color output. Default is \"auto\" [env: CARGO_TERM_COLOR]")
                    .value_parser(["auto", "always", "never"]))
        )
        .subcommand(
            ClapCommand::new("ls")
                .about("List modules, their test cases and the available suites")
        )
        .subcommand(
            ClapCommand::new("prefs")
                .about("List the preferences declared by each module and their current values")
        )
}

/// permtest CLI.
#[derive(Default)]
pub struct App {
    third_party_reporters: HashMap<String, Box<dyn Reporter + 'static + Send>>,
    platform: Option<Arc<dyn Platform>>,
}

impl App {
    pub fn new() -> App {
        App {
            third_party_reporters: HashMap::new(),
            platform: None,
        }
    }

    /// Run against `platform` instead of the device profile of `permtest.toml`.
    pub fn set_platform(&mut self, platform: Arc<dyn Platform>) {
        self.platform = Some(platform);
    }

    /// Install a third-party reporter.
    pub fn install_reporter(
        &mut self,
        name: impl Into<String>,
        reporter: impl Reporter + 'static + Send,
    ) {
        self.third_party_reporters
            .insert(name.into(), Box::new(reporter));
    }

    /// Parse command-line args and run permtest CLI sub command.
    pub async fn run(mut self, catalog: Catalog) -> eyre::Result<()> {
        let matches = build_cli(self.third_party_reporters.keys()).get_matches();
        color_eyre::install()?;

        let cfg = get_config();
        let term = Term::stdout();

        match matches.subcommand() {
            Some(("test", test_matches)) => {
                let suite_name = test_matches
                    .get_one::<String>("suite")
                    .map(String::as_str)
                    .unwrap_or(ALL_MODULES);
                let modules = test_matches
                    .get_many::<String>("modules")
                    .map(|vals| vals.cloned().collect::<Vec<_>>())
                    .unwrap_or_default();
                let reporters_arg = test_matches
                    .get_many::<String>("reporters")
                    .map(|vals| vals.cloned().collect::<Vec<_>>())
                    .unwrap_or_else(|| vec![ReporterType::List.to_string()]);
                let concurrency = test_matches.get_one::<usize>("concurrency").cloned();
                let color_command = test_matches
                    .get_one::<String>("color")
                    .and_then(|s| Color::from_str(s).ok());

                if test_matches.get_flag("capture-rust") {
                    tracing_subscriber::fmt::init();
                }
                apply_color(color_command);

                let suite = if modules.is_empty() {
                    catalog.suite(suite_name, cfg)?
                } else {
                    catalog.select(&modules)?
                };

                let mut options = Options::from(cfg);
                options.inverse_test_result |= test_matches.get_flag("inverse");
                if concurrency.is_some() {
                    options.concurrency = concurrency;
                }

                let mut reporters = std::mem::take(&mut self.third_party_reporters);
                let mut selected = Vec::new();
                for name in reporters_arg {
                    let reporter = match reporters.remove(&name) {
                        Some(reporter) => reporter,
                        None => ReporterType::from_str(&name)
                            .map_err(|_| eyre::eyre!("Unknown reporter: {name}"))?
                            .reporter(),
                    };
                    selected.push(reporter);
                }

                let env = self.environment(cfg).with_options(options);
                run_suite(suite, env, selected).await
            }
            Some(("ls", _)) => {
                for module in catalog.modules() {
                    term.write_line(&format!(
                        "* {} ({}, priority {}{})",
                        module.key(),
                        module.title(),
                        module.declaration().priority,
                        if module.is_sync() { ", sync" } else { "" }
                    ))?;
                    for descriptor in module.descriptors() {
                        term.write_line(&format!(
                            "  - {} [{}]",
                            descriptor.permission, descriptor.method
                        ))?;
                    }
                }
                term.write_line("")?;
                term.write_line(&format!("{}", style("Suites").bold()))?;
                for (name, details) in catalog.suites(cfg) {
                    term.write_line(&format!("  {name}: {details}"))?;
                }

                Ok(())
            }
            Some(("prefs", _)) => {
                let env = self.environment(cfg);
                for module in catalog.modules() {
                    let enabled = env.preferences().get_bool(module.key(), true);
                    term.write_line(&format!(
                        "* {} = {enabled} ({})",
                        module.key(),
                        module.declaration().prflabel
                    ))?;
                    for preference in module.preferences() {
                        let (kind, pair) = preference.pair();
                        let value = env
                            .preferences()
                            .get_bool(&preference.key, preference.default);
                        term.write_line(&format!("  - {kind} {pair} = {value}"))?;
                    }
                }

                Ok(())
            }
            _ => unreachable!("Subcommand required is set to true"),
        }
    }

    fn environment(&self, cfg: &Config) -> Environment {
        match &self.platform {
            Some(platform) => Environment::new(
                platform.clone(),
                Arc::new(MemoryPreferenceStore::with_values(cfg.preferences.clone())),
            )
            .with_options(Options::from(cfg)),
            None => Environment::from_config(cfg),
        }
    }
}

async fn run_suite(
    suite: Suite,
    env: Environment,
    reporters: Vec<Box<dyn Reporter + 'static + Send>>,
) -> eyre::Result<()> {
    let env = Arc::new(env);

    // Subscribe before starting so that the suite start event is not missed.
    let handles = reporters
        .into_iter()
        .map(|mut reporter| {
            let rx = runner::subscribe()?;
            Ok(tokio::spawn(async move { reporter.run(rx).await }))
        })
        .collect::<eyre::Result<Vec<_>>>()?;

    let callbacks = Callbacks::new().module_finish(|info| {
        if info.skipped {
            debug!("module {} skipped", info.module);
        }
    });
    let report = SuiteCoordinator::global()
        .start(suite, env, callbacks)?
        .wait()
        .await?;

    for result in futures::future::join_all(handles).await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("reporter failed: {e:#}"),
            Err(e) => error!("reporter task panicked: {e}"),
        }
    }

    let info = report.info();
    if report.has_errors() {
        eyre::bail!(
            "{} of {} permission tests failed in suite \"{}\"",
            info.count_errors,
            info.count_tests,
            info.title
        );
    }
    Ok(())
}

fn apply_color(color_command: Option<Color>) {
    let color_env = std::env::var("CARGO_TERM_COLOR");
    let color = match (color_command, color_env) {
        (color @ Some(Color::Always), _) => color,
        (color @ Some(Color::Never), _) => color,
        (None, Ok(color)) => Color::from_str(&color).ok(),
        _ => None,
    };
    match color {
        Some(Color::Always) => {
            console::set_colors_enabled(true);
            console::set_colors_enabled_stderr(true);
        }
        Some(Color::Never) => {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }
        _ => {}
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Color {
    #[default]
    Auto,
    Always,
    Never,
}
