//! CLI command implementation
//!
//! Wires the real collaborators together and runs one installation:
//! paths config → options → cleanup guard { resolve → check → commit }.

use std::io;

use crate::cluster::CommandClusterConnector;
use crate::config::{ConfigResolver, SystemPaths};
use crate::errors::ReplicaResult;
use crate::guard::{CleanupGuard, InterruptFlag};
use crate::installers::InstallerSet;
use crate::observability::{
    log_event, Event, FileStepJournal, Logger, NullStepJournal, StepJournal, StepRecorder,
};
use crate::orchestrator::Orchestrator;
use crate::preflight::{
    DigResolver, LocalHostInfo, PreflightValidator, Prompter, TcpPortChecker, Unattended,
};

use super::args::Cli;
use super::io::TerminalPrompter;

/// Journal on the install log, or nowhere when the log cannot be opened.
fn open_journal(paths: &SystemPaths) -> Box<dyn StepJournal> {
    match FileStepJournal::open(&paths.install_log) {
        Ok(journal) => Box::new(journal),
        Err(e) => {
            let path = paths.install_log.display().to_string();
            Logger::warn("JOURNAL_UNAVAILABLE", &[("error", &e.to_string()), ("path", &path)]);
            Box::new(NullStepJournal)
        }
    }
}

/// Install a replica as described by `cli`.
pub fn install(cli: &Cli) -> ReplicaResult<()> {
    log_event(Event::RunStart);

    let paths = match &cli.paths_config {
        Some(path) => SystemPaths::load(path)?,
        None => SystemPaths::default(),
    };
    let options = cli.to_options();
    ConfigResolver::check_options(&options)?;

    let interrupt = InterruptFlag::new();
    interrupt.install_handler()?;

    let installers = InstallerSet::from_paths(&paths)?;
    let cluster = CommandClusterConnector::locate(&paths.cluster_query)?;
    let host = LocalHostInfo::new(&paths);
    let resolver = DigResolver::new();
    let network = TcpPortChecker::default();
    let prompter: Box<dyn Prompter> = if options.interactive() {
        Box::new(TerminalPrompter)
    } else {
        Box::new(Unattended)
    };

    let journal = open_journal(&paths);
    let recorder = StepRecorder::new(journal.as_ref());
    let run_id = recorder.run_id().to_string();
    Logger::info("RUN_ID", &[("run_id", &run_id)]);

    let validator = PreflightValidator {
        paths: &paths,
        host: &host,
        cluster: &cluster,
        resolver: &resolver,
        network: &network,
        prompter: prompter.as_ref(),
        installers: &installers,
        interrupt: &interrupt,
    };

    let guard = CleanupGuard::from_paths(&paths).with_interrupt(interrupt.clone());
    guard.run(&mut io::stderr(), |work_dir| {
        let config = ConfigResolver::new(&paths).resolve(&options, work_dir)?;

        let mut orchestrator = Orchestrator::new(&installers, &recorder, interrupt.clone());
        let session = orchestrator.check(&validator, &config)?;
        orchestrator.commit(&session)
    })
}

/// Parse arguments, install, and map the outcome to an exit status.
pub fn run() -> i32 {
    let cli = Cli::parse_args();

    match install(&cli) {
        Ok(()) => 0,
        Err(e) if e.is_clean_exit() => e.exit_code(),
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}
