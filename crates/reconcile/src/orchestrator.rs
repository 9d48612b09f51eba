//! Reconciliation orchestrator
//!
//! Drives one object through
//! `Start → Reading → Diffing → (NoopComplete | Acting) → Verifying → (Success | Failed)`.
//!
//! The orchestrator owns no object knowledge. A [`Target`] supplies the query
//! command, the parse step and the synthesizer; the orchestrator reads,
//! compares, runs only what the diff calls for and re-reads to confirm.
//! Failures are values: every path ends in a [`ReconciliationOutcome`].

use crate::benign::{BenignOutcome, BenignTable};
use crate::compare::{Comparison, compare};
use crate::error::{Error, Result};
use crate::executor::CommandExecutor;
use crate::synth::{self, CommandSynthesizer, Synthesis};
use crate::types::{
    AttributeSet, CommandLine, CommandResult, Diff, Intent, ManagedObject, Mode, ObjectKind,
    ObservedState, Phase, ReconcileOptions, ReconciliationOutcome, Summary, Vocabulary,
};
use std::fmt;

/// What the diff calls for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Already converged
    Noop { message: String },
    /// Run the synthesizer for `mode` with `attributes`
    Act { mode: Mode, attributes: AttributeSet },
    /// The intent cannot be met; nothing is run
    Refuse { message: String },
}

/// An object under reconciliation: one per kind
pub trait Target: CommandSynthesizer + fmt::Debug {
    fn identifier(&self) -> &str;

    fn object(&self) -> ManagedObject {
        ManagedObject::new(self.kind(), self.identifier())
    }

    fn intent(&self) -> Intent;

    /// Attributes compared against the observed state
    fn desired(&self) -> &AttributeSet;

    fn vocabulary(&self) -> Vocabulary {
        Vocabulary::TrueFalse
    }

    /// Command that reports the object's current state
    fn query(&self) -> Result<CommandLine>;

    /// Parse the query result
    ///
    /// Adapters map their kind's "does not exist" exits to
    /// [`ObservedState::Absent`] and any other failure to an error.
    fn observe(&self, result: &CommandResult) -> Result<ObservedState>;

    /// Further queries run once the object is known to exist
    fn follow_up(&self) -> Vec<CommandLine> {
        Vec::new()
    }

    /// Fold follow-up results into the observation, in query order
    fn enrich(&self, observed: ObservedState, _results: &[CommandResult]) -> Result<ObservedState> {
        Ok(observed)
    }

    /// Decide what to do about a comparison
    fn plan(&self, _observed: &ObservedState, comparison: &Comparison) -> Result<Action> {
        Ok(plan(self.kind(), self.intent(), comparison, self.desired()))
    }

    /// Whether to re-read after acting in `mode`
    fn verifies(&self, mode: Mode) -> bool {
        mode != Mode::Delete
    }
}

/// Default intent handling shared by most kinds
pub fn plan(
    kind: ObjectKind,
    intent: Intent,
    comparison: &Comparison,
    desired: &AttributeSet,
) -> Action {
    match (intent, comparison.object_exists) {
        (Intent::Absent, false) => Action::Noop {
            message: format!("{kind} already absent"),
        },
        (Intent::Absent, true) => Action::Act {
            mode: Mode::Delete,
            attributes: desired.clone(),
        },
        (Intent::Modify, false) => Action::Refuse {
            message: format!("no {kind} found to modify"),
        },
        (Intent::Present, false) => Action::Act {
            mode: Mode::Create,
            attributes: desired.clone(),
        },
        (Intent::Present | Intent::Modify, true) if comparison.diff.is_empty() => Action::Noop {
            message: format!("{kind} already in desired state"),
        },
        (Intent::Present | Intent::Modify, true) => Action::Act {
            mode: Mode::Modify,
            attributes: comparison.diff.attributes(),
        },
    }
}

/// Read-and-diff report; nothing is executed beyond the query
#[derive(Debug, Clone)]
pub struct Preview {
    pub object: ManagedObject,
    pub exists: bool,
    pub diff: Diff,
    pub action: Action,
    /// Commands the action would run
    pub commands: Vec<CommandLine>,
}

impl Preview {
    pub fn has_changes(&self) -> bool {
        !self.commands.is_empty()
    }
}

/// Outcome under construction, passed along by value
#[derive(Debug)]
struct Trail {
    object: ManagedObject,
    phases: Vec<Phase>,
    diff: Diff,
    commands: Vec<String>,
    detail: Option<CommandResult>,
    changed: bool,
}

impl Trail {
    fn start(object: ManagedObject) -> Self {
        log::trace!("{object}: start");
        Self {
            object,
            phases: vec![Phase::Start],
            diff: Diff::new(),
            commands: Vec::new(),
            detail: None,
            changed: false,
        }
    }

    fn enter(mut self, phase: Phase) -> Self {
        log::trace!("{}: {phase:?}", self.object);
        self.phases.push(phase);
        self
    }

    fn finish(self, phase: Phase, changed: bool, message: String) -> ReconciliationOutcome {
        let failed = phase == Phase::Failed;
        let trail = self.enter(phase);
        ReconciliationOutcome {
            object: trail.object,
            changed,
            failed,
            message,
            detail: trail.detail,
            diff: trail.diff,
            commands: trail.commands,
            phases: trail.phases,
        }
    }

    fn succeed(self, changed: bool, message: String) -> ReconciliationOutcome {
        self.finish(Phase::Success, changed, message)
    }

    fn fail(self, message: String) -> ReconciliationOutcome {
        let changed = self.changed;
        self.finish(Phase::Failed, changed, message)
    }

    fn fail_with(mut self, error: &Error) -> ReconciliationOutcome {
        if let Some(result) = error.result() {
            self.detail = Some(result.clone());
        }
        self.fail(error.diagnostic())
    }
}

/// Drives targets to their desired state through a command executor
pub struct Reconciler<'a> {
    executor: &'a dyn CommandExecutor,
    benign: BenignTable,
    options: ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    /// Reconciler with the built-in AIX benign table and default options
    pub fn new(executor: &'a dyn CommandExecutor) -> Self {
        Self {
            executor,
            benign: BenignTable::aix(),
            options: ReconcileOptions::default(),
        }
    }

    pub fn with_benign(mut self, benign: BenignTable) -> Self {
        self.benign = benign;
        self
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Reconcile one target
    pub fn reconcile(&self, target: &dyn Target) -> ReconciliationOutcome {
        let object = target.object();
        let trail = Trail::start(object.clone());

        if let Err(e) = target.validate(target.desired()) {
            return trail.fail_with(&e);
        }

        let trail = trail.enter(Phase::Reading);
        let observed = match self.read(target) {
            Ok(observed) => observed,
            Err(e) => return trail.fail_with(&e),
        };

        let mut trail = trail.enter(Phase::Diffing);
        let comparison = compare(&observed, target.desired(), target.vocabulary());
        trail.diff = comparison.diff.clone();

        let (mode, attributes) = match target.plan(&observed, &comparison) {
            Ok(Action::Noop { message }) => {
                return trail.finish(Phase::NoopComplete, false, message);
            }
            Ok(Action::Refuse { message }) => return trail.fail(message),
            Ok(Action::Act { mode, attributes }) => (mode, attributes),
            Err(e) => return trail.fail_with(&e),
        };

        let commands = match synth::synthesize(target, target.identifier(), mode, &attributes) {
            Ok(Synthesis::Noop) => {
                return trail.finish(
                    Phase::NoopComplete,
                    false,
                    format!("{} already in desired state", object.kind),
                );
            }
            Ok(Synthesis::Run(commands)) => commands,
            Err(e) => return trail.fail_with(&e),
        };
        trail.commands = commands.iter().map(CommandLine::display).collect();

        if self.options.dry_run {
            log::info!("{object}: would {mode} ({} command(s))", commands.len());
            return trail.succeed(true, format!("would {mode} {object}"));
        }

        let mut trail = trail.enter(Phase::Acting);
        let mut benign = Vec::new();
        for command in &commands {
            let result = match self.executor.execute(command) {
                Ok(result) => result,
                Err(e) => return trail.fail_with(&e),
            };
            if result.success() {
                trail.changed = true;
                trail.detail = Some(result);
                continue;
            }
            match self.benign.classify(object.kind, mode, &result) {
                Some(outcome) => {
                    log::info!("{object}: {} ({})", outcome.message(), command.display());
                    trail.detail = Some(result);
                    benign.push(outcome);
                }
                None => {
                    let error = Error::CommandFailed {
                        command: command.display(),
                        result,
                    };
                    return trail.fail_with(&error);
                }
            }
        }

        if benign.len() == commands.len() {
            let message = benign
                .first()
                .map_or("already in desired state", BenignOutcome::message);
            return trail.succeed(false, format!("{} {message}", object.kind));
        }

        if self.options.verify && target.verifies(mode) {
            let trail = trail.enter(Phase::Verifying);
            return match self.verify(target) {
                Ok(remaining) if remaining.is_empty() => {
                    trail.succeed(true, success_message(&object, mode))
                }
                Ok(remaining) => {
                    let names: Vec<&str> = remaining.names().collect();
                    trail.fail(format!(
                        "{object} still differs after {mode}: {}",
                        names.join(", ")
                    ))
                }
                Err(e) => trail.fail_with(&e),
            };
        }

        trail.succeed(true, success_message(&object, mode))
    }

    /// Reconcile targets in order, stopping at nothing
    pub fn reconcile_all<'t>(
        &self,
        targets: impl IntoIterator<Item = &'t dyn Target>,
    ) -> (Vec<ReconciliationOutcome>, Summary) {
        let mut summary = Summary::default();
        let outcomes = targets
            .into_iter()
            .map(|target| {
                let outcome = self.reconcile(target);
                summary.add(&outcome);
                outcome
            })
            .collect();
        (outcomes, summary)
    }

    /// Read and diff without acting
    pub fn preview(&self, target: &dyn Target) -> Result<Preview> {
        target.validate(target.desired())?;
        let observed = self.read(target)?;
        let comparison = compare(&observed, target.desired(), target.vocabulary());
        let action = target.plan(&observed, &comparison)?;

        let commands = match &action {
            Action::Act { mode, attributes } => {
                synth::synthesize(target, target.identifier(), *mode, attributes)?
                    .commands()
                    .to_vec()
            }
            _ => Vec::new(),
        };

        Ok(Preview {
            object: target.object(),
            exists: comparison.object_exists,
            diff: comparison.diff,
            action,
            commands,
        })
    }

    fn read(&self, target: &dyn Target) -> Result<ObservedState> {
        let query = target.query()?;
        let result = self.executor.execute(&query)?;
        let observed = target.observe(&result)?;
        if !observed.exists() {
            return Ok(observed);
        }

        let follow_up = target.follow_up();
        if follow_up.is_empty() {
            return Ok(observed);
        }
        let results = follow_up
            .iter()
            .map(|command| self.executor.execute(command))
            .collect::<Result<Vec<_>>>()?;
        target.enrich(observed, &results)
    }

    /// Desired attributes that still differ after acting
    fn verify(&self, target: &dyn Target) -> Result<Diff> {
        let observed = self.read(target)?;
        if !observed.exists() {
            return Err(Error::parse(
                format!("{} not found after change", target.object()),
                "",
            ));
        }
        Ok(compare(&observed, target.desired(), target.vocabulary()).diff)
    }
}

fn success_message(object: &ManagedObject, mode: Mode) -> String {
    let verb = match mode {
        Mode::Create => "created",
        Mode::Modify => "modified",
        Mode::Delete => "removed",
        Mode::Query | Mode::List => "read",
    };
    format!("{object} {verb}")
}
