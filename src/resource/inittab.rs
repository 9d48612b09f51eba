//! /etc/inittab records: `lsitab` / `mkitab` / `chitab` / `rmitab`
//!
//! The object is the record identifier. `mkitab` and `chitab` take the
//! whole `identifier:runlevel:action:command` record, so fields the entry
//! leaves out are carried over from the current record.

use super::{Options, query_failed};
use crate::schema::Entry;
use reconcile::{
    Action, AttributeSet, CommandLine, CommandResult, CommandSynthesizer, Comparison, Error,
    Intent, Layout, Mode, ObjectKind, ObservedState, Result, Synthesis, Target, orchestrator,
    parse_object,
    synth::{check_supported, unsupported_mode},
};

/// Record fields after the identifier, in file order
const FIELDS: &[&str] = &["runlevel", "action", "command"];

const OPTIONS: &[&str] = &["insert_after"];

/// Actions init(8) understands
const ACTIONS: &[&str] = &[
    "boot",
    "bootwait",
    "hold",
    "initdefault",
    "off",
    "once",
    "ondemand",
    "powerfail",
    "powerwait",
    "respawn",
    "sysinit",
    "wait",
];

#[derive(Debug, Clone)]
pub struct Inittab {
    identifier: String,
    intent: Intent,
    attributes: AttributeSet,
    /// `mkitab -i`: place the new record after this one
    insert_after: Option<String>,
}

impl Inittab {
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        let opts = Options::new(ObjectKind::Inittab, &entry.options, OPTIONS)?;
        Ok(Self {
            identifier: entry.name.clone(),
            intent: entry.state,
            attributes: entry.attributes.clone(),
            insert_after: opts.string("insert_after"),
        })
    }
}

/// The record as `mkitab`/`chitab` take it
fn record(identifier: &str, attributes: &AttributeSet) -> String {
    let mut fields = vec![identifier.to_string()];
    fields.extend(
        FIELDS
            .iter()
            .map(|name| attributes.get(name).map(ToString::to_string).unwrap_or_default()),
    );
    fields.join(":")
}

pub fn listing(name: Option<&str>) -> (CommandLine, Layout) {
    let command = match name {
        Some(name) => CommandLine::new("lsitab").arg(name),
        None => CommandLine::new("lsitab").arg("-a"),
    };
    let mut columns = vec!["identifier"];
    columns.extend_from_slice(FIELDS);
    (command, Layout::positional(':', &columns))
}

impl CommandSynthesizer for Inittab {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Inittab
    }

    fn validate(&self, attributes: &AttributeSet) -> Result<()> {
        check_supported(ObjectKind::Inittab, attributes, FIELDS)?;
        if let Some(action) = attributes.get("action").map(ToString::to_string)
            && !ACTIONS.contains(&action.as_str())
        {
            return Err(Error::invalid(
                ObjectKind::Inittab,
                "action",
                action,
                format!("expected one of {}", ACTIONS.join(", ")),
            ));
        }
        Ok(())
    }

    fn synthesize(&self, identifier: &str, mode: Mode, attributes: &AttributeSet) -> Result<Synthesis> {
        let command = match mode {
            Mode::Create => {
                let mut command = CommandLine::new("mkitab");
                if let Some(after) = &self.insert_after {
                    command = command.args(["-i", after.as_str()]);
                }
                command.arg(record(identifier, attributes))
            }
            Mode::Modify => CommandLine::new("chitab").arg(record(identifier, attributes)),
            Mode::Delete => CommandLine::new("rmitab").arg(identifier),
            other => return Err(unsupported_mode(ObjectKind::Inittab, other)),
        };
        Ok(Synthesis::one(command))
    }
}

impl Target for Inittab {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn intent(&self) -> Intent {
        self.intent
    }

    fn desired(&self) -> &AttributeSet {
        &self.attributes
    }

    fn query(&self) -> Result<CommandLine> {
        Ok(listing(Some(&self.identifier)).0)
    }

    fn observe(&self, result: &CommandResult) -> Result<ObservedState> {
        // lsitab exits non-zero without a word for an unknown identifier
        if !result.success() && result.stdout.trim().is_empty() && result.stderr.trim().is_empty() {
            return Ok(ObservedState::Absent);
        }
        if !result.success() {
            return Err(query_failed(&self.query()?, result));
        }
        let (_, layout) = listing(None);
        let row = match parse_object(&result.stdout, &layout, &self.identifier)? {
            ObservedState::Present(row) => row,
            ObservedState::Absent => return Ok(ObservedState::Absent),
        };
        Ok(ObservedState::Present(
            row.into_iter().filter(|(name, _)| name != "identifier").collect(),
        ))
    }

    fn plan(&self, observed: &ObservedState, comparison: &Comparison) -> Result<Action> {
        let action = orchestrator::plan(
            ObjectKind::Inittab,
            self.intent,
            comparison,
            &self.attributes,
        );
        match action {
            Action::Act {
                mode: Mode::Create,
                attributes,
            } => {
                if let Some(name) = FIELDS.iter().find(|name| !attributes.contains(name)) {
                    return Err(Error::missing(ObjectKind::Inittab, *name));
                }
                Ok(Action::Act {
                    mode: Mode::Create,
                    attributes,
                })
            }
            Action::Act {
                mode: Mode::Modify,
                mut attributes,
            } => {
                for name in FIELDS {
                    if !attributes.contains(name)
                        && let Some(value) = observed.get(name)
                    {
                        attributes.insert(*name, value);
                    }
                }
                Ok(Action::Act {
                    mode: Mode::Modify,
                    attributes,
                })
            }
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{Phase, Reconciler, ScriptedExecutor};

    const UPRINTFD: &str = "uprintfd:23456789:respawn:/usr/sbin/uprintfd\n";

    fn inittab(entry: &Entry) -> Inittab {
        Inittab::from_entry(entry).unwrap()
    }

    fn uprintfd(state: Intent) -> Entry {
        Entry::new("uprintfd", state)
            .attribute("runlevel", "23456789")
            .attribute("action", "respawn")
            .attribute("command", "/usr/sbin/uprintfd")
    }

    #[test]
    fn test_missing_record_is_added_after_anchor() {
        let exec = ScriptedExecutor::new()
            .on("lsitab", [CommandResult::failed(1, ""), CommandResult::ok(UPRINTFD)])
            .on("mkitab", [CommandResult::ok("")]);
        let entry = uprintfd(Intent::Present).option("insert_after", "perfstat");

        let outcome = Reconciler::new(&exec).reconcile(&inittab(&entry));

        assert!(outcome.changed);
        assert!(!outcome.failed, "{}", outcome.message);
        assert_eq!(
            outcome.commands,
            vec!["mkitab -i perfstat uprintfd:23456789:respawn:/usr/sbin/uprintfd"]
        );
        assert_eq!(outcome.phase(), Phase::Success);
    }

    #[test]
    fn test_matching_record_is_noop() {
        let exec = ScriptedExecutor::new().on("lsitab", [CommandResult::ok(UPRINTFD)]);

        let outcome = Reconciler::new(&exec).reconcile(&inittab(&uprintfd(Intent::Present)));

        assert!(!outcome.changed);
        assert_eq!(outcome.phase(), Phase::NoopComplete);
        assert_eq!(exec.calls(), vec!["lsitab uprintfd"]);
    }

    #[test]
    fn test_change_keeps_unnamed_fields() {
        let exec = ScriptedExecutor::new()
            .on(
                "lsitab",
                [
                    CommandResult::ok(UPRINTFD),
                    CommandResult::ok("uprintfd:2:respawn:/usr/sbin/uprintfd\n"),
                ],
            )
            .on("chitab", [CommandResult::ok("")]);
        let entry = Entry::new("uprintfd", Intent::Modify).attribute("runlevel", "2");

        let outcome = Reconciler::new(&exec).reconcile(&inittab(&entry));

        assert!(outcome.changed);
        assert!(!outcome.failed, "{}", outcome.message);
        assert_eq!(outcome.commands, vec!["chitab uprintfd:2:respawn:/usr/sbin/uprintfd"]);
    }

    #[test]
    fn test_command_may_contain_colons() {
        let target = inittab(&Entry::new("rcnfs", Intent::Present));
        let result = CommandResult::ok("rcnfs:23456789:wait:/etc/rc.nfs > /dev/console 2>&1 # a:b\n");

        let state = target.observe(&result).unwrap();

        assert_eq!(
            state.get("command"),
            Some("/etc/rc.nfs > /dev/console 2>&1 # a:b")
        );
    }

    #[test]
    fn test_create_without_command_is_missing_parameter() {
        let exec = ScriptedExecutor::new().on("lsitab", [CommandResult::failed(1, "")]);
        let entry = Entry::new("uprintfd", Intent::Present)
            .attribute("runlevel", "2")
            .attribute("action", "once");

        let outcome = Reconciler::new(&exec).reconcile(&inittab(&entry));

        assert!(outcome.failed);
        assert!(outcome.message.contains("missing required parameter 'command'"));
        assert!(exec.calls_to("mkitab").is_empty());
    }

    #[test]
    fn test_unknown_action_is_invalid() {
        let target = inittab(&Entry::new("uprintfd", Intent::Present).attribute("action", "forever"));
        assert!(matches!(
            target.validate(target.desired()),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_removal() {
        let exec = ScriptedExecutor::new()
            .on("lsitab", [CommandResult::ok(UPRINTFD)])
            .on("rmitab", [CommandResult::ok("")]);

        let outcome = Reconciler::new(&exec).reconcile(&inittab(&Entry::new("uprintfd", Intent::Absent)));

        assert!(outcome.changed);
        assert_eq!(outcome.commands, vec!["rmitab uprintfd"]);

        let exec = ScriptedExecutor::new().on("lsitab", [CommandResult::failed(1, "")]);
        let outcome = Reconciler::new(&exec).reconcile(&inittab(&Entry::new("uprintfd", Intent::Absent)));
        assert!(!outcome.changed);
        assert_eq!(outcome.message, "inittab already absent");
    }
}
