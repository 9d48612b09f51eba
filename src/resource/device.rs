//! Devices: `lsdev` / `lsattr` / `chdev` / `cfgmgr` / `rmdev`
//!
//! Devices are never created here; they appear through configuration.
//! The `status` attribute (`available` or `defined`) moves a device between
//! configured states, every other attribute goes through `chdev`.

use super::{Options, not_found, query_failed};
use crate::schema::Entry;
use reconcile::{
    Action, AttributeSet, CommandLine, CommandResult, CommandSynthesizer, Comparison, Error,
    Intent, Layout, Mode, ObjectKind, ObservedState, Result, Synthesis, Target, Vocabulary,
    orchestrator, parse_object, synth::unsupported_mode,
};

const OPTIONS: &[&str] = &["parent", "force", "recursive", "chtype", "rmtype"];

/// `lsdev`/`lsattr` for an unknown logical name
const NOT_FOUND: &[&str] = &["0514-519"];

const STATUS: &str = "status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeType {
    Both,
    Current,
    Reboot,
    Reset,
}

impl ChangeType {
    fn flag(self) -> Option<&'static str> {
        match self {
            Self::Both => Some("-U"),
            Self::Current => Some("-T"),
            Self::Reboot => Some("-P"),
            Self::Reset => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Device {
    name: String,
    intent: Intent,
    attributes: AttributeSet,
    parent: Option<String>,
    force: bool,
    recursive: bool,
    chtype: ChangeType,
    /// `rmdev -S`: stop instead of unconfigure when moving to defined
    stop: bool,
}

impl Device {
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        let opts = Options::new(ObjectKind::Device, &entry.options, OPTIONS)?;
        let chtype = match opts
            .choice("chtype", &["both", "current", "reboot", "reset"], "both")?
            .as_str()
        {
            "current" => ChangeType::Current,
            "reboot" => ChangeType::Reboot,
            "reset" => ChangeType::Reset,
            _ => ChangeType::Both,
        };
        let stop = opts.choice("rmtype", &["unconfigure", "stop"], "unconfigure")? == "stop";

        let mut attributes = entry.attributes.clone();
        if let Some(status) = attributes.remove(STATUS) {
            attributes.insert(STATUS, status.to_string().to_ascii_lowercase());
        }

        Ok(Self {
            name: entry.name.clone(),
            intent: entry.state,
            attributes,
            parent: opts.string("parent"),
            force: opts.flag("force", false)?,
            recursive: opts.flag("recursive", false)?,
            chtype,
            stop,
        })
    }

    /// Whether anything besides `status` is managed
    fn has_settings(&self) -> bool {
        self.attributes.names().any(|n| n != STATUS)
    }

    fn chdev(&self, identifier: &str, settings: &AttributeSet) -> CommandLine {
        let mut command = CommandLine::new("chdev").args(["-l", identifier]);
        if let Some(parent) = &self.parent {
            command = command.args(["-p", parent.as_str()]);
        }
        for (name, value) in settings {
            command = command
                .arg("-a")
                .arg(format!("{name}={}", value.render(Vocabulary::YesNo)));
        }
        command = command.arg_if(self.force, "-g");
        match self.chtype.flag() {
            Some(flag) => command.arg(flag),
            None => command,
        }
    }
}

pub fn listing() -> (CommandLine, Layout) {
    (
        CommandLine::new("lsdev").args(["-F", "name:status:description"]),
        Layout::positional(':', &["name", "status", "description"]),
    )
}

/// `lsattr` query for a device's settings
pub fn settings(name: &str) -> (CommandLine, Layout) {
    (
        CommandLine::new("lsattr").args(["-E", "-l", name, "-F", "attribute:value"]),
        Layout::Pairs { separator: ':' },
    )
}

impl CommandSynthesizer for Device {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Device
    }

    fn validate(&self, attributes: &AttributeSet) -> Result<()> {
        match attributes.get(STATUS).map(ToString::to_string) {
            Some(status) if status != "available" && status != "defined" => Err(Error::invalid(
                ObjectKind::Device,
                STATUS,
                status,
                "expected available or defined",
            )),
            _ => Ok(()),
        }
    }

    fn synthesize(&self, identifier: &str, mode: Mode, attributes: &AttributeSet) -> Result<Synthesis> {
        match mode {
            Mode::Modify => {
                let mut settings = attributes.clone();
                let status = settings.remove(STATUS).map(|s| s.to_string());

                let mut commands = Vec::new();
                if status.as_deref() == Some("available") {
                    commands.push(CommandLine::new("cfgmgr").args(["-l", identifier]));
                }
                if !settings.is_empty() {
                    commands.push(self.chdev(identifier, &settings));
                }
                if status.as_deref() == Some("defined") {
                    commands.push(
                        CommandLine::new("rmdev")
                            .args(["-l", identifier])
                            .arg_if(self.stop, "-S"),
                    );
                }
                Ok(Synthesis::from_commands(commands))
            }
            Mode::Delete => Ok(Synthesis::one(
                CommandLine::new("rmdev")
                    .args(["-d", "-l", identifier])
                    .arg_if(self.recursive, "-R")
                    .arg_if(self.force, "-g"),
            )),
            other => Err(unsupported_mode(ObjectKind::Device, other)),
        }
    }
}

impl Target for Device {
    fn identifier(&self) -> &str {
        &self.name
    }

    fn intent(&self) -> Intent {
        self.intent
    }

    fn desired(&self) -> &AttributeSet {
        &self.attributes
    }

    fn vocabulary(&self) -> Vocabulary {
        Vocabulary::YesNo
    }

    fn query(&self) -> Result<CommandLine> {
        Ok(CommandLine::new("lsdev").args(["-l", self.name.as_str(), "-F", STATUS]))
    }

    fn observe(&self, result: &CommandResult) -> Result<ObservedState> {
        if not_found(result, NOT_FOUND) {
            return Ok(ObservedState::Absent);
        }
        if !result.success() {
            return Err(query_failed(&self.query()?, result));
        }
        let Some(status) = result.stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return Ok(ObservedState::Absent);
        };
        let facts = [(STATUS.to_string(), status.to_ascii_lowercase())].into_iter().collect();
        Ok(ObservedState::Present(facts))
    }

    fn follow_up(&self) -> Vec<CommandLine> {
        if !self.has_settings() {
            return Vec::new();
        }
        vec![settings(&self.name).0]
    }

    fn enrich(&self, observed: ObservedState, results: &[CommandResult]) -> Result<ObservedState> {
        let mut facts = match observed {
            ObservedState::Present(facts) => facts,
            ObservedState::Absent => return Ok(ObservedState::Absent),
        };
        let (command, layout) = settings(&self.name);
        for result in results {
            if !result.success() {
                return Err(query_failed(&command, result));
            }
            if let Some(settings) = parse_object(&result.stdout, &layout, &self.name)?.facts() {
                facts.extend(settings.clone());
            }
        }
        Ok(ObservedState::Present(facts))
    }

    fn plan(&self, _observed: &ObservedState, comparison: &Comparison) -> Result<Action> {
        if !comparison.object_exists && self.intent != Intent::Absent {
            return Ok(Action::Refuse {
                message: format!("device '{}' does not exist", self.name),
            });
        }
        Ok(orchestrator::plan(
            ObjectKind::Device,
            self.intent,
            comparison,
            &self.attributes,
        ))
    }

    fn verifies(&self, mode: Mode) -> bool {
        // -T changes the running device only; lsattr -E reports the database
        mode == Mode::Modify && self.chtype != ChangeType::Current
    }
}
