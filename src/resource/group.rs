//! Groups: `lsgroup` / `mkgroup` / `chgroup` / `rmgroup`

use super::{Options, not_found, query_failed};
use crate::schema::Entry;
use reconcile::{
    AttributeSet, CommandLine, CommandResult, CommandSynthesizer, Intent, Layout, Mode, ObjectKind,
    ObservedState, Result, Synthesis, Target, Vocabulary, parse_object,
    synth::{assignments, unsupported_mode},
};

const OPTIONS: &[&str] = &["load_module", "remove_keystore"];

const NOT_FOUND: &[&str] = &["3004-687", "does not exist"];

#[derive(Debug, Clone)]
pub struct Group {
    name: String,
    intent: Intent,
    attributes: AttributeSet,
    load_module: Option<String>,
    remove_keystore: bool,
}

impl Group {
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        let opts = Options::new(ObjectKind::Group, &entry.options, OPTIONS)?;
        let mut attributes = entry.attributes.clone();
        let load_module = attributes
            .remove("load_module")
            .map(|m| m.to_string())
            .or_else(|| opts.string("load_module"));

        Ok(Self {
            name: entry.name.clone(),
            intent: entry.state,
            attributes,
            load_module,
            remove_keystore: opts.flag("remove_keystore", true)?,
        })
    }

    fn registry(&self, command: CommandLine) -> CommandLine {
        match &self.load_module {
            Some(module) => command.args(["-R", module.as_str()]),
            None => command,
        }
    }
}

impl CommandSynthesizer for Group {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Group
    }

    fn synthesize(&self, identifier: &str, mode: Mode, attributes: &AttributeSet) -> Result<Synthesis> {
        let command = match mode {
            Mode::Create => {
                // mkgroup takes the administrative flag as -a, not as admin=true
                let mut attributes = attributes.clone();
                let admin = attributes
                    .remove("admin")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                self.registry(CommandLine::new("mkgroup"))
                    .arg_if(admin, "-a")
                    .args(assignments(&attributes, Vocabulary::TrueFalse))
                    .arg(identifier)
            }
            Mode::Modify => self
                .registry(CommandLine::new("chgroup"))
                .args(assignments(attributes, Vocabulary::TrueFalse))
                .arg(identifier),
            Mode::Delete => self
                .registry(CommandLine::new("rmgroup"))
                .arg_if(self.remove_keystore, "-p")
                .arg(identifier),
            other => return Err(unsupported_mode(ObjectKind::Group, other)),
        };
        Ok(Synthesis::one(command))
    }
}

impl Target for Group {
    fn identifier(&self) -> &str {
        &self.name
    }

    fn intent(&self) -> Intent {
        self.intent
    }

    fn desired(&self) -> &AttributeSet {
        &self.attributes
    }

    fn query(&self) -> Result<CommandLine> {
        Ok(self
            .registry(CommandLine::new("lsgroup"))
            .args(["-f", self.name.as_str()]))
    }

    fn observe(&self, result: &CommandResult) -> Result<ObservedState> {
        if not_found(result, NOT_FOUND) {
            return Ok(ObservedState::Absent);
        }
        if !result.success() {
            return Err(query_failed(&self.query()?, result));
        }
        parse_object(&result.stdout, &Layout::Stanza, &self.name)
    }
}
