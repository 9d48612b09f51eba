//! Security file stanzas: `lssec` / `chsec`

use super::{Options, not_found, query_failed};
use crate::schema::Entry;
use reconcile::{
    Action, AttrValue, AttributeSet, CommandLine, CommandResult, CommandSynthesizer, Comparison,
    Error, Intent, Layout, Mode, ObjectKind, ObservedState, Result, Synthesis, Target, Vocabulary,
    orchestrator, parse_object, synth::unsupported_mode,
};

const DEFAULT_FILE: &str = "/etc/security/user";

const OPTIONS: &[&str] = &["file"];

/// `lssec`: stanza not found in the file
const NOT_FOUND: &[&str] = &["3004-725"];

#[derive(Debug, Clone)]
pub struct Stanza {
    name: String,
    intent: Intent,
    file: String,
    attributes: AttributeSet,
}

impl Stanza {
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        let opts = Options::new(ObjectKind::Stanza, &entry.options, OPTIONS)?;

        // Absent un-sets the listed attributes; the stanza itself stays
        let attributes = if entry.state == Intent::Absent {
            entry
                .attributes
                .names()
                .map(|name| (name.to_string(), AttrValue::from("")))
                .collect()
        } else {
            entry.attributes.clone()
        };

        Ok(Self {
            name: entry.name.clone(),
            intent: entry.state,
            file: opts.string("file").unwrap_or_else(|| DEFAULT_FILE.to_string()),
            attributes,
        })
    }
}

impl CommandSynthesizer for Stanza {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Stanza
    }

    fn validate(&self, _attributes: &AttributeSet) -> Result<()> {
        if self.attributes.is_empty() {
            return Err(Error::missing(ObjectKind::Stanza, "attributes"));
        }
        Ok(())
    }

    fn synthesize(&self, identifier: &str, mode: Mode, attributes: &AttributeSet) -> Result<Synthesis> {
        if !matches!(mode, Mode::Create | Mode::Modify) {
            return Err(unsupported_mode(ObjectKind::Stanza, mode));
        }
        let commands = attributes
            .iter()
            .map(|(name, value)| {
                CommandLine::new("chsec")
                    .args(["-f", self.file.as_str(), "-s", identifier, "-a"])
                    .arg(format!("{name}={}", value.render(Vocabulary::TrueFalse)))
            })
            .collect();
        Ok(Synthesis::from_commands(commands))
    }
}

impl Target for Stanza {
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
        Ok(CommandLine::new("lssec")
            .args(["-c", "-f", self.file.as_str(), "-s", self.name.as_str(), "-a"])
            .args(self.attributes.names()))
    }

    fn observe(&self, result: &CommandResult) -> Result<ObservedState> {
        if not_found(result, NOT_FOUND) {
            return Ok(ObservedState::Absent);
        }
        if !result.success() {
            return Err(query_failed(&self.query()?, result));
        }
        parse_object(&result.stdout, &Layout::colon_header(), &self.name)
    }

    fn plan(&self, _observed: &ObservedState, comparison: &Comparison) -> Result<Action> {
        let intent = match self.intent {
            Intent::Absent => Intent::Modify,
            other => other,
        };
        Ok(orchestrator::plan(
            ObjectKind::Stanza,
            intent,
            comparison,
            &self.attributes,
        ))
    }
}
