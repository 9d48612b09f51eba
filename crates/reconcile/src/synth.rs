//! Command synthesis
//!
//! A [`CommandSynthesizer`] maps (identifier, mode, attributes) to the
//! ordered argument vectors that bring an object into that state. Every
//! object kind implements one; the orchestrator never builds commands
//! itself.

use crate::error::{Error, Result};
use crate::types::{AttributeSet, CommandLine, Mode, ObjectKind, Vocabulary};

/// What a synthesizer decided to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Synthesis {
    /// Nothing to change
    Noop,
    /// Commands to run in order; never empty
    Run(Vec<CommandLine>),
}

impl Synthesis {
    /// Wrap a single command
    pub fn one(command: CommandLine) -> Self {
        Self::Run(vec![command])
    }

    /// `Noop` when `commands` is empty
    pub fn from_commands(commands: Vec<CommandLine>) -> Self {
        if commands.is_empty() {
            Self::Noop
        } else {
            Self::Run(commands)
        }
    }

    pub fn commands(&self) -> &[CommandLine] {
        match self {
            Self::Noop => &[],
            Self::Run(commands) => commands,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop)
    }
}

/// Builds the commands that create, modify or delete one kind of object
pub trait CommandSynthesizer {
    fn kind(&self) -> ObjectKind;

    /// Reject parameter combinations before anything runs
    fn validate(&self, _attributes: &AttributeSet) -> Result<()> {
        Ok(())
    }

    /// Commands for `mode`
    ///
    /// Pure: no I/O, and the same inputs always give the same output.
    fn synthesize(&self, identifier: &str, mode: Mode, attributes: &AttributeSet)
    -> Result<Synthesis>;
}

/// Validate and synthesize, short-circuiting a modify with nothing to change
pub fn synthesize(
    synthesizer: &dyn CommandSynthesizer,
    identifier: &str,
    mode: Mode,
    attributes: &AttributeSet,
) -> Result<Synthesis> {
    synthesizer.validate(attributes)?;
    if mode == Mode::Modify && attributes.is_empty() {
        return Ok(Synthesis::Noop);
    }
    let synthesis = synthesizer.synthesize(identifier, mode, attributes)?;
    log::trace!(
        "{} '{}' {mode}: {} command(s)",
        synthesizer.kind(),
        identifier,
        synthesis.commands().len()
    );
    Ok(synthesis)
}

/// `name=value` assignment arguments in attribute-name order
pub fn assignments(attributes: &AttributeSet, vocabulary: Vocabulary) -> Vec<String> {
    attributes
        .iter()
        .map(|(name, value)| format!("{name}={}", value.render(vocabulary)))
        .collect()
}

/// Fail on the first attribute not in `supported`
pub fn check_supported(
    kind: ObjectKind,
    attributes: &AttributeSet,
    supported: &[&str],
) -> Result<()> {
    match attributes.names().find(|name| !supported.contains(name)) {
        Some(name) => Err(Error::unsupported(kind, name)),
        None => Ok(()),
    }
}

/// Error for a mode the kind has no command for
pub fn unsupported_mode(kind: ObjectKind, mode: Mode) -> Error {
    Error::UnsupportedMode { kind, mode }
}
