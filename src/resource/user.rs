//! User accounts: `lsuser` / `mkuser` / `chuser` / `rmuser`

use super::{Options, not_found, query_failed};
use crate::schema::Entry;
use reconcile::{
    AttributeSet, CommandLine, CommandResult, CommandSynthesizer, Error, Intent, Layout, Mode,
    ObjectKind, ObservedState, Result, Synthesis, Target, Vocabulary, parse_object,
    synth::{assignments, unsupported_mode},
};
use regex::Regex;
use std::sync::LazyLock;

static USER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").expect("valid user name regex"));

static ATTRIBUTE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid attribute name regex"));

const OPTIONS: &[&str] = &[
    "password",
    "change_passwd_on_login",
    "remove_password",
    "load_module",
];

/// Messages `lsuser` prints for an unknown user
const NOT_FOUND: &[&str] = &["3004-687", "does not exist"];

#[derive(Debug, Clone)]
pub struct User {
    name: String,
    intent: Intent,
    attributes: AttributeSet,
    load_module: Option<String>,
    /// Crypted password applied at creation
    password: Option<String>,
    change_passwd_on_login: bool,
    remove_password: bool,
}

impl User {
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        let opts = Options::new(ObjectKind::User, &entry.options, OPTIONS)?;
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
            password: opts.string("password"),
            change_passwd_on_login: opts.flag("change_passwd_on_login", false)?,
            remove_password: opts.flag("remove_password", true)?,
        })
    }

    fn registry(&self, command: CommandLine) -> CommandLine {
        match &self.load_module {
            Some(module) => command.args(["-R", module.as_str()]),
            None => command,
        }
    }

    fn set_password(&self, identifier: &str) -> Option<CommandLine> {
        let password = self.password.as_ref()?;
        Some(
            self.registry(CommandLine::new("chpasswd"))
                .arg("-e")
                .arg_if(!self.change_passwd_on_login, "-c")
                .stdin(format!("{identifier}:{password}\n")),
        )
    }
}

impl CommandSynthesizer for User {
    fn kind(&self) -> ObjectKind {
        ObjectKind::User
    }

    fn validate(&self, attributes: &AttributeSet) -> Result<()> {
        if !USER_NAME.is_match(&self.name) {
            return Err(Error::invalid(
                ObjectKind::User,
                "name",
                &self.name,
                "not a valid user name",
            ));
        }
        if let Some(name) = attributes.names().find(|n| !ATTRIBUTE_NAME.is_match(n)) {
            return Err(Error::unsupported(ObjectKind::User, name));
        }
        if attributes.contains("password") {
            return Err(Error::invalid(
                ObjectKind::User,
                "password",
                "<hidden>",
                "set the crypted password under options",
            ));
        }
        Ok(())
    }

    fn synthesize(&self, identifier: &str, mode: Mode, attributes: &AttributeSet) -> Result<Synthesis> {
        match mode {
            Mode::Create => {
                let create = self
                    .registry(CommandLine::new("mkuser"))
                    .args(assignments(attributes, Vocabulary::TrueFalse))
                    .arg(identifier);
                let mut commands = vec![create];
                commands.extend(self.set_password(identifier));
                Ok(Synthesis::Run(commands))
            }
            Mode::Modify => Ok(Synthesis::one(
                self.registry(CommandLine::new("chuser"))
                    .args(assignments(attributes, Vocabulary::TrueFalse))
                    .arg(identifier),
            )),
            Mode::Delete => Ok(Synthesis::one(
                self.registry(CommandLine::new("rmuser"))
                    .arg_if(self.remove_password, "-p")
                    .arg(identifier),
            )),
            other => Err(unsupported_mode(ObjectKind::User, other)),
        }
    }
}

impl Target for User {
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
            .registry(CommandLine::new("lsuser"))
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
