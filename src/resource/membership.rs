//! Group member and administrator lists: `lsgroup -c` / `chgrpmem`
//!
//! The object is the group. Each desired attribute names a user and says
//! whether that user must (`true`) or must not (`false`) be listed.
//! Removing users from a group that does not exist changes nothing.

use super::{Options, not_found, query_failed};
use crate::schema::Entry;
use reconcile::{
    Action, AttributeSet, CommandLine, CommandResult, CommandSynthesizer, Comparison,
    Error, Facts, Intent, Layout, Mode, ObjectKind, ObservedState, Result, Synthesis, Target,
    parse_object, synth::unsupported_mode,
};

const OPTIONS: &[&str] = &["list_type", "users", "load_module"];

const NOT_FOUND: &[&str] = &["3004-687", "does not exist"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListType {
    Members,
    Admins,
}

impl ListType {
    fn flag(self) -> &'static str {
        match self {
            Self::Members => "-m",
            Self::Admins => "-a",
        }
    }

    /// Column of `lsgroup -c -a users adms`
    fn column(self) -> &'static str {
        match self {
            Self::Members => "users",
            Self::Admins => "adms",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Membership {
    group: String,
    intent: Intent,
    /// user -> must be listed
    users: AttributeSet,
    list_type: ListType,
    load_module: Option<String>,
}

impl Membership {
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        let opts = Options::new(ObjectKind::Membership, &entry.options, OPTIONS)?;
        let list_type = match opts.choice("list_type", &["members", "admins"], "members")?.as_str() {
            "admins" => ListType::Admins,
            _ => ListType::Members,
        };

        // `users = [...]` with a state is shorthand for one boolean per user
        let listed = entry.state != Intent::Absent;
        let mut users = entry.attributes.clone();
        for user in opts.list("users") {
            users.insert(user, listed);
        }

        Ok(Self {
            group: entry.name.clone(),
            intent: entry.state,
            users,
            list_type,
            load_module: opts.string("load_module"),
        })
    }

    fn registry(&self, command: CommandLine) -> CommandLine {
        match &self.load_module {
            Some(module) => command.args(["-R", module.as_str()]),
            None => command,
        }
    }

    fn change(&self, group: &str, op: &str, users: &[&str]) -> CommandLine {
        self.registry(CommandLine::new("chgrpmem"))
            .args([self.list_type.flag(), op])
            .arg(users.join(","))
            .arg(group)
    }
}

impl CommandSynthesizer for Membership {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Membership
    }

    fn validate(&self, attributes: &AttributeSet) -> Result<()> {
        for (user, value) in attributes {
            if value.as_bool().is_none() {
                return Err(Error::invalid(
                    ObjectKind::Membership,
                    user,
                    value.to_string(),
                    "expected true (listed) or false (not listed)",
                ));
            }
        }
        Ok(())
    }

    fn synthesize(&self, identifier: &str, mode: Mode, attributes: &AttributeSet) -> Result<Synthesis> {
        if mode != Mode::Modify {
            return Err(unsupported_mode(ObjectKind::Membership, mode));
        }

        let (add, remove): (Vec<&str>, Vec<&str>) = attributes
            .iter()
            .map(|(user, value)| (user.as_str(), value.as_bool().unwrap_or(false)))
            .fold((Vec::new(), Vec::new()), |(mut add, mut remove), (user, listed)| {
                if listed {
                    add.push(user);
                } else {
                    remove.push(user);
                }
                (add, remove)
            });

        let mut commands = Vec::new();
        if !add.is_empty() {
            commands.push(self.change(identifier, "+", &add));
        }
        if !remove.is_empty() {
            commands.push(self.change(identifier, "-", &remove));
        }
        Ok(Synthesis::from_commands(commands))
    }
}

impl Target for Membership {
    fn identifier(&self) -> &str {
        &self.group
    }

    fn intent(&self) -> Intent {
        self.intent
    }

    fn desired(&self) -> &AttributeSet {
        &self.users
    }

    fn query(&self) -> Result<CommandLine> {
        Ok(self
            .registry(CommandLine::new("lsgroup"))
            .args(["-c", "-a", "users", "adms", self.group.as_str()]))
    }

    fn observe(&self, result: &CommandResult) -> Result<ObservedState> {
        if not_found(result, NOT_FOUND) {
            return Ok(ObservedState::Absent);
        }
        if !result.success() {
            return Err(query_failed(&self.query()?, result));
        }

        let row = match parse_object(&result.stdout, &Layout::colon_header(), &self.group)? {
            ObservedState::Present(row) => row,
            ObservedState::Absent => return Ok(ObservedState::Absent),
        };
        let listed: Vec<&str> = row
            .get(self.list_type.column())
            .map(|users| users.split(',').map(str::trim).filter(|u| !u.is_empty()).collect())
            .unwrap_or_default();

        let facts: Facts = self
            .users
            .names()
            .map(|user| (user.to_string(), listed.contains(&user).to_string()))
            .collect();
        Ok(ObservedState::Present(facts))
    }

    fn plan(&self, _observed: &ObservedState, comparison: &Comparison) -> Result<Action> {
        if !comparison.object_exists && self.intent == Intent::Absent {
            return Ok(Action::Noop {
                message: format!("group '{}' does not exist; nothing to remove", self.group),
            });
        }
        if !comparison.object_exists {
            return Ok(Action::Refuse {
                message: format!("group '{}' does not exist", self.group),
            });
        }
        if comparison.diff.is_empty() {
            return Ok(Action::Noop {
                message: "membership already in desired state".to_string(),
            });
        }
        Ok(Action::Act {
            mode: Mode::Modify,
            attributes: comparison.diff.attributes(),
        })
    }
}
