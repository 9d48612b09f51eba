//! Kernel tunables: `vmo`, `ioo`, `schedo`, `no`, `raso`, `nfso`, `asoo`
//!
//! The object is the tuning command; each attribute is one tunable. The
//! observed value comes from the column that `change_type` affects, so a
//! reboot-only change is compared against the next-boot value. `bosboot`
//! tunables only take effect at the next boot and are handled the same way.
//!
//! An absent entry resets its listed tunables to their defaults, or every
//! tunable of the component (`-D`) when none are listed.

use super::{Options, query_failed};
use crate::schema::Entry;
use reconcile::{
    Action, AttrValue, AttributeSet, CommandLine, CommandResult, CommandSynthesizer, Comparison,
    Error, Facts, Intent, Layout, Mode, ObjectKind, ObservedState, Result, Synthesis, Target,
    Vocabulary, orchestrator, parse_listing, synth::unsupported_mode, values_equal,
};

pub const COMPONENTS: &[&str] = &["vmo", "ioo", "schedo", "no", "raso", "nfso", "asoo"];

/// Columns of `<component> -F -x`
const COLUMNS: &[&str] = &[
    "name", "current", "default", "reboot", "min", "max", "unit", "type", "deps",
];

const OPTIONS: &[&str] = &["change_type", "bosboot", "restricted"];

/// Reported when current and next-boot values disagree
const NOT_APPLICABLE: &str = "n/a";

/// Section marker ahead of the restricted tunables in `-F -x` output
const RESTRICTED_MARKER: &str = "##Restricted";

/// `-F -x` lists every tunable, restricted ones included
pub fn listing(component: &str) -> (CommandLine, Layout) {
    (
        CommandLine::new(component).args(["-F", "-x"]),
        Layout::positional(',', COLUMNS),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeType {
    Current,
    Reboot,
    Both,
}

#[derive(Debug, Clone)]
pub struct Tunable {
    component: String,
    intent: Intent,
    tunables: AttributeSet,
    change_type: ChangeType,
    bosboot: bool,
    /// Confirm changes to restricted tunables
    restricted: bool,
}

impl Tunable {
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        let opts = Options::new(ObjectKind::Tunable, &entry.options, OPTIONS)?;
        let change_type = match opts
            .choice("change_type", &["current", "reboot", "both"], "current")?
            .as_str()
        {
            "reboot" => ChangeType::Reboot,
            "both" => ChangeType::Both,
            _ => ChangeType::Current,
        };

        Ok(Self {
            component: entry.name.clone(),
            intent: entry.state,
            tunables: entry.attributes.clone(),
            change_type,
            bosboot: opts.flag("bosboot", false)?,
            restricted: opts.flag("restricted", false)?,
        })
    }

    fn default_key(name: &str) -> String {
        format!("{name}@default")
    }

    /// Whether changes only reach the next-boot value (`-r`)
    fn reboot_only(&self) -> bool {
        self.bosboot || self.change_type == ChangeType::Reboot
    }

    /// Absent with no tunables listed: reset the whole component
    fn resets_all(&self) -> bool {
        self.intent == Intent::Absent && self.tunables.is_empty()
    }

    /// Value the configured change type acts on
    fn effective(&self, row: &Facts) -> String {
        let column = |name: &str| row.get(name).cloned().unwrap_or_default();
        if self.reboot_only() {
            return column("reboot");
        }
        match self.change_type {
            ChangeType::Current | ChangeType::Reboot => column("current"),
            ChangeType::Both => {
                let current = column("current");
                if current == column("reboot") {
                    current
                } else {
                    NOT_APPLICABLE.to_string()
                }
            }
        }
    }

    fn command(&self, component: &str) -> CommandLine {
        let answers = if self.restricted { "yes\nno\n" } else { "no\nno\n" };
        CommandLine::new(component)
            .arg_if(self.reboot_only(), "-r")
            .arg_if(self.change_type == ChangeType::Both, "-p")
            .stdin(answers)
    }

    /// Whether a component-wide reset can move this tunable
    fn resettable(&self, row: &Facts) -> bool {
        let default = row.get("default").map_or("", String::as_str);
        if default.is_empty() || default == NOT_APPLICABLE {
            return false;
        }
        match row.get("type").map(String::as_str) {
            // static
            Some("S") => false,
            // bosboot and reboot tunables only have a next-boot value to reset
            Some("B" | "R") => self.reboot_only(),
            _ => true,
        }
    }

    /// Observed tunables whose effective value differs from the default,
    /// mapped to that default
    fn off_default(observed: &ObservedState) -> AttributeSet {
        let Some(facts) = observed.facts() else {
            return AttributeSet::new();
        };
        facts
            .iter()
            .filter_map(|(name, value)| {
                let default = AttrValue::from(facts.get(&Self::default_key(name))?.as_str());
                (!values_equal(&default, Some(value), Vocabulary::TrueFalse))
                    .then(|| (name.clone(), default))
            })
            .collect()
    }
}

/// `-F -x` output without the restricted section
fn unrestricted(stdout: &str) -> &str {
    stdout
        .find(RESTRICTED_MARKER)
        .map_or(stdout, |at| &stdout[..at])
}

impl CommandSynthesizer for Tunable {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Tunable
    }

    fn validate(&self, _attributes: &AttributeSet) -> Result<()> {
        if !COMPONENTS.contains(&self.component.as_str()) {
            return Err(Error::invalid(
                ObjectKind::Tunable,
                "component",
                &self.component,
                format!("expected one of {}", COMPONENTS.join(", ")),
            ));
        }
        if self.bosboot && self.change_type == ChangeType::Both {
            return Err(Error::conflict(
                "bosboot cannot be combined with change_type both",
            ));
        }
        Ok(())
    }

    fn synthesize(&self, identifier: &str, mode: Mode, attributes: &AttributeSet) -> Result<Synthesis> {
        let mut command = self.command(identifier);
        match mode {
            Mode::Modify => {
                for (name, value) in attributes {
                    command = command
                        .arg("-o")
                        .arg(format!("{name}={}", value.render(Vocabulary::TrueFalse)));
                }
            }
            Mode::Delete if self.resets_all() => command = command.arg("-D"),
            Mode::Delete => {
                for name in attributes.names() {
                    command = command.args(["-d", name]);
                }
            }
            other => return Err(unsupported_mode(ObjectKind::Tunable, other)),
        }
        Ok(Synthesis::one(command))
    }
}

impl Target for Tunable {
    fn identifier(&self) -> &str {
        &self.component
    }

    fn intent(&self) -> Intent {
        self.intent
    }

    fn desired(&self) -> &AttributeSet {
        &self.tunables
    }

    fn query(&self) -> Result<CommandLine> {
        Ok(listing(&self.component).0)
    }

    fn observe(&self, result: &CommandResult) -> Result<ObservedState> {
        if !result.success() {
            return Err(query_failed(&self.query()?, result));
        }
        let (_, layout) = listing(&self.component);
        let stdout = if self.resets_all() && !self.restricted {
            unrestricted(&result.stdout)
        } else {
            &result.stdout
        };
        let rows = parse_listing(stdout, &layout)?;
        if rows.is_empty() {
            return Ok(ObservedState::Absent);
        }

        let mut facts = Facts::new();
        if self.resets_all() {
            for (name, row) in rows.iter().filter(|(_, row)| self.resettable(row)) {
                facts.insert(name.clone(), self.effective(row));
                facts.insert(
                    Self::default_key(name),
                    row.get("default").cloned().unwrap_or_default(),
                );
            }
            return Ok(ObservedState::Present(facts));
        }
        for name in self.tunables.names() {
            let row = rows
                .get(name)
                .ok_or_else(|| Error::unsupported(ObjectKind::Tunable, name))?;
            facts.insert(name.to_string(), self.effective(row));
            facts.insert(
                Self::default_key(name),
                row.get("default").cloned().unwrap_or_default(),
            );
        }
        Ok(ObservedState::Present(facts))
    }

    fn plan(&self, observed: &ObservedState, comparison: &Comparison) -> Result<Action> {
        if !comparison.object_exists {
            return Ok(Action::Refuse {
                message: format!("{} reported no tunables", self.component),
            });
        }
        if self.intent == Intent::Absent {
            let reset = Self::off_default(observed);
            if reset.is_empty() {
                return Ok(Action::Noop {
                    message: "tunables already at defaults".to_string(),
                });
            }
            return Ok(Action::Act {
                mode: Mode::Delete,
                attributes: reset,
            });
        }
        Ok(orchestrator::plan(
            ObjectKind::Tunable,
            self.intent,
            comparison,
            &self.tunables,
        ))
    }

    fn verifies(&self, mode: Mode) -> bool {
        mode == Mode::Modify
    }
}
