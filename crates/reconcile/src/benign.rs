//! Benign command failures
//!
//! Some AIX commands exit non-zero when the object is already in the state
//! asked for: removing a member that is not listed, unmounting something
//! that is not mounted. Those outputs are listed here, in one table, and
//! turned into a successful "nothing changed" outcome by the orchestrator.

use crate::types::{CommandResult, Mode, ObjectKind};
use serde::{Deserialize, Serialize};

/// What a benign failure says about the object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenignOutcome {
    AlreadyPresent,
    AlreadyAbsent,
}

impl BenignOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::AlreadyPresent => "already present",
            Self::AlreadyAbsent => "already absent",
        }
    }
}

/// One known failure: output containing `pattern` from a `kind` command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenignRule {
    pub kind: ObjectKind,
    /// Substring matched case-insensitively against stderr, then stdout
    pub pattern: String,
    pub outcome: BenignOutcome,
    /// Restrict the rule to commands synthesized for this mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
}

impl BenignRule {
    pub fn new(kind: ObjectKind, pattern: &str, outcome: BenignOutcome) -> Self {
        Self {
            kind,
            pattern: pattern.to_string(),
            outcome,
            mode: None,
        }
    }

    pub fn for_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    fn matches(&self, kind: ObjectKind, mode: Mode, result: &CommandResult) -> bool {
        if self.kind != kind || self.mode.is_some_and(|m| m != mode) {
            return false;
        }
        let pattern = self.pattern.to_lowercase();
        [&result.stderr, &result.stdout]
            .iter()
            .any(|text| text.to_lowercase().contains(&pattern))
    }
}

/// Table of benign failures, consulted for every non-zero exit
#[derive(Debug, Clone, Default)]
pub struct BenignTable {
    rules: Vec<BenignRule>,
}

impl BenignTable {
    /// A table with no entries
    pub fn empty() -> Self {
        Self::default()
    }

    /// The AIX message numbers known to mean "already in the desired state"
    pub fn aix() -> Self {
        Self {
            rules: vec![
                // 3004-641: user is not a member of the group
                BenignRule::new(ObjectKind::Membership, "3004-641", BenignOutcome::AlreadyAbsent),
                // 0506-347: cannot find anything to unmount
                BenignRule::new(ObjectKind::Mount, "0506-347", BenignOutcome::AlreadyAbsent)
                    .for_mode(Mode::Delete),
                // 3004-689: user or group already exists
                BenignRule::new(ObjectKind::User, "3004-689", BenignOutcome::AlreadyPresent)
                    .for_mode(Mode::Create),
                BenignRule::new(ObjectKind::Group, "3004-689", BenignOutcome::AlreadyPresent)
                    .for_mode(Mode::Create),
                // 0516-306: logical volume not found
                BenignRule::new(ObjectKind::Volume, "0516-306", BenignOutcome::AlreadyAbsent)
                    .for_mode(Mode::Delete),
            ],
        }
    }

    pub fn add(&mut self, rule: BenignRule) {
        self.rules.push(rule);
    }

    pub fn extend(&mut self, rules: impl IntoIterator<Item = BenignRule>) {
        self.rules.extend(rules);
    }

    pub fn rules(&self) -> &[BenignRule] {
        &self.rules
    }

    /// Classify a failed result; `None` means the failure is fatal
    pub fn classify(&self, kind: ObjectKind, mode: Mode, result: &CommandResult) -> Option<BenignOutcome> {
        if result.success() {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| rule.matches(kind, mode, result))
            .map(|rule| rule.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_a_member_is_already_absent() {
        let table = BenignTable::aix();
        let result = CommandResult::failed(
            1,
            "3004-641 User \"bob\" is not a member of group \"staff\".\n",
        );
        assert_eq!(
            table.classify(ObjectKind::Membership, Mode::Modify, &result),
            Some(BenignOutcome::AlreadyAbsent)
        );
    }

    #[test]
    fn test_rules_are_scoped_to_kind() {
        let table = BenignTable::aix();
        let result = CommandResult::failed(1, "3004-641 whatever");
        assert_eq!(table.classify(ObjectKind::User, Mode::Modify, &result), None);
    }

    #[test]
    fn test_rules_are_scoped_to_mode() {
        let table = BenignTable::aix();
        let result = CommandResult::failed(1, "umount: 0506-347 Cannot find anything to unmount.");
        assert_eq!(
            table.classify(ObjectKind::Mount, Mode::Delete, &result),
            Some(BenignOutcome::AlreadyAbsent)
        );
        assert_eq!(table.classify(ObjectKind::Mount, Mode::Create, &result), None);
    }

    #[test]
    fn test_stdout_is_consulted_after_stderr() {
        let table = BenignTable::aix();
        let result = CommandResult::new(1, "0516-306 lslv: Unable to find datalv", "");
        assert_eq!(
            table.classify(ObjectKind::Volume, Mode::Delete, &result),
            Some(BenignOutcome::AlreadyAbsent)
        );
    }

    #[test]
    fn test_success_is_never_classified() {
        let table = BenignTable::aix();
        let result = CommandResult::ok("3004-641");
        assert_eq!(table.classify(ObjectKind::Membership, Mode::Modify, &result), None);
    }

    #[test]
    fn test_runtime_rules_extend_table() {
        let mut table = BenignTable::empty();
        let result = CommandResult::failed(1, "0514-062 Cannot perform the requested function");
        assert_eq!(table.classify(ObjectKind::Device, Mode::Delete, &result), None);

        table.add(BenignRule::new(ObjectKind::Device, "0514-062", BenignOutcome::AlreadyAbsent));
        assert_eq!(
            table.classify(ObjectKind::Device, Mode::Delete, &result),
            Some(BenignOutcome::AlreadyAbsent)
        );
    }
}
