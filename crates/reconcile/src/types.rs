//! Core types for declarative state reconciliation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Category of system object under management
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    User,
    Group,
    /// Member or administrator list of a group
    Membership,
    Device,
    Mount,
    /// Logical volume
    Volume,
    /// /etc/filesystems entry, local or NFS
    Filesystem,
    /// Kernel tunable component (vmo, ioo, ...)
    Tunable,
    /// Stanza of a security file such as /etc/security/user
    Stanza,
    /// /etc/inittab record
    Inittab,
}

impl ObjectKind {
    pub const ALL: [Self; 10] = [
        Self::User,
        Self::Group,
        Self::Membership,
        Self::Device,
        Self::Mount,
        Self::Volume,
        Self::Filesystem,
        Self::Tunable,
        Self::Stanza,
        Self::Inittab,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Membership => "membership",
            Self::Device => "device",
            Self::Mount => "mount",
            Self::Volume => "volume",
            Self::Filesystem => "filesystem",
            Self::Tunable => "tunable",
            Self::Stanza => "stanza",
            Self::Inittab => "inittab",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown object kind: {s}"))
    }
}

/// A named system entity whose attributes are reconciled
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagedObject {
    pub kind: ObjectKind,
    /// Unique within `kind` (user name, mount point, device name, ...)
    pub identifier: String,
}

impl ManagedObject {
    pub fn new(kind: ObjectKind, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
        }
    }
}

impl fmt::Display for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.identifier)
    }
}

/// How a wrapped command spells booleans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vocabulary {
    #[default]
    TrueFalse,
    YesNo,
}

impl Vocabulary {
    /// Render a boolean in this vocabulary
    pub fn render(&self, value: bool) -> &'static str {
        match (self, value) {
            (Self::TrueFalse, true) => "true",
            (Self::TrueFalse, false) => "false",
            (Self::YesNo, true) => "yes",
            (Self::YesNo, false) => "no",
        }
    }

    /// Recognise a boolean token in either vocabulary, ignoring case
    pub fn parse(token: &str) -> Option<bool> {
        match token.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        }
    }
}

/// A desired attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<String>),
}

impl AttrValue {
    /// Canonical command-line rendering of the value
    pub fn render(&self, vocabulary: Vocabulary) -> String {
        match self {
            Self::Bool(b) => vocabulary.render(*b).to_string(),
            Self::Int(i) => i.to_string(),
            Self::Str(s) => s.clone(),
            Self::List(items) => items.join(","),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Str(s) => Vocabulary::parse(s),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Str(s) => s.is_empty(),
            Self::List(items) => items.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(Vocabulary::TrueFalse))
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for AttrValue {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

/// Desired attributes of one object, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet(BTreeMap<String, AttrValue>);

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<AttrValue> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl FromIterator<(String, AttrValue)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (String, AttrValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a AttributeSet {
    type Item = (&'a String, &'a AttrValue);
    type IntoIter = std::collections::btree_map::Iter<'a, String, AttrValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Observed attributes of one object, as parsed from command output
pub type Facts = BTreeMap<String, String>;

/// Parsed list output: identifier -> facts
pub type Listing = BTreeMap<String, Facts>;

/// What the system currently reports for an object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservedState {
    /// The object does not exist
    Absent,
    /// The object exists; facts may be empty
    Present(Facts),
}

impl ObservedState {
    pub fn exists(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        match self {
            Self::Present(facts) => facts.get(name).map(String::as_str),
            Self::Absent => None,
        }
    }

    pub fn facts(&self) -> Option<&Facts> {
        match self {
            Self::Present(facts) => Some(facts),
            Self::Absent => None,
        }
    }
}

/// One attribute that needs to change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub desired: AttrValue,
    /// None when the object or the attribute is not observed
    pub observed: Option<String>,
}

/// The minimal set of attribute changes between observed and desired state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diff(BTreeMap<String, DiffEntry>);

impl Diff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: DiffEntry) {
        self.0.insert(name.into(), entry);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, name: &str) -> Option<&DiffEntry> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DiffEntry)> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// The desired values of the differing attributes
    pub fn attributes(&self) -> AttributeSet {
        self.0
            .iter()
            .map(|(name, entry)| (name.clone(), entry.desired.clone()))
            .collect()
    }
}

/// Result of one command invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// A successful result with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::new(0, stdout, "")
    }

    /// A failed result with the given exit code and stderr
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self::new(exit_code, "", stderr)
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A program invocation as an argument vector, never interpreted by a shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    /// Bytes fed to the program's standard input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `arg` only when `cond` holds
    pub fn arg_if(self, cond: bool, arg: impl Into<String>) -> Self {
        if cond { self.arg(arg) } else { self }
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Program followed by arguments
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Human-readable rendering for messages and logs
    pub fn display(&self) -> String {
        self.argv()
            .into_iter()
            .map(|a| {
                if a.is_empty() || a.contains(char::is_whitespace) {
                    format!("'{a}'")
                } else {
                    a.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Operation a synthesized command performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Create,
    Modify,
    Delete,
    Query,
    List,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
            Self::Query => "query",
            Self::List => "list",
        })
    }
}

/// The caller's state selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Object must exist with the desired attributes
    #[default]
    Present,
    /// Object must not exist
    Absent,
    /// Object must already exist; only its attributes are changed
    Modify,
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "modify" => Ok(Self::Modify),
            other => Err(format!("unknown state: {other}")),
        }
    }
}

/// Step of the reconciliation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Start,
    Reading,
    Diffing,
    NoopComplete,
    Acting,
    Verifying,
    Success,
    Failed,
}

/// Options for a reconciliation run
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Re-read state after acting and confirm the diff closed
    pub verify: bool,
    /// Report the commands that would run without executing them
    pub dry_run: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            verify: true,
            dry_run: false,
        }
    }
}

/// Terminal value of one reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationOutcome {
    pub object: ManagedObject,
    pub changed: bool,
    pub failed: bool,
    pub message: String,
    /// Result of the last command that ran (the failing one on failure)
    pub detail: Option<CommandResult>,
    /// The diff that drove the action
    pub diff: Diff,
    /// Corrective commands, in execution order
    pub commands: Vec<String>,
    pub phases: Vec<Phase>,
}

impl ReconciliationOutcome {
    /// Final phase reached
    pub fn phase(&self) -> Phase {
        self.phases.last().copied().unwrap_or(Phase::Start)
    }

    /// Whether the state machine passed through `phase`
    pub fn visited(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }
}

/// Summary of a batch of reconciliations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Summary {
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.changed + self.unchanged + self.failed
    }

    /// Check if every reconciliation succeeded
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn add(&mut self, outcome: &ReconciliationOutcome) {
        if outcome.failed {
            self.failed += 1;
        } else if outcome.changed {
            self.changed += 1;
        } else {
            self.unchanged += 1;
        }
    }
}
