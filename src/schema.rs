//! Manifest schema: the declared state of one host
//!
//! A manifest is TOML (or JSON when the file ends in `.json`):
//!
//! ```toml
//! [settings]
//! verify = true
//!
//! [[group]]
//! name = "dba"
//! attributes = { id = 300 }
//!
//! [[user]]
//! name = "alice"
//! attributes = { home = "/home/alice", pgrp = "dba" }
//! options = { password = "{ssha256}...", change_passwd_on_login = true }
//!
//! [[tunable]]
//! name = "vmo"
//! attributes = { ame_mpsize_support = 1 }
//! options = { change_type = "both" }
//! ```

use anyhow::{Context, Result, bail};
use reconcile::{AttributeSet, BenignRule, BenignTable, Intent, ObjectKind, ReconcileOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

// ============================================================================
// Main Manifest Schema
// ============================================================================

/// Declared state of one host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub settings: Settings,

    /// Extra benign-failure rules, added to the built-in AIX table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub benign: Vec<BenignRule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<Entry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user: Vec<Entry>,

    /// Group member/administrator lists
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub membership: Vec<Entry>,

    /// Security file stanzas
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stanza: Vec<Entry>,

    /// Logical volumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume: Vec<Entry>,

    /// /etc/filesystems entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filesystem: Vec<Entry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mount: Vec<Entry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device: Vec<Entry>,

    /// Kernel tunables, one entry per component
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tunable: Vec<Entry>,

    /// /etc/inittab records
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inittab: Vec<Entry>,
}

/// Run-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Re-read each object after changing it
    #[serde(default = "default_true")]
    pub verify: bool,

    /// Never execute corrective commands
    #[serde(default)]
    pub dry_run: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            verify: true,
            dry_run: false,
        }
    }
}

/// One declared object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Entry {
    /// Identifier within the kind
    pub name: String,

    #[serde(default)]
    pub state: Intent,

    /// Attributes compared against the system and changed when they differ
    #[serde(default, skip_serializing_if = "AttributeSet::is_empty")]
    pub attributes: AttributeSet,

    /// Kind-specific switches that shape the commands but are not compared
    #[serde(default, skip_serializing_if = "AttributeSet::is_empty")]
    pub options: AttributeSet,
}

impl Entry {
    pub fn new(name: &str, state: Intent) -> Self {
        Self {
            name: name.to_string(),
            state,
            ..Default::default()
        }
    }

    pub fn attribute(mut self, name: &str, value: impl Into<reconcile::AttrValue>) -> Self {
        self.attributes.insert(name, value);
        self
    }

    pub fn option(mut self, name: &str, value: impl Into<reconcile::AttrValue>) -> Self {
        self.options.insert(name, value);
        self
    }
}

impl Manifest {
    /// Load a manifest; the format follows the file extension
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read manifest: {}", path.display()))?;
        log::debug!("Loaded manifest from {}", path.display());

        let manifest: Self = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?
        };

        manifest.validate()?;
        Ok(manifest)
    }

    /// Check names are present and unique within each kind
    pub fn validate(&self) -> Result<()> {
        for (kind, entries) in self.sections() {
            let mut seen = HashSet::new();
            for entry in entries {
                if entry.name.trim().is_empty() {
                    bail!("A {kind} entry has an empty name");
                }
                if !seen.insert(entry.name.as_str()) {
                    bail!("Duplicate {kind} entry '{}'", entry.name);
                }
            }
        }
        Ok(())
    }

    /// Entries of each kind, in apply order
    ///
    /// Groups come before the users that reference them; volumes, then the
    /// filesystems on them, before the mounts that use them.
    pub fn sections(&self) -> [(ObjectKind, &[Entry]); 10] {
        [
            (ObjectKind::Group, self.group.as_slice()),
            (ObjectKind::User, self.user.as_slice()),
            (ObjectKind::Membership, self.membership.as_slice()),
            (ObjectKind::Stanza, self.stanza.as_slice()),
            (ObjectKind::Volume, self.volume.as_slice()),
            (ObjectKind::Filesystem, self.filesystem.as_slice()),
            (ObjectKind::Mount, self.mount.as_slice()),
            (ObjectKind::Device, self.device.as_slice()),
            (ObjectKind::Tunable, self.tunable.as_slice()),
            (ObjectKind::Inittab, self.inittab.as_slice()),
        ]
    }

    /// Entries matching a target filter, in apply order
    pub fn select(&self, filter: &TargetFilter) -> Vec<(ObjectKind, &Entry)> {
        self.sections()
            .into_iter()
            .filter(|(kind, _)| filter.kind.is_none_or(|k| k == *kind))
            .flat_map(|(kind, entries)| entries.iter().map(move |e| (kind, e)))
            .filter(|(_, entry)| filter.name.as_deref().is_none_or(|n| n == entry.name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sections().iter().map(|(_, e)| e.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Built-in AIX rules plus the manifest's own
    pub fn benign_table(&self) -> BenignTable {
        let mut table = BenignTable::aix();
        table.extend(self.benign.iter().cloned());
        table
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            verify: self.settings.verify,
            dry_run: self.settings.dry_run,
        }
    }
}

// ============================================================================
// Target Filter
// ============================================================================

/// `kind`, `kind.name` or a bare name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetFilter {
    pub kind: Option<ObjectKind>,
    pub name: Option<String>,
}

impl TargetFilter {
    pub fn parse(target: Option<&str>) -> Self {
        let Some(target) = target.filter(|t| !t.is_empty()) else {
            return Self::default();
        };

        if let Some((kind, name)) = target.split_once('.')
            && let Ok(kind) = kind.parse::<ObjectKind>()
        {
            return Self {
                kind: Some(kind),
                name: Some(name.to_string()),
            };
        }

        match target.parse::<ObjectKind>() {
            Ok(kind) => Self {
                kind: Some(kind),
                name: None,
            },
            Err(_) => Self {
                kind: None,
                name: Some(target.to_string()),
            },
        }
    }
}
