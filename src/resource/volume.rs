//! Logical volumes: `lslv` / `mklv` / `chlv` / `rmlv`

use super::{Options, not_found, query_failed};
use crate::schema::Entry;
use reconcile::{
    Action, AttrValue, AttributeSet, CommandLine, CommandResult, CommandSynthesizer, Comparison,
    Error, Facts, Intent, Layout, Mode, ObjectKind, ObservedState, Result, Synthesis, Target,
    orchestrator, parse_object,
    synth::{check_supported, unsupported_mode},
};
use regex::Regex;
use std::sync::LazyLock;

/// Every label `lslv` prints
///
/// A value ends where the next label starts, which can be a single space
/// after a long value such as the LV IDENTIFIER.
const LSLV_LABELS: &[&str] = &[
    "LOGICAL VOLUME",
    "VOLUME GROUP",
    "LV IDENTIFIER",
    "PERMISSION",
    "VG STATE",
    "LV STATE",
    "TYPE",
    "WRITE VERIFY",
    "MAX LPs",
    "PP SIZE",
    "COPIES",
    "SCHED POLICY",
    "LPs",
    "PPs",
    "STALE PPs",
    "BB POLICY",
    "INTER-POLICY",
    "RELOCATABLE",
    "INTRA-POLICY",
    "UPPER BOUND",
    "MOUNT POINT",
    "LABEL",
    "DEVICE UID",
    "DEVICE GID",
    "DEVICE PERMISSIONS",
    "MIRROR WRITE CONSISTENCY",
    "EACH LP COPY ON A SEPARATE PV ?",
    "Serialize IO ?",
    "INFINITE RETRY",
    "PREFERRED READ",
    "DEVICESUBTYPE",
    "COPY 1 MIRROR POOL",
    "COPY 2 MIRROR POOL",
    "COPY 3 MIRROR POOL",
    "ENCRYPTION",
    "STRIPE WIDTH",
    "STRIPE SIZE",
];

static LSLV_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    let labels: Vec<String> = LSLV_LABELS.iter().map(|l| regex::escape(l)).collect();
    Regex::new(&format!(r"(?:^|\s)(?P<key>{})\s*:", labels.join("|")))
        .expect("valid lslv label regex")
});

/// `lslv` labels and the attribute each one reports
const FIELDS: &[(&str, &str)] = &[
    ("VOLUME GROUP", "vg"),
    ("MAX LPs", "max_lps"),
    ("INTER-POLICY", "inter_policy"),
    ("UPPER BOUND", "upper_bound"),
    ("LABEL", "label"),
    ("PERMISSION", "permission"),
    ("BB POLICY", "bb_policy"),
    ("TYPE", "lv_type"),
    ("COPIES", "copies"),
    ("LPs", "size"),
];

/// Attributes `chlv` can change
const ATTRIBUTES: &[&str] = &[
    "inter_policy",
    "max_lps",
    "upper_bound",
    "label",
    "permission",
    "bb_policy",
    "vg",
];

const OPTIONS: &[&str] = &["vg", "size", "lv_type", "copies", "strip_size", "pv_list"];

const NOT_FOUND: &[&str] = &["0516-306"];

/// mklv size, in logical partitions, when none is given
const DEFAULT_SIZE: &str = "1";

#[derive(Debug, Clone)]
pub struct Volume {
    name: String,
    intent: Intent,
    attributes: AttributeSet,
    vg: Option<String>,
    /// Logical partitions
    size: String,
    lv_type: Option<String>,
    copies: Option<String>,
    strip_size: Option<String>,
    pv_list: Vec<String>,
}

impl Volume {
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        let opts = Options::new(ObjectKind::Volume, &entry.options, OPTIONS)?;
        let vg = opts.string("vg");

        let mut attributes = entry.attributes.clone();
        if let Some(vg) = &vg {
            attributes.insert("vg", vg.as_str());
        }

        let strip_size = opts.string("strip_size");
        if let Some(strip) = &strip_size {
            check_strip_size(strip)?;
        }

        Ok(Self {
            name: entry.name.clone(),
            intent: entry.state,
            attributes,
            vg,
            size: opts.string("size").unwrap_or_else(|| DEFAULT_SIZE.to_string()),
            lv_type: opts.string("lv_type"),
            copies: opts.string("copies"),
            strip_size,
            pv_list: opts.list("pv_list"),
        })
    }
}

/// `lslv` query for one logical volume
pub fn listing(name: &str) -> (CommandLine, Layout) {
    (
        CommandLine::new("lslv").arg(name),
        Layout::Scanned {
            labels: LSLV_LABEL.clone(),
        },
    )
}

/// A power of two between 4K and 128M, written with a K or M suffix
fn check_strip_size(value: &str) -> Result<()> {
    let invalid = || {
        Error::invalid(
            ObjectKind::Volume,
            "strip_size",
            value,
            "expected a power of two between 4K and 128M",
        )
    };
    let (digits, scale) = match value.to_ascii_uppercase().chars().last() {
        Some('K') => (&value[..value.len() - 1], 1_u64 << 10),
        Some('M') => (&value[..value.len() - 1], 1_u64 << 20),
        _ => return Err(invalid()),
    };
    let bytes = digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(scale))
        .ok_or_else(invalid)?;
    if bytes.is_power_of_two() && ((4 << 10)..=(128 << 20)).contains(&bytes) {
        Ok(())
    } else {
        Err(invalid())
    }
}

/// Map an attribute to its mklv/chlv flag pair
fn flag(name: &str, value: &AttrValue) -> Result<Option<[String; 2]>> {
    let value = value.to_string();
    let (flag, arg) = match (name, value.as_str()) {
        ("inter_policy", "maximum") => ("-e", "x".to_string()),
        ("inter_policy", "minimum") => ("-e", "m".to_string()),
        ("permission", "read/write") => ("-p", "w".to_string()),
        ("permission", "read-only") => ("-p", "r".to_string()),
        ("bb_policy", "relocatable") => ("-b", "y".to_string()),
        ("bb_policy", "non-relocatable") => ("-b", "n".to_string()),
        ("max_lps", _) => ("-x", value.clone()),
        ("upper_bound", _) => ("-u", value.clone()),
        ("label", _) => ("-L", value.clone()),
        ("vg", _) => return Ok(None),
        (name @ ("inter_policy" | "permission" | "bb_policy"), _) => {
            return Err(Error::invalid(
                ObjectKind::Volume,
                name,
                value.clone(),
                "not a value lslv reports",
            ));
        }
        (name, _) => return Err(Error::unsupported(ObjectKind::Volume, name)),
    };
    Ok(Some([flag.to_string(), arg]))
}

fn flags(attributes: &AttributeSet) -> Result<Vec<String>> {
    let mut args = Vec::new();
    for (name, value) in attributes {
        if let Some(pair) = flag(name, value)? {
            args.extend(pair);
        }
    }
    Ok(args)
}

impl CommandSynthesizer for Volume {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Volume
    }

    fn validate(&self, attributes: &AttributeSet) -> Result<()> {
        check_supported(ObjectKind::Volume, attributes, ATTRIBUTES)?;
        if self.intent == Intent::Present && self.vg.is_none() {
            return Err(Error::missing(ObjectKind::Volume, "vg"));
        }
        if self.strip_size.is_some() && attributes.contains("inter_policy") {
            return Err(Error::conflict(
                "strip_size cannot be combined with inter_policy",
            ));
        }
        flags(attributes).map(|_| ())
    }

    fn synthesize(&self, identifier: &str, mode: Mode, attributes: &AttributeSet) -> Result<Synthesis> {
        let command = match mode {
            Mode::Create => {
                let vg = self
                    .vg
                    .as_deref()
                    .ok_or_else(|| Error::missing(ObjectKind::Volume, "vg"))?;

                let mut command = CommandLine::new("mklv").args(["-y", identifier]);
                if let Some(lv_type) = &self.lv_type {
                    command = command.args(["-t", lv_type.as_str()]);
                }
                if let Some(copies) = &self.copies {
                    command = command.args(["-c", copies.as_str()]);
                }
                command = command.args(flags(attributes)?);
                if let Some(strip) = &self.strip_size {
                    command = command.args(["-S", strip.as_str()]);
                }
                command
                    .args([vg, self.size.as_str()])
                    .args(self.pv_list.iter().cloned())
            }
            Mode::Modify => CommandLine::new("chlv")
                .args(flags(attributes)?)
                .arg(identifier),
            Mode::Delete => CommandLine::new("rmlv").args(["-f", identifier]),
            other => return Err(unsupported_mode(ObjectKind::Volume, other)),
        };
        Ok(Synthesis::one(command))
    }
}

impl Target for Volume {
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
        Ok(listing(&self.name).0)
    }

    fn observe(&self, result: &CommandResult) -> Result<ObservedState> {
        if not_found(result, NOT_FOUND) {
            return Ok(ObservedState::Absent);
        }
        if !result.success() {
            return Err(query_failed(&self.query()?, result));
        }

        let (_, layout) = listing(&self.name);
        let raw = match parse_object(&result.stdout, &layout, &self.name)? {
            ObservedState::Present(raw) => raw,
            ObservedState::Absent => return Ok(ObservedState::Absent),
        };
        let facts: Facts = FIELDS
            .iter()
            .filter_map(|(label, name)| raw.get(*label).map(|v| ((*name).to_string(), v.clone())))
            .collect();
        Ok(ObservedState::Present(facts))
    }

    fn plan(&self, observed: &ObservedState, comparison: &Comparison) -> Result<Action> {
        if self.intent != Intent::Absent
            && let Some(entry) = comparison.diff.get("vg")
            && comparison.object_exists
        {
            return Err(Error::conflict(format!(
                "logical volume '{}' is in volume group {}, not {}",
                self.name,
                observed.get("vg").unwrap_or("unknown"),
                entry.desired
            )));
        }
        Ok(orchestrator::plan(
            ObjectKind::Volume,
            self.intent,
            comparison,
            &self.attributes,
        ))
    }
}
