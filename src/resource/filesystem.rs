//! /etc/filesystems entries: `lsfs -c` / `crfs` / `chfs` / `rmfs`, and
//! `mknfsmnt` / `chnfsmnt` / `rmnfsmnt` for NFS entries
//!
//! The object is the mount point. An entry naming `nfs_server` is an NFS
//! mount; anything else is a local filesystem on a logical volume. `size`
//! is a floor in 512-byte blocks: a filesystem at least that large is
//! converged, and shrinking is never attempted.

use super::{Options, not_found, query_failed};
use crate::schema::Entry;
use reconcile::{
    Action, AttrValue, AttributeSet, CommandLine, CommandResult, CommandSynthesizer, Comparison,
    Error, Facts, Intent, Layout, Mode, ObjectKind, ObservedState, Result, Synthesis, Target,
    Vocabulary, orchestrator, parse_object,
    synth::{check_supported, unsupported_mode},
};

const ATTRIBUTES: &[&str] = &[
    "device",
    "nfs_server",
    "size",
    "permissions",
    "auto_mount",
    "mount_group",
    "account_subsystem",
];

const OPTIONS: &[&str] = &[
    "vg",
    "fs_type",
    "fs_attributes",
    "nfs_soft_mount",
    "rm_mount_point",
];

/// Columns of `lsfs -c`
const COLUMNS: &[&str] = &[
    "mount_point",
    "device",
    "vfs",
    "node",
    "type",
    "size",
    "options",
    "auto_mount",
    "accounting",
];

const NOT_FOUND: &[&str] = &["No record matching"];

const BLOCKS_PER_MB: u64 = 2048;

#[derive(Debug, Clone)]
pub struct Filesystem {
    mountpoint: String,
    intent: Intent,
    attributes: AttributeSet,
    vg: Option<String>,
    fs_type: String,
    /// Extra `crfs -a` pairs, creation only
    fs_attributes: Vec<String>,
    soft: bool,
    rm_mount_point: bool,
}

impl Filesystem {
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        let opts = Options::new(ObjectKind::Filesystem, &entry.options, OPTIONS)?;

        let mut attributes = entry.attributes.clone();
        if let Some(size) = attributes.get("size").and_then(|s| blocks(&s.to_string())) {
            attributes.insert("size", size.to_string());
        }

        Ok(Self {
            mountpoint: entry.name.clone(),
            intent: entry.state,
            attributes,
            vg: opts.string("vg"),
            fs_type: opts.string("fs_type").unwrap_or_else(|| "jfs2".to_string()),
            fs_attributes: opts.list("fs_attributes"),
            soft: opts.flag("nfs_soft_mount", false)?,
            rm_mount_point: opts.flag("rm_mount_point", false)?,
        })
    }

    /// `crfs`/`chfs` flags for the given attributes
    fn local_flags(attributes: &AttributeSet) -> Vec<String> {
        let mut flags = Vec::new();
        if let Some(auto) = attributes.get("auto_mount").and_then(AttrValue::as_bool) {
            flags.extend(["-A".to_string(), Vocabulary::YesNo.render(auto).to_string()]);
        }
        if let Some(size) = attributes.get("size") {
            flags.extend(["-a".to_string(), format!("size={size}")]);
        }
        if let Some(group) = attributes.get("mount_group") {
            flags.extend(["-u".to_string(), group.to_string()]);
        }
        if let Some(permissions) = attributes.get("permissions") {
            flags.extend(["-p".to_string(), permissions.to_string()]);
        }
        if let Some(acct) = attributes.get("account_subsystem").and_then(AttrValue::as_bool) {
            flags.extend(["-t".to_string(), Vocabulary::YesNo.render(acct).to_string()]);
        }
        flags
    }

    /// `mknfsmnt`/`chnfsmnt` flags for the given attributes
    fn nfs_flags(&self, attributes: &AttributeSet) -> Vec<String> {
        let mut flags = Vec::new();
        match attributes.get("auto_mount").and_then(AttrValue::as_bool) {
            Some(true) => flags.push("-A".to_string()),
            Some(false) => flags.push("-a".to_string()),
            None => {}
        }
        if self.soft {
            flags.push("-S".to_string());
        }
        if let Some(permissions) = attributes.get("permissions") {
            flags.extend(["-t".to_string(), permissions.to_string()]);
        }
        if let Some(group) = attributes.get("mount_group") {
            flags.extend(["-m".to_string(), group.to_string()]);
        }
        flags
    }

    fn nfs_record(command: CommandLine, identifier: &str, attributes: &AttributeSet) -> CommandLine {
        let field = |name: &str| attributes.get(name).map(ToString::to_string).unwrap_or_default();
        command
            .args(["-f", identifier])
            .args(["-d".to_string(), field("device")])
            .args(["-h".to_string(), field("nfs_server")])
    }

    fn create(&self, identifier: &str, attributes: &AttributeSet) -> CommandLine {
        let mut with_permissions = attributes.clone();
        if !with_permissions.contains("permissions") {
            with_permissions.insert("permissions", "rw");
        }

        if attributes.contains("nfs_server") {
            return Self::nfs_record(CommandLine::new("mknfsmnt"), identifier, attributes)
                .args(self.nfs_flags(&with_permissions))
                .args(["-w", "bg"]);
        }

        let mut command = CommandLine::new("crfs").args(["-v", self.fs_type.as_str()]);
        if let Some(vg) = &self.vg {
            command = command.args(["-g", vg.as_str()]);
        }
        if let Some(device) = attributes.get("device") {
            command = command.arg("-d").arg(device.to_string());
        }
        command = command
            .args(["-m", identifier])
            .args(Self::local_flags(&with_permissions));
        for pair in &self.fs_attributes {
            command = command.arg("-a").arg(pair.as_str());
        }
        command
    }
}

/// Size in 512-byte blocks from a block count or an `M`/`G` suffixed size
fn blocks(value: &str) -> Option<u64> {
    let value = value.trim();
    let (digits, factor) = match value.char_indices().last()? {
        (at, 'M' | 'm') => (&value[..at], BLOCKS_PER_MB),
        (at, 'G' | 'g') => (&value[..at], BLOCKS_PER_MB * 1024),
        _ => (value, 1),
    };
    // relative sizes (`+5M`) are not a state
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok().map(|n| n * factor)
}

pub fn listing(name: Option<&str>) -> (CommandLine, Layout) {
    let mut command = CommandLine::new("lsfs").arg("-c");
    if let Some(name) = name {
        command = command.arg(name);
    }
    (command, Layout::positional(':', COLUMNS))
}

impl CommandSynthesizer for Filesystem {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Filesystem
    }

    fn validate(&self, attributes: &AttributeSet) -> Result<()> {
        check_supported(ObjectKind::Filesystem, attributes, ATTRIBUTES)?;
        if let Some(size) = attributes.get("size").map(ToString::to_string)
            && blocks(&size).is_none()
        {
            return Err(Error::invalid(
                ObjectKind::Filesystem,
                "size",
                size,
                "expected 512-byte blocks or a size such as 512M",
            ));
        }
        if let Some(permissions) = attributes.get("permissions").map(ToString::to_string)
            && permissions != "rw"
            && permissions != "ro"
        {
            return Err(Error::invalid(
                ObjectKind::Filesystem,
                "permissions",
                permissions,
                "expected rw or ro",
            ));
        }
        if self.intent != Intent::Absent
            && attributes.contains("nfs_server")
            && !attributes.contains("device")
        {
            return Err(Error::missing(ObjectKind::Filesystem, "device"));
        }
        Ok(())
    }

    fn synthesize(&self, identifier: &str, mode: Mode, attributes: &AttributeSet) -> Result<Synthesis> {
        let nfs = attributes.contains("nfs_server");
        let command = match mode {
            Mode::Create => self.create(identifier, attributes),
            Mode::Modify if nfs => {
                Self::nfs_record(CommandLine::new("chnfsmnt"), identifier, attributes)
                    .args(self.nfs_flags(attributes))
            }
            Mode::Modify => CommandLine::new("chfs")
                .args(Self::local_flags(attributes))
                .arg(identifier),
            Mode::Delete if nfs => CommandLine::new("rmnfsmnt")
                .arg(if self.rm_mount_point { "-B" } else { "-I" })
                .args(["-f", identifier]),
            Mode::Delete => CommandLine::new("rmfs")
                .arg_if(self.rm_mount_point, "-r")
                .arg(identifier),
            other => return Err(unsupported_mode(ObjectKind::Filesystem, other)),
        };
        Ok(Synthesis::one(command))
    }
}

impl Target for Filesystem {
    fn identifier(&self) -> &str {
        &self.mountpoint
    }

    fn intent(&self) -> Intent {
        self.intent
    }

    fn desired(&self) -> &AttributeSet {
        &self.attributes
    }

    fn vocabulary(&self) -> Vocabulary {
        Vocabulary::YesNo
    }

    fn query(&self) -> Result<CommandLine> {
        Ok(listing(Some(&self.mountpoint)).0)
    }

    fn observe(&self, result: &CommandResult) -> Result<ObservedState> {
        if not_found(result, NOT_FOUND) {
            return Ok(ObservedState::Absent);
        }
        if !result.success() {
            return Err(query_failed(&self.query()?, result));
        }
        let (_, layout) = listing(None);
        let row = match parse_object(&result.stdout, &layout, &self.mountpoint)? {
            ObservedState::Present(row) => row,
            ObservedState::Absent => return Ok(ObservedState::Absent),
        };

        let field = |name: &str| row.get(name).cloned().unwrap_or_default();
        let read_only = field("options").split(',').any(|o| o.trim() == "ro");
        let mut size = field("size");
        let floor = self.attributes.get("size").and_then(|s| blocks(&s.to_string()));
        if let (Some(floor), Some(current)) = (floor, blocks(&size))
            && current >= floor
        {
            size = floor.to_string();
        }

        let facts: Facts = [
            ("device", field("device")),
            ("vfs", field("vfs")),
            ("nfs_server", field("node")),
            ("mount_group", field("type")),
            ("size", size),
            ("permissions", (if read_only { "ro" } else { "rw" }).to_string()),
            ("auto_mount", field("auto_mount")),
            ("account_subsystem", field("accounting")),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
        Ok(ObservedState::Present(facts))
    }

    fn plan(&self, observed: &ObservedState, comparison: &Comparison) -> Result<Action> {
        let action = orchestrator::plan(
            ObjectKind::Filesystem,
            self.intent,
            comparison,
            &self.attributes,
        );
        let Action::Act {
            mode,
            mut attributes,
        } = action
        else {
            return Ok(action);
        };

        let nfs = observed.get("vfs") == Some("nfs");
        match mode {
            Mode::Create => {
                if !attributes.contains("nfs_server")
                    && !attributes.contains("device")
                    && self.vg.is_none()
                {
                    return Err(Error::missing(ObjectKind::Filesystem, "vg"));
                }
            }
            // the NFS commands always name the export and its server
            _ if nfs => {
                for name in ["device", "nfs_server"] {
                    if !attributes.contains(name)
                        && let Some(value) = observed.get(name)
                    {
                        attributes.insert(name, value);
                    }
                }
            }
            Mode::Modify if attributes.contains("device") || attributes.contains("nfs_server") => {
                return Err(Error::conflict(format!(
                    "'{}' is a local filesystem on {}; its device cannot be changed",
                    self.mountpoint,
                    observed.get("device").unwrap_or("another device")
                )));
            }
            _ => {
                attributes.remove("nfs_server");
            }
        }
        Ok(Action::Act { mode, attributes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{Phase, Reconciler, ScriptedExecutor};

    const HEADER: &str = "#MountPoint:Device:Vfs:Nodename:Type:Size:Options:AutoMount:Acct\n";

    fn lsfs(row: &str) -> String {
        format!("{HEADER}{row}\n")
    }

    fn data(size: u64, auto: &str) -> String {
        lsfs(&format!("/data:/dev/fslv00:jfs2::app:{size}:rw:{auto}:no"))
    }

    fn missing() -> CommandResult {
        CommandResult::failed(
            1,
            "lsfs: No record matching '/data' was found in /etc/filesystems.",
        )
    }

    fn filesystem(entry: &Entry) -> Filesystem {
        Filesystem::from_entry(entry).unwrap()
    }

    #[test]
    fn test_missing_filesystem_is_created_in_volume_group() {
        let exec = ScriptedExecutor::new()
            .on("lsfs", [missing(), CommandResult::ok(data(1_048_576, "yes"))])
            .on("crfs", [CommandResult::ok("File system created successfully.\n")]);
        let entry = Entry::new("/data", Intent::Present)
            .attribute("size", "512M")
            .attribute("auto_mount", true)
            .attribute("mount_group", "app")
            .option("vg", "datavg")
            .option("fs_attributes", "isnapshot=no");

        let outcome = Reconciler::new(&exec).reconcile(&filesystem(&entry));

        assert!(outcome.changed);
        assert!(!outcome.failed, "{}", outcome.message);
        assert_eq!(
            outcome.commands,
            vec!["crfs -v jfs2 -g datavg -m /data -A yes -a size=1048576 -u app -p rw -a isnapshot=no"]
        );
        assert_eq!(outcome.phase(), Phase::Success);
    }

    #[test]
    fn test_local_create_needs_volume_group_or_device() {
        let exec = ScriptedExecutor::new().on("lsfs", [missing()]);
        let entry = Entry::new("/data", Intent::Present).attribute("size", 262_144);

        let outcome = Reconciler::new(&exec).reconcile(&filesystem(&entry));

        assert!(outcome.failed);
        assert!(outcome.message.contains("missing required parameter 'vg'"));
        assert!(exec.calls_to("crfs").is_empty());
    }

    #[test]
    fn test_larger_filesystem_satisfies_size() {
        let exec = ScriptedExecutor::new().on("lsfs", [CommandResult::ok(data(2_097_152, "yes"))]);
        let entry = Entry::new("/data", Intent::Present)
            .attribute("size", "512M")
            .attribute("auto_mount", true);

        let outcome = Reconciler::new(&exec).reconcile(&filesystem(&entry));

        assert!(!outcome.changed);
        assert!(!outcome.failed, "{}", outcome.message);
        assert_eq!(exec.calls(), vec!["lsfs -c /data"]);
    }

    #[test]
    fn test_only_changed_settings_reach_chfs() {
        let exec = ScriptedExecutor::new()
            .on(
                "lsfs",
                [
                    CommandResult::ok(data(262_144, "no")),
                    CommandResult::ok(data(1_048_576, "yes")),
                ],
            )
            .on("chfs", [CommandResult::ok("")]);
        let entry = Entry::new("/data", Intent::Present)
            .attribute("size", "512M")
            .attribute("auto_mount", true)
            .attribute("mount_group", "app");

        let outcome = Reconciler::new(&exec).reconcile(&filesystem(&entry));

        assert!(outcome.changed);
        assert!(!outcome.failed, "{}", outcome.message);
        assert_eq!(outcome.commands, vec!["chfs -A yes -a size=1048576 /data"]);
    }

    #[test]
    fn test_nfs_entry_is_changed_with_its_export() {
        let before = lsfs("/mnt:/export/lpp:nfs:nim01:::bg,hard,rw:no:no");
        let after = lsfs("/mnt:/export/lpp:nfs:nim01:::bg,hard,ro:no:no");
        let exec = ScriptedExecutor::new()
            .on("lsfs", [CommandResult::ok(before), CommandResult::ok(after)])
            .on("chnfsmnt", [CommandResult::ok("")]);
        let entry = Entry::new("/mnt", Intent::Present)
            .attribute("nfs_server", "nim01")
            .attribute("device", "/export/lpp")
            .attribute("permissions", "ro");

        let outcome = Reconciler::new(&exec).reconcile(&filesystem(&entry));

        assert!(!outcome.failed, "{}", outcome.message);
        assert_eq!(
            outcome.commands,
            vec!["chnfsmnt -f /mnt -d /export/lpp -h nim01 -t ro"]
        );
    }

    #[test]
    fn test_nfs_entry_is_created_read_write() {
        let entry = Entry::new("/mnt", Intent::Present)
            .attribute("nfs_server", "nim01")
            .attribute("device", "/export/lpp")
            .attribute("auto_mount", false)
            .option("nfs_soft_mount", true);
        let target = filesystem(&entry);

        let synthesis =
            reconcile::synth::synthesize(&target, "/mnt", Mode::Create, target.desired()).unwrap();
        assert_eq!(
            synthesis.commands()[0].display(),
            "mknfsmnt -f /mnt -d /export/lpp -h nim01 -a -S -t rw -w bg"
        );
    }

    #[test]
    fn test_nfs_server_without_export_is_missing_parameter() {
        let target = filesystem(&Entry::new("/mnt", Intent::Present).attribute("nfs_server", "nim01"));
        assert!(matches!(
            target.validate(target.desired()),
            Err(Error::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_removal_follows_observed_type() {
        let exec = ScriptedExecutor::new()
            .on("lsfs", [CommandResult::ok(lsfs("/mnt:/export/lpp:nfs:nim01:::rw:yes:no"))])
            .on("rmnfsmnt", [CommandResult::ok("")]);
        let entry = Entry::new("/mnt", Intent::Absent).option("rm_mount_point", true);

        let outcome = Reconciler::new(&exec).reconcile(&filesystem(&entry));
        assert!(outcome.changed);
        assert_eq!(outcome.commands, vec!["rmnfsmnt -B -f /mnt"]);

        let exec = ScriptedExecutor::new()
            .on("lsfs", [CommandResult::ok(data(262_144, "yes"))])
            .on("rmfs", [CommandResult::ok("")]);
        let outcome = Reconciler::new(&exec).reconcile(&filesystem(&Entry::new("/data", Intent::Absent)));
        assert_eq!(outcome.commands, vec!["rmfs /data"]);
    }

    #[test]
    fn test_absent_filesystem_is_noop() {
        let exec = ScriptedExecutor::new().on("lsfs", [missing()]);

        let outcome = Reconciler::new(&exec).reconcile(&filesystem(&Entry::new("/data", Intent::Absent)));

        assert!(!outcome.changed);
        assert!(!outcome.failed);
        assert_eq!(outcome.message, "filesystem already absent");
    }

    #[test]
    fn test_local_device_change_is_a_conflict() {
        let exec = ScriptedExecutor::new().on("lsfs", [CommandResult::ok(data(262_144, "yes"))]);
        let entry = Entry::new("/data", Intent::Present).attribute("device", "/dev/fslv09");

        let outcome = Reconciler::new(&exec).reconcile(&filesystem(&entry));

        assert!(outcome.failed);
        assert!(outcome.message.contains("cannot be changed"));
        assert!(exec.calls_to("chfs").is_empty());
    }

    #[test]
    fn test_size_units() {
        assert_eq!(blocks("262144"), Some(262_144));
        assert_eq!(blocks("512M"), Some(1_048_576));
        assert_eq!(blocks("2G"), Some(4_194_304));
        assert_eq!(blocks("+5M"), None);

        let target = filesystem(&Entry::new("/data", Intent::Present).attribute("size", "+5M"));
        assert!(matches!(
            target.validate(target.desired()),
            Err(Error::InvalidValue { .. })
        ));
    }
}
