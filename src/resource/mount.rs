//! Mounted filesystems: `mount` / `umount`
//!
//! The object is the mount point. A mount point already mounted from a
//! different device is reported as a conflict; remounting is not attempted.
//! Without a `device` attribute the mount point is looked up in
//! /etc/filesystems by `mount` itself, and being mounted is all that counts.

use super::{Options, query_failed};
use crate::schema::Entry;
use reconcile::{
    Action, AttributeSet, CommandLine, CommandResult, CommandSynthesizer, Comparison, Error, Facts,
    Intent, Layout, Mode, ObjectKind, ObservedState, Result, Synthesis, Target, orchestrator,
    parse_object,
    synth::{check_supported, unsupported_mode},
};

const ATTRIBUTES: &[&str] = &["device", "node"];

const OPTIONS: &[&str] = &[
    "alternate_fs",
    "removable",
    "read_only",
    "vfs",
    "mount_options",
    "force",
];

/// Key column of the `mount` table
const MOUNTED_OVER: &str = "mounted over";

#[derive(Debug, Clone)]
pub struct Mount {
    mountpoint: String,
    intent: Intent,
    attributes: AttributeSet,
    alternate_fs: Option<String>,
    removable: bool,
    read_only: bool,
    vfs: Option<String>,
    mount_options: Option<String>,
    force: bool,
}

impl Mount {
    pub fn from_entry(entry: &Entry) -> Result<Self> {
        let opts = Options::new(ObjectKind::Mount, &entry.options, OPTIONS)?;
        Ok(Self {
            mountpoint: entry.name.clone(),
            intent: entry.state,
            attributes: entry.attributes.clone(),
            alternate_fs: opts.string("alternate_fs"),
            removable: opts.flag("removable", false)?,
            read_only: opts.flag("read_only", false)?,
            vfs: opts.string("vfs"),
            mount_options: opts.list("mount_options").into_iter().reduce(|a, b| a + "," + &b),
            force: opts.flag("force", false)?,
        })
    }
}

/// The `date` column prints as three words: `Jan 07 10:33`
fn layout() -> Layout {
    Layout::ruled(MOUNTED_OVER, &[("date", 3)])
}

pub fn listing() -> (CommandLine, Layout) {
    (CommandLine::new("mount"), layout())
}

impl CommandSynthesizer for Mount {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Mount
    }

    fn validate(&self, attributes: &AttributeSet) -> Result<()> {
        check_supported(ObjectKind::Mount, attributes, ATTRIBUTES)?;
        // a remote mount names the exported directory explicitly
        if self.intent != Intent::Absent
            && attributes.contains("node")
            && !attributes.contains("device")
        {
            return Err(Error::missing(ObjectKind::Mount, "device"));
        }
        Ok(())
    }

    fn synthesize(&self, identifier: &str, mode: Mode, attributes: &AttributeSet) -> Result<Synthesis> {
        match mode {
            Mode::Create => {
                let mut command = CommandLine::new("mount");
                if let Some(file) = &self.alternate_fs {
                    command = command.args(["-F", file.as_str()]);
                }
                command = command
                    .arg_if(self.removable, "-p")
                    .arg_if(self.read_only, "-r");
                if let Some(vfs) = &self.vfs {
                    command = command.args(["-v", vfs.as_str()]);
                }
                if let Some(options) = &self.mount_options {
                    command = command.args(["-o", options.as_str()]);
                }
                if let Some(node) = attributes.get("node") {
                    command = command.arg("-n").arg(node.to_string());
                }
                if let Some(device) = attributes.get("device") {
                    command = command.arg(device.to_string());
                }
                Ok(Synthesis::one(command.arg(identifier)))
            }
            Mode::Delete => Ok(Synthesis::one(
                CommandLine::new("umount")
                    .arg_if(self.force, "-f")
                    .arg(identifier),
            )),
            other => Err(unsupported_mode(ObjectKind::Mount, other)),
        }
    }
}

impl Target for Mount {
    fn identifier(&self) -> &str {
        &self.mountpoint
    }

    fn intent(&self) -> Intent {
        self.intent
    }

    fn desired(&self) -> &AttributeSet {
        &self.attributes
    }

    fn query(&self) -> Result<CommandLine> {
        Ok(CommandLine::new("mount"))
    }

    fn observe(&self, result: &CommandResult) -> Result<ObservedState> {
        if !result.success() {
            return Err(query_failed(&self.query()?, result));
        }
        let row = match parse_object(&result.stdout, &layout(), &self.mountpoint)? {
            ObservedState::Present(row) => row,
            ObservedState::Absent => return Ok(ObservedState::Absent),
        };

        let field = |name: &str| row.get(name).cloned().unwrap_or_default();
        let facts: Facts = [
            ("device", field("mounted")),
            ("node", field("node")),
            ("vfs", field("vfs")),
            ("options", field("options")),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
        Ok(ObservedState::Present(facts))
    }

    fn plan(&self, observed: &ObservedState, comparison: &Comparison) -> Result<Action> {
        if self.intent != Intent::Absent && comparison.object_exists && !comparison.diff.is_empty() {
            return Err(Error::conflict(format!(
                "'{}' is already mounted from {}; remount not attempted",
                self.mountpoint,
                observed.get("device").unwrap_or("another device")
            )));
        }
        Ok(orchestrator::plan(
            ObjectKind::Mount,
            self.intent,
            comparison,
            &self.attributes,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{ErrorCategory, Phase, Reconciler, ScriptedExecutor};

    /// `mount` output with one row per (node, device, mount point, vfs, options)
    fn table(rows: &[(&str, &str, &str, &str, &str)]) -> String {
        let mut out = String::from(concat!(
            "  node       mounted        mounted over    vfs       date        options      \n",
            "-------- ---------------  ---------------  ------ ------------ --------------- \n",
        ));
        for (node, device, over, vfs, options) in rows {
            out.push_str(&format!(
                "{node:<9}{device:<17}{over:<17}{vfs:<7}{:<13}{options}\n",
                "Jan 07 10:32"
            ));
        }
        out
    }

    fn base() -> String {
        table(&[
            ("", "/dev/hd4", "/", "jfs2", "rw,log=/dev/hd8"),
            ("", "/dev/hd1", "/home", "jfs2", "rw,log=/dev/hd8"),
        ])
    }

    fn mount(entry: &Entry) -> Mount {
        Mount::from_entry(entry).unwrap()
    }

    #[test]
    fn test_already_mounted_is_noop() {
        let exec = ScriptedExecutor::new().on("mount", [CommandResult::ok(base())]);
        let entry = Entry::new("/home", Intent::Present).attribute("device", "/dev/hd1");

        let outcome = Reconciler::new(&exec).reconcile(&mount(&entry));

        assert!(!outcome.changed);
        assert!(!outcome.failed);
        assert_eq!(outcome.phase(), Phase::NoopComplete);
        assert_eq!(exec.calls(), vec!["mount"]);
    }

    #[test]
    fn test_unmounted_filesystem_is_mounted() {
        let after = table(&[
            ("", "/dev/hd4", "/", "jfs2", "rw,log=/dev/hd8"),
            ("", "/dev/hd1", "/home", "jfs2", "rw,log=/dev/hd8"),
            ("", "/dev/datalv", "/data", "jfs2", "ro"),
        ]);
        let exec = ScriptedExecutor::new()
            .on("mount", [CommandResult::ok(base()), CommandResult::ok(after)])
            .on("mount -r", [CommandResult::ok("")]);
        let entry = Entry::new("/data", Intent::Present)
            .attribute("device", "/dev/datalv")
            .option("read_only", true)
            .option("vfs", "jfs2");

        let outcome = Reconciler::new(&exec).reconcile(&mount(&entry));

        assert!(outcome.changed);
        assert!(!outcome.failed, "{}", outcome.message);
        assert_eq!(outcome.commands, vec!["mount -r -v jfs2 /dev/datalv /data"]);
    }

    #[test]
    fn test_remote_mount_passes_node() {
        let entry = Entry::new("/mnt", Intent::Present)
            .attribute("device", "/export/lpp")
            .attribute("node", "nim01")
            .option("mount_options", "bg,hard");
        let target = mount(&entry);

        let synthesis =
            reconcile::synth::synthesize(&target, "/mnt", Mode::Create, target.desired()).unwrap();
        assert_eq!(
            synthesis.commands()[0].display(),
            "mount -o bg,hard -n nim01 /export/lpp /mnt"
        );
    }

    #[test]
    fn test_different_device_is_a_conflict() {
        let exec = ScriptedExecutor::new().on("mount", [CommandResult::ok(base())]);
        let entry = Entry::new("/home", Intent::Present).attribute("device", "/dev/hd9");

        let target = mount(&entry);
        let outcome = Reconciler::new(&exec).reconcile(&target);

        assert!(outcome.failed);
        assert!(outcome.message.contains("already mounted from /dev/hd1"));
        assert_eq!(exec.calls(), vec!["mount"]);

        let err = Reconciler::new(&exec).preview(&target).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_unmount_nothing_mounted_is_benign() {
        let exec = ScriptedExecutor::new()
            .on("mount", [CommandResult::ok(base())])
            .on(
                "umount",
                [CommandResult::failed(1, "umount: 0506-347 Cannot find anything to unmount.")],
            );
        let entry = Entry::new("/home", Intent::Absent).option("force", true);

        let outcome = Reconciler::new(&exec).reconcile(&mount(&entry));

        assert!(!outcome.failed);
        assert!(!outcome.changed);
        assert_eq!(exec.calls_to("umount"), vec!["umount -f /home"]);
    }

    #[test]
    fn test_long_mount_point_already_mounted() {
        let mut out = base();
        out.push_str("         /dev/fslv00      /opt/IBM/WebSphere jfs2   Jan 07 10:33 rw,log=/dev/loglv00\n");
        let exec = ScriptedExecutor::new().on("mount", [CommandResult::ok(out)]);
        let entry = Entry::new("/opt/IBM/WebSphere", Intent::Present).attribute("device", "/dev/fslv00");

        let outcome = Reconciler::new(&exec).reconcile(&mount(&entry));

        assert!(!outcome.changed);
        assert!(!outcome.failed, "{}", outcome.message);
        assert_eq!(exec.calls(), vec!["mount"]);
    }

    #[test]
    fn test_mount_point_alone_uses_filesystems_table() {
        let after = table(&[
            ("", "/dev/hd4", "/", "jfs2", "rw,log=/dev/hd8"),
            ("", "/dev/hd1", "/home", "jfs2", "rw,log=/dev/hd8"),
            ("", "/dev/fslv01", "/data", "jfs2", "rw,log=INLINE"),
        ]);
        let exec = ScriptedExecutor::new()
            .on("mount", [CommandResult::ok(base()), CommandResult::ok(after)])
            .on("mount /data", [CommandResult::ok("")]);

        let outcome = Reconciler::new(&exec).reconcile(&mount(&Entry::new("/data", Intent::Present)));

        assert!(outcome.changed);
        assert!(!outcome.failed, "{}", outcome.message);
        assert_eq!(outcome.commands, vec!["mount /data"]);
    }

    #[test]
    fn test_mount_point_alone_is_noop_when_mounted() {
        let exec = ScriptedExecutor::new().on("mount", [CommandResult::ok(base())]);

        let outcome = Reconciler::new(&exec).reconcile(&mount(&Entry::new("/home", Intent::Present)));

        assert!(!outcome.changed);
        assert_eq!(outcome.phase(), Phase::NoopComplete);
    }

    #[test]
    fn test_remote_node_without_device_fails_before_query() {
        let exec = ScriptedExecutor::new();
        let entry = Entry::new("/mnt", Intent::Present).attribute("node", "nim01");

        let outcome = Reconciler::new(&exec).reconcile(&mount(&entry));

        assert!(outcome.failed);
        assert!(outcome.message.contains("missing required parameter 'device'"));
        assert!(exec.calls().is_empty());
    }
}
