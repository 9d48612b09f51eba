//! AIX object adapters
//!
//! Every managed kind is a [`Target`]: it knows its query command, how to
//! read that command's output, and which commands create, change or remove
//! the object. The reconciliation itself lives in the `reconcile` crate.

pub mod device;
pub mod filesystem;
pub mod group;
pub mod inittab;
pub mod membership;
pub mod mount;
pub mod stanza;
pub mod tunable;
pub mod user;
pub mod volume;

use crate::schema::Entry;
use reconcile::{
    AttrValue, AttributeSet, CommandLine, CommandResult, Error, Layout, ObjectKind, Result, Target,
    synth::check_supported,
};

/// Build the adapter for one declared object
pub fn build(kind: ObjectKind, entry: &Entry) -> Result<Box<dyn Target>> {
    Ok(match kind {
        ObjectKind::User => Box::new(user::User::from_entry(entry)?),
        ObjectKind::Group => Box::new(group::Group::from_entry(entry)?),
        ObjectKind::Membership => Box::new(membership::Membership::from_entry(entry)?),
        ObjectKind::Device => Box::new(device::Device::from_entry(entry)?),
        ObjectKind::Mount => Box::new(mount::Mount::from_entry(entry)?),
        ObjectKind::Volume => Box::new(volume::Volume::from_entry(entry)?),
        ObjectKind::Filesystem => Box::new(filesystem::Filesystem::from_entry(entry)?),
        ObjectKind::Tunable => Box::new(tunable::Tunable::from_entry(entry)?),
        ObjectKind::Stanza => Box::new(stanza::Stanza::from_entry(entry)?),
        ObjectKind::Inittab => Box::new(inittab::Inittab::from_entry(entry)?),
    })
}

/// Query command and layout for `show`: one object when `name` is given,
/// every object of the kind otherwise
pub fn listing(kind: ObjectKind, name: Option<&str>) -> Option<(CommandLine, Layout)> {
    let selector = name.unwrap_or("ALL");
    match kind {
        ObjectKind::User => Some((
            CommandLine::new("lsuser").args(["-f", selector]),
            Layout::Stanza,
        )),
        ObjectKind::Group => Some((
            CommandLine::new("lsgroup").args(["-f", selector]),
            Layout::Stanza,
        )),
        ObjectKind::Membership => Some((
            CommandLine::new("lsgroup").args(["-c", "-a", "users", "adms", selector]),
            Layout::colon_header(),
        )),
        ObjectKind::Mount => Some(mount::listing()),
        ObjectKind::Device => Some(name.map_or_else(device::listing, device::settings)),
        ObjectKind::Volume => name.map(volume::listing),
        ObjectKind::Filesystem => Some(filesystem::listing(name)),
        ObjectKind::Tunable => name.map(tunable::listing),
        ObjectKind::Inittab => Some(inittab::listing(name)),
        // lssec needs the attribute names up front
        ObjectKind::Stanza => None,
    }
}

/// Typed access to an entry's `options` table
#[derive(Debug)]
pub(crate) struct Options<'a> {
    kind: ObjectKind,
    set: &'a AttributeSet,
}

impl<'a> Options<'a> {
    /// Reject any option not in `allowed`
    pub fn new(kind: ObjectKind, set: &'a AttributeSet, allowed: &[&str]) -> Result<Self> {
        check_supported(kind, set, allowed)?;
        Ok(Self { kind, set })
    }

    pub fn flag(&self, name: &str, default: bool) -> Result<bool> {
        match self.set.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_bool()
                .ok_or_else(|| Error::invalid(self.kind, name, value.to_string(), "expected a boolean")),
        }
    }

    pub fn string(&self, name: &str) -> Option<String> {
        self.set
            .get(name)
            .map(|v| v.to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn list(&self, name: &str) -> Vec<String> {
        match self.set.get(name) {
            Some(AttrValue::List(items)) => items.clone(),
            Some(other) => other
                .to_string()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => Vec::new(),
        }
    }

    /// One of `choices`, or `default` when unset
    pub fn choice(&self, name: &str, choices: &[&str], default: &str) -> Result<String> {
        let value = self.string(name).unwrap_or_else(|| default.to_string());
        if choices.contains(&value.as_str()) {
            Ok(value)
        } else {
            Err(Error::invalid(
                self.kind,
                name,
                value,
                format!("expected one of {}", choices.join(", ")),
            ))
        }
    }
}

/// Whether a failed query means "no such object"
pub(crate) fn not_found(result: &CommandResult, markers: &[&str]) -> bool {
    !result.success()
        && markers
            .iter()
            .any(|m| result.stderr.contains(m) || result.stdout.contains(m))
}

/// Error for a query that failed for any other reason
pub(crate) fn query_failed(query: &CommandLine, result: &CommandResult) -> Error {
    Error::CommandFailed {
        command: query.display(),
        result: result.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{CommandSynthesizer, Intent};

    #[test]
    fn test_build_every_kind() {
        let entries = [
            (ObjectKind::User, Entry::new("alice", Intent::Present)),
            (ObjectKind::Group, Entry::new("dba", Intent::Present)),
            (
                ObjectKind::Membership,
                Entry::new("dba", Intent::Present).attribute("alice", true),
            ),
            (ObjectKind::Device, Entry::new("hdisk1", Intent::Modify)),
            (
                ObjectKind::Mount,
                Entry::new("/home", Intent::Present).attribute("device", "/dev/hd1"),
            ),
            (
                ObjectKind::Volume,
                Entry::new("datalv", Intent::Absent),
            ),
            (
                ObjectKind::Tunable,
                Entry::new("vmo", Intent::Present).attribute("maxfree", 1088),
            ),
            (
                ObjectKind::Stanza,
                Entry::new("default", Intent::Present).attribute("maxage", 8),
            ),
            (
                ObjectKind::Filesystem,
                Entry::new("/data", Intent::Present).attribute("size", "512M"),
            ),
            (
                ObjectKind::Inittab,
                Entry::new("uprintfd", Intent::Modify).attribute("runlevel", "2"),
            ),
        ];
        for (kind, entry) in entries {
            let target = build(kind, &entry).unwrap();
            assert_eq!(target.kind(), kind);
            assert_eq!(target.identifier(), entry.name);
        }
    }

    #[test]
    fn test_listing_by_name() {
        let (command, layout) = listing(ObjectKind::User, Some("alice")).unwrap();
        assert_eq!(command.display(), "lsuser -f alice");
        assert!(!layout.is_single());

        let (command, layout) = listing(ObjectKind::Device, Some("hdisk0")).unwrap();
        assert_eq!(command.display(), "lsattr -E -l hdisk0 -F attribute:value");
        assert!(layout.is_single());

        assert_eq!(
            listing(ObjectKind::Group, None).unwrap().0.display(),
            "lsgroup -f ALL"
        );
        assert!(listing(ObjectKind::Tunable, None).is_none());
        assert!(listing(ObjectKind::Stanza, Some("default")).is_none());
        assert_eq!(
            listing(ObjectKind::Filesystem, None).unwrap().0.display(),
            "lsfs -c"
        );
        assert_eq!(
            listing(ObjectKind::Inittab, Some("uprintfd")).unwrap().0.display(),
            "lsitab uprintfd"
        );
    }

    #[test]
    fn test_options_reject_unknown_names() {
        let set = AttributeSet::new().with("colour", "red");
        let err = Options::new(ObjectKind::User, &set, &["password"]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedAttribute { .. }));
    }

    #[test]
    fn test_options_typed_access() {
        let set = AttributeSet::new()
            .with("force", "yes")
            .with("chtype", "reboot")
            .with("pv_list", "hdisk1, hdisk2");
        let opts = Options::new(ObjectKind::Device, &set, &["force", "chtype", "pv_list"]).unwrap();

        assert!(opts.flag("force", false).unwrap());
        assert!(!opts.flag("recursive", false).unwrap());
        assert_eq!(
            opts.choice("chtype", &["both", "current", "reboot"], "both").unwrap(),
            "reboot"
        );
        assert_eq!(opts.list("pv_list"), vec!["hdisk1", "hdisk2"]);
    }

    #[test]
    fn test_options_invalid_choice() {
        let set = AttributeSet::new().with("chtype", "later");
        let opts = Options::new(ObjectKind::Device, &set, &["chtype"]).unwrap();
        let err = opts.choice("chtype", &["both", "current"], "both").unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }

    #[test]
    fn test_not_found_requires_failure_and_marker() {
        let missing = CommandResult::failed(2, "3004-687 User \"bob\" does not exist.");
        assert!(not_found(&missing, &["3004-687"]));
        assert!(!not_found(&CommandResult::ok("3004-687"), &["3004-687"]));
        assert!(!not_found(&CommandResult::failed(1, "other"), &["3004-687"]));
    }
}
