//! Subcommand implementations
//!
//! - `apply` - make the host match the manifest
//! - `diff` - preview what apply would change
//! - `run` - reconcile one object given on the command line
//! - `show` - print what the system reports

pub mod apply;
pub mod diff;
pub mod run;
pub mod show;

use anyhow::{Context as _, Result, bail};
use reconcile::{ReconciliationOutcome, Summary, Target};
use std::path::Path;

use crate::Context;
use crate::paths;
use crate::resource;
use crate::schema::{Manifest, TargetFilter};
use crate::ui;

/// Load the manifest named by `--file`, the environment, or the config dir
pub fn load_manifest(file: Option<&Path>) -> Result<Manifest> {
    let path = paths::manifest(file)?;
    if !path.exists() {
        bail!(
            "No manifest at {} (pass --file or set {})",
            path.display(),
            paths::ENV_MANIFEST
        );
    }
    Manifest::load(&path)
}

/// Adapters for the selected entries, in apply order
pub fn targets(manifest: &Manifest, filter: &TargetFilter) -> Result<Vec<Box<dyn Target>>> {
    manifest
        .select(filter)
        .into_iter()
        .map(|(kind, entry)| {
            resource::build(kind, entry)
                .with_context(|| format!("Invalid {kind} entry '{}'", entry.name))
        })
        .collect()
}

/// Print outcomes and fail when any object failed
pub fn report(
    ctx: &Context,
    outcomes: &[ReconciliationOutcome],
    summary: &Summary,
    json: bool,
) -> Result<()> {
    if json {
        ui::json(outcomes)?;
    } else {
        for outcome in outcomes {
            if ctx.quiet && !outcome.changed && !outcome.failed {
                continue;
            }
            ui::outcome(outcome, ctx.verbose > 0);
        }
        if !ctx.quiet {
            ui::summary(summary);
        }
    }

    if !summary.is_success() {
        bail!(
            "{} of {} object(s) failed",
            summary.failed,
            summary.total()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile::{CommandSynthesizer, ObjectKind};
    use std::io::Write;

    const MANIFEST: &str = r#"
[[group]]
name = "dba"
attributes = { id = 300 }

[[user]]
name = "alice"
attributes = { pgrp = "dba" }

[[user]]
name = "bob"
state = "absent"

[[tunable]]
name = "vmo"
attributes = { maxfree = 1088 }
"#;

    #[test]
    fn test_targets_follow_apply_order() {
        let manifest: Manifest = toml::from_str(MANIFEST).unwrap();
        let targets = targets(&manifest, &TargetFilter::default()).unwrap();

        let objects: Vec<String> = targets.iter().map(|t| t.object().to_string()).collect();
        assert_eq!(
            objects,
            vec!["group 'dba'", "user 'alice'", "user 'bob'", "tunable 'vmo'"]
        );
    }

    #[test]
    fn test_targets_respect_filter() {
        let manifest: Manifest = toml::from_str(MANIFEST).unwrap();

        let users = targets(&manifest, &TargetFilter::parse(Some("user"))).unwrap();
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|t| t.kind() == ObjectKind::User));

        let bob = targets(&manifest, &TargetFilter::parse(Some("user.bob"))).unwrap();
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].identifier(), "bob");
    }

    #[test]
    fn test_invalid_entry_names_the_object() {
        let manifest: Manifest =
            toml::from_str("[[tunable]]\nname = \"vmo\"\noptions = { change_type = \"later\" }\n")
                .unwrap();

        let err = targets(&manifest, &TargetFilter::default()).err().unwrap();
        assert!(err.to_string().contains("tunable entry 'vmo'"));
    }

    #[test]
    fn test_load_manifest_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();

        let manifest = load_manifest(Some(file.path())).unwrap();
        assert_eq!(manifest.len(), 4);
    }

    #[test]
    fn test_load_manifest_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_manifest(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(err.to_string().contains("No manifest at"));
    }
}
