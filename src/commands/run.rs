//! `aixconf run`: one object, described entirely by arguments
//!
//! Benign-failure rules and settings still come from the manifest when one
//! is named with `--file` or found at the default location.

use anyhow::{Context as _, Result, bail};
use reconcile::{BenignTable, ReconcileOptions, Reconciler, Summary, SystemExecutor};
use std::path::Path;

use super::{load_manifest, report};
use crate::Context;
use crate::cli::RunArgs;
use crate::paths;
use crate::resource;
use crate::schema::Entry;
use crate::ui;

pub fn run(ctx: &Context, args: RunArgs) -> Result<()> {
    let entry = entry(&args);
    let target = resource::build(args.kind, &entry)
        .with_context(|| format!("Invalid {} '{}'", args.kind, args.name))?;

    let (benign, settings) = manifest_settings(args.file.as_deref())?;
    let executor = SystemExecutor::new();
    let reconciler = Reconciler::new(&executor)
        .with_benign(benign)
        .with_options(options(settings, &args));
    let outcome = reconciler.reconcile(target.as_ref());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ui::Record::from(&outcome))?);
        if outcome.failed {
            bail!("{}", outcome.message);
        }
        return Ok(());
    }

    let mut summary = Summary::default();
    summary.add(&outcome);
    report(ctx, &[outcome], &summary, false)
}

/// Benign rules and settings of the manifest, or the built-ins without one
fn manifest_settings(file: Option<&Path>) -> Result<(BenignTable, ReconcileOptions)> {
    if file.is_none() && !paths::manifest(None).is_ok_and(|path| path.exists()) {
        log::debug!("run: no manifest, using built-in benign rules");
        return Ok((BenignTable::aix(), ReconcileOptions::default()));
    }
    let manifest = load_manifest(file)?;
    Ok((manifest.benign_table(), manifest.reconcile_options()))
}

/// Manifest settings, overridden by the command line
fn options(settings: ReconcileOptions, args: &RunArgs) -> ReconcileOptions {
    ReconcileOptions {
        verify: settings.verify && !args.no_verify,
        dry_run: settings.dry_run || args.dry_run,
    }
}

fn entry(args: &RunArgs) -> Entry {
    let entry = Entry::new(&args.name, args.state);
    let entry = args
        .attributes
        .iter()
        .fold(entry, |e, (k, v)| e.attribute(k, v.clone()));
    args.options
        .iter()
        .fold(entry, |e, (k, v)| e.option(k, v.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;
    use reconcile::{AttrValue, Intent};
    use std::io::Write;

    fn run_args(argv: &[&str]) -> RunArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Run(args) => args,
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_entry_from_arguments() {
        let args = run_args(&[
            "aixconf", "run", "user", "alice", "-a", "home=/home/alice", "-a", "id=204", "-o",
            "change_passwd_on_login=true",
        ]);
        let entry = entry(&args);

        assert_eq!(entry.name, "alice");
        assert_eq!(entry.state, Intent::Present);
        assert_eq!(entry.attributes.get("id"), Some(&AttrValue::Int(204)));
        assert_eq!(
            entry.attributes.get("home"),
            Some(&AttrValue::Str("/home/alice".into()))
        );
        assert_eq!(
            entry.options.get("change_passwd_on_login"),
            Some(&AttrValue::Bool(true))
        );
    }

    #[test]
    fn test_later_attribute_wins() {
        let args = run_args(&["aixconf", "run", "group", "dba", "-a", "id=300", "-a", "id=301"]);
        assert_eq!(entry(&args).attributes.get("id"), Some(&AttrValue::Int(301)));
    }

    #[test]
    fn test_arguments_build_an_adapter() {
        let args = run_args(&[
            "aixconf", "run", "mount", "/data", "-a", "device=/dev/datalv", "-o", "read_only=true",
        ]);
        assert!(resource::build(args.kind, &entry(&args)).is_ok());
    }

    #[test]
    fn test_no_verify_turns_off_reread() {
        let args = run_args(&["aixconf", "run", "group", "dba", "--no-verify", "-n"]);
        let overridden = options(ReconcileOptions::default(), &args);

        assert!(!overridden.verify);
        assert!(overridden.dry_run);
        let plain = run_args(&["aixconf", "run", "group", "dba"]);
        assert!(options(ReconcileOptions::default(), &plain).verify);
    }

    #[test]
    fn test_named_manifest_supplies_benign_rules() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            "[settings]\nverify = false\n\n[[benign]]\nkind = \"device\"\npattern = \"0514-062\"\noutcome = \"already_absent\"\n"
        )
        .unwrap();

        let (benign, settings) = manifest_settings(Some(file.path())).unwrap();

        assert_eq!(benign.rules().len(), BenignTable::aix().rules().len() + 1);
        assert!(!settings.verify);
    }

    #[test]
    fn test_named_manifest_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(manifest_settings(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
