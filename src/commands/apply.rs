//! `aixconf apply`: reconcile every selected manifest entry

use anyhow::{Context as _, Result, bail};
use dialoguer::Confirm;
use reconcile::{ReconcileOptions, Reconciler, SystemExecutor, Target};
use std::io::IsTerminal;

use super::{load_manifest, report, targets};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::schema::TargetFilter;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let manifest = load_manifest(args.file.as_deref())?;
    let filter = TargetFilter::parse(args.target.as_deref());
    let targets = targets(&manifest, &filter)?;

    if targets.is_empty() {
        if args.json {
            println!("[]");
        } else {
            ui::warn("Nothing in the manifest matches");
        }
        return Ok(());
    }

    let options = options(manifest.reconcile_options(), &args);

    if !options.dry_run && !args.yes && std::io::stdin().is_terminal() {
        let confirmed = Confirm::new()
            .with_prompt(format!("Apply {} object(s)?", targets.len()))
            .default(true)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            bail!("Apply cancelled");
        }
    }

    if !args.json && !ctx.quiet {
        ui::header("Applying Configuration");
        if options.dry_run {
            ui::warn("Dry run - no changes will be made");
        }
        if !options.verify {
            ui::dim("Verification after changes is off");
        }
        println!();
    }

    let executor = SystemExecutor::new();
    let reconciler = Reconciler::new(&executor)
        .with_benign(manifest.benign_table())
        .with_options(options);

    let selected: Vec<&dyn Target> = targets.iter().map(|t| t.as_ref() as &dyn Target).collect();
    let (outcomes, summary) = reconciler.reconcile_all(selected);
    log::info!(
        "apply: {} changed, {} unchanged, {} failed",
        summary.changed,
        summary.unchanged,
        summary.failed
    );

    report(ctx, &outcomes, &summary, args.json)
}

/// Manifest settings, overridden by the command line
fn options(settings: ReconcileOptions, args: &ApplyArgs) -> ReconcileOptions {
    ReconcileOptions {
        verify: settings.verify && !args.no_verify,
        dry_run: settings.dry_run || args.dry_run,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(dry_run: bool, no_verify: bool) -> ApplyArgs {
        ApplyArgs {
            target: None,
            file: None,
            dry_run,
            yes: false,
            no_verify,
            json: false,
        }
    }

    #[test]
    fn test_command_line_can_only_tighten_settings() {
        let settings = ReconcileOptions::default();

        let plain = options(settings.clone(), &args(false, false));
        assert!(plain.verify);
        assert!(!plain.dry_run);

        let overridden = options(settings, &args(true, true));
        assert!(!overridden.verify);
        assert!(overridden.dry_run);
    }

    #[test]
    fn test_manifest_dry_run_survives_command_line() {
        let settings = ReconcileOptions {
            verify: true,
            dry_run: true,
        };
        assert!(options(settings, &args(false, false)).dry_run);
    }
}
