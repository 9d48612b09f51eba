//! `aixconf diff`: read and compare, never act

use anyhow::{Result, bail};
use reconcile::{CommandSynthesizer, ObjectKind, Reconciler, SystemExecutor, Target};

use super::{load_manifest, targets};
use crate::Context;
use crate::cli::DiffArgs;
use crate::schema::TargetFilter;
use crate::ui;

pub fn run(ctx: &Context, args: DiffArgs) -> Result<()> {
    ui::header("Configuration Diff");

    let manifest = load_manifest(args.file.as_deref())?;
    let filter = TargetFilter::parse(args.target.as_deref());
    let targets = targets(&manifest, &filter)?;

    let executor = SystemExecutor::new();
    let reconciler = Reconciler::new(&executor).with_benign(manifest.benign_table());

    let mut changes = 0;
    let mut unreadable = 0;
    let mut kind: Option<ObjectKind> = None;

    for target in &targets {
        if kind != Some(target.kind()) {
            kind = Some(target.kind());
            ui::section(target.kind().as_str());
        }
        match reconciler.preview(target.as_ref()) {
            Ok(preview) => {
                if preview.has_changes() {
                    changes += 1;
                } else if ctx.quiet {
                    continue;
                }
                ui::preview(&preview);
            }
            Err(e) => {
                unreadable += 1;
                ui::error(&format!("{}: {}", target.object(), e.diagnostic()));
            }
        }
    }

    println!();
    if unreadable > 0 {
        bail!("{unreadable} object(s) could not be compared");
    }
    if changes == 0 {
        ui::success("No changes - current state matches desired state");
    } else {
        ui::info(&format!("{changes} object(s) would change"));
    }
    Ok(())
}
