//! `aixconf show`: the system's view of objects, as parsed facts

use anyhow::{Context as _, Result, bail};
use reconcile::{
    CommandExecutor, Layout, Listing, ObjectKind, ObservedState, SystemExecutor, parse_listing,
    parse_object,
};

use crate::Context;
use crate::cli::ShowArgs;
use crate::resource::{self, tunable};
use crate::ui;

pub fn run(ctx: &Context, args: ShowArgs) -> Result<()> {
    let name = args.name.as_deref();
    let Some((command, layout)) = resource::listing(args.kind, name) else {
        match args.kind {
            ObjectKind::Tunable => bail!(
                "Name a tunable component: {}",
                tunable::COMPONENTS.join(", ")
            ),
            ObjectKind::Volume => bail!("Name a logical volume to show"),
            kind => bail!("{kind} objects cannot be listed; use `aixconf diff` against a manifest"),
        }
    };

    let executor = SystemExecutor::new();
    let result = executor
        .execute_checked(&command)
        .with_context(|| format!("Failed to query {}", args.kind))?;
    let listing = collect(args.kind, name, &layout, &result.stdout)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if listing.is_empty() {
        match name {
            Some(name) => bail!("No {} named '{name}'", args.kind),
            None => {
                ui::info(&format!("No {} objects reported", args.kind));
                return Ok(());
            }
        }
    }

    for (identifier, facts) in &listing {
        ui::section(identifier);
        ui::facts(facts);
    }
    if !ctx.quiet && listing.len() > 1 {
        println!();
        ui::dim(&format!("{} {} object(s)", listing.len(), args.kind));
    }
    Ok(())
}

/// Parse query output into identifier → facts, keeping only `name` when given
fn collect(kind: ObjectKind, name: Option<&str>, layout: &Layout, stdout: &str) -> Result<Listing> {
    if layout.is_single() {
        let identifier = name.unwrap_or_default();
        return Ok(match parse_object(stdout, layout, identifier)? {
            ObservedState::Present(facts) => Listing::from([(identifier.to_string(), facts)]),
            ObservedState::Absent => Listing::new(),
        });
    }

    let mut listing = parse_listing(stdout, layout)?;
    // a tunable name selects the component, not one row
    if let Some(name) = name
        && kind != ObjectKind::Tunable
    {
        listing.retain(|identifier, _| identifier == name);
    }
    Ok(listing)
}
