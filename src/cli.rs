use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use reconcile::{AttrValue, Intent, ObjectKind};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "aixconf")]
#[command(version)]
#[command(about = "Declarative configuration for AIX hosts", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Bring the host to the state the manifest declares
    Apply(ApplyArgs),

    /// Show what apply would change, without changing anything
    Diff(DiffArgs),

    /// Reconcile a single object described on the command line
    Run(RunArgs),

    /// Print what the system reports for objects of a kind
    Show(ShowArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Limit to a kind (`user`), one object (`user.alice`) or a name
    pub target: Option<String>,

    /// Manifest to apply instead of the default
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Report the commands that would run without running them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Skip the re-read after changes
    #[arg(long)]
    pub no_verify: bool,

    /// Print outcomes as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Limit to a kind (`user`), one object (`user.alice`) or a name
    pub target: Option<String>,

    /// Manifest to compare against instead of the default
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct RunArgs {
    /// Object kind (user, group, membership, device, mount, volume, filesystem, tunable, stanza, inittab)
    pub kind: ObjectKind,

    /// Object name (user name, mount point, device, tunable component, ...)
    pub name: String,

    /// present, absent or modify
    #[arg(short, long, default_value = "present")]
    pub state: Intent,

    /// Desired attribute, repeatable
    #[arg(short, long = "attr", value_name = "KEY=VALUE", value_parser = parse_pair)]
    pub attributes: Vec<(String, AttrValue)>,

    /// Adapter option, repeatable
    #[arg(short, long = "opt", value_name = "KEY=VALUE", value_parser = parse_pair)]
    pub options: Vec<(String, AttrValue)>,

    /// Manifest supplying benign rules and settings
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Report the commands that would run without running them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Skip the re-read after changes
    #[arg(long)]
    pub no_verify: bool,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Object kind
    pub kind: ObjectKind,

    /// Only this object
    pub name: Option<String>,

    /// Print facts as JSON
    #[arg(long)]
    pub json: bool,
}

/// `key=value`; integers and true/false are typed, everything else is a string
fn parse_pair(s: &str) -> Result<(String, AttrValue), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    let value = match value {
        "true" => AttrValue::Bool(true),
        "false" => AttrValue::Bool(false),
        v => v
            .parse::<i64>()
            .map_or_else(|_| AttrValue::Str(v.to_string()), AttrValue::Int),
    };
    Ok((key.to_string(), value))
}
