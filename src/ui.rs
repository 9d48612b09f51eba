use colored::Colorize;
use reconcile::{Action, Diff, Facts, Mode, Preview, ReconciliationOutcome, Summary};
use serde::Serialize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Reconciliation Output
// ============================================================================

/// One line per outcome, with the commands that ran underneath
pub fn outcome(outcome: &ReconciliationOutcome, verbose: bool) {
    let object = outcome.object.to_string();
    if outcome.failed {
        error(&format!("{object}: {}", outcome.message));
    } else if outcome.changed {
        println!("{} {}: {}", "~".yellow(), object, outcome.message);
    } else {
        println!("{} {}: {}", "✓".green(), object, outcome.message.dimmed());
    }

    if outcome.changed || outcome.failed || verbose {
        for command in &outcome.commands {
            dim(&format!("$ {command}"));
        }
    }
}

pub fn summary(summary: &Summary) {
    println!();
    let line = format!(
        "{} changed, {} unchanged, {} failed",
        summary.changed, summary.unchanged, summary.failed
    );
    if summary.is_success() {
        success(&line);
    } else {
        error(&line);
    }
}

/// Attribute changes as `name: observed → desired`
pub fn diff(diff: &Diff) {
    for (name, entry) in diff.iter() {
        let observed = entry.observed.as_deref().unwrap_or("(unset)");
        println!(
            "    {} {}: {} → {}",
            "~".yellow(),
            name,
            observed.red(),
            entry.desired.to_string().green()
        );
    }
}

pub fn preview(preview: &Preview) {
    match &preview.action {
        Action::Refuse { message } => {
            println!("  {} {}: {}", "!".red(), preview.object, message);
        }
        Action::Noop { .. } => println!("  {} {}", "✓".green(), preview.object),
        Action::Act { mode, .. } => {
            let marker = match mode {
                Mode::Create => "+".green(),
                Mode::Delete => "-".red(),
                _ => "~".yellow(),
            };
            println!("  {} {}", marker, preview.object);
            diff(&preview.diff);
            for command in &preview.commands {
                dim(&format!("  $ {command}"));
            }
        }
    }
}

/// Facts of one object, one per line
pub fn facts(facts: &Facts) {
    for (key, value) in facts {
        kv(key, value);
    }
}

// ============================================================================
// JSON Records
// ============================================================================

/// Machine-readable view of one outcome
#[derive(Debug, Serialize)]
pub struct Record<'a> {
    pub kind: &'static str,
    pub name: &'a str,
    pub changed: bool,
    pub failed: bool,
    pub msg: &'a str,
    pub rc: Option<i32>,
    pub stdout: &'a str,
    pub stderr: &'a str,
    pub cmd: &'a [String],
}

impl<'a> From<&'a ReconciliationOutcome> for Record<'a> {
    fn from(outcome: &'a ReconciliationOutcome) -> Self {
        let detail = outcome.detail.as_ref();
        Self {
            kind: outcome.object.kind.as_str(),
            name: &outcome.object.identifier,
            changed: outcome.changed,
            failed: outcome.failed,
            msg: &outcome.message,
            rc: detail.map(|d| d.exit_code),
            stdout: detail.map_or("", |d| d.stdout.as_str()),
            stderr: detail.map_or("", |d| d.stderr.as_str()),
            cmd: &outcome.commands,
        }
    }
}

/// Print outcomes as a JSON array
pub fn json(outcomes: &[ReconciliationOutcome]) -> anyhow::Result<()> {
    let records: Vec<Record<'_>> = outcomes.iter().map(Record::from).collect();
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
