//! # Reconcile
//!
//! A declarative reconciliation engine for systems administered through
//! command-line tools.
//!
//! Each managed object is read with a query command, compared against the
//! attributes the caller wants, and changed only when they differ. Running
//! the same request twice is safe: the second run finds nothing to do.
//!
//! ## Core Concepts
//!
//! - **Synthesizer**: turns (identifier, mode, attributes) into argument vectors
//! - **Parser**: turns query output into fact tables, using a [`Layout`]
//! - **Comparator**: computes the minimal [`Diff`] between observed and desired
//! - **Reconciler**: drives read → diff → act → verify and reports an outcome
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{Reconciler, SystemExecutor};
//!
//! let executor = SystemExecutor::new();
//! let reconciler = Reconciler::new(&executor);
//! let outcome = reconciler.reconcile(&target);
//! if outcome.failed {
//!     eprintln!("{}", outcome.message);
//! }
//! ```
//!
//! ## Provider Traits
//!
//! - [`CommandExecutor`]: the only I/O boundary; swap in
//!   [`ScriptedExecutor`] to replay canned output
//! - [`Target`]: per-kind adapter supplying query, parse and synthesis
//! - [`CommandSynthesizer`]: the pure command-building half of a target

pub mod benign;
pub mod compare;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod parser;
pub mod synth;
pub mod types;

// Re-export main types at crate root
pub use benign::{BenignOutcome, BenignRule, BenignTable};
pub use compare::{Comparison, compare, values_equal};
pub use error::{Error, ErrorCategory, Result};
pub use executor::{CommandExecutor, ScriptedExecutor, SystemExecutor};
pub use orchestrator::{Action, Preview, Reconciler, Target};
pub use parser::{Column, Header, Layout, parse_listing, parse_object};
pub use synth::{CommandSynthesizer, Synthesis};
pub use types::{
    AttrValue, AttributeSet, CommandLine, CommandResult, Diff, DiffEntry, Facts, Intent, Listing,
    ManagedObject, Mode, ObjectKind, ObservedState, Phase, ReconcileOptions,
    ReconciliationOutcome, Summary, Vocabulary,
};
