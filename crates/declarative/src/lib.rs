//! # Declarative
//!
//! A framework for declarative reconciliation.
//!
//! This crate provides the core abstractions for comparing desired state
//! against discovered state and applying the difference in a single,
//! sequential pass per resource kind.
//!
//! ## Core Concepts
//!
//! - **Reconcile**: One pass over one kind, holding desired and discovered state
//! - **ResourceDiff**: A planned create, update or delete for one resource
//! - **PassPlan**: The diffs of one pass, optionally filtered by a [`Target`]
//! - **Executor**: Confirms, then applies every planned diff in order
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{ExecuteOptions, Reconcile, execute_simple, plan};
//!
//! let mut passes: Vec<Box<dyn Reconcile>> = vec![Box::new(my_pass)];
//! let plans = plan(&passes, None);
//! let summary = execute_simple(&mut passes, &plans, &ExecuteOptions::default())?;
//! println!("{} changes", summary.total_changes());
//! ```
//!
//! ## Callback Traits
//!
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks.

pub mod context;
pub mod diff;
pub mod executor;
pub mod planner;
pub mod reconcile;
pub mod types;

// Re-export main types at crate root
pub use context::{AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback};
pub use diff::{Action, AttributeChange, DiffSummary, ResourceDiff, group_by_kind};
pub use executor::{execute, execute_simple};
pub use planner::{PassPlan, Target, plan};
pub use reconcile::Reconcile;
pub use types::{ApplyResult, ExecuteOptions, ExecuteSummary};
