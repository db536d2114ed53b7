//! Execution engine for sensuform
//!
//! The engine orchestrates:
//! 1. Discovery - One list call per kind, held in a [`context::ReconcileContext`]
//! 2. Diffing - Desired vs discovered attributes, shown before anything runs
//! 3. Executing - Confirmed, sequential apply with per-resource results

pub mod context;
pub mod differ;
pub mod executor;

pub use differ::display_diff;
pub use executor::execute;
