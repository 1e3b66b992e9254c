//! Dynamic membership resolution.
//!
//! [`evaluator`] is the pure rule engine; [`materializer`] decides when it
//! runs and writes its output onto a group inside the caller's transaction.

pub mod evaluator;
pub mod materializer;

pub use evaluator::{evaluate, matches};
pub use materializer::{load_population, materialize, replace_members, triggers_on_create, triggers_on_update};
