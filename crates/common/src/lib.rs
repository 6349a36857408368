//! Small utilities shared across all atendo crates.

pub mod util;

pub use util::{new_id, now_ms};
