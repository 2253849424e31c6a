//! Load-run accounting.

pub mod stats;
