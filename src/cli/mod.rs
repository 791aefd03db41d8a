//! Command-line interface for doctext.

mod commands;
pub mod icons;

pub use commands::{is_verbose, run};
