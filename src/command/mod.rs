//! Command implementations invoked by the CLI.

pub mod list;
pub mod run;
