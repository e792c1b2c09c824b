//! Hookcast: dispatch coding-agent hook events to notification handlers.

pub mod cli;
pub mod command;
pub mod internal;
