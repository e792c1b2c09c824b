//! Internal layer exports for the hook pipeline and the handler adapters.

pub mod handlers;
pub mod hooks;
