//! `--list-handlers`: show the handler types a config may use.

use colored::Colorize;

use crate::internal::handlers::HandlerRegistry;

pub fn execute(registry: &HandlerRegistry) {
    print!("{}", render(registry));
}

/// One `name  description` line per registered type, names in bold.
fn render(registry: &HandlerRegistry) -> String {
    registry
        .describe()
        .into_iter()
        .map(|(name, description)| format!("{} {description}\n", format!("{name:<10}").bold()))
        .collect()
}
