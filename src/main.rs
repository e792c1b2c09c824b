//! This is the main entry point for hookcast.

use hookcast::cli;

fn main() {
    let code = match cli::parse(None) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("hookcast: {e}");
            1
        }
    };
    std::process::exit(code);
}
