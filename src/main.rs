//! haswitch CLI entry point
//!
//! Parses arguments, dispatches to the CLI module and exits with its
//! status:
//! - 0: success (or a dry run)
//! - 1: refused before any mutation
//! - 2: a mutating step failed; manual recovery required

use haswitch::cli;

fn main() {
    match cli::run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}
