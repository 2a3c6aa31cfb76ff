//! Output handling for CLI
//!
//! stdout carries only the result (text summary or one JSON object);
//! logs go to stderr.

use std::io::{self, Write};

use serde::Serialize;

use super::errors::CliResult;

/// Write a text block to stdout
pub fn write_text(text: &str) -> CliResult<()> {
    let mut stdout = io::stdout();
    write!(stdout, "{}", text)?;
    if !text.ends_with('\n') {
        writeln!(stdout)?;
    }
    stdout.flush()?;
    Ok(())
}

/// Write a value as a single JSON object to stdout
pub fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}
