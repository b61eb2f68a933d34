pub mod commands;
pub mod render;

use std::io::{BufRead, Write};

/// Prompt and read one line from stdin. `None` once stdin is closed.
pub fn readline() -> Result<Option<String>, String> {
    write!(std::io::stdout(), "> ").map_err(|e| e.to_string())?;
    std::io::stdout().flush().map_err(|e| e.to_string())?;
    read_line_from(&mut std::io::stdin().lock())
}

/// Read one line from `reader`, or `None` at end of input.
pub fn read_line_from<R: BufRead>(reader: &mut R) -> Result<Option<String>, String> {
    let mut buffer = String::new();
    let read = reader.read_line(&mut buffer).map_err(|e| e.to_string())?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(buffer))
}
