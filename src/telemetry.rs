use std::fs::OpenOptions;
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use tracing::Level;

use crate::error::AppResult;

/// Parse a level name, accepting the usual spellings (`warn`, `WARN`, `3`).
pub fn parse_level(raw: &str) -> AppResult<Level> {
    Level::from_str(raw.trim()).map_err(|_| format!("unknown log level '{raw}'").into())
}

/// Route tracing events to `log_file`. Without a file nothing is installed
/// and events are dropped; the terminal is busy drawing.
pub fn init(log_file: Option<&Path>, level: &str) -> AppResult<()> {
    let Some(path) = log_file else {
        return Ok(());
    };
    let level = parse_level(level)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("cannot open log file {}: {e}", path.display()))?;

    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_max_level(level)
        .with_target(true)
        .try_init()
        .map_err(|e| format!("tracing subscriber already set: {e}"))?;

    tracing::info!(path = %path.display(), %level, "logging started");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_parse() {
        assert_eq!(parse_level("debug").expect("debug"), Level::DEBUG);
        assert_eq!(parse_level(" WARN ").expect("warn"), Level::WARN);
        assert!(parse_level("loud").is_err());
    }

    #[test]
    fn no_file_is_a_no_op() {
        init(None, "not-even-checked").expect("nothing to install");
    }
}
