//! Output formatting utilities for the CLI: every command renders either a
//! human-readable string or a JSON value from the same data, selected by the
//! global `--json` flag.

use serde::Serialize;

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Renders an error the same way regardless of `--json`, since a caller
/// scripting against this CLI needs a stable shape to check even on failure.
pub fn output_error(context: &str, error: &anyhow::Error, json_mode: bool) {
    if json_mode {
        let body = serde_json::json!({"error": error.to_string(), "context": context});
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{context}: {error:#}");
    }
}
