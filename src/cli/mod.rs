//! CLI surface for the control operations in §4.8. `main` parses `Cli`,
//! wires a `ControlOps` against the configured store, and hands the parsed
//! command to `commands::run`.

pub mod commands;
pub mod output;
pub mod table;

pub use commands::{Cli, Commands, ScheduleCommands};
