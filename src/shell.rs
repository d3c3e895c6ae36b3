//! Shell command execution
//!
//! Commands are validated (module loads, environment activation, presteps) by running them in
//! a real shell before they're written into a job script.

/// A long-lived shell process that runs one line at a time
pub mod session;

/// Single commands and chains of commands
pub mod command;
