//! Common utilities for usb-remote
//!
//! This crate provides the pieces shared between the server and client
//! binaries: error handling, logging setup, the synchronous external-command
//! runner, the poll-with-budget helper for waiting out kernel races, and the
//! listening-service state machine.

pub mod command;
pub mod error;
pub mod logging;
pub mod poll;
pub mod state;

pub use command::{CommandOutput, run_command, run_command_checked};
pub use error::{Error, Result};
pub use logging::setup_logging;
pub use poll::{PollBudget, poll_until};
pub use state::ServiceState;
