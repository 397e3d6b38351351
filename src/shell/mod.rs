//! Shell execution and process management module.
//!
//! This module runs client commands through the host shell and captures
//! their combined output for the reply.

mod executor;

pub use executor::{
    CommandResult, ExecError, ExecutorConfig, Outcome, ShellExecutor, TRUNCATION_MARKER,
};
