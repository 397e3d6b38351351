//! Utility modules for common functionality.
//!
//! Currently only logging setup.

pub mod logger;
