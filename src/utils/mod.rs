//! The `utils` module provides the definitions shared across `popqueue`:
//! the error taxonomy surfaced to callers and the logging bootstrap.

pub mod error;
pub mod logging;
