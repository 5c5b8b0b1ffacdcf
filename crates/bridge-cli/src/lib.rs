//! Command-line and environment configuration for the claude bridge binary.
//!
//! Every flag has an environment-variable fallback so the service can be
//! configured entirely from a process manager or container environment.

pub mod cli_args;
pub mod cli_types;
pub mod validation;

pub use cli_args::Cli;
pub use cli_types::*;
pub use validation::*;
