#![forbid(unsafe_code)]

//! @acp:module "pig Library"
//! @acp:summary "PostgreSQL operations CLI with agent-native command capabilities"
//! @acp:domain cli
//! @acp:layer api
//! @acp:stability stable
//!
//! # pig
//!
//! Manage PostgreSQL extensions and repositories, operate local PostgreSQL,
//! Patroni and pgBackRest, and drive Pigsty playbooks.
//!
//! ## Features
//!
//! - **Capability descriptors**: every command declares its type, risk,
//!   confirmation level and expected OS user
//! - **Structured output**: `-o yaml|json|json-pretty` on any command yields
//!   exactly one result or plan document
//! - **Stable status codes**: six-digit `MMCCNN` codes mapped to exit statuses
//! - **Plans**: `--plan` previews dangerous operations without running them
//!
//! ## Example
//!
//! ```rust,no_run
//! use pig::capability::build_capability_map;
//!
//! let map = build_capability_map(&pig::commands::root(), pig::VERSION);
//! println!("{}", map.yaml()?);
//! # Ok::<(), pig::PigError>(())
//! ```

pub mod bridge;
pub mod capability;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod output;

// Re-exports
pub use capability::{build_capability_map, CapabilityMap, CommandSchema, Descriptor};
pub use config::{Config, OutputFormat};
pub use error::{ExitCodeError, PigError, Result};
pub use output::{CommandResult, Plan};

/// Crate version, reported by `pig version` and the capability map
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
