//! @acp:module "CLI"
//! @acp:summary "Declarative command tree, argument preprocessing and the process boundary"
//! @acp:domain cli
//! @acp:layer api

pub mod preprocess;
pub mod runner;
pub mod tree;

pub use runner::{emit_structured_execution_error, run, should_log_execution_error};
pub use tree::{CommandSpec, FlagSpec, Invocation};
