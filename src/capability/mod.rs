//! @acp:module "Capabilities"
//! @acp:summary "Per-command capability descriptors, validation, and the capability map"
//! @acp:domain cli
//! @acp:layer service
//!
//! Lets a script or agent learn, before invoking a command, whether it
//! mutates state, how risky it is, whether it needs confirmation and which
//! OS user it expects.

pub mod descriptor;
pub mod map;
pub mod validate;

pub use descriptor::{
    ann, merge, Annotations, CommandType, Confirm, Descriptor, OsUser, Parallel, Risk, Volatility,
    DESCRIPTOR_KEYS,
};
pub use map::{build_capability_map, CapabilityMap, CommandNode, CommandSchema};
pub use validate::{validate_annotations, validate_descriptor, validate_tree, Violation};
