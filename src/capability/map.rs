//! @acp:module "Capability Map"
//! @acp:summary "Whole-tree capability document for agents and scripts"
//! @acp:domain cli
//! @acp:layer service
//!
//! Built fresh from the command tree on every request; never persisted.
//! Serialization is deterministic: field order follows the struct layout and
//! child order follows declaration order.

use serde::{Deserialize, Serialize};

use super::Descriptor;
use crate::cli::tree::{chain_path, visible_flags, ArgSpec, CommandSpec, FlagSpec};
use crate::error::Result;
use crate::output::Render;

/// Names of framework pseudo-commands never listed
const PSEUDO_COMMANDS: [&str; 2] = ["help", "completion"];

/// Positional argument metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub required: bool,
    pub variadic: bool,
}

impl From<ArgSpec> for ArgInfo {
    fn from(arg: ArgSpec) -> Self {
        Self {
            name: arg.name,
            description: arg.help,
            kind: "string".to_string(),
            required: arg.required,
            variadic: arg.variadic,
        }
    }
}

/// Flag metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub short: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default: String,
    pub desc: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl From<&FlagSpec> for FlagInfo {
    fn from(flag: &FlagSpec) -> Self {
        Self {
            name: flag.long.to_string(),
            short: flag.short.map(String::from).unwrap_or_default(),
            kind: flag.kind.as_str().to_string(),
            default: flag.default.unwrap_or_default().to_string(),
            desc: flag.help.to_string(),
            required: flag.required,
            hidden: flag.hidden,
            choices: flag.choices.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// @acp:summary "One command in the capability map"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandNode {
    pub name: String,
    pub full_name: String,
    pub short: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Descriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<FlagInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_commands: Vec<CommandNode>,
}

/// @acp:summary "Complete command tree with descriptors"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityMap {
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Descriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<FlagInfo>,
    pub commands: Vec<CommandNode>,
}

/// Descriptor for the node at the end of `chain`, name defaulted to its path
pub fn descriptor_for(chain: &[&CommandSpec]) -> Option<Descriptor> {
    let node = chain.last()?;
    let mut descriptor = Descriptor::from_annotations(node.annotations.as_ref());
    if descriptor.name.is_empty() {
        descriptor.name = chain_path(chain);
    }
    Some(descriptor)
}

fn listed(node: &CommandSpec) -> bool {
    !node.hidden && !PSEUDO_COMMANDS.contains(&node.name)
}

fn flag_infos(chain: &[&CommandSpec]) -> Vec<FlagInfo> {
    visible_flags(chain)
        .into_iter()
        .filter(|f| f.long != "help")
        .map(FlagInfo::from)
        .collect()
}

/// @acp:summary "Build the capability map rooted at `root`"
pub fn build_capability_map(root: &CommandSpec, version: &str) -> CapabilityMap {
    let chain = vec![root];
    CapabilityMap {
        name: root.name.to_string(),
        version: format_version(version),
        description: root.about.to_string(),
        schema: descriptor_for(&chain),
        flags: flag_infos(&chain),
        commands: root
            .children
            .iter()
            .filter(|c| listed(c))
            .map(|c| build_node(&chain, c))
            .collect(),
    }
}

fn build_node<'a>(parents: &[&'a CommandSpec], node: &'a CommandSpec) -> CommandNode {
    let mut chain = parents.to_vec();
    chain.push(node);
    CommandNode {
        name: node.name.to_string(),
        full_name: chain_path(&chain),
        short: node.about.to_string(),
        schema: descriptor_for(&chain),
        args: node.args().into_iter().map(ArgInfo::from).collect(),
        flags: flag_infos(&chain),
        sub_commands: node
            .children
            .iter()
            .filter(|c| listed(c))
            .map(|c| build_node(&chain, c))
            .collect(),
    }
}

fn format_version(version: &str) -> String {
    let version = version.trim();
    if version.is_empty() {
        "unknown".to_string()
    } else if version.starts_with('v') {
        version.to_string()
    } else {
        format!("v{}", version)
    }
}

impl CapabilityMap {
    pub fn yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Find a node by full path, e.g. "pig pg stop"
    pub fn find(&self, full_name: &str) -> Option<&CommandNode> {
        fn walk<'n>(nodes: &'n [CommandNode], full_name: &str) -> Option<&'n CommandNode> {
            nodes.iter().find_map(|n| {
                if n.full_name == full_name {
                    Some(n)
                } else {
                    walk(&n.sub_commands, full_name)
                }
            })
        }
        walk(&self.commands, full_name)
    }

    /// Every node, depth first
    pub fn nodes(&self) -> Vec<&CommandNode> {
        fn walk<'n>(nodes: &'n [CommandNode], out: &mut Vec<&'n CommandNode>) {
            for n in nodes {
                out.push(n);
                walk(&n.sub_commands, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.commands, &mut out);
        out
    }
}

impl Render for CapabilityMap {
    fn text(&self) -> String {
        fn walk(nodes: &[CommandNode], depth: usize, out: &mut String) {
            for n in nodes {
                let tag = n
                    .schema
                    .as_ref()
                    .map(|s| format!("  [{}, risk={}, user={}]", s.kind, s.risk, s.os_user))
                    .unwrap_or_default();
                out.push_str(&format!("{}{:<12} {}{}\n", "  ".repeat(depth), n.name, n.short, tag));
                walk(&n.sub_commands, depth + 1, out);
            }
        }
        let mut out = format!("{} {}: {}\n", self.name, self.version, self.description);
        walk(&self.commands, 1, &mut out);
        out.trim_end().to_string()
    }
}

/// Subcommand listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCommandInfo {
    pub name: String,
    pub short: String,
}

/// @acp:summary "Full metadata for a single command, used by structured help"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSchema {
    pub name: String,
    #[serde(rename = "use")]
    pub usage: String,
    pub short: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub long: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub example: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Descriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<FlagInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_commands: Vec<SubCommandInfo>,
}

impl CommandSchema {
    /// Schema for the node at the end of `chain` (root first)
    pub fn from_chain(chain: &[&CommandSpec]) -> Option<Self> {
        let node = *chain.last()?;
        Some(Self {
            name: chain_path(chain),
            usage: node.usage.to_string(),
            short: node.about.to_string(),
            long: node.long_about.to_string(),
            example: node.example.trim().to_string(),
            schema: descriptor_for(chain),
            args: node.args().into_iter().map(ArgInfo::from).collect(),
            flags: flag_infos(chain),
            sub_commands: node
                .children
                .iter()
                .filter(|c| listed(c))
                .map(|c| SubCommandInfo {
                    name: c.name.to_string(),
                    short: c.about.to_string(),
                })
                .collect(),
        })
    }
}

impl Render for CommandSchema {
    fn text(&self) -> String {
        let mut out = format!("{}: {}\n", self.name, self.short);
        if let Some(s) = &self.schema {
            out.push_str(&format!(
                "  type={} risk={} confirm={} os_user={}\n",
                s.kind, s.risk, s.confirm, s.os_user
            ));
        }
        for sub in &self.sub_commands {
            out.push_str(&format!("  {:<12} {}\n", sub.name, sub.short));
        }
        out.trim_end().to_string()
    }
}
