//! @acp:module "Command Tree"
//! @acp:summary "Declarative command nodes, converted to clap for parsing"
//! @acp:domain cli
//! @acp:layer model
//!
//! Commands are declared as plain [`CommandSpec`] values: a usage line,
//! descriptor annotations, flags, children and an optional handler. The same
//! tree drives argument parsing (via [`CommandSpec::to_clap`]), the capability
//! map, and the descriptor validator, so none of them depends on clap's
//! internal representation.

use std::sync::LazyLock;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use regex::Regex;

use crate::capability::Annotations;
use crate::config::Config;

/// Hint appended to text-mode help
pub const AGENT_HINT: &str = "For agent/machine consumption: -o json | -o yaml";

/// Leaf command handler
pub type Handler = fn(&Invocation<'_>) -> anyhow::Result<()>;

/// Value type of a flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    Bool,
    String,
    Int,
    StringList,
}

impl FlagKind {
    /// Type tag used in capability output
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagKind::Bool => "bool",
            FlagKind::String => "string",
            FlagKind::Int => "int",
            FlagKind::StringList => "strings",
        }
    }
}

/// @acp:summary "Flag declaration"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSpec {
    pub long: &'static str,
    pub short: Option<char>,
    pub help: &'static str,
    pub kind: FlagKind,
    pub default: Option<&'static str>,
    /// Advertised values; not enforced at parse time
    pub choices: Vec<&'static str>,
    pub aliases: Vec<&'static str>,
    /// Inherited by every descendant
    pub global: bool,
    pub hidden: bool,
    pub required: bool,
}

impl FlagSpec {
    fn new(long: &'static str, kind: FlagKind, help: &'static str) -> Self {
        Self {
            long,
            short: None,
            help,
            kind,
            default: None,
            choices: Vec::new(),
            aliases: Vec::new(),
            global: false,
            hidden: false,
            required: false,
        }
    }

    pub fn bool(long: &'static str, help: &'static str) -> Self {
        Self::new(long, FlagKind::Bool, help)
    }

    pub fn string(long: &'static str, help: &'static str) -> Self {
        Self::new(long, FlagKind::String, help)
    }

    pub fn int(long: &'static str, help: &'static str) -> Self {
        Self::new(long, FlagKind::Int, help)
    }

    pub fn list(long: &'static str, help: &'static str) -> Self {
        Self::new(long, FlagKind::StringList, help)
    }

    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    pub fn default(mut self, value: &'static str) -> Self {
        self.default = Some(value);
        self
    }

    pub fn choices(mut self, choices: &[&'static str]) -> Self {
        self.choices = choices.to_vec();
        self
    }

    pub fn alias(mut self, alias: &'static str) -> Self {
        self.aliases.push(alias);
        self
    }

    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// True when the flag consumes a value token
    pub fn takes_value(&self) -> bool {
        self.kind != FlagKind::Bool
    }

    fn to_clap(&self) -> Arg {
        let mut arg = Arg::new(self.long)
            .long(self.long)
            .help(self.help)
            .global(self.global)
            .hide(self.hidden)
            .required(self.required);
        if let Some(short) = self.short {
            arg = arg.short(short);
        }
        for alias in &self.aliases {
            arg = arg.visible_alias(*alias);
        }
        arg = match self.kind {
            FlagKind::Bool => arg.action(ArgAction::SetTrue),
            FlagKind::String => arg.action(ArgAction::Set),
            FlagKind::Int => arg.action(ArgAction::Set).value_parser(value_parser!(i64)),
            FlagKind::StringList => arg.action(ArgAction::Append).value_delimiter(','),
        };
        if let Some(default) = self.default {
            arg = arg.default_value(default);
        }
        arg
    }
}

/// Positional argument parsed from a usage line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: String,
    pub required: bool,
    pub variadic: bool,
    pub help: String,
}

/// `<required>` or `[optional]` positional in a usage line
static USAGE_ARG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^>]+)>|\[([^\]]+)\]").unwrap());

/// Parse positionals from a usage line such as `add <name...> [target]`
///
/// `<x>` is required, `[x]` optional, a `...` suffix marks it variadic. The
/// first word is the command name and is skipped.
pub fn parse_usage_args(usage: &str) -> Vec<ArgSpec> {
    let rest = match usage.trim().split_once(char::is_whitespace) {
        Some((_, rest)) => rest,
        None => return Vec::new(),
    };
    USAGE_ARG_PATTERN
        .captures_iter(rest)
        .filter_map(|caps| {
            let (raw, required) = match (caps.get(1), caps.get(2)) {
                (Some(m), _) => (m.as_str(), true),
                (None, Some(m)) => (m.as_str(), false),
                _ => return None,
            };
            let variadic = raw.ends_with("...");
            let name = raw.trim_end_matches("...").trim().to_string();
            (!name.is_empty()).then(|| ArgSpec {
                name,
                required,
                variadic,
                help: String::new(),
            })
        })
        .collect()
}

/// @acp:summary "One node of the command tree"
#[derive(Clone)]
pub struct CommandSpec {
    pub name: &'static str,
    /// Usage line: command name followed by positionals
    pub usage: &'static str,
    pub about: &'static str,
    pub long_about: &'static str,
    pub example: &'static str,
    pub aliases: Vec<&'static str>,
    pub annotations: Option<Annotations>,
    pub arg_help: Vec<(&'static str, &'static str)>,
    pub flags: Vec<FlagSpec>,
    pub children: Vec<CommandSpec>,
    pub handler: Option<Handler>,
    pub hidden: bool,
}

impl CommandSpec {
    /// New node from its usage line; the name is the first word
    pub fn new(usage: &'static str, about: &'static str) -> Self {
        let name = usage.split_whitespace().next().unwrap_or(usage);
        Self {
            name,
            usage,
            about,
            long_about: "",
            example: "",
            aliases: Vec::new(),
            annotations: None,
            arg_help: Vec::new(),
            flags: Vec::new(),
            children: Vec::new(),
            handler: None,
            hidden: false,
        }
    }

    pub fn long(mut self, long_about: &'static str) -> Self {
        self.long_about = long_about;
        self
    }

    pub fn example(mut self, example: &'static str) -> Self {
        self.example = example;
        self
    }

    pub fn alias(mut self, alias: &'static str) -> Self {
        self.aliases.push(alias);
        self
    }

    pub fn ann(mut self, annotations: Annotations) -> Self {
        self.annotations = Some(annotations);
        self
    }

    pub fn arg_help(mut self, arg: &'static str, help: &'static str) -> Self {
        self.arg_help.push((arg, help));
        self
    }

    pub fn flag(mut self, flag: FlagSpec) -> Self {
        self.flags.push(flag);
        self
    }

    pub fn flags(mut self, flags: Vec<FlagSpec>) -> Self {
        self.flags.extend(flags);
        self
    }

    pub fn child(mut self, child: CommandSpec) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: Vec<CommandSpec>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn run(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// True when the node has a handler
    pub fn is_executable(&self) -> bool {
        self.handler.is_some()
    }

    /// Positionals from the usage line, with their help text
    pub fn args(&self) -> Vec<ArgSpec> {
        parse_usage_args(self.usage)
            .into_iter()
            .map(|mut arg| {
                if let Some((_, help)) = self.arg_help.iter().find(|(n, _)| *n == arg.name) {
                    arg.help = help.to_string();
                }
                arg
            })
            .collect()
    }

    /// Child matching `token` by name or alias
    pub fn find_child(&self, token: &str) -> Option<&CommandSpec> {
        self.children
            .iter()
            .find(|c| c.name == token || c.aliases.contains(&token))
    }

    /// @acp:summary "Build the clap command for this subtree"
    pub fn to_clap(&self) -> Command {
        let mut cmd = Command::new(self.name)
            .about(self.about)
            .hide(self.hidden)
            .disable_help_subcommand(true)
            .after_help(AGENT_HINT);
        if !self.long_about.is_empty() {
            cmd = cmd.long_about(self.long_about);
        }
        if !self.example.is_empty() {
            cmd = cmd.after_long_help(format!("Examples:\n{}\n\n{}", self.example.trim_end(), AGENT_HINT));
        }
        for alias in &self.aliases {
            cmd = cmd.visible_alias(*alias);
        }
        for arg in self.args() {
            let mut positional = Arg::new(arg.name.clone())
                .value_name(arg.name.clone())
                .required(arg.required);
            if !arg.help.is_empty() {
                positional = positional.help(arg.help.clone());
            }
            positional = if arg.variadic {
                positional.num_args(1..).action(ArgAction::Append)
            } else {
                positional.action(ArgAction::Set)
            };
            cmd = cmd.arg(positional);
        }
        for flag in &self.flags {
            cmd = cmd.arg(flag.to_clap());
        }
        for child in &self.children {
            cmd = cmd.subcommand(child.to_clap());
        }
        cmd
    }

    /// Deepest matched node, its ancestors, and its matches
    ///
    /// The returned chain starts at `self` and ends at the matched node.
    pub fn resolve<'a>(&'a self, matches: &'a ArgMatches) -> (Vec<&'a CommandSpec>, &'a ArgMatches) {
        let mut chain = vec![self];
        let mut current = matches;
        let mut node = self;
        while let Some((name, sub)) = current.subcommand() {
            match node.find_child(name) {
                Some(child) => {
                    chain.push(child);
                    node = child;
                    current = sub;
                }
                None => break,
            }
        }
        (chain, current)
    }

    /// Walk raw tokens to the node they name, ignoring flags and flag values
    ///
    /// Used before parsing (e.g. for structured help), so it never fails: the
    /// walk stops at the first token that is not a child.
    pub fn locate<'a>(&'a self, tokens: &[String]) -> Vec<&'a CommandSpec> {
        let mut chain = vec![self];
        let mut skip_value = false;
        for token in tokens {
            if skip_value {
                skip_value = false;
                continue;
            }
            if token == "--" {
                break;
            }
            if token.starts_with('-') {
                skip_value = !token.contains('=') && value_flag(&chain, token);
                continue;
            }
            let node = chain[chain.len() - 1];
            match node.find_child(token) {
                Some(child) => chain.push(child),
                None => break,
            }
        }
        chain
    }
}

/// Full path of a node chain, e.g. "pig pg stop"
pub fn chain_path(chain: &[&CommandSpec]) -> String {
    chain.iter().map(|c| c.name).collect::<Vec<_>>().join(" ")
}

/// Flags visible at the end of `chain`: its own plus inherited globals
pub fn visible_flags<'a>(chain: &[&'a CommandSpec]) -> Vec<&'a FlagSpec> {
    let Some((last, ancestors)) = chain.split_last() else {
        return Vec::new();
    };
    let mut flags: Vec<&FlagSpec> = last.flags.iter().collect();
    for ancestor in ancestors.iter().rev() {
        for flag in ancestor.flags.iter().filter(|f| f.global) {
            if !flags.iter().any(|f| f.long == flag.long) {
                flags.push(flag);
            }
        }
    }
    flags
}

fn value_flag(chain: &[&CommandSpec], token: &str) -> bool {
    let flags = visible_flags(chain);
    if let Some(long) = token.strip_prefix("--") {
        return flags
            .iter()
            .any(|f| (f.long == long || f.aliases.contains(&long)) && f.takes_value());
    }
    let shorts: Vec<char> = token.trim_start_matches('-').chars().collect();
    // only a lone short flag (`-o`) consumes the next token
    if shorts.len() != 1 {
        return false;
    }
    flags
        .iter()
        .any(|f| f.short == Some(shorts[0]) && f.takes_value())
}

/// @acp:summary "Parsed invocation handed to a leaf handler"
pub struct Invocation<'a> {
    /// Full command path, e.g. "pig pg stop"
    pub path: String,
    /// Raw arguments, program name excluded
    pub args: &'a [String],
    pub matches: &'a ArgMatches,
    pub config: &'a Config,
}

impl<'a> Invocation<'a> {
    pub fn new(path: impl Into<String>, args: &'a [String], matches: &'a ArgMatches, config: &'a Config) -> Self {
        Self {
            path: path.into(),
            args,
            matches,
            config,
        }
    }

    /// Boolean flag value; false when undeclared
    pub fn flag(&self, id: &str) -> bool {
        matches!(self.matches.try_get_one::<bool>(id), Ok(Some(true)))
    }

    /// Single string value
    pub fn value(&self, id: &str) -> Option<String> {
        self.matches.try_get_one::<String>(id).ok().flatten().cloned()
    }

    /// All string values, for variadic positionals and list flags
    pub fn values(&self, id: &str) -> Vec<String> {
        match self.matches.try_get_many::<String>(id) {
            Ok(Some(values)) => values.cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn int(&self, id: &str) -> Option<i64> {
        self.matches.try_get_one::<i64>(id).ok().flatten().copied()
    }

    /// True when the user explicitly passed `id` (defaults do not count)
    pub fn provided(&self, id: &str) -> bool {
        matches!(
            self.matches.value_source(id),
            Some(clap::parser::ValueSource::CommandLine)
        )
    }
}
