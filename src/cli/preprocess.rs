//! @acp:module "Argument Preprocessing"
//! @acp:summary "Pure passes over raw arguments, run before parsing"
//! @acp:domain cli
//! @acp:layer utility
//!
//! The parser renders help and exits as soon as it sees `--help`, and a
//! parse failure happens before any flag is read. Both passes here let the
//! requested output format take effect anyway.

use crate::config::OutputFormat;

const OUTPUT_LONG: &str = "--output";
const OUTPUT_SHORT: &str = "-o";

fn is_help_flag(token: &str) -> bool {
    token == "--help" || token == "-h"
}

/// Number of tokens an output flag occupies at `args[i]`, 0 when not one
fn output_flag_width(args: &[String], i: usize) -> usize {
    let token = args[i].as_str();
    if token == OUTPUT_LONG || token == OUTPUT_SHORT {
        return if i + 1 < args.len() { 2 } else { 1 };
    }
    let attached = token
        .strip_prefix(OUTPUT_LONG)
        .is_some_and(|rest| rest.starts_with('='))
        || (token.starts_with(OUTPUT_SHORT) && !token.starts_with("--") && token.len() > 2);
    usize::from(attached)
}

/// Value carried by the output flag at `args[i]`
fn output_flag_value(args: &[String], i: usize) -> Option<&str> {
    let token = args[i].as_str();
    if token == OUTPUT_LONG || token == OUTPUT_SHORT {
        return args.get(i + 1).map(String::as_str);
    }
    if let Some(rest) = token.strip_prefix(OUTPUT_LONG) {
        return rest.strip_prefix('=');
    }
    token
        .strip_prefix(OUTPUT_SHORT)
        .map(|rest| rest.strip_prefix('=').unwrap_or(rest))
}

/// @acp:summary "Move a trailing output flag in front of the help flag"
///
/// Returns the arguments unchanged when there is no help flag, when help is
/// the first token, or when an output flag already precedes it. Otherwise
/// every output flag after help (with its value token) moves to just before
/// it; other tokens keep their relative order.
pub fn reorder_output_before_help(args: &[String]) -> Vec<String> {
    let end = args.iter().position(|a| a == "--").unwrap_or(args.len());
    let Some(help) = args[..end].iter().position(|a| is_help_flag(a)) else {
        return args.to_vec();
    };
    if help == 0 {
        return args.to_vec();
    }
    if (0..help).any(|i| output_flag_width(args, i) > 0) {
        return args.to_vec();
    }

    let mut moved = Vec::new();
    let mut rest = Vec::new();
    let mut i = help + 1;
    while i < end {
        match output_flag_width(args, i) {
            0 => {
                rest.push(args[i].clone());
                i += 1;
            }
            width => {
                moved.extend_from_slice(&args[i..i + width]);
                i += width;
            }
        }
    }
    if moved.is_empty() {
        return args.to_vec();
    }

    let mut out = Vec::with_capacity(args.len());
    out.extend_from_slice(&args[..help]);
    out.extend(moved);
    out.push(args[help].clone());
    out.extend(rest);
    out.extend_from_slice(&args[end..]);
    out
}

/// Raw value of the last output flag, if any
pub fn detect_output_value(args: &[String]) -> Option<String> {
    let end = args.iter().position(|a| a == "--").unwrap_or(args.len());
    let mut found = None;
    let mut i = 0;
    while i < end {
        match output_flag_width(args, i) {
            0 => i += 1,
            width => {
                if let Some(value) = output_flag_value(args, i) {
                    found = Some(value.to_string());
                }
                i += width;
            }
        }
    }
    found
}

/// @acp:summary "Requested output format, without full argument parsing"
///
/// The last output flag wins; anything unrecognized (or no flag) is text.
pub fn detect_output_format(args: &[String]) -> OutputFormat {
    detect_output_value(args)
        .map(|v| OutputFormat::parse_lenient(&v))
        .unwrap_or_default()
}

/// True when the arguments ask for yaml, json or json-pretty
pub fn is_structured_output_requested(args: &[String]) -> bool {
    detect_output_format(args).is_structured()
}

/// True when a help flag appears before any `--`
pub fn has_help_flag(args: &[String]) -> bool {
    args.iter()
        .take_while(|a| a.as_str() != "--")
        .any(|a| is_help_flag(a))
}
