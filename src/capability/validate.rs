//! @acp:module "Descriptor Validation"
//! @acp:summary "Cross-field consistency checks over command descriptors"
//! @acp:domain cli
//! @acp:layer service
//!
//! Validation gates CI and the test suite; runtime trusts declared values.
//! Every check runs independently and every failure is reported.

use thiserror::Error;

use super::{Annotations, Confirm, Descriptor, Risk, DESCRIPTOR_KEYS};
use crate::capability::CommandType;
use crate::cli::tree::{chain_path, CommandSpec};

/// @acp:summary "A single invariant violation"
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("{path}: invalid {field} value {value:?}")]
    InvalidValue {
        path: String,
        field: &'static str,
        value: String,
    },

    #[error("{path}: cost must be >= 0, got {cost}")]
    NegativeCost { path: String, cost: i64 },

    #[error("{path}: query command must have risk safe or low, got {risk}")]
    QueryRisk { path: String, risk: String },

    #[error("{path}: risk {risk} needs confirm recommended or required, got {confirm}")]
    RiskNeedsConfirm {
        path: String,
        risk: String,
        confirm: String,
    },

    #[error("{path}: critical risk needs confirm required, got {confirm}")]
    CriticalNeedsRequired { path: String, confirm: String },

    #[error("{path}: descriptor name {name:?} does not match the command path")]
    NameMismatch { path: String, name: String },

    #[error("{path}: missing descriptor field {key:?}")]
    MissingField { path: String, key: &'static str },
}

/// @acp:summary "Check enum validity and the cross-field rules of one descriptor"
///
/// `path` only labels the violations.
pub fn validate_descriptor(path: &str, d: &Descriptor) -> Vec<Violation> {
    let mut out = Vec::new();
    let invalid = |field: &'static str, value: &str| Violation::InvalidValue {
        path: path.to_string(),
        field,
        value: value.to_string(),
    };

    if !d.kind.is_valid() {
        out.push(invalid("type", d.kind.as_str()));
    }
    if !d.volatility.is_valid() {
        out.push(invalid("volatility", d.volatility.as_str()));
    }
    if !d.parallel.is_valid() {
        out.push(invalid("parallel", d.parallel.as_str()));
    }
    if !d.risk.is_valid() {
        out.push(invalid("risk", d.risk.as_str()));
    }
    if !d.confirm.is_valid() {
        out.push(invalid("confirm", d.confirm.as_str()));
    }
    if !d.os_user.is_valid() {
        out.push(invalid("os_user", d.os_user.as_str()));
    }

    if d.cost < 0 {
        out.push(Violation::NegativeCost {
            path: path.to_string(),
            cost: d.cost,
        });
    }

    if d.kind == CommandType::Query && !matches!(d.risk, Risk::Safe | Risk::Low) {
        out.push(Violation::QueryRisk {
            path: path.to_string(),
            risk: d.risk.to_string(),
        });
    }

    if matches!(d.risk, Risk::High | Risk::Critical)
        && !matches!(d.confirm, Confirm::Recommended | Confirm::Required)
    {
        out.push(Violation::RiskNeedsConfirm {
            path: path.to_string(),
            risk: d.risk.to_string(),
            confirm: d.confirm.to_string(),
        });
    }

    if d.risk == Risk::Critical && d.confirm != Confirm::Required {
        out.push(Violation::CriticalNeedsRequired {
            path: path.to_string(),
            confirm: d.confirm.to_string(),
        });
    }

    out
}

/// @acp:summary "Check raw annotations declared on the node at `path`"
///
/// Executable nodes must declare all nine fields, groups at least `name`.
/// Raw values the typed form cannot hold (an unparseable cost or idempotent
/// flag) are reported here.
pub fn validate_annotations(path: &str, ann: Option<&Annotations>, executable: bool) -> Vec<Violation> {
    let mut out = Vec::new();
    let present = |key: &str| {
        ann.and_then(|a| a.get(key))
            .is_some_and(|v| !v.trim().is_empty())
    };

    let required: &[&'static str] = if executable { &DESCRIPTOR_KEYS } else { &["name"] };
    for &key in required {
        if !present(key) {
            out.push(Violation::MissingField {
                path: path.to_string(),
                key,
            });
        }
    }

    if let Some(a) = ann {
        if let Some(raw) = a.get("cost").filter(|v| !v.trim().is_empty()) {
            if raw.trim().parse::<i64>().is_err() {
                out.push(Violation::InvalidValue {
                    path: path.to_string(),
                    field: "cost",
                    value: raw.clone(),
                });
            }
        }
        if let Some(raw) = a.get("idempotent").filter(|v| !v.trim().is_empty()) {
            let normalized = raw.trim().to_ascii_lowercase();
            if !matches!(normalized.as_str(), "true" | "false" | "1" | "0") {
                out.push(Violation::InvalidValue {
                    path: path.to_string(),
                    field: "idempotent",
                    value: raw.clone(),
                });
            }
        }
        if let Some(name) = a.get("name").map(|n| n.trim()).filter(|n| !n.is_empty()) {
            if name != path {
                out.push(Violation::NameMismatch {
                    path: path.to_string(),
                    name: name.to_string(),
                });
            }
        }
    }

    out.extend(validate_descriptor(path, &Descriptor::from_annotations(ann)));
    out
}

/// @acp:summary "Validate every node of a command tree"
///
/// Hidden nodes are skipped, matching what the capability map exposes.
pub fn validate_tree(root: &CommandSpec) -> Vec<Violation> {
    fn walk<'a>(chain: &mut Vec<&'a CommandSpec>, out: &mut Vec<Violation>) {
        let Some(node) = chain.last().copied() else {
            return;
        };
        let path = chain_path(chain);
        out.extend(validate_annotations(
            &path,
            node.annotations.as_ref(),
            node.is_executable(),
        ));
        for child in node.children.iter().filter(|c| !c.hidden) {
            chain.push(child);
            walk(chain, out);
            chain.pop();
        }
    }

    let mut out = Vec::new();
    walk(&mut vec![root], &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ann;
    use crate::cli::tree::Invocation;

    fn noop(_: &Invocation<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn test_default_descriptor_is_valid() {
        assert!(validate_descriptor("pig", &Descriptor::default()).is_empty());
    }

    #[test]
    fn test_query_must_be_low_risk() {
        let a = ann("pig x", "query", "stable", "safe", true, "medium", "none", "current", 0);
        let v = validate_annotations("pig x", Some(&a), true);
        assert_eq!(
            v,
            vec![Violation::QueryRisk {
                path: "pig x".into(),
                risk: "medium".into()
            }]
        );
    }

    #[test]
    fn test_critical_collects_both_confirm_rules() {
        let a = ann("pig x", "action", "volatile", "unsafe", false, "critical", "none", "root", 0);
        let v = validate_annotations("pig x", Some(&a), true);
        assert_eq!(v.len(), 2);
        assert!(matches!(v[0], Violation::RiskNeedsConfirm { .. }));
        assert!(matches!(v[1], Violation::CriticalNeedsRequired { .. }));

        let a = ann("pig x", "action", "volatile", "unsafe", false, "critical", "recommended", "root", 0);
        let v = validate_annotations("pig x", Some(&a), true);
        assert_eq!(v.len(), 1);
        assert!(matches!(v[0], Violation::CriticalNeedsRequired { .. }));
    }

    #[test]
    fn test_all_failures_reported() {
        let mut a = ann("pig y", "group", "sometimes", "safe", true, "safe", "none", "admin", -1);
        a.insert("idempotent".into(), "maybe".into());
        let v = validate_annotations("pig x", Some(&a), true);
        let text: Vec<String> = v.iter().map(|e| e.to_string()).collect();
        assert!(text.contains(&r#"pig x: invalid idempotent value "maybe""#.to_string()), "{:?}", text);
        assert!(text.contains(&r#"pig x: descriptor name "pig y" does not match the command path"#.to_string()));
        assert!(text.contains(&r#"pig x: invalid type value "group""#.to_string()));
        assert!(text.contains(&r#"pig x: invalid volatility value "sometimes""#.to_string()));
        assert!(text.contains(&r#"pig x: invalid os_user value "admin""#.to_string()));
        assert!(text.contains(&"pig x: cost must be >= 0, got -1".to_string()));
    }

    #[test]
    fn test_unparseable_cost() {
        let mut a = ann("pig x", "query", "stable", "safe", true, "safe", "none", "current", 0);
        a.insert("cost".into(), "soon".into());
        let v = validate_annotations("pig x", Some(&a), true);
        assert_eq!(v.len(), 1);
        assert!(matches!(v[0], Violation::InvalidValue { field: "cost", .. }));
    }

    #[test]
    fn test_missing_fields() {
        let v = validate_annotations("pig x", None, true);
        assert_eq!(v.len(), 9);
        let v = validate_annotations("pig x", None, false);
        assert_eq!(
            v,
            vec![Violation::MissingField {
                path: "pig x".into(),
                key: "name"
            }]
        );
        let mut group = Annotations::new();
        group.insert("name".into(), "pig x".into());
        assert!(validate_annotations("pig x", Some(&group), false).is_empty());
    }

    #[test]
    fn test_validate_tree() {
        let mut group = Annotations::new();
        group.insert("name".into(), "pig".into());
        let root = CommandSpec::new("pig", "root")
            .ann(group)
            .child(
                CommandSpec::new("ok", "fine")
                    .ann(ann("pig ok", "query", "stable", "safe", true, "safe", "none", "current", 10))
                    .run(noop),
            )
            .child(CommandSpec::new("bad", "no annotations").run(noop))
            .child(CommandSpec::new("ghost", "hidden").hidden().run(noop));
        let v = validate_tree(&root);
        assert_eq!(v.len(), 9);
        assert!(v.iter().all(|e| e.to_string().starts_with("pig bad: missing")));
    }
}
