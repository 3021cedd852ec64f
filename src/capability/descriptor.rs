//! @acp:module "Capability Descriptor"
//! @acp:summary "Nine-field risk/safety/privilege record attached to each command"
//! @acp:domain cli
//! @acp:layer model
//!
//! Authors declare descriptors as loose string maps ([`Annotations`]) so partial
//! declarations compose cheaply. Everything downstream reads the typed
//! [`Descriptor`], built by [`Descriptor::from_annotations`], which never fails:
//! missing or empty fields take defaults and unrecognized enum values are kept
//! verbatim for the validator to report.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Untyped descriptor as declared on a command node
pub type Annotations = BTreeMap<String, String>;

/// The nine descriptor keys, in serialization order
pub const DESCRIPTOR_KEYS: [&str; 9] = [
    "name",
    "type",
    "volatility",
    "parallel",
    "idempotent",
    "risk",
    "confirm",
    "os_user",
    "cost",
];

/// Defines a closed vocabulary that still preserves unrecognized raw values
macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            /// Raw value outside the vocabulary
            Unrecognized(String),
        }

        impl $name {
            /// Every valid value, in declaration order
            pub const VALUES: &'static [&'static str] = &[$($text),+];

            /// Case-insensitive parse; unknown text is kept as `Unrecognized`
            pub fn parse(raw: &str) -> Self {
                match raw.trim().to_ascii_lowercase().as_str() {
                    $($text => Self::$variant,)+
                    _ => Self::Unrecognized(raw.trim().to_string()),
                }
            }

            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $text,)+
                    Self::Unrecognized(raw) => raw.as_str(),
                }
            }

            pub fn is_valid(&self) -> bool {
                !matches!(self, Self::Unrecognized(_))
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self::parse(&raw)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.as_str().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

vocabulary! {
    /// Whether a command only reads or may mutate state
    CommandType { Query => "query", Action => "action" }
}

vocabulary! {
    /// How often behavior/output changes across runs
    Volatility { Immutable => "immutable", Stable => "stable", Volatile => "volatile" }
}

vocabulary! {
    /// Whether concurrent execution is allowed
    Parallel { Safe => "safe", Restricted => "restricted", Unsafe => "unsafe" }
}

vocabulary! {
    /// Blast radius of a mistaken invocation
    Risk { Safe => "safe", Low => "low", Medium => "medium", High => "high", Critical => "critical" }
}

vocabulary! {
    /// Whether interactive confirmation should gate execution
    Confirm { None => "none", Recommended => "recommended", Required => "required" }
}

vocabulary! {
    /// Privilege context the command expects
    OsUser { Current => "current", Root => "root", Dbsu => "dbsu" }
}

/// @acp:summary "Typed capability descriptor"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Canonical command path, e.g. "pig ext add"
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CommandType,
    pub volatility: Volatility,
    pub parallel: Parallel,
    pub idempotent: bool,
    pub risk: Risk,
    pub confirm: Confirm,
    pub os_user: OsUser,
    /// Expected execution cost in milliseconds
    pub cost: i64,
}

impl Default for Descriptor {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: CommandType::Query,
            volatility: Volatility::Stable,
            parallel: Parallel::Safe,
            idempotent: false,
            risk: Risk::Safe,
            confirm: Confirm::None,
            os_user: OsUser::Current,
            cost: 0,
        }
    }
}

impl Descriptor {
    /// @acp:summary "Build a descriptor from declared annotations"
    ///
    /// `None` or an empty map yields the default descriptor. Missing or blank
    /// fields take their default; an unparseable cost keeps the default 0 while
    /// a negative one is preserved for the validator.
    pub fn from_annotations(annotations: Option<&Annotations>) -> Self {
        let mut d = Self::default();
        let Some(ann) = annotations else {
            return d;
        };
        let field = |key: &str| ann.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(v) = field("name") {
            d.name = v.to_string();
        }
        if let Some(v) = field("type") {
            d.kind = CommandType::parse(v);
        }
        if let Some(v) = field("volatility") {
            d.volatility = Volatility::parse(v);
        }
        if let Some(v) = field("parallel") {
            d.parallel = Parallel::parse(v);
        }
        if let Some(v) = field("idempotent") {
            d.idempotent = parse_bool(v);
        }
        if let Some(v) = field("risk") {
            d.risk = Risk::parse(v);
        }
        if let Some(v) = field("confirm") {
            d.confirm = Confirm::parse(v);
        }
        if let Some(v) = field("os_user") {
            d.os_user = OsUser::parse(v);
        }
        if let Some(v) = field("cost") {
            if let Ok(cost) = v.parse::<i64>() {
                d.cost = cost;
            }
        }
        d
    }

    /// Back to the untyped form, all nine keys present
    pub fn to_annotations(&self) -> Annotations {
        let mut ann = Annotations::new();
        ann.insert("name".into(), self.name.clone());
        ann.insert("type".into(), self.kind.to_string());
        ann.insert("volatility".into(), self.volatility.to_string());
        ann.insert("parallel".into(), self.parallel.to_string());
        ann.insert("idempotent".into(), self.idempotent.to_string());
        ann.insert("risk".into(), self.risk.to_string());
        ann.insert("confirm".into(), self.confirm.to_string());
        ann.insert("os_user".into(), self.os_user.to_string());
        ann.insert("cost".into(), self.cost.to_string());
        ann
    }

    /// True for action commands
    pub fn mutates(&self) -> bool {
        self.kind == CommandType::Action
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Descriptor{{name={:?}, type={}, volatility={}, parallel={}, idempotent={}, risk={}, confirm={}, os_user={}, cost={}}}",
            self.name,
            self.kind,
            self.volatility,
            self.parallel,
            self.idempotent,
            self.risk,
            self.confirm,
            self.os_user,
            self.cost
        )
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1")
}

/// @acp:summary "Declare all nine descriptor fields in one call"
#[allow(clippy::too_many_arguments)]
pub fn ann(
    name: &str,
    kind: &str,
    volatility: &str,
    parallel: &str,
    idempotent: bool,
    risk: &str,
    confirm: &str,
    os_user: &str,
    cost: i64,
) -> Annotations {
    [
        ("name", name.to_string()),
        ("type", kind.to_string()),
        ("volatility", volatility.to_string()),
        ("parallel", parallel.to_string()),
        ("idempotent", idempotent.to_string()),
        ("risk", risk.to_string()),
        ("confirm", confirm.to_string()),
        ("os_user", os_user.to_string()),
        ("cost", cost.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Overlay `extra` onto `base`; later keys win
pub fn merge(mut base: Annotations, extra: &Annotations) -> Annotations {
    for (k, v) in extra {
        base.insert(k.clone(), v.clone());
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_from_none_and_empty() {
        let expected = Descriptor::default();
        assert_eq!(Descriptor::from_annotations(None), expected);
        assert_eq!(Descriptor::from_annotations(Some(&Annotations::new())), expected);
        assert_eq!(expected.kind, CommandType::Query);
        assert_eq!(expected.risk, Risk::Safe);
        assert_eq!(expected.volatility, Volatility::Stable);
        assert_eq!(expected.parallel, Parallel::Safe);
        assert_eq!(expected.confirm, Confirm::None);
        assert_eq!(expected.os_user, OsUser::Current);
        assert!(!expected.idempotent);
        assert_eq!(expected.cost, 0);
    }

    #[test]
    fn test_full_declaration() {
        let a = ann(
            "pig patroni switchover", "action", "volatile", "unsafe", false, "high", "required",
            "dbsu", 300000,
        );
        let d = Descriptor::from_annotations(Some(&a));
        assert_eq!(d.name, "pig patroni switchover");
        assert_eq!(d.kind, CommandType::Action);
        assert_eq!(d.risk, Risk::High);
        assert_eq!(d.confirm, Confirm::Required);
        assert_eq!(d.os_user, OsUser::Dbsu);
        assert_eq!(d.cost, 300000);
        assert!(d.mutates());
        assert_eq!(d.to_annotations(), a);
    }

    #[test]
    fn test_partial_and_blank_fields_default() {
        let mut a = Annotations::new();
        a.insert("name".into(), "pig ext".into());
        a.insert("risk".into(), "  ".into());
        a.insert("idempotent".into(), "TRUE".into());
        a.insert("volatility".into(), "Volatile".into());
        let d = Descriptor::from_annotations(Some(&a));
        assert_eq!(d.name, "pig ext");
        assert_eq!(d.risk, Risk::Safe);
        assert!(d.idempotent);
        assert_eq!(d.volatility, Volatility::Volatile);
    }

    #[test]
    fn test_invalid_values_are_kept_raw() {
        let mut a = Annotations::new();
        a.insert("type".into(), "group".into());
        a.insert("cost".into(), "-5".into());
        a.insert("os_user".into(), "admin".into());
        let d = Descriptor::from_annotations(Some(&a));
        assert_eq!(d.kind, CommandType::Unrecognized("group".into()));
        assert!(!d.kind.is_valid());
        assert_eq!(d.os_user.as_str(), "admin");
        assert_eq!(d.cost, -5);

        a.insert("cost".into(), "fast".into());
        assert_eq!(Descriptor::from_annotations(Some(&a)).cost, 0);
    }

    #[test]
    fn test_serializes_as_plain_strings() {
        let d = Descriptor::from_annotations(Some(&ann(
            "pig ext list", "query", "stable", "safe", true, "safe", "none", "current", 100,
        )));
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(
            json,
            r#"{"name":"pig ext list","type":"query","volatility":"stable","parallel":"safe","idempotent":true,"risk":"safe","confirm":"none","os_user":"current","cost":100}"#
        );
        let back: Descriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_merge_overlays() {
        let base = ann("pig x", "query", "stable", "safe", true, "safe", "none", "current", 0);
        let mut extra = Annotations::new();
        extra.insert("os_user".into(), "root".into());
        let merged = merge(base, &extra);
        assert_eq!(merged["os_user"], "root");
        assert_eq!(merged.len(), 9);
    }
}
