//! Capability map integration tests
//!
//! Builds the capability map and command schemas from the real command tree.

use pig::capability::{build_capability_map, validate_tree, CommandSchema, Confirm, OsUser, Risk};
use pig::commands::root;
use pretty_assertions::assert_eq;

// =============================================================================
// Capability map
// =============================================================================

mod capability_map_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_root_metadata() {
        let map = build_capability_map(&root(), pig::VERSION);
        assert_eq!(map.name, "pig");
        assert_eq!(map.version, format!("v{}", pig::VERSION));
        assert!(!map.description.is_empty());

        let top: Vec<&str> = map.commands.iter().map(|c| c.name.as_str()).collect();
        for expected in [
            "ext", "repo", "pg", "patroni", "pgbackrest", "pitr", "sty", "do", "context", "status",
            "version", "update",
        ] {
            assert!(top.contains(&expected), "missing {} in {:?}", expected, top);
        }
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let a = build_capability_map(&root(), pig::VERSION);
        let b = build_capability_map(&root(), pig::VERSION);
        assert_eq!(a.json().unwrap(), b.json().unwrap());
        assert_eq!(a.yaml().unwrap(), b.yaml().unwrap());
    }

    #[test]
    fn test_round_trips_through_generic_parsers() {
        let map = build_capability_map(&root(), pig::VERSION);

        let json: serde_json::Value = serde_json::from_str(&map.json().unwrap()).unwrap();
        assert_eq!(json["name"], "pig");
        assert!(json["commands"].as_array().is_some_and(|c| !c.is_empty()));

        let yaml: serde_yaml::Value = serde_yaml::from_str(&map.yaml().unwrap()).unwrap();
        assert_eq!(yaml["name"].as_str(), Some("pig"));

        let pretty: serde_json::Value = serde_json::from_str(&map.json_pretty().unwrap()).unwrap();
        assert_eq!(pretty, json);
    }

    #[test]
    fn test_dangerous_commands_require_confirmation() {
        let map = build_capability_map(&root(), pig::VERSION);
        let switchover = map.find("pig patroni switchover").expect("switchover listed");
        let schema = switchover.schema.as_ref().expect("switchover descriptor");
        assert_eq!(schema.confirm, Confirm::Required);
        assert_eq!(schema.risk, Risk::High);
        assert_eq!(schema.os_user, OsUser::Dbsu);
        assert!(!schema.idempotent);
        assert!(switchover.flags.iter().any(|f| f.name == "force"));

        let pitr = map.find("pig pitr").expect("pitr listed");
        assert_eq!(pitr.schema.as_ref().map(|s| s.risk.clone()), Some(Risk::Critical));
    }

    #[test]
    fn test_output_flag_choices_are_inherited() {
        let map = build_capability_map(&root(), pig::VERSION);
        for node in map.nodes() {
            let output = node
                .flags
                .iter()
                .find(|f| f.name == "output")
                .unwrap_or_else(|| panic!("{} lacks the output flag", node.full_name));
            assert_eq!(output.choices, vec!["text", "yaml", "json", "json-pretty"]);
        }
    }

    #[test]
    fn test_every_node_has_a_descriptor() {
        let map = build_capability_map(&root(), pig::VERSION);
        for node in map.nodes() {
            let schema = node
                .schema
                .as_ref()
                .unwrap_or_else(|| panic!("{} has no descriptor", node.full_name));
            assert_eq!(schema.name, node.full_name);
            assert!(schema.kind.is_valid(), "{}: type {}", node.full_name, schema.kind);
            assert!(schema.volatility.is_valid(), "{}: volatility {}", node.full_name, schema.volatility);
            assert!(schema.risk.is_valid(), "{}: risk {}", node.full_name, schema.risk);
            assert!(schema.os_user.is_valid(), "{}: os_user {}", node.full_name, schema.os_user);
            assert!(schema.cost >= 0, "{}: cost {}", node.full_name, schema.cost);
        }
    }

    #[test]
    fn test_tree_validates() {
        let violations = validate_tree(&root());
        assert!(violations.is_empty(), "{:#?}", violations);
    }
}

// =============================================================================
// Command schema
// =============================================================================

mod command_schema_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokens(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_schema_for_located_command() {
        let root = root();
        let chain = root.locate(&tokens(&["pg", "stop", "-o", "json", "--help"]));
        let schema = CommandSchema::from_chain(&chain).unwrap();
        assert_eq!(schema.name, "pig pg stop");
        assert!(schema.flags.iter().any(|f| f.name == "plan"));
        assert!(schema.sub_commands.is_empty());
    }

    #[test]
    fn test_schema_resolves_aliases() {
        let root = root();
        let chain = root.locate(&tokens(&["pt", "sw"]));
        let schema = CommandSchema::from_chain(&chain).unwrap();
        assert_eq!(schema.name, "pig patroni switchover");
    }

    #[test]
    fn test_group_schema_lists_children() {
        let root = root();
        let chain = root.locate(&tokens(&["pgbackrest"]));
        let schema = CommandSchema::from_chain(&chain).unwrap();
        let children: Vec<&str> = schema.sub_commands.iter().map(|s| s.name.as_str()).collect();
        assert!(children.contains(&"restore"), "{:?}", children);
        assert!(children.contains(&"info"), "{:?}", children);
    }

    #[test]
    fn test_schema_lists_positional_args() {
        let root = root();
        let chain = root.locate(&tokens(&["ext", "add"]));
        let schema = CommandSchema::from_chain(&chain).unwrap();
        assert_eq!(schema.args.len(), 1);
        assert_eq!(schema.args[0].name, "package");
        assert!(schema.args[0].required);
        assert!(schema.args[0].variadic);
    }
}
