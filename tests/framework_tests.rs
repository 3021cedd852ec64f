//! Structured execution integration tests
//!
//! Argument preprocessing, status codes, the legacy bridge and the process
//! boundary, driven through the public library API.

use pig::bridge::{params, run_legacy_structured, structured_param_error};
use pig::cli::preprocess::{detect_output_format, is_structured_output_requested, reorder_output_before_help};
use pig::config::{OutputFormat, OutputFormatGuard};
use pig::error::{carried_code, ExitCodeError};
use pig::output::code::{compose, exit_code, Category, Module, CODE_SYSTEM_INVALID_ARGS};
use pig::output::sink::{capture, DEFAULT_CAPTURE_LIMIT};
use pig::outln;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Preprocessor
// =============================================================================

mod preprocess_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_output_moves_before_help() {
        let args = strings(&["patroni", "status", "--help", "-o", "json"]);
        assert_eq!(
            reorder_output_before_help(&args),
            strings(&["patroni", "status", "-o", "json", "--help"])
        );
    }

    #[test]
    fn test_leading_help_is_unchanged() {
        let args = strings(&["--help", "-o", "yaml"]);
        assert_eq!(reorder_output_before_help(&args), args);
    }

    #[test]
    fn test_no_help_is_unchanged() {
        let args = strings(&["pg", "stop", "-o", "json"]);
        assert_eq!(reorder_output_before_help(&args), args);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(detect_output_format(&strings(&["context", "-o", "json"])), OutputFormat::Json);
        assert_eq!(detect_output_format(&strings(&["--output=json-pretty"])), OutputFormat::JsonPretty);
        assert_eq!(detect_output_format(&strings(&["status", "--output", "xml"])), OutputFormat::Text);
        assert_eq!(detect_output_format(&strings(&["status"])), OutputFormat::Text);
        assert!(is_structured_output_requested(&strings(&["ext", "list", "-o", "yaml"])));
        assert!(!is_structured_output_requested(&strings(&["ext", "list"])));
    }
}

// =============================================================================
// Status codes
// =============================================================================

mod status_code_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exit_status_by_category() {
        assert_eq!(exit_code(0), 0);
        assert_eq!(exit_code(compose(Module::Pt, Category::Param, 1)), 2);
        assert_eq!(exit_code(compose(Module::Pg, Category::Perm, 2)), 3);
        assert_eq!(exit_code(compose(Module::Pb, Category::Depend, 1)), 4);
        assert_eq!(exit_code(compose(Module::Pg, Category::State, 1)), 9);
        assert_eq!(exit_code(compose(Module::Pt, Category::Config, 1)), 8);
        assert_eq!(exit_code(compose(Module::Ext, Category::Operation, 1)), 1);
        assert_eq!(exit_code(-1), 1);
    }

    #[test]
    fn test_generic_codes() {
        assert_eq!(CODE_SYSTEM_INVALID_ARGS, 990101);
        assert_eq!(compose(Module::Pt, Category::Param, 1), 150101);
    }
}

// =============================================================================
// Legacy bridge
// =============================================================================

mod bridge_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_text_mode_runs_directly() {
        let _guard = OutputFormatGuard::set(OutputFormat::Text);
        let (result, captured) = capture(DEFAULT_CAPTURE_LIMIT, || {
            run_legacy_structured(Module::Ext, "pig ext add", &[], params([]), || {
                outln!("installing pgvector");
                Ok(())
            })
        });
        assert!(result.is_ok());
        assert_eq!(captured.text, "installing pgvector\n");
    }

    #[test]
    fn test_structured_success_wraps_captured_output() {
        let _guard = OutputFormatGuard::set(OutputFormat::Json);
        let args = strings(&["pgvector"]);
        let (result, captured) = capture(DEFAULT_CAPTURE_LIMIT, || {
            run_legacy_structured(
                Module::Ext,
                "pig ext add",
                &args,
                params([("yes", json!(true)), ("region", Value::Null)]),
                || {
                    outln!("installing pgvector");
                    Ok(())
                },
            )
        });
        assert!(result.is_ok());

        let doc: Value = serde_json::from_str(captured.text.trim()).unwrap();
        assert_eq!(doc["success"], true);
        assert_eq!(doc["code"], 0);
        assert_eq!(doc["data"]["command"], "pig ext add");
        assert_eq!(doc["data"]["args"], json!(["pgvector"]));
        assert_eq!(doc["data"]["params"], json!({ "yes": true }));
        assert_eq!(doc["data"]["captured_output"], "installing pgvector");
    }

    #[test]
    fn test_structured_failure_uses_module_operation_code() {
        let _guard = OutputFormatGuard::set(OutputFormat::Json);
        let (result, captured) = capture(DEFAULT_CAPTURE_LIMIT, || {
            run_legacy_structured(Module::Repo, "pig repo update", &[], params([]), || {
                Err(anyhow::anyhow!("mirror unreachable"))
            })
        });
        let err = result.unwrap_err();
        let carried = carried_code(&err).expect("failure carries a code");
        assert_eq!(carried.code, compose(Module::Repo, Category::Operation, 1));
        assert_eq!(carried.exit, 1);

        let doc: Value = serde_json::from_str(captured.text.trim()).unwrap();
        assert_eq!(doc["success"], false);
        assert_eq!(doc["detail"], "mirror unreachable");
        assert_eq!(doc["data"]["command"], "pig repo update");
    }

    #[test]
    fn test_structured_failure_keeps_carried_code() {
        let _guard = OutputFormatGuard::set(OutputFormat::Yaml);
        let code = compose(Module::Pb, Category::State, 1);
        let (result, captured) = capture(DEFAULT_CAPTURE_LIMIT, || {
            run_legacy_structured(Module::Pb, "pig pb restore", &[], params([]), || {
                Err(ExitCodeError::from_code(code, "PostgreSQL is running").into())
            })
        });
        assert_eq!(carried_code(&result.unwrap_err()).map(|e| e.code), Some(code));

        let doc: serde_yaml::Value = serde_yaml::from_str(&captured.text).unwrap();
        assert_eq!(doc["code"].as_i64(), Some(code as i64));
    }

    #[test]
    fn test_param_error() {
        let _guard = OutputFormatGuard::set(OutputFormat::Json);
        let (err, captured) = capture(DEFAULT_CAPTURE_LIMIT, || {
            structured_param_error(
                Module::Sty,
                "pig sty conf",
                "invalid ip address",
                "10.10.10 is not an IPv4 address",
                &strings(&["--ip", "10.10.10"]),
                params([("ip", json!("10.10.10"))]),
            )
        });
        assert_eq!(carried_code(&err).map(|e| e.exit), Some(2));
        let doc: Value = serde_json::from_str(captured.text.trim()).unwrap();
        assert_eq!(doc["code"], compose(Module::Sty, Category::Param, 1));

        config_text_mode_returns_plain_error();
    }

    fn config_text_mode_returns_plain_error() {
        let _guard = OutputFormatGuard::set(OutputFormat::Text);
        let err = structured_param_error(Module::Sty, "pig sty conf", "bad", "plain detail", &[], params([]));
        assert!(carried_code(&err).is_none());
        assert_eq!(err.to_string(), "plain detail");
    }
}

// =============================================================================
// Process boundary
// =============================================================================

mod boundary_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_structured_root_help_is_capability_map() {
        let _guard = OutputFormatGuard::set(OutputFormat::Text);
        let (exit, captured) = capture(DEFAULT_CAPTURE_LIMIT, || pig::cli::run(&strings(&["--help", "-o", "json"])));
        assert_eq!(exit, 0);
        let doc: Value = serde_json::from_str(captured.text.trim()).unwrap();
        assert_eq!(doc["name"], "pig");
        assert!(doc["commands"].is_array());
    }

    #[test]
    fn test_structured_subcommand_help_is_schema() {
        let _guard = OutputFormatGuard::set(OutputFormat::Text);
        let (exit, captured) = capture(DEFAULT_CAPTURE_LIMIT, || {
            pig::cli::run(&strings(&["patroni", "switchover", "--help", "-o", "yaml"]))
        });
        assert_eq!(exit, 0);
        let doc: serde_yaml::Value = serde_yaml::from_str(&captured.text).unwrap();
        assert_eq!(doc["name"].as_str(), Some("pig patroni switchover"));
        assert_eq!(doc["schema"]["confirm"].as_str(), Some("required"));
    }

    #[test]
    fn test_unknown_flag_is_usage_error() {
        let _guard = OutputFormatGuard::set(OutputFormat::Text);
        let (exit, captured) = capture(DEFAULT_CAPTURE_LIMIT, || {
            pig::cli::run(&strings(&["ext", "list", "--no-such-flag", "-o", "json"]))
        });
        assert_eq!(exit, 2);
        let doc: Value = serde_json::from_str(captured.text.trim()).unwrap();
        assert_eq!(doc["success"], false);
        assert_eq!(doc["code"], CODE_SYSTEM_INVALID_ARGS);
    }

    #[test]
    fn test_switchover_without_force_is_refused() {
        let _guard = OutputFormatGuard::set(OutputFormat::Text);
        let (exit, captured) = capture(DEFAULT_CAPTURE_LIMIT, || {
            pig::cli::run(&strings(&["pt", "switchover", "-o", "json"]))
        });
        assert_eq!(exit, 2);
        let doc: Value = serde_json::from_str(captured.text.trim()).unwrap();
        assert_eq!(doc["code"], compose(Module::Pt, Category::Param, 1));
    }
}
