//! @acp:module "Execution Plan"
//! @acp:summary "Preview of a mutating command's intended effect"
//! @acp:domain cli
//! @acp:layer model
//!
//! A plan renders like a result but never implies that anything changed.
//! Commands that accept `--plan` build one instead of acting.

use serde::{Deserialize, Serialize};

use super::table::render_table;
use super::Render;

/// One step of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub step: i32,
    pub description: String,
}

/// A resource the plan would touch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub impact: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

impl Resource {
    pub fn new(kind: &str, name: impl Into<String>, impact: &str, detail: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.into(),
            impact: impact.to_string(),
            detail: detail.into(),
        }
    }
}

/// @acp:summary "Ordered actions, affected resources, expected outcome, risks"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub command: String,
    pub actions: Vec<Action>,
    pub affects: Vec<Resource>,
    pub expected: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risks: Vec<String>,
}

impl Plan {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Append an action numbered after the existing ones
    pub fn action(mut self, description: impl Into<String>) -> Self {
        let step = self.actions.len() as i32 + 1;
        self.actions.push(Action {
            step,
            description: description.into(),
        });
        self
    }

    pub fn affects(mut self, resource: Resource) -> Self {
        self.affects.push(resource);
        self
    }

    pub fn expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = expected.into();
        self
    }

    pub fn risk(mut self, risk: impl Into<String>) -> Self {
        self.risks.push(risk.into());
        self
    }
}

impl Render for Plan {
    fn text(&self) -> String {
        let mut out = String::from("Execution Plan\n");

        if !self.command.is_empty() {
            out.push_str(&format!("Command: {}\n", self.command));
        }

        if !self.actions.is_empty() {
            out.push_str("\nActions:\n");
            for (i, action) in self.actions.iter().enumerate() {
                let step = if action.step <= 0 { i as i32 + 1 } else { action.step };
                out.push_str(&format!("  [{}] {}\n", step, action.description));
            }
        }

        if !self.affects.is_empty() {
            out.push_str("\nAffects:\n");
            let rows: Vec<Vec<String>> = self
                .affects
                .iter()
                .map(|r| vec![r.kind.clone(), r.name.clone(), r.impact.clone(), r.detail.clone()])
                .collect();
            out.push_str(&render_table(&["Type", "Name", "Impact", "Detail"], &rows));
        }

        if !self.expected.is_empty() {
            out.push_str(&format!("\nExpected:\n  {}\n", self.expected));
        }

        if !self.risks.is_empty() {
            out.push_str("\nRisks:\n");
            for risk in &self.risks {
                out.push_str(&format!("  - {}\n", risk));
            }
        }

        out.trim_end_matches('\n').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Plan {
        Plan::new("pig pg stop -m fast")
            .action("Stop PostgreSQL server (mode: fast)")
            .affects(Resource::new("service", "postgresql", "stop", "PID 42 will be terminated"))
            .expected("PostgreSQL stopped")
            .risk("All active connections will be terminated")
    }

    #[test]
    fn test_plan_text() {
        let text = sample().text();
        assert!(text.starts_with("Execution Plan\nCommand: pig pg stop -m fast\n"));
        assert!(text.contains("  [1] Stop PostgreSQL server (mode: fast)"));
        assert!(text.contains("Type     Name        Impact  Detail"));
        assert!(text.contains("\nExpected:\n  PostgreSQL stopped"));
        assert!(text.ends_with("  - All active connections will be terminated"));
    }

    #[test]
    fn test_plan_renumbers_missing_steps() {
        let mut plan = Plan::new("x");
        plan.actions.push(Action { step: 0, description: "first".into() });
        plan.actions.push(Action { step: -1, description: "second".into() });
        let text = plan.text();
        assert!(text.contains("[1] first"));
        assert!(text.contains("[2] second"));
    }

    #[test]
    fn test_plan_round_trip() {
        let plan = sample();
        let back: Plan = serde_json::from_str(&plan.render("json")).unwrap();
        assert_eq!(back, plan);
        let back: Plan = serde_yaml::from_str(&plan.render("yaml")).unwrap();
        assert_eq!(back, plan);
        assert_eq!(plan.render("bogus"), plan.text());
    }

    #[test]
    fn test_empty_plan_still_renders() {
        let plan = Plan::default();
        assert_eq!(plan.render("text"), "Execution Plan");
        assert!(plan.render("json").contains(r#""actions":[]"#));
    }
}
