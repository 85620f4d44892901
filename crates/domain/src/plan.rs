//! Orchestration plans: which specialists run, in what order and mode.

use serde::{Deserialize, Serialize};

/// How the specialists of a plan were selected.
pub mod routing {
    pub const ORCHESTRATOR: &str = "orchestrator";
    pub const LLM_ROUTING: &str = "llm_routing";
    pub const KEYWORD_ROUTING: &str = "keyword_routing";
    pub const KEYWORD_FALLBACK: &str = "keyword_fallback";
    pub const EXPLICIT: &str = "explicit";
}

/// Execution mode for multi-specialist task forces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskForceMode {
    #[default]
    Sequential,
    Parallel,
}

impl TaskForceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskForceMode::Sequential => "sequential",
            TaskForceMode::Parallel => "parallel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sequential" => Some(TaskForceMode::Sequential),
            "parallel" => Some(TaskForceMode::Parallel),
            _ => None,
        }
    }
}

/// A targeted sub-task for one specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistBrief {
    pub specialist_id: String,
    #[serde(default)]
    pub brief: String,
}

/// The orchestrator's decomposition and assignment plan.
///
/// Invariants: every assigned specialist id exists in config; plans with more
/// than one assignment force `synthesis_required`; single-specialist plans
/// always run sequentially.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationPlan {
    pub assignments: Vec<SpecialistBrief>,
    pub mode: TaskForceMode,
    pub synthesis_required: bool,
    #[serde(default)]
    pub reasoning: String,
    pub routing_method: String,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
}

impl OrchestrationPlan {
    pub fn specialist_ids(&self) -> Vec<String> {
        self.assignments
            .iter()
            .map(|a| a.specialist_id.clone())
            .collect()
    }

    /// The orchestrator's brief for a specialist, or `""` when absent.
    pub fn brief_for(&self, specialist_id: &str) -> &str {
        self.assignments
            .iter()
            .find(|a| a.specialist_id == specialist_id)
            .map(|a| a.brief.as_str())
            .unwrap_or("")
    }

    pub fn is_task_force(&self) -> bool {
        self.assignments.len() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_roundtrip() {
        assert_eq!(TaskForceMode::parse("parallel"), Some(TaskForceMode::Parallel));
        assert_eq!(TaskForceMode::parse("sideways"), None);
        assert_eq!(TaskForceMode::Parallel.as_str(), "parallel");
    }

    #[test]
    fn brief_lookup_defaults_empty() {
        let plan = OrchestrationPlan {
            assignments: vec![SpecialistBrief {
                specialist_id: "engineering".into(),
                brief: "build it".into(),
            }],
            mode: TaskForceMode::Sequential,
            synthesis_required: false,
            reasoning: String::new(),
            routing_method: routing::ORCHESTRATOR.into(),
            required_capabilities: vec![],
        };
        assert_eq!(plan.brief_for("engineering"), "build it");
        assert_eq!(plan.brief_for("research"), "");
        assert!(!plan.is_task_force());
    }

    #[test]
    fn plan_serde_roundtrip() {
        let plan = OrchestrationPlan {
            assignments: vec![
                SpecialistBrief {
                    specialist_id: "research".into(),
                    brief: "survey".into(),
                },
                SpecialistBrief {
                    specialist_id: "engineering".into(),
                    brief: "prototype".into(),
                },
            ],
            mode: TaskForceMode::Parallel,
            synthesis_required: true,
            reasoning: "independent subtasks".into(),
            routing_method: routing::ORCHESTRATOR.into(),
            required_capabilities: vec!["web_search".into()],
        };
        let json = serde_json::to_string(&plan).unwrap();
        let back: OrchestrationPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back.assignments.len(), 2);
        assert_eq!(back.mode, TaskForceMode::Parallel);
        assert!(back.synthesis_required);
    }
}
