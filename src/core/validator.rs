use serde::{Deserialize, Serialize};

use crate::config::ValidationConfig;
use crate::core::call_graph::CallGraph;
use crate::core::engine::ParseFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Verdict {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub verdict: Verdict,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Turns a built call graph into a pass/warn/fail verdict for CI.
pub struct GraphValidator {
    config: ValidationConfig,
}

impl GraphValidator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn validate(&self, graph: &CallGraph, failures: &[ParseFailure]) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let missing = graph.metrics.invocations.invoke_missing;
        if missing > self.config.max_missing_invocations {
            errors.push(format!(
                "{} missing invocation target(s) (limit {}): {}",
                missing,
                self.config.max_missing_invocations,
                graph.unresolved_targets().join(", ")
            ));
        }

        for failure in failures {
            warnings.push(format!("failed to parse {}: {}", failure.path, failure.message));
        }

        if self.config.warn_on_cycles {
            for cycle in &graph.cycles {
                warnings.push(format!(
                    "invocation cycle {}: {}",
                    cycle.id,
                    cycle.workflow_ids.join(" -> ")
                ));
            }
        }

        if self.config.warn_on_orphans {
            let orphans: Vec<&str> = graph
                .workflows
                .values()
                .filter(|n| n.call_depth < 0)
                .map(|n| n.path.as_str())
                .collect();
            if !orphans.is_empty() {
                warnings.push(format!(
                    "{} workflow(s) unreachable from any entry point: {}",
                    orphans.len(),
                    orphans.join(", ")
                ));
            }
        }

        if graph.metrics.invocations.invoke_dynamic > 0 {
            warnings.push(format!(
                "{} dynamic invocation(s) cannot be statically analyzed",
                graph.metrics.invocations.invoke_dynamic
            ));
        }

        let verdict = if !errors.is_empty() {
            Verdict::Fail
        } else if !warnings.is_empty() {
            Verdict::Warn
        } else {
            Verdict::Pass
        };

        ValidationResult {
            verdict,
            errors,
            warnings,
        }
    }
}
