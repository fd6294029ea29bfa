use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::InvocationConfig;
use crate::core::xaml::ParsedWorkflow;

/// How a workflow invocation target was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationKind {
    /// Static target that resolves to an existing workflow
    Invoke,
    /// Target is an expression evaluated at run time
    InvokeDynamic,
    /// Static target that does not exist on disk
    InvokeMissing,
    /// Target is a coded (non-XAML) workflow source
    InvokeCoded,
}

/// One invocation from a workflow to a target.
///
/// References to workflow ids are weak: the target may legitimately be
/// absent (`invoke-missing`, `invoke-dynamic`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationEdge {
    pub source_workflow_id: String,
    /// The written target, POSIX-normalized (raw expression text for
    /// dynamic targets)
    pub target_path: String,
    /// Filled during graph edge attachment for resolvable targets
    pub resolved_target_id: Option<String>,
    pub kind: InvocationKind,
    pub arguments: BTreeMap<String, String>,
    /// Node id of the originating activity
    pub node_id: String,
    pub activity_name: String,
}

/// Flat invocation record exposed to downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRecord {
    pub kind: InvocationKind,
    pub from: String,
    pub to: Option<String>,
    pub arguments: BTreeMap<String, String>,
    pub activity_name: String,
    pub target_path: String,
}

impl InvocationEdge {
    pub fn to_record(&self) -> InvocationRecord {
        InvocationRecord {
            kind: self.kind,
            from: self.source_workflow_id.clone(),
            to: self.resolved_target_id.clone(),
            arguments: self.arguments.clone(),
            activity_name: self.activity_name.clone(),
            target_path: self.target_path.clone(),
        }
    }
}

/// Normalize a path to POSIX form: forward slashes, `.` segments dropped,
/// `..` segments resolved where possible.
pub fn normalize_posix(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let normalized = path.replace('\\', "/");
    for segment in normalized.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().map_or(true, |s| *s == "..") {
                    segments.push("..");
                } else {
                    segments.pop();
                }
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Classifies each invocation site of a parsed workflow.
///
/// The indicator heuristics come from configuration; they are approximate
/// by design and make no completeness claim.
pub struct InvocationResolver {
    config: InvocationConfig,
    path_combine: Regex,
    bracket_xaml: Regex,
}

impl InvocationResolver {
    pub fn new(config: &InvocationConfig) -> Self {
        let path_combine = Regex::new(r"Path\.Combine\s*\(").expect("path combine pattern");
        let bracket_xaml = Regex::new(r"\[[^\[\]]*\.xaml[^\[\]]*\]").expect("bracket xaml pattern");

        Self {
            config: config.clone(),
            path_combine,
            bracket_xaml,
        }
    }

    /// Classify every invocation in one parsed workflow.
    ///
    /// `source_relative` is the workflow's POSIX path relative to
    /// `project_root`; static targets are probed relative to the workflow
    /// directory, its parent, and the project root.
    pub fn resolve_workflow(
        &self,
        parsed: &ParsedWorkflow,
        source_relative: &str,
        project_root: &Path,
    ) -> Vec<InvocationEdge> {
        let mut edges: Vec<InvocationEdge> = Vec::new();
        let source_id = parsed.document.workflow_id.clone();

        for invocation in &parsed.invocations {
            let kind = self.classify_target(&invocation.target_raw, source_relative, project_root);
            let target_path = if kind == InvocationKind::InvokeDynamic {
                invocation.target_raw.clone()
            } else {
                normalize_posix(&invocation.target_raw)
            };

            edges.push(InvocationEdge {
                source_workflow_id: source_id.clone(),
                target_path,
                resolved_target_id: None,
                kind,
                arguments: invocation.arguments.clone(),
                node_id: invocation.node_id.clone(),
                activity_name: invocation.activity_name.clone(),
            });
        }

        // Fallback: visible text that builds a workflow path at run time
        // counts as a dynamic invocation even outside InvokeWorkflowFile,
        // unless it verbatim repeats a target already classified above.
        let known_targets: Vec<&str> = parsed
            .invocations
            .iter()
            .map(|i| i.target_raw.as_str())
            .collect();

        for (node_id, text) in &parsed.visible_texts {
            let trimmed = text.trim();
            if known_targets.contains(&trimmed) {
                continue;
            }
            let is_combine = self.path_combine.is_match(trimmed) && trimmed.contains(".xaml");
            let is_bracket = self.bracket_xaml.is_match(trimmed);
            if !is_combine && !is_bracket {
                continue;
            }
            if edges
                .iter()
                .any(|e| e.node_id == *node_id && e.target_path == *trimmed)
            {
                continue;
            }

            edges.push(InvocationEdge {
                source_workflow_id: source_id.clone(),
                target_path: trimmed.to_string(),
                resolved_target_id: None,
                kind: InvocationKind::InvokeDynamic,
                arguments: BTreeMap::new(),
                node_id: node_id.clone(),
                activity_name: String::new(),
            });
        }

        edges
    }

    fn classify_target(
        &self,
        target_raw: &str,
        source_relative: &str,
        project_root: &Path,
    ) -> InvocationKind {
        let trimmed = target_raw.trim();
        if trimmed.is_empty() {
            return InvocationKind::InvokeMissing;
        }

        if self
            .config
            .dynamic_indicators
            .iter()
            .any(|indicator| trimmed.contains(indicator.as_str()))
        {
            return InvocationKind::InvokeDynamic;
        }

        let normalized = normalize_posix(trimmed);
        if let Some(extension) = Path::new(&normalized)
            .extension()
            .and_then(|e| e.to_str())
        {
            let extension = extension.to_ascii_lowercase();
            if self.config.coded_extensions.iter().any(|c| *c == extension) {
                return InvocationKind::InvokeCoded;
            }
        }

        if self
            .candidate_paths(&normalized, source_relative, project_root)
            .iter()
            .any(|candidate| candidate.exists())
        {
            InvocationKind::Invoke
        } else {
            InvocationKind::InvokeMissing
        }
    }

    /// Probe order: workflow directory, its parent, project root.
    fn candidate_paths(
        &self,
        target: &str,
        source_relative: &str,
        project_root: &Path,
    ) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        let source_dir = Path::new(source_relative)
            .parent()
            .map(|p| project_root.join(p))
            .unwrap_or_else(|| project_root.to_path_buf());

        candidates.push(source_dir.join(target));
        if let Some(parent) = source_dir.parent() {
            if parent.starts_with(project_root) || parent == project_root {
                candidates.push(parent.join(target));
            }
        }
        candidates.push(project_root.join(target));
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::xaml::{IdentityGenerator, WorkflowParser};

    fn parse_and_resolve(
        xml: &str,
        source_relative: &str,
        project_root: &Path,
    ) -> Vec<InvocationEdge> {
        let config = Config::default();
        let parser = WorkflowParser::new(&config.parsing);
        let identity = IdentityGenerator::new("p");
        let workflow_id = format!("p#{}", source_relative);
        let parsed = parser
            .parse_source(xml, source_relative, &workflow_id, &identity)
            .unwrap();

        let resolver = InvocationResolver::new(&config.invocation);
        resolver.resolve_workflow(&parsed, source_relative, project_root)
    }

    #[test]
    fn test_normalize_posix() {
        assert_eq!(normalize_posix(r"Flows\Sub.xaml"), "Flows/Sub.xaml");
        assert_eq!(normalize_posix("./Flows/./Sub.xaml"), "Flows/Sub.xaml");
        assert_eq!(normalize_posix("Flows/../Sub.xaml"), "Sub.xaml");
        assert_eq!(normalize_posix("../Shared/Sub.xaml"), "../Shared/Sub.xaml");
    }

    #[test]
    fn test_existing_target_is_static_invoke() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Sub.xaml"), "<Sequence/>").unwrap();

        let edges = parse_and_resolve(
            r#"<Sequence DisplayName="Main">
                 <InvokeWorkflowFile DisplayName="call" WorkflowFileName="Sub.xaml"/>
               </Sequence>"#,
            "Main.xaml",
            dir.path(),
        );

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, InvocationKind::Invoke);
        assert_eq!(edges[0].target_path, "Sub.xaml");
    }

    #[test]
    fn test_absent_target_is_missing() {
        let dir = tempfile::tempdir().unwrap();

        let edges = parse_and_resolve(
            r#"<Sequence DisplayName="Main">
                 <InvokeWorkflowFile DisplayName="call" WorkflowFileName="Missing.xaml"/>
               </Sequence>"#,
            "Main.xaml",
            dir.path(),
        );

        assert_eq!(edges[0].kind, InvocationKind::InvokeMissing);
    }

    #[test]
    fn test_expression_target_is_dynamic() {
        let dir = tempfile::tempdir().unwrap();

        let edges = parse_and_resolve(
            r#"<Sequence DisplayName="Main">
                 <InvokeWorkflowFile DisplayName="call"
                     WorkflowFileName="[Path.Combine(dir, &quot;Sub.xaml&quot;)]"/>
               </Sequence>"#,
            "Main.xaml",
            dir.path(),
        );

        assert_eq!(edges[0].kind, InvocationKind::InvokeDynamic);
        // Dynamic targets keep the written expression verbatim.
        assert!(edges[0].target_path.contains("Path.Combine"));
    }

    #[test]
    fn test_coded_target_classified_without_probing() {
        let dir = tempfile::tempdir().unwrap();

        let edges = parse_and_resolve(
            r#"<Sequence DisplayName="Main">
                 <InvokeWorkflowFile DisplayName="call" WorkflowFileName="Helpers/Calc.cs"/>
               </Sequence>"#,
            "Main.xaml",
            dir.path(),
        );

        assert_eq!(edges[0].kind, InvocationKind::InvokeCoded);
    }

    #[test]
    fn test_target_resolves_from_parent_and_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Flows")).unwrap();
        std::fs::write(dir.path().join("Shared.xaml"), "<Sequence/>").unwrap();

        let edges = parse_and_resolve(
            r#"<Sequence DisplayName="Main">
                 <InvokeWorkflowFile DisplayName="call" WorkflowFileName="Shared.xaml"/>
               </Sequence>"#,
            "Flows/Main.xaml",
            dir.path(),
        );

        assert_eq!(edges[0].kind, InvocationKind::Invoke);
    }

    #[test]
    fn test_fallback_scan_finds_dynamic_paths_in_visible_text() {
        let dir = tempfile::tempdir().unwrap();

        let edges = parse_and_resolve(
            r#"<Sequence DisplayName="Main">
                 <Assign DisplayName="pick" To="wf" Value="[prefix + &quot;/Report.xaml&quot;]"/>
               </Sequence>"#,
            "Main.xaml",
            dir.path(),
        );

        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, InvocationKind::InvokeDynamic);
        assert_eq!(edges[0].node_id, "/Sequence[0]/Assign[0]");
    }

    #[test]
    fn test_fallback_scan_skips_known_static_targets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Sub.xaml"), "<Sequence/>").unwrap();

        let edges = parse_and_resolve(
            r#"<Sequence DisplayName="Main">
                 <InvokeWorkflowFile DisplayName="call" WorkflowFileName="Sub.xaml"/>
               </Sequence>"#,
            "Main.xaml",
            dir.path(),
        );

        // The WorkflowFileName attribute text must not double as a
        // fallback dynamic hit.
        assert_eq!(edges.len(), 1);
    }
}
