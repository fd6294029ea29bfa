use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::FlowlensError;
use super::call_graph::{CallGraph, CallGraphBuilder, InvocationEdge, InvocationResolver};
use super::project::{ProjectManifest, WorkflowIndex};
use super::validator::{GraphValidator, ValidationResult, Verdict};
use super::xaml::{Activity, IdentityGenerator, ParsedWorkflow, WorkflowParser};

/// A workflow file that could not be parsed. Recorded, never fatal for
/// the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseFailure {
    pub path: String,
    pub message: String,
}

/// Best-effort result of analyzing one project: whatever parsed, the call
/// graph over it, and explicit lists of what did not.
pub struct ProjectAnalysis {
    pub manifest: ProjectManifest,
    pub index: WorkflowIndex,
    pub documents: Vec<ParsedWorkflow>,
    pub call_graph: CallGraph,
    pub failed_files: Vec<ParseFailure>,
    pub unresolved_targets: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisSummary<'a> {
    project_id: &'a str,
    project_slug: &'a str,
    metrics: &'a crate::core::call_graph::GraphMetrics,
    failed_files: &'a [ParseFailure],
    unresolved_targets: &'a [String],
    validation: &'a ValidationResult,
}

/// Main orchestration engine: discover workflows, parse each in
/// isolation, resolve invocations, build the call graph, validate.
pub struct Engine {
    config: Config,
    parser: WorkflowParser,
    resolver: InvocationResolver,
    validator: GraphValidator,
}

impl Engine {
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;
        debug!("Loaded configuration: {:?}", config);

        let parser = WorkflowParser::new(&config.parsing);
        let resolver = InvocationResolver::new(&config.invocation);
        let validator = GraphValidator::new(&config.validation);

        Ok(Self {
            config,
            parser,
            resolver,
            validator,
        })
    }

    /// Analyze a whole project. The manifest is the only hard dependency;
    /// per-file parse failures are collected, not propagated.
    pub fn analyze_project(&self, root: Option<PathBuf>) -> Result<ProjectAnalysis> {
        let root = root.unwrap_or_else(|| self.config.project.root.clone());
        let manifest_path = root.join(&self.config.project.manifest);
        let manifest = ProjectManifest::load(&manifest_path)?;
        let slug = manifest.slug();

        info!("🔍 Analyzing project '{}' at {}", manifest.name, root.display());

        let index = WorkflowIndex::discover(
            &root,
            &slug,
            &self.config.parsing,
            &self.config.invocation,
            &self.config.project.ignore_patterns,
        )?;
        info!("Indexed {} workflow file(s)", index.len());

        let identity = IdentityGenerator::new(slug.clone());
        let mut documents: Vec<ParsedWorkflow> = Vec::new();
        let mut failed_files: Vec<ParseFailure> = Vec::new();
        let mut edges: Vec<InvocationEdge> = Vec::new();

        for entry in index.workflow_entries() {
            let absolute = index.absolute_path(&root, entry);
            match self.parser.parse_file(
                &absolute,
                &entry.relative_path,
                &entry.workflow_id,
                &identity,
            ) {
                Ok(parsed) => {
                    for warning in &parsed.warnings {
                        warn!("{}: {} ({})", entry.relative_path, warning.message, warning.node_id);
                    }
                    edges.extend(self.resolver.resolve_workflow(
                        &parsed,
                        &entry.relative_path,
                        &root,
                    ));
                    documents.push(parsed);
                }
                Err(e) => {
                    warn!("⚠️ Skipping {}: {}", entry.relative_path, e);
                    failed_files.push(ParseFailure {
                        path: entry.relative_path.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        let entry_point_ids = self.entry_point_ids(&manifest, &index);
        let call_graph = CallGraphBuilder::build(
            &manifest.name,
            &slug,
            &index,
            edges,
            &entry_point_ids,
        );
        let unresolved_targets = call_graph.unresolved_targets();

        info!(
            "Built call graph: {} workflow(s), {} dependency edge(s), {} cycle(s), {} orphan(s)",
            call_graph.metrics.total_workflows,
            call_graph.metrics.total_dependencies,
            call_graph.metrics.cycles,
            call_graph.metrics.orphans,
        );
        if !failed_files.is_empty() {
            warn!("{} file(s) failed to parse", failed_files.len());
        }

        Ok(ProjectAnalysis {
            manifest,
            index,
            documents,
            call_graph,
            failed_files,
            unresolved_targets,
        })
    }

    /// Entry-point workflow ids: the manifest's main workflow plus every
    /// declared entry point that resolves in the index.
    fn entry_point_ids(&self, manifest: &ProjectManifest, index: &WorkflowIndex) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        for path in manifest.entry_point_paths(self.config.graph.main_is_entry_point) {
            match index.by_path(&path) {
                Some(entry) => {
                    ids.insert(entry.workflow_id.clone());
                }
                None => warn!("⚠️ Declared entry point {} not found in project", path),
            }
        }
        ids
    }

    /// Parse a single workflow file and print its activity tree as JSON.
    pub async fn parse(&self, file: PathBuf) -> Result<()> {
        let relative = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.display().to_string());
        let identity = IdentityGenerator::new("adhoc");
        let workflow_id = format!("adhoc#{}", relative);

        let parsed = self
            .parser
            .parse_file(&file, &relative, &workflow_id, &identity)?;

        for warning in &parsed.warnings {
            warn!("{} ({})", warning.message, warning.node_id);
        }

        println!("{}", self.to_json(&parsed.root_activity)?);
        Ok(())
    }

    /// Analyze the project and write the call-graph artifacts.
    pub async fn graph(&self, source: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
        let analysis = self.analyze_project(source)?;
        let output_dir = output.unwrap_or_else(|| self.config.output.output_dir.clone());
        std::fs::create_dir_all(&output_dir)?;

        let validation = self
            .validator
            .validate(&analysis.call_graph, &analysis.failed_files);

        self.write_artifact(&output_dir, "call-graph.json", &analysis.call_graph)?;
        self.write_artifact(
            &output_dir,
            "invocations.json",
            &analysis.call_graph.invocation_records(),
        )?;

        let trees: BTreeMap<&str, &Activity> = analysis
            .documents
            .iter()
            .map(|d| (d.document.workflow_id.as_str(), &d.root_activity))
            .collect();
        self.write_artifact(&output_dir, "workflows.json", &trees)?;

        let summary = AnalysisSummary {
            project_id: &analysis.call_graph.project_id,
            project_slug: &analysis.call_graph.project_slug,
            metrics: &analysis.call_graph.metrics,
            failed_files: &analysis.failed_files,
            unresolved_targets: &analysis.unresolved_targets,
            validation: &validation,
        };
        self.write_artifact(&output_dir, "summary.json", &summary)?;

        info!("✅ Wrote analysis artifacts to {}", output_dir.display());
        Ok(())
    }

    /// Analyze and validate; fails the process on a Fail verdict (or any
    /// warning under --strict) so CI can gate on it.
    pub async fn validate(&self, source: Option<PathBuf>, strict: bool) -> Result<()> {
        let analysis = self.analyze_project(source)?;
        let result = self
            .validator
            .validate(&analysis.call_graph, &analysis.failed_files);

        for warning in &result.warnings {
            warn!("{}", warning);
        }
        for error in &result.errors {
            warn!("❌ {}", error);
        }

        match result.verdict {
            Verdict::Pass => {
                info!("✅ Validation passed");
                Ok(())
            }
            Verdict::Warn if !strict => {
                info!("⚠️ Validation passed with {} warning(s)", result.warnings.len());
                Ok(())
            }
            _ => anyhow::bail!(
                "validation failed: {} error(s), {} warning(s)",
                result.errors.len(),
                result.warnings.len()
            ),
        }
    }

    /// List every workflow transitively affected by a change to one
    /// workflow, nearest callers first.
    pub async fn impact(&self, source: Option<PathBuf>, workflow: String) -> Result<()> {
        let analysis = self.analyze_project(source)?;

        let normalized = crate::core::call_graph::normalize_posix(&workflow);
        let workflow_id = analysis
            .index
            .by_path(&normalized)
            .map(|entry| entry.workflow_id.clone())
            .unwrap_or(workflow);
        if !analysis.call_graph.workflows.contains_key(&workflow_id) {
            anyhow::bail!("workflow {} not found in project", workflow_id);
        }

        let impacted = analysis.call_graph.impacted_by(&workflow_id);
        if impacted.is_empty() {
            info!("No workflows depend on {}", workflow_id);
        } else {
            info!("{} workflow(s) impacted by {}", impacted.len(), workflow_id);
        }
        for id in &impacted {
            if let Some(node) = analysis.call_graph.workflows.get(id) {
                println!("{}", node.path);
            }
        }
        Ok(())
    }

    /// Write a default configuration file.
    pub async fn init(&self, path: Option<PathBuf>) -> Result<()> {
        let target = path
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Flowlens.toml");
        if target.exists() {
            anyhow::bail!("{} already exists", target.display());
        }
        Config::default().save(&target)?;
        info!("✅ Wrote {}", target.display());
        Ok(())
    }

    fn to_json<T: Serialize>(&self, value: &T) -> std::result::Result<String, FlowlensError> {
        if self.config.output.pretty_json {
            Ok(serde_json::to_string_pretty(value)?)
        } else {
            Ok(serde_json::to_string(value)?)
        }
    }

    fn write_artifact<T: Serialize>(
        &self,
        dir: &Path,
        name: &str,
        value: &T,
    ) -> std::result::Result<(), FlowlensError> {
        let path = dir.join(name);
        std::fs::write(&path, self.to_json(value)?)?;
        debug!("wrote {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call_graph::InvocationKind;

    const MAIN: &str = r#"<Sequence DisplayName="Main">
        <InvokeWorkflowFile DisplayName="call sub" WorkflowFileName="Sub.xaml"/>
        <InvokeWorkflowFile DisplayName="call missing" WorkflowFileName="Missing.xaml"/>
    </Sequence>"#;

    const SUB: &str = r#"<Sequence DisplayName="Sub">
        <InvokeWorkflowFile DisplayName="call main" WorkflowFileName="Main.xaml"/>
    </Sequence>"#;

    const BROKEN: &str = "<Sequence><Oops>";

    fn seed_project(dir: &Path) {
        std::fs::write(
            dir.join("project.json"),
            r#"{"name":"Acme Flows","main":"Main.xaml","entryPoints":[{"filePath":"Main.xaml"}]}"#,
        )
        .unwrap();
        std::fs::write(dir.join("Main.xaml"), MAIN).unwrap();
        std::fs::write(dir.join("Sub.xaml"), SUB).unwrap();
        std::fs::write(dir.join("Broken.xaml"), BROKEN).unwrap();
    }

    async fn engine() -> Engine {
        Engine::new(Some(Path::new("/nonexistent/flowlens.toml")))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_analysis_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path());

        let engine = engine().await;
        let analysis = engine
            .analyze_project(Some(dir.path().to_path_buf()))
            .unwrap();

        // The broken file fails alone; the other two parse.
        assert_eq!(analysis.failed_files.len(), 1);
        assert_eq!(analysis.failed_files[0].path, "Broken.xaml");
        assert_eq!(analysis.documents.len(), 2);

        let graph = &analysis.call_graph;
        assert_eq!(graph.metrics.total_workflows, 3);
        assert_eq!(graph.metrics.invocations.invoke, 2);
        assert_eq!(graph.metrics.invocations.invoke_missing, 1);
        assert_eq!(analysis.unresolved_targets, vec!["Missing.xaml"]);

        // Main <-> Sub is one complex cycle; both sit on a depth.
        assert_eq!(graph.cycles.len(), 1);
        let main = &graph.workflows["acme-flows#Main.xaml"];
        let sub = &graph.workflows["acme-flows#Sub.xaml"];
        assert!(main.is_entry_point);
        assert_eq!(main.call_depth, 0);
        assert_eq!(sub.call_depth, 1);
    }

    #[tokio::test]
    async fn test_invocation_record_stream_shape() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path());

        let engine = engine().await;
        let analysis = engine
            .analyze_project(Some(dir.path().to_path_buf()))
            .unwrap();

        let records = analysis.call_graph.invocation_records();
        assert_eq!(records.len(), 3);

        let sub_call = records
            .iter()
            .find(|r| r.target_path == "Sub.xaml")
            .unwrap();
        assert_eq!(sub_call.kind, InvocationKind::Invoke);
        assert_eq!(sub_call.from, "acme-flows#Main.xaml");
        assert_eq!(sub_call.to.as_deref(), Some("acme-flows#Sub.xaml"));
        assert_eq!(sub_call.activity_name, "call sub");
    }

    #[tokio::test]
    async fn test_graph_command_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path());
        let out = tempfile::tempdir().unwrap();

        let engine = engine().await;
        engine
            .graph(
                Some(dir.path().to_path_buf()),
                Some(out.path().to_path_buf()),
            )
            .await
            .unwrap();

        for artifact in ["call-graph.json", "invocations.json", "workflows.json", "summary.json"] {
            assert!(out.path().join(artifact).exists(), "{artifact} missing");
        }

        // Round trip: the serialized graph re-parses to the same shape.
        let raw = std::fs::read_to_string(out.path().join("call-graph.json")).unwrap();
        let graph: CallGraph = serde_json::from_str(&raw).unwrap();
        assert_eq!(graph.project_slug, "acme-flows");
        assert_eq!(graph.workflows.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_manifest_is_a_hard_abort() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine().await;
        assert!(engine
            .analyze_project(Some(dir.path().to_path_buf()))
            .is_err());
    }

    #[tokio::test]
    async fn test_validate_fails_on_missing_targets() {
        let dir = tempfile::tempdir().unwrap();
        seed_project(dir.path());

        let engine = engine().await;
        let result = engine
            .validate(Some(dir.path().to_path_buf()), false)
            .await;
        assert!(result.is_err());
    }
}
