mod activity_tree;
mod document;
mod expressions;
mod identity;
mod namespaces;
mod visibility;

pub use activity_tree::{Activity, ActivityTree, ActivityTreeBuilder, RawInvocation, INVOKE_WORKFLOW_TAG};
pub use document::{Argument, ArgumentDirection, Variable, WorkflowDocument};
pub use expressions::{Expression, ExpressionDetector, ExpressionRole};
pub use identity::{canonical_content, hash8, IdentityGenerator};
pub use namespaces::{is_activities_namespace, local_tag, strip_namespace, NamespaceMap};
pub use visibility::VisibilityClassifier;

use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::config::ParsingConfig;
use crate::error::{FlowlensError, Result};

/// A recoverable oddity found while parsing one workflow (truncated
/// subtree, skipped activity, empty document).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseWarning {
    pub node_id: String,
    pub message: String,
}

/// Everything extracted from one workflow file: file-level metadata, the
/// activity tree, and the raw invocation sites.
#[derive(Debug, Clone)]
pub struct ParsedWorkflow {
    pub document: WorkflowDocument,
    pub root_activity: Activity,
    pub invocations: Vec<RawInvocation>,
    /// Raw visible text as `(node_id, text)` for the fallback
    /// dynamic-invocation scan
    pub visible_texts: Vec<(String, String)>,
    pub warnings: Vec<ParseWarning>,
}

/// Parses XAML workflow files into [`ParsedWorkflow`]s.
///
/// One file in, one result out; parsing one workflow shares no state with
/// any other, so failures stay contained to their file.
pub struct WorkflowParser {
    config: ParsingConfig,
    tree_builder: ActivityTreeBuilder,
}

impl WorkflowParser {
    pub fn new(config: &ParsingConfig) -> Self {
        Self {
            config: config.clone(),
            tree_builder: ActivityTreeBuilder::new(config.max_depth),
        }
    }

    /// Parse a workflow from disk.
    pub fn parse_file(
        &self,
        absolute_path: &Path,
        relative_path: &str,
        workflow_id: &str,
        identity: &IdentityGenerator,
    ) -> Result<ParsedWorkflow> {
        let source = std::fs::read_to_string(absolute_path)?;

        if source.len() > self.config.max_file_size {
            return Err(FlowlensError::Parse {
                path: absolute_path.to_path_buf(),
                message: format!(
                    "file exceeds maximum size of {} bytes",
                    self.config.max_file_size
                ),
            });
        }

        self.parse_source(&source, relative_path, workflow_id, identity)
    }

    /// Parse a workflow from in-memory XAML text.
    ///
    /// Malformed XML is fatal for this file only: the caller gets a
    /// structured error and moves on to the next workflow.
    pub fn parse_source(
        &self,
        source: &str,
        relative_path: &str,
        workflow_id: &str,
        identity: &IdentityGenerator,
    ) -> Result<ParsedWorkflow> {
        let doc = roxmltree::Document::parse(source).map_err(|e| FlowlensError::Parse {
            path: relative_path.into(),
            message: e.to_string(),
        })?;

        let root = doc.root_element();
        let display_name = workflow_display_name(relative_path);

        let document = WorkflowDocument::extract(root, workflow_id, relative_path, &display_name);
        let tree = self
            .tree_builder
            .build(root, workflow_id, &display_name, identity);

        Ok(ParsedWorkflow {
            document,
            root_activity: tree.root,
            invocations: tree.invocations,
            visible_texts: tree.visible_texts,
            warnings: tree.warnings,
        })
    }
}

/// Display name for a workflow: its file stem.
pub fn workflow_display_name(relative_path: &str) -> String {
    Path::new(relative_path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| relative_path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_xml_is_a_structured_parse_error() {
        let parser = WorkflowParser::new(&ParsingConfig {
            workflow_extensions: vec!["xaml".to_string()],
            max_file_size: 1024,
            max_depth: 64,
        });
        let identity = IdentityGenerator::new("p");

        let result = parser.parse_source("<Sequence><Unclosed>", "Bad.xaml", "p#Bad.xaml", &identity);
        assert!(matches!(result, Err(FlowlensError::Parse { .. })));
    }

    #[test]
    fn test_parse_source_produces_document_and_tree() {
        let parser = WorkflowParser::new(&ParsingConfig {
            workflow_extensions: vec!["xaml".to_string()],
            max_file_size: 1024 * 1024,
            max_depth: 64,
        });
        let identity = IdentityGenerator::new("p");

        let parsed = parser
            .parse_source(
                r#"<Sequence DisplayName="Main"><Assign DisplayName="a"/></Sequence>"#,
                "Flows/Main.xaml",
                "p#Flows/Main.xaml",
                &identity,
            )
            .unwrap();

        assert_eq!(parsed.document.display_name, "Main");
        assert_eq!(parsed.root_activity.node_id, "/Sequence[0]");
        assert!(parsed.invocations.is_empty());
    }
}
