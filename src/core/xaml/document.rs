use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use super::namespaces::{local_tag, NamespaceMap};

/// Core container tags that open a variable scope.
const SCOPE_CONTAINERS: &[&str] = &["Sequence", "TryCatch", "Flowchart", "Parallel", "StateMachine"];

/// Direction of a workflow argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArgumentDirection {
    In,
    Out,
    InOut,
}

impl ArgumentDirection {
    /// Parse the direction out of a type signature such as
    /// `InArgument(x:String)`. Defaults to `In`.
    pub fn from_type_signature(signature: &str) -> Self {
        if signature.contains("InOutArgument") {
            ArgumentDirection::InOut
        } else if signature.contains("OutArgument") {
            ArgumentDirection::Out
        } else {
            ArgumentDirection::In
        }
    }
}

/// A workflow argument declared in the `x:Members` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Argument {
    pub name: String,
    pub type_signature: String,
    pub direction: ArgumentDirection,
    pub default_value: Option<String>,
    pub annotation: Option<String>,
}

/// A variable declared anywhere in the workflow tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub var_type: Option<String>,
    pub default_value: Option<String>,
    /// Nearest enclosing core-container tag, or "workflow"
    pub scope: String,
}

/// File-level metadata for one parsed workflow. Immutable after
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocument {
    pub workflow_id: String,
    /// POSIX-normalized path relative to the project root
    pub path: String,
    pub display_name: String,
    pub namespaces: BTreeMap<String, String>,
    pub expression_language: String,
    pub assembly_references: Vec<String>,
    pub imports: Vec<String>,
    pub root_annotation: Option<String>,
    pub arguments: Vec<Argument>,
    pub variables: Vec<Variable>,
}

impl WorkflowDocument {
    /// Extract workflow-level metadata from a parsed root.
    ///
    /// Runs independently of the activity tree builder, as its own pass
    /// over the same document.
    pub fn extract(
        root: roxmltree::Node<'_, '_>,
        workflow_id: &str,
        relative_path: &str,
        display_name: &str,
    ) -> Self {
        let namespaces = NamespaceMap::from_root(root).entries().clone();

        Self {
            workflow_id: workflow_id.to_string(),
            path: relative_path.to_string(),
            display_name: display_name.to_string(),
            namespaces,
            expression_language: extract_expression_language(root),
            assembly_references: extract_assembly_references(root),
            imports: extract_imports(root),
            root_annotation: extract_root_annotation(root),
            arguments: extract_arguments(root),
            variables: extract_variables(root),
        }
    }
}

fn extract_expression_language(root: roxmltree::Node<'_, '_>) -> String {
    root.attributes()
        .find(|a| a.name().contains("ExpressionActivityEditor"))
        .map(|a| a.value().to_string())
        .unwrap_or_else(|| "VisualBasic".to_string())
}

/// Arguments live in the `x:Members` block as `x:Property` entries;
/// defaults are attributes on the root named `ClassName.ArgumentName`.
fn extract_arguments(root: roxmltree::Node<'_, '_>) -> Vec<Argument> {
    let mut arguments = Vec::new();

    let members = root
        .descendants()
        .find(|n| n.is_element() && local_tag(n.tag_name().name()) == "Members");

    if let Some(members) = members {
        for property in members
            .children()
            .filter(|c| c.is_element() && local_tag(c.tag_name().name()) == "Property")
        {
            let name = property
                .attributes()
                .find(|a| a.name() == "Name")
                .map(|a| a.value().to_string());
            let Some(name) = name else { continue };

            let type_signature = property
                .attributes()
                .find(|a| a.name() == "Type")
                .map(|a| a.value().to_string())
                .unwrap_or_default();
            let annotation = property
                .attributes()
                .find(|a| a.name().contains("AnnotationText"))
                .map(|a| a.value().to_string());

            // Default values are recorded on the root as dotted
            // `ClassName.ArgumentName` attributes.
            let default_value = root
                .attributes()
                .find(|a| {
                    a.name()
                        .rsplit_once('.')
                        .map(|(_, arg)| arg == name)
                        .unwrap_or(false)
                })
                .map(|a| a.value().to_string());

            arguments.push(Argument {
                direction: ArgumentDirection::from_type_signature(&type_signature),
                name,
                type_signature,
                default_value,
                annotation,
            });
        }
    }

    arguments
}

/// Every `*Variable` element anywhere in the tree, scoped to the nearest
/// enclosing core-container tag.
fn extract_variables(root: roxmltree::Node<'_, '_>) -> Vec<Variable> {
    let mut variables = Vec::new();

    for node in root.descendants().filter(|n| n.is_element()) {
        let tag = local_tag(node.tag_name().name());
        if !tag.ends_with("Variable") {
            continue;
        }

        let name = node
            .attributes()
            .find(|a| a.name() == "Name")
            .map(|a| a.value().to_string());
        let Some(name) = name else { continue };

        let var_type = node
            .attributes()
            .find(|a| a.name() == "TypeArguments")
            .map(|a| a.value().to_string());
        let default_value = node
            .attributes()
            .find(|a| a.name() == "Default")
            .map(|a| a.value().to_string());

        let scope = node
            .ancestors()
            .skip(1)
            .filter(|n| n.is_element())
            .map(|n| local_tag(n.tag_name().name()))
            .find(|tag| SCOPE_CONTAINERS.contains(tag))
            .unwrap_or("workflow")
            .to_string();

        variables.push(Variable {
            name,
            var_type,
            default_value,
            scope,
        });
    }

    variables
}

fn extract_imports(root: roxmltree::Node<'_, '_>) -> Vec<String> {
    collect_string_entries(root, "NamespacesForImplementation")
}

fn extract_assembly_references(root: roxmltree::Node<'_, '_>) -> Vec<String> {
    let mut refs = collect_string_entries(root, "ReferencesForImplementation");

    for node in root.descendants().filter(|n| n.is_element()) {
        if local_tag(node.tag_name().name()) == "AssemblyReference" {
            if let Some(text) = element_text(node) {
                refs.push(text);
            }
        }
    }

    refs.sort();
    refs.dedup();
    refs
}

/// First annotation attribute on the root, else on the first Sequence in
/// document order.
fn extract_root_annotation(root: roxmltree::Node<'_, '_>) -> Option<String> {
    let own = root
        .attributes()
        .find(|a| a.name().contains("AnnotationText"))
        .map(|a| a.value().to_string());
    if own.is_some() {
        return own;
    }

    root.descendants()
        .filter(|n| n.is_element() && local_tag(n.tag_name().name()) == "Sequence")
        .find_map(|n| {
            n.attributes()
                .find(|a| a.name().contains("AnnotationText"))
                .map(|a| a.value().to_string())
        })
}

/// Text content of `x:String` children under a named block element.
fn collect_string_entries(root: roxmltree::Node<'_, '_>, block_tag: &str) -> Vec<String> {
    let mut entries = Vec::new();
    for node in root.descendants().filter(|n| n.is_element()) {
        if local_tag(node.tag_name().name()) != block_tag {
            continue;
        }
        for child in node.descendants().filter(|c| c.is_element()) {
            if local_tag(child.tag_name().name()) == "String" {
                if let Some(text) = element_text(child) {
                    entries.push(text);
                }
            }
        }
    }
    entries
}

fn element_text(node: roxmltree::Node<'_, '_>) -> Option<String> {
    let text = node
        .children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect::<String>();
    let text = text.trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
