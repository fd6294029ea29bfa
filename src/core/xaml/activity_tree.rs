use std::collections::{BTreeMap, HashMap, HashSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::core::value::ConfigValue;
use super::expressions::{Expression, ExpressionDetector};
use super::identity::{self, IdentityGenerator};
use super::namespaces::local_tag;
use super::visibility::VisibilityClassifier;
use super::ParseWarning;

/// Activity type assigned to invocation nodes.
pub const INVOKE_WORKFLOW_TAG: &str = "InvokeWorkflowFile";

/// Attribute names considered business-relevant enough to surface as
/// activity properties.
const PROPERTY_WHITELIST: &[&str] = &[
    "DisplayName",
    "WorkflowFileName",
    "Condition",
    "To",
    "Value",
    "Text",
    "Message",
    "Source",
    "Destination",
    "FileName",
    "Url",
    "Selector",
    "Timeout",
    "TimeoutMS",
    "ContinueOnError",
    "Range",
    "SheetName",
    "Result",
];

/// One node in a workflow's activity tree.
///
/// Immutable once the tree builder returns. `activity_id` is
/// content-addressed: identical (project, workflow, node path, semantic
/// content) always reproduces the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub activity_id: String,
    pub workflow_id: String,
    pub activity_type: String,
    pub display_name: String,
    /// Hierarchical sibling-indexed path, e.g. `/Sequence[0]/If[1]/Then/Click[0]`
    pub node_id: String,
    pub depth: usize,
    pub parent_activity_id: Option<String>,
    /// All business-visible attributes, verbatim
    pub arguments: BTreeMap<String, ConfigValue>,
    /// Recursively serialized nested configuration elements
    pub configuration: BTreeMap<String, ConfigValue>,
    /// Whitelisted business-relevant attributes
    pub properties: BTreeMap<String, ConfigValue>,
    /// Technical designer/viewstate attributes and elements
    pub metadata: BTreeMap<String, ConfigValue>,
    pub expressions: Vec<Expression>,
    pub variables_referenced: Vec<String>,
    pub selectors: Vec<String>,
    pub annotation: Option<String>,
    pub is_visible: bool,
    /// Structural container this activity sits in (Then, Else, Catches, …)
    /// or the parent activity's type
    pub container_type: Option<String>,
    /// For InvokeWorkflowFile activities: the written target, unresolved
    pub invocation_target: Option<String>,
    pub children: Vec<Activity>,
}

/// An invocation site found during tree construction, before resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInvocation {
    pub node_id: String,
    pub activity_id: String,
    pub activity_name: String,
    /// The WorkflowFileName argument exactly as written
    pub target_raw: String,
    /// Invocation arguments keyed by target argument name
    pub arguments: BTreeMap<String, String>,
}

/// Per-activity extraction failure. Isolated: the failing subtree is
/// skipped and recorded as a warning, the rest of the tree still builds.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("duplicate node id {node_id}")]
    DuplicateNodeId { node_id: String },
}

/// Result of one tree build.
#[derive(Debug, Clone)]
pub struct ActivityTree {
    pub root: Activity,
    pub invocations: Vec<RawInvocation>,
    /// Raw attribute/text values of visible activities as
    /// `(node_id, text)`, for the fallback dynamic-invocation scan.
    /// Technical metadata never lands here.
    pub visible_texts: Vec<(String, String)>,
    pub warnings: Vec<ParseWarning>,
}

struct ArenaNode {
    activity: Activity,
    parent: Option<usize>,
}

struct Frame<'a, 'input> {
    node: roxmltree::Node<'a, 'input>,
    /// Arena index of the nearest visible ancestor
    parent: Option<usize>,
    /// Full node path for this element (includes its own segment)
    path: String,
    /// Depth this element's activity gets if visible
    depth: usize,
    visible: bool,
    container: Option<String>,
}

/// Builds the activity tree for one workflow in a single pass.
///
/// The walk runs over an explicit work stack with an arena of finished
/// nodes, so document nesting never touches the call stack; the depth cap
/// is a policy check at push time. Sibling counters are scoped to one
/// build and keyed per immediate parent element.
pub struct ActivityTreeBuilder {
    classifier: VisibilityClassifier,
    detector: ExpressionDetector,
    max_depth: usize,
}

impl ActivityTreeBuilder {
    pub fn new(max_depth: usize) -> Self {
        Self {
            classifier: VisibilityClassifier::new(),
            detector: ExpressionDetector::new(),
            max_depth,
        }
    }

    /// Build the tree rooted at the document's root element.
    ///
    /// Returns a synthetic `Workflow` root when the document has more than
    /// one visible top-level activity.
    pub fn build(
        &self,
        root: roxmltree::Node<'_, '_>,
        workflow_id: &str,
        workflow_name: &str,
        identity: &IdentityGenerator,
    ) -> ActivityTree {
        let mut arena: Vec<ArenaNode> = Vec::new();
        let mut invocations: Vec<RawInvocation> = Vec::new();
        let mut visible_texts: Vec<(String, String)> = Vec::new();
        let mut warnings: Vec<ParseWarning> = Vec::new();
        let mut seen_node_ids: HashSet<String> = HashSet::new();
        let mut stack: Vec<Frame> = Vec::new();

        // The document root element is the workflow envelope: when it is
        // not itself a visible activity it contributes no path segment.
        let root_attrs = collect_attributes(root);
        let root_tag = local_tag(root.tag_name().name()).to_string();
        let root_visible =
            self.classifier
                .is_visible(&root_tag, &root_attrs, root.tag_name().namespace());
        if root_visible {
            stack.push(Frame {
                node: root,
                parent: None,
                path: format!("/{}[0]", root_tag),
                depth: 0,
                visible: true,
                container: None,
            });
        } else {
            stack.push(Frame {
                node: root,
                parent: None,
                path: String::new(),
                depth: 0,
                visible: false,
                container: None,
            });
        }

        while let Some(frame) = stack.pop() {
            let parent_for_children;
            let child_depth;
            let child_container;

            if frame.visible {
                match self.extract_activity(&frame, workflow_id, identity, &arena, &mut seen_node_ids)
                {
                    Ok(extracted) => {
                        let node_id = extracted.activity.node_id.clone();
                        visible_texts
                            .extend(extracted.texts.into_iter().map(|t| (node_id.clone(), t)));
                        if let Some(invocation) = extracted.invocation {
                            invocations.push(invocation);
                        }
                        let tag = extracted.activity.activity_type.clone();
                        arena.push(ArenaNode {
                            activity: extracted.activity,
                            parent: frame.parent,
                        });
                        parent_for_children = Some(arena.len() - 1);
                        child_depth = frame.depth + 1;
                        child_container = Some(tag);
                    }
                    Err(e) => {
                        warnings.push(ParseWarning {
                            node_id: frame.path.clone(),
                            message: format!("activity extraction failed: {}", e),
                        });
                        continue;
                    }
                }
            } else {
                parent_for_children = frame.parent;
                child_depth = frame.depth;
                child_container = if frame.path.is_empty() {
                    None
                } else {
                    Some(local_tag(frame.node.tag_name().name()).to_string())
                };
            }

            self.push_children(
                &frame,
                parent_for_children,
                child_depth,
                child_container,
                &mut stack,
                &mut warnings,
            );
        }

        let root_activity =
            self.assemble(arena, workflow_id, workflow_name, identity, &mut warnings);

        ActivityTree {
            root: root_activity,
            invocations,
            visible_texts,
            warnings,
        }
    }

    /// Classify and enqueue the element children of one frame.
    ///
    /// Visible children get a `Tag[i]` segment where `i` counts prior
    /// visible same-tag siblings under this element only; invisible
    /// children with visible descendants get a bare `Tag` segment;
    /// everything else is folded into the parent activity during
    /// extraction and is not traversed.
    fn push_children<'a, 'input>(
        &self,
        frame: &Frame<'a, 'input>,
        parent: Option<usize>,
        child_depth: usize,
        container: Option<String>,
        stack: &mut Vec<Frame<'a, 'input>>,
        warnings: &mut Vec<ParseWarning>,
    ) {
        let mut counters: HashMap<String, usize> = HashMap::new();
        let mut pending: Vec<Frame<'a, 'input>> = Vec::new();

        for child in frame.node.children().filter(|c| c.is_element()) {
            let tag = local_tag(child.tag_name().name()).to_string();
            let attrs = collect_attributes(child);
            let visible =
                self.classifier
                    .is_visible(&tag, &attrs, child.tag_name().namespace());

            if visible {
                let index = counters.entry(tag.clone()).or_insert(0);
                let path = format!("{}/{}[{}]", frame.path, tag, index);
                *index += 1;

                if child_depth > self.max_depth {
                    warn!("truncating activity subtree at {}: depth cap {} exceeded", path, self.max_depth);
                    warnings.push(ParseWarning {
                        node_id: path,
                        message: format!("subtree truncated: depth exceeds cap of {}", self.max_depth),
                    });
                    continue;
                }

                pending.push(Frame {
                    node: child,
                    parent,
                    path,
                    depth: child_depth,
                    visible: true,
                    container: container.clone(),
                });
            } else if self.subtree_has_visible(child) {
                pending.push(Frame {
                    node: child,
                    parent,
                    path: format!("{}/{}", frame.path, tag),
                    depth: child_depth,
                    visible: false,
                    container: container.clone(),
                });
            }
            // Leaf configuration/metadata children are folded into the
            // owning activity by extract_activity, not traversed.
        }

        // Reverse so the stack pops children in document order.
        while let Some(f) = pending.pop() {
            stack.push(f);
        }
    }

    /// Whether any element in this subtree (self included) is visible.
    fn subtree_has_visible(&self, node: roxmltree::Node<'_, '_>) -> bool {
        node.descendants().filter(|n| n.is_element()).any(|n| {
            let tag = local_tag(n.tag_name().name());
            let attrs = collect_attributes(n);
            self.classifier.is_visible(tag, &attrs, n.tag_name().namespace())
        })
    }

    fn extract_activity(
        &self,
        frame: &Frame<'_, '_>,
        workflow_id: &str,
        identity: &IdentityGenerator,
        arena: &[ArenaNode],
        seen_node_ids: &mut HashSet<String>,
    ) -> Result<ExtractedActivity, ExtractionError> {
        let node = frame.node;
        let activity_type = local_tag(node.tag_name().name()).to_string();
        let node_id = frame.path.clone();

        if !seen_node_ids.insert(node_id.clone()) {
            return Err(ExtractionError::DuplicateNodeId { node_id });
        }

        let mut arguments: BTreeMap<String, ConfigValue> = BTreeMap::new();
        let mut properties: BTreeMap<String, ConfigValue> = BTreeMap::new();
        let mut metadata: BTreeMap<String, ConfigValue> = BTreeMap::new();
        let mut expressions: Vec<Expression> = Vec::new();
        let mut selectors: Vec<String> = Vec::new();
        let mut annotation: Option<String> = None;
        let mut texts: Vec<String> = Vec::new();

        for attr in node.attributes() {
            let name = attr.name().to_string();
            let value = attr.value();

            if name.contains("AnnotationText") {
                annotation = Some(value.to_string());
                continue;
            }
            if is_technical_attribute(&name) {
                metadata.insert(name, ConfigValue::from_raw(value));
                continue;
            }

            if name.contains("Selector") {
                selectors.push(value.to_string());
            }
            if PROPERTY_WHITELIST.contains(&name.as_str()) {
                properties.insert(name.clone(), ConfigValue::from_raw(value));
            }
            if self.detector.is_expression(value) {
                expressions.push(Expression {
                    source: name.clone(),
                    text: value.to_string(),
                    role: self.detector.classify_role(&name),
                });
            }
            texts.push(value.to_string());
            arguments.insert(name, ConfigValue::from_raw(value));
        }

        // Direct text content (expression bodies of simple activities).
        let text = node
            .children()
            .filter(|c| c.is_text())
            .filter_map(|c| c.text())
            .collect::<String>();
        let text = text.trim();
        if !text.is_empty() {
            if self.detector.is_expression(text) {
                expressions.push(Expression {
                    source: "text".to_string(),
                    text: text.to_string(),
                    role: self.detector.classify_role("text"),
                });
            }
            texts.push(text.to_string());
        }

        // Nested non-activity children become configuration (business) or
        // metadata (designer state), preserved recursively.
        let mut configuration: BTreeMap<String, ConfigValue> = BTreeMap::new();
        for child in node.children().filter(|c| c.is_element()) {
            let tag = local_tag(child.tag_name().name()).to_string();
            let attrs = collect_attributes(child);
            let visible =
                self.classifier
                    .is_visible(&tag, &attrs, child.tag_name().namespace());
            if visible || self.subtree_has_visible(child) {
                continue;
            }

            let serialized = serialize_element(child);
            let bucket = if is_technical_attribute(&tag) {
                &mut metadata
            } else {
                &mut configuration
            };
            insert_grouped(bucket, tag, serialized);
        }

        let mut variables_referenced: HashSet<String> = HashSet::new();
        for expression in &expressions {
            for name in self.detector.extract_variable_references(&expression.text) {
                variables_referenced.insert(name);
            }
        }
        let mut variables_referenced: Vec<String> = variables_referenced.into_iter().collect();
        variables_referenced.sort();

        let display_name = arguments
            .get("DisplayName")
            .and_then(|v| v.as_str())
            .unwrap_or(&activity_type)
            .to_string();

        let canonical =
            identity::canonical_content(&activity_type, &arguments, &properties, &configuration);
        let activity_id = identity.activity_id(workflow_id, &node_id, &canonical);
        let parent_activity_id = frame
            .parent
            .map(|idx| arena[idx].activity.activity_id.clone());

        let invocation = if activity_type == INVOKE_WORKFLOW_TAG {
            let target_raw = arguments
                .get("WorkflowFileName")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            Some(RawInvocation {
                node_id: node_id.clone(),
                activity_id: activity_id.clone(),
                activity_name: display_name.clone(),
                target_raw,
                arguments: extract_invoke_arguments(node),
            })
        } else {
            None
        };

        let activity = Activity {
            activity_id,
            workflow_id: workflow_id.to_string(),
            invocation_target: invocation.as_ref().map(|i| i.target_raw.clone()),
            activity_type,
            display_name,
            node_id,
            depth: frame.depth,
            parent_activity_id,
            arguments,
            configuration,
            properties,
            metadata,
            expressions,
            variables_referenced,
            selectors,
            annotation,
            is_visible: true,
            container_type: frame.container.clone(),
            children: Vec::new(),
        };

        Ok(ExtractedActivity {
            activity,
            invocation,
            texts,
        })
    }

    /// Turn the preorder arena into an owned tree, wrapping multiple roots
    /// in a synthetic `Workflow` activity.
    fn assemble(
        &self,
        arena: Vec<ArenaNode>,
        workflow_id: &str,
        workflow_name: &str,
        identity: &IdentityGenerator,
        warnings: &mut Vec<ParseWarning>,
    ) -> Activity {
        let mut synthetic_root = self.synthetic_root(workflow_id, workflow_name, identity);

        if arena.is_empty() {
            warnings.push(ParseWarning {
                node_id: synthetic_root.node_id.clone(),
                message: "workflow contains no visible activities".to_string(),
            });
            return synthetic_root;
        }

        let root_count = arena.iter().filter(|n| n.parent.is_none()).count();
        let mut parents: Vec<Option<usize>> = Vec::with_capacity(arena.len());
        let mut nodes: Vec<Option<Activity>> = Vec::with_capacity(arena.len());
        for entry in arena {
            parents.push(entry.parent);
            nodes.push(Some(entry.activity));
        }

        // Attach children to parents from the back: in preorder every
        // child index is greater than its parent's, so each node is
        // complete before it is attached.
        for idx in (0..nodes.len()).rev() {
            if let Some(parent_idx) = parents[idx] {
                let child = nodes[idx].take().expect("child already attached");
                let parent = nodes[parent_idx]
                    .as_mut()
                    .expect("parent attached before child");
                parent.children.insert(0, child);
            }
        }

        if root_count == 1 {
            let mut root = None;
            for slot in nodes.iter_mut() {
                if let Some(activity) = slot.take() {
                    root = Some(activity);
                    break;
                }
            }
            root.expect("single root present")
        } else {
            // Multiple top-level activities: re-parent them under the
            // synthetic root one level down.
            let mut top_level: Vec<Activity> = nodes.into_iter().flatten().collect();
            for activity in top_level.iter_mut() {
                bump_depth(activity, 1);
                activity.parent_activity_id = Some(synthetic_root.activity_id.clone());
            }
            synthetic_root.children = top_level;
            synthetic_root
        }
    }

    fn synthetic_root(
        &self,
        workflow_id: &str,
        workflow_name: &str,
        identity: &IdentityGenerator,
    ) -> Activity {
        let node_id = "/Workflow[0]".to_string();
        let canonical = identity::canonical_content(
            "Workflow",
            &BTreeMap::new(),
            &BTreeMap::new(),
            &BTreeMap::new(),
        );
        Activity {
            activity_id: identity.activity_id(workflow_id, &node_id, &canonical),
            workflow_id: workflow_id.to_string(),
            activity_type: "Workflow".to_string(),
            display_name: workflow_name.to_string(),
            node_id,
            depth: 0,
            parent_activity_id: None,
            arguments: BTreeMap::new(),
            configuration: BTreeMap::new(),
            properties: BTreeMap::new(),
            metadata: BTreeMap::new(),
            expressions: Vec::new(),
            variables_referenced: Vec::new(),
            selectors: Vec::new(),
            annotation: None,
            is_visible: true,
            container_type: None,
            invocation_target: None,
            children: Vec::new(),
        }
    }
}

struct ExtractedActivity {
    activity: Activity,
    invocation: Option<RawInvocation>,
    texts: Vec<String>,
}

fn bump_depth(activity: &mut Activity, by: usize) {
    activity.depth += by;
    for child in activity.children.iter_mut() {
        bump_depth(child, by);
    }
}

/// Attribute map with namespace-stripped names. Namespace declarations are
/// not attributes in roxmltree, so they never show up here.
fn collect_attributes(node: roxmltree::Node<'_, '_>) -> BTreeMap<String, String> {
    node.attributes()
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect()
}

/// Designer/viewstate attribute and element names that carry no business
/// meaning.
fn is_technical_attribute(name: &str) -> bool {
    name.contains("ViewState")
        || name.contains("HintSize")
        || name.contains("IdRef")
        || name == "Ignorable"
        || name == "Class"
}

/// Recursively serialize an XML element into a [`ConfigValue`], preserving
/// attributes, text, and children.
fn serialize_element(node: roxmltree::Node<'_, '_>) -> ConfigValue {
    let attrs: Vec<(String, String)> = node
        .attributes()
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect();
    let element_children: Vec<roxmltree::Node> =
        node.children().filter(|c| c.is_element()).collect();
    let text = node
        .children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect::<String>();
    let text = text.trim().to_string();

    if attrs.is_empty() && element_children.is_empty() {
        return ConfigValue::from_raw(&text);
    }

    let mut map: BTreeMap<String, ConfigValue> = BTreeMap::new();
    for (name, value) in attrs {
        map.insert(name, ConfigValue::from_raw(&value));
    }
    if !text.is_empty() {
        map.insert("_text".to_string(), ConfigValue::from_raw(&text));
    }
    for child in element_children {
        let tag = local_tag(child.tag_name().name()).to_string();
        insert_grouped(&mut map, tag, serialize_element(child));
    }
    ConfigValue::Map(map)
}

/// Insert a value under a key, promoting repeated keys to a list.
fn insert_grouped(map: &mut BTreeMap<String, ConfigValue>, key: String, value: ConfigValue) {
    match map.remove(&key) {
        None => {
            map.insert(key, value);
        }
        Some(ConfigValue::List(mut items)) => {
            items.push(value);
            map.insert(key, ConfigValue::List(items));
        }
        Some(existing) => {
            map.insert(key, ConfigValue::List(vec![existing, value]));
        }
    }
}

/// Invocation arguments: descendant elements carrying an `x:Key`.
fn extract_invoke_arguments(node: roxmltree::Node<'_, '_>) -> BTreeMap<String, String> {
    let mut arguments = BTreeMap::new();
    for descendant in node.descendants().filter(|n| n.is_element()) {
        let key = descendant
            .attributes()
            .find(|a| a.name() == "Key")
            .map(|a| a.value().to_string());
        if let Some(key) = key {
            let value = descendant
                .children()
                .filter(|c| c.is_text())
                .filter_map(|c| c.text())
                .collect::<String>();
            arguments.insert(key, value.trim().to_string());
        }
    }
    arguments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(xml: &str) -> ActivityTree {
        let doc = roxmltree::Document::parse(xml).unwrap();
        let builder = ActivityTreeBuilder::new(64);
        let identity = IdentityGenerator::new("test-project");
        builder.build(doc.root_element(), "test-project#Main.xaml", "Main", &identity)
    }

    #[test]
    fn test_simple_sequence_node_ids_and_depths() {
        let tree = build(
            r#"<Sequence DisplayName="Main"><Assign DisplayName="Set x"/></Sequence>"#,
        );

        let root = &tree.root;
        assert_eq!(root.node_id, "/Sequence[0]");
        assert_eq!(root.depth, 0);
        assert_eq!(root.children.len(), 1);

        let assign = &root.children[0];
        assert_eq!(assign.node_id, "/Sequence[0]/Assign[0]");
        assert_eq!(assign.depth, 1);
        assert_eq!(assign.parent_activity_id.as_deref(), Some(root.activity_id.as_str()));
    }

    #[test]
    fn test_sibling_indices_count_only_visible_same_tag_siblings() {
        let tree = build(
            r#"<Sequence DisplayName="Main">
                 <Assign DisplayName="a"/>
                 <Sequence.Variables><Variable Name="x"/></Sequence.Variables>
                 <Assign DisplayName="b"/>
                 <WriteLine DisplayName="log" Text="hi"/>
                 <Assign DisplayName="c"/>
               </Sequence>"#,
        );

        let ids: Vec<&str> = tree.root.children.iter().map(|c| c.node_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "/Sequence[0]/Assign[0]",
                "/Sequence[0]/Assign[1]",
                "/Sequence[0]/WriteLine[0]",
                "/Sequence[0]/Assign[2]",
            ]
        );
    }

    #[test]
    fn test_structural_branch_contributes_bare_segment() {
        let tree = build(
            r#"<Sequence DisplayName="Main">
                 <Assign DisplayName="first"/>
                 <If DisplayName="check">
                   <If.Then>
                     <Click DisplayName="go"
                            xmlns="http://schemas.uipath.com/workflow/activities"/>
                   </If.Then>
                 </If>
               </Sequence>"#,
        );

        let if_activity = &tree.root.children[1];
        assert_eq!(if_activity.node_id, "/Sequence[0]/If[0]");

        let click = &if_activity.children[0];
        assert_eq!(click.node_id, "/Sequence[0]/If[0]/Then/Click[0]");
        // Then is structural: no extra depth level.
        assert_eq!(click.depth, 2);
        assert_eq!(click.container_type.as_deref(), Some("Then"));
    }

    #[test]
    fn test_node_ids_unique_within_tree() {
        let tree = build(
            r#"<Sequence DisplayName="Main">
                 <Sequence DisplayName="inner">
                   <Assign DisplayName="x"/>
                   <Assign DisplayName="y"/>
                 </Sequence>
                 <Sequence DisplayName="other">
                   <Assign DisplayName="z"/>
                 </Sequence>
               </Sequence>"#,
        );

        let mut seen = HashSet::new();
        let mut stack = vec![&tree.root];
        while let Some(activity) = stack.pop() {
            assert!(seen.insert(activity.node_id.clone()), "duplicate {}", activity.node_id);
            stack.extend(activity.children.iter());
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn test_viewstate_goes_to_metadata_not_arguments() {
        let tree = build(
            r#"<Sequence DisplayName="Main"
                         WorkflowViewState.IdRef="Sequence_1"
                         VirtualizedContainerService.HintSize="200,300"/>"#,
        );

        let root = &tree.root;
        assert!(root.metadata.contains_key("WorkflowViewState.IdRef"));
        assert!(root.metadata.contains_key("VirtualizedContainerService.HintSize"));
        assert!(!root.arguments.contains_key("WorkflowViewState.IdRef"));
    }

    #[test]
    fn test_identity_stable_under_viewstate_edit() {
        let before = build(
            r#"<Sequence DisplayName="Main" WorkflowViewState.IdRef="Sequence_1">
                 <Assign DisplayName="Set x" To="x" Value="1"/>
               </Sequence>"#,
        );
        let after = build(
            r#"<Sequence DisplayName="Main" WorkflowViewState.IdRef="Sequence_99">
                 <Assign DisplayName="Set x" To="x" Value="1"/>
               </Sequence>"#,
        );

        assert_eq!(before.root.activity_id, after.root.activity_id);
        assert_eq!(
            before.root.children[0].activity_id,
            after.root.children[0].activity_id
        );
    }

    #[test]
    fn test_identity_moves_under_argument_edit() {
        let before = build(
            r#"<Sequence DisplayName="Main"><Assign DisplayName="Set x" To="x" Value="1"/></Sequence>"#,
        );
        let after = build(
            r#"<Sequence DisplayName="Main"><Assign DisplayName="Set x" To="x" Value="2"/></Sequence>"#,
        );

        assert_ne!(
            before.root.children[0].activity_id,
            after.root.children[0].activity_id
        );
    }

    #[test]
    fn test_idempotent_parse() {
        let xml = r#"<Sequence DisplayName="Main">
                       <If DisplayName="check" Condition="[x &gt; 1]">
                         <If.Then><Assign DisplayName="set" To="y" Value="[x]"/></If.Then>
                       </If>
                     </Sequence>"#;
        let a = build(xml);
        let b = build(xml);

        let a_json = serde_json::to_string(&a.root).unwrap();
        let b_json = serde_json::to_string(&b.root).unwrap();
        assert_eq!(a_json, b_json);
    }

    #[test]
    fn test_synthetic_root_for_multiple_top_level_activities() {
        let tree = build(
            r#"<Members xmlns="ignore">
                 <Sequence DisplayName="a"/>
                 <Sequence DisplayName="b"/>
               </Members>"#,
        );

        assert_eq!(tree.root.activity_type, "Workflow");
        assert_eq!(tree.root.children.len(), 2);
        assert_eq!(tree.root.children[0].depth, 1);
    }

    #[test]
    fn test_depth_cap_truncates_with_warning() {
        // Five nested sequences under a cap of 2.
        let xml = r#"<Sequence DisplayName="0"><Sequence DisplayName="1">
                       <Sequence DisplayName="2"><Sequence DisplayName="3">
                         <Sequence DisplayName="4"/>
                       </Sequence></Sequence>
                     </Sequence></Sequence>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let builder = ActivityTreeBuilder::new(2);
        let identity = IdentityGenerator::new("p");
        let tree = builder.build(doc.root_element(), "p#w", "w", &identity);

        assert!(!tree.warnings.is_empty());
        // Depths 0..=2 survive, the rest is truncated.
        let mut max_depth = 0;
        let mut stack = vec![&tree.root];
        while let Some(a) = stack.pop() {
            max_depth = max_depth.max(a.depth);
            stack.extend(a.children.iter());
        }
        assert_eq!(max_depth, 2);
    }

    #[test]
    fn test_invoke_workflow_collects_invocation() {
        let tree = build(
            r#"<Sequence DisplayName="Main">
                 <InvokeWorkflowFile DisplayName="Call sub" WorkflowFileName="Sub.xaml">
                   <InvokeWorkflowFile.Arguments>
                     <InArgument Key="in_Config">[config]</InArgument>
                   </InvokeWorkflowFile.Arguments>
                 </InvokeWorkflowFile>
               </Sequence>"#,
        );

        assert_eq!(tree.invocations.len(), 1);
        let invocation = &tree.invocations[0];
        assert_eq!(invocation.target_raw, "Sub.xaml");
        assert_eq!(invocation.activity_name, "Call sub");
        assert_eq!(invocation.arguments.get("in_Config").map(String::as_str), Some("[config]"));
        assert_eq!(invocation.node_id, "/Sequence[0]/InvokeWorkflowFile[0]");
    }

    #[test]
    fn test_expressions_and_variable_references() {
        let tree = build(
            r#"<Sequence DisplayName="Main">
                 <If DisplayName="check" Condition="[isReady]">
                   <If.Then><Assign DisplayName="set" To="total" Value="[orderTotal.ToString()]"/></If.Then>
                 </If>
               </Sequence>"#,
        );

        let if_activity = &tree.root.children[0];
        assert_eq!(if_activity.expressions.len(), 1);
        assert_eq!(if_activity.expressions[0].role, crate::core::xaml::ExpressionRole::Condition);
        assert_eq!(if_activity.variables_referenced, vec!["isReady"]);

        let assign = &if_activity.children[0];
        assert_eq!(assign.variables_referenced, vec!["orderTotal"]);
    }
}
