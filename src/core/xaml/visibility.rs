use std::collections::{BTreeMap, HashSet};

use super::namespaces::is_activities_namespace;

/// Classifies XAML elements as user-visible activities vs. structural
/// metadata.
///
/// Invisible elements are still descended into by the tree builder; this
/// classifier only decides whether an element becomes an [`super::Activity`]
/// of its own.
pub struct VisibilityClassifier {
    /// Tags that never represent an activity, regardless of attributes
    blacklist: HashSet<&'static str>,
    /// Core container tags that are always activities
    whitelist: HashSet<&'static str>,
}

impl VisibilityClassifier {
    pub fn new() -> Self {
        let blacklist: HashSet<&'static str> = [
            // Workflow-level declarations
            "Members",
            "Property",
            "Variables",
            "Variable",
            "Arguments",
            "TypeArguments",
            "Imports",
            "References",
            "NamespacesForImplementation",
            "ReferencesForImplementation",
            "AssemblyReference",
            // Designer/viewstate metadata
            "ViewState",
            "ViewStateData",
            "ViewStateManager",
            "IdRef",
            "HintSize",
            "Annotation",
            // Structural branch containers
            "Then",
            "Else",
            "Catches",
            "Catch",
            "Finally",
            "Default",
            "Body",
            "Handler",
            "ActivityAction",
            "ActivityFunc",
            "DelegateInArgument",
            "DelegateOutArgument",
            // Collection plumbing
            "Collection",
            "Dictionary",
            "String",
            "Boolean",
            "Int32",
            "Object",
            "Null",
        ]
        .into_iter()
        .collect();

        let whitelist: HashSet<&'static str> = [
            "Sequence",
            "TryCatch",
            "Flowchart",
            "Parallel",
            "StateMachine",
        ]
        .into_iter()
        .collect();

        Self { blacklist, whitelist }
    }

    /// Decide visibility for one element.
    ///
    /// `tag` must already be reduced to its local name, `namespace` is the
    /// element's resolved namespace URI if any. Pure and stateless.
    pub fn is_visible(
        &self,
        tag: &str,
        attributes: &BTreeMap<String, String>,
        namespace: Option<&str>,
    ) -> bool {
        if self.blacklist.contains(tag) {
            return false;
        }

        if self.whitelist.contains(tag) {
            return true;
        }

        if attributes.contains_key("DisplayName") {
            return true;
        }

        matches!(namespace, Some(uri) if is_activities_namespace(uri))
    }
}

impl Default for VisibilityClassifier {
    fn default() -> Self {
        Self::new()
    }
}
