use std::collections::BTreeMap;

/// XML namespace URI used by the automation vendor's activity packages.
pub const AUTOMATION_ACTIVITIES_NS: &str = "http://schemas.uipath.com/workflow/activities";

/// Built-in namespaces every workflow declares, keyed by conventional prefix.
///
/// Declared `xmlns:*` attributes are merged over this table so renamed
/// prefixes still resolve.
const KNOWN_NAMESPACES: &[(&str, &str)] = &[
    ("", "http://schemas.microsoft.com/netfx/2009/xaml/activities"),
    ("x", "http://schemas.microsoft.com/winfx/2006/xaml"),
    ("ui", AUTOMATION_ACTIVITIES_NS),
    ("sap", "http://schemas.microsoft.com/netfx/2009/xaml/activities/presentation"),
    ("sap2010", "http://schemas.microsoft.com/netfx/2010/xaml/activities/presentation"),
    ("mc", "http://schemas.openxmlformats.org/markup-compatibility/2006"),
    ("mva", "clr-namespace:Microsoft.VisualBasic.Activities;assembly=System.Activities"),
    ("scg", "clr-namespace:System.Collections.Generic;assembly=mscorlib"),
    ("sco", "clr-namespace:System.Collections.ObjectModel;assembly=mscorlib"),
];

/// Strip any namespace qualification from an element or attribute name.
///
/// Handles both the prefixed form (`ui:Click`) and the expanded form
/// (`{http://…}Click`).
pub fn strip_namespace(name: &str) -> &str {
    if let Some(rest) = name.strip_prefix('{') {
        if let Some(idx) = rest.find('}') {
            return &rest[idx + 1..];
        }
    }
    match name.rfind(':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// Reduce a tag to its local name: namespace stripped, and for property
/// elements (`If.Then`, `TryCatch.Catches`) the owner prefix dropped.
pub fn local_tag(tag: &str) -> &str {
    let stripped = strip_namespace(tag);
    match stripped.rfind('.') {
        Some(idx) => &stripped[idx + 1..],
        None => stripped,
    }
}

/// Whether a namespace URI belongs to the automation activity packages.
pub fn is_activities_namespace(uri: &str) -> bool {
    uri.starts_with(AUTOMATION_ACTIVITIES_NS)
}

/// Prefix → URI map for one workflow: declared `xmlns:*` attributes merged
/// over the fixed known-namespace table.
#[derive(Debug, Clone, Default)]
pub struct NamespaceMap {
    entries: BTreeMap<String, String>,
}

impl NamespaceMap {
    pub fn from_root(root: roxmltree::Node<'_, '_>) -> Self {
        let mut entries: BTreeMap<String, String> = KNOWN_NAMESPACES
            .iter()
            .map(|(prefix, uri)| (prefix.to_string(), uri.to_string()))
            .collect();

        for ns in root.namespaces() {
            let prefix = ns.name().unwrap_or("").to_string();
            entries.insert(prefix, ns.uri().to_string());
        }

        Self { entries }
    }

    pub fn uri_for(&self, prefix: &str) -> Option<&str> {
        self.entries.get(prefix).map(|s| s.as_str())
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_namespace_forms() {
        assert_eq!(strip_namespace("ui:Click"), "Click");
        assert_eq!(strip_namespace("{http://schemas.uipath.com/workflow/activities}Click"), "Click");
        assert_eq!(strip_namespace("Sequence"), "Sequence");
    }

    #[test]
    fn test_local_tag_drops_property_owner() {
        assert_eq!(local_tag("If.Then"), "Then");
        assert_eq!(local_tag("ui:TryCatch.Catches"), "Catches");
        assert_eq!(local_tag("sap2010:WorkflowViewState.IdRef"), "IdRef");
        assert_eq!(local_tag("Sequence"), "Sequence");
    }

    #[test]
    fn test_declared_namespaces_override_known_table() {
        let xml = r#"<Activity xmlns="http://schemas.microsoft.com/netfx/2009/xaml/activities"
                               xmlns:ui="http://schemas.uipath.com/workflow/activities/custom"/>"#;
        let doc = roxmltree::Document::parse(xml).unwrap();
        let map = NamespaceMap::from_root(doc.root_element());

        assert_eq!(
            map.uri_for("ui"),
            Some("http://schemas.uipath.com/workflow/activities/custom")
        );
        assert_eq!(
            map.uri_for("x"),
            Some("http://schemas.microsoft.com/winfx/2006/xaml")
        );
    }

    #[test]
    fn test_activities_namespace_match() {
        assert!(is_activities_namespace(AUTOMATION_ACTIVITIES_NS));
        assert!(is_activities_namespace(
            "http://schemas.uipath.com/workflow/activities/ui"
        ));
        assert!(!is_activities_namespace(
            "http://schemas.microsoft.com/winfx/2006/xaml"
        ));
    }
}
