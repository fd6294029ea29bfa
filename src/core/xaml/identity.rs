use std::collections::BTreeMap;
use sha2::{Digest, Sha256};

use crate::core::value::ConfigValue;

/// Derives stable, content-addressed activity identifiers.
///
/// `activity_id = project_id#workflow_id#node_id#hash8(canonical_content)`
/// where the canonical content covers only business-visible state, so
/// cosmetic edits (viewstate, layout hints) never move an id while logic
/// edits always do.
pub struct IdentityGenerator {
    project_id: String,
}

impl IdentityGenerator {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Compose the full activity id for one tree node.
    pub fn activity_id(&self, workflow_id: &str, node_id: &str, canonical_content: &str) -> String {
        format!(
            "{}#{}#{}#{}",
            self.project_id,
            workflow_id,
            node_id,
            hash8(canonical_content)
        )
    }
}

/// First 8 hex characters of the SHA-256 digest.
pub fn hash8(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..8].to_string()
}

/// Deterministic serialization of an activity's semantic content.
///
/// Covers the activity type, sorted arguments, sorted business properties,
/// and the sorted configuration key set. Volatile metadata (ViewState,
/// IdRef, HintSize) is excluded by construction: the caller never passes
/// it in.
pub fn canonical_content(
    activity_type: &str,
    arguments: &BTreeMap<String, ConfigValue>,
    properties: &BTreeMap<String, ConfigValue>,
    configuration: &BTreeMap<String, ConfigValue>,
) -> String {
    let args: Vec<String> = arguments
        .iter()
        .map(|(k, v)| format!("{}={}", k, v.canonical_string()))
        .collect();
    let props: Vec<String> = properties
        .iter()
        .map(|(k, v)| format!("{}={}", k, v.canonical_string()))
        .collect();
    let config_keys: Vec<&str> = configuration.keys().map(|k| k.as_str()).collect();

    format!(
        "type={};args={{{}}};props={{{}}};config=[{}]",
        activity_type,
        args.join(","),
        props.join(","),
        config_keys.join(",")
    )
}
