use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{InvocationConfig, ParsingConfig};
use crate::core::call_graph::normalize_posix;
use crate::error::{FlowlensError, Result};

/// Entry-point declaration inside the project manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPointDeclaration {
    pub file_path: String,
}

/// The project manifest (`project.json`): name, main workflow, and the
/// declared entry points.
///
/// An unreadable manifest is the one hard abort in the pipeline; every
/// other failure is contained to its file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    pub name: String,
    #[serde(default)]
    pub main: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub entry_points: Vec<EntryPointDeclaration>,
}

impl ProjectManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FlowlensError::Manifest(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| FlowlensError::Manifest(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// URL-safe slug for composite ids.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }

    /// Relative paths of all declared entry points, main first.
    pub fn entry_point_paths(&self, include_main: bool) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        if include_main {
            if let Some(main) = &self.main {
                paths.push(normalize_posix(main));
            }
        }
        for declaration in &self.entry_points {
            let normalized = normalize_posix(&declaration.file_path);
            if !paths.contains(&normalized) {
                paths.push(normalized);
            }
        }
        paths
    }
}

pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// One discovered workflow file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowIndexEntry {
    pub workflow_id: String,
    /// POSIX path relative to the project root
    pub relative_path: String,
    pub display_name: String,
    pub file_size: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Coded (non-XAML) workflow source, indexed as an opaque reference
    pub is_coded: bool,
}

/// All workflows of one project, keyed by relative path.
///
/// Invocation-target resolution and entry-point seeding both go through
/// this index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowIndex {
    entries: BTreeMap<String, WorkflowIndexEntry>,
}

impl WorkflowIndex {
    /// Walk the project root and index every workflow file.
    pub fn discover(
        root: &Path,
        project_slug: &str,
        parsing: &ParsingConfig,
        invocation: &InvocationConfig,
        ignore_patterns: &[String],
    ) -> Result<Self> {
        let mut entries = BTreeMap::new();

        let mut overrides = ignore::overrides::OverrideBuilder::new(root);
        for pattern in ignore_patterns {
            overrides
                .add(&format!("!{}", pattern))
                .map_err(|e| FlowlensError::Config(format!("bad ignore pattern {pattern}: {e}")))?;
        }
        let overrides = overrides
            .build()
            .map_err(|e| FlowlensError::Config(e.to_string()))?;

        let walker = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(true)
            .overrides(overrides)
            .build();
        for entry in walker {
            let entry = entry.map_err(|e| FlowlensError::FileSystem(e.to_string()))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let extension = extension.to_ascii_lowercase();
            let is_workflow = parsing.workflow_extensions.contains(&extension);
            let is_coded = invocation.coded_extensions.contains(&extension);
            if !is_workflow && !is_coded {
                continue;
            }

            let relative = path.strip_prefix(root).unwrap_or(path);
            let relative_path = normalize_posix(&relative.to_string_lossy());
            let metadata = std::fs::metadata(path)?;
            let modified = metadata.modified().ok().map(DateTime::<Utc>::from);

            let display_name = Path::new(&relative_path)
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| relative_path.clone());

            debug!("indexed workflow {}", relative_path);
            entries.insert(
                relative_path.clone(),
                WorkflowIndexEntry {
                    workflow_id: format!("{}#{}", project_slug, relative_path),
                    relative_path,
                    display_name,
                    file_size: metadata.len(),
                    modified,
                    is_coded,
                },
            );
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &WorkflowIndexEntry> {
        self.entries.values()
    }

    /// Parseable (non-coded) workflows only.
    pub fn workflow_entries(&self) -> impl Iterator<Item = &WorkflowIndexEntry> {
        self.entries.values().filter(|e| !e.is_coded)
    }

    pub fn by_path(&self, relative_path: &str) -> Option<&WorkflowIndexEntry> {
        self.entries.get(relative_path)
    }

    /// Resolve a written invocation target against the index.
    ///
    /// Exact relative-path match first (source-directory-relative, then
    /// project-root-relative), then filename-suffix match. Returns `None`
    /// for targets no indexed workflow can satisfy.
    pub fn resolve(&self, source_relative: &str, target: &str) -> Option<&WorkflowIndexEntry> {
        let normalized = normalize_posix(target);
        if normalized.is_empty() {
            return None;
        }

        let source_dir = Path::new(source_relative)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        let from_source = if source_dir.is_empty() {
            normalized.clone()
        } else {
            normalize_posix(&format!("{}/{}", source_dir, normalized))
        };

        if let Some(entry) = self.entries.get(&from_source) {
            return Some(entry);
        }
        if let Some(entry) = self.entries.get(&normalized) {
            return Some(entry);
        }

        // Filename-suffix fallback; BTreeMap order makes the pick
        // deterministic when several workflows share a filename.
        let filename = normalized.rsplit('/').next()?;
        self.entries.values().find(|entry| {
            entry.relative_path == filename
                || entry.relative_path.ends_with(&format!("/{}", filename))
        })
    }

    pub fn absolute_path(&self, root: &Path, entry: &WorkflowIndexEntry) -> PathBuf {
        root.join(&entry.relative_path)
    }
}
