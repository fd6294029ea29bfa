use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FlowlensError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Workflow parsing configuration
    pub parsing: ParsingConfig,

    /// Invocation classification settings
    pub invocation: InvocationConfig,

    /// Call graph construction settings
    pub graph: GraphConfig,

    /// Validation thresholds
    pub validation: ValidationConfig,

    /// Output settings
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project root directory
    pub root: PathBuf,

    /// Project manifest file name (relative to root)
    pub manifest: String,

    /// Directories to ignore during workflow discovery
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsingConfig {
    /// File extensions treated as XAML workflows
    pub workflow_extensions: Vec<String>,

    /// Maximum file size to parse (in bytes)
    pub max_file_size: usize,

    /// Maximum activity tree depth before a subtree is truncated
    pub max_depth: usize,
}

/// Heuristics for classifying invocation targets.
///
/// The indicator sets are deliberately approximate and have grown over
/// time; they are configuration data, not a complete classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationConfig {
    /// Substrings that mark a workflow file name as a dynamic expression
    pub dynamic_indicators: Vec<String>,

    /// File extensions that mark a target as a coded workflow
    pub coded_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Treat the manifest's main workflow as an entry point
    pub main_is_entry_point: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Maximum number of invoke-missing edges before validation fails
    pub max_missing_invocations: usize,

    /// Whether cycles produce a warning
    pub warn_on_cycles: bool,

    /// Whether orphan workflows produce a warning
    pub warn_on_orphans: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for generated analysis artifacts
    pub output_dir: PathBuf,

    /// Pretty-print JSON artifacts
    pub pretty_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig {
                root: PathBuf::from("."),
                manifest: "project.json".to_string(),
                ignore_patterns: vec![
                    ".git/".to_string(),
                    ".local/".to_string(),
                    ".settings/".to_string(),
                    "*.tmp".to_string(),
                ],
            },
            parsing: ParsingConfig {
                workflow_extensions: vec!["xaml".to_string()],
                max_file_size: 4 * 1024 * 1024, // 4MB
                max_depth: 64,
            },
            invocation: InvocationConfig {
                dynamic_indicators: vec![
                    "[".to_string(),
                    "]".to_string(),
                    "Path.Combine".to_string(),
                    "+".to_string(),
                ],
                coded_extensions: vec!["cs".to_string(), "vb".to_string()],
            },
            graph: GraphConfig {
                main_is_entry_point: true,
            },
            validation: ValidationConfig {
                max_missing_invocations: 0,
                warn_on_cycles: true,
                warn_on_orphans: true,
            },
            output: OutputConfig {
                output_dir: PathBuf::from("flowlens-out"),
                pretty_json: true,
            },
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| FlowlensError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| FlowlensError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                // Try common config file locations
                let candidates = [
                    "Flowlens.toml",
                    "flowlens.toml",
                    ".flowlens.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }
}
