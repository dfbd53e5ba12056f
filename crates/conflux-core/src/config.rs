//! Project configuration
//!
//! This module handles loading the Conflux project file and discovering the
//! pipeline definitions that belong to the project.
//!
//! # Configuration Files
//!
//! - `conflux.yaml` - Project root configuration
//! - `pipelines/**/*.yaml` - Pipeline definitions

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::definition::PipelineDefinition;
use crate::error::{Error, Result};

/// Root project configuration from `conflux.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,

    /// Directory holding pipeline definitions, relative to the project root
    #[serde(default = "default_pipelines_dir")]
    pub pipelines: String,

    /// Graph analysis settings
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_pipelines_dir() -> String {
    "pipelines".to_string()
}

/// Settings for the graph analyses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Also compute, for every edge, the metadata it would get without its
    /// own assignment. Costs one extra resolution per edge.
    #[serde(default = "default_true")]
    pub calculate_no_metadata: bool,

    /// Treat edges whose metadata cannot be resolved as validation failures
    #[serde(default)]
    pub require_metadata: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            calculate_no_metadata: true,
            require_metadata: false,
        }
    }
}

/// Main configuration container
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Base path of the project
    pub base_path: PathBuf,
}

impl Config {
    /// Load configuration from a directory
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the project directory or conflux.yaml file
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = Config::load("./my-project")?;
    /// println!("Project: {}", config.project.name);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_path) = if path.is_dir() {
            (path.join("conflux.yaml"), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let project: ProjectConfig = serde_yaml::from_str(&contents)?;

        Ok(Self { project, base_path })
    }

    /// Directory scanned for pipeline definitions
    pub fn pipelines_dir(&self) -> PathBuf {
        self.base_path.join(&self.project.pipelines)
    }

    /// Paths of every `*.yaml` / `*.yml` file below the pipelines directory, sorted
    pub fn pipeline_paths(&self) -> Result<Vec<PathBuf>> {
        let dir = self.pipelines_dir();
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(&dir) {
            let entry = entry.map_err(|e| Error::ConfigInvalid {
                message: format!("cannot scan {}: {}", dir.display(), e),
            })?;
            let is_yaml = entry
                .path()
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if entry.file_type().is_file() && is_yaml {
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Load every pipeline definition of the project
    pub fn load_pipelines(&self) -> Result<Vec<(PathBuf, PipelineDefinition)>> {
        self.pipeline_paths()?
            .into_iter()
            .map(|path| {
                let definition = PipelineDefinition::load(&path)?;
                Ok((path, definition))
            })
            .collect()
    }

    /// Find a pipeline definition by its `name`
    pub fn find_pipeline(&self, name: &str) -> Result<PipelineDefinition> {
        self.load_pipelines()?
            .into_iter()
            .map(|(_, definition)| definition)
            .find(|definition| definition.name == name)
            .ok_or_else(|| Error::ConfigInvalid {
                message: format!(
                    "no pipeline named '{}' in {}",
                    name,
                    self.pipelines_dir().display()
                ),
            })
    }
}
