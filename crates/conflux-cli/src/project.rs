//! Locating the pipelines a command works on

use anyhow::{Context, Result};
use conflux_core::{AnalysisConfig, Config, Error, PipelineDefinition};
use std::path::{Path, PathBuf};

/// A pipeline definition and the file it came from
pub struct Target {
    /// Definition file
    pub path: PathBuf,
    /// Parsed definition
    pub definition: PipelineDefinition,
}

/// Pipelines selected on the command line, with the analysis settings that apply
pub struct Selection {
    /// Analysis settings from the project, or the defaults
    pub analysis: AnalysisConfig,
    /// Selected pipelines, in discovery order
    pub targets: Vec<Target>,
}

/// Resolve `pipeline` to definitions.
///
/// `pipeline` may be a definition file, which then works without a project
/// file, or the `name` of a project pipeline. Without it every project
/// pipeline is selected.
pub async fn select(config_path: &str, pipeline: Option<&str>) -> Result<Selection> {
    if let Some(file) = pipeline.map(Path::new).filter(|p| p.is_file()) {
        let analysis = match Config::load(config_path) {
            Ok(config) => config.project.analysis,
            Err(Error::ConfigNotFound { .. }) => AnalysisConfig::default(),
            Err(e) => return Err(e).context("Failed to load configuration"),
        };
        let target = read_target(file).await?;
        return Ok(Selection {
            analysis,
            targets: vec![target],
        });
    }

    let config = Config::load(config_path).context("Failed to load configuration")?;
    tracing::debug!(
        "Scanning {} for pipelines",
        config.pipelines_dir().display()
    );

    let mut targets = Vec::new();
    for path in config
        .pipeline_paths()
        .context("Failed to discover pipelines")?
    {
        let target = read_target(&path).await?;
        if pipeline.is_none_or(|name| target.definition.name == name) {
            targets.push(target);
        }
    }

    if let Some(name) = pipeline
        && targets.is_empty()
    {
        anyhow::bail!(
            "Pipeline not found: {} (looked in {})",
            name,
            config.pipelines_dir().display()
        );
    }

    Ok(Selection {
        analysis: config.project.analysis,
        targets,
    })
}

async fn read_target(path: &Path) -> Result<Target> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let definition = PipelineDefinition::from_yaml(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Target {
        path: path.to_path_buf(),
        definition,
    })
}
