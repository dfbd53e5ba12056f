//! Initialize a new Conflux project

use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// Run the init command
pub async fn run(path: &str, name: Option<&str>) -> Result<()> {
    let project_dir = Path::new(path);

    // Create directory if it doesn't exist
    fs::create_dir_all(project_dir)
        .await
        .with_context(|| format!("Failed to create {}", project_dir.display()))?;

    let abs_path = fs::canonicalize(project_dir).await?;

    // Derive project name from directory name if not provided
    let project_name = match name {
        Some(n) => n.to_string(),
        None => abs_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Could not determine project name from path"))?,
    };

    if project_dir.join("conflux.yaml").exists() {
        anyhow::bail!(
            "Directory '{}' already contains a conflux.yaml",
            project_dir.display()
        );
    }

    tracing::info!("Creating new Conflux project: {}", project_name);

    fs::create_dir_all(project_dir.join("pipelines")).await?;

    let config = format!(
        r#"# Conflux Project Configuration
name: {project_name}
version: "0.1.0"

# Directory scanned for pipeline definitions
pipelines: pipelines

analysis:
  # Record, for every edge, the metadata it would carry without its own assignment
  calculate_no_metadata: true
  # Fail validation when an edge's metadata cannot be resolved
  require_metadata: false
"#
    );
    fs::write(project_dir.join("conflux.yaml"), config).await?;

    let example_pipeline = r#"# Example pipeline
name: example_pipeline
description: Reads orders, copies them and writes them out in a later phase

metadata:
  order:
    fields:
      - { name: id, type: integer }
      - { name: customer, type: string }
      - { name: total, type: decimal }

components:
  - id: reader
    type: FLAT_FILE_READER
    outputs: 1
    defaults:
      outputs: { 0: order }

  - id: copy
    type: SIMPLE_COPY
    kind: pass_through
    inputs: 1
    outputs: 2

  - id: archive
    type: FLAT_FILE_WRITER
    inputs: 1

  - id: writer
    type: DB_WRITER
    phase: 1
    inputs: 1

edges:
  - { id: read_orders, from: "reader:0", to: "copy:0" }
  - { id: to_archive, from: "copy:0", to: "archive:0" }
  - { id: to_db, from: "copy:1", to: "writer:0" }
"#;
    fs::write(
        project_dir.join("pipelines/example_pipeline.yaml"),
        example_pipeline,
    )
    .await?;

    tracing::info!(
        "✓ Created project '{}' at {}",
        project_name,
        abs_path.display()
    );
    tracing::info!("");
    tracing::info!("Next steps:");
    if path != "." {
        tracing::info!("  cd {}", project_dir.display());
    }
    tracing::info!("  conflux validate    # Check pipeline structure");
    tracing::info!("  conflux analyze     # Show transport modes and metadata");

    Ok(())
}
