//! Validate pipeline definitions command

use anyhow::Result;
use conflux_analysis::{MetadataPropagationResolver, analyze_topology};
use conflux_core::EdgeRef;

use crate::project::{self, Target};

/// Run the validate command
pub async fn run(config_path: &str, pipeline: Option<&str>, require_metadata: bool) -> Result<()> {
    tracing::info!("Validating pipelines: {}", config_path);

    let selection = project::select(config_path, pipeline).await?;
    let require_metadata = require_metadata || selection.analysis.require_metadata;
    let resolver = MetadataPropagationResolver::with_options(selection.analysis.into());

    let mut failed = 0;
    for target in &selection.targets {
        if let Err(problems) = check(target, &resolver, require_metadata) {
            failed += 1;
            tracing::error!("✗ {} ({})", target.definition.name, target.path.display());
            for problem in problems {
                tracing::error!("    {}", problem);
            }
        }
    }

    if failed > 0 {
        anyhow::bail!(
            "{} of {} pipeline(s) failed validation",
            failed,
            selection.targets.len()
        );
    }

    tracing::info!("✓ {} pipeline(s) valid", selection.targets.len());
    Ok(())
}

/// Problems found in one pipeline, as printable lines
fn check(
    target: &Target,
    resolver: &MetadataPropagationResolver,
    require_metadata: bool,
) -> std::result::Result<(), Vec<String>> {
    let structural = |e: conflux_analysis::Error| {
        let mut problems = vec![e.to_string()];
        let components = e.offending_components();
        if !components.is_empty() {
            problems.push(format!("check components: {}", components.join(", ")));
        }
        problems
    };

    let mut pipeline = target
        .definition
        .build()
        .map_err(|e| structural(e.into()))?;
    pipeline.validate().map_err(|e| structural(e.into()))?;
    let topology = analyze_topology(&mut pipeline).map_err(structural)?;

    let metadata = resolver.resolve(&mut pipeline);
    let unresolved: Vec<EdgeRef> = metadata.unresolved().collect();
    if !unresolved.is_empty() {
        let edges: Vec<String> = unresolved.iter().map(ToString::to_string).collect();
        if require_metadata {
            return Err(vec![format!("no metadata for edge(s): {}", edges.join(", "))]);
        }
        tracing::warn!(
            "Pipeline '{}': no metadata for edge(s): {}",
            target.definition.name,
            edges.join(", ")
        );
    }

    tracing::info!(
        "✓ {} ({} graph(s), {} edge(s))",
        target.definition.name,
        topology.graphs().len(),
        topology.len()
    );
    Ok(())
}
