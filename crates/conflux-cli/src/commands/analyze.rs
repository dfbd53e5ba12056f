//! Run both analyses and print the results

use anyhow::{Context, Result};
use conflux_analysis::{
    MetadataPropagationResolver, PropagationResult, TopologyReport, analyze_topology,
};
use conflux_core::TransportMode;
use serde::Serialize;

use crate::OutputFormat;
use crate::project::{self, Target};

/// Analysis results for one pipeline
#[derive(Debug, Serialize)]
struct PipelineReport {
    pipeline: String,
    file: String,
    topology: TopologyReport,
    metadata: PropagationResult,
}

/// Run the analyze command
pub async fn run(config_path: &str, pipeline: Option<&str>, format: OutputFormat) -> Result<()> {
    let selection = project::select(config_path, pipeline).await?;
    if selection.targets.is_empty() {
        tracing::warn!("No pipelines found");
    }

    let resolver = MetadataPropagationResolver::with_options(selection.analysis.into());
    let mut reports = Vec::with_capacity(selection.targets.len());
    for target in &selection.targets {
        reports.push(analyze(target, &resolver)?);
    }

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&reports)
                .context("Failed to serialize analysis report")?;
            println!("{json}");
        }
        OutputFormat::Text => {
            for report in &reports {
                print_text(report);
            }
        }
    }
    Ok(())
}

fn analyze(target: &Target, resolver: &MetadataPropagationResolver) -> Result<PipelineReport> {
    let name = &target.definition.name;
    tracing::info!("Analyzing pipeline '{}'", name);

    let mut pipeline = target
        .definition
        .build()
        .with_context(|| format!("Failed to build pipeline '{name}'"))?;
    let topology = analyze_topology(&mut pipeline)
        .with_context(|| format!("Transport analysis failed for pipeline '{name}'"))?;
    let metadata = resolver.resolve(&mut pipeline);

    tracing::debug!(
        "Pipeline '{}': {} edge(s), {} with metadata",
        name,
        topology.len(),
        metadata.resolved_count()
    );

    Ok(PipelineReport {
        pipeline: name.clone(),
        file: target.path.display().to_string(),
        topology,
        metadata,
    })
}

fn print_text(report: &PipelineReport) {
    println!("pipeline {} ({})", report.pipeline, report.file);

    for graph in report.topology.graphs() {
        let resolution = report.metadata.graph(graph.graph);
        match resolution.and_then(|r| r.parent.as_ref()) {
            Some(host) => println!("  graph {} (hosted by {})", graph.name, host),
            None => println!("  graph {}", graph.name),
        }

        let width = graph
            .edges
            .iter()
            .map(|e| e.edge.as_str().len())
            .max()
            .unwrap_or(0);
        for edge in &graph.edges {
            let metadata = resolution
                .and_then(|r| r.edge(edge.edge.as_str()))
                .and_then(|r| r.metadata.as_ref())
                .map_or("-", |m| m.schema().name.as_str());
            let pinned = match edge.pinned {
                Some(pin) if pin != edge.mode => format!("  (pinned {pin} ignored)"),
                _ => String::new(),
            };
            println!(
                "    {:<width$}  {:<14}  {}{}",
                edge.edge.as_str(),
                edge.mode.to_string(),
                metadata,
                pinned,
            );
        }
    }

    let topology = &report.topology;
    println!(
        "  {} edge(s): {} direct, {} buffered, {} phase boundary; {} without metadata",
        topology.len(),
        topology.count(TransportMode::Direct),
        topology.count(TransportMode::Buffered),
        topology.count(TransportMode::PhaseBoundary),
        report.metadata.len() - report.metadata.resolved_count(),
    );
}
