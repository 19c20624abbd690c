use anyhow::{Context, Result};
use chartgraph_app::{Diagram, DiagramConfig};
use chartgraph_core::{EdgeId, NodeId, Vec2};
use chartgraph_graph::{GraphSnapshot, Multipart, visible_edges, visible_nodes};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Optional diagram config (JSON); defaults are used when absent
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a snapshot and print what is visible at a level
    Inspect {
        /// Path to the snapshot JSON file
        snapshot: PathBuf,

        /// Enter this sub-chart before reporting
        #[arg(short, long)]
        open: Option<u64>,

        /// Only report nodes with this export tag
        #[arg(short, long)]
        kind: Option<String>,
    },
}

#[derive(Serialize)]
struct NodeReport {
    id: NodeId,
    tag: &'static str,
    position: Vec2,
    size: Vec2,
    parent: Option<NodeId>,
    show_content: bool,
}

#[derive(Serialize)]
struct EdgeReport {
    id: EdgeId,
    source: Option<NodeId>,
    target: Option<NodeId>,
    from: Vec2,
    to: Vec2,
    multipart: Option<Multipart>,
}

#[derive(Serialize)]
struct LevelReport {
    level: Option<NodeId>,
    nodes: Vec<NodeReport>,
    edges: Vec<EdgeReport>,
    skipped_edges: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DiagramConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => DiagramConfig::default(),
    };

    match args.command {
        Command::Inspect {
            snapshot,
            open,
            kind,
        } => {
            let report = inspect(&snapshot, config, open.map(NodeId), kind.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn inspect(
    path: &Path,
    config: DiagramConfig,
    open: Option<NodeId>,
    kind: Option<&str>,
) -> Result<LevelReport> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading snapshot {}", path.display()))?;
    let snapshot: GraphSnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("parsing snapshot {}", path.display()))?;

    let (mut diagram, crafted) = Diagram::from_snapshot(&snapshot, config)?;
    if let Some(node) = open {
        diagram
            .jump_to(Some(node))
            .with_context(|| format!("opening sub-chart {node}"))?;
    }
    tracing::info!(
        nodes = diagram.graph().node_count(),
        edges = diagram.graph().edge_count(),
        level = ?diagram.current_level(),
        "snapshot loaded"
    );

    let level = diagram.current_level();
    let graph = diagram.graph();

    let mut nodes = Vec::new();
    for id in visible_nodes(graph, level) {
        let node = graph.require_node(id)?;
        let tag = node.kind.export_tag();
        if kind.is_some_and(|k| k != tag) {
            continue;
        }
        nodes.push(NodeReport {
            id,
            tag,
            position: node.position,
            size: node.size,
            parent: node.parent(),
            show_content: node.show_content,
        });
    }

    let mut edges = Vec::new();
    for id in visible_edges(graph, level) {
        let edge = graph.require_edge(id)?;
        let source = graph.require_connection(edge.source())?;
        let target = graph.require_connection(edge.target())?;
        edges.push(EdgeReport {
            id,
            source: source.node(),
            target: target.node(),
            from: graph.coordinates(edge.source(), false),
            to: graph.coordinates(edge.target(), false),
            multipart: edge.multipart,
        });
    }

    Ok(LevelReport {
        level,
        nodes,
        edges,
        skipped_edges: crafted.skipped_edges.len(),
    })
}
