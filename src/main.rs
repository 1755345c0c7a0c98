//! Modular Graph - headless driver for the audio graph engine
//!
//! Builds or loads a graph against the headless backend and reports on it.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use modular_graph::config::{ConfigError, EngineConfig};
use modular_graph::engine::{BackendChannels, GraphManager, HeadlessBackend, RenderHandle};
use modular_graph::error::GraphError;
use modular_graph::graph::{NodeType, Position};
use modular_graph::persistence::{self, PatchError};

/// Audio graph engine driver
#[derive(Parser, Debug)]
#[command(name = "modular-graph")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a small patch, play it for a few blocks and print its order
    Demo {
        /// Write the resulting graph to this file
        #[arg(short, long)]
        export: Option<PathBuf>,

        /// Number of render blocks to run
        #[arg(short, long, default_value_t = 8)]
        blocks: usize,
    },

    /// Import an exported graph and report what loaded
    Inspect {
        /// Path to the exported graph
        path: PathBuf,
    },
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Patch(#[from] PatchError),
}

fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Demo { export, blocks } => demo(config, export.as_deref(), blocks),
        Commands::Inspect { path } => inspect(config, &path),
    }
}

fn engine(config: EngineConfig) -> Result<(GraphManager<HeadlessBackend>, RenderHandle), CliError> {
    let (backend, render) = HeadlessBackend::with_render(BackendChannels::with_defaults());
    let mut manager = GraphManager::new(backend, config);
    manager.initialize()?;
    Ok((manager, render))
}

fn print_order(manager: &GraphManager<HeadlessBackend>) {
    let order = manager.processing_order();
    let model = manager.model();
    println!("Processing order:");
    for (index, id) in order.nodes.iter().enumerate() {
        let name = model.find_node(*id).map_or("?", |n| n.name.as_str());
        println!("  {:>2}. {} {}", index + 1, id, name);
    }
    if !order.is_complete() {
        println!("  ({} node(s) in feedback loops)", order.unresolved().len());
    }
}

fn demo(config: EngineConfig, export: Option<&Path>, blocks: usize) -> Result<(), CliError> {
    let buffer_size = config.buffer_size;
    let (mut manager, mut render) = engine(config)?;
    let output = manager
        .output_node_id()
        .ok_or(GraphError::NotInitialized(manager.state()))?;

    let osc = manager.create_node(NodeType::Oscillator, Position::new(100.0, 100.0))?;
    let filter = manager.create_node(NodeType::Filter, Position::new(300.0, 100.0))?;
    let lfo = manager.create_node(NodeType::Lfo, Position::new(300.0, 250.0))?;
    manager.connect(osc, "out", filter, "in")?;
    manager.connect(filter, "out", output, "in")?;
    manager.connect(lfo, "out", filter, "frequency")?;
    manager.set_parameter(osc, "waveform", 2.0)?;
    manager.set_parameter(filter, "frequency", 800.0)?;
    manager.set_parameter(lfo, "rate", 0.5)?;

    manager.start()?;
    let voice = manager.note_on(osc, 220.0)?;
    for _ in 0..blocks {
        render.render(buffer_size);
    }
    manager.note_off(voice);
    manager.stop()?;
    render.render(buffer_size);

    print_order(&manager);
    println!(
        "Rendered {:.3} s; {} unit(s), {} wire(s) on the render side",
        render.time(),
        render.unit_count(),
        render.wire_count()
    );
    let divergence = manager.backend_divergence();
    if !divergence.is_empty() {
        println!("Backend differs from graph in {} place(s)", divergence.len());
    }

    if let Some(path) = export {
        persistence::save_to_file(&manager.export_graph(), path)?;
        println!("Exported graph to {}", path.display());
    }

    manager.dispose();
    Ok(())
}

fn inspect(config: EngineConfig, path: &Path) -> Result<(), CliError> {
    let export = persistence::load_from_file(path)?;
    let (mut manager, _render) = engine(config)?;
    let report = manager.import_graph(&export)?;

    println!(
        "Loaded {} node(s) and {} connection(s) from {}",
        report.nodes_imported,
        report.connections_imported,
        path.display()
    );
    if !report.is_clean() {
        println!(
            "Skipped {} node(s), {} connection(s), {} parameter value(s)",
            report.skipped_nodes.len(),
            report.skipped_connections,
            report.skipped_parameters
        );
    }
    print_order(&manager);

    manager.dispose();
    Ok(())
}
