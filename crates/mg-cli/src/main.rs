//! CLI entry point for the model graph.
//!
//! This binary drives the model graph through two canned scenarios: a bulk
//! dirty-state clear over a large two-level tree, and a JSON snapshot of a
//! small demo tree.
//!
//! # Usage
//!
//! ```bash
//! model-graph [OPTIONS] <COMMAND>
//!
//! # Clear 100 x 500 dirty nodes, reporting notification counts
//! model-graph bulk-clear --mid 100 --leaves 500
//!
//! # Same, with notifications suspended, as JSON
//! model-graph bulk-clear --suspend --format json
//!
//! # Print the snapshot of a demo tree
//! model-graph snapshot --depth 3 --fanout 2
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use std::time::Instant;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};
use mg_core::{Config, FxHashMap, GraphEvent, LogConfig, NodeId, ValidationResults, ValueType};
use mg_graph::{
    GraphError, ModelGraph, ModelType, Property, PropertySpec, TypeDeclaration, ValidationContext,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Drives the observable model graph through canned scenarios.
#[derive(Parser)]
#[command(name = "model-graph", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Path to a JSON configuration file.
    ///
    /// Missing sections and fields take their defaults.
    #[arg(short, long, global = true, env = "MODEL_GRAPH_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Build a dirty root -> mid -> leaf tree and clear it in one call.
    BulkClear {
        /// Number of mid-level nodes under the root.
        #[arg(long, default_value_t = 100)]
        mid: usize,

        /// Number of leaves under each mid-level node.
        #[arg(long, default_value_t = 500)]
        leaves: usize,

        /// Suspend notifications for the subtree while clearing.
        #[arg(long)]
        suspend: bool,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Build a demo tree and print its JSON snapshot.
    Snapshot {
        /// Levels below the root.
        #[arg(long, default_value_t = 2)]
        depth: usize,

        /// Children per node.
        #[arg(long, default_value_t = 2)]
        fanout: usize,
    },
}

/// Report output format.
#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable summary.
    Text,
    /// JSON format.
    Json,
}

// =============================================================================
// MODEL TYPES
// =============================================================================

static TREE_NODE: ModelType =
    ModelType::new("TreeNode", declare_tree_node).with_validator(validate_tree_node);

const LABEL: Property<String> = Property::new("Label");
const WEIGHT: Property<i64> = Property::new("Weight");
const PARENT: Property<Option<NodeId>> = Property::new("Parent");
const CHILDREN: &str = "Children";

fn declare_tree_node(decl: &mut TypeDeclaration<'_>) -> Result<(), GraphError> {
    let tree_node = decl.owner();
    decl.property(LABEL.spec())?;
    decl.property(WEIGHT.spec())?;
    decl.property(PropertySpec::new(PARENT.name(), ValueType::Model(Some(tree_node))).untracked())?;
    decl.property(PropertySpec::new(CHILDREN, ValueType::Collection).new_collection())?;
    Ok(())
}

fn validate_tree_node(ctx: &ValidationContext<'_>, results: &mut ValidationResults) {
    if ctx.get(&LABEL).unwrap_or_default().is_empty() {
        results.add_field_warning(LABEL.name(), "label is empty");
    }
    if ctx.get(&WEIGHT).unwrap_or_default() < 0 {
        results.add_field_error(WEIGHT.name(), "weight must not be negative");
    }
}

/// Creates a labelled child and appends it to `parent`'s children.
fn add_child(graph: &mut ModelGraph, parent: NodeId, label: String) -> Result<NodeId, GraphError> {
    let child = graph.create_model(&TREE_NODE)?;
    graph.set(child, &LABEL, label)?;
    if let Some(children) = graph.get_value(parent, CHILDREN)?.as_collection() {
        graph.push(children, child)?;
    }
    Ok(child)
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or the configured filter. Logs go to
/// stderr so stdout stays parseable.
fn init_tracing(log: &LogConfig, verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_new(&log.filter).unwrap_or_else(|_| EnvFilter::new("info"))
        }
    });

    // Check if colors should be disabled (flag, config, or NO_COLOR env var)
    let use_ansi = log.ansi && !no_color && std::env::var_os("NO_COLOR").is_none();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(log.target)
                .with_ansi(use_ansi),
        )
        .with(filter)
        .init();
}

/// Loads the configuration file if one was given.
fn load_config(cli: &Cli) -> color_eyre::Result<Config> {
    match &cli.config {
        Some(path) => Ok(Config::load(path)?),
        None => Ok(Config::default()),
    }
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Position of a node in the bulk-clear tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Root,
    Mid,
    Leaf,
}

/// Notifications delivered while clearing, per tree level.
#[derive(Debug, Default, Clone, Copy, Serialize)]
struct Notifications {
    root: usize,
    mid: usize,
    leaf: usize,
    other: usize,
}

impl Notifications {
    fn total(&self) -> usize {
        self.root + self.mid + self.leaf + self.other
    }
}

/// Outcome of a bulk clear.
#[derive(Debug, Serialize)]
struct BulkClearReport {
    mid: usize,
    leaves: usize,
    nodes: usize,
    suspend: bool,
    notifications: Notifications,
    root_dirty: bool,
    elapsed_ms: f64,
}

/// Builds the dirty tree and records the level of every node.
fn build_dirty_tree(
    graph: &mut ModelGraph,
    mid: usize,
    leaves: usize,
) -> Result<(NodeId, FxHashMap<NodeId, Level>), GraphError> {
    let mut levels = FxHashMap::default();
    let root = graph.create_model(&TREE_NODE)?;
    graph.set(root, &LABEL, "root".to_owned())?;
    levels.insert(root, Level::Root);

    for m in 0..mid {
        let mid_node = add_child(graph, root, format!("mid-{m}"))?;
        levels.insert(mid_node, Level::Mid);
        for l in 0..leaves {
            let leaf = add_child(graph, mid_node, format!("leaf-{m}-{l}"))?;
            graph.set(leaf, &WEIGHT, 1)?;
            levels.insert(leaf, Level::Leaf);
        }
    }
    Ok((root, levels))
}

/// Runs the bulk-clear scenario.
fn run_bulk_clear(
    config: &Config,
    mid: usize,
    leaves: usize,
    suspend: bool,
) -> color_eyre::Result<BulkClearReport> {
    let mut graph = ModelGraph::with_config(config.graph);
    let (root, levels) = build_dirty_tree(&mut graph, mid, leaves)?;
    info!(nodes = levels.len(), suspend, "Built dirty tree");

    let counts = Rc::new(RefCell::new(Notifications::default()));
    let sink = Rc::clone(&counts);
    let listener = graph.subscribe_all(move |_, event| {
        let mut counts = sink.borrow_mut();
        match event {
            GraphEvent::DirtyChanged { node, .. } => match levels.get(node) {
                Some(Level::Root) => counts.root += 1,
                Some(Level::Mid) => counts.mid += 1,
                Some(Level::Leaf) => counts.leaf += 1,
                None => counts.other += 1,
            },
            _ => counts.other += 1,
        }
        Ok(())
    })?;

    let started = Instant::now();
    graph.clear_dirty_on_subtree(root, suspend)?;
    let elapsed = started.elapsed();
    graph.unsubscribe(listener);

    let notifications = *counts.borrow();
    info!(delivered = notifications.total(), "Cleared subtree");
    Ok(BulkClearReport {
        mid,
        leaves,
        nodes: graph.node_count(),
        suspend,
        notifications,
        root_dirty: graph.is_dirty(root)?,
        elapsed_ms: elapsed.as_secs_f64() * 1000.0,
    })
}

/// Builds a validated demo tree and returns its root.
fn build_demo_tree(graph: &mut ModelGraph, depth: usize, fanout: usize) -> Result<NodeId, GraphError> {
    let root = graph.create_model(&TREE_NODE)?;
    graph.set(root, &LABEL, "root".to_owned())?;
    let mut frontier = vec![(root, String::from("root"))];
    for _ in 0..depth {
        let mut next = Vec::with_capacity(frontier.len() * fanout);
        for (parent, label) in &frontier {
            for i in 0..fanout {
                let child_label = format!("{label}.{i}");
                let child = add_child(graph, *parent, child_label.clone())?;
                graph.set(child, &WEIGHT, i64::try_from(i).unwrap_or(i64::MAX))?;
                // Back-reference; the child observes its parent, closing a cycle.
                graph.set(child, &PARENT, Some(*parent))?;
                next.push((child, child_label));
            }
        }
        frontier = next;
    }
    for node in graph.subtree(root)? {
        graph.validate(node)?;
    }
    Ok(root)
}

/// Runs the snapshot scenario.
fn run_snapshot(config: &Config, depth: usize, fanout: usize) -> color_eyre::Result<String> {
    let mut graph = ModelGraph::with_config(config.graph);
    let root = build_demo_tree(&mut graph, depth, fanout)?;
    info!(nodes = graph.node_count(), "Built demo tree");
    let snapshot = graph.snapshot(root)?;
    serde_json::to_string_pretty(&snapshot)
        .map_err(|e| color_eyre::eyre::eyre!("Failed to serialize JSON: {}", e))
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

/// Prints a bulk-clear report.
fn print_bulk_clear(report: &BulkClearReport, format: OutputFormat) -> color_eyre::Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report)
                .map_err(|e| color_eyre::eyre::eyre!("Failed to serialize JSON: {}", e))?;
            writeln!(handle, "{json}")?;
        }
        OutputFormat::Text => {
            let n = &report.notifications;
            let _ = writeln!(handle);
            let _ = writeln!(handle, "Bulk Clear Summary");
            let _ = writeln!(handle, "==================");
            let _ = writeln!(handle);
            let _ = writeln!(
                handle,
                "Tree:            {} mid x {} leaves ({} nodes)",
                report.mid, report.leaves, report.nodes
            );
            let _ = writeln!(handle, "Suspended:       {}", report.suspend);
            let _ = writeln!(handle, "Notifications:   {}", n.total());
            let _ = writeln!(handle, "  Root:          {}", n.root);
            let _ = writeln!(handle, "  Mid:           {}", n.mid);
            let _ = writeln!(handle, "  Leaf:          {}", n.leaf);
            let _ = writeln!(handle, "  Other:         {}", n.other);
            let _ = writeln!(handle, "Root dirty:      {}", report.root_dirty);
            let _ = writeln!(handle, "Elapsed:         {:.2} ms", report.elapsed_ms);
        }
    }
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Load configuration, then initialize tracing from it
    let config = load_config(&cli)?;
    init_tracing(&config.log, cli.verbose, cli.no_color);

    // 4. Route to appropriate command
    match cli.command {
        Commands::BulkClear {
            mid,
            leaves,
            suspend,
            format,
        } => {
            let report = run_bulk_clear(&config, mid, leaves, suspend)?;
            print_bulk_clear(&report, format)
        }
        Commands::Snapshot { depth, fanout } => {
            let json = run_snapshot(&config, depth, fanout)?;
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            writeln!(handle, "{json}")?;
            Ok(())
        }
    }
}
