//! FFStudio CLI
//!
//! Headless access to the translation engine: import FFmpeg commands into
//! graph files, emit commands from graphs, expand wildcard templates, merge
//! and lay out graphs.
//!
//! Results go to stdout; logs and diagnostics go to stderr.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;

use ffstudio_core::core::emit::EmitOptions;
use ffstudio_core::core::expand::{Expander, GlobPathResolver};
use ffstudio_core::core::graph::{arrange, merge_graphs, Graph, NodeKind, SerializedGraph};
use ffstudio_core::core::reconstruct::{is_ffmpeg_command, GraphReconstructor, ParseReport};
use ffstudio_core::core::registry::{Manifest, NodeRegistry};
use ffstudio_core::core::settings::StudioSettings;
use ffstudio_core::core::NodeId;

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

// =============================================================================
// Arguments
// =============================================================================

#[derive(Parser, Debug)]
#[command(name = "ffstudio")]
#[command(version)]
#[command(about = "Translate between FFmpeg commands and node graphs")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Additional capability manifest (JSON) merged over the built-in one
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import an FFmpeg command into a graph file
    Parse {
        /// Command text, or `-` to read stdin
        command: String,

        /// Graph file to write; prints the report only when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Add to an existing graph file instead of starting empty
        #[arg(long)]
        into: Option<PathBuf>,

        /// Run the leveled layout after import
        #[arg(long)]
        arrange: bool,
    },

    /// Emit the FFmpeg command described by a graph file
    Emit {
        graph: PathBuf,

        /// Emit only these node ids
        #[arg(long, value_delimiter = ',')]
        select: Vec<NodeId>,

        /// Variable override, `name=value`
        #[arg(long = "var", value_parser = parse_variable)]
        variables: Vec<(String, String)>,
    },

    /// Import a command and emit it again
    Roundtrip {
        /// Command text, or `-` to read stdin
        command: String,
    },

    /// Expand input wildcards and output templates into concrete commands
    Expand {
        /// Command text, or `-` to read stdin
        command: String,

        /// Directory relative wildcards are resolved in
        #[arg(long)]
        base_dir: Option<PathBuf>,
    },

    /// Append graph B into graph A
    Merge {
        a: PathBuf,
        b: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Maximum random offset for B's nodes, in pixels
        #[arg(long)]
        jitter: Option<f64>,
    },

    /// Arrange a graph left to right by dependency level
    Layout {
        graph: PathBuf,

        /// Destination; rewrites the input file when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List registered node types
    Types {
        /// Only paths containing this text
        filter: Option<String>,
    },
}

#[derive(Error, Debug)]
enum CliError {
    #[error("input does not look like an FFmpeg command: {0}")]
    NotACommand(String),

    #[error("invalid variable '{0}', expected name=value")]
    InvalidVariable(String),
}

fn parse_variable(raw: &str) -> std::result::Result<(String, String), CliError> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(CliError::InvalidVariable(raw.to_string())),
    }
}

// =============================================================================
// Setup
// =============================================================================

fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<()> {
    use tracing_subscriber::prelude::*;

    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file_layer = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "ffstudio.log".to_string());
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let _ = LOG_GUARD.set(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);
    Ok(())
}

fn load_registry(manifest: Option<&Path>) -> Result<NodeRegistry> {
    let mut registry = NodeRegistry::builtin().context("built-in manifest is invalid")?;
    if let Some(path) = manifest {
        let extra = Manifest::load_from_file(path)
            .with_context(|| format!("failed to load manifest {}", path.display()))?;
        let added = registry.register_manifest(&extra);
        tracing::info!(path = %path.display(), added, "loaded capability manifest");
    }
    Ok(registry)
}

/// Returns `arg`, or all of stdin when `arg` is `-`.
fn read_command(arg: &str) -> Result<String> {
    if arg != "-" {
        return Ok(arg.to_string());
    }
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("failed to read command from stdin")?;
    Ok(text.trim().to_string())
}

fn load_graph(path: &Path) -> Result<Graph> {
    Graph::load_file(path).with_context(|| format!("failed to load graph {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_diagnostics(diagnostics: &[String]) {
    for diagnostic in diagnostics {
        tracing::warn!("{diagnostic}");
    }
}

fn with_program(settings: &StudioSettings, args: &str) -> String {
    format!("{} {}", settings.emitter.ffmpeg_binary, args)
}

// =============================================================================
// Commands
// =============================================================================

fn import(
    text: &str,
    registry: &NodeRegistry,
    settings: &StudioSettings,
    graph: &mut Graph,
) -> Result<ParseReport> {
    if !is_ffmpeg_command(text) {
        return Err(CliError::NotACommand(text.to_string()).into());
    }
    let report = GraphReconstructor::new(registry)
        .with_segment_spacing(settings.layout.segment_spacing)
        .import(text, graph)?;
    report_diagnostics(&report.diagnostics);
    Ok(report)
}

fn emit(graph: &Graph, settings: &StudioSettings, options: &EmitOptions) -> Result<String> {
    let emission = settings.command_emitter().emit(graph, options)?;
    report_diagnostics(&emission.diagnostics);
    Ok(with_program(settings, &emission.command))
}

async fn run(cli: Cli) -> Result<()> {
    let settings = cli
        .global
        .config
        .as_deref()
        .map(StudioSettings::load)
        .unwrap_or_default();
    let registry = load_registry(cli.global.manifest.as_deref())?;

    match cli.command {
        Command::Parse {
            command,
            output,
            into,
            arrange: run_layout,
        } => {
            let text = read_command(&command)?;
            let mut graph = match &into {
                Some(path) => load_graph(path)?,
                None => Graph::new(),
            };
            let report = import(&text, &registry, &settings, &mut graph)?;
            if run_layout {
                arrange(&mut graph);
            }
            if let Some(path) = output {
                graph
                    .save_file(&path)
                    .with_context(|| format!("failed to write graph {}", path.display()))?;
                tracing::info!(path = %path.display(), nodes = graph.nodes().len(), "graph saved");
            }
            print_json(&report)?;
        }

        Command::Emit {
            graph,
            select,
            variables,
        } => {
            let mut graph = load_graph(&graph)?;
            let mut options = EmitOptions::default();
            if !select.is_empty() {
                for id in &select {
                    graph
                        .set_selected(*id, true)
                        .with_context(|| format!("cannot select node {id}"))?;
                }
                options = EmitOptions::selected_only();
            }
            options.variables = variables.into_iter().collect::<BTreeMap<_, _>>();
            println!("{}", emit(&graph, &settings, &options)?);
        }

        Command::Roundtrip { command } => {
            let text = read_command(&command)?;
            let mut graph = Graph::new();
            import(&text, &registry, &settings, &mut graph)?;
            println!("{}", emit(&graph, &settings, &EmitOptions::default())?);
        }

        Command::Expand { command, base_dir } => {
            let text = read_command(&command)?;
            let mut resolver = GlobPathResolver::new();
            if let Some(dir) = base_dir {
                resolver = resolver.with_base_dir(dir);
            }
            let expanded = Expander::new(resolver)
                .with_options(settings.expand_options())
                .expand(&text)
                .await?;
            for warning in &expanded.warnings {
                tracing::warn!("{warning}");
            }
            for line in &expanded.commands {
                println!("{line}");
            }
        }

        Command::Merge {
            a,
            b,
            output,
            jitter,
        } => {
            let first = SerializedGraph::load(&a)
                .with_context(|| format!("failed to load graph {}", a.display()))?;
            let second = SerializedGraph::load(&b)
                .with_context(|| format!("failed to load graph {}", b.display()))?;
            let merged = merge_graphs(
                &first,
                &second,
                jitter.unwrap_or(settings.layout.merge_jitter),
            );
            // Validate before writing.
            let graph = Graph::from_serialized(&merged)?;
            graph
                .save_file(&output)
                .with_context(|| format!("failed to write graph {}", output.display()))?;
            tracing::info!(
                path = %output.display(),
                nodes = graph.nodes().len(),
                outputs = graph.ids_of_kind(NodeKind::Output).len(),
                "merged graph saved"
            );
        }

        Command::Layout { graph: path, output } => {
            let mut graph = load_graph(&path)?;
            arrange(&mut graph);
            let destination = output.unwrap_or(path);
            graph
                .save_file(&destination)
                .with_context(|| format!("failed to write graph {}", destination.display()))?;
        }

        Command::Types { filter } => {
            for schema in registry.schemas() {
                if filter.as_deref().is_some_and(|f| !schema.path.contains(f)) {
                    continue;
                }
                println!("{}", schema.path);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose, cli.global.log_file.as_deref())?;
    run(cli).await
}
