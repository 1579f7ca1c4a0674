use anyhow::{bail, Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand};
use coherence_memory::{MemoryEngine, NewMemory, RecallQuery};
use coherence_router::{
    prepare_agent_packet, BuiltinSchema, Packet, RoutingOutcome, RoutingSchema, Scalar,
    SchemaRouter,
};
use serde_json::{json, Value};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

mod config;

use config::{Overrides, Settings};

#[derive(Parser)]
#[command(name = "coherence")]
#[command(about = "Route records into a schema-shaped directory tree", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root directory of the routed tree (overrides COHERENCE_ROOT)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Schema file (.json/.toml) or builtin:<agent|memory> (overrides COHERENCE_SCHEMA)
    #[arg(long, global = true)]
    schema: Option<String>,

    /// Config file (default: ./coherence.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Route packets to paths (dry run unless --write)
    Transmit(TransmitArgs),

    /// Build a glob pattern from a partial intent
    Receive(ReceiveArgs),

    /// Infer key=value structure from an existing tree or path list
    Derive(DeriveArgs),

    /// Store a memory at its routed path
    Remember(RememberArgs),

    /// Find stored memories by intent or glob
    Recall(RecallArgs),

    /// Summarize outcomes and failure hotspots of stored memories
    Reflect,

    /// Print the active routing schema
    Schema(SchemaArgs),
}

#[derive(Args)]
struct TransmitArgs {
    /// Inline JSON packet or array of packets (mutually exclusive with --file)
    #[arg(long, conflicts_with = "file")]
    packet: Option<String>,

    /// Path to file containing the JSON payload
    #[arg(long)]
    file: Option<PathBuf>,

    /// Create parent directories for the routed paths
    #[arg(long)]
    write: bool,

    /// Enrich packets as agent step logs before routing
    #[arg(long)]
    agent: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ReceiveArgs {
    /// Inline JSON intent (default: empty intent)
    #[arg(long)]
    intent: Option<String>,

    /// List files matching the pattern instead of printing it
    #[arg(long)]
    expand: bool,
}

#[derive(Args)]
struct DeriveArgs {
    /// Directory to scan (defaults to the configured root)
    path: Option<PathBuf>,

    /// Read newline-separated paths from a file ("-" for stdin)
    #[arg(long, conflicts_with = "path")]
    paths_from: Option<PathBuf>,

    /// Minimum share of paths a value must appear in
    #[arg(long)]
    min_frequency: Option<f64>,
}

#[derive(Args)]
struct RememberArgs {
    /// Memory content (plain text unless --json-content)
    content: String,

    /// Outcome: success, failure or learning
    #[arg(long)]
    outcome: String,

    /// Tool involved
    #[arg(long)]
    tool: Option<String>,

    /// Short summary used in the filename
    #[arg(long)]
    summary: Option<String>,

    /// Extra routing attribute, e.g. --meta error_type=syntax (repeatable)
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    meta: Vec<String>,

    /// Parse content as JSON
    #[arg(long)]
    json_content: bool,
}

#[derive(Args)]
struct RecallArgs {
    /// Glob pattern used verbatim
    #[arg(long, conflicts_with = "intent")]
    pattern: Option<String>,

    /// Inline JSON intent
    #[arg(long)]
    intent: Option<String>,

    /// Maximum number of memories to print
    #[arg(short = 'n', long, default_value_t = 10)]
    limit: usize,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SchemaArgs {
    /// Print a built-in schema by name instead of the configured one
    #[arg(long)]
    builtin: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let settings = Settings::resolve(Overrides {
        config: cli.config,
        root: cli.root,
        schema: cli.schema,
    })?;
    log::debug!("Settings: {settings:?}");

    match cli.command {
        Commands::Transmit(args) => run_transmit(args, &settings)?,
        Commands::Receive(args) => run_receive(args, &settings)?,
        Commands::Derive(args) => run_derive(args, &settings)?,
        Commands::Remember(args) => run_remember(args, &settings)?,
        Commands::Recall(args) => run_recall(args, &settings)?,
        Commands::Reflect => run_reflect(&settings)?,
        Commands::Schema(args) => run_schema(args, &settings)?,
    }

    Ok(())
}

fn load_schema(source: &str) -> Result<RoutingSchema> {
    RoutingSchema::resolve(source).with_context(|| format!("Failed to load schema '{source}'"))
}

fn router(settings: &Settings) -> Result<SchemaRouter> {
    let schema = load_schema(settings.router_schema())?;
    Ok(SchemaRouter::new(schema, settings.root.clone()))
}

fn memory_engine(settings: &Settings) -> Result<MemoryEngine> {
    let schema = load_schema(settings.memory_schema())?;
    MemoryEngine::new(settings.root.clone(), schema)
        .with_context(|| format!("Failed to open memory root {}", settings.root.display()))
}

fn read_payload(inline: Option<&str>, file: Option<&Path>) -> Result<String> {
    if let Some(raw) = inline {
        return Ok(raw.to_string());
    }
    if let Some(path) = file {
        return fs::read_to_string(path)
            .with_context(|| format!("Failed to read JSON from {}", path.display()));
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read JSON from stdin")?;

    if buffer.trim().is_empty() {
        bail!("Packet is empty. Provide --packet, --file, or pipe JSON via stdin.");
    }

    Ok(buffer)
}

fn parse_packet(raw: &str) -> Result<Packet> {
    let value: Value = serde_json::from_str(raw).context("Invalid JSON intent")?;
    Ok(Packet::from_value(&value)?)
}

fn parse_packets(raw: &str) -> Result<Vec<Packet>> {
    let value: Value = serde_json::from_str(raw).context("Invalid JSON packet")?;
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| Packet::from_value(item).map_err(Into::into))
            .collect(),
        other => Ok(vec![Packet::from_value(&other)?]),
    }
}

fn outcome_json(outcome: &RoutingOutcome) -> Value {
    match outcome {
        RoutingOutcome::Routed(path) => json!({"path": path, "status": "routed"}),
        RoutingOutcome::Fallback { path, error } => {
            json!({"path": path, "status": "fallback", "reason": error.to_string()})
        }
        RoutingOutcome::Quarantined { reason, path } => {
            json!({"path": path, "status": "quarantined", "reason": reason.to_string()})
        }
    }
}

fn run_transmit(args: TransmitArgs, settings: &Settings) -> Result<()> {
    let router = router(settings)?;
    let raw = read_payload(args.packet.as_deref(), args.file.as_deref())?;
    let agent = args.agent || settings.agent_packets;

    let mut results = Vec::new();
    for packet in parse_packets(&raw)? {
        let packet = if agent {
            prepare_agent_packet(&packet)
        } else {
            packet
        };
        let outcome = router
            .transmit_outcome(&packet, !args.write)
            .context("Failed to create routed directories")?;
        results.push(outcome);
    }

    if args.json {
        let out: Vec<Value> = results.iter().map(outcome_json).collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for outcome in &results {
            println!("{}", outcome.path().display());
        }
    }
    Ok(())
}

fn run_receive(args: ReceiveArgs, settings: &Settings) -> Result<()> {
    let router = router(settings)?;
    let intent = match args.intent.as_deref() {
        Some(raw) => parse_packet(raw)?,
        None => Packet::new(),
    };
    let pattern = router.receive(&intent);

    if !args.expand {
        println!("{pattern}");
        return Ok(());
    }
    for entry in glob::glob(&pattern).context("Invalid glob pattern")? {
        match entry {
            Ok(path) => println!("{}", path.display()),
            Err(err) => log::warn!("Skipping unreadable match: {err}"),
        }
    }
    Ok(())
}

fn collect_relative_paths(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("Failed to read entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(rel) = entry.path().strip_prefix(dir) {
            paths.push(rel.to_string_lossy().into_owned());
        }
    }
    paths.sort();
    Ok(paths)
}

fn run_derive(args: DeriveArgs, settings: &Settings) -> Result<()> {
    let paths: Vec<String> = match &args.paths_from {
        Some(source) => {
            let raw = if source.as_os_str() == "-" {
                let mut buffer = String::new();
                io::stdin()
                    .read_to_string(&mut buffer)
                    .context("Failed to read paths from stdin")?;
                buffer
            } else {
                fs::read_to_string(source)
                    .with_context(|| format!("Failed to read paths from {}", source.display()))?
            };
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        }
        None => {
            let dir = args.path.as_deref().unwrap_or(&settings.root);
            collect_relative_paths(dir)?
        }
    };

    let min_frequency = args.min_frequency.unwrap_or(settings.min_frequency);
    if !(0.0..=1.0).contains(&min_frequency) {
        bail!("--min-frequency must be between 0 and 1, got {min_frequency}");
    }
    log::info!("Deriving schema from {} paths", paths.len());

    let derived = SchemaRouter::derive(&paths, min_frequency);
    println!("{}", serde_json::to_string_pretty(&derived)?);
    Ok(())
}

fn parse_meta(raw: &str) -> Result<(String, Scalar)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("Expected KEY=VALUE, got '{raw}'");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("Empty key in '{raw}'");
    }
    let scalar = serde_json::from_str::<Value>(value)
        .ok()
        .and_then(|v| Scalar::from_json(&v))
        .unwrap_or_else(|| Scalar::from(value));
    Ok((key.to_string(), scalar))
}

fn run_remember(args: RememberArgs, settings: &Settings) -> Result<()> {
    let engine = memory_engine(settings)?;
    let content = if args.json_content {
        serde_json::from_str(&args.content).context("Invalid JSON content")?
    } else {
        Value::String(args.content)
    };

    let mut memory = NewMemory::new(content, args.outcome);
    if let Some(tool) = args.tool {
        memory = memory.tool(tool);
    }
    if let Some(summary) = args.summary {
        memory = memory.summary(summary);
    }
    for raw in &args.meta {
        let (key, value) = parse_meta(raw)?;
        memory = memory.meta(key, value);
    }

    let path = engine.remember(memory)?;
    println!("{}", path.display());
    Ok(())
}

fn run_recall(args: RecallArgs, settings: &Settings) -> Result<()> {
    let engine = memory_engine(settings)?;
    let query = match (args.pattern, args.intent.as_deref()) {
        (Some(pattern), _) => RecallQuery::Pattern(pattern),
        (None, Some(raw)) => RecallQuery::Intent(parse_packet(raw)?),
        (None, None) => RecallQuery::Intent(Packet::new()),
    };

    let memories = engine.recall(&query, args.limit)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&memories)?);
        return Ok(());
    }
    if memories.is_empty() {
        eprintln!("No memories found");
    }
    for memory in &memories {
        println!("{}  [{}] {}", memory.path.display(), memory.outcome, memory.summary);
    }
    Ok(())
}

fn run_reflect(settings: &Settings) -> Result<()> {
    let engine = memory_engine(settings)?;
    println!("{}", serde_json::to_string_pretty(&engine.reflect())?);
    Ok(())
}

fn run_schema(args: SchemaArgs, settings: &Settings) -> Result<()> {
    let schema = match args.builtin.as_deref() {
        Some(name) => BuiltinSchema::from_name(name)?.load()?,
        None => load_schema(settings.router_schema())?,
    };
    println!("{}", serde_json::to_string_pretty(&schema.to_value())?);
    Ok(())
}
