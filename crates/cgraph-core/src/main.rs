//! `cgraph` command line: build a call graph, then query the persisted artifact.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cgraph_core::config::AnalysisConfig;
use cgraph_core::graph::persist;
use cgraph_core::graph::query::{walk, Direction};
use cgraph_core::indexer::hierarchy::CyclePolicy;
use cgraph_core::indexer::pipeline;
use cgraph_core::{CgResult, Signature};

/// Whole-program call graph construction for Java sources
#[derive(Parser, Debug)]
#[command(name = "cgraph", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a source tree and write callgraph-<unix>.json
    Analyze(AnalyzeArgs),

    /// List methods that may call SIGNATURE
    Callers(QueryArgs),

    /// List methods SIGNATURE may call
    Callees(QueryArgs),
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// JSON config file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root of the Java source tree
    #[arg(short = 'd', long)]
    source_root: Option<PathBuf>,

    /// Directory receiving the graph artifact
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Worker threads (0 = one per core)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Only analyze paths matching this regex (repeatable)
    #[arg(long)]
    include: Vec<String>,

    /// Skip paths matching this regex (repeatable)
    #[arg(long)]
    exclude: Vec<String>,

    /// Extra library/callback spec merged over the embedded one
    #[arg(long)]
    library: Option<PathBuf>,

    /// Abort on supertype cycles instead of dropping the cyclic edges
    #[arg(long)]
    fail_on_cycle: bool,

    /// Do not treat `main(String[])` as a root
    #[arg(long)]
    no_main_roots: bool,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Encoded signature, e.g. `pkg.A:run()V`
    signature: String,

    /// Persisted graph to query
    #[arg(short, long)]
    graph: PathBuf,

    /// Maximum hops to follow
    #[arg(long, default_value = "1")]
    depth: usize,
}

fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}

fn cmd_analyze(args: AnalyzeArgs) -> CgResult<()> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::from_path(path)?,
        None => AnalysisConfig::default(),
    };
    config.apply_env()?;
    if let Some(root) = args.source_root {
        config.source_root = root;
    }
    if let Some(out) = args.output_dir {
        config.output_dir = out;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.include.extend(args.include);
    config.exclude.extend(args.exclude);
    if args.library.is_some() {
        config.library_spec = args.library;
    }
    if args.fail_on_cycle {
        config.cycle_policy = CyclePolicy::Fail;
    }
    if args.no_main_roots {
        config.main_methods_as_roots = false;
    }

    let report = pipeline::run(&config)?;
    info!(
        artifact = %report.artifact.display(),
        edges = report.stats.edges,
        units = report.stats.units,
        "analysis finished"
    );
    println!("{}", report.artifact.display());
    Ok(())
}

fn cmd_query(args: QueryArgs, direction: Direction) -> CgResult<()> {
    let start = Signature::decode(&args.signature)?;
    let graph = persist::read_graph(&args.graph)?.to_graph();
    for entry in walk(&graph, &start, direction, args.depth) {
        println!("{}\t{}", entry.depth, entry.to);
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    let result = match cli.command {
        Commands::Analyze(args) => cmd_analyze(args),
        Commands::Callers(args) => cmd_query(args, Direction::Callers),
        Commands::Callees(args) => cmd_query(args, Direction::Callees),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
