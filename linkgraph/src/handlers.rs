use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use linkgraph_core::data::Database;
use linkgraph_core::store::{DomainIdStore, RetryPolicy, Retrying};
use linkgraph_core::{
    Corpus, DomainToDomain, DomainToDomainTables, DumpSummary, GraphConfig, GraphSummary,
    LinkRecorder, OutputFormat, Pipeline, PipelineOptions, TableConfig,
};
use linkgraph_extract::{DomainNormalizer, UrlNormalizer};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// File name of the domain id database inside its config directory.
pub const DB_FILE_NAME: &str = "linkgraph.db";

const RETRY_BACKOFF: Duration = Duration::from_millis(200);

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// `--id-store` may name the database file or the directory holding it.
pub fn resolve_store_path(path: &str) -> PathBuf {
    let expanded = expand_path(path);
    if expanded.extension().is_some_and(|ext| ext == "db") {
        expanded
    } else {
        expanded.join(DB_FILE_NAME)
    }
}

/// Run `f` on a dedicated pool when a thread count is given, otherwise on
/// rayon's global pool.
fn run_with_threads<T, F>(threads: Option<usize>, f: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    match threads {
        Some(0) => bail!("thread count must be at least 1"),
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .context("Failed to start worker pool")?;
            debug!("Running on {} worker threads", n);
            Ok(pool.install(f))
        }
        None => Ok(f()),
    }
}

fn inputs_from_args(args: &ArgMatches) -> Result<Corpus> {
    let inputs: Vec<PathBuf> = args
        .get_many::<PathBuf>("input")
        .ok_or_else(|| anyhow!("at least one --input is required"))?
        .cloned()
        .collect();
    Ok(Corpus::from_paths(&inputs)?)
}

pub fn graph_config_from_args(args: &ArgMatches) -> Result<GraphConfig> {
    let output = args
        .get_one::<PathBuf>("output")
        .ok_or_else(|| anyhow!("--output is required"))?;

    let mut config = GraphConfig::new(output)
        .with_shard_count(args.get_one::<usize>("shards").copied())
        .with_force_redistribute(args.get_flag("shuffle"));
    if let Some(partitions) = args.get_one::<usize>("partitions") {
        config = config.with_partitions(*partitions);
    }
    Ok(config)
}

fn open_store(args: &ArgMatches) -> Result<Arc<dyn DomainIdStore>> {
    let path = resolve_store_path(
        args.get_one::<String>("id-store")
            .map(String::as_str)
            .unwrap_or(crate::commands::DEFAULT_CONFIG_DIR),
    );
    if !Database::exists(&path) {
        bail!(
            "no domain id database at {} (run `linkgraph init` first)",
            path.display()
        );
    }

    let attempts = args.get_one::<u32>("id-retries").copied().unwrap_or(3);
    let db = Database::new(&path)
        .with_context(|| format!("Failed to open domain id database {}", path.display()))?;
    info!(
        "Using domain id database {} ({} domains assigned)",
        path.display(),
        db.domain_count()?
    );

    Ok(Arc::new(Retrying::new(db, RetryPolicy::new(attempts, RETRY_BACKOFF))))
}

pub fn handle_init(args: &ArgMatches) -> Result<PathBuf> {
    let config_dir = expand_path(
        args.get_one::<String>("PATH")
            .map(String::as_str)
            .unwrap_or(crate::commands::DEFAULT_CONFIG_DIR),
    );
    let force = args.get_flag("force");
    let db_path = config_dir.join(DB_FILE_NAME);

    print_divider();
    println!("{}", "  LINKGRAPH INITIALIZATION".bright_white().bold());
    print_divider();
    println!(
        "{} Target: {}",
        "→".blue(),
        db_path.display().to_string().bright_white()
    );

    if Database::exists(&db_path) {
        if !force {
            bail!(
                "a database already exists at {} (use --force to overwrite it)",
                db_path.display()
            );
        }
        println!("{} Removing existing database", "⚠".yellow().bold());
        Database::drop(&db_path)
            .with_context(|| format!("Failed to remove {}", db_path.display()))?;
    }

    fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;
    Database::new(&db_path)
        .with_context(|| format!("Failed to create database {}", db_path.display()))?;

    println!("{} Domain id database created", "✓".green().bold());
    Ok(db_path)
}

pub fn handle_build(args: &ArgMatches, show_progress: bool) -> Result<Vec<GraphSummary>> {
    let format = args
        .get_one::<String>("format")
        .and_then(|f| OutputFormat::from_str(f))
        .unwrap_or(OutputFormat::Text);
    let graph = graph_config_from_args(args)?;

    // Plugins validate their configuration before any input is read
    let mut pipeline = Pipeline::new(PipelineOptions { show_progress });
    match format {
        OutputFormat::Text => {
            pipeline.add_plugin(Box::new(DomainToDomain::new(graph)?));
        }
        OutputFormat::Tables => {
            let config = TableConfig::new(graph)
                .with_weight(args.get_flag("with-weight"))
                .with_id_batch_size(
                    args.get_one::<usize>("id-batch-size")
                        .copied()
                        .unwrap_or(1000),
                );
            let store = open_store(args)?;
            pipeline.add_plugin(Box::new(DomainToDomainTables::new(config, store)?));
        }
    }

    let corpus = inputs_from_args(args)?;
    let threads = args.get_one::<usize>("threads").copied();
    let summaries = run_with_threads(threads, || pipeline.run(&corpus))??;

    for summary in &summaries {
        println!("{}", format_summary(summary));
    }
    Ok(summaries)
}

pub fn handle_dump(args: &ArgMatches, show_progress: bool) -> Result<DumpSummary> {
    let output = args
        .get_one::<PathBuf>("output")
        .ok_or_else(|| anyhow!("--output is required"))?;
    let corpus = inputs_from_args(args)?;
    let pipeline = Pipeline::new(PipelineOptions { show_progress }).with_plugin(LinkRecorder);

    let threads = args.get_one::<usize>("threads").copied();
    let summary = run_with_threads(threads, || pipeline.dump(&corpus, output))??;

    println!(
        "{} Dumped {} documents in {} shard(s) to {}",
        "✓".green().bold(),
        summary.documents,
        summary.shards,
        summary.output_dir.display().to_string().bright_white()
    );
    Ok(summary)
}

/// Print the id of each domain. Domains without an id are reported but not
/// assigned one.
pub fn handle_lookup(args: &ArgMatches) -> Result<Vec<(String, Option<i64>)>> {
    let path = resolve_store_path(
        args.get_one::<String>("id-store")
            .map(String::as_str)
            .unwrap_or(crate::commands::DEFAULT_CONFIG_DIR),
    );
    if !Database::exists(&path) {
        bail!("no domain id database at {}", path.display());
    }
    let db = Database::new(&path)?;
    let normalizer = UrlNormalizer::new();

    let mut results = Vec::new();
    for raw in args.get_many::<String>("DOMAIN").into_iter().flatten() {
        let domain = normalizer
            .normalize(raw)
            .with_context(|| format!("'{}' is not a valid domain", raw))?;
        let id = db.lookup(&domain)?;
        match id {
            Some(id) => println!("{} {}", id.to_string().bright_white().bold(), domain),
            None => println!("{} {} {}", "-".dimmed(), domain, "(not assigned)".dimmed()),
        }
        results.push((domain, id));
    }
    Ok(results)
}

pub fn format_summary(summary: &GraphSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("{} {}\n", "✓".green().bold(), summary.plugin.bold()));
    if let Some(ref dir) = summary.output_dir {
        out.push_str(&format!(
            "  {} Output: {}\n",
            "→".blue(),
            dir.display().to_string().bright_white()
        ));
    }

    out.push_str(&format!("  Documents: {}", summary.documents));
    if summary.skipped_documents > 0 {
        out.push_str(&format!(
            " {}",
            format!("({} skipped)", summary.skipped_documents).yellow()
        ));
    }
    out.push('\n');

    out.push_str(&format!("  Edges: {}", summary.edges));
    if let Some(vertices) = summary.vertices {
        out.push_str(&format!("  Vertices: {}", vertices));
    }
    out.push_str(&format!("  Shards: {}", summary.shards));
    out
}

