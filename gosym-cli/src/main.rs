//! gosym CLI - cached Go symbol completion from the command line

use clap::{Parser, Subcommand};
use gosym_core::{InitOutcome, RefreshStats, SymbolQuery, SymbolStore};
use std::path::PathBuf;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gosym")]
#[command(about = "Cached Go symbol completion", long_about = None)]
struct Cli {
    /// Override workspace root detection
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .gosym/ and config.toml
    Init,

    /// Load the snapshot and sync it, or build the index from scratch
    Index {
        /// Discard the snapshot and rebuild everything
        #[arg(long)]
        force: bool,
    },

    /// Find symbols by name prefix (`Pre` or `pkg.Pre`)
    Query {
        prefix: String,

        /// Override default result limit
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Complete the identifier at the end of a line
    Complete {
        /// Text of the line up to the cursor
        line_prefix: String,

        /// Go source file used to detect existing imports
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Override default result limit
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Re-extract specific packages
    Refresh {
        /// Import paths to refresh
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Show cache stats
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init => cmd_init(cli.root),
        Commands::Index { force } => cmd_index(cli.root, force, cli.json).await,
        Commands::Query { prefix, limit } => cmd_query(cli.root, &prefix, limit, cli.json).await,
        Commands::Complete {
            line_prefix,
            file,
            limit,
        } => cmd_complete(cli.root, &line_prefix, file, limit, cli.json).await,
        Commands::Refresh { packages } => cmd_refresh(cli.root, &packages, cli.json).await,
        Commands::Status => cmd_status(cli.root, cli.json).await,
    };

    if let Err(e) = result {
        if cli.json {
            let error_json = serde_json::json!({
                "code": format!("{:?}", e.category()).to_lowercase(),
                "message": e.to_string(),
            });
            eprintln!("{}", error_json);
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

/// Logs go to stderr; `GOSYM_LOG` overrides the verbosity flags.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_env("GOSYM_LOG").unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open_store(root: Option<PathBuf>) -> gosym_core::Result<Arc<SymbolStore>> {
    let workspace_root = detect_workspace_root(root)?;
    let store = SymbolStore::open(&workspace_root)?;
    debug!(
        root = %workspace_root.display(),
        cache = %store.cache_path().display(),
        "opened symbol store"
    );
    Ok(Arc::new(store))
}

/// Serve from the snapshot when it is valid; otherwise build it.
async fn ready_store(root: Option<PathBuf>) -> gosym_core::Result<Arc<SymbolStore>> {
    let store = open_store(root)?;
    match store.init().await? {
        InitOutcome::Loaded => debug!("served from snapshot"),
        InitOutcome::Rebuilt(stats) => debug!(packages = stats.packages_indexed, "snapshot rebuilt"),
    }
    Ok(store)
}

fn cmd_init(root: Option<PathBuf>) -> gosym_core::Result<()> {
    use colored::Colorize;

    let workspace_root = detect_workspace_root(root)?;
    SymbolStore::init_workspace(&workspace_root)?;

    println!("{} .gosym/config.toml", "Created".green());
    println!("{} .gosym/ to .gitignore", "Added".green());
    Ok(())
}

async fn cmd_index(root: Option<PathBuf>, force: bool, json: bool) -> gosym_core::Result<()> {
    let store = open_store(root)?;

    let stats = if force {
        store.rebuild_all().await?
    } else {
        match store.init().await? {
            InitOutcome::Loaded => {
                debug!("snapshot loaded, syncing");
                store.sync().await?
            }
            InitOutcome::Rebuilt(stats) => stats,
        }
    };

    print_refresh_stats(&store, &stats, json);
    Ok(())
}

async fn cmd_query(
    root: Option<PathBuf>,
    prefix: &str,
    limit: Option<usize>,
    json: bool,
) -> gosym_core::Result<()> {
    let store = ready_store(root).await?;
    let mut query = SymbolQuery::new(store);
    if let Some(limit) = limit {
        query = query.with_limit(limit);
    }
    print_query_result(&query.search(prefix), json)
}

async fn cmd_complete(
    root: Option<PathBuf>,
    line_prefix: &str,
    file: Option<PathBuf>,
    limit: Option<usize>,
    json: bool,
) -> gosym_core::Result<()> {
    let document = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => String::new(),
    };

    let store = ready_store(root).await?;
    let mut query = SymbolQuery::new(store);
    if let Some(limit) = limit {
        query = query.with_limit(limit);
    }
    print_query_result(&query.complete(&document, line_prefix), json)
}

async fn cmd_refresh(root: Option<PathBuf>, packages: &[String], json: bool) -> gosym_core::Result<()> {
    let store = ready_store(root).await?;
    let stats = store.refresh_packages(packages).await?;
    print_refresh_stats(&store, &stats, json);
    Ok(())
}

async fn cmd_status(root: Option<PathBuf>, json: bool) -> gosym_core::Result<()> {
    use colored::Colorize;

    let store = open_store(root)?;
    store.load().await;
    let status = store.status();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!(
            "{}: {} ({:.1} MB)",
            "Cache".blue(),
            status.cache_path,
            status.cache_size_bytes as f64 / 1_000_000.0
        );
        println!("{}: {}", "State".blue(), status.state);
        println!(
            "{}: {}",
            "Toolchain".blue(),
            status.toolchain_version.as_deref().unwrap_or("unknown")
        );
        println!("{}: {}", "Packages".blue(), status.packages);
        println!(
            "{}: {} ({} names)",
            "Symbols".blue(),
            status.symbols,
            status.symbol_names
        );
        println!("{}: v{}", "Schema".blue(), status.schema_version);
        if let Some(saved) = status.last_saved.and_then(format_epoch_ms) {
            println!("{}: {}", "Last saved".blue(), saved);
        }
    }
    Ok(())
}

fn print_refresh_stats(store: &SymbolStore, stats: &RefreshStats, json: bool) {
    use colored::Colorize;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "stats": stats,
                "generation": store.generation(),
                "cache_path": store.cache_path().display().to_string(),
            })
        );
        return;
    }

    println!(
        "{}: {} packages ({} symbols)",
        "Indexed".green(),
        stats.packages_indexed,
        stats.symbols
    );
    if stats.packages_removed > 0 {
        println!("{}: {} packages", "Removed".yellow(), stats.packages_removed);
    }
    if stats.listings_failed > 0 {
        println!(
            "{}: {} package listings failed, previous packages kept",
            "Partial".yellow(),
            stats.listings_failed
        );
    }
    if stats.packages_unresolved > 0 || stats.packages_failed > 0 {
        println!(
            "{}: {} unresolved, {} failed (retried on next sync)",
            "Skipped".yellow(),
            stats.packages_unresolved,
            stats.packages_failed
        );
    }
    println!(
        "{}: {} ({} ms)",
        "Cache".blue(),
        store.cache_path().display(),
        stats.duration_ms
    );
}

/// Print query results in text or JSON format
fn print_query_result(result: &gosym_core::QueryResult, json: bool) -> gosym_core::Result<()> {
    use colored::Colorize;

    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    for symbol in &result.symbols {
        println!(
            "{} {} {}",
            symbol.qualified_name().cyan(),
            format!("({})", symbol.kind).dimmed(),
            symbol.signature.as_deref().unwrap_or_default()
        );
    }

    if result.truncated {
        println!(
            "... ({} showing {} of {} results)",
            "truncated".yellow(),
            result.symbols.len(),
            result.total_matches
        );
    }
    println!("({} results)", result.symbols.len());
    Ok(())
}

fn format_epoch_ms(ms: u64) -> Option<String> {
    let nanos = i128::from(ms) * 1_000_000;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()?
        .format(&Rfc3339)
        .ok()
}

fn detect_workspace_root(override_path: Option<PathBuf>) -> gosym_core::Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path);
    }

    // Walk up from current directory looking for .gosym, go.work or go.mod
    let mut current = std::env::current_dir()?;
    loop {
        if current.join(".gosym").exists()
            || current.join("go.work").exists()
            || current.join("go.mod").exists()
        {
            return Ok(current);
        }
        if !current.pop() {
            return Ok(std::env::current_dir()?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_open_store_logs_cache_location() {
        let dir = TempDir::new().unwrap();
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let store = tracing::subscriber::with_default(subscriber, || {
            open_store(Some(dir.path().to_path_buf())).unwrap()
        });

        assert!(store.cache_path().starts_with(dir.path()));
        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("opened symbol store"));
        assert!(output.contains("symbol-cache.json"));
    }

    #[test]
    fn test_format_epoch_ms() {
        assert_eq!(
            format_epoch_ms(1_700_000_000_000).as_deref(),
            Some("2023-11-14T22:13:20Z")
        );
    }
}
