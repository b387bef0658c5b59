//! Package discovery: standard library, module dependency graph, toolchain version.

use crate::config::Config;
use crate::runner::{CommandRunner, Invocation, RunOptions};
use crate::symbol::GoPackage;
use crate::GoSymError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// `go list -f` template: import path, package clause name, stdlib flag.
pub const LIST_TEMPLATE: &str = "{{.ImportPath}} {{.Name}} {{.Standard}}";

/// Shared context for every `go` invocation made while indexing one workspace.
#[derive(Debug, Clone)]
pub struct GoTool {
    pub binary: String,
    pub workspace_root: PathBuf,
    pub command_options: RunOptions,
    pub listing_options: RunOptions,
}

impl GoTool {
    pub fn new(config: &Config, workspace_root: &Path) -> Self {
        Self {
            binary: config.go.binary.clone(),
            workspace_root: workspace_root.to_path_buf(),
            command_options: RunOptions::new(config.command_timeout()).in_dir(workspace_root),
            listing_options: RunOptions::new(config.listing_timeout()).in_dir(workspace_root),
        }
    }

    pub fn command(&self) -> Invocation {
        Invocation::new(&self.binary)
    }
}

/// Detect the active toolchain version, e.g. `1.21.0` for `go1.21.0`.
pub async fn detect_toolchain_version(
    runner: &dyn CommandRunner,
    tool: &GoTool,
) -> crate::Result<String> {
    let inv = tool.command().args(["env", "GOVERSION"]);
    let out = runner.run(&inv, &tool.command_options).await?;
    parse_toolchain_version(&out).ok_or_else(|| GoSymError::parse(inv.to_string(), out.trim()))
}

fn parse_toolchain_version(output: &str) -> Option<String> {
    let token = output.split_whitespace().next()?;
    let version = token.strip_prefix("go").unwrap_or(token);
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

/// Result of one discovery pass
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub packages: Vec<GoPackage>,
    /// Listings that failed and contributed nothing
    pub failed_listings: usize,
}

impl Discovery {
    /// Whether every enabled listing succeeded, so absence means removal
    pub fn is_complete(&self) -> bool {
        self.failed_listings == 0
    }
}

/// Enumerate every importable package the cache should cover.
///
/// Each listing fails soft: a failed `go list` logs, contributes nothing and
/// is counted in [`Discovery::failed_listings`].
pub async fn discover_packages(
    runner: &dyn CommandRunner,
    tool: &GoTool,
    config: &Config,
) -> crate::Result<Discovery> {
    let exclude = config.exclude_matcher()?;
    let mut found: BTreeMap<String, GoPackage> = BTreeMap::new();
    let mut failed_listings = 0;

    if config.indexing.include_std {
        let inv = tool.command().args(["list", "-f", LIST_TEMPLATE, "std"]);
        if !collect_listing(runner, tool, &inv, &mut found).await {
            failed_listings += 1;
        }
    }
    if config.indexing.include_dependencies {
        let inv = tool
            .command()
            .args(["list", "-e", "-deps", "-f", LIST_TEMPLATE, "./..."]);
        if !collect_listing(runner, tool, &inv, &mut found).await {
            failed_listings += 1;
        }
    }

    let total = found.len();
    let packages: Vec<GoPackage> = found
        .into_values()
        .filter(|pkg| pkg.name != "main" && !exclude.is_match(&pkg.import_path))
        .collect();
    debug!(
        discovered = total,
        kept = packages.len(),
        failed_listings,
        "package discovery finished"
    );
    Ok(Discovery {
        packages,
        failed_listings,
    })
}

async fn collect_listing(
    runner: &dyn CommandRunner,
    tool: &GoTool,
    inv: &Invocation,
    found: &mut BTreeMap<String, GoPackage>,
) -> bool {
    match runner.run(inv, &tool.listing_options).await {
        Ok(out) => {
            for pkg in parse_package_listing(&out) {
                found.entry(pkg.import_path.clone()).or_insert(pkg);
            }
            true
        }
        Err(e) => {
            warn!(command = %inv, error = %e, "package listing failed");
            false
        }
    }
}

/// Describe specific packages with one `go list` call.
///
/// Paths the tool cannot describe fall back to [`GoPackage::from_import_path`].
pub async fn describe_packages(
    runner: &dyn CommandRunner,
    tool: &GoTool,
    import_paths: &[String],
) -> Vec<GoPackage> {
    if import_paths.is_empty() {
        return Vec::new();
    }
    let inv = tool
        .command()
        .args(["list", "-e", "-f", LIST_TEMPLATE])
        .args(import_paths.iter().cloned());
    let listed = match runner.run(&inv, &tool.command_options).await {
        Ok(out) => parse_package_listing(&out),
        Err(e) => {
            debug!(command = %inv, error = %e, "package description failed");
            Vec::new()
        }
    };

    import_paths
        .iter()
        .map(|path| {
            listed
                .iter()
                .find(|pkg| &pkg.import_path == path)
                .cloned()
                .unwrap_or_else(|| GoPackage::from_import_path(path))
        })
        .collect()
}

/// Parse lines produced by [`LIST_TEMPLATE`]. Malformed lines are skipped.
pub fn parse_package_listing(output: &str) -> Vec<GoPackage> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let import_path = parts.next()?;
            let name = parts.next()?;
            let standard = parts.next()? == "true";
            if parts.next().is_some() {
                return None;
            }
            Some(GoPackage {
                import_path: import_path.to_string(),
                name: name.to_string(),
                standard,
            })
        })
        .collect()
}
