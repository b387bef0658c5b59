//! Version resolver: maps package import paths to installed module versions.

use crate::discovery::GoTool;
use crate::runner::CommandRunner;
use crate::symbol::is_standard_path;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Version recorded for packages of the module being edited
pub const WORKSPACE_VERSION: &str = "workspace";

/// One record of the bulk module listing (`go list -m all`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    pub path: String,
    /// `None` for the main module(s)
    pub version: Option<String>,
}

impl ModuleEntry {
    fn resolved_version(&self) -> String {
        self.version
            .clone()
            .unwrap_or_else(|| WORKSPACE_VERSION.to_string())
    }
}

/// `go list -m -json <path>` record
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ModuleRecord {
    path: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    main: bool,
}

/// Resolves versions against one bulk listing, falling back to per-package queries.
pub struct VersionResolver<'a> {
    runner: &'a dyn CommandRunner,
    tool: &'a GoTool,
    /// Version assigned to standard library paths, e.g. `go1.21.0`
    std_version: Option<String>,
}

impl<'a> VersionResolver<'a> {
    pub fn new(runner: &'a dyn CommandRunner, tool: &'a GoTool) -> Self {
        Self {
            runner,
            tool,
            std_version: None,
        }
    }

    pub fn with_std_version(mut self, toolchain_version: &str) -> Self {
        self.std_version = Some(format!("go{}", toolchain_version));
        self
    }

    /// Resolve every path it can. Unresolved paths are absent from the result
    /// so a later run retries them.
    pub async fn resolve_versions(&self, import_paths: &BTreeSet<String>) -> BTreeMap<String, String> {
        let modules = self.list_modules().await;
        let mut resolved = BTreeMap::new();
        let mut unmatched = Vec::new();

        for path in import_paths {
            if let Some(module) = longest_module_match(&modules, path) {
                resolved.insert(path.clone(), module.resolved_version());
            } else if let (true, Some(std_version)) = (is_standard_path(path), &self.std_version) {
                resolved.insert(path.clone(), std_version.clone());
            } else {
                unmatched.push(path);
            }
        }

        for path in unmatched {
            match self.query_package(path).await {
                Some(version) => {
                    resolved.insert(path.clone(), version);
                }
                None => debug!(package = %path, "version unresolved"),
            }
        }

        resolved
    }

    /// Bulk listing of every module in the build list. Empty on failure.
    pub async fn list_modules(&self) -> Vec<ModuleEntry> {
        let inv = self.tool.command().args(["list", "-m", "all"]);
        match self.runner.run(&inv, &self.tool.listing_options).await {
            Ok(out) => parse_module_listing(&out),
            Err(e) => {
                warn!(command = %inv, error = %e, "module listing failed");
                Vec::new()
            }
        }
    }

    /// Single-package lookup: one-line query first, JSON record as fallback.
    async fn query_package(&self, path: &str) -> Option<String> {
        let line = self.tool.command().args(["list", "-m", path]);
        match self.runner.run(&line, &self.tool.command_options).await {
            Ok(out) => {
                if let Some(version) = parse_single_module(&out, path) {
                    return Some(version);
                }
            }
            Err(e) => debug!(command = %line, error = %e, "module query failed"),
        }

        let json = self.tool.command().args(["list", "-m", "-json", path]);
        match self.runner.run(&json, &self.tool.command_options).await {
            Ok(out) => parse_module_record(&out),
            Err(e) => {
                debug!(command = %json, error = %e, "module json query failed");
                None
            }
        }
    }
}

/// Parse `path [version] [=> replacement ...]` lines.
pub fn parse_module_listing(output: &str) -> Vec<ModuleEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let path = tokens.next()?;
            let version = tokens.next().filter(|t| *t != "=>").map(str::to_string);
            Some(ModuleEntry {
                path: path.to_string(),
                version,
            })
        })
        .collect()
}

/// Longest module root that owns `import_path` on a path-element boundary.
///
/// Main-module entries win over versioned entries of equal length so a
/// package is never downgraded from the workspace sentinel.
pub fn longest_module_match<'m>(modules: &'m [ModuleEntry], import_path: &str) -> Option<&'m ModuleEntry> {
    modules
        .iter()
        .filter(|m| owns_path(&m.path, import_path))
        .max_by_key(|m| (m.path.len(), m.version.is_none()))
}

fn owns_path(module_root: &str, import_path: &str) -> bool {
    import_path == module_root
        || import_path
            .strip_prefix(module_root)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn parse_single_module(output: &str, path: &str) -> Option<String> {
    let entry = parse_module_listing(output)
        .into_iter()
        .find(|entry| entry.path == path)?;
    match entry.version {
        Some(version) => Some(version),
        // `go list -m` prints a bare path only for a main module
        None => Some(WORKSPACE_VERSION.to_string()),
    }
}

fn parse_module_record(output: &str) -> Option<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<ModuleRecord>(trimmed) {
        Ok(record) if record.main => Some(WORKSPACE_VERSION.to_string()),
        Ok(record) => {
            if record.version.is_none() {
                debug!(module = %record.path, "module record without version");
            }
            record.version
        }
        Err(e) => {
            debug!(error = %e, "unparseable module record");
            None
        }
    }
}
