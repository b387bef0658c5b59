//! Symbol store: owns the live index, its snapshot file and every refresh path.
//!
//! Readers take a cheap `Arc` clone of the current [`SymbolIndex`]. Refreshes
//! build a new index off to the side and swap it in, so a query never sees a
//! half-populated cache. At most one refresh runs at a time.

use crate::config::{Config, DEFAULT_CONFIG};
use crate::discovery::{describe_packages, detect_toolchain_version, discover_packages, GoTool};
use crate::error::{ErrorCategory, GoSymError};
use crate::extract::extract_symbols;
use crate::generation::{Generation, StoreState};
use crate::index::{read_snapshot, write_snapshot, MatchOptions, Snapshot, SymbolIndex, SCHEMA_VERSION};
use crate::resolver::{VersionResolver, WORKSPACE_VERSION};
use crate::runner::{CommandRunner, ProcessRunner};
use crate::symbol::{GoPackage, Symbol};
use futures::StreamExt;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-workspace directory holding config and snapshot
pub const GOSYM_DIR: &str = ".gosym";
pub const CONFIG_FILE: &str = "config.toml";

/// Counters from a rebuild, sync or targeted refresh
#[derive(Debug, Default, Clone, Serialize)]
pub struct RefreshStats {
    pub packages_discovered: usize,
    pub packages_indexed: usize,
    pub packages_unresolved: usize,
    pub packages_failed: usize,
    pub packages_removed: usize,
    /// Package listings that failed; removals are skipped when non-zero
    pub listings_failed: usize,
    pub symbols: usize,
    pub duration_ms: u64,
}

/// How [`SymbolStore::init`] reached `Ready`
#[derive(Debug, Clone)]
pub enum InitOutcome {
    Loaded,
    Rebuilt(RefreshStats),
}

/// Store status information
#[derive(Debug, Serialize)]
pub struct StoreStatus {
    pub state: StoreState,
    pub generation: u64,
    pub toolchain_version: Option<String>,
    pub schema_version: u32,
    pub packages: usize,
    pub symbol_names: usize,
    pub symbols: usize,
    pub cache_path: String,
    pub cache_size_bytes: u64,
    /// Epoch milliseconds of the snapshot last loaded or saved
    pub last_saved: Option<u64>,
}

/// Read-only view of the name -> symbols map of one index generation
#[derive(Debug, Clone)]
pub struct AllSymbols(Arc<SymbolIndex>);

impl std::ops::Deref for AllSymbols {
    type Target = HashMap<String, Vec<Symbol>>;

    fn deref(&self) -> &Self::Target {
        self.0.symbols()
    }
}

/// Clears the in-flight flag when a refresh ends, however it ends.
struct RefreshGuard<'a>(&'a AtomicBool);

impl<'a> RefreshGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> crate::Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| GoSymError::RefreshInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Process-lifetime symbol cache for one workspace
pub struct SymbolStore {
    cache_path: PathBuf,
    config: Config,
    runner: Arc<dyn CommandRunner>,
    tool: GoTool,
    toolchain_version: RwLock<Option<String>>,
    index: RwLock<Arc<SymbolIndex>>,
    state: RwLock<StoreState>,
    generation: AtomicU64,
    last_saved: RwLock<Option<u64>>,
    refreshing: AtomicBool,
}

impl SymbolStore {
    /// Create `.gosym/config.toml` and ignore `.gosym/` in git
    pub fn init_workspace(workspace_root: &Path) -> crate::Result<PathBuf> {
        let gosym_dir = workspace_root.join(GOSYM_DIR);
        let config_path = gosym_dir.join(CONFIG_FILE);

        if config_path.exists() {
            return Err(GoSymError::ConfigExists(config_path));
        }

        fs::create_dir_all(&gosym_dir)?;
        fs::write(&config_path, DEFAULT_CONFIG)?;
        update_gitignore(workspace_root)?;

        Ok(config_path)
    }

    /// Open a store for `workspace_root` using its config (defaults if absent)
    /// and the real `go` toolchain.
    pub fn open(workspace_root: &Path) -> crate::Result<Self> {
        let config_path = workspace_root.join(GOSYM_DIR).join(CONFIG_FILE);
        let config = Config::load_or_default(&config_path)?;
        Ok(Self::new(workspace_root, config, Arc::new(ProcessRunner)))
    }

    pub fn new(workspace_root: &Path, config: Config, runner: Arc<dyn CommandRunner>) -> Self {
        let cache_path = workspace_root.join(GOSYM_DIR).join(&config.cache.file);
        let tool = GoTool::new(&config, workspace_root);
        Self {
            cache_path,
            config,
            runner,
            tool,
            toolchain_version: RwLock::new(None),
            index: RwLock::new(Arc::new(SymbolIndex::new())),
            state: RwLock::new(StoreState::Uninitialized),
            generation: AtomicU64::new(0),
            last_saved: RwLock::new(None),
            refreshing: AtomicBool::new(false),
        }
    }

    /// Override where the snapshot lives
    pub fn with_cache_path(mut self, cache_path: impl Into<PathBuf>) -> Self {
        self.cache_path = cache_path.into();
        self
    }

    /// Pin the toolchain version instead of asking `go env`
    pub fn with_toolchain_version(self, version: impl Into<String>) -> Self {
        *write_lock(&self.toolchain_version) = Some(version.into());
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn state(&self) -> StoreState {
        *read_lock(&self.state)
    }

    pub fn generation(&self) -> Generation {
        Generation::from_value(self.generation.load(Ordering::Acquire))
    }

    pub fn toolchain_version(&self) -> Option<String> {
        read_lock(&self.toolchain_version).clone()
    }

    /// The index currently served to readers
    pub fn current(&self) -> Arc<SymbolIndex> {
        Arc::clone(&read_lock(&self.index))
    }

    fn set_state(&self, state: StoreState) {
        let mut guard = write_lock(&self.state);
        if *guard != state {
            debug!(from = %*guard, to = %state, "store state");
            *guard = state;
        }
    }

    fn install(&self, index: SymbolIndex) {
        *write_lock(&self.index) = Arc::new(index);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    async fn ensure_toolchain_version(&self) -> crate::Result<String> {
        if let Some(version) = self.toolchain_version() {
            return Ok(version);
        }
        self.detect_toolchain().await
    }

    async fn detect_toolchain(&self) -> crate::Result<String> {
        let version = detect_toolchain_version(self.runner.as_ref(), &self.tool).await?;
        *write_lock(&self.toolchain_version) = Some(version.clone());
        Ok(version)
    }

    // ── Lifecycle ──

    /// Serve from a valid snapshot if there is one, otherwise rebuild.
    pub async fn init(&self) -> crate::Result<InitOutcome> {
        self.set_state(StoreState::Loading);
        if self.load().await {
            return Ok(InitOutcome::Loaded);
        }
        match self.rebuild_all().await {
            Ok(stats) => Ok(InitOutcome::Rebuilt(stats)),
            Err(e) => {
                if self.current().is_empty() {
                    self.set_state(StoreState::Uninitialized);
                }
                Err(e)
            }
        }
    }

    /// Final save point
    pub async fn shutdown(&self) -> crate::Result<()> {
        if self.refreshing.load(Ordering::Acquire) {
            debug!("shutdown during refresh, saving last complete index");
        }
        self.save().await
    }

    /// Run [`SymbolStore::sync`] in the background, logging the outcome.
    pub fn spawn_sync(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            match store.sync().await {
                Ok(stats) => info!(
                    indexed = stats.packages_indexed,
                    removed = stats.packages_removed,
                    "background sync finished"
                ),
                Err(GoSymError::RefreshInProgress) => debug!("background sync skipped"),
                Err(e) => warn!(error = %e, "background sync failed"),
            }
        })
    }

    // ── Persistence ──

    /// Replace the in-memory index with the snapshot on disk.
    ///
    /// Returns false, leaving the current index untouched, when the file is
    /// missing, empty, not valid JSON, from another schema version or built
    /// with another toolchain.
    pub async fn load(&self) -> bool {
        let toolchain = match self.ensure_toolchain_version().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "cannot validate snapshot without a toolchain version");
                return false;
            }
        };

        let snapshot = match read_snapshot(&self.cache_path, &toolchain).await {
            Ok(snapshot) => snapshot,
            Err(GoSymError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.cache_path.display(), "no snapshot on disk");
                return false;
            }
            Err(e) => {
                match e.category() {
                    ErrorCategory::Validation => info!(reason = %e, "snapshot is stale"),
                    _ => warn!(error = %e, path = %self.cache_path.display(), "snapshot rejected"),
                }
                return false;
            }
        };

        let timestamp = snapshot.timestamp;
        let index = match snapshot.into_index() {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "snapshot rejected");
                return false;
            }
        };

        info!(
            packages = index.package_count(),
            names = index.name_count(),
            "loaded symbol snapshot"
        );
        self.install(index);
        *write_lock(&self.last_saved) = Some(timestamp);
        self.set_state(StoreState::Ready);
        true
    }

    /// Write the current index to disk atomically.
    pub async fn save(&self) -> crate::Result<()> {
        let toolchain = self.toolchain_version().ok_or(GoSymError::ToolchainUnknown)?;
        let snapshot = Snapshot::capture(&self.current(), &toolchain);
        write_snapshot(&self.cache_path, &snapshot).await?;
        *write_lock(&self.last_saved) = Some(snapshot.timestamp);
        debug!(path = %self.cache_path.display(), "saved symbol snapshot");
        Ok(())
    }

    /// Best-effort save: failures are logged, never escalated.
    async fn persist(&self) {
        if let Err(e) = self.save().await {
            warn!(error = %e, path = %self.cache_path.display(), "failed to save symbol snapshot");
        }
    }

    // ── Mutation ──

    /// Add one symbol to the live index. Unexported symbols are ignored.
    pub fn add_symbol(&self, symbol: Symbol) -> bool {
        if !symbol.is_exported {
            return false;
        }
        {
            let mut guard = write_lock(&self.index);
            Arc::make_mut(&mut guard).add_symbol(symbol);
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Resolve versions for `import_paths` and merge them into the live index.
    pub async fn update_package_versions(
        &self,
        import_paths: &BTreeSet<String>,
    ) -> crate::Result<BTreeMap<String, String>> {
        let _guard = RefreshGuard::acquire(&self.refreshing)?;
        let resolved = self.resolve(import_paths).await;
        {
            let mut guard = write_lock(&self.index);
            Arc::make_mut(&mut guard).merge_versions(&resolved);
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(resolved)
    }

    async fn resolve(&self, import_paths: &BTreeSet<String>) -> BTreeMap<String, String> {
        let mut resolver = VersionResolver::new(self.runner.as_ref(), &self.tool);
        if let Some(toolchain) = self.toolchain_version() {
            resolver = resolver.with_std_version(&toolchain);
        }
        resolver.resolve_versions(import_paths).await
    }

    /// Extract symbols for `packages` with bounded concurrency, ordered by path.
    async fn extract_all(&self, packages: Vec<GoPackage>) -> Vec<(GoPackage, Vec<Symbol>)> {
        let runner = self.runner.as_ref();
        let tool = &self.tool;
        let concurrency = self.config.indexing.extract_concurrency.max(1);

        let mut results: Vec<(GoPackage, Vec<Symbol>)> = futures::stream::iter(packages)
            .map(|pkg| async move {
                let symbols = extract_symbols(runner, tool, &pkg).await;
                (pkg, symbols)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        results.sort_by(|a, b| a.0.import_path.cmp(&b.0.import_path));
        results
    }

    /// Apply extraction results to `index`. A package whose extraction failed
    /// keeps its previous contents and no new version, so the next sync retries it.
    fn apply_extracted(
        index: &mut SymbolIndex,
        versions: &BTreeMap<String, String>,
        extracted: Vec<(GoPackage, Vec<Symbol>)>,
        stats: &mut RefreshStats,
    ) {
        for (pkg, symbols) in extracted {
            let Some(version) = versions.get(&pkg.import_path) else {
                continue;
            };
            if symbols.is_empty() {
                stats.packages_failed += 1;
                continue;
            }
            index.replace_package(&pkg.import_path, version, symbols);
            stats.packages_indexed += 1;
        }
        stats.symbols = index.symbol_count();
    }

    /// Copy packages of `previous` that `discovered` does not cover into `index`.
    fn carry_over(
        index: &mut SymbolIndex,
        previous: &SymbolIndex,
        discovered: &BTreeSet<String>,
    ) -> usize {
        let mut kept = 0;
        for (path, version) in previous.packages() {
            if discovered.contains(path) {
                continue;
            }
            let symbols: Vec<Symbol> = previous
                .package_symbols(path)
                .into_iter()
                .cloned()
                .collect();
            index.replace_package(path, version, symbols);
            kept += 1;
        }
        kept
    }

    /// Run `refresh` as the single in-flight refresh, tracking readiness.
    async fn guarded<F>(&self, refresh: F) -> crate::Result<RefreshStats>
    where
        F: std::future::Future<Output = crate::Result<RefreshStats>>,
    {
        let _guard = RefreshGuard::acquire(&self.refreshing)?;
        let prior = self.state();
        self.set_state(StoreState::Rebuilding);
        let started = Instant::now();

        match refresh.await {
            Ok(mut stats) => {
                stats.duration_ms = started.elapsed().as_millis() as u64;
                self.set_state(StoreState::Ready);
                Ok(stats)
            }
            Err(e) => {
                self.set_state(prior);
                Err(e)
            }
        }
    }

    /// Discard the index and rebuild it from scratch, then save.
    pub async fn rebuild_all(&self) -> crate::Result<RefreshStats> {
        self.guarded(self.rebuild_inner()).await
    }

    async fn rebuild_inner(&self) -> crate::Result<RefreshStats> {
        let toolchain = self.detect_toolchain().await?;
        info!(toolchain = %toolchain, "rebuilding symbol index");

        let discovery = discover_packages(self.runner.as_ref(), &self.tool, &self.config).await?;
        let complete = discovery.is_complete();
        let packages = discovery.packages;
        let paths: BTreeSet<String> = packages.iter().map(|p| p.import_path.clone()).collect();
        let versions = self.resolve(&paths).await;

        let mut stats = RefreshStats {
            packages_discovered: packages.len(),
            packages_unresolved: paths.len().saturating_sub(versions.len()),
            listings_failed: discovery.failed_listings,
            ..Default::default()
        };

        let resolved: Vec<GoPackage> = packages
            .into_iter()
            .filter(|p| versions.contains_key(&p.import_path))
            .collect();
        let extracted = self.extract_all(resolved).await;

        let mut index = SymbolIndex::new();
        if !complete {
            let kept = Self::carry_over(&mut index, &self.current(), &paths);
            warn!(kept, "package listing failed, keeping previously indexed packages");
        }
        Self::apply_extracted(&mut index, &versions, extracted, &mut stats);

        info!(
            packages = stats.packages_indexed,
            failed = stats.packages_failed,
            unresolved = stats.packages_unresolved,
            symbols = stats.symbols,
            "symbol index rebuilt"
        );
        self.install(index);
        self.persist().await;
        Ok(stats)
    }

    /// Incremental update: re-extract new packages, packages whose version
    /// changed and workspace packages; drop packages that disappeared.
    ///
    /// Falls back to a full rebuild when the toolchain version changed.
    pub async fn sync(&self) -> crate::Result<RefreshStats> {
        self.guarded(self.sync_inner()).await
    }

    async fn sync_inner(&self) -> crate::Result<RefreshStats> {
        let previous = self.toolchain_version();
        let toolchain = self.detect_toolchain().await?;
        if previous.as_deref() != Some(toolchain.as_str()) && !self.current().is_empty() {
            info!(from = ?previous, to = %toolchain, "toolchain changed, rebuilding");
            return self.rebuild_inner().await;
        }

        let current = self.current();
        let discovery = discover_packages(self.runner.as_ref(), &self.tool, &self.config).await?;
        let complete = discovery.is_complete();
        let packages = discovery.packages;
        let paths: BTreeSet<String> = packages.iter().map(|p| p.import_path.clone()).collect();
        let versions = self.resolve(&paths).await;

        let mut stats = RefreshStats {
            packages_discovered: packages.len(),
            packages_unresolved: paths.len().saturating_sub(versions.len()),
            listings_failed: discovery.failed_listings,
            ..Default::default()
        };

        // A package missing from a partial listing may still exist.
        let removed: Vec<String> = if complete {
            current
                .packages()
                .keys()
                .filter(|path| !paths.contains(*path))
                .cloned()
                .collect()
        } else {
            warn!(
                failed = discovery.failed_listings,
                "package listing failed, skipping removals"
            );
            Vec::new()
        };
        let changed: Vec<GoPackage> = packages
            .into_iter()
            .filter(|p| match versions.get(&p.import_path) {
                Some(version) => {
                    version == WORKSPACE_VERSION
                        || current.version(&p.import_path) != Some(version.as_str())
                }
                None => false,
            })
            .collect();

        if removed.is_empty() && changed.is_empty() {
            debug!("symbol index up to date");
            stats.symbols = current.symbol_count();
            return Ok(stats);
        }

        let extracted = self.extract_all(changed).await;
        let mut index = (*current).clone();
        for path in &removed {
            index.remove_package(path);
        }
        stats.packages_removed = removed.len();
        Self::apply_extracted(&mut index, &versions, extracted, &mut stats);

        info!(
            indexed = stats.packages_indexed,
            removed = stats.packages_removed,
            failed = stats.packages_failed,
            "symbol index synced"
        );
        self.install(index);
        self.persist().await;
        Ok(stats)
    }

    /// Re-run the pipeline for specific packages only (e.g. after a save).
    pub async fn refresh_packages(&self, import_paths: &[String]) -> crate::Result<RefreshStats> {
        self.guarded(self.refresh_inner(import_paths)).await
    }

    async fn refresh_inner(&self, import_paths: &[String]) -> crate::Result<RefreshStats> {
        self.ensure_toolchain_version().await?;

        let paths: BTreeSet<String> = import_paths.iter().cloned().collect();
        let unique: Vec<String> = paths.iter().cloned().collect();
        let packages = describe_packages(self.runner.as_ref(), &self.tool, &unique).await;
        let versions = self.resolve(&paths).await;

        let mut stats = RefreshStats {
            packages_discovered: packages.len(),
            packages_unresolved: paths.len().saturating_sub(versions.len()),
            ..Default::default()
        };
        for path in paths.iter().filter(|p| !versions.contains_key(*p)) {
            debug!(package = %path, "skipping unresolved package");
        }

        let resolved: Vec<GoPackage> = packages
            .into_iter()
            .filter(|p| versions.contains_key(&p.import_path))
            .collect();
        let extracted = self.extract_all(resolved).await;

        let mut index = (*self.current()).clone();
        Self::apply_extracted(&mut index, &versions, extracted, &mut stats);

        self.install(index);
        self.persist().await;
        Ok(stats)
    }

    // ── Queries ──

    /// Prefix lookup (see [`SymbolIndex::find`]) using the configured case rule.
    pub fn find_symbols(&self, query: &str) -> Vec<Symbol> {
        let options = MatchOptions {
            case_sensitive: self.config.completion.case_sensitive,
        };
        self.current().find(query, options)
    }

    /// Read-only view of every symbol, keyed by name
    pub fn get_all_symbols(&self) -> AllSymbols {
        AllSymbols(self.current())
    }

    /// Import path -> version for every indexed package
    pub fn indexed_packages(&self) -> BTreeMap<String, String> {
        self.current().packages().clone()
    }

    pub fn package_paths_for_name(&self, name: &str) -> Vec<String> {
        self.current().package_paths_for_name(name)
    }

    pub fn status(&self) -> StoreStatus {
        let index = self.current();
        StoreStatus {
            state: self.state(),
            generation: self.generation().value(),
            toolchain_version: self.toolchain_version(),
            schema_version: SCHEMA_VERSION,
            packages: index.package_count(),
            symbol_names: index.name_count(),
            symbols: index.symbol_count(),
            cache_path: self.cache_path.display().to_string(),
            cache_size_bytes: fs::metadata(&self.cache_path).map(|m| m.len()).unwrap_or(0),
            last_saved: *read_lock(&self.last_saved),
        }
    }
}

/// Add .gosym/ to .gitignore if not present
fn update_gitignore(workspace_root: &Path) -> crate::Result<()> {
    let gitignore_path = workspace_root.join(".gitignore");

    if gitignore_path.exists() {
        let content = fs::read_to_string(&gitignore_path)?;
        if !content
            .lines()
            .any(|line| line.trim() == GOSYM_DIR || line.trim() == ".gosym/")
        {
            let mut file = fs::OpenOptions::new().append(true).open(&gitignore_path)?;
            use std::io::Write;
            writeln!(file, "\n# gosym symbol cache\n.gosym/")?;
        }
    } else {
        fs::write(&gitignore_path, "# gosym symbol cache\n.gosym/\n")?;
    }

    Ok(())
}
