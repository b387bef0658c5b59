//! Read-only query façade over the symbol store.

use crate::context::{current_identifier, imported_paths, is_in_comment_or_string, split_qualified};
use crate::generation::Generation;
use crate::store::{AllSymbols, SymbolStore};
use crate::symbol::Symbol;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Matches for one query, tagged with the index generation that produced them
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub symbols: Vec<Symbol>,
    pub generation: Generation,
    pub total_matches: usize,
    pub truncated: bool,
}

impl QueryResult {
    fn empty(query: &str, generation: Generation) -> Self {
        Self {
            query: query.to_string(),
            symbols: Vec::new(),
            generation,
            total_matches: 0,
            truncated: false,
        }
    }
}

pub struct SymbolQuery {
    store: Arc<SymbolStore>,
    limit: usize,
}

impl SymbolQuery {
    pub fn new(store: Arc<SymbolStore>) -> Self {
        let limit = store.config().completion.default_result_limit;
        Self { store, limit }
    }

    /// Cap the number of symbols returned by [`search`](Self::search) and
    /// [`complete`](Self::complete). Zero means unlimited.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.store.state().is_ready()
    }

    /// Every symbol matching `prefix`, ordered by import path then name
    pub fn find_symbols(&self, prefix: &str) -> Vec<Symbol> {
        self.store.find_symbols(prefix)
    }

    pub fn get_all_symbols(&self) -> AllSymbols {
        self.store.get_all_symbols()
    }

    pub fn package_paths_for_name(&self, name: &str) -> Vec<String> {
        self.store.package_paths_for_name(name)
    }

    /// Prefix lookup capped at the configured limit
    pub fn search(&self, prefix: &str) -> QueryResult {
        let generation = self.store.generation();
        let mut symbols = self.store.find_symbols(prefix);
        let total_matches = symbols.len();
        let truncated = self.limit > 0 && total_matches > self.limit;
        if truncated {
            symbols.truncate(self.limit);
        }
        QueryResult {
            query: prefix.to_string(),
            symbols,
            generation,
            total_matches,
            truncated,
        }
    }

    /// Completion for the cursor at the end of `line_prefix` in `document`.
    ///
    /// Returns nothing inside comments and strings, when no identifier is
    /// being typed, or for `pkg.Sel` when a package named `pkg` is already
    /// imported (the language server owns those). Qualified completions for
    /// packages that are not imported follow `provide_for_specified_packages`.
    pub fn complete(&self, document: &str, line_prefix: &str) -> QueryResult {
        let generation = self.store.generation();
        if is_in_comment_or_string(line_prefix) {
            return QueryResult::empty("", generation);
        }
        let Some(identifier) = current_identifier(line_prefix) else {
            return QueryResult::empty("", generation);
        };

        if let Some((package, _)) = split_qualified(identifier) {
            let imports = imported_paths(document);
            let imported = self
                .package_paths_for_name(package)
                .into_iter()
                .find(|path| imports.contains(path.as_str()));
            if let Some(path) = imported {
                debug!(package = %path, "package already imported, leaving completion to the language server");
                return QueryResult::empty(identifier, generation);
            }
            if !self.store.config().completion.provide_for_specified_packages {
                debug!(package = %package, "qualified completion disabled for packages not imported");
                return QueryResult::empty(identifier, generation);
            }
        }

        let result = self.search(identifier);
        debug!(
            query = %identifier,
            matches = result.total_matches,
            "completion lookup"
        );
        result
    }
}
