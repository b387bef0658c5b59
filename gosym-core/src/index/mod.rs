//! In-memory symbol index with forward, reverse and prefix lookups.

mod snapshot;

pub use snapshot::{read_snapshot, write_snapshot, Snapshot, SCHEMA_VERSION};

use crate::symbol::{assumed_package_name, Symbol, SymbolKind};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Name matching rules for [`SymbolIndex::find`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions {
    pub case_sensitive: bool,
}

/// Index contents: name -> symbols, import path -> version.
///
/// Cloned and swapped wholesale by the store; never shared mutably.
#[derive(Debug, Clone, Default)]
pub struct SymbolIndex {
    /// name -> every symbol with that name, in insertion order
    symbols: HashMap<String, Vec<Symbol>>,
    /// import path -> resolved version (or the workspace sentinel)
    packages: BTreeMap<String, String>,
    /// Reverse index: import path -> names it contributes to `symbols`
    by_package: HashMap<String, BTreeSet<String>>,
    /// lower-cased name -> names, ordered for prefix range scans
    by_lower: BTreeMap<String, BTreeSet<String>>,
}

impl SymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `symbol` to the list for its name. Unexported symbols are ignored.
    ///
    /// Lists have list semantics: adding the same symbol twice stores it twice.
    pub fn add_symbol(&mut self, symbol: Symbol) -> bool {
        if !symbol.is_exported {
            return false;
        }
        self.by_package
            .entry(symbol.package_path.clone())
            .or_default()
            .insert(symbol.name.clone());
        self.by_lower
            .entry(symbol.name.to_lowercase())
            .or_default()
            .insert(symbol.name.clone());
        self.symbols
            .entry(symbol.name.clone())
            .or_default()
            .push(symbol);
        true
    }

    /// Drop every symbol owned by `package_path`, keeping its version entry.
    pub fn remove_package_symbols(&mut self, package_path: &str) {
        let Some(names) = self.by_package.remove(package_path) else {
            return;
        };
        for name in &names {
            if let Some(entries) = self.symbols.get_mut(name) {
                entries.retain(|s| s.package_path != package_path);
                if entries.is_empty() {
                    self.symbols.remove(name);
                    let lower = name.to_lowercase();
                    if let Some(set) = self.by_lower.get_mut(&lower) {
                        set.remove(name);
                        if set.is_empty() {
                            self.by_lower.remove(&lower);
                        }
                    }
                }
            }
        }
    }

    /// Forget a package entirely: symbols and version.
    pub fn remove_package(&mut self, package_path: &str) {
        self.remove_package_symbols(package_path);
        self.packages.remove(package_path);
    }

    /// Replace a package's symbols wholesale and record its version.
    pub fn replace_package(&mut self, package_path: &str, version: &str, symbols: Vec<Symbol>) {
        self.remove_package_symbols(package_path);
        self.set_version(package_path, version);
        for symbol in symbols {
            self.add_symbol(symbol);
        }
    }

    pub fn set_version(&mut self, package_path: &str, version: &str) {
        self.packages
            .insert(package_path.to_string(), version.to_string());
    }

    /// Merge resolved versions; existing entries are overwritten.
    pub fn merge_versions(&mut self, versions: &BTreeMap<String, String>) {
        for (path, version) in versions {
            self.set_version(path, version);
        }
    }

    pub fn version(&self, package_path: &str) -> Option<&str> {
        self.packages.get(package_path).map(String::as_str)
    }

    pub fn packages(&self) -> &BTreeMap<String, String> {
        &self.packages
    }

    pub fn symbols(&self) -> &HashMap<String, Vec<Symbol>> {
        &self.symbols
    }

    /// Every symbol owned by `package_path`
    pub fn package_symbols(&self, package_path: &str) -> Vec<&Symbol> {
        self.by_package
            .get(package_path)
            .into_iter()
            .flatten()
            .filter_map(|name| self.symbols.get(name))
            .flatten()
            .filter(|s| s.package_path == package_path)
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&[Symbol]> {
        self.symbols.get(name).map(Vec::as_slice)
    }

    /// Number of distinct symbol names
    pub fn name_count(&self) -> usize {
        self.symbols.len()
    }

    /// Number of symbol records across all names
    pub fn symbol_count(&self) -> usize {
        self.symbols.values().map(Vec::len).sum()
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.packages.is_empty()
    }

    /// Prefix lookup across all packages.
    ///
    /// `Pre` matches every name starting with `Pre`. `pkg.Pre` restricts the
    /// match to packages named `pkg` and skips package entries; the selector
    /// after the `.` is a prefix too, never an exact name. Results are
    /// ordered by import path, then name.
    pub fn find(&self, query: &str, options: MatchOptions) -> Vec<Symbol> {
        let (qualifier, member) = match query.split_once('.') {
            Some((qualifier, member)) => (Some(qualifier), member),
            None => (None, query),
        };

        let mut matches: Vec<Symbol> = self
            .names_with_prefix(member, options)
            .flat_map(|name| self.symbols.get(name).into_iter().flatten())
            .filter(|s| match qualifier {
                Some(q) => s.kind != SymbolKind::Package && package_matches(s, q),
                None => true,
            })
            .cloned()
            .collect();

        matches.sort_by(|a, b| {
            a.package_path
                .cmp(&b.package_path)
                .then_with(|| a.name.cmp(&b.name))
        });
        matches
    }

    fn names_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
        options: MatchOptions,
    ) -> impl Iterator<Item = &'a String> + 'a {
        let lower = prefix.to_lowercase();
        self.by_lower
            .range(lower.clone()..)
            .take_while(move |(key, _)| key.starts_with(&lower))
            .flat_map(|(_, names)| names.iter())
            .filter(move |name| !options.case_sensitive || name.starts_with(prefix))
    }

    /// Import paths whose package is called `name`
    pub fn package_paths_for_name(&self, name: &str) -> Vec<String> {
        self.by_package
            .keys()
            .filter(|path| {
                path.rsplit('/').next() == Some(name) || assumed_package_name(path) == name
            })
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

fn package_matches(symbol: &Symbol, qualifier: &str) -> bool {
    symbol.package_name == qualifier || symbol.package_path.rsplit('/').next() == Some(qualifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::GoPackage;

    fn sym(name: &str, path: &str, kind: SymbolKind) -> Symbol {
        Symbol::new(name, &GoPackage::from_import_path(path), kind, None)
    }

    fn sample() -> SymbolIndex {
        let mut index = SymbolIndex::new();
        index.replace_package(
            "fmt",
            "go1.21.0",
            vec![
                sym("fmt", "fmt", SymbolKind::Package),
                sym("Println", "fmt", SymbolKind::Func),
                sym("Printf", "fmt", SymbolKind::Func),
                sym("Stringer", "fmt", SymbolKind::Interface),
            ],
        );
        index.replace_package(
            "github.com/user/repo/printer",
            "v1.2.3",
            vec![
                sym("printer", "github.com/user/repo/printer", SymbolKind::Package),
                sym("Println", "github.com/user/repo/printer", SymbolKind::Func),
                sym("PrintTree", "github.com/user/repo/printer", SymbolKind::Func),
            ],
        );
        index
    }

    #[test]
    fn test_add_symbol_exported_only() {
        let mut index = SymbolIndex::new();
        assert!(index.add_symbol(sym("ExportedFunc", "test/package", SymbolKind::Func)));
        assert_eq!(index.name_count(), 1);
        assert_eq!(index.get("ExportedFunc").unwrap().len(), 1);

        assert!(!index.add_symbol(sym("privateFunc", "test/package", SymbolKind::Func)));
        assert!(!index.add_symbol(sym("privateFunc", "test/package", SymbolKind::Func)));
        assert_eq!(index.name_count(), 1);
        assert!(index.get("privateFunc").is_none());
        assert!(index.find("private", MatchOptions::default()).is_empty());
    }

    #[test]
    fn test_add_symbol_has_list_semantics() {
        let mut index = SymbolIndex::new();
        let s = sym("Dup", "test/package", SymbolKind::Func);
        index.add_symbol(s.clone());
        index.add_symbol(s);
        assert_eq!(index.name_count(), 1);
        assert_eq!(index.get("Dup").unwrap().len(), 2);
    }

    #[test]
    fn test_find_prefix_across_packages() {
        let index = sample();
        let found = index.find("Print", MatchOptions::default());
        let names: Vec<String> = found.iter().map(|s| s.qualified_name()).collect();
        assert_eq!(
            names,
            vec![
                "fmt.Printf",
                "fmt.Println",
                "github.com/user/repo/printer.PrintTree",
                "github.com/user/repo/printer.Println",
                "github.com/user/repo/printer.printer",
            ]
        );
    }

    #[test]
    fn test_find_case_rules() {
        let index = sample();
        assert_eq!(index.find("println", MatchOptions::default()).len(), 2);
        let strict = MatchOptions {
            case_sensitive: true,
        };
        assert!(index.find("println", strict).is_empty());
        assert_eq!(index.find("Println", strict).len(), 2);
    }

    #[test]
    fn test_find_qualified() {
        let index = sample();
        let found = index.find("fmt.Pr", MatchOptions::default());
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|s| s.package_path == "fmt"));

        let all_fmt = index.find("fmt.", MatchOptions::default());
        assert_eq!(all_fmt.len(), 3);
        assert!(all_fmt.iter().all(|s| s.kind != SymbolKind::Package));

        assert_eq!(index.find("printer.Println", MatchOptions::default()).len(), 1);
        assert!(index.find("nosuch.Println", MatchOptions::default()).is_empty());
    }

    #[test]
    fn test_qualified_selector_is_prefix() {
        let index = sample();
        let names: Vec<String> = index
            .find("printer.Print", MatchOptions::default())
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["PrintTree", "Println"]);
        assert_eq!(index.find("fmt.Printf", MatchOptions::default()).len(), 1);
    }

    #[test]
    fn test_package_names_complete() {
        let index = sample();
        let found = index.find("pri", MatchOptions::default());
        assert!(found
            .iter()
            .any(|s| s.kind == SymbolKind::Package && s.name == "printer"));
    }

    #[test]
    fn test_replace_package_drops_stale_symbols() {
        let mut index = sample();
        index.replace_package(
            "github.com/user/repo/printer",
            "v1.3.0",
            vec![sym("PrintGraph", "github.com/user/repo/printer", SymbolKind::Func)],
        );
        assert!(index.get("PrintTree").is_none());
        assert_eq!(index.get("Println").unwrap().len(), 1);
        assert_eq!(index.version("github.com/user/repo/printer"), Some("v1.3.0"));
        assert!(index.find("printt", MatchOptions::default()).is_empty());
    }

    #[test]
    fn test_remove_package() {
        let mut index = sample();
        index.remove_package("fmt");
        assert!(index.version("fmt").is_none());
        assert!(index.get("Printf").is_none());
        assert!(index.get("Stringer").is_none());
        assert_eq!(index.get("Println").unwrap().len(), 1);
        assert_eq!(index.package_count(), 1);
    }

    #[test]
    fn test_package_symbols() {
        let index = sample();
        let mut names: Vec<&str> = index
            .package_symbols("github.com/user/repo/printer")
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        names.sort();
        assert_eq!(names, vec!["PrintTree", "Println", "printer"]);
        assert!(index.package_symbols("nothing/here").is_empty());
    }

    #[test]
    fn test_package_paths_for_name() {
        let mut index = sample();
        index.replace_package(
            "gopkg.in/yaml.v3",
            "v3.0.1",
            vec![sym("Marshal", "gopkg.in/yaml.v3", SymbolKind::Func)],
        );
        assert_eq!(
            index.package_paths_for_name("printer"),
            vec!["github.com/user/repo/printer".to_string()]
        );
        assert_eq!(index.package_paths_for_name("yaml"), vec!["gopkg.in/yaml.v3".to_string()]);
        assert!(index.package_paths_for_name("nothing").is_empty());
    }
}
