//! Symbol data model

use serde::{Deserialize, Serialize};

/// Kind of exported declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    #[serde(alias = "function")]
    Func,
    Method,
    Type,
    Struct,
    Interface,
    Const,
    Var,
    Package,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Func => "func",
            Self::Method => "method",
            Self::Type => "type",
            Self::Struct => "struct",
            Self::Interface => "interface",
            Self::Const => "const",
            Self::Var => "var",
            Self::Package => "package",
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An exported declaration belonging to one package.
///
/// Identity is `(name, package_path)`; several packages may export the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    pub name: String,
    pub package_path: String,
    pub package_name: String,
    pub kind: SymbolKind,
    pub is_exported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Symbol {
    pub fn new(
        name: impl Into<String>,
        package: &GoPackage,
        kind: SymbolKind,
        signature: Option<String>,
    ) -> Self {
        let name = name.into();
        let is_exported = kind == SymbolKind::Package || is_exported_name(&name);
        Self {
            name,
            package_path: package.import_path.clone(),
            package_name: package.name.clone(),
            kind,
            is_exported,
            signature,
        }
    }

    /// `path.Name`, the form shown in completion details
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.package_path, self.name)
    }
}

/// A Go package as reported by `go list`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GoPackage {
    pub import_path: String,
    pub name: String,
    pub standard: bool,
}

impl GoPackage {
    /// Build a package from its import path alone, inferring name and origin.
    pub fn from_import_path(import_path: &str) -> Self {
        Self {
            import_path: import_path.to_string(),
            name: assumed_package_name(import_path),
            standard: is_standard_path(import_path),
        }
    }
}

/// Go exports identifiers that start with an upper-case letter.
pub fn is_exported_name(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Standard library paths have no dot in their first element.
pub fn is_standard_path(import_path: &str) -> bool {
    let first = import_path.split('/').next().unwrap_or_default();
    !first.is_empty() && !first.contains('.')
}

/// Best guess at the package clause name for an import path.
///
/// Drops a trailing major-version element (`/v2`), a `gopkg.in` style
/// `.vN` suffix and a `go-` prefix, then keeps the leading identifier run.
pub fn assumed_package_name(import_path: &str) -> String {
    let mut elems: Vec<&str> = import_path.split('/').filter(|e| !e.is_empty()).collect();
    if elems.len() > 1 && elems.last().is_some_and(|e| is_major_version(e)) {
        elems.pop();
    }
    let mut base = elems.last().copied().unwrap_or(import_path);

    if let Some((stem, suffix)) = base.rsplit_once('.') {
        if is_major_version(suffix) {
            base = stem;
        }
    }
    if let Some(rest) = base.strip_prefix("go-") {
        base = rest;
    }

    let name: String = base
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        base.to_string()
    } else {
        name
    }
}

fn is_major_version(elem: &str) -> bool {
    elem.strip_prefix('v')
        .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}
