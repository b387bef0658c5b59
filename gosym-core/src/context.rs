//! Editor context: what the cursor is sitting in and what the file imports.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z0-9_]+\.)?[A-Za-z0-9_]*$").expect("valid identifier regex")
});

/// Import declarations: group 1 is a block body, group 2 a single path.
static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bimport\b\s*(?:\(([^)]*)\)|(?:[A-Za-z_.][A-Za-z0-9_]*\s+)?["`]([^"`]*)["`])"#)
        .expect("valid import regex")
});

static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["`]([^"`]*)["`]"#).expect("valid quoted path regex"));

/// Whether the end of `line_prefix` is inside a comment or string literal.
///
/// Scans left to right tracking `//`, `/* */`, `"..."` and `'...'` (with `\`
/// escapes) and raw `` `...` `` literals. Only the current line is considered.
/// A cursor inside an unterminated rune literal counts as inside a string.
pub fn is_in_comment_or_string(line_prefix: &str) -> bool {
    let bytes = line_prefix.as_bytes();
    let mut in_string = false;
    let mut in_rune = false;
    let mut in_raw = false;
    let mut in_block = false;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let next = bytes.get(i + 1).copied();

        if in_block {
            if c == b'*' && next == Some(b'/') {
                in_block = false;
                i += 1;
            }
        } else if in_string {
            if c == b'\\' {
                i += 1;
            } else if c == b'"' {
                in_string = false;
            }
        } else if in_rune {
            if c == b'\\' {
                i += 1;
            } else if c == b'\'' {
                in_rune = false;
            }
        } else if in_raw {
            if c == b'`' {
                in_raw = false;
            }
        } else if c == b'/' && next == Some(b'/') {
            return true;
        } else if c == b'/' && next == Some(b'*') {
            in_block = true;
            i += 1;
        } else if c == b'"' {
            in_string = true;
        } else if c == b'\'' {
            in_rune = true;
        } else if c == b'`' {
            in_raw = true;
        }
        i += 1;
    }

    in_string || in_rune || in_raw || in_block
}

/// The identifier being typed at the end of `line_prefix`, with an optional
/// `pkg.` qualifier. `None` when the cursor does not follow an identifier.
pub fn current_identifier(line_prefix: &str) -> Option<&str> {
    IDENTIFIER_RE
        .find(line_prefix)
        .map(|m| m.as_str())
        .filter(|ident| !ident.is_empty())
}

/// Split `pkg.Sel` into its qualifier and selector
pub fn split_qualified(identifier: &str) -> Option<(&str, &str)> {
    identifier.split_once('.')
}

/// Every import path declared in `document`, from single imports and import
/// blocks, aliased or not.
pub fn imported_paths(document: &str) -> BTreeSet<&str> {
    let mut paths = BTreeSet::new();
    for caps in IMPORT_RE.captures_iter(document) {
        if let Some(block) = caps.get(1) {
            paths.extend(
                QUOTED_RE
                    .captures_iter(block.as_str())
                    .filter_map(|c| c.get(1))
                    .map(|m| m.as_str()),
            );
        } else if let Some(path) = caps.get(2) {
            paths.insert(path.as_str());
        }
    }
    paths
}

/// Whether `document` imports `import_path`.
pub fn is_imported(document: &str, import_path: &str) -> bool {
    imported_paths(document).contains(import_path)
}
