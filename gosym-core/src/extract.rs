//! Symbol extraction from `go doc` output.
//!
//! Only unindented declaration lines are read (`func`, `type`, `const`,
//! `var`) plus the members of parenthesised `const (` / `var (` groups.
//! Documentation text, struct and interface bodies are indented and skipped.
//! Lines that do not parse are dropped.

use crate::discovery::GoTool;
use crate::runner::CommandRunner;
use crate::symbol::{GoPackage, Symbol, SymbolKind};
use tracing::{debug, warn};

/// One declaration as printed by `go doc`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocDecl {
    pub name: String,
    pub kind: SymbolKind,
    pub signature: Option<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Group {
    None,
    Const,
    Var,
}

/// Extract the exported symbols of one package, including a `package` entry.
///
/// Fails soft: a tool error is logged and yields an empty list.
pub async fn extract_symbols(
    runner: &dyn CommandRunner,
    tool: &GoTool,
    package: &GoPackage,
) -> Vec<Symbol> {
    let inv = tool
        .command()
        .args(["doc", "-all", package.import_path.as_str()]);
    let out = match runner.run(&inv, &tool.command_options).await {
        Ok(out) => out,
        Err(e) => {
            warn!(package = %package.import_path, error = %e, "symbol extraction failed");
            return Vec::new();
        }
    };

    let decls = parse_doc_output(&out);
    let mut symbols = Vec::with_capacity(decls.len() + 1);
    symbols.push(Symbol::new(
        package.name.clone(),
        package,
        SymbolKind::Package,
        None,
    ));
    symbols.extend(
        decls
            .into_iter()
            .map(|d| Symbol::new(d.name, package, d.kind, d.signature))
            .filter(|s| s.is_exported),
    );
    debug!(package = %package.import_path, symbols = symbols.len(), "extracted symbols");
    symbols
}

/// Parse `go doc -all` / `go doc -short` text into declarations.
pub fn parse_doc_output(output: &str) -> Vec<DocDecl> {
    let mut decls = Vec::new();
    let mut group = Group::None;

    for line in output.lines() {
        if group != Group::None {
            if line.trim() == ")" {
                group = Group::None;
            } else if line.starts_with('\t') {
                let kind = if group == Group::Const {
                    SymbolKind::Const
                } else {
                    SymbolKind::Var
                };
                decls.extend(parse_value_spec(line.trim(), kind));
            }
            continue;
        }

        if line.starts_with(char::is_whitespace) {
            continue;
        }

        if let Some(rest) = line.strip_prefix("func ") {
            decls.extend(parse_func(rest));
        } else if let Some(rest) = line.strip_prefix("type ") {
            decls.extend(parse_type(rest));
        } else if let Some(rest) = line.strip_prefix("const ") {
            if rest.trim() == "(" {
                group = Group::Const;
            } else {
                decls.extend(parse_value_spec(rest, SymbolKind::Const));
            }
        } else if let Some(rest) = line.strip_prefix("var ") {
            if rest.trim() == "(" {
                group = Group::Var;
            } else {
                decls.extend(parse_value_spec(rest, SymbolKind::Var));
            }
        }
    }

    decls
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// `Name(params) results`, `Name[T any](...)` or `(recv) Name(...)`
fn parse_func(rest: &str) -> Option<DocDecl> {
    let rest = rest.trim();
    let (kind, rest) = if rest.starts_with('(') {
        let close = matching_paren(rest)?;
        (SymbolKind::Method, rest[close + 1..].trim_start())
    } else {
        (SymbolKind::Func, rest)
    };

    let name_end = rest.find(|c: char| !is_ident_char(c))?;
    let name = &rest[..name_end];
    let tail = rest[name_end..].trim_end();
    if name.is_empty() || !(tail.starts_with('(') || tail.starts_with('[')) {
        return None;
    }

    Some(DocDecl {
        name: name.to_string(),
        kind,
        signature: Some(format!("func{}", tail)),
    })
}

/// Byte index of the `)` closing the leading `(`
fn matching_paren(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// `Name struct{ ... }`, `Name interface {`, `Name[T any] ...`, `Name = Other`
fn parse_type(rest: &str) -> Option<DocDecl> {
    let rest = rest.trim();
    let name_end = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
    let name = &rest[..name_end];
    if name.is_empty() {
        return None;
    }

    let mut tail = rest[name_end..].trim_start();
    if tail.starts_with('[') {
        tail = tail[skip_brackets(tail)?..].trim_start();
    }

    let kind = if tail.starts_with("struct") {
        SymbolKind::Struct
    } else if tail.starts_with("interface") {
        SymbolKind::Interface
    } else {
        SymbolKind::Type
    };
    let signature = match kind {
        SymbolKind::Type => {
            let underlying = strip_elision(tail.trim_end_matches('{').trim());
            (!underlying.is_empty()).then(|| underlying.to_string())
        }
        _ => None,
    };

    Some(DocDecl {
        name: name.to_string(),
        kind,
        signature,
    })
}

/// Index just past the `]` that closes the leading `[`
fn skip_brackets(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// `A, B Type = 1, 2 // comment` → one declaration per name, typed if explicit.
fn parse_value_spec(spec: &str, kind: SymbolKind) -> Vec<DocDecl> {
    let spec = match spec.find("//") {
        Some(i) => &spec[..i],
        None => spec,
    };
    let spec = strip_elision(spec.trim());
    let lhs = match spec.find('=') {
        Some(i) => &spec[..i],
        None => spec,
    };

    let mut names = Vec::new();
    let mut rest = lhs.trim();
    loop {
        let end = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
        if end == 0 {
            break;
        }
        names.push(&rest[..end]);
        rest = rest[end..].trim_start();
        match rest.strip_prefix(',') {
            Some(after) => rest = after.trim_start(),
            None => break,
        }
    }

    let ty = rest.trim();
    let signature = (!ty.is_empty()).then(|| ty.to_string());
    names
        .into_iter()
        .map(|name| DocDecl {
            name: name.to_string(),
            kind,
            signature: signature.clone(),
        })
        .collect()
}

/// `go doc -short` marks elided text with a trailing ` ...`
fn strip_elision(s: &str) -> &str {
    s.strip_suffix("...").map(str::trim_end).unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::runner::mock::ScriptedRunner;
    use std::path::Path;

    const IO_DOC: &str = r#"package io // import "io"

Package io provides basic interfaces to I/O primitives.

CONSTANTS

const (
	SeekStart   = 0 // seek relative to the origin of the file
	SeekCurrent = 1 // seek relative to the current offset
	SeekEnd     = 2 // seek relative to the end
)
    Seek whence values.


VARIABLES

var EOF = errors.New("EOF")
    EOF is the error returned by Read when no more input is available.

var (
	ErrShortWrite    = errors.New("short write")
	errWhence        = errors.New("Seek: invalid whence")
)

FUNCTIONS

func Copy(dst Writer, src Reader) (written int64, err error)
    Copy copies from src to dst.

func ReadAll(r Reader) ([]byte, error)

TYPES

type LimitedReader struct {
	R Reader // underlying reader
	N int64  // max bytes remaining
}

func (l *LimitedReader) Read(p []byte) (n int, err error)

type Reader interface {
	Read(p []byte) (n int, err error)
}
    Reader is the interface that wraps the basic Read method.

func LimitReader(r Reader, n int64) Reader

type OffsetWriter struct {
	// Has unexported fields.
}
"#;

    fn decl<'a>(decls: &'a [DocDecl], name: &str) -> &'a DocDecl {
        decls
            .iter()
            .find(|d| d.name == name)
            .unwrap_or_else(|| panic!("missing {name}"))
    }

    #[test]
    fn test_parse_all_output() {
        let decls = parse_doc_output(IO_DOC);

        assert_eq!(decl(&decls, "SeekStart").kind, SymbolKind::Const);
        assert_eq!(decl(&decls, "SeekEnd").kind, SymbolKind::Const);
        assert_eq!(decl(&decls, "EOF").kind, SymbolKind::Var);
        assert_eq!(decl(&decls, "ErrShortWrite").kind, SymbolKind::Var);
        assert_eq!(decl(&decls, "errWhence").kind, SymbolKind::Var);

        let copy = decl(&decls, "Copy");
        assert_eq!(copy.kind, SymbolKind::Func);
        assert_eq!(
            copy.signature.as_deref(),
            Some("func(dst Writer, src Reader) (written int64, err error)")
        );

        let read = decl(&decls, "Read");
        assert_eq!(read.kind, SymbolKind::Method);
        assert_eq!(read.signature.as_deref(), Some("func(p []byte) (n int, err error)"));

        assert_eq!(decl(&decls, "LimitedReader").kind, SymbolKind::Struct);
        assert_eq!(decl(&decls, "Reader").kind, SymbolKind::Interface);
        assert_eq!(decl(&decls, "LimitReader").kind, SymbolKind::Func);

        // struct fields and interface methods are not declarations
        assert!(!decls.iter().any(|d| d.name == "R" || d.name == "N"));
        // doc prose and section headers are ignored
        assert!(!decls.iter().any(|d| d.name == "Package" || d.name == "CONSTANTS"));
    }

    #[test]
    fn test_parse_short_output() {
        let out = "const MaxInt = 1<<(intSize-1) - 1\nconst SeekStart = 0 ...\nvar Args []string\nfunc Println(a ...any) (n int, err error)\ntype Stringer interface{ ... }\ntype Duration int64\ntype List[T any] struct{ ... }\ntype Handle = uintptr\n";
        let decls = parse_doc_output(out);
        assert_eq!(decl(&decls, "MaxInt").signature, None);
        assert_eq!(decl(&decls, "SeekStart").kind, SymbolKind::Const);
        assert_eq!(decl(&decls, "Args").signature.as_deref(), Some("[]string"));
        assert_eq!(decl(&decls, "Println").kind, SymbolKind::Func);
        assert_eq!(decl(&decls, "Stringer").kind, SymbolKind::Interface);
        assert_eq!(decl(&decls, "Duration").signature.as_deref(), Some("int64"));
        assert_eq!(decl(&decls, "List").kind, SymbolKind::Struct);
        assert_eq!(decl(&decls, "Handle").signature.as_deref(), Some("= uintptr"));
    }

    #[test]
    fn test_generic_func_and_multi_name_values() {
        let decls = parse_doc_output("func Map[S ~[]E, E any](s S) S\nconst A, B int = 1, 2\n");
        let map = decl(&decls, "Map");
        assert_eq!(map.signature.as_deref(), Some("func[S ~[]E, E any](s S) S"));
        assert_eq!(decl(&decls, "A").signature.as_deref(), Some("int"));
        assert_eq!(decl(&decls, "B").signature.as_deref(), Some("int"));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let decls = parse_doc_output("func\nfunc (broken\ntype \nvar = 3\n");
        assert!(decls.is_empty());
    }

    #[tokio::test]
    async fn test_extract_filters_unexported() {
        let runner = ScriptedRunner::new().on("go doc -all io", IO_DOC);
        let tool = GoTool::new(&Config::default(), Path::new("/work"));
        let pkg = GoPackage::from_import_path("io");
        let symbols = extract_symbols(&runner, &tool, &pkg).await;

        assert!(symbols.iter().all(|s| s.is_exported));
        assert!(!symbols.iter().any(|s| s.name == "errWhence"));
        assert_eq!(symbols[0].kind, SymbolKind::Package);
        assert_eq!(symbols[0].name, "io");
        assert!(symbols.iter().any(|s| s.name == "Copy" && s.package_path == "io"));
    }

    #[tokio::test]
    async fn test_extract_fails_soft() {
        let runner = ScriptedRunner::new().fail("go doc -all broken/pkg", "no such package");
        let tool = GoTool::new(&Config::default(), Path::new("/work"));
        let pkg = GoPackage::from_import_path("broken/pkg");
        assert!(extract_symbols(&runner, &tool, &pkg).await.is_empty());
    }
}
