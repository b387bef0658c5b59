//! On-disk snapshot: JSON document validated against schema and toolchain version.

use super::SymbolIndex;
use crate::symbol::Symbol;
use crate::GoSymError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

/// Current snapshot schema. Snapshots with any other value are rejected.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u32,
    pub go_version: String,
    /// Creation time, epoch milliseconds. Advisory only.
    pub timestamp: u64,
    #[serde(default)]
    pub packages: BTreeMap<String, String>,
    #[serde(default)]
    pub processed_packages: Vec<String>,
    #[serde(default)]
    pub symbols: BTreeMap<String, Vec<Symbol>>,
}

impl Snapshot {
    /// Capture `index` as a snapshot stamped with `go_version` and the current time.
    pub fn capture(index: &SymbolIndex, go_version: &str) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            version: SCHEMA_VERSION,
            go_version: go_version.to_string(),
            timestamp,
            packages: index.packages().clone(),
            processed_packages: index.packages().keys().cloned().collect(),
            symbols: index
                .symbols()
                .iter()
                .map(|(name, list)| (name.clone(), list.clone()))
                .collect(),
        }
    }

    /// Rebuild an index, rejecting records that break the cache invariants.
    pub fn into_index(self) -> crate::Result<SymbolIndex> {
        let mut index = SymbolIndex::new();
        index.merge_versions(&self.packages);
        for (name, list) in self.symbols {
            for symbol in list {
                if symbol.name != name {
                    return Err(GoSymError::parse(
                        "snapshot",
                        format!("symbol {} stored under key {}", symbol.name, name),
                    ));
                }
                if !symbol.is_exported {
                    return Err(GoSymError::parse(
                        "snapshot",
                        format!("unexported symbol {}", symbol.qualified_name()),
                    ));
                }
                index.add_symbol(symbol);
            }
        }
        Ok(index)
    }
}

/// Read and validate the snapshot at `path`.
///
/// Header fields are checked before the symbol table is decoded so a
/// snapshot from another schema reports a version mismatch, not a parse error.
pub async fn read_snapshot(path: &Path, toolchain_version: &str) -> crate::Result<Snapshot> {
    let content = tokio::fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Err(GoSymError::parse(path.display().to_string(), "empty snapshot"));
    }

    let value: serde_json::Value = serde_json::from_str(&content)?;
    let found = value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| GoSymError::parse(path.display().to_string(), "missing schema version"))?;
    if found != u64::from(SCHEMA_VERSION) {
        return Err(GoSymError::SchemaVersionMismatch {
            found: u32::try_from(found).unwrap_or(u32::MAX),
            expected: SCHEMA_VERSION,
        });
    }

    let stored_toolchain = value
        .get("goVersion")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    if stored_toolchain != toolchain_version {
        return Err(GoSymError::ToolchainMismatch {
            found: stored_toolchain.to_string(),
            expected: toolchain_version.to_string(),
        });
    }

    Ok(serde_json::from_value(value)?)
}

/// Write `snapshot` to `path` via a sibling temp file and rename.
pub async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let data = serde_json::to_vec(snapshot)?;

    let temp_path = temp_path_for(path);
    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(&data).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{GoPackage, SymbolKind};
    use crate::ErrorCategory;
    use tempfile::TempDir;

    fn sample_index() -> SymbolIndex {
        let pkg = GoPackage::from_import_path("test/package");
        let mut index = SymbolIndex::new();
        index.replace_package(
            "test/package",
            "1.0.0",
            vec![Symbol::new(
                "TestSymbol",
                &pkg,
                SymbolKind::Func,
                Some("func() error".to_string()),
            )],
        );
        index
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache").join("symbol-cache.json");

        let snapshot = Snapshot::capture(&sample_index(), "1.21.0");
        write_snapshot(&path, &snapshot).await.unwrap();
        assert!(!temp_path_for(&path).exists());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["goVersion"], "1.21.0");
        assert!(raw["timestamp"].as_u64().unwrap() > 0);
        assert_eq!(raw["packages"], serde_json::json!({ "test/package": "1.0.0" }));
        assert_eq!(raw["processedPackages"], serde_json::json!(["test/package"]));
        assert_eq!(raw["symbols"]["TestSymbol"][0]["name"], "TestSymbol");

        let loaded = read_snapshot(&path, "1.21.0").await.unwrap();
        assert_eq!(loaded, snapshot);
        let index = loaded.into_index().unwrap();
        assert_eq!(index.package_count(), 1);
        assert_eq!(index.get("TestSymbol").unwrap()[0].name, "TestSymbol");
    }

    async fn read_raw(content: &str, toolchain: &str) -> crate::Result<Snapshot> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("symbol-cache.json");
        std::fs::write(&path, content).unwrap();
        read_snapshot(&path, toolchain).await
    }

    #[tokio::test]
    async fn test_rejects_schema_mismatch() {
        let content = r#"{"version":999,"goVersion":"1.21.0","timestamp":1,"packages":{"test/package":"1.0.0"},"symbols":{}}"#;
        let err = read_raw(content, "1.21.0").await.unwrap_err();
        assert!(matches!(
            err,
            GoSymError::SchemaVersionMismatch {
                found: 999,
                expected: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_rejects_toolchain_mismatch() {
        let content = r#"{"version":1,"goVersion":"1.19.0","timestamp":1,"packages":{"test/package":"1.0.0"},"symbols":{},"processedPackages":["test/package"]}"#;
        let err = read_raw(content, "1.21.0").await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[tokio::test]
    async fn test_rejects_empty_and_corrupt() {
        let err = read_raw("", "1.21.0").await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Parse);
        let err = read_raw("  \n\t", "1.21.0").await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Parse);
        let err = read_raw(r#"{ "version": 1, "goVersion": "1.21.0", "bad_json"#, "1.21.0")
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Parse);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = read_snapshot(&dir.path().join("absent.json"), "1.21.0")
            .await
            .unwrap_err();
        assert!(matches!(err, GoSymError::Io(_)));
    }

    #[test]
    fn test_into_index_rejects_unexported_records() {
        let snapshot: Snapshot = serde_json::from_str(
            r#"{"version":1,"goVersion":"1.21.0","timestamp":1,"packages":{},"symbols":{"hidden":[{"name":"hidden","packagePath":"p","packageName":"p","kind":"func","isExported":false}]}}"#,
        )
        .unwrap();
        assert!(snapshot.into_index().is_err());
    }

    #[test]
    fn test_into_index_rejects_misfiled_records() {
        let snapshot: Snapshot = serde_json::from_str(
            r#"{"version":1,"goVersion":"1.21.0","timestamp":1,"symbols":{"Other":[{"name":"Name","packagePath":"p","packageName":"p","kind":"func","isExported":true}]}}"#,
        )
        .unwrap();
        assert!(snapshot.into_index().is_err());
    }
}
