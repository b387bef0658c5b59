//! Configuration for gosym

use crate::GoSymError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration as TOML
pub const DEFAULT_CONFIG: &str = r#"# gosym configuration

[go]
# Toolchain executable
binary = "go"
# Timeout for per-package commands (e.g., "30s", "1m")
command_timeout = "30s"
# Timeout for bulk listings (go list -m all, go list -deps)
listing_timeout = "2m"

[cache]
# Snapshot file name inside .gosym/
file = "symbol-cache.json"

[indexing]
# Index the standard library
include_std = true
# Index packages reachable from the workspace module
include_dependencies = true
# Import path patterns to skip (not importable from user code)
exclude = [
    "internal",
    "internal/**",
    "**/internal",
    "**/internal/**",
    "vendor/**",
    "**/vendor/**",
]
# Packages extracted concurrently during a rebuild
extract_concurrency = 8

[completion]
# Maximum suggestions returned per query
default_result_limit = 100
# Offer `pkg.Sel` completions for packages that are not imported yet
provide_for_specified_packages = true
# Match symbol names case-sensitively
case_sensitive = false
"#;

/// gosym configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub go: GoConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default = "default_command_timeout")]
    pub command_timeout: String,
    #[serde(default = "default_listing_timeout")]
    pub listing_timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_file")]
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    #[serde(default = "default_true")]
    pub include_std: bool,
    #[serde(default = "default_true")]
    pub include_dependencies: bool,
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    #[serde(default = "default_extract_concurrency")]
    pub extract_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_result_limit")]
    pub default_result_limit: usize,
    #[serde(default = "default_true")]
    pub provide_for_specified_packages: bool,
    #[serde(default)]
    pub case_sensitive: bool,
}

// Default value functions
fn default_binary() -> String {
    "go".to_string()
}
fn default_command_timeout() -> String {
    "30s".to_string()
}
fn default_listing_timeout() -> String {
    "2m".to_string()
}
fn default_cache_file() -> String {
    "symbol-cache.json".to_string()
}
fn default_true() -> bool {
    true
}
fn default_exclude() -> Vec<String> {
    [
        "internal",
        "internal/**",
        "**/internal",
        "**/internal/**",
        "vendor/**",
        "**/vendor/**",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_extract_concurrency() -> usize {
    8
}
fn default_result_limit() -> usize {
    100
}

impl Default for GoConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            command_timeout: default_command_timeout(),
            listing_timeout: default_listing_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            file: default_cache_file(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            include_std: true,
            include_dependencies: true,
            exclude: default_exclude(),
            extract_concurrency: default_extract_concurrency(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            default_result_limit: default_result_limit(),
            provide_for_specified_packages: true,
            case_sensitive: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load config from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| GoSymError::ConfigParse(e.to_string()))
    }

    /// Timeout for per-package commands
    pub fn command_timeout(&self) -> Duration {
        parse_duration(&self.go.command_timeout).unwrap_or(Duration::from_secs(30))
    }

    /// Timeout for bulk listing commands
    pub fn listing_timeout(&self) -> Duration {
        parse_duration(&self.go.listing_timeout).unwrap_or(Duration::from_secs(120))
    }

    /// Compile the exclusion patterns into a matcher over import paths
    pub fn exclude_matcher(&self) -> crate::Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.indexing.exclude {
            let glob = Glob::new(pattern).map_err(|e| GoSymError::GlobPattern(e.to_string()))?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| GoSymError::GlobPattern(e.to_string()))
    }
}

/// Parse duration string (e.g., "1h", "30m", "1d")
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (idx, unit) = s.char_indices().next_back()?;
    let num: u64 = s[..idx].parse().ok()?;

    let secs = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86_400,
        _ => return None,
    };
    num.checked_mul(secs).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = Config::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.go.binary, "go");
        assert_eq!(config.cache.file, "symbol-cache.json");
        assert_eq!(config.completion.default_result_limit, 100);
        assert!(config.completion.provide_for_specified_packages);
        assert!(!config.completion.case_sensitive);
        assert_eq!(config.indexing.exclude, default_exclude());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = Config::from_toml("[go]\nbinary = \"/usr/local/go/bin/go\"\n").unwrap();
        assert_eq!(config.go.binary, "/usr/local/go/bin/go");
        assert_eq!(config.command_timeout(), Duration::from_secs(30));
        assert_eq!(config.indexing.extract_concurrency, 8);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("2d"), Some(Duration::from_secs(172800)));
        assert_eq!(parse_duration("invalid"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("s"), None);
    }

    #[test]
    fn test_parse_duration_rejects_multibyte_unit_and_overflow() {
        assert_eq!(parse_duration("30秒"), None);
        assert_eq!(parse_duration("é"), None);
        assert_eq!(parse_duration("99999999999999999d"), None);
        assert_eq!(parse_duration("18446744073709551615s"), Some(Duration::from_secs(u64::MAX)));
    }

    #[test]
    fn test_multibyte_timeout_falls_back() {
        let config = Config::from_toml("[go]\ncommand_timeout = \"30秒\"\n").unwrap();
        assert_eq!(config.command_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_timeout_falls_back() {
        let config = Config::from_toml("[go]\nlisting_timeout = \"soon\"\n").unwrap();
        assert_eq!(config.listing_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_exclude_matcher() {
        let config = Config::default();
        let matcher = config.exclude_matcher().unwrap();
        assert!(matcher.is_match("internal/bytealg"));
        assert!(matcher.is_match("crypto/internal/boring"));
        assert!(matcher.is_match("vendor/golang.org/x/net/http2/hpack"));
        assert!(!matcher.is_match("net/http"));
        assert!(!matcher.is_match("github.com/user/repo/subpkg"));
    }

    #[test]
    fn test_bad_glob_is_reported() {
        let config = Config::from_toml("[indexing]\nexclude = [\"a/[\"]\n").unwrap();
        assert!(matches!(
            config.exclude_matcher(),
            Err(GoSymError::GlobPattern(_))
        ));
    }
}
