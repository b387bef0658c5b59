//! gosym core - cached Go symbol completion
//!
//! Discovers the packages a Go workspace can import, extracts their exported
//! symbols with the `go` toolchain, keeps them in a prefix-searchable index
//! and persists that index between runs.

pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod generation;
pub mod index;
pub mod query;
pub mod resolver;
pub mod runner;
pub mod store;
pub mod symbol;

pub use config::Config;
pub use error::{ErrorCategory, GoSymError};
pub use generation::{Generation, StoreState};
pub use index::{MatchOptions, Snapshot, SymbolIndex, SCHEMA_VERSION};
pub use query::{QueryResult, SymbolQuery};
pub use resolver::{VersionResolver, WORKSPACE_VERSION};
pub use runner::{CommandRunner, Invocation, ProcessRunner, RunOptions};
pub use store::{AllSymbols, InitOutcome, RefreshStats, StoreStatus, SymbolStore};
pub use symbol::{GoPackage, Symbol, SymbolKind};

/// Result type alias for gosym operations
pub type Result<T> = std::result::Result<T, GoSymError>;
