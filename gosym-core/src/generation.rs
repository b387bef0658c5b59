//! Generation tracking and readiness state for the symbol store

use serde::{Deserialize, Serialize};

/// Monotonically increasing counter, bumped every time a new index is swapped in.
///
/// Query results carry the generation they were served from so a consumer
/// can drop results computed against an index that has since been replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    pub fn from_value(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// Readiness of the symbol store.
///
/// `Uninitialized -> Loading -> Ready` when a valid snapshot exists,
/// `Uninitialized -> Loading -> Rebuilding -> Ready` otherwise. Later
/// refreshes go `Ready -> Rebuilding -> Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreState {
    #[default]
    Uninitialized,
    Loading,
    Rebuilding,
    Ready,
}

impl StoreState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Loading => "loading",
            Self::Rebuilding => "rebuilding",
            Self::Ready => "ready",
        }
    }

    /// Whether queries are answered from a complete index
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

impl std::fmt::Display for StoreState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_orders_and_serializes_as_number() {
        let first = Generation::from_value(5);
        let second = Generation::from_value(first.value() + 1);
        assert!(first < second);
        assert_eq!(serde_json::to_string(&second).unwrap(), "6");
    }

    #[test]
    fn test_store_state_serialize() {
        let json = serde_json::to_string(&StoreState::Rebuilding).unwrap();
        assert_eq!(json, "\"rebuilding\"");
        assert_eq!(StoreState::default(), StoreState::Uninitialized);
        assert!(StoreState::Ready.is_ready());
        assert!(!StoreState::Loading.is_ready());
    }
}
