use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One step of a patch document, applied by the store in list order.
///
/// Paths use JSON-pointer syntax (`/address/city`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchStep {
    /// Adds a value at `path`; fails if a value is already present.
    Add { path: String, value: Value },
    /// Sets a value at `path`, creating or overwriting as needed.
    Set { path: String, value: Value },
    /// Replaces the value at `path`; fails if nothing is there.
    Replace { path: String, value: Value },
    /// Removes the value at `path`.
    Remove { path: String },
    /// Adds `amount` to the numeric value at `path`.
    #[serde(rename = "incr")]
    Increment { path: String, amount: f64 },
}

impl PatchStep {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self::Add {
            path: path.into(),
            value,
        }
    }

    pub fn set(path: impl Into<String>, value: Value) -> Self {
        Self::Set {
            path: path.into(),
            value,
        }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self::Replace {
            path: path.into(),
            value,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self::Remove { path: path.into() }
    }

    pub fn increment(path: impl Into<String>, amount: f64) -> Self {
        Self::Increment {
            path: path.into(),
            amount,
        }
    }
}
