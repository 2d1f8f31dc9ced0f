//! Initialization errors.
//!
//! Only pipeline construction can fail. Once a [`Pipeline`](crate::Pipeline)
//! exists, per-request problems degrade to empty or unchanged results.

use crate::Phase;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("rule for collection '{collection}' has an invalid pattern")]
    InvalidPattern {
        collection: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule for collection '{collection}' references capturing group {group}, pattern has {available}")]
    InvalidCapturingGroup { collection: String, group: usize, available: usize },

    #[error("unsupported rule set version {found} (supported: {supported})")]
    UnsupportedRuleSetVersion { found: u32, supported: u32 },

    #[error("malformed rule set or config: {0}")]
    Format(#[from] serde_json::Error),

    #[error("failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("phase '{phase}' is enabled but no candidate source serves it")]
    MissingComponent { phase: Phase },
}
