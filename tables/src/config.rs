use serde::{Deserialize, Serialize};

use crate::history::DEFAULT_DEPTH;

/// Host-tunable settings. Every field has a default, so a partial (or empty)
/// config file is valid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub history: HistoryConfig,
    pub document: DocumentConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Undo steps kept per document.
    pub depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig { depth: DEFAULT_DEPTH }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Sidebar state for new documents and documents that do not store one.
    pub sidebar_open: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        DocumentConfig { sidebar_open: true }
    }
}
