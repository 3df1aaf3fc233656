//! Structured operation results: counted warnings plus a JSON-like info
//! map. Validation failures travel as errors; soft failures accumulate
//! here.

use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
pub struct OpReport {
    /// message → occurrence count
    pub warnings: BTreeMap<String, u64>,
    /// operation-specific return values
    pub info: BTreeMap<String, serde_json::Value>,
}

impl OpReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warn_count(message, 1);
    }

    pub fn warn_count(&mut self, message: impl Into<String>, count: u64) {
        let message = message.into();
        if count > 0 {
            tracing::warn!(warning = %message, count, "operation warning");
            *self.warnings.entry(message).or_insert(0) += count;
        }
    }

    pub fn set_info(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.info.insert(key.into(), value.into());
    }

    pub fn info_u64(&self, key: &str) -> Option<u64> {
        self.info.get(key).and_then(|v| v.as_u64())
    }

    /// Fold another report's warnings into this one; matching messages
    /// add their counts.
    pub fn merge_warnings(&mut self, other: OpReport) {
        for (message, count) in other.warnings {
            *self.warnings.entry(message).or_insert(0) += count;
        }
    }
}
