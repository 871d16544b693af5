//! Run report: what happened to each operation in a chain run.
//!
//! [`RunReport`] is filled in by the executor as it goes, so a failed run
//! still reports every operation up to the failure.

use crate::error::Result;
use crate::severity::Severity;
use serde::Serialize;

/// How an operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Severity at most INFO.
    Ok,
    /// Logged as a warning and the chain carried on.
    Warning,
    /// Could not be generated; removed from the chain.
    Skipped,
    /// Stopped the chain.
    Failed,
    /// Posted by a composite hook.
    Delegated,
}

/// Record of one operation.
///
/// # Example
///
/// ```
/// use mgmt_chain::report::{OperationRecord, Outcome};
///
/// let rec = OperationRecord::new("do-import", Outcome::Ok);
/// assert!(rec.severity.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRecord {
    pub name: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Requests sent while polling. 0 for operations posted once.
    #[serde(skip_serializing_if = "is_zero")]
    pub polls: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl OperationRecord {
    pub fn new(name: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            name: name.into(),
            outcome,
            endpoint: None,
            severity: None,
            message: None,
            polls: 0,
        }
    }
}

/// Everything a chain run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub operations: Vec<OperationRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<String>,
    pub checkpoint_removed: bool,
    pub rolled_back: bool,
}

impl RunReport {
    pub fn push(&mut self, record: OperationRecord) {
        self.operations.push(record);
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.operations.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Whether any operation stopped the chain.
    pub fn failed(&self) -> bool {
        self.count(Outcome::Failed) > 0
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::ChainError::InvalidConfig(e.to_string()))
    }
}
