//! Ordered chain of operations and the policy that governs it.
//!
//! [`OperationChain`] is the unit of execution: the
//! [`ChainExecutor`](crate::executor::ChainExecutor) walks it in order,
//! removing operations that cannot be generated, and wraps it in a checkpoint
//! when rollback is enabled.

use crate::checkpoint::Checkpoint;
use crate::operation::Operation;
use crate::severity::Severity;

/// How severe responses are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailPolicy {
    /// Abort the remaining chain on a severe response.
    pub fail_on_error: bool,
    /// Lowest severity that takes the fatal branch.
    pub abort_threshold: Severity,
}

impl Default for FailPolicy {
    fn default() -> Self {
        Self {
            fail_on_error: true,
            abort_threshold: Severity::Fatal,
        }
    }
}

/// An ordered, mutable sequence of operations.
///
/// # Example
///
/// ```
/// use mgmt_chain::{Operation, OperationChain};
///
/// let mut chain = OperationChain::new()
///     .push(Operation::new("do-import").with_option("srcFile", "export.zip"))
///     .push(Operation::new("SaveConfig"));
/// chain.enable_rollback();
///
/// assert_eq!(chain.len(), 3);
/// assert_eq!(chain.operations()[0].name(), "SaveCheckpoint");
/// ```
#[derive(Debug, Clone, Default)]
pub struct OperationChain {
    pub(crate) operations: Vec<Operation>,
    pub(crate) checkpoint: Option<Checkpoint>,
    pub(crate) policy: FailPolicy,
    pub(crate) default_domain: Option<String>,
}

impl OperationChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operation to the end of the chain (builder style).
    pub fn push(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Add an operation to the end of the chain (mutation style).
    pub fn add(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn get(&self, index: usize) -> Option<&Operation> {
        self.operations.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Operation> {
        self.operations.get_mut(index)
    }

    pub fn policy(&self) -> &FailPolicy {
        &self.policy
    }

    pub fn set_fail_on_error(&mut self, fail_on_error: bool) {
        self.policy.fail_on_error = fail_on_error;
    }

    pub fn set_abort_threshold(&mut self, threshold: Severity) {
        self.policy.abort_threshold = threshold;
    }

    /// Domain applied to operations that do not set their own.
    pub fn default_domain(&self) -> Option<&str> {
        self.default_domain.as_deref()
    }

    pub fn set_default_domain(&mut self, domain: Option<String>) {
        self.default_domain = domain;
    }

    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoint.as_ref()
    }

    /// Wrap the chain in a fresh checkpoint.
    ///
    /// Prepends the checkpoint-save operation and forces fail-on-error. A
    /// chain that already has a checkpoint is left unchanged.
    pub fn enable_rollback(&mut self) {
        self.enable_rollback_with(Checkpoint::now());
    }

    pub fn enable_rollback_with(&mut self, checkpoint: Checkpoint) {
        if self.checkpoint.is_some() {
            return;
        }
        self.operations.insert(0, checkpoint.save_operation());
        self.checkpoint = Some(checkpoint);
        self.policy.fail_on_error = true;
    }

    /// Clear the checkpoint and drop its save operation.
    pub fn disable_rollback(&mut self) {
        if let Some(cp) = self.checkpoint.take() {
            self.operations.retain(|op| !cp.is_save_of(op));
        }
    }
}
