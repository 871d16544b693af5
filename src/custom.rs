//! Composite operations delegated to caller-supplied hooks.
//!
//! A composite is invoked under its own name (for example a directory upload)
//! but is carried through the chain as its underlying protocol operation.
//! The executor hands the posting step to the hook, which may generate and
//! post any number of sub-operations through the [`StepContext`].

use crate::error::Result;
use crate::executor::StepContext;
use crate::operation::Operation;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait CustomOperation: Send + Sync {
    /// Name the caller uses to invoke the composite.
    fn name(&self) -> &str;

    /// Underlying protocol operation.
    fn base_name(&self) -> &str;

    /// Take over posting. Return `false` to let the executor post the
    /// operation normally.
    async fn intercept_post(
        &self,
        operation: &mut Operation,
        ctx: &mut StepContext<'_>,
    ) -> Result<bool>;

    /// Rewrite the reported result text.
    fn intercept_result(&self, text: &str, _success: bool) -> String {
        text.to_string()
    }
}

/// Composite hooks keyed by invoked name.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn CustomOperation>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn CustomOperation>) {
        self.hooks.insert(hook.name().to_string(), hook);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CustomOperation>> {
        self.hooks.get(name).cloned()
    }

    pub fn is_composite(&self, name: &str) -> bool {
        self.hooks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.hooks.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationKind;

    struct UploadDir;

    #[async_trait]
    impl CustomOperation for UploadDir {
        fn name(&self) -> &str {
            "set-dir"
        }
        fn base_name(&self) -> &str {
            "set-file"
        }
        async fn intercept_post(
            &self,
            _operation: &mut Operation,
            _ctx: &mut StepContext<'_>,
        ) -> Result<bool> {
            Ok(true)
        }
        fn intercept_result(&self, text: &str, _success: bool) -> String {
            format!("[dir] {}", text)
        }
    }

    #[test]
    fn test_composite_is_renamed_to_base_operation() {
        let mut hooks = HookRegistry::new();
        hooks.register(Arc::new(UploadDir));

        let op = Operation::resolve("set-dir", &hooks);
        assert_eq!(op.name(), "set-file");
        assert_eq!(op.invoked_name(), "set-dir");
        assert!(matches!(op.kind(), OperationKind::Composite(_)));

        let native = Operation::resolve("get-status", &hooks);
        assert!(matches!(native.kind(), OperationKind::Native));
    }

    #[test]
    fn test_composite_result_intercept() {
        let mut hooks = HookRegistry::new();
        hooks.register(Arc::new(UploadDir));
        let op = Operation::resolve("set-dir", &hooks);
        let out = op.intercept_result("ok".into(), true, crate::config::OutputType::Parsed);
        assert_eq!(out, "[dir] ok");
    }
}
