//! Event system for chain lifecycle hooks.
//!
//! Provides an optional, non-intrusive way to observe chain execution.
//! The executor emits events when operations start and finish, on every
//! poll attempt and around checkpoint rollback. Implement [`EventHandler`]
//! to receive them for progress reporting or auditing.

use std::sync::Arc;

/// Events emitted during chain execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// An operation is about to be posted.
    OperationStart {
        /// Operation name as invoked.
        name: String,
        /// Endpoint path the request goes to.
        endpoint: String,
    },
    /// An operation has been posted and judged.
    OperationEnd {
        name: String,
        /// Whether the response severity was at most INFO.
        ok: bool,
    },
    /// An operation was dropped before posting.
    OperationSkipped { name: String, reason: String },
    /// One request of a polling operation has been evaluated.
    PollAttempt {
        name: String,
        /// 1-indexed attempt number.
        attempt: u32,
        matched: bool,
    },
    /// A transport-level retry due to an HTTP or connection error.
    TransportRetry {
        name: String,
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },
    /// Rollback to a checkpoint has been requested.
    RollbackStart { checkpoint: String },
    /// Rollback finished.
    RollbackEnd { checkpoint: String, success: bool },
    /// The chain's checkpoint was removed from the appliance.
    CheckpointRemoved { checkpoint: String },
}

/// Handler for chain lifecycle events.
///
/// This is entirely optional. Chains run the same without one.
///
/// # Example
///
/// ```
/// use mgmt_chain::events::{Event, EventHandler};
///
/// struct PrintHandler;
///
/// impl EventHandler for PrintHandler {
///     fn on_event(&self, event: Event) {
///         match event {
///             Event::OperationStart { name, .. } => println!("[start] {}", name),
///             Event::OperationEnd { name, ok } => println!("[end] {} ok={}", name, ok),
///             _ => {}
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: Event);
}

/// Emit an event if a handler is present. No-op otherwise.
pub(crate) fn emit(handler: &Option<Arc<dyn EventHandler>>, event: Event) {
    if let Some(ref h) = handler {
        h.on_event(event);
    }
}

/// An [`EventHandler`] backed by a closure.
///
/// # Example
///
/// ```
/// use mgmt_chain::events::{Event, FnEventHandler};
/// use std::sync::Arc;
///
/// let handler = Arc::new(FnEventHandler(|event: Event| {
///     if let Event::RollbackEnd { success, .. } = event {
///         println!("rollback success={}", success);
///     }
/// }));
/// ```
pub struct FnEventHandler<F: Fn(Event) + Send + Sync>(pub F);

impl<F: Fn(Event) + Send + Sync> EventHandler for FnEventHandler<F> {
    fn on_event(&self, event: Event) {
        (self.0)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_without_handler_is_noop() {
        emit(
            &None,
            Event::CheckpointRemoved {
                checkpoint: "CP1".into(),
            },
        );
    }

    #[test]
    fn test_fn_handler_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: Arc<dyn EventHandler> = Arc::new(FnEventHandler(move |e: Event| {
            sink.lock().unwrap().push(e);
        }));
        emit(
            &Some(handler),
            Event::PollAttempt {
                name: "get-status".into(),
                attempt: 1,
                matched: false,
            },
        );
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], Event::PollAttempt { attempt: 1, .. }));
    }
}
