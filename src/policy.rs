//! Error policy: what a classified severity means for the rest of the chain.

use crate::chain::FailPolicy;
use crate::severity::Severity;

/// Decision for one classified response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Log and carry on.
    Continue,
    /// Log as a warning and carry on.
    Warn,
    /// Restore the active checkpoint, then stop.
    Rollback,
    /// Stop the chain.
    Abort,
}

/// Apply the failure policy to `severity`.
///
/// Severities at or above the abort threshold take the fatal branch. The
/// fatal branch only stops the chain when fail-on-error is set and the
/// operation's own fail flag is up; otherwise it is demoted to a warning.
/// Checkpoint save and rollback operations never trigger a rollback.
pub fn judge(
    severity: Severity,
    policy: &FailPolicy,
    fail_flag: bool,
    checkpoint_active: bool,
    is_checkpoint_op: bool,
) -> Verdict {
    if severity < policy.abort_threshold {
        return if severity >= Severity::Warn {
            Verdict::Warn
        } else {
            Verdict::Continue
        };
    }
    if policy.fail_on_error && fail_flag {
        if checkpoint_active && !is_checkpoint_op {
            Verdict::Rollback
        } else {
            Verdict::Abort
        }
    } else {
        Verdict::Warn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fail_fast() -> FailPolicy {
        FailPolicy::default()
    }

    #[test]
    fn test_below_threshold_continues() {
        let p = fail_fast();
        assert_eq!(judge(Severity::Info, &p, true, true, false), Verdict::Continue);
        assert_eq!(judge(Severity::Warn, &p, true, true, false), Verdict::Warn);
        assert_eq!(judge(Severity::Error, &p, true, true, false), Verdict::Warn);
    }

    #[test]
    fn test_fatal_with_checkpoint_rolls_back() {
        let p = fail_fast();
        assert_eq!(judge(Severity::Fatal, &p, true, true, false), Verdict::Rollback);
        assert_eq!(judge(Severity::Fatal, &p, true, false, false), Verdict::Abort);
    }

    #[test]
    fn test_checkpoint_operations_never_roll_back() {
        let p = fail_fast();
        assert_eq!(judge(Severity::Fatal, &p, true, true, true), Verdict::Abort);
    }

    #[test]
    fn test_fatal_demoted_without_fail_flag_or_fail_fast() {
        let p = fail_fast();
        assert_eq!(judge(Severity::Fatal, &p, false, true, false), Verdict::Warn);

        let lenient = FailPolicy {
            fail_on_error: false,
            ..fail_fast()
        };
        assert_eq!(judge(Severity::Fatal, &lenient, true, true, false), Verdict::Warn);
    }

    #[test]
    fn test_lower_threshold() {
        let p = FailPolicy {
            abort_threshold: Severity::Error,
            ..fail_fast()
        };
        assert_eq!(judge(Severity::Error, &p, true, false, false), Verdict::Abort);
        assert_eq!(judge(Severity::Warn, &p, true, false, false), Verdict::Warn);
    }
}
