//! Poll engine: repeat an operation until its response satisfies a condition.
//!
//! Each attempt regenerates the request, posts it and classifies the
//! response. A `waitFor` literal is matched against the classified text in
//! lowercase, UPPERCASE or Capitalized form. A `waitForXPath` query is
//! compiled before the first request and evaluated against the raw
//! response. Between attempts the engine sleeps for the poll interval; the
//! remaining budget is `waitTime - attempts * whole seconds per interval`,
//! so request latency does not change the number of attempts.

use crate::classify::Classification;
use crate::error::{ChainError, Result};
use crate::events::Event;
use crate::executor::StepContext;
use crate::operation::{Operation, PollSpec};
use crate::policy::{self, Verdict};
use crate::report::Outcome;
use crate::xml::query::Query;
use crate::xml::tree;
use regex::Regex;
use std::time::Duration;
use tokio::time::Instant;

/// What a polling operation waits for.
#[derive(Debug, Clone)]
pub enum Condition {
    Text { literal: String, matcher: Regex },
    Query(Query),
}

impl Condition {
    /// Build the condition for `spec`. A query takes precedence over a literal.
    pub fn from_spec(spec: &PollSpec) -> Result<Self> {
        if let Some(expression) = &spec.wait_for_xpath {
            let query = Query::compile(expression).map_err(|e| ChainError::PollPredicateInvalid {
                expression: expression.clone(),
                message: e.to_string(),
            })?;
            return Ok(Condition::Query(query));
        }
        let literal = spec.wait_for.clone().ok_or_else(|| {
            ChainError::InvalidConfig("polling operation has no wait condition".into())
        })?;
        let matcher = case_variants(&literal)?;
        Ok(Condition::Text { literal, matcher })
    }

    /// Human-readable condition for log and error messages.
    pub fn describe(&self) -> String {
        match self {
            Condition::Text { literal, .. } => format!("the required '{}'", literal),
            Condition::Query(q) => format!("matching XPath '{}'", q.source()),
        }
    }

    fn matches(&self, op: &Operation, raw: &str, classification: &Classification) -> Result<bool> {
        match self {
            Condition::Text { matcher, .. } => Ok(matcher.is_match(&classification.message)),
            Condition::Query(query) => {
                let root = tree::parse(raw).map_err(|e| ChainError::Classification {
                    operation: op.invoked_name().to_string(),
                    message: e.to_string(),
                })?;
                Ok(query.matches(&root))
            }
        }
    }
}

/// Matcher accepting `literal` in lowercase, UPPERCASE or Capitalized form.
pub fn case_variants(literal: &str) -> Result<Regex> {
    let lower = literal.to_lowercase();
    let upper = literal.to_uppercase();
    let mut chars = lower.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    let pattern = format!(
        "(?:{}|{}|{})",
        regex::escape(&lower),
        regex::escape(&upper),
        regex::escape(&capitalized)
    );
    Regex::new(&pattern).map_err(|e| ChainError::PollPredicateInvalid {
        expression: literal.to_string(),
        message: e.to_string(),
    })
}

/// Whether a non-matching response would abort or roll back the chain.
fn stops_chain(ctx: &StepContext<'_>, op: &Operation, classification: &Classification) -> bool {
    matches!(
        policy::judge(
            classification.severity,
            ctx.policy(),
            op.fail_flag,
            ctx.checkpoint().is_some(),
            op.is_checkpoint_op(),
        ),
        Verdict::Abort | Verdict::Rollback
    )
}

/// Poll `op` until its condition matches or its time budget runs out.
///
/// A matching response goes through the failure policy like any other, and
/// so does any response the policy would stop the chain on.
/// Classification failures end the poll at once. Running out of time is a
/// [`ChainError::PollTimeout`] under fail-on-error with the fail flag up, a
/// logged warning otherwise.
pub(crate) async fn poll(ctx: &mut StepContext<'_>, op: &mut Operation) -> Result<()> {
    let condition = Condition::from_spec(&op.poll)?;
    let wait_seconds = op.poll.wait_time_seconds;
    let interval_millis = op.poll.poll_interval_millis;
    let interval = Duration::from_millis(interval_millis);
    let budget = Duration::from_secs(wait_seconds);
    let seconds_per_poll = (interval_millis / 1000) as i64;

    tracing::info!(
        operation = op.invoked_name(),
        condition = %condition.describe(),
        wait_seconds,
        interval_millis,
        "polling"
    );

    let started = Instant::now();
    let mut polls: i64 = 0;
    let mut remaining = wait_seconds as i64;

    while remaining > 0 {
        ctx.generate(op)?;
        let raw = ctx.post(op).await?;
        let classification = ctx.classify(op, &raw)?;
        let matched = condition.matches(op, &raw, &classification)?;
        polls += 1;

        ctx.session().emit(Event::PollAttempt {
            name: op.invoked_name().to_string(),
            attempt: polls as u32,
            matched,
        });
        tracing::debug!(
            operation = op.invoked_name(),
            attempt = polls,
            matched,
            response = %ctx.session().verbosity().excerpt(&classification.message),
            "poll attempt"
        );

        if matched || stops_chain(ctx, op, &classification) {
            ctx.conclude(op, classification, polls as u32).await?;
            return Ok(());
        }

        remaining = wait_seconds as i64 - polls * seconds_per_poll;
        // Sub-second intervals never reduce the count, so bound them by the clock.
        if remaining <= 0 || (seconds_per_poll == 0 && started.elapsed() >= budget) {
            break;
        }
        tokio::select! {
            _ = ctx.session().cancellation.cancelled() => return Err(ChainError::Cancelled),
            _ = tokio::time::sleep(interval) => {}
        }
    }

    let error = ChainError::PollTimeout {
        operation: op.invoked_name().to_string(),
        condition: condition.describe(),
        wait_seconds,
    };
    if ctx.policy().fail_on_error && op.fail_flag {
        tracing::error!(operation = op.invoked_name(), error = %error, "poll timed out");
        ctx.record_outcome(op, Outcome::Failed, None, Some(error.to_string()), polls as u32);
        Err(error)
    } else {
        tracing::warn!(operation = op.invoked_name(), error = %error, "poll timed out, continuing");
        ctx.record_outcome(op, Outcome::Warning, None, Some(error.to_string()), polls as u32);
        Ok(())
    }
}
