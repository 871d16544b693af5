//! Chain executor: generate, post, classify and judge every operation in order.
//!
//! ## Architecture
//!
//! ```text
//! execute(chain)
//!   ├─ prebuild: generate every operation that is not memSafe
//!   │            (failures remove the operation; fail-fast stops)
//!   ├─ post pass, in order:
//!   │    memSafe      → generate now, drop payload after posting
//!   │    composite    → CustomOperation::intercept_post
//!   │    waitFor      → poll engine
//!   │    otherwise    → post once → classify → policy
//!   │                                              └─ Rollback → RollbackCheckpoint
//!   └─ remove the active checkpoint
//! ```
//!
//! Nothing here exits the process. Every terminal path returns a
//! [`ChainError`] whose [`exit_code`](ChainError::exit_code) the caller maps
//! onto the process status.

use crate::chain::{FailPolicy, OperationChain};
use crate::checkpoint::Checkpoint;
use crate::classify::{http_error_response, Classification, ResponseProfile};
use crate::error::{ChainError, Result};
use crate::events::Event;
use crate::generator;
use crate::operation::{Operation, OperationKind, DO_EXPORT, GET_FILE};
use crate::poll;
use crate::policy::{self, Verdict};
use crate::report::{OperationRecord, Outcome, RunReport};
use crate::schema::SOMA_CURRENT_ENDPOINT;
use crate::session::Session;
use crate::severity::Severity;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Per-run state handed to each step and to composite hooks.
///
/// Hooks use it to generate and post sub-operations with the same session,
/// default domain, failure policy and checkpoint as the chain.
pub struct StepContext<'a> {
    session: &'a Session,
    default_domain: Option<&'a str>,
    policy: &'a FailPolicy,
    checkpoint: &'a mut Option<Checkpoint>,
    report: &'a mut RunReport,
}

impl<'a> StepContext<'a> {
    pub fn session(&self) -> &Session {
        self.session
    }

    pub fn policy(&self) -> &FailPolicy {
        self.policy
    }

    pub fn default_domain(&self) -> Option<&str> {
        self.default_domain
    }

    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoint.as_ref()
    }

    pub fn record(&mut self, record: OperationRecord) {
        self.report.push(record);
    }

    /// Build `op`'s request document into `op.payload`.
    pub fn generate(&self, op: &mut Operation) -> Result<()> {
        generator::generate(
            &self.session.schemas,
            op,
            self.default_domain,
            self.session.verbosity(),
        )
    }

    /// Post `op.payload` and store the raw response in `op.response`.
    ///
    /// Transport failures come back as an `HttpErrorResponse` document so they
    /// can be classified like any other response.
    pub async fn post(&self, op: &mut Operation) -> Result<String> {
        self.session.check_cancelled()?;
        let payload = op
            .payload
            .clone()
            .ok_or_else(|| ChainError::generation(op.name(), "no request generated"))?;
        let endpoint = op.endpoint().unwrap_or(SOMA_CURRENT_ENDPOINT).to_string();

        self.session.emit(Event::OperationStart {
            name: op.invoked_name().to_string(),
            endpoint: endpoint.clone(),
        });
        tracing::info!(operation = op.invoked_name(), endpoint = %endpoint, "posting");
        tracing::debug!(
            operation = op.invoked_name(),
            payload = %self.session.verbosity().excerpt(&payload),
            "request"
        );

        let raw = match self.session.post(op.name(), &endpoint, &payload).await {
            Ok(raw) => raw,
            Err(ChainError::Cancelled) => return Err(ChainError::Cancelled),
            Err(e) => {
                tracing::warn!(operation = op.invoked_name(), error = %e, "transport failure");
                http_error_response(&e)
            }
        };
        if self.session.verbosity().is_debug() {
            tracing::debug!(
                operation = op.invoked_name(),
                response = %self.session.verbosity().dump(&raw),
                "response"
            );
        }
        op.response = Some(raw.clone());
        Ok(raw)
    }

    /// Classify `raw` with the operation's rendering and failure rules.
    pub fn classify(&self, op: &Operation, raw: &str) -> Result<Classification> {
        let profile = ResponseProfile::for_operation(op, self.session.output_type());
        self.session
            .classifier
            .classify(raw, &profile)
            .map_err(|e| match e {
                ChainError::Classification { message, .. } => ChainError::Classification {
                    operation: op.invoked_name().to_string(),
                    message,
                },
                other => other,
            })
    }

    /// Classify a response and apply the failure policy to it.
    pub async fn process(&mut self, op: &mut Operation, raw: &str) -> Result<Classification> {
        let classification = match self.classify(op, raw) {
            Ok(c) => c,
            Err(e) if self.policy.fail_on_error && op.fail_flag => {
                tracing::error!(operation = op.invoked_name(), error = %e, "unreadable response");
                self.record_outcome(op, Outcome::Failed, None, Some(e.to_string()), 0);
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(operation = op.invoked_name(), error = %e, "unreadable response, continuing");
                let c = Classification::new(Severity::Warn, e.to_string());
                self.record_outcome(op, Outcome::Warning, Some(c.severity), Some(c.message.clone()), 0);
                return Ok(c);
            }
        };
        self.conclude(op, classification, 0).await
    }

    /// Generate if needed, post once, classify and judge.
    pub async fn run_single(&mut self, op: &mut Operation) -> Result<Classification> {
        if op.payload.is_none() {
            self.generate(op)?;
        }
        let raw = self.post(op).await?;
        self.process(op, &raw).await
    }

    /// Report a classified response and act on the policy verdict.
    pub(crate) async fn conclude(
        &mut self,
        op: &mut Operation,
        classification: Classification,
        polls: u32,
    ) -> Result<Classification> {
        let success = classification.is_success();
        let text = op.intercept_result(
            classification.message.clone(),
            success,
            self.session.output_type(),
        );
        self.show(op, success, &text);
        if success {
            write_destination(op, &classification.message)?;
        }
        self.session.emit(Event::OperationEnd {
            name: op.invoked_name().to_string(),
            ok: success,
        });

        let verdict = policy::judge(
            classification.severity,
            self.policy,
            op.fail_flag,
            self.checkpoint.is_some(),
            op.is_checkpoint_op(),
        );
        let severity = Some(classification.severity);
        match verdict {
            Verdict::Continue => {
                self.record_outcome(op, Outcome::Ok, severity, Some(text), polls);
                Ok(classification)
            }
            Verdict::Warn => {
                if classification.severity >= self.policy.abort_threshold {
                    tracing::warn!(
                        operation = op.invoked_name(),
                        severity = %classification.severity,
                        "failure ignored, continuing"
                    );
                }
                self.record_outcome(op, Outcome::Warning, severity, Some(text), polls);
                Ok(classification)
            }
            Verdict::Abort => {
                tracing::error!(
                    operation = op.invoked_name(),
                    severity = %classification.severity,
                    "stopping chain"
                );
                self.record_outcome(op, Outcome::Failed, severity, Some(text), polls);
                Err(ChainError::ResponseSeverity {
                    operation: op.invoked_name().to_string(),
                    severity: classification.severity,
                    message: classification.message,
                })
            }
            Verdict::Rollback => {
                self.record_outcome(op, Outcome::Failed, severity, Some(text), polls);
                Err(self.rollback(op.invoked_name(), &classification.message).await)
            }
        }
    }

    /// Restore the checkpoint after `failed` returned a fatal response.
    async fn rollback(&mut self, failed: &str, message: &str) -> ChainError {
        let Some(checkpoint) = self.checkpoint.clone() else {
            return ChainError::ResponseSeverity {
                operation: failed.to_string(),
                severity: Severity::Fatal,
                message: message.to_string(),
            };
        };
        tracing::warn!(operation = failed, checkpoint = checkpoint.name(), "rolling back");
        self.session.emit(Event::RollbackStart {
            checkpoint: checkpoint.name().to_string(),
        });

        let mut op = checkpoint.rollback_operation();
        let success = match self.send_unjudged(&mut op).await {
            Ok(c) if c.is_success() => true,
            Ok(c) => {
                tracing::error!(checkpoint = checkpoint.name(), response = %c.message, "rollback refused");
                false
            }
            Err(e) => {
                tracing::error!(checkpoint = checkpoint.name(), error = %e, "rollback failed");
                false
            }
        };
        self.session.emit(Event::RollbackEnd {
            checkpoint: checkpoint.name().to_string(),
            success,
        });

        if success {
            self.report.rolled_back = true;
            self.remove_checkpoint().await;
            ChainError::RolledBack {
                operation: failed.to_string(),
                checkpoint: checkpoint.name().to_string(),
                message: message.to_string(),
            }
        } else {
            ChainError::RollbackFailure {
                operation: failed.to_string(),
                checkpoint: checkpoint.name().to_string(),
                message: message.to_string(),
            }
        }
    }

    /// Delete the active checkpoint from the appliance. Failures are logged and
    /// leave the checkpoint in place.
    pub(crate) async fn remove_checkpoint(&mut self) -> bool {
        let Some(checkpoint) = self.checkpoint.clone() else {
            return true;
        };
        let mut op = checkpoint.remove_operation();
        match self.send_unjudged(&mut op).await {
            Ok(c) if c.is_success() => {
                tracing::info!(checkpoint = checkpoint.name(), "checkpoint removed");
                *self.checkpoint = None;
                self.report.checkpoint_removed = true;
                self.session.emit(Event::CheckpointRemoved {
                    checkpoint: checkpoint.name().to_string(),
                });
                true
            }
            Ok(c) => {
                tracing::warn!(checkpoint = checkpoint.name(), response = %c.message, "checkpoint not removed");
                false
            }
            Err(e) => {
                tracing::warn!(checkpoint = checkpoint.name(), error = %e, "checkpoint not removed");
                false
            }
        }
    }

    /// Generate, post and classify without applying the failure policy.
    async fn send_unjudged(&self, op: &mut Operation) -> Result<Classification> {
        self.generate(op)?;
        let raw = self.post(op).await?;
        self.classify(op, &raw)
    }

    fn show(&self, op: &Operation, success: bool, text: &str) {
        let verbosity = self.session.verbosity();
        if text.trim().is_empty() || (op.suppress_response && !verbosity.is_debug()) {
            return;
        }
        if !self.session.config().log_output {
            println!("{}", text);
            return;
        }
        let shown = verbosity.dump(text);
        if success {
            tracing::info!(operation = op.invoked_name(), "{}", shown);
        } else {
            tracing::warn!(operation = op.invoked_name(), "{}", shown);
        }
    }

    pub(crate) fn record_outcome(
        &mut self,
        op: &Operation,
        outcome: Outcome,
        severity: Option<Severity>,
        message: Option<String>,
        polls: u32,
    ) {
        self.report.push(OperationRecord {
            name: op.invoked_name().to_string(),
            outcome,
            endpoint: op.endpoint().map(str::to_string),
            severity,
            message,
            polls,
        });
    }

    /// Remove a chain entry that could not be generated.
    fn drop_operation(
        &mut self,
        operations: &mut Vec<Operation>,
        index: usize,
        error: ChainError,
    ) -> Result<()> {
        let op = operations.remove(index);
        if self.policy.fail_on_error {
            tracing::error!(operation = op.invoked_name(), error = %error, "generation failed");
            self.record_outcome(&op, Outcome::Failed, None, Some(error.to_string()), 0);
            return Err(error);
        }
        tracing::warn!(operation = op.invoked_name(), error = %error, "generation failed, operation skipped");
        self.record_outcome(&op, Outcome::Skipped, None, Some(error.to_string()), 0);
        self.session.emit(Event::OperationSkipped {
            name: op.invoked_name().to_string(),
            reason: error.to_string(),
        });
        Ok(())
    }
}

/// Write a successful response to the operation's destination file.
/// File transfers carry base64 content, which is decoded first.
fn write_destination(op: &Operation, message: &str) -> Result<()> {
    let Some(path) = &op.dest_file else {
        return Ok(());
    };
    let bytes = if op.name() == GET_FILE || op.name() == DO_EXPORT {
        STANDARD
            .decode(message.trim())
            .map_err(|e| ChainError::Classification {
                operation: op.invoked_name().to_string(),
                message: format!("file content is not base64: {}", e),
            })?
    } else {
        message.as_bytes().to_vec()
    };
    std::fs::write(path, bytes)?;
    tracing::info!(operation = op.invoked_name(), path = %path.display(), "response written");
    Ok(())
}

fn is_generation_failure(error: &ChainError) -> bool {
    matches!(
        error,
        ChainError::SchemaNotFound { .. } | ChainError::Generation { .. }
    )
}

/// Drives an [`OperationChain`] against one [`Session`].
///
/// # Example
///
/// ```no_run
/// use mgmt_chain::{ChainExecutor, Operation, Session};
///
/// # async fn run(session: Session) -> mgmt_chain::Result<()> {
/// let mut chain = session.new_chain();
/// chain.add(Operation::new("do-import").with_option("srcFile", "export.zip"));
/// chain.add(Operation::new("SaveConfig"));
///
/// let report = ChainExecutor::new(&session).execute(&mut chain).await?;
/// println!("{} operations", report.operations.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ChainExecutor<'a> {
    session: &'a Session,
}

impl<'a> ChainExecutor<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Run `chain` and return its report.
    pub async fn execute(&self, chain: &mut OperationChain) -> Result<RunReport> {
        let mut report = RunReport::default();
        self.execute_into(chain, &mut report).await?;
        Ok(report)
    }

    /// Run `chain`, recording into `report` as it goes. The report is
    /// complete up to the failing operation when an error is returned.
    pub async fn execute_into(&self, chain: &mut OperationChain, report: &mut RunReport) -> Result<()> {
        if chain.is_empty() {
            return Err(ChainError::InvalidConfig("operation chain is empty".into()));
        }
        let OperationChain {
            operations,
            checkpoint,
            policy,
            default_domain,
        } = chain;
        report.checkpoint = checkpoint.as_ref().map(|c| c.name().to_string());

        tracing::info!(
            host = self.session.host(),
            operations = operations.len(),
            checkpoint = report.checkpoint.as_deref().unwrap_or("none"),
            "executing chain"
        );

        let mut ctx = StepContext {
            session: self.session,
            default_domain: default_domain.as_deref(),
            policy: &*policy,
            checkpoint,
            report,
        };

        let mut i = 0;
        while i < operations.len() {
            let op = &mut operations[i];
            if op.mem_safe || matches!(op.kind(), OperationKind::Composite(_)) {
                i += 1;
                continue;
            }
            match ctx.generate(op) {
                Ok(()) => i += 1,
                Err(e) => ctx.drop_operation(operations, i, e)?,
            }
        }

        let mut i = 0;
        while i < operations.len() {
            self.session.check_cancelled()?;
            let op = &mut operations[i];
            let mem_safe = op.mem_safe;

            let outcome = match op.kind().clone() {
                OperationKind::Composite(hook) => match hook.intercept_post(op, &mut ctx).await {
                    Ok(true) => {
                        ctx.record_outcome(op, Outcome::Delegated, None, None, 0);
                        Ok(())
                    }
                    Ok(false) => post_native(&mut ctx, op).await,
                    Err(e) => Err(e),
                },
                OperationKind::Native => post_native(&mut ctx, op).await,
            };

            match outcome {
                Ok(()) => {
                    if mem_safe {
                        operations[i].payload = None;
                    }
                    i += 1;
                }
                Err(e) if is_generation_failure(&e) => ctx.drop_operation(operations, i, e)?,
                Err(e) => return Err(e),
            }
        }

        if ctx.checkpoint.is_some() {
            ctx.remove_checkpoint().await;
        }
        tracing::info!(operations = operations.len(), "chain complete");
        Ok(())
    }
}

async fn post_native(ctx: &mut StepContext<'_>, op: &mut Operation) -> Result<()> {
    if op.is_polling() {
        poll::poll(ctx, op).await
    } else {
        ctx.run_single(op).await.map(|_| ())
    }
}
