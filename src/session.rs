//! Session shared by every operation in a chain run.
//!
//! [`Session`] carries the appliance address and credentials, the loaded
//! schemas, the response classifier, the transport, composite hooks, the
//! cancellation token and an optional event handler. It is built once and
//! borrowed by the [`ChainExecutor`](crate::executor::ChainExecutor).

use crate::backend::{self, BackoffConfig, HttpsTransport, PostRequest, Transport};
use crate::chain::OperationChain;
use crate::classify::{ResponseClassifier, XmlResponseClassifier};
use crate::config::{OutputType, SessionConfig, Verbosity};
use crate::credentials::{default_netrc_path, Credentials};
use crate::custom::{CustomOperation, HookRegistry};
use crate::error::{ChainError, Result};
use crate::events::{emit, Event, EventHandler};
use crate::operation::Operation;
use crate::schema::{SchemaBinder, SchemaSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Shared state for one appliance.
///
/// # Example
///
/// ```
/// use mgmt_chain::{Session, SessionConfig};
/// use mgmt_chain::backend::MockTransport;
/// use std::sync::Arc;
///
/// let mut config = SessionConfig::default();
/// config.host_name = Some("dp1.example.com".into());
/// config.user_name = Some("admin".into());
/// config.user_password = Some("secret".into());
///
/// let session = Session::builder(config)
///     .transport(Arc::new(MockTransport::fixed("<ok/>")))
///     .build()
///     .unwrap();
/// assert_eq!(session.host(), "dp1.example.com");
/// ```
pub struct Session {
    config: SessionConfig,
    host: String,
    credentials: Credentials,
    verbosity: Verbosity,
    /// Loaded schemas. Default: empty.
    pub schemas: SchemaSet,
    /// Response classifier. Default: [`XmlResponseClassifier`].
    pub classifier: Arc<dyn ResponseClassifier>,
    /// Transport. Default: [`HttpsTransport`].
    pub transport: Arc<dyn Transport>,
    /// Transport retry configuration. Default: [`BackoffConfig::none()`].
    pub backoff: BackoffConfig,
    pub hooks: HookRegistry,
    pub cancellation: CancellationToken,
    pub event_handler: Option<Arc<dyn EventHandler>>,
}

impl Session {
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            credentials: None,
            schemas: SchemaSet::new(),
            classifier: None,
            transport: None,
            backoff: None,
            hooks: HookRegistry::new(),
            cancellation: None,
            event_handler: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.config.port
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn output_type(&self) -> OutputType {
        self.config.output_type
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Return an error if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(ChainError::Cancelled);
        }
        Ok(())
    }

    /// An operation resolved against the registered composite hooks.
    pub fn operation(&self, name: impl Into<String>) -> Operation {
        Operation::resolve(name, &self.hooks)
    }

    /// An empty chain carrying the session's failure policy and default
    /// domain, with rollback enabled when `rollbackOnError` is set.
    pub fn new_chain(&self) -> OperationChain {
        let mut chain = OperationChain::new();
        chain.set_fail_on_error(self.config.fail_on_error);
        chain.set_default_domain(self.config.domain.clone());
        if self.config.rollback_on_error {
            chain.enable_rollback();
        }
        chain
    }

    pub(crate) fn emit(&self, event: Event) {
        emit(&self.event_handler, event);
    }

    /// Post a payload to `endpoint` with transport retry.
    pub(crate) async fn post(&self, operation: &str, endpoint: &str, payload: &str) -> Result<String> {
        let request = PostRequest {
            host: &self.host,
            port: self.config.port,
            endpoint,
            payload,
            credentials: &self.credentials,
        };
        let handler = self.event_handler.clone();
        let mut on_retry = |attempt: u32, delay: Duration, reason: &str| {
            tracing::warn!(operation, attempt, delay_ms = delay.as_millis() as u64, reason, "retrying request");
            emit(
                &handler,
                Event::TransportRetry {
                    name: operation.to_string(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: reason.to_string(),
                },
            );
        };
        backend::with_backoff(
            &self.transport,
            &request,
            &self.backoff,
            &self.cancellation,
            Some(&mut on_retry),
        )
        .await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("port", &self.config.port)
            .field("credentials", &self.credentials)
            .field("schemas", &self.schemas)
            .field("transport", &self.transport.name())
            .field("backoff", &self.backoff)
            .field("hooks", &self.hooks)
            .field("has_event_handler", &self.event_handler.is_some())
            .finish()
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    config: SessionConfig,
    credentials: Option<Credentials>,
    schemas: SchemaSet,
    classifier: Option<Arc<dyn ResponseClassifier>>,
    transport: Option<Arc<dyn Transport>>,
    backoff: Option<BackoffConfig>,
    hooks: HookRegistry,
    cancellation: Option<CancellationToken>,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl SessionBuilder {
    /// Explicit credentials; takes precedence over the config and netrc.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn schemas(mut self, schemas: SchemaSet) -> Self {
        self.schemas = schemas;
        self
    }

    /// Load one more schema; later schemas win.
    pub fn schema(mut self, binder: Arc<dyn SchemaBinder>) -> Self {
        self.schemas.push(binder);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn ResponseClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn backoff(mut self, config: BackoffConfig) -> Self {
        self.backoff = Some(config);
        self
    }

    pub fn hook(mut self, hook: Arc<dyn CustomOperation>) -> Self {
        self.hooks.register(hook);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Build the session.
    ///
    /// Fails when no host is configured or no credentials can be found.
    pub fn build(self) -> Result<Session> {
        let host = self
            .config
            .host_name
            .clone()
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| ChainError::InvalidConfig("hostName is required".into()))?;

        let credentials = match self.credentials {
            Some(c) => c,
            None => resolve_credentials(&self.config, &host)?,
        };

        let transport = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpsTransport::new(Duration::from_secs(
                self.config.request_timeout_secs,
            ))?),
        };

        let verbosity = self.config.verbosity();
        tracing::debug!(host = %host, user = %credentials.user_name, transport = transport.name(), "session ready");

        Ok(Session {
            host,
            credentials,
            verbosity,
            schemas: self.schemas,
            classifier: self
                .classifier
                .unwrap_or_else(|| Arc::new(XmlResponseClassifier)),
            transport,
            backoff: self.backoff.unwrap_or_else(BackoffConfig::none),
            hooks: self.hooks,
            cancellation: self.cancellation.unwrap_or_default(),
            event_handler: self.event_handler,
            config: self.config,
        })
    }
}

/// Config user and password, then the netrc entry for `host`.
fn resolve_credentials(config: &SessionConfig, host: &str) -> Result<Credentials> {
    if let (Some(user), Some(password)) = (&config.user_name, &config.user_password) {
        return Ok(Credentials::new(user.clone(), password.clone()));
    }
    let netrc = config.netrc.clone().or_else(default_netrc_path);
    if let Some(path) = netrc {
        if let Some(found) = Credentials::from_netrc(&path, host)? {
            tracing::debug!(host, path = %path.display(), "credentials from netrc");
            return Ok(found);
        }
    }
    Err(ChainError::InvalidConfig(format!(
        "no credentials for '{}': set userName and userPassword or add a netrc entry",
        host
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockTransport;
    use std::io::Write;

    fn config() -> SessionConfig {
        SessionConfig {
            host_name: Some("dp1".into()),
            user_name: Some("admin".into()),
            user_password: Some("pw".into()),
            ..Default::default()
        }
    }

    fn mock() -> Arc<dyn Transport> {
        Arc::new(MockTransport::fixed("<ok/>"))
    }

    #[test]
    fn test_host_is_required() {
        let err = Session::builder(SessionConfig::default())
            .transport(mock())
            .build()
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidConfig(_)));
    }

    #[test]
    fn test_explicit_credentials_win() {
        let session = Session::builder(config())
            .credentials(Credentials::new("deployer", "x"))
            .transport(mock())
            .build()
            .unwrap();
        assert_eq!(session.credentials().user_name, "deployer");
    }

    #[test]
    fn test_credentials_from_netrc() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "machine dp1 login ops password hunter2").unwrap();
        let cfg = SessionConfig {
            host_name: Some("dp1".into()),
            netrc: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let session = Session::builder(cfg).transport(mock()).build().unwrap();
        assert_eq!(session.credentials().user_name, "ops");
        assert_eq!(session.credentials().password(), "hunter2");
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let cfg = SessionConfig {
            host_name: Some("dp1".into()),
            netrc: Some("/no/such/netrc".into()),
            ..Default::default()
        };
        let err = Session::builder(cfg).transport(mock()).build().unwrap_err();
        assert!(matches!(err, ChainError::InvalidConfig(_)));
    }

    #[test]
    fn test_new_chain_applies_rollback_and_domain() {
        let mut cfg = config();
        cfg.fail_on_error = false;
        cfg.rollback_on_error = true;
        cfg.domain = Some("dev".into());
        let session = Session::builder(cfg).transport(mock()).build().unwrap();

        let chain = session.new_chain();
        assert!(chain.policy().fail_on_error);
        assert_eq!(chain.default_domain(), Some("dev"));
        assert!(chain.checkpoint().is_some());
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_check_cancelled() {
        let token = CancellationToken::new();
        let session = Session::builder(config())
            .transport(mock())
            .cancellation(token.clone())
            .build()
            .unwrap();
        tokio_test::assert_ok!(session.check_cancelled());
        token.cancel();
        assert!(matches!(session.check_cancelled(), Err(ChainError::Cancelled)));
    }
}
