//! Deployment files: session settings, schema catalogs and the operation list.
//!
//! ```yaml
//! session:
//!   hostName: dp1.example.com
//!   domain: dev
//!   rollbackOnError: true
//!   schemaDir: schemas
//!   firmwareLevel: 7
//! properties: deploy.properties
//! catalogs:
//!   - schemas/extra-ops.yaml
//! operations:
//!   - name: do-import
//!     options:
//!       - { name: srcFile, value: export.zip }
//!       - { name: overwrite-objects, value: "true" }
//!   - name: get-status
//!     options:
//!       - { name: class, value: ObjectStatus }
//!     waitFor: up
//!     waitTime: 60
//!   - name: SaveConfig
//! ```
//!
//! Relative `file`, catalog, properties and schema directory paths are
//! resolved against the deployment file's directory.

use crate::backend::BackoffConfig;
use crate::chain::OperationChain;
use crate::config::SessionConfig;
use crate::error::{ChainError, Result};
use crate::operation::{Operation, DEFAULT_POLL_INTERVAL_MILLIS, DEFAULT_WAIT_SECONDS};
use crate::schema::{SchemaCatalog, SchemaLayout, SchemaSet};
use crate::session::{Session, SessionBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One option of an operation: a literal `value` or a `file` to encode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct OptionSpec {
    pub name: String,
    pub value: Option<String>,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OperationSpec {
    pub name: String,
    pub options: Vec<OptionSpec>,
    pub wait_for: Option<String>,
    #[serde(rename = "waitForXPath")]
    pub wait_for_xpath: Option<String>,
    pub wait_time: u64,
    pub poll_interval: u64,
    pub mem_safe: bool,
    pub fail_flag: bool,
    pub suppress_response: bool,
}

impl Default for OperationSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            options: Vec::new(),
            wait_for: None,
            wait_for_xpath: None,
            wait_time: DEFAULT_WAIT_SECONDS,
            poll_interval: DEFAULT_POLL_INTERVAL_MILLIS,
            mem_safe: false,
            fail_flag: true,
            suppress_response: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Deployment {
    pub session: SessionConfig,
    /// `key=value` file folded into the session settings.
    pub properties: Option<PathBuf>,
    pub backoff: BackoffConfig,
    /// Catalog files loaded after the schema directory; later files win.
    pub catalogs: Vec<PathBuf>,
    pub operations: Vec<OperationSpec>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl Deployment {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let deployment: Deployment = serde_yaml::from_str(text)?;
        Ok(deployment)
    }

    /// Read a deployment file and fold in its properties file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ChainError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut deployment = Self::from_yaml(&text)?;
        deployment.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        if let Some(props) = deployment.properties.clone() {
            let props = deployment.resolve(&props);
            let text = std::fs::read_to_string(&props).map_err(|e| {
                ChainError::InvalidConfig(format!("failed to read {}: {}", props.display(), e))
            })?;
            deployment.session.apply_properties(&text)?;
        }
        Ok(deployment)
    }

    /// Apply `name=value` overrides on top of the file's session settings.
    pub fn apply_overrides(&mut self, overrides: &[(String, String)]) -> Result<()> {
        for (name, value) in overrides {
            self.session.set_global_option(name, value)?;
        }
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Catalogs from the schema directory for the firmware level, then the
    /// listed catalog files.
    pub fn schema_set(&self) -> Result<SchemaSet> {
        let mut set = match &self.session.schema_dir {
            Some(dir) => SchemaLayout::new(self.resolve(dir))
                .load(self.session.firmware_level, self.session.schema.as_deref())?,
            None => SchemaSet::new(),
        };
        for path in &self.catalogs {
            set.push(Arc::new(SchemaCatalog::load(&self.resolve(path))?));
        }
        if set.is_empty() {
            return Err(ChainError::InvalidConfig(
                "no schema catalogs loaded: set session.schemaDir or list catalogs".into(),
            ));
        }
        Ok(set)
    }

    /// Session builder preloaded with this deployment's schemas and backoff.
    pub fn session_builder(&self) -> Result<SessionBuilder> {
        Ok(Session::builder(self.session.clone())
            .schemas(self.schema_set()?)
            .backoff(self.backoff.clone()))
    }

    /// The operation chain, with rollback enabled when configured.
    pub fn build_chain(&self, session: &Session) -> Result<OperationChain> {
        if self.operations.is_empty() {
            return Err(ChainError::InvalidConfig("deployment lists no operations".into()));
        }
        let mut chain = session.new_chain();
        for spec in &self.operations {
            chain.add(self.build_operation(session, spec)?);
        }
        Ok(chain)
    }

    fn build_operation(&self, session: &Session, spec: &OperationSpec) -> Result<Operation> {
        if spec.name.trim().is_empty() {
            return Err(ChainError::InvalidConfig("operation without a name".into()));
        }
        let mut op = session.operation(spec.name.trim());
        for option in &spec.options {
            match (&option.value, &option.file) {
                (Some(value), None) => op.add_option(option.name.clone(), value.clone()),
                (None, Some(file)) => op.add_file_option(option.name.clone(), self.resolve(file)),
                _ => {
                    return Err(ChainError::InvalidConfig(format!(
                        "option '{}' of '{}' needs exactly one of value or file",
                        option.name, spec.name
                    )))
                }
            }
        }
        op.poll.wait_for = spec.wait_for.clone();
        op.poll.wait_for_xpath = spec.wait_for_xpath.clone();
        op.poll.wait_time_seconds = spec.wait_time;
        op.poll.poll_interval_millis = spec.poll_interval;
        op.mem_safe = spec.mem_safe;
        op.fail_flag = spec.fail_flag;
        op.suppress_response = spec.suppress_response;
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockTransport;
    use crate::operation::SAVE_CHECKPOINT;

    const DEPLOYMENT: &str = r#"
session:
  hostName: dp1
  userName: admin
  userPassword: pw
  domain: dev
  rollbackOnError: true
catalogs:
  - soma.yaml
operations:
  - name: do-import
    memSafe: true
    options:
      - { name: srcFile, value: export.zip }
      - { name: overwrite-files, value: "true" }
  - name: get-status
    waitFor: up
    waitTime: 10
    failFlag: false
"#;

    const CATALOG: &str = "schema: xml-mgmt.xsd\noperations:\n  - name: do-import\n  - name: get-status\n";

    fn write_deployment(dir: &Path) -> PathBuf {
        std::fs::write(dir.join("soma.yaml"), CATALOG).unwrap();
        let path = dir.join("deploy.yaml");
        std::fs::write(&path, DEPLOYMENT).unwrap();
        path
    }

    #[test]
    fn test_parse_operation_defaults() {
        let d = Deployment::from_yaml("operations:\n  - name: SaveConfig\n").unwrap();
        let op = &d.operations[0];
        assert_eq!(op.wait_time, DEFAULT_WAIT_SECONDS);
        assert_eq!(op.poll_interval, DEFAULT_POLL_INTERVAL_MILLIS);
        assert!(op.fail_flag);
        assert!(!op.mem_safe);
        assert!(d.session.fail_on_error);
    }

    #[test]
    fn test_load_builds_session_and_chain() {
        let dir = tempfile::tempdir().unwrap();
        let deployment = Deployment::load(&write_deployment(dir.path())).unwrap();

        let session = deployment
            .session_builder()
            .unwrap()
            .transport(Arc::new(MockTransport::fixed("<ok/>")))
            .build()
            .unwrap();
        let chain = deployment.build_chain(&session).unwrap();

        assert_eq!(chain.len(), 3);
        assert_eq!(chain.operations()[0].name(), SAVE_CHECKPOINT);
        assert_eq!(chain.default_domain(), Some("dev"));

        let import = &chain.operations()[1];
        assert!(import.mem_safe);
        assert_eq!(import.option_value("overwrite-files"), Some("true"));
        assert_eq!(import.options()[0].name(), "input-file");

        let status = &chain.operations()[2];
        assert!(status.is_polling());
        assert_eq!(status.poll.wait_time_seconds, 10);
        assert!(!status.fail_flag);
    }

    #[test]
    fn test_properties_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("target.properties"), "hostName=dp9\nport=5551\n").unwrap();
        let path = dir.path().join("deploy.yaml");
        std::fs::write(
            &path,
            "properties: target.properties\noperations:\n  - name: SaveConfig\n",
        )
        .unwrap();

        let mut d = Deployment::load(&path).unwrap();
        assert_eq!(d.session.host_name.as_deref(), Some("dp9"));
        assert_eq!(d.session.port, 5551);

        d.apply_overrides(&[("failOnError".into(), "false".into())]).unwrap();
        assert!(!d.session.fail_on_error);
    }

    #[test]
    fn test_no_catalogs_is_config_error() {
        let d = Deployment::from_yaml("operations:\n  - name: SaveConfig\n").unwrap();
        assert!(matches!(d.schema_set(), Err(ChainError::InvalidConfig(_))));
    }

    #[test]
    fn test_option_needs_value_or_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("soma.yaml"), CATALOG).unwrap();
        let path = dir.path().join("deploy.yaml");
        std::fs::write(
            &path,
            "session: {hostName: dp1, userName: a, userPassword: b}\ncatalogs: [soma.yaml]\noperations:\n  - name: do-import\n    options:\n      - { name: input-file }\n",
        )
        .unwrap();
        let d = Deployment::load(&path).unwrap();
        let session = d
            .session_builder()
            .unwrap()
            .transport(Arc::new(MockTransport::fixed("<ok/>")))
            .build()
            .unwrap();
        assert!(matches!(d.build_chain(&session), Err(ChainError::InvalidConfig(_))));
    }
}
