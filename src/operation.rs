//! A single management operation and its per-operation settings.

use crate::config::OutputType;
use crate::custom::{CustomOperation, HookRegistry};
use crate::option::{find_last, OpOption};
use crate::schema::{
    Binding, Dialect, AMP_30_ENDPOINT, SOMA_2004_ENDPOINT, SOMA_CURRENT_ENDPOINT,
};
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

pub const SAVE_CHECKPOINT: &str = "SaveCheckpoint";
pub const ROLLBACK_CHECKPOINT: &str = "RollbackCheckpoint";
pub const REMOVE_CHECKPOINT: &str = "RemoveCheckpoint";
pub const CHECKPOINT_NAME_OPTION: &str = "ChkName";

pub const GET_STATUS: &str = "get-status";
pub const GET_FILE: &str = "get-file";
pub const SET_FILE: &str = "set-file";
pub const DO_IMPORT: &str = "do-import";
pub const DO_EXPORT: &str = "do-export";

pub const DOMAIN_OPTION: &str = "domain";
pub const AMP_DOMAIN_OPTION: &str = "Domain";
pub const CLASS_OPTION: &str = "class";
pub const NAME_OPTION: &str = "name";
pub const INPUT_FILE_OPTION: &str = "input-file";
pub const OBJECT_STATUS_CLASS: &str = "ObjectStatus";

/// Status lines filtered out of an unqualified `get-status`; objects in the
/// expected state are not reported.
pub const EXPECTED_STATUS: &str = "OpState=up AdminState=enabled";

pub const DEFAULT_WAIT_SECONDS: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_MILLIS: u64 = 2000;

/// Native protocol operation, or a composite delegated to a hook.
#[derive(Clone)]
pub enum OperationKind {
    Native,
    Composite(Arc<dyn CustomOperation>),
}

impl std::fmt::Debug for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Native => f.write_str("Native"),
            OperationKind::Composite(hook) => write!(f, "Composite({})", hook.name()),
        }
    }
}

/// Wait condition for a polling operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSpec {
    pub wait_for: Option<String>,
    pub wait_for_xpath: Option<String>,
    pub wait_time_seconds: u64,
    pub poll_interval_millis: u64,
}

impl Default for PollSpec {
    fn default() -> Self {
        Self {
            wait_for: None,
            wait_for_xpath: None,
            wait_time_seconds: DEFAULT_WAIT_SECONDS,
            poll_interval_millis: DEFAULT_POLL_INTERVAL_MILLIS,
        }
    }
}

impl PollSpec {
    pub fn is_polling(&self) -> bool {
        self.wait_for.is_some() || self.wait_for_xpath.is_some()
    }
}

/// One named unit of work in an [`OperationChain`](crate::chain::OperationChain).
#[derive(Debug, Clone)]
pub struct Operation {
    name: String,
    invoked_name: String,
    kind: OperationKind,
    options: Vec<OpOption>,

    pub(crate) domain: Option<String>,
    binding: Option<Binding>,

    pub payload: Option<String>,
    pub response: Option<String>,

    pub fail_flag: bool,
    pub fail_state: Option<String>,
    pub suppress_response: bool,
    pub mem_safe: bool,
    pub poll: PollSpec,

    pub filter: Option<String>,
    pub filter_out: Option<String>,
    pub dest_file: Option<PathBuf>,
    pub src_file: Option<PathBuf>,
    pub src_dir: Option<PathBuf>,
    pub dest_dir: Option<PathBuf>,
    pub overwrite: bool,
}

impl Operation {
    /// A native operation.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            invoked_name: name.clone(),
            name,
            kind: OperationKind::Native,
            options: Vec::new(),
            domain: None,
            binding: None,
            payload: None,
            response: None,
            fail_flag: true,
            fail_state: None,
            suppress_response: false,
            mem_safe: false,
            poll: PollSpec::default(),
            filter: None,
            filter_out: None,
            dest_file: None,
            src_file: None,
            src_dir: None,
            dest_dir: None,
            overwrite: false,
        }
    }

    /// Resolve `name` against registered composite hooks. A composite is
    /// renamed to its underlying protocol operation.
    pub fn resolve(name: impl Into<String>, hooks: &HookRegistry) -> Self {
        let name = name.into();
        match hooks.get(&name) {
            Some(hook) => {
                let mut op = Self::new(hook.base_name());
                op.invoked_name = name;
                op.kind = OperationKind::Composite(hook);
                op
            }
            None => Self::new(name),
        }
    }

    /// Protocol operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name the caller asked for; differs from [`name`](Self::name) for composites.
    pub fn invoked_name(&self) -> &str {
        &self.invoked_name
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn options(&self) -> &[OpOption] {
        &self.options
    }

    /// Resolved domain, set by a `domain` option or during generation.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.endpoint.as_str())
    }

    pub fn dialect(&self) -> Option<Dialect> {
        self.binding.as_ref().map(|b| b.dialect)
    }

    pub fn is_amp(&self) -> bool {
        self.dialect() == Some(Dialect::Amp)
    }

    pub fn is_polling(&self) -> bool {
        self.poll.is_polling()
    }

    pub fn is_checkpoint_op(&self) -> bool {
        self.name == SAVE_CHECKPOINT || self.name == ROLLBACK_CHECKPOINT
    }

    /// Append an option. Functional option names (`endPoint`, `filter`,
    /// `filterOut`, `failState`, `srcFile`, `destFile`, `srcDir`, `destDir`,
    /// `overwrite`) configure the operation instead of the document.
    pub fn add_option(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if !self.apply_functional(&name, &value) {
            if name == DOMAIN_OPTION {
                self.domain = Some(value.clone());
            }
            self.options.push(OpOption::new(name, value));
        }
    }

    /// Append an option whose value is read from `path` at generation time.
    pub fn add_file_option(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        let path = path.into();
        self.src_file = Some(path.clone());
        self.options.push(OpOption::from_file(name, path));
    }

    /// Builder form of [`add_option`](Self::add_option).
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_option(name, value);
        self
    }

    /// Set the domain, appending a `domain` option when it changes.
    pub fn set_domain(&mut self, domain: impl Into<String>) {
        let domain = domain.into();
        if self.domain.as_deref() != Some(domain.as_str()) {
            self.add_option(DOMAIN_OPTION, domain);
        }
    }

    /// Most recently appended value for `name`.
    pub fn option_value(&self, name: &str) -> Option<&str> {
        find_last(&self.options, name).and_then(|o| o.value())
    }

    pub fn has_option(&self, name: &str) -> bool {
        find_last(&self.options, name).is_some()
    }

    /// Endpoint override. Accepts `current`/`soma`, `2004`, `amp` or a path.
    pub fn set_endpoint(&mut self, endpoint: &str) {
        let trimmed = endpoint.trim();
        let binding = match trimmed.to_ascii_lowercase().as_str() {
            "2004" => Binding {
                dialect: Dialect::Soma,
                endpoint: SOMA_2004_ENDPOINT.to_string(),
            },
            "current" | "soma" => Binding {
                dialect: Dialect::Soma,
                endpoint: SOMA_CURRENT_ENDPOINT.to_string(),
            },
            "amp" => Binding {
                dialect: Dialect::Amp,
                endpoint: AMP_30_ENDPOINT.to_string(),
            },
            _ => Binding {
                dialect: Dialect::from_endpoint(trimmed),
                endpoint: trimmed.to_string(),
            },
        };
        self.binding = Some(binding);
    }

    /// Bind endpoint and dialect from a schema, unless already bound.
    pub fn bind(&mut self, binding: Binding) {
        if self.binding.is_none() {
            self.binding = Some(binding);
        }
    }

    pub fn add_filter(&mut self, pattern: &str) {
        append_pattern(&mut self.filter, pattern);
    }

    pub fn add_filter_out(&mut self, pattern: &str) {
        append_pattern(&mut self.filter_out, pattern);
    }

    /// Add a filter-out pattern unless it is already present.
    pub(crate) fn ensure_filter_out(&mut self, pattern: &str) {
        let present = self
            .filter_out
            .as_deref()
            .is_some_and(|f| f.split('|').any(|p| p == pattern));
        if !present {
            self.add_filter_out(pattern);
        }
    }

    fn apply_functional(&mut self, name: &str, value: &str) -> bool {
        match name.to_ascii_lowercase().as_str() {
            "endpoint" => self.set_endpoint(value),
            "filter" => self.add_filter(value),
            "filterout" => self.add_filter_out(value),
            "failstate" => self.fail_state = Some(value.to_string()),
            "srcdir" => self.src_dir = Some(PathBuf::from(value)),
            "destdir" => self.dest_dir = Some(PathBuf::from(value)),
            "overwrite" => self.overwrite = value.trim().eq_ignore_ascii_case("true"),
            "destfile" => {
                if self.name == SET_FILE {
                    self.options
                        .push(OpOption::new(format!("{}@{}", SET_FILE, NAME_OPTION), value));
                } else {
                    self.dest_file = Some(PathBuf::from(value));
                }
            }
            "srcfile" => {
                if self.name == GET_FILE {
                    self.src_file = Some(PathBuf::from(value));
                    self.options
                        .push(OpOption::new(format!("{}@{}", GET_FILE, NAME_OPTION), value));
                } else if self.name == DO_IMPORT {
                    self.add_file_option(INPUT_FILE_OPTION, value);
                } else {
                    let name = self.name.clone();
                    self.add_file_option(name, value);
                }
            }
            _ => return false,
        }
        true
    }

    /// Post-process a success or failure text before it is reported.
    pub fn intercept_result(&self, text: String, success: bool, output: OutputType) -> String {
        let text = match &self.kind {
            OperationKind::Composite(hook) => hook.intercept_result(&text, success),
            OperationKind::Native => text,
        };
        if self.name.eq_ignore_ascii_case(DO_IMPORT) && success && output == OutputType::Parsed {
            strip_import_object_tokens(&text)
        } else {
            text
        }
    }
}

fn append_pattern(slot: &mut Option<String>, pattern: &str) {
    match slot {
        Some(existing) => {
            existing.push('|');
            existing.push_str(pattern);
        }
        None => *slot = Some(pattern.to_string()),
    }
}

/// Drop per-object `name=` and `class=` tokens from an import summary; the
/// result applies to every imported object.
fn strip_import_object_tokens(text: &str) -> String {
    static TOKENS: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(\s)(?:name|class)=\S+(\s)").expect("import token pattern is valid")
    });
    // Adjacent tokens share whitespace, so apply until stable.
    let mut current = text.to_string();
    loop {
        let next = TOKENS.replace_all(&current, "$1").into_owned();
        if next == current {
            return current;
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let op = Operation::new("do-import");
        assert!(op.fail_flag);
        assert!(!op.mem_safe);
        assert_eq!(op.poll.wait_time_seconds, 30);
        assert_eq!(op.poll.poll_interval_millis, 2000);
        assert!(op.payload.is_none());
        assert!(op.endpoint().is_none());
    }

    #[test]
    fn test_option_lookup_last_write_wins() {
        let op = Operation::new("set-file")
            .with_option("overwrite-files", "false")
            .with_option("overwrite-files", "true");
        assert_eq!(op.option_value("overwrite-files"), Some("true"));
        assert_eq!(op.options().len(), 2);
    }

    #[test]
    fn test_functional_options_configure_operation() {
        let op = Operation::new("get-status")
            .with_option("filterOut", "OpState=up")
            .with_option("filterOut", "AdminState=disabled")
            .with_option("failState", "down")
            .with_option("endPoint", "amp");
        assert_eq!(op.filter_out.as_deref(), Some("OpState=up|AdminState=disabled"));
        assert_eq!(op.fail_state.as_deref(), Some("down"));
        assert_eq!(op.endpoint(), Some(AMP_30_ENDPOINT));
        assert!(op.is_amp());
        assert!(op.options().is_empty());
    }

    #[test]
    fn test_literal_endpoint_path_sets_dialect() {
        let mut op = Operation::new("x");
        op.set_endpoint("/service/mgmt/amp/1.0");
        assert!(op.is_amp());
        op.set_endpoint("2004");
        assert_eq!(op.endpoint(), Some(SOMA_2004_ENDPOINT));
        assert!(!op.is_amp());
    }

    #[test]
    fn test_bind_only_once() {
        let mut op = Operation::new("do-import");
        op.bind(Binding::for_schema("xml-mgmt.xsd"));
        op.bind(Binding::for_schema("app-mgmt-protocol-v3.xsd"));
        assert_eq!(op.endpoint(), Some(SOMA_CURRENT_ENDPOINT));
    }

    #[test]
    fn test_src_and_dest_file_routing() {
        let get = Operation::new(GET_FILE).with_option("srcFile", "local:///a.xml");
        assert_eq!(get.option_value("get-file@name"), Some("local:///a.xml"));

        let set = Operation::new(SET_FILE)
            .with_option("destFile", "local:///b.xml")
            .with_option("srcFile", "/tmp/b.xml");
        assert_eq!(set.option_value("set-file@name"), Some("local:///b.xml"));
        let file_opt = set.options().last().unwrap();
        assert_eq!(file_opt.name(), SET_FILE);
        assert!(file_opt.source_file().is_some());

        let import = Operation::new(DO_IMPORT).with_option("srcFile", "/tmp/export.zip");
        assert_eq!(import.options()[0].name(), INPUT_FILE_OPTION);

        let export = Operation::new(DO_EXPORT).with_option("destFile", "/tmp/out.xml");
        assert_eq!(export.dest_file, Some(PathBuf::from("/tmp/out.xml")));
    }

    #[test]
    fn test_set_domain_appends_only_on_change() {
        let mut op = Operation::new("do-import");
        op.set_domain("dev");
        op.set_domain("dev");
        op.set_domain("test");
        assert_eq!(op.options().len(), 2);
        assert_eq!(op.domain(), Some("test"));
    }

    #[test]
    fn test_import_summary_intercept() {
        let op = Operation::new(DO_IMPORT);
        let text = "import: class=XMLFirewallService name=fw-a status=success ".to_string();
        assert_eq!(
            op.intercept_result(text.clone(), true, OutputType::Parsed),
            "import: status=success "
        );
        assert_eq!(op.intercept_result(text.clone(), false, OutputType::Parsed), text);
        assert_eq!(op.intercept_result(text.clone(), true, OutputType::Xml), text);
    }

    #[test]
    fn test_strip_adjacent_import_tokens() {
        assert_eq!(
            strip_import_object_tokens("a class=X name=y class=Z status=ok "),
            "a status=ok "
        );
        assert_eq!(strip_import_object_tokens("no tokens here"), "no tokens here");
    }

    #[test]
    fn test_ensure_filter_out_is_idempotent() {
        let mut op = Operation::new(GET_STATUS);
        op.ensure_filter_out(EXPECTED_STATUS);
        op.ensure_filter_out(EXPECTED_STATUS);
        assert_eq!(op.filter_out.as_deref(), Some(EXPECTED_STATUS));
    }
}
