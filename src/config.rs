//! Session-wide settings.
//!
//! [`SessionConfig`] can be deserialized from a deployment file, filled from
//! `key=value` properties text, or adjusted one option at a time with
//! [`SessionConfig::set_global_option`] using the option names of the
//! command-line tool (`hostName`, `failOnError`, ...).

use crate::error::{ChainError, Result};
use crate::schema::firmware::{parse_firmware_level, DEFAULT_FIRMWARE_LEVEL};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 5550;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Excerpt length for option values and payloads at normal verbosity.
pub const EXCERPT_LEN: usize = 200;
/// Excerpt length for full response dumps at normal verbosity.
pub const DUMP_LEN: usize = 2000;

/// How classified responses are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputType {
    /// One line per reported object, `Object key=value ...`.
    #[default]
    Parsed,
    /// The raw response document.
    Xml,
    /// One `name=value` line per leaf value.
    Lines,
}

impl FromStr for OutputType {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PARSED" => Ok(OutputType::Parsed),
            "XML" => Ok(OutputType::Xml),
            "LINES" => Ok(OutputType::Lines),
            other => Err(ChainError::InvalidConfig(format!(
                "unknown outputType '{}' (expected PARSED, XML or LINES)",
                other
            ))),
        }
    }
}

/// Per-session log verbosity. Controls excerpt truncation and whether
/// warnings for classified responses are logged in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    #[default]
    Normal,
    Verbose,
    Debug,
}

impl Verbosity {
    pub fn is_debug(self) -> bool {
        self == Verbosity::Debug
    }

    /// Short excerpt of an option value or payload.
    pub fn excerpt(self, s: &str) -> Cow<'_, str> {
        self.limit(s, EXCERPT_LEN)
    }

    /// Longer excerpt for full response dumps.
    pub fn dump(self, s: &str) -> Cow<'_, str> {
        self.limit(s, DUMP_LEN)
    }

    fn limit(self, s: &str, max_len: usize) -> Cow<'_, str> {
        if self >= Verbosity::Verbose {
            Cow::Borrowed(s)
        } else {
            truncate(s, max_len)
        }
    }
}

/// Truncate to at most `max_len` bytes on a char boundary, appending "...".
pub fn truncate(s: &str, max_len: usize) -> Cow<'_, str> {
    if s.len() <= max_len {
        return Cow::Borrowed(s);
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    Cow::Owned(format!("{}... * truncated *", &s[..end]))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub host_name: Option<String>,
    pub port: u16,
    pub user_name: Option<String>,
    #[serde(skip_serializing)]
    pub user_password: Option<String>,
    /// Default domain for operations that do not set one.
    pub domain: Option<String>,
    pub fail_on_error: bool,
    pub rollback_on_error: bool,
    pub output_type: OutputType,
    pub firmware_level: u32,
    /// Extra schema selection: `2004` or a catalog directory name.
    pub schema: Option<String>,
    pub schema_dir: Option<PathBuf>,
    pub netrc: Option<PathBuf>,
    pub verbose: bool,
    pub debug: bool,
    /// Route classified response text through the log instead of stdout.
    pub log_output: bool,
    pub request_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host_name: None,
            port: DEFAULT_PORT,
            user_name: None,
            user_password: None,
            domain: None,
            fail_on_error: true,
            rollback_on_error: false,
            output_type: OutputType::Parsed,
            firmware_level: DEFAULT_FIRMWARE_LEVEL,
            schema: None,
            schema_dir: None,
            netrc: None,
            verbose: false,
            debug: false,
            log_output: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(ChainError::InvalidConfig(format!(
            "'{}' expects true or false, got '{}'",
            name, other
        ))),
    }
}

impl SessionConfig {
    pub fn verbosity(&self) -> Verbosity {
        if self.debug {
            Verbosity::Debug
        } else if self.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    /// Apply a single global option by its case-insensitive name.
    pub fn set_global_option(&mut self, name: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "hostname" | "host" => self.host_name = Some(value.to_string()),
            "port" => {
                self.port = value.parse().map_err(|_| {
                    ChainError::InvalidConfig(format!("invalid port '{}'", value))
                })?
            }
            "username" => self.user_name = Some(value.to_string()),
            "userpassword" | "password" => self.user_password = Some(value.to_string()),
            "domain" => self.domain = Some(value.to_string()),
            "failonerror" => self.fail_on_error = parse_bool(name, value)?,
            "rollbackonerror" => self.rollback_on_error = parse_bool(name, value)?,
            "outputtype" => self.output_type = value.parse()?,
            "firmware" | "firmwarelevel" => self.firmware_level = parse_firmware_level(value),
            "schema" => self.schema = Some(value.to_string()),
            "schemadir" => self.schema_dir = Some(PathBuf::from(value)),
            "netrc" => self.netrc = Some(PathBuf::from(value)),
            "verbose" => self.verbose = parse_bool(name, value)?,
            "debug" => self.debug = parse_bool(name, value)?,
            "logoutput" => self.log_output = parse_bool(name, value)?,
            "timeout" | "requesttimeout" => {
                self.request_timeout_secs = value.parse().map_err(|_| {
                    ChainError::InvalidConfig(format!("invalid timeout '{}'", value))
                })?
            }
            other => {
                return Err(ChainError::InvalidConfig(format!(
                    "unknown global option '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Apply `key=value` lines. Blank lines and `#`/`!` comments are skipped.
    pub fn apply_properties(&mut self, text: &str) -> Result<()> {
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .or_else(|| line.split_once(':'))
                .ok_or_else(|| {
                    ChainError::InvalidConfig(format!(
                        "line {}: expected key=value, got '{}'",
                        lineno + 1,
                        line
                    ))
                })?;
            self.set_global_option(key, value)?;
        }
        Ok(())
    }
}
