//! Named option values attached to an [`Operation`](crate::operation::Operation).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::path::{Path, PathBuf};

/// A single named value, either literal or sourced from a local file.
///
/// File-sourced options are read and base64-encoded lazily by
/// [`resolve`](Self::resolve), at generation time. A missing file is only
/// discovered when the owning operation is generated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpOption {
    name: String,
    value: Option<String>,
    source_file: Option<PathBuf>,
}

impl OpOption {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            source_file: None,
        }
    }

    /// An option whose value is the base64 encoding of `path`'s contents.
    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            value: None,
            source_file: Some(path.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The literal value. `None` for file-sourced options.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }

    /// Produce the value to push into a document.
    pub fn resolve(&self) -> std::io::Result<String> {
        match &self.source_file {
            Some(path) => {
                let bytes = std::fs::read(path)?;
                Ok(STANDARD.encode(bytes))
            }
            None => Ok(self.value.clone().unwrap_or_default()),
        }
    }
}

/// Most recently appended option named `name`, if any.
pub fn find_last<'a>(options: &'a [OpOption], name: &str) -> Option<&'a OpOption> {
    options.iter().rev().find(|o| o.name == name)
}
