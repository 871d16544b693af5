//! Firmware levels and the schema-catalog paths they select.

use super::{SchemaCatalog, SchemaSet, AMP_30_SCHEMA, SOMA_2004_SCHEMA, SOMA_SCHEMA};
use crate::error::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DEFAULT_FIRMWARE_LEVEL: u32 = 5;

/// Parse a firmware designation by prefix.
///
/// `default` selects level 0 (bundled catalogs). Unrecognised input falls
/// back to [`DEFAULT_FIRMWARE_LEVEL`].
pub fn parse_firmware_level(value: &str) -> u32 {
    let v = value.trim().to_ascii_lowercase();
    if v.starts_with("default") {
        0
    } else if v.starts_with("2018") {
        2018
    } else if v.starts_with("2004") {
        2004
    } else {
        match v.chars().next() {
            Some(c @ '3'..='8') => c.to_digit(10).unwrap_or(DEFAULT_FIRMWARE_LEVEL),
            _ => DEFAULT_FIRMWARE_LEVEL,
        }
    }
}

/// Where schema catalogs live on disk.
///
/// Catalog files are named after the schema they describe with a `.yaml`
/// suffix, e.g. `xml-mgmt.xsd.yaml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaLayout {
    root: PathBuf,
}

impl SchemaLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file(dir: &Path, schema: &str) -> PathBuf {
        dir.join(format!("{}.yaml", schema))
    }

    /// SOMA then AMP catalog paths for a firmware level. Levels 3 and above
    /// use a per-level directory; lower levels use the bundled root.
    pub fn default_paths(&self, firmware_level: u32) -> Vec<PathBuf> {
        let dir = if firmware_level >= 3 {
            self.root.join(firmware_level.to_string())
        } else {
            self.root.clone()
        };
        vec![
            Self::file(&dir, SOMA_SCHEMA),
            Self::file(&dir, AMP_30_SCHEMA),
        ]
    }

    /// Catalogs to insert at the front of the schema set for a `schema`
    /// setting, in the order they end up in the set.
    ///
    /// `2004` selects the SOMA-2004 catalog. Any other value names a
    /// directory holding SOMA and AMP catalogs.
    pub fn front_paths(&self, schema: &str) -> Vec<PathBuf> {
        if schema.trim().eq_ignore_ascii_case("2004") {
            vec![Self::file(&self.root, SOMA_2004_SCHEMA)]
        } else {
            let dir = self.root.join(schema.trim());
            vec![Self::file(&dir, SOMA_SCHEMA), Self::file(&dir, AMP_30_SCHEMA)]
        }
    }

    /// Load the catalogs for a firmware level, then the `schema` selection
    /// ahead of them.
    ///
    /// Missing default catalogs are skipped with a warning. Catalogs named by
    /// `schema` must exist.
    pub fn load(&self, firmware_level: u32, schema: Option<&str>) -> Result<SchemaSet> {
        let mut set = SchemaSet::new();
        for path in self.default_paths(firmware_level) {
            if !path.exists() {
                tracing::warn!(path = %path.display(), "schema catalog not found, skipped");
                continue;
            }
            set.push(Arc::new(SchemaCatalog::load(&path)?));
        }
        if let Some(schema) = schema.filter(|s| !s.trim().is_empty()) {
            for path in self.front_paths(schema).iter().rev() {
                set.insert_front(Arc::new(SchemaCatalog::load(path)?));
            }
        }
        tracing::debug!(firmware_level, schemas = ?set.names(), "schemas loaded");
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_firmware_level() {
        assert_eq!(parse_firmware_level("default"), 0);
        assert_eq!(parse_firmware_level("2018.4.1"), 2018);
        assert_eq!(parse_firmware_level("7.6.0"), 7);
        assert_eq!(parse_firmware_level("3"), 3);
        assert_eq!(parse_firmware_level("2004"), 2004);
        assert_eq!(parse_firmware_level("10.5"), DEFAULT_FIRMWARE_LEVEL);
        assert_eq!(parse_firmware_level("banana"), DEFAULT_FIRMWARE_LEVEL);
    }

    #[test]
    fn test_default_paths_by_level() {
        let layout = SchemaLayout::new("/opt/schemas");
        assert_eq!(
            layout.default_paths(7),
            vec![
                PathBuf::from("/opt/schemas/7/xml-mgmt.xsd.yaml"),
                PathBuf::from("/opt/schemas/7/app-mgmt-protocol-v3.xsd.yaml"),
            ]
        );
        assert_eq!(
            layout.default_paths(0)[0],
            PathBuf::from("/opt/schemas/xml-mgmt.xsd.yaml")
        );
    }

    #[test]
    fn test_front_paths() {
        let layout = SchemaLayout::new("/opt/schemas");
        assert_eq!(
            layout.front_paths("2004"),
            vec![PathBuf::from("/opt/schemas/xml-mgmt-2004.xsd.yaml")]
        );
        assert_eq!(layout.front_paths("custom").len(), 2);
    }

    fn write_catalog(dir: &Path, schema: &str, op: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            SchemaLayout::file(dir, schema),
            format!("schema: {}\noperations:\n  - name: {}\n", schema, op),
        )
        .unwrap();
    }

    #[test]
    fn test_load_orders_front_catalogs_first() {
        let root = tempfile::tempdir().unwrap();
        let level_dir = root.path().join("7");
        write_catalog(&level_dir, SOMA_SCHEMA, "do-import");
        write_catalog(&level_dir, AMP_30_SCHEMA, "GetDomainListRequest");
        write_catalog(root.path(), SOMA_2004_SCHEMA, "do-import");

        let layout = SchemaLayout::new(root.path());
        let set = layout.load(7, Some("2004")).unwrap();
        assert_eq!(
            set.names(),
            vec![SOMA_2004_SCHEMA, SOMA_SCHEMA, AMP_30_SCHEMA]
        );
        // The per-level catalog was loaded later and wins.
        assert_eq!(set.resolve("do-import").unwrap().name(), SOMA_SCHEMA);
    }

    #[test]
    fn test_load_skips_missing_defaults_but_not_selection() {
        let root = tempfile::tempdir().unwrap();
        let layout = SchemaLayout::new(root.path());
        assert!(layout.load(5, None).unwrap().is_empty());
        assert!(layout.load(5, Some("custom")).is_err());
    }
}
