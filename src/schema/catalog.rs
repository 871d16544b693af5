//! In-memory schema catalog: declares operations, their attributes, child
//! elements and enumerations, and builds SOAP request documents from them.
//!
//! Catalogs are normally loaded from YAML:
//!
//! ```yaml
//! schema: xml-mgmt.xsd
//! operations:
//!   - name: do-import
//!     attributes: [source-type, overwrite-files, overwrite-objects]
//!     elements: [input-file]
//!     enums:
//!       source-type: [XML, ZIP]
//!   - name: get-status
//!     attributes: [class]
//! ```

use super::{Binding, BoundDocument, Dialect, SchemaBinder};
use crate::error::{ChainError, Result};
use crate::xml::tree::Element;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SOMA_NS: &str = "http://www.datapower.com/schemas/management";
const AMP_NS: &str = "http://www.datapower.com/schemas/appliance/management/3.0";

/// Declaration of a single operation.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CatalogOperation {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub elements: Vec<String>,
    #[serde(default)]
    pub enums: HashMap<String, Vec<String>>,
}

impl CatalogOperation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn attribute(mut self, name: impl Into<String>) -> Self {
        self.attributes.push(name.into());
        self
    }

    pub fn element(mut self, name: impl Into<String>) -> Self {
        self.elements.push(name.into());
        self
    }

    pub fn enumeration(mut self, field: impl Into<String>, values: &[&str]) -> Self {
        self.enums.insert(
            field.into(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    fn check_enum(&self, field: &str, value: &str) -> Result<()> {
        match self.enums.get(field) {
            Some(allowed) if !allowed.iter().any(|a| a == value) => Err(ChainError::generation(
                &self.name,
                format!(
                    "'{}' is not a valid value for '{}' (expected one of: {})",
                    value,
                    field,
                    allowed.join(", ")
                ),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    schema: String,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    operations: Vec<CatalogOperation>,
}

/// A [`SchemaBinder`] backed by declared operations.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    schema: String,
    binding: Binding,
    operations: HashMap<String, CatalogOperation>,
}

impl SchemaCatalog {
    /// Empty catalog whose endpoint is derived from the schema identity.
    pub fn new(schema: impl Into<String>) -> Self {
        let schema = schema.into();
        let binding = Binding::for_schema(&schema);
        Self {
            schema,
            binding,
            operations: HashMap::new(),
        }
    }

    /// Override the endpoint; the dialect follows the path.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        self.binding = Binding {
            dialect: Dialect::from_endpoint(&endpoint),
            endpoint,
        };
        self
    }

    pub fn add_operation(&mut self, operation: CatalogOperation) {
        self.operations.insert(operation.name.clone(), operation);
    }

    pub fn with_operation(mut self, operation: CatalogOperation) -> Self {
        self.add_operation(operation);
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.binding.dialect
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(text)?;
        let mut catalog = Self::new(file.schema);
        if let Some(endpoint) = file.endpoint {
            catalog = catalog.with_endpoint(endpoint);
        }
        for op in file.operations {
            catalog.add_operation(op);
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ChainError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text).map_err(|e| {
            ChainError::InvalidConfig(format!("failed to parse {}: {}", path.display(), e))
        })
    }
}

impl SchemaBinder for SchemaCatalog {
    fn name(&self) -> &str {
        &self.schema
    }

    fn supports(&self, operation: &str) -> bool {
        self.operations.contains_key(operation)
    }

    fn bind(&self, _operation: &str) -> Binding {
        self.binding.clone()
    }

    fn new_document(&self) -> Box<dyn BoundDocument> {
        Box::new(CatalogDocument {
            operations: self.operations.clone(),
            dialect: self.binding.dialect,
            target: None,
            enveloped: false,
            request_attributes: Vec::new(),
        })
    }
}

struct CatalogDocument {
    operations: HashMap<String, CatalogOperation>,
    dialect: Dialect,
    target: Option<(CatalogOperation, Element)>,
    enveloped: bool,
    request_attributes: Vec<(String, String)>,
}

impl CatalogDocument {
    fn target_mut(&mut self) -> Result<(&CatalogOperation, &mut Element)> {
        match &mut self.target {
            Some((op, el)) => Ok((&*op, el)),
            None => Err(ChainError::Xml("no target node set".into())),
        }
    }
}

fn prefixed(name: &str) -> String {
    format!("dp:{}", name)
}

impl BoundDocument for CatalogDocument {
    fn set_target_node(&mut self, operation: &str) -> Result<()> {
        let decl = self.operations.get(operation).cloned().ok_or_else(|| {
            ChainError::SchemaNotFound {
                operation: operation.to_string(),
            }
        })?;
        self.target = Some((decl, Element::new(prefixed(operation))));
        Ok(())
    }

    fn set_envelope(&mut self) -> Result<()> {
        self.enveloped = true;
        Ok(())
    }

    fn set_value(&mut self, field: &str, value: &str) -> Result<()> {
        let dialect = self.dialect;
        if dialect == Dialect::Soma && field == "domain" {
            self.request_attributes
                .retain(|(k, _)| k != "domain");
            self.request_attributes
                .push(("domain".to_string(), value.to_string()));
            return Ok(());
        }

        let (decl, target) = self.target_mut()?;

        if field == decl.name {
            target.set_text(value);
            return Ok(());
        }

        if let Some((element, attr)) = field.split_once('@') {
            decl.check_enum(field, value)?;
            if element == decl.name {
                target.set_attr(attr, value);
                return Ok(());
            }
            if decl.elements.iter().any(|e| e == element) {
                let child_name = prefixed(element);
                if target.child_mut(&child_name).is_none() {
                    target.push(Element::new(child_name.clone()));
                }
                if let Some(child) = target.child_mut(&child_name) {
                    child.set_attr(attr, value);
                }
                return Ok(());
            }
        } else if decl.attributes.iter().any(|a| a == field) {
            decl.check_enum(field, value)?;
            target.set_attr(field, value);
            return Ok(());
        } else if decl.elements.iter().any(|e| e == field) {
            decl.check_enum(field, value)?;
            let child_name = prefixed(field);
            match target.child_mut(&child_name) {
                Some(child) => child.set_text(value),
                None => {
                    let mut child = Element::new(child_name);
                    child.set_text(value);
                    target.push(child);
                }
            }
            return Ok(());
        }

        tracing::debug!(operation = %decl.name, field, "field not declared by schema, ignored");
        Ok(())
    }

    fn serialize(&self) -> Result<String> {
        let (_, target) = self
            .target
            .as_ref()
            .ok_or_else(|| ChainError::Xml("no target node set".into()))?;

        let body_content = match self.dialect {
            Dialect::Soma => {
                let mut request = Element::new("dp:request");
                request.set_attr("xmlns:dp", SOMA_NS);
                for (k, v) in &self.request_attributes {
                    request.set_attr(k.clone(), v.clone());
                }
                request.push(target.clone());
                request
            }
            Dialect::Amp => {
                let mut request = target.clone();
                request.attributes.insert(0, ("xmlns:dp".into(), AMP_NS.into()));
                request
            }
        };

        let root = if self.enveloped {
            let mut body = Element::new("env:Body");
            body.push(body_content);
            let mut envelope = Element::new("env:Envelope");
            envelope.set_attr("xmlns:env", SOAP_ENV_NS);
            envelope.push(body);
            envelope
        } else {
            body_content
        };

        Ok(format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>{}",
            root.to_xml()
        ))
    }
}
