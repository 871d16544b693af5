//! Schema bindings: which dialect declares an operation, where it is posted,
//! and how its request document is built.
//!
//! ```text
//! SchemaSet ──► resolve(op) ──► last SchemaBinder that supports(op)
//!                                   │
//!                      bind(op) ────┴──── new_document()
//!                  (Dialect, endpoint)        BoundDocument
//!                                             set_target_node / set_envelope
//!                                             set_value / serialize
//! ```

pub mod catalog;
pub mod firmware;

pub use catalog::{CatalogOperation, SchemaCatalog};
pub use firmware::{parse_firmware_level, SchemaLayout};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const SOMA_CURRENT_ENDPOINT: &str = "/service/mgmt/current";
pub const SOMA_2004_ENDPOINT: &str = "/service/mgmt/2004";
pub const AMP_30_ENDPOINT: &str = "/service/mgmt/amp/3.0";
pub const AMP_10_ENDPOINT: &str = "/service/mgmt/amp/1.0";

pub const SOMA_SCHEMA: &str = "xml-mgmt.xsd";
pub const SOMA_2004_SCHEMA: &str = "xml-mgmt-2004.xsd";
pub const AMP_30_SCHEMA: &str = "app-mgmt-protocol-v3.xsd";
pub const AMP_10_SCHEMA: &str = "app-mgmt-protocol.xsd";

/// Management protocol variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Request/response SOMA dialect, `dp:request` envelope.
    Soma,
    /// Appliance management protocol, one `*Request` element per operation.
    Amp,
}

impl Dialect {
    /// Dialect implied by an endpoint path.
    pub fn from_endpoint(endpoint: &str) -> Self {
        if endpoint.contains("mgmt/amp") {
            Dialect::Amp
        } else {
            Dialect::Soma
        }
    }
}

/// Result of binding an operation to a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub dialect: Dialect,
    pub endpoint: String,
}

impl Binding {
    /// Endpoint and dialect for a schema identity (usually a file name).
    ///
    /// Unrecognised identities fall back to the current SOMA endpoint.
    pub fn for_schema(schema: &str) -> Self {
        let endpoint = if schema.contains(SOMA_SCHEMA) {
            SOMA_CURRENT_ENDPOINT
        } else if schema.contains(SOMA_2004_SCHEMA) {
            SOMA_2004_ENDPOINT
        } else if schema.contains(AMP_30_SCHEMA) {
            AMP_30_ENDPOINT
        } else if schema.contains(AMP_10_SCHEMA) {
            AMP_10_ENDPOINT
        } else {
            SOMA_CURRENT_ENDPOINT
        };
        Self {
            dialect: Dialect::from_endpoint(endpoint),
            endpoint: endpoint.to_string(),
        }
    }
}

/// A loaded schema that can declare operations and build their documents.
pub trait SchemaBinder: Send + Sync {
    /// Schema identity used in logs and endpoint resolution.
    fn name(&self) -> &str;

    /// Whether this schema declares `operation`.
    fn supports(&self, operation: &str) -> bool;

    /// Dialect and endpoint path for `operation`.
    fn bind(&self, operation: &str) -> Binding;

    /// Start an empty request document.
    fn new_document(&self) -> Box<dyn BoundDocument>;
}

/// A request document under construction.
pub trait BoundDocument: Send {
    fn set_target_node(&mut self, operation: &str) -> Result<()>;

    /// Wrap the request in a SOAP envelope on serialization.
    fn set_envelope(&mut self) -> Result<()>;

    /// Set an attribute or element value. Fields the schema does not declare
    /// are ignored; values outside a declared enumeration are rejected.
    fn set_value(&mut self, field: &str, value: &str) -> Result<()>;

    fn serialize(&self) -> Result<String>;
}

/// Ordered collection of loaded schemas.
///
/// When several schemas declare the same operation, the one loaded last wins.
#[derive(Clone, Default)]
pub struct SchemaSet {
    binders: Vec<Arc<dyn SchemaBinder>>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, binder: Arc<dyn SchemaBinder>) {
        self.binders.push(binder);
    }

    /// Load a schema ahead of every other, giving it the lowest precedence.
    pub fn insert_front(&mut self, binder: Arc<dyn SchemaBinder>) {
        self.binders.insert(0, binder);
    }

    pub fn clear(&mut self) {
        self.binders.clear();
    }

    pub fn len(&self) -> usize {
        self.binders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.binders.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.binders.iter().map(|b| b.name()).collect()
    }

    /// The last loaded schema that declares `operation`.
    pub fn resolve(&self, operation: &str) -> Option<&Arc<dyn SchemaBinder>> {
        self.binders.iter().rev().find(|b| b.supports(operation))
    }
}

impl std::fmt::Debug for SchemaSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
