//! # mgmt-chain
//!
//! Schema-driven chains of XML management operations for network
//! appliances that speak SOMA and AMP over HTTPS.
//!
//! A chain is an ordered list of [`Operation`]s. Each one is turned into a
//! request document by the schema catalog that declares it, posted to the
//! matching management endpoint, and its response is classified into a
//! [`Severity`]. The failure policy decides whether the chain carries on,
//! stops, or rolls the appliance back to a checkpoint saved at the start.
//!
//! ## Core Concepts
//!
//! - **[`Session`]**: connection settings, credentials, loaded schemas, the
//!   transport and hooks shared by every operation.
//! - **[`Operation`]**: one request with its options, poll condition and
//!   failure flags.
//! - **[`OperationChain`]**: the ordered operations plus the checkpoint and
//!   [`FailPolicy`].
//! - **[`ChainExecutor`]**: generates, posts, polls and judges each
//!   operation, producing a [`RunReport`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use mgmt_chain::{ChainExecutor, Operation, Result, Session, SessionConfig};
//! use mgmt_chain::schema::{CatalogOperation, SchemaCatalog};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SessionConfig {
//!         host_name: Some("dp1.example.com".into()),
//!         user_name: Some("admin".into()),
//!         user_password: Some("secret".into()),
//!         domain: Some("dev".into()),
//!         ..Default::default()
//!     };
//!     let soma = SchemaCatalog::new("xml-mgmt.xsd")
//!         .with_operation(CatalogOperation::new("SaveConfig"));
//!     let session = Session::builder(config).schema(Arc::new(soma)).build()?;
//!
//!     let mut chain = session.new_chain();
//!     chain.add(Operation::new("SaveConfig"));
//!
//!     let report = ChainExecutor::new(&session).execute(&mut chain).await?;
//!     println!("{}", report.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod chain;
pub mod checkpoint;
pub mod classify;
pub mod config;
pub mod credentials;
pub mod custom;
pub mod deployment;
pub mod error;
pub mod events;
pub mod executor;
pub mod generator;
pub mod operation;
pub mod option;
pub mod policy;
pub mod poll;
pub mod report;
pub mod schema;
pub mod session;
pub mod severity;
pub mod xml;

pub use backend::{BackoffConfig, HttpsTransport, MockTransport, Transport};
pub use chain::{FailPolicy, OperationChain};
pub use checkpoint::Checkpoint;
pub use classify::{Classification, ResponseClassifier, XmlResponseClassifier};
pub use config::{OutputType, SessionConfig, Verbosity};
pub use credentials::Credentials;
pub use custom::{CustomOperation, HookRegistry};
pub use deployment::Deployment;
pub use error::{ChainError, Result};
pub use events::{Event, EventHandler};
pub use executor::{ChainExecutor, StepContext};
pub use operation::Operation;
pub use report::{OperationRecord, Outcome, RunReport};
pub use severity::Severity;
pub use session::{Session, SessionBuilder};
