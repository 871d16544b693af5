//! Minimal XML tree and path queries used by the generator, classifier and poll engine.

pub mod query;
pub mod tree;

pub use query::{Query, QueryError};
pub use tree::{parse, Element, Node};
