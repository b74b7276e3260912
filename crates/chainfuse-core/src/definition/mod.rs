//! Chain definitions.
//!
//! A definition names a chain and binds its context, so a whole run can be
//! described in a YAML or JSON document and validated before any model is
//! called.

mod parser;

pub use parser::{ChainDefinition, DefinitionError};
