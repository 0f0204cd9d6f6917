//! The action catalog for Sibyl.
//!
//! Every request the system can serve is a row in a versioned TOML catalog:
//! its recognized tokens, the ordered inputs it needs, the handler key it
//! dispatches to and its implementation status. Adding a service is a catalog
//! registration, never new branching code. The catalog is loaded once at
//! startup and immutable afterwards.

pub mod registry;
pub mod types;
pub mod validate;

pub use registry::{normalize_token, ActionCatalog, CatalogIssue};
pub use types::{ActionDefinition, FieldSpec, FieldValidator, ImplementationStatus};
pub use validate::FieldValue;
