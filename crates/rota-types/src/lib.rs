//! Rota Types
//!
//! This crate defines the value and document types shared across the rota
//! workspace (`rota-core` and `rota-runtime`). Keeping them in a leaf crate lets
//! host integrations depend on the data model without pulling in the engine.

#![deny(clippy::all)]
#![deny(missing_docs)]

mod document;
mod types;

pub use document::Document;
pub use types::FieldValue;
