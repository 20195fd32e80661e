//! Structured content extraction for LLM responses.
//!
//! This crate turns free-form model text into validated payloads:
//!
//! - [`StructuredContent`] - Tag-peeling extractor with per-stage tolerance
//! - [`ParsingError`] - Extraction and validation failures with the offending content
//! - [`validate_json`] - Schema validation and deserialization into a caller type
//! - [`feedback`] - Messages explaining a rejected answer to the model

pub mod content;
pub mod error;
pub mod feedback;
pub mod schema;

pub use content::StructuredContent;
pub use error::{ParsingError, ParsingErrorKind};
pub use schema::{collect_validation_errors, schema_for_type, validate_json};

/// Common types for extraction call sites.
pub mod prelude {
    pub use crate::content::StructuredContent;
    pub use crate::error::{ParsingError, ParsingErrorKind};
    pub use crate::schema::validate_json;
}
