//! Validation of extracted JSON text against a caller-supplied schema type.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::ParsingError;

/// Returns the JSON schema generated for `T`.
#[must_use]
pub fn schema_for_type<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_else(|_| json!({}))
}

/// Collect all validation errors from jsonschema validation.
///
/// Every error is prefixed with its instance path. Uses `iter_errors()` so all
/// failures are reported, not just the first one.
#[must_use]
pub fn collect_validation_errors(schema: &Value, instance: &Value) -> Vec<String> {
    match jsonschema::Validator::new(schema) {
        Ok(validator) => validator
            .iter_errors(instance)
            .map(|error| format!("At path '{}': {}", error.instance_path, error))
            .collect(),
        Err(e) => vec![format!("Schema compilation error: {e}")],
    }
}

/// Parses `content` as JSON, validates it against `T`'s schema and deserializes it.
///
/// # Errors
///
/// Returns a [`ParsingError`] carrying `content` when it is not JSON, violates
/// the schema, or cannot be deserialized into `T`.
pub fn validate_json<T>(content: &str) -> Result<T, ParsingError>
where
    T: DeserializeOwned + JsonSchema,
{
    let value: Value = serde_json::from_str(content).map_err(|e| {
        tracing::error!(
            target_type = std::any::type_name::<T>(),
            "LLM response is not valid JSON: {content}"
        );
        ParsingError::invalid_json(content, &e)
    })?;

    let schema = schema_for_type::<T>();
    let errors = collect_validation_errors(&schema, &value);
    if !errors.is_empty() {
        tracing::error!(
            target_type = std::any::type_name::<T>(),
            error_count = errors.len(),
            "Error parsing LLM response for content: \n{content}"
        );
        return Err(ParsingError::validation(content, errors));
    }

    serde_json::from_value(value).map_err(|e| ParsingError::deserialize(content, &e))
}
