use serde_json::Value;

use crate::error::ApiError;

/// Compile a parsed JSON Schema, returning the engine's message on failure
pub fn compile(definition: &Value) -> Result<jsonschema::Validator, String> {
    jsonschema::validator_for(definition).map_err(|e| e.to_string())
}

/// Check that a schema definition is JSON and a loadable JSON Schema.
/// Returns the parsed definition.
pub fn validate_schema_definition(definition: &str) -> Result<Value, ApiError> {
    let parsed: Value = serde_json::from_str(definition)
        .map_err(|e| ApiError::bad_request(format!("Schema validation error: {}", e)))?;

    compile(&parsed)
        .map_err(|message| ApiError::bad_request(format!("Schema validation error: {}", message)))?;

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_valid_schema() {
        let definition = r#"{
            "type": "object",
            "properties": {"title": {"type": "string"}},
            "required": ["title"]
        }"#;
        let parsed = validate_schema_definition(definition).unwrap();
        assert_eq!(parsed["type"], "object");
    }

    #[test]
    fn test_rejects_malformed_json() {
        let err = validate_schema_definition("{\"type\": ").unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert!(err.to_string().starts_with("Schema validation error:"));
    }

    #[test]
    fn test_rejects_structurally_invalid_schema() {
        let err = validate_schema_definition(r#"{"type": "not-a-type"}"#).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err = validate_schema_definition(r#"{"required": "title"}"#).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
