use itertools::Itertools;
use serde_json::Value;

use crate::error::ApiError;
use crate::logic::schema_validator;
use crate::model::Schema;
use crate::store::SchemaStore;

/// Validate an instance payload against a schema definition, both as JSON text
pub fn validate_instance_data(schema_definition: &str, data: &str) -> Result<(), ApiError> {
    let definition: Value = serde_json::from_str(schema_definition).map_err(|e| {
        ApiError::bad_request(format!("Schema definition parsing error: {}", e))
    })?;

    let payload: Value = serde_json::from_str(data)
        .map_err(|e| ApiError::bad_request(format!("Instance data parsing error: {}", e)))?;

    let validator = schema_validator::compile(&definition)
        .map_err(|message| ApiError::bad_request(format!("Schema validation error: {}", message)))?;

    let errors = validator
        .iter_errors(&payload)
        .map(|error| {
            let path = error.instance_path.to_string();
            if path.is_empty() {
                format!("data {}", error)
            } else {
                format!("data{} {}", path, error)
            }
        })
        .join(", ");

    if !errors.is_empty() {
        return Err(ApiError::bad_request(format!("Data validation error: {}", errors)));
    }

    Ok(())
}

/// Load the schema by id and validate `data` against its definition
pub async fn validate_data_against_schema<S: SchemaStore + ?Sized>(
    store: &S,
    schema_id: &str,
    data: &str,
) -> Result<Schema, ApiError> {
    let schema = store.get_schema(&schema_id.to_string()).await?.ok_or_else(|| {
        ApiError::bad_request(format!("Schema with id {} not found for validation", schema_id))
    })?;

    validate_instance_data(&schema.schema_definition, data)?;
    Ok(schema)
}
