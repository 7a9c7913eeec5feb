//! JSON Schema validation of tool call arguments (spec §4.2 step 2).

use serde_json::Value;

use crate::error::OrchestratorError;

/// Validates `arguments` against `schema`, returning `invalid_arguments`
/// (§7 taxonomy) on the first few mismatches.
pub fn validate_arguments(tool_name: &str, schema: &Value, arguments: &Value) -> Result<(), OrchestratorError> {
    if !schema.is_object() {
        return Ok(());
    }
    let compiled = jsonschema::validator_for(schema).map_err(|e| OrchestratorError::InvalidArguments {
        tool_name: tool_name.to_string(),
        reason: format!("tool schema does not compile: {e}"),
    })?;

    if compiled.is_valid(arguments) {
        return Ok(());
    }

    let reason = compiled
        .iter_errors(arguments)
        .take(3)
        .map(|e| format!("{e} at {}", e.instance_path))
        .collect::<Vec<_>>()
        .join("; ");
    Err(OrchestratorError::InvalidArguments { tool_name: tool_name.to_string(), reason })
}
