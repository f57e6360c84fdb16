//! Builds the effective parameter mapping for a driver.

use relaymon_modules::{ModuleParameter, ParamMap, ParamType};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Validation outcome for a driver configuration that cannot produce a
/// usable parameter map. Rendered as
/// `required parameters not found: a, b; parameters with bad type: c (...)`
/// with either clause omitted when empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamError {
    missing: Vec<String>,
    bad_types: Vec<String>,
}

impl fmt::Display for ParamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut clauses = Vec::new();
        if !self.missing.is_empty() {
            clauses.push(format!(
                "required parameters not found: {}",
                self.missing.join(", ")
            ));
        }
        if !self.bad_types.is_empty() {
            clauses.push(format!(
                "parameters with bad type: {}",
                self.bad_types.join(", ")
            ));
        }
        f.write_str(&clauses.join("; "))
    }
}

impl std::error::Error for ParamError {}

/// Classifies a raw configuration value. `None` means null, which is passed
/// through untouched; the error carries the name of an unsupported shape.
fn classify(value: &Value) -> Result<Option<ParamType>, &'static str> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(_) => Ok(Some(ParamType::Bool)),
        Value::Number(_) => Ok(Some(ParamType::Number)),
        Value::String(_) => Ok(Some(ParamType::String)),
        Value::Object(_) => Ok(Some(ParamType::Map)),
        Value::Array(_) => Err("array"),
    }
}

/// Coerces and type-checks a driver's configuration against its module's
/// declared parameters.
pub fn build_params(
    parameters: &[ModuleParameter],
    configuration: &HashMap<String, Value>,
) -> Result<ParamMap, ParamError> {
    let mut params = ParamMap::new();
    let mut missing = Vec::new();
    let mut bad_types = Vec::new();

    for parameter in parameters {
        let value = match configuration.get(&parameter.name) {
            Some(value) => value.clone(),
            None if parameter.required => {
                missing.push(parameter.name.clone());
                continue;
            }
            None => parameter.default.clone(),
        };

        match classify(&value) {
            Ok(None) => {
                params.insert(parameter.name.clone(), value);
            }
            Ok(Some(tag)) if tag == parameter.param_type => {
                params.insert(parameter.name.clone(), value);
            }
            Ok(Some(tag)) => {
                bad_types.push(format!(
                    "{} ({} not {})",
                    parameter.name, tag, parameter.param_type
                ));
            }
            Err(unsupported) => {
                bad_types.push(format!(
                    "{} (unsupported type {})",
                    parameter.name, unsupported
                ));
            }
        }
    }

    if missing.is_empty() && bad_types.is_empty() {
        Ok(params)
    } else {
        Err(ParamError { missing, bad_types })
    }
}
