//! Built-in module enumeration and external module discovery.

use crate::fake::FakeProbe;
use crate::http::HttpProbe;
use crate::ping::PingProbe;
use crate::{Module, ModuleCapability, ModuleError, ModuleParameter, ParamType};
use relaymon_common::json::from_value_ci;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The built-in probe set.
pub fn builtin_modules() -> Vec<Module> {
    vec![
        Module {
            name: "ping".into(),
            parameters: vec![ModuleParameter::required("target", ParamType::String)],
            capability: ModuleCapability::Builtin(Arc::new(PingProbe)),
        },
        Module {
            name: "fake".into(),
            parameters: vec![
                ModuleParameter::required("attribute", ParamType::String),
                ModuleParameter::required("value1", ParamType::Number),
                ModuleParameter::optional("value2", ParamType::Number, Value::from(42)),
            ],
            capability: ModuleCapability::Builtin(Arc::new(FakeProbe)),
        },
        Module {
            name: "http".into(),
            parameters: vec![
                ModuleParameter::required("url", ParamType::String),
                ModuleParameter::optional("method", ParamType::String, Value::from("GET")),
                ModuleParameter::optional(
                    "headers",
                    ParamType::Map,
                    Value::Object(serde_json::Map::new()),
                ),
                ModuleParameter::optional("body", ParamType::String, Value::Null),
                ModuleParameter::optional("timeout", ParamType::Number, Value::from(10)),
                ModuleParameter::optional("include_response", ParamType::Bool, Value::from(false)),
            ],
            capability: ModuleCapability::Builtin(Arc::new(HttpProbe::new())),
        },
    ]
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModuleMetadata {
    name: String,
    kind: String,
    parameters: Vec<Value>,
    executable: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawParameter {
    name: String,
    #[serde(rename = "type")]
    param_type: String,
    required: bool,
    default: Value,
}

/// Reads one external module from `<dir>/metadata.json`.
pub fn read_module(dir: &Path) -> Result<Module, ModuleError> {
    let raw = std::fs::read_to_string(dir.join("metadata.json"))?;
    let meta: ModuleMetadata = from_value_ci(serde_json::from_str(&raw)?)?;

    if meta.name.is_empty() {
        return Err(ModuleError::MissingName);
    }
    if meta.kind.is_empty() {
        return Err(ModuleError::MissingKind);
    }
    if meta.kind != "executable" {
        return Err(ModuleError::InvalidKind(meta.kind));
    }

    let mut parameters = Vec::with_capacity(meta.parameters.len());
    let mut seen = HashSet::new();
    for raw_param in meta.parameters {
        let param: RawParameter = from_value_ci(raw_param)?;
        if !seen.insert(param.name.clone()) {
            return Err(ModuleError::DuplicateParameter(param.name));
        }
        if param.param_type.is_empty() {
            return Err(ModuleError::MissingParameterType(param.name));
        }
        let param_type = param
            .param_type
            .parse::<ParamType>()
            .map_err(|_| ModuleError::BadParameterType(param.name.clone(), param.param_type.clone()))?;
        parameters.push(ModuleParameter {
            name: param.name,
            param_type,
            required: param.required,
            default: param.default,
        });
    }

    let executable = if meta.executable.is_empty() {
        dir.join(&meta.name)
    } else {
        PathBuf::from(meta.executable)
    };

    tracing::debug!(module = %meta.name, "Loaded custom module");
    Ok(Module {
        name: meta.name,
        parameters,
        capability: ModuleCapability::Executable(executable),
    })
}

/// Loads every external module found under `directory`.
///
/// Each immediate subdirectory is one candidate; a candidate that fails to
/// load is logged and skipped without affecting the others.
pub fn custom_modules(directory: &Path) -> Vec<Module> {
    tracing::debug!(directory = %directory.display(), "Scanning custom modules");

    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(directory = %directory.display(), error = %e, "Can't read custom modules");
            return Vec::new();
        }
    };

    let mut modules = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let path = std::path::absolute(&path).unwrap_or(path);
        match read_module(&path) {
            Ok(module) => modules.push(module),
            Err(e) => {
                tracing::error!(module = %path.display(), error = %e, "Can't read module");
            }
        }
    }
    modules
}

/// Builds the `name -> Module` registry used to bind drivers.
///
/// External modules shadow built-ins of the same name; the shadowing is
/// never silent.
pub fn scan_modules(modules_dir: Option<&Path>) -> HashMap<String, Module> {
    let mut registry = HashMap::new();

    for module in builtin_modules() {
        registry.insert(module.name.clone(), module);
    }

    if let Some(directory) = modules_dir {
        for module in custom_modules(directory) {
            if registry.contains_key(&module.name) {
                tracing::warn!(module = %module.name, "Custom module shadows a builtin one");
            }
            registry.insert(module.name.clone(), module);
        }
    }

    registry
}
