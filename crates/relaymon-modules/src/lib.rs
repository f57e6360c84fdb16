//! Probe module model and registry.
//!
//! A module is a probe type: a descriptor (name, kind, declared parameters)
//! plus a capability — either an in-process [`Probe`] implementation for
//! built-in modules, or the path of an external executable speaking the
//! agent's framed stdio protocol.

pub mod fake;
pub mod http;
pub mod ping;
pub mod registry;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use relaymon_common::types::Event;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Effective parameter mapping handed to a probe on each tick.
pub type ParamMap = HashMap<String, Value>;

/// An in-process probe implementation.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Runs one probe iteration, returning zero or more events.
    ///
    /// The parameter map has already been validated against the module's
    /// declared parameters, but individual values may still be null when a
    /// parameter legitimately resolves to "unset".
    async fn run(&self, params: &ParamMap) -> Vec<Event>;
}

/// Value type tag a module parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Bool,
    Number,
    String,
    Map,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Bool => write!(f, "bool"),
            ParamType::Number => write!(f, "number"),
            ParamType::String => write!(f, "string"),
            ParamType::Map => write!(f, "map"),
        }
    }
}

impl FromStr for ParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" => Ok(ParamType::Bool),
            "number" => Ok(ParamType::Number),
            "string" => Ok(ParamType::String),
            "map" => Ok(ParamType::Map),
            _ => Err(format!("unknown parameter type: {s}")),
        }
    }
}

/// A parameter declared by a module.
#[derive(Debug, Clone)]
pub struct ModuleParameter {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub default: Value,
}

impl ModuleParameter {
    pub fn required(name: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: true,
            default: Value::Null,
        }
    }

    pub fn optional(name: &str, param_type: ParamType, default: Value) -> Self {
        Self {
            name: name.to_string(),
            param_type,
            required: false,
            default,
        }
    }
}

/// How a module executes: in-process, or as an external child process.
#[derive(Clone)]
pub enum ModuleCapability {
    Builtin(Arc<dyn Probe>),
    Executable(PathBuf),
}

impl fmt::Debug for ModuleCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleCapability::Builtin(_) => f.write_str("Builtin"),
            ModuleCapability::Executable(path) => f.debug_tuple("Executable").field(path).finish(),
        }
    }
}

/// A probe type that drivers can bind to.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub parameters: Vec<ModuleParameter>,
    pub capability: ModuleCapability,
}

impl Module {
    pub fn kind(&self) -> &'static str {
        match self.capability {
            ModuleCapability::Builtin(_) => "builtin",
            ModuleCapability::Executable(_) => "executable",
        }
    }
}

/// Errors raised while loading an external module descriptor.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("no name provided")]
    MissingName,
    #[error("no kind provided")]
    MissingKind,
    #[error("invalid kind: {0}")]
    InvalidKind(String),
    #[error("duplicated parameter name <{0}>")]
    DuplicateParameter(String),
    #[error("no parameter type for <{0}>")]
    MissingParameterType(String),
    #[error("bad parameter type for <{0}>: {1}")]
    BadParameterType(String, String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
