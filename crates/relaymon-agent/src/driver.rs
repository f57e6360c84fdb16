use anyhow::{anyhow, bail, Result};
use relaymon_common::json::from_value_ci;
use relaymon_common::types::Event;
use relaymon_modules::Module;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;

/// A scheduled probe instance: a module bound to a concrete parameter set,
/// interval, and event-enrichment template.
#[derive(Debug, Clone)]
pub struct Driver {
    /// The absolute descriptor path; authoritative even when the file
    /// carries its own `Id` field.
    pub id: String,
    pub description: String,
    pub module: Module,
    pub interval: u64,
    pub host: String,
    pub service: String,
    pub tags: Vec<String>,
    pub ttl: f32,
    pub configuration: HashMap<String, Value>,
}

impl Driver {
    /// Applies driver-level defaults to an event produced by a built-in
    /// module, in order: description, service template, host, tags, ttl,
    /// time.
    pub fn enrich(&self, event: &mut Event) {
        event.description = self.description.clone();
        self.substitute_service(event);
        event.host = self.host.clone();
        event.tags = self.tags.clone();
        event.ttl = self.ttl;
        event.time = chrono::Utc::now().timestamp();
    }

    /// Replaces every `%tag` in the driver's service template with the
    /// service string the module itself chose.
    pub fn substitute_service(&self, event: &mut Event) {
        event.service = self.service.replace("%tag", &event.service);
    }

    /// The event seeded with driver defaults, used as the base an external
    /// module record is overlaid onto.
    pub fn seed_event(&self) -> Event {
        Event {
            description: self.description.clone(),
            host: self.host.clone(),
            tags: self.tags.clone(),
            ttl: self.ttl,
            time: chrono::Utc::now().timestamp(),
            ..Event::default()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DriverDescriptor {
    description: String,
    module: String,
    interval: u64,
    host: String,
    service: String,
    tags: Vec<String>,
    ttl: f32,
    configuration: HashMap<String, Value>,
}

impl Default for DriverDescriptor {
    fn default() -> Self {
        Self {
            description: String::new(),
            module: String::new(),
            interval: 30,
            host: String::new(),
            service: String::new(),
            tags: Vec::new(),
            ttl: 0.0,
            configuration: HashMap::new(),
        }
    }
}

/// Loads every driver descriptor under `directory` and binds it against the
/// module registry.
///
/// One bad descriptor never invalidates the others: it is logged and
/// skipped.
pub fn load_drivers(registry: &HashMap<String, Module>, directory: &Path) -> Vec<Driver> {
    tracing::debug!(directory = %directory.display(), "Loading drivers");

    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(directory = %directory.display(), error = %e, "Can't read drivers");
            return Vec::new();
        }
    };

    let mut drivers = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || path.extension() != Some(OsStr::new("json")) {
            continue;
        }
        let path = std::path::absolute(&path).unwrap_or(path);
        match load_driver(registry, &path) {
            Ok(driver) => drivers.push(driver),
            Err(reason) => {
                tracing::warn!(driver = %path.display(), %reason, "Can't load driver");
            }
        }
    }
    drivers
}

fn load_driver(registry: &HashMap<String, Module>, path: &Path) -> Result<Driver> {
    let raw = std::fs::read_to_string(path)?;
    let descriptor: DriverDescriptor = from_value_ci(serde_json::from_str(&raw)?)?;

    if descriptor.description.is_empty() {
        bail!("missing description");
    }
    if descriptor.module.is_empty() {
        bail!("missing module");
    }
    if descriptor.interval == 0 {
        bail!("non-positive interval");
    }

    let module = registry
        .get(&descriptor.module)
        .ok_or_else(|| anyhow!("unknown module: {}", descriptor.module))?
        .clone();

    let service = if descriptor.service.is_empty() {
        descriptor.description.clone()
    } else {
        descriptor.service
    };

    Ok(Driver {
        id: path.display().to_string(),
        description: descriptor.description,
        module,
        interval: descriptor.interval,
        host: descriptor.host,
        service,
        tags: descriptor.tags,
        ttl: descriptor.ttl,
        configuration: descriptor.configuration,
    })
}
