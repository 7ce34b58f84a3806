//! Worker registry and route table
//!
//! Both are populated by `control.init` and read-mostly afterwards.
//! Malformed entries (missing required string fields) are dropped at
//! registration time rather than failing the whole initialization, to
//! tolerate partial or forward-compatible configuration.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use hxmux_protocol::ProtocolMode;

/// A declared worker: immutable after registration
#[derive(Debug, Clone)]
pub struct WorkerDefinition {
    pub name: String,
    /// Endpoint locator (for the process connector: the worker command)
    pub endpoint: String,
    pub mode: ProtocolMode,
    /// Free-form worker kind tag from the definition's `type` field
    pub kind: Option<String>,
    /// Opaque configuration forwarded to native workers in `worker.init`
    pub config: Value,
}

/// Registry of worker definitions, keyed by name
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, WorkerDefinition>,
}

impl WorkerRegistry {
    /// Build a registry from raw `control.init` worker entries
    ///
    /// An entry without a non-empty `url` string is dropped.
    pub fn new(raw: HashMap<String, Value>) -> Self {
        let mut workers = HashMap::new();

        for (name, entry) in raw {
            if name.is_empty() {
                warn!("Dropping worker definition with empty name");
                continue;
            }
            let Some(url) = entry.get("url").and_then(Value::as_str).filter(|u| !u.is_empty())
            else {
                warn!("Dropping worker definition '{}' without url", name);
                continue;
            };

            let mode = entry
                .get("mode")
                .and_then(Value::as_str)
                .map(ProtocolMode::from_mode_str)
                .unwrap_or(ProtocolMode::Native);

            let def = WorkerDefinition {
                name: name.clone(),
                endpoint: url.to_string(),
                mode,
                kind: entry
                    .get("type")
                    .and_then(Value::as_str)
                    .map(String::from),
                config: entry.get("config").cloned().unwrap_or(Value::Null),
            };
            workers.insert(name, def);
        }

        Self { workers }
    }

    pub fn get(&self, name: &str) -> Option<&WorkerDefinition> {
        self.workers.get(name)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

/// A path-prefix binding to a worker name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteBinding {
    pub prefix: String,
    pub worker: String,
}

/// Ordered route table: longest prefix first, declaration order breaking ties
#[derive(Debug, Default)]
pub struct RouteTable {
    bindings: Vec<RouteBinding>,
}

impl RouteTable {
    /// Build a table from raw `control.init` route entries
    ///
    /// Entries missing a non-empty `prefix` or `worker` string are dropped.
    /// The surviving bindings are stable-sorted by descending prefix length
    /// so the first structural match is guaranteed longest.
    pub fn new(raw: Vec<Value>) -> Self {
        let mut bindings: Vec<RouteBinding> = raw
            .into_iter()
            .filter_map(|entry| {
                let prefix = entry.get("prefix").and_then(Value::as_str)?;
                let worker = entry.get("worker").and_then(Value::as_str)?;
                if prefix.is_empty() || worker.is_empty() {
                    warn!("Dropping route binding with empty prefix or worker");
                    return None;
                }
                Some(RouteBinding {
                    prefix: prefix.to_string(),
                    worker: worker.to_string(),
                })
            })
            .collect();

        bindings.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));

        Self { bindings }
    }

    /// Find the binding with the longest prefix that literally prefixes `path`
    pub fn match_route(&self, path: &str) -> Option<&RouteBinding> {
        self.bindings.iter().find(|b| path.starts_with(&b.prefix))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
