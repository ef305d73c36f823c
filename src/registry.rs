//! Name → leaf node cache for built-in and shared nodes.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::GraphError;
use crate::node::ShaderNode;

const CORE_NODES_JSON: &str = include_str!("../assets/core-nodes.json");

#[derive(Debug, Deserialize)]
struct RawNodeTable {
    nodes: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    name: String,
    code: String,
    #[serde(default)]
    declarations: Option<String>,
}

/// Thread-safe, clone-friendly registry of singleton leaf nodes.
///
/// A name is bound to one node for the registry's lifetime. Looking it up
/// again returns the same `Arc`, so a graph that references a built-in many
/// times emits its function once.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<ShaderNode>>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with the embedded core node table.
    pub fn with_builtins() -> Result<Self> {
        let registry = Self::new();
        registry
            .register_json(CORE_NODES_JSON)
            .context("failed to load embedded core nodes")?;
        Ok(registry)
    }

    /// Look up `name`, registering `body` on a miss.
    ///
    /// On a hit `body` is ignored: callers must use one definition per name.
    /// A differing body is logged, not rejected.
    pub fn get(&self, name: &str, body: Option<&str>) -> Result<Arc<ShaderNode>, GraphError> {
        if let Some(node) = self.inner.read().get(name) {
            if let Some(body) = body {
                let differs = node
                    .leaf_function()
                    .is_none_or(|f| f.source != body.trim());
                if differs {
                    log::warn!("node `{name}` is already registered with a different body; keeping the first");
                }
            }
            return Ok(node.clone());
        }
        let body = body.ok_or_else(|| GraphError::UnknownNode(name.to_string()))?;
        self.register(name, body, None)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Parse and register a leaf. An existing entry wins, as in [`get`](Self::get).
    pub fn register(
        &self,
        name: &str,
        code: &str,
        declarations: Option<&str>,
    ) -> Result<Arc<ShaderNode>, GraphError> {
        let node = ShaderNode::leaf_with_declarations(code, declarations)?;
        let mut map = self.inner.write();
        Ok(map.entry(name.to_string()).or_insert(node).clone())
    }

    /// Register every node of a `{ "nodes": [{ name, code, declarations? }] }`
    /// table. Returns how many names were added.
    pub fn register_json(&self, text: &str) -> Result<usize> {
        let table: RawNodeTable = serde_json::from_str(text).context("failed to parse node table json")?;
        let mut added = 0;
        for raw in table.nodes {
            if self.contains(&raw.name) {
                log::warn!("node `{}` is already registered; skipping", raw.name);
                continue;
            }
            self.register(&raw.name, &raw.code, raw.declarations.as_deref())
                .with_context(|| format!("invalid node `{}`", raw.name))?;
            added += 1;
        }
        Ok(added)
    }
}
