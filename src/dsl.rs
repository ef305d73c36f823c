//! JSON description of material graphs.
//!
//! ```json
//! {
//!   "name": "tinted",
//!   "ioVars": [
//!     { "role": "constant", "type": "vec3", "name": "tint", "value": [1, 0.5, 0] },
//!     { "role": "output", "type": "vec3", "name": "color" }
//!   ],
//!   "subGraphs": [
//!     { "core": "texSample", "textures": { "IN_tex": "brick.png" } },
//!     { "core": "uv0" },
//!     { "function": "vec3 mul(in vec3 a, in vec3 b) { return a * b; }" }
//!   ],
//!   "connections": [
//!     { "from": { "node": 1, "var": "OUT_ret" }, "to": { "node": 0, "var": "IN_uv" } },
//!     { "from": { "node": 0, "var": "OUT_rgba" }, "to": { "node": 2, "var": "IN_a" }, "swizzle": "rgb" },
//!     { "from": { "external": "CONST_tint" }, "to": { "node": 2, "var": "IN_b" } },
//!     { "from": { "node": 2, "var": "OUT_ret" }, "to": { "external": "OUT_color" } }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::assets::IoVarRef;
use crate::builder::GraphBuilder;
use crate::node::{Connection, Endpoint, ShaderNode};
use crate::registry::NodeRegistry;
use crate::types::{IoRole, IoValue, Swizzle, ValueType};

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GraphDesc {
    pub name: String,
    #[serde(default)]
    pub io_vars: Vec<IoVarDesc>,
    #[serde(default)]
    pub sub_graphs: Vec<SubGraphDesc>,
    #[serde(default)]
    pub connections: Vec<ConnectionDesc>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RoleDesc {
    Input,
    Output,
    Constant,
}

impl From<RoleDesc> for IoRole {
    fn from(role: RoleDesc) -> Self {
        match role {
            RoleDesc::Input => IoRole::Input,
            RoleDesc::Output => IoRole::Output,
            RoleDesc::Constant => IoRole::Constant,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IoVarDesc {
    pub role: RoleDesc,
    #[serde(rename = "type")]
    pub ty: String,
    pub name: String,
    /// Scalar or up to four components.
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// Asset id of a texture for sampler variables.
    #[serde(default)]
    pub texture: Option<String>,
}

/// Exactly one of `core`, `function` or `graph` must be set.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubGraphDesc {
    /// Registry name of a shared node.
    #[serde(default)]
    pub core: Option<String>,
    /// Inline leaf function.
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub declarations: Option<String>,
    /// Nested composite.
    #[serde(default)]
    pub graph: Option<Box<GraphDesc>>,
    /// Use a private instance of a `core` node. Implied by `defaults` and
    /// `textures`, so the shared node is never modified.
    #[serde(default)]
    pub instance: bool,
    #[serde(default)]
    pub defaults: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub textures: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConnectionDesc {
    pub from: EndpointDesc,
    pub to: EndpointDesc,
    #[serde(default)]
    pub swizzle: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(untagged)]
pub enum EndpointDesc {
    Node { node: usize, var: String },
    External { external: String },
}

impl From<&EndpointDesc> for Endpoint {
    fn from(desc: &EndpointDesc) -> Self {
        match desc {
            EndpointDesc::Node { node, var } => Endpoint::node(*node, var.as_str()),
            EndpointDesc::External { external } => Endpoint::external(external.as_str()),
        }
    }
}

/// A built graph plus the textures it still waits for.
#[derive(Debug)]
pub struct LoadedGraph {
    pub node: Arc<ShaderNode>,
    /// `(asset id, target)` pairs to hand to `TextureBindings::bind`.
    pub pending_textures: Vec<(String, IoVarRef)>,
}

pub fn load_graph_from_path(
    path: impl AsRef<std::path::Path>,
    registry: &NodeRegistry,
) -> Result<LoadedGraph> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read graph json at {}", path.display()))?;
    load_graph_from_str(&text, registry)
        .with_context(|| format!("failed to load graph from {}", path.display()))
}

pub fn load_graph_from_str(text: &str, registry: &NodeRegistry) -> Result<LoadedGraph> {
    let desc: GraphDesc = serde_json::from_str(text).context("failed to parse graph json")?;
    build_graph(&desc, registry)
}

/// Build `desc` through a [`GraphBuilder`]. Any construction error fails the
/// load.
pub fn build_graph(desc: &GraphDesc, registry: &NodeRegistry) -> Result<LoadedGraph> {
    let mut pending = Vec::new();
    let node = build(desc, registry, &mut pending)?;
    Ok(LoadedGraph {
        node,
        pending_textures: pending,
    })
}

fn build(
    desc: &GraphDesc,
    registry: &NodeRegistry,
    pending: &mut Vec<(String, IoVarRef)>,
) -> Result<Arc<ShaderNode>> {
    let mut builder = GraphBuilder::new();
    builder.start_graph(&desc.name)?;

    let mut own_textures = Vec::new();
    for var in &desc.io_vars {
        let ty = parse_type(&var.ty)?;
        let value = var
            .value
            .as_ref()
            .map(parse_value)
            .transpose()
            .with_context(|| format!("io variable `{}`", var.name))?;
        let role = IoRole::from(var.role);
        match role {
            IoRole::Input => builder.add_input(ty, &var.name, value)?,
            IoRole::Output => builder.add_output_with_default(ty, &var.name, value)?,
            IoRole::Constant => builder.add_constant(ty, &var.name, value)?,
        }
        if let Some(asset) = &var.texture {
            own_textures.push((asset.clone(), role.prefixed(&var.name)));
        }
    }

    for (index, sub) in desc.sub_graphs.iter().enumerate() {
        let node = sub_graph_node(sub, registry, pending)
            .with_context(|| format!("sub-graph {index} of `{}`", desc.name))?;
        for (var, value) in &sub.defaults {
            let value = parse_value(value).with_context(|| format!("default for `{var}`"))?;
            node.set_value(var, Some(value))?;
        }
        for (var, asset) in &sub.textures {
            if node.iovar(var).is_none_or(|v| !v.ty.is_sampler()) {
                bail!("sub-graph {index} of `{}` has no sampler `{var}`", desc.name);
            }
            pending.push((asset.clone(), IoVarRef::new(&node, var.as_str())));
        }
        let added = builder.add_sub_graph(node)?;
        if added != index {
            bail!(
                "sub-graph {index} of `{}` is the same shared node as sub-graph {added}; mark it with \"instance\": true",
                desc.name
            );
        }
    }

    for c in &desc.connections {
        let mut connection = Connection::new((&c.from).into(), (&c.to).into());
        if let Some(text) = &c.swizzle {
            let swizzle = Swizzle::parse(text).ok_or_else(|| anyhow!("invalid swizzle `{text}`"))?;
            connection = connection.with_swizzle(swizzle);
        }
        builder.connect(connection)?;
    }

    let node = builder.end_graph()?;
    if let Some(err) = node.structural_error() {
        return Err(err.into());
    }
    for (asset, var) in own_textures {
        pending.push((asset, IoVarRef::new(&node, var)));
    }
    Ok(node)
}

fn sub_graph_node(
    sub: &SubGraphDesc,
    registry: &NodeRegistry,
    pending: &mut Vec<(String, IoVarRef)>,
) -> Result<Arc<ShaderNode>> {
    match (&sub.core, &sub.function, &sub.graph) {
        (Some(name), None, None) => {
            let shared = registry.get(name, None)?;
            let private = sub.instance || !sub.defaults.is_empty() || !sub.textures.is_empty();
            Ok(if private { shared.instantiate() } else { shared })
        }
        (None, Some(code), None) => Ok(ShaderNode::leaf_with_declarations(
            code,
            sub.declarations.as_deref(),
        )?),
        (None, None, Some(graph)) => build(graph, registry, pending),
        _ => bail!("expected exactly one of `core`, `function` or `graph`"),
    }
}

fn parse_type(name: &str) -> Result<ValueType> {
    ValueType::parse(name).ok_or_else(|| anyhow!("unsupported type `{name}`"))
}

fn parse_value(value: &serde_json::Value) -> Result<IoValue> {
    let components: Vec<f32> = match value {
        serde_json::Value::Number(n) => vec![number(n)?],
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| match item {
                serde_json::Value::Number(n) => number(n),
                other => Err(anyhow!("expected a number, got {other}")),
            })
            .collect::<Result<_>>()?,
        other => bail!("expected a number or an array of numbers, got {other}"),
    };
    IoValue::from_components(&components)
        .ok_or_else(|| anyhow!("expected 1 to 4 components, got {}", components.len()))
}

fn number(n: &serde_json::Number) -> Result<f32> {
    n.as_f64()
        .map(|x| x as f32)
        .ok_or_else(|| anyhow!("number {n} is out of range"))
}
