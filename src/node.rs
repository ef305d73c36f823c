//! Shader nodes, connections and revision tracking.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::GraphError;
use crate::leaf::LeafFunction;
use crate::types::{IoValue, IoVar, Swizzle, TextureHandle};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);
static REVISION_CLOCK: AtomicU64 = AtomicU64::new(0);

/// Process-wide monotonically increasing revision stamp.
fn next_revision() -> u64 {
    REVISION_CLOCK.fetch_add(1, Ordering::AcqRel) + 1
}

/// Identity of one node instance. Used to disambiguate uniform names and to
/// key compiled variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One side of a connection: an io variable of a sub-graph, or an io variable
/// of the composite that declares the connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Node { index: usize, var: String },
    External(String),
}

impl Endpoint {
    pub fn node(index: usize, var: impl Into<String>) -> Self {
        Endpoint::Node {
            index,
            var: var.into(),
        }
    }

    pub fn external(var: impl Into<String>) -> Self {
        Endpoint::External(var.into())
    }

    pub fn var(&self) -> &str {
        match self {
            Endpoint::Node { var, .. } | Endpoint::External(var) => var,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Endpoint::Node { index, .. } => Some(*index),
            Endpoint::External(_) => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Node { index, var } => write!(f, "[{index}].{var}"),
            Endpoint::External(var) => f.write_str(var),
        }
    }
}

/// Directed edge from an output (or external input/constant) to an input
/// (or external output).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Connection {
    pub from: Endpoint,
    pub to: Endpoint,
    pub swizzle: Option<Swizzle>,
}

impl Connection {
    pub fn new(from: Endpoint, to: Endpoint) -> Self {
        Connection {
            from,
            to,
            swizzle: None,
        }
    }

    pub fn with_swizzle(mut self, swizzle: Swizzle) -> Self {
        self.swizzle = Some(swizzle);
        self
    }
}

/// Sub-graphs and wiring of a composite node.
#[derive(Clone, Debug, Default)]
pub struct CompositeGraph {
    pub sub_graphs: Vec<Arc<ShaderNode>>,
    pub connections: Vec<Connection>,
}

impl CompositeGraph {
    /// Connections that drive the inputs of sub-graph `index`.
    pub fn incoming(&self, index: usize) -> impl Iterator<Item = &Connection> {
        self.connections
            .iter()
            .filter(move |c| c.to.index() == Some(index))
    }
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Leaf(Arc<LeafFunction>),
    Composite(CompositeGraph),
}

/// The unit of composition: a leaf function or a composite of other nodes.
///
/// A sealed node is shared through `Arc`. Its structure never changes; only
/// io variable values do, and every change that affects readiness or the
/// generated text stamps a new revision.
#[derive(Debug)]
pub struct ShaderNode {
    id: NodeId,
    name: String,
    iovars: RwLock<Vec<IoVar>>,
    kind: NodeKind,
    revision: AtomicU64,
    structural_errors: Vec<GraphError>,
}

impl ShaderNode {
    /// Build a leaf node from a function source such as
    /// `vec3 add(in vec3 a, in vec3 b) { return a + b; }`.
    pub fn leaf(source: &str) -> Result<Arc<Self>, GraphError> {
        Self::leaf_with_declarations(source, None)
    }

    pub fn leaf_with_declarations(
        source: &str,
        declarations: Option<&str>,
    ) -> Result<Arc<Self>, GraphError> {
        let function = LeafFunction::parse(source)?.with_declarations(declarations);
        let iovars = function.iovars()?;
        Ok(Self::build(
            function.name.clone(),
            iovars,
            NodeKind::Leaf(Arc::new(function)),
            Vec::new(),
        ))
    }

    pub(crate) fn build(
        name: String,
        iovars: Vec<IoVar>,
        kind: NodeKind,
        structural_errors: Vec<GraphError>,
    ) -> Arc<Self> {
        Arc::new(ShaderNode {
            id: NodeId::next(),
            name,
            iovars: RwLock::new(iovars),
            kind,
            revision: AtomicU64::new(next_revision()),
            structural_errors,
        })
    }

    /// A new instance with its own id and io variable values, sharing the
    /// leaf function or the sub-graph list with `self`.
    pub fn instantiate(&self) -> Arc<Self> {
        Self::build(
            self.name.clone(),
            self.iovars(),
            self.kind.clone(),
            self.structural_errors.clone(),
        )
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn leaf_function(&self) -> Option<&Arc<LeafFunction>> {
        match &self.kind {
            NodeKind::Leaf(f) => Some(f),
            NodeKind::Composite(_) => None,
        }
    }

    pub fn graph(&self) -> Option<&CompositeGraph> {
        match &self.kind {
            NodeKind::Composite(g) => Some(g),
            NodeKind::Leaf(_) => None,
        }
    }

    /// Name used at call sites: leaf functions keep their declared name,
    /// composite functions are suffixed with the instance id.
    pub fn function_name(&self) -> String {
        match &self.kind {
            NodeKind::Leaf(f) => f.name.clone(),
            NodeKind::Composite(_) => format!("{}_{}", self.name, self.id),
        }
    }

    /// Snapshot of the io variables.
    pub fn iovars(&self) -> Vec<IoVar> {
        self.iovars.read().clone()
    }

    pub fn iovar(&self, name: &str) -> Option<IoVar> {
        self.iovars.read().iter().find(|v| v.name == name).cloned()
    }

    pub fn structural_errors(&self) -> &[GraphError] {
        &self.structural_errors
    }

    pub fn is_valid(&self) -> bool {
        self.structural_errors.is_empty()
    }

    /// First structural error wrapped with the node name, if any.
    pub fn structural_error(&self) -> Option<GraphError> {
        let first = self.structural_errors.first()?;
        Some(GraphError::InvalidGraph {
            node: self.name.clone(),
            count: self.structural_errors.len(),
            first: Box::new(first.clone()),
        })
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Newest revision stamp of this node and everything it references.
    pub fn tree_revision(&self) -> u64 {
        let mut visited = HashSet::new();
        self.collect_revision(&mut visited)
    }

    fn collect_revision(&self, visited: &mut HashSet<NodeId>) -> u64 {
        if !visited.insert(self.id) {
            return 0;
        }
        let mut revision = self.revision();
        if let NodeKind::Composite(graph) = &self.kind {
            for sub in &graph.sub_graphs {
                revision = revision.max(sub.collect_revision(visited));
            }
        }
        revision
    }

    /// Force every variant containing this node to be rebuilt.
    pub fn mark_dirty(&self) {
        self.revision.store(next_revision(), Ordering::Release);
    }

    /// Set (or clear) the value of an io variable. Returns whether anything
    /// changed.
    ///
    /// Updating an already-set uniform does not invalidate compiled variants:
    /// the new value reaches the program through the uniform table. Values that
    /// are baked into the source (numeric constants, output defaults) and any
    /// change of presence do.
    pub fn set_value(&self, name: &str, value: Option<IoValue>) -> Result<bool, GraphError> {
        let rebuild = {
            let mut vars = self.iovars.write();
            let var = vars
                .iter_mut()
                .find(|v| v.name == name)
                .ok_or_else(|| GraphError::UnknownVar {
                    node: self.name.clone(),
                    var: name.to_string(),
                })?;
            var.check_value(value.as_ref())?;
            if var.value == value {
                return Ok(false);
            }
            let presence_changed = var.value.is_some() != value.is_some();
            var.value = value;
            presence_changed || !var.is_uniform()
        };
        if rebuild {
            self.mark_dirty();
        }
        Ok(true)
    }

    /// Assign or clear the texture of a sampler io variable.
    pub fn set_texture(&self, name: &str, handle: Option<TextureHandle>) -> Result<bool, GraphError> {
        self.set_value(name, handle.map(IoValue::Texture))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueType;

    #[test]
    fn instances_get_distinct_ids_and_share_function() {
        let a = ShaderNode::leaf("vec3 add(in vec3 a, in vec3 b) { return a+b; }").unwrap();
        let b = a.instantiate();
        assert_ne!(a.id(), b.id());
        assert!(Arc::ptr_eq(a.leaf_function().unwrap(), b.leaf_function().unwrap()));
        assert_eq!(a.function_name(), "add");
    }

    #[test]
    fn uniform_updates_do_not_bump_revision() {
        let n = ShaderNode::leaf("vec3 add(in vec3 a, in vec3 b) { return a+b; }").unwrap();
        let r0 = n.revision();

        assert!(n.set_value("IN_a", Some(IoValue::Vec3([1.0, 0.0, 0.0]))).unwrap());
        let r1 = n.revision();
        assert!(r1 > r0, "presence change must bump the revision");

        assert!(n.set_value("IN_a", Some(IoValue::Vec3([0.0, 1.0, 0.0]))).unwrap());
        assert_eq!(n.revision(), r1);

        assert!(!n.set_value("IN_a", Some(IoValue::Vec3([0.0, 1.0, 0.0]))).unwrap());
        assert_eq!(n.revision(), r1);
    }

    #[test]
    fn set_value_checks_type() {
        let n = ShaderNode::leaf("vec4 s(in sampler2D tex) { return vec4(1.0); }").unwrap();
        assert!(n.set_value("IN_tex", Some(IoValue::Float(1.0))).is_err());
        assert!(n.set_texture("IN_tex", Some(TextureHandle(4))).unwrap());
        assert!(matches!(
            n.set_value("IN_missing", None),
            Err(GraphError::UnknownVar { .. })
        ));
        assert_eq!(n.iovar("IN_tex").unwrap().ty, ValueType::Sampler2D);
    }

    #[test]
    fn tree_revision_sees_children() {
        let leaf = ShaderNode::leaf("vec2 uv0() { return vUv0; }").unwrap();
        let parent = ShaderNode::build(
            "material".to_string(),
            Vec::new(),
            NodeKind::Composite(CompositeGraph {
                sub_graphs: vec![leaf.clone()],
                connections: Vec::new(),
            }),
            Vec::new(),
        );
        let before = parent.tree_revision();
        leaf.mark_dirty();
        assert!(parent.tree_revision() > before);
        assert_eq!(parent.tree_revision(), leaf.revision());
    }
}
