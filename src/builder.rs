//! Incremental construction of composite nodes.

use std::sync::Arc;

use crate::compiler::schedule;
use crate::error::GraphError;
use crate::node::{CompositeGraph, Connection, Endpoint, NodeKind, ShaderNode};
use crate::types::{IoRole, IoValue, IoVar, ValueType};
use crate::utils::sanitize_ident;

#[derive(Debug)]
struct OpenGraph {
    name: String,
    iovars: Vec<IoVar>,
    graph: CompositeGraph,
    errors: Vec<GraphError>,
}

impl OpenGraph {
    fn iovar(&self, name: &str) -> Option<&IoVar> {
        self.iovars.iter().find(|v| v.name == name)
    }

    /// Type of the value a connection reads from.
    fn source_type(&self, from: &Endpoint) -> Result<ValueType, GraphError> {
        match from {
            Endpoint::Node { index, var } => {
                let node = self.sub_graph(*index)?;
                if IoRole::of(var) != Some(IoRole::Output) {
                    return Err(GraphError::InvalidEndpoint {
                        var: var.clone(),
                        side: "source",
                        reason: "sub-graph sources must be OUT_ variables",
                    });
                }
                node.iovar(var)
                    .map(|v| v.ty)
                    .ok_or_else(|| GraphError::UnknownVar {
                        node: node.name().to_string(),
                        var: var.clone(),
                    })
            }
            Endpoint::External(var) => {
                if !matches!(IoRole::of(var), Some(IoRole::Input | IoRole::Constant)) {
                    return Err(GraphError::InvalidEndpoint {
                        var: var.clone(),
                        side: "source",
                        reason: "external sources must be IN_ or CONST_ variables",
                    });
                }
                self.own_var(var).map(|v| v.ty)
            }
        }
    }

    /// Type of the slot a connection writes to.
    fn target_type(&self, to: &Endpoint) -> Result<ValueType, GraphError> {
        match to {
            Endpoint::Node { index, var } => {
                let node = self.sub_graph(*index)?;
                if IoRole::of(var) != Some(IoRole::Input) {
                    return Err(GraphError::InvalidEndpoint {
                        var: var.clone(),
                        side: "target",
                        reason: "sub-graph targets must be IN_ variables",
                    });
                }
                node.iovar(var)
                    .map(|v| v.ty)
                    .ok_or_else(|| GraphError::UnknownVar {
                        node: node.name().to_string(),
                        var: var.clone(),
                    })
            }
            Endpoint::External(var) => {
                if IoRole::of(var) != Some(IoRole::Output) {
                    return Err(GraphError::InvalidEndpoint {
                        var: var.clone(),
                        side: "target",
                        reason: "external targets must be OUT_ variables",
                    });
                }
                self.own_var(var).map(|v| v.ty)
            }
        }
    }

    fn sub_graph(&self, index: usize) -> Result<&Arc<ShaderNode>, GraphError> {
        self.graph
            .sub_graphs
            .get(index)
            .ok_or_else(|| GraphError::IndexOutOfRange {
                node: self.name.clone(),
                index,
                len: self.graph.sub_graphs.len(),
            })
    }

    fn own_var(&self, var: &str) -> Result<&IoVar, GraphError> {
        self.iovar(var).ok_or_else(|| GraphError::UnknownVar {
            node: self.name.clone(),
            var: var.to_string(),
        })
    }

    fn check_connection(&self, connection: &Connection) -> Result<(), GraphError> {
        let from_ty = self.source_type(&connection.from)?;
        let to_ty = self.target_type(&connection.to)?;
        let read_ty = match &connection.swizzle {
            Some(swizzle) => swizzle.apply(from_ty)?,
            None => from_ty,
        };
        if read_ty != to_ty {
            let mut from = connection.from.to_string();
            if let Some(swizzle) = &connection.swizzle {
                from = format!("{from}.{}", swizzle.as_str());
            }
            return Err(GraphError::TypeMismatch {
                from,
                from_ty: read_ty,
                to: connection.to.to_string(),
                to_ty,
            });
        }
        if self.graph.connections.iter().any(|c| c.to == connection.to) {
            return Err(GraphError::DuplicateConnection {
                target: connection.to.to_string(),
            });
        }
        Ok(())
    }
}

/// Construction context for one composite node at a time.
///
/// Errors are returned to the caller and also kept on the graph being built:
/// a graph sealed with errors is permanently invalid and always renders as the
/// placeholder. Nested graphs are built with a second builder and added as a
/// sub-graph.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    open: Option<OpenGraph>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn start_graph(&mut self, name: &str) -> Result<(), GraphError> {
        if self.open.is_some() {
            return Err(GraphError::GraphAlreadyOpen);
        }
        self.open = Some(OpenGraph {
            name: sanitize_ident(name),
            iovars: Vec::new(),
            graph: CompositeGraph::default(),
            errors: Vec::new(),
        });
        Ok(())
    }

    /// Append a sub-graph and return its index. Adding a node that is already
    /// part of the graph returns its existing index.
    pub fn add_sub_graph(&mut self, node: Arc<ShaderNode>) -> Result<usize, GraphError> {
        let open = self.open.as_mut().ok_or(GraphError::NoOpenGraph)?;
        let subs = &mut open.graph.sub_graphs;
        if let Some(index) = subs.iter().position(|n| Arc::ptr_eq(n, &node)) {
            return Ok(index);
        }
        subs.push(node);
        Ok(subs.len() - 1)
    }

    pub fn add_input(
        &mut self,
        ty: ValueType,
        name: &str,
        default: Option<IoValue>,
    ) -> Result<(), GraphError> {
        self.add_iovar(IoRole::Input, ty, name, default)
    }

    pub fn add_output(&mut self, ty: ValueType, name: &str) -> Result<(), GraphError> {
        self.add_iovar(IoRole::Output, ty, name, None)
    }

    /// Outputs may carry a default, used when nothing drives them.
    pub fn add_output_with_default(
        &mut self,
        ty: ValueType,
        name: &str,
        default: Option<IoValue>,
    ) -> Result<(), GraphError> {
        self.add_iovar(IoRole::Output, ty, name, default)
    }

    pub fn add_constant(
        &mut self,
        ty: ValueType,
        name: &str,
        value: Option<IoValue>,
    ) -> Result<(), GraphError> {
        self.add_iovar(IoRole::Constant, ty, name, value)
    }

    fn add_iovar(
        &mut self,
        role: IoRole,
        ty: ValueType,
        name: &str,
        value: Option<IoValue>,
    ) -> Result<(), GraphError> {
        let open = self.open.as_mut().ok_or(GraphError::NoOpenGraph)?;
        let result = IoVar::new(role, ty, name, value).and_then(|var| {
            if open.iovar(&var.name).is_some() {
                Err(GraphError::DuplicateName {
                    node: open.name.clone(),
                    var: var.name,
                })
            } else {
                open.iovars.push(var);
                Ok(())
            }
        });
        record(open, result)
    }

    /// Set the value of an io variable on sub-graph `index`.
    ///
    /// Sub-graphs are shared, so this is visible through every composite that
    /// references the same node.
    pub fn set_default(
        &mut self,
        index: usize,
        var: &str,
        value: Option<IoValue>,
    ) -> Result<(), GraphError> {
        let open = self.open.as_mut().ok_or(GraphError::NoOpenGraph)?;
        let result = open
            .sub_graph(index)
            .and_then(|node| node.set_value(var, value))
            .map(|_| ());
        record(open, result)
    }

    pub fn connect(&mut self, connection: Connection) -> Result<(), GraphError> {
        let open = self.open.as_mut().ok_or(GraphError::NoOpenGraph)?;
        match open.check_connection(&connection) {
            Ok(()) => {
                open.graph.connections.push(connection);
                Ok(())
            }
            Err(err) => {
                log::warn!(
                    "graph `{}`: rejected connection {} -> {}: {err}",
                    open.name,
                    connection.from,
                    connection.to
                );
                open.errors.push(err.clone());
                Err(err)
            }
        }
    }

    /// Errors recorded on the open graph so far.
    pub fn errors(&self) -> &[GraphError] {
        self.open.as_ref().map_or(&[][..], |open| open.errors.as_slice())
    }

    /// Seal the open graph. Scheduling runs here so a cyclic graph is marked
    /// invalid at build time.
    pub fn end_graph(&mut self) -> Result<Arc<ShaderNode>, GraphError> {
        let mut open = self.open.take().ok_or(GraphError::NoOpenGraph)?;
        if let Err(err) = schedule::schedule(&open.name, &open.graph) {
            log::warn!("graph `{}`: {err}", open.name);
            open.errors.push(err);
        }
        Ok(ShaderNode::build(
            open.name,
            open.iovars,
            NodeKind::Composite(open.graph),
            open.errors,
        ))
    }
}

fn record<T>(open: &mut OpenGraph, result: Result<T, GraphError>) -> Result<T, GraphError> {
    if let Err(err) = &result {
        log::warn!("graph `{}`: {err}", open.name);
        open.errors.push(err.clone());
    }
    result
}
