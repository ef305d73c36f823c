use std::fmt::Write as _;
use std::sync::Arc;

use crate::error::GraphError;
use crate::leaf::LeafFunction;
use crate::node::{CompositeGraph, NodeKind, ShaderNode};
use crate::types::IoRole;

use super::calls::default_expr;
use super::{Generator, UniformDecl, uniform_name};

impl Generator<'_> {
    /// `uniform` lines for every input and sampler constant of `node`, once
    /// per instance.
    pub(super) fn declare_uniforms(&mut self, node: &ShaderNode) {
        if !self.declared_uniforms.insert(node.id()) {
            return;
        }
        for var in node.iovars().iter().filter(|v| v.is_uniform()) {
            let decl = UniformDecl {
                name: uniform_name(&var.name, node.id()),
                ty: var.ty,
            };
            let _ = writeln!(self.declarations, "{}", decl.line());
            self.uniforms.push(decl);
        }
    }

    /// Post-order walk: sub-graphs are declared before the functions that
    /// call them.
    pub(super) fn declare_node(&mut self, node: &Arc<ShaderNode>) -> Result<(), GraphError> {
        if !self.declared_nodes.insert(node.id()) {
            return Ok(());
        }
        if let Some(err) = node.structural_error() {
            log::error!("cannot generate `{}`: {err}", node.name());
            return Err(err);
        }
        match node.kind() {
            NodeKind::Leaf(function) => {
                self.declare_uniforms(node);
                self.declare_leaf(function)
            }
            NodeKind::Composite(graph) => {
                for sub in &graph.sub_graphs {
                    self.declare_node(sub)?;
                }
                self.declare_uniforms(node);
                let text = self.composite_function(node, graph)?;
                let text = self.guarded(node.name(), text);
                self.declarations.push_str(&text);
                Ok(())
            }
        }
    }

    /// Emit a leaf function once per name. Instances share the function;
    /// a different function under the same name is an error.
    fn declare_leaf(&mut self, function: &Arc<LeafFunction>) -> Result<(), GraphError> {
        if let Some(existing) = self.leaf_functions.get(&function.name) {
            if Arc::ptr_eq(existing, function) || existing.same_definition(function) {
                return Ok(());
            }
            log::error!("function `{}` is defined twice with different bodies", function.name);
            return Err(GraphError::FunctionNameCollision {
                name: function.name.clone(),
            });
        }
        self.leaf_functions
            .insert(function.name.clone(), function.clone());

        let mut text = String::new();
        if let Some(decls) = &function.declarations {
            text.push_str(decls);
            text.push('\n');
        }
        text.push_str(&function.source);
        text.push('\n');
        let text = self.guarded(&function.name, text);
        self.declarations.push_str(&text);
        Ok(())
    }

    /// `void <name>_<id>(in.., out..)` with numeric constants as locals.
    fn composite_function(
        &mut self,
        node: &ShaderNode,
        graph: &CompositeGraph,
    ) -> Result<String, GraphError> {
        let iovars = node.iovars();
        let params: Vec<String> = iovars
            .iter()
            .filter_map(|v| {
                let qualifier = match v.role {
                    IoRole::Input => "in",
                    IoRole::Output => "out",
                    IoRole::Constant => return None,
                };
                Some(format!("{qualifier} {} {}", v.ty.glsl(), v.name))
            })
            .collect();

        let mut text = format!("void {}({}) {{\n", node.function_name(), params.join(", "));
        for var in iovars
            .iter()
            .filter(|v| v.role == IoRole::Constant && !v.ty.is_sampler())
        {
            let _ = writeln!(
                text,
                "    const {} {} = {};",
                var.ty.glsl(),
                var.name,
                default_expr(var)
            );
        }
        text.push_str(&self.composite_body(node, &iovars, graph)?);
        text.push_str("}\n");
        Ok(text)
    }
}
