use std::collections::HashMap;
use std::fmt::Write as _;

use crate::error::GraphError;
use crate::node::{CompositeGraph, Connection, Endpoint, ShaderNode};
use crate::types::{IoRole, IoVar};

use super::schedule::schedule;
use super::{Generator, uniform_name};

impl Generator<'_> {
    /// Temporaries, scheduled calls and output assignments of a composite.
    pub(super) fn composite_body(
        &mut self,
        node: &ShaderNode,
        iovars: &[IoVar],
        graph: &CompositeGraph,
    ) -> Result<String, GraphError> {
        let order = schedule(node.name(), graph)?;

        // One temporary per sub-graph output, allocated in index order.
        let mut temps: HashMap<(usize, String), String> = HashMap::new();
        let mut text = String::new();
        for (index, sub) in graph.sub_graphs.iter().enumerate() {
            for var in sub.iovars().iter().filter(|v| v.role == IoRole::Output) {
                let temp = self.next_temp(var);
                let _ = writeln!(text, "    {} {};", var.ty.glsl(), temp);
                temps.insert((index, var.name.clone()), temp);
            }
        }

        for index in order {
            let sub = &graph.sub_graphs[index];
            let vars = sub.iovars();
            let args: Vec<String> = vars
                .iter()
                .filter(|v| is_call_arg(sub, v))
                .map(|v| match v.role {
                    IoRole::Output => temps
                        .get(&(index, v.name.clone()))
                        .cloned()
                        .unwrap_or_default(),
                    _ => match driver(graph, &Endpoint::node(index, v.name.as_str())) {
                        Some(c) => source_expr(node, iovars, &temps, c),
                        None => uniform_name(&v.name, sub.id()),
                    },
                })
                .collect();
            let ret = temps.get(&(index, "OUT_ret".to_string()));
            let call = call_statement(sub, ret.map(String::as_str), &args);
            let line = format!("    {call}\n");
            text.push_str(&self.guarded(sub.name(), line));
        }

        for var in iovars.iter().filter(|v| v.role == IoRole::Output) {
            let value = match driver(graph, &Endpoint::external(var.name.as_str())) {
                Some(c) => source_expr(node, iovars, &temps, c),
                None => default_expr(var),
            };
            let _ = writeln!(text, "    {} = {};", var.name, value);
        }
        Ok(text)
    }

    /// Locals for the root outputs followed by one call of the root function
    /// with the root's uniforms.
    pub(super) fn root_call(&self, node: &ShaderNode) -> String {
        let vars = node.iovars();
        let mut text = String::new();
        for var in vars.iter().filter(|v| v.role == IoRole::Output) {
            let _ = writeln!(text, "{} {};", var.ty.glsl(), var.name);
        }
        let args: Vec<String> = vars
            .iter()
            .filter(|v| is_call_arg(node, v))
            .map(|v| match v.role {
                IoRole::Output => v.name.clone(),
                _ => uniform_name(&v.name, node.id()),
            })
            .collect();
        let ret = node.iovar("OUT_ret").filter(|_| node.leaf_function().is_some());
        let call = call_statement(node, ret.as_ref().map(|v| v.name.as_str()), &args);
        text.push_str(&self.guarded(node.name(), format!("{call}\n")));
        text
    }
}

/// Io variables passed as call arguments: everything but constants and the
/// synthesized return value of a leaf.
fn is_call_arg(node: &ShaderNode, var: &IoVar) -> bool {
    match var.role {
        IoRole::Constant => false,
        IoRole::Output => node.leaf_function().is_none() || var.name != "OUT_ret",
        IoRole::Input => true,
    }
}

/// `ret = fn(args);` for leaves with a return value, `fn(args);` otherwise.
fn call_statement(node: &ShaderNode, ret: Option<&str>, args: &[String]) -> String {
    let call = format!("{}({});", node.function_name(), args.join(", "));
    match ret {
        Some(ret) if node.leaf_function().is_some() => format!("{ret} = {call}"),
        _ => call,
    }
}

fn driver<'g>(graph: &'g CompositeGraph, target: &Endpoint) -> Option<&'g Connection> {
    graph.connections.iter().find(|c| &c.to == target)
}

/// Expression reading the source of `connection` inside the function of
/// `node`.
fn source_expr(
    node: &ShaderNode,
    iovars: &[IoVar],
    temps: &HashMap<(usize, String), String>,
    connection: &Connection,
) -> String {
    let base = match &connection.from {
        Endpoint::Node { index, var } => temps
            .get(&(*index, var.clone()))
            .cloned()
            .unwrap_or_default(),
        Endpoint::External(var) => {
            let sampler_constant = iovars
                .iter()
                .any(|v| &v.name == var && v.role == IoRole::Constant && v.ty.is_sampler());
            if sampler_constant {
                uniform_name(var, node.id())
            } else {
                var.clone()
            }
        }
    };
    match &connection.swizzle {
        Some(swizzle) => format!("{base}.{}", swizzle.as_str()),
        None => base,
    }
}

/// Literal of the declared value, zero when there is none.
pub(super) fn default_expr(var: &IoVar) -> String {
    var.value
        .and_then(|v| v.literal())
        .unwrap_or_else(|| format!("{}(0.0)", var.ty.glsl()))
}
