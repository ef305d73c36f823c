//! Values for the uniforms the generator declares, keyed by the same names.

use std::collections::{BTreeMap, HashSet};

use crate::compiler::uniform_name;
use crate::node::{NodeId, NodeKind, ShaderNode};
use crate::types::{IoValue, TextureHandle};

/// Generated uniform name → current value, in name order.
pub type UniformTable = BTreeMap<String, IoValue>;

/// Collect the current value of every uniform-backed io variable in the tree
/// of `node` (root included). Variables without a value are left out; the
/// validator keeps such a node on the placeholder anyway.
///
/// Values are read at call time, so live tweaks that did not trigger a
/// rebuild are picked up here.
pub fn uniform_table(node: &ShaderNode) -> UniformTable {
    let mut table = UniformTable::new();
    let mut visited = HashSet::new();
    collect(node, &mut visited, &mut table);
    table
}

fn collect(node: &ShaderNode, visited: &mut HashSet<NodeId>, table: &mut UniformTable) {
    if !visited.insert(node.id()) {
        return;
    }
    for var in node.iovars().into_iter().filter(|v| v.is_uniform()) {
        if let Some(value) = var.value {
            table.insert(uniform_name(&var.name, node.id()), value);
        }
    }
    if let NodeKind::Composite(graph) = node.kind() {
        for sub in &graph.sub_graphs {
            collect(sub, visited, table);
        }
    }
}

/// Texture bindings of a table: uniform name → handle.
pub fn texture_bindings(table: &UniformTable) -> Vec<(&str, TextureHandle)> {
    table
        .iter()
        .filter_map(|(name, value)| value.texture().map(|t| (name.as_str(), t)))
        .collect()
}

/// Numeric values packed one per 16-byte slot, zero padded, in table order.
pub fn pack_numeric(table: &UniformTable) -> Vec<[f32; 4]> {
    table
        .values()
        .filter(|v| v.texture().is_none())
        .map(|v| {
            let mut slot = [0.0; 4];
            for (dst, src) in slot.iter_mut().zip(v.components()) {
                *dst = *src;
            }
            slot
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::node::{Connection, Endpoint};
    use crate::types::ValueType;

    #[test]
    fn two_instances_two_uniforms() {
        let add = ShaderNode::leaf("vec3 add(in vec3 a, in vec3 b) { return a+b; }").unwrap();
        let other = add.instantiate();
        add.set_value("IN_a", Some(IoValue::Vec3([1.0, 0.0, 0.0]))).unwrap();
        other.set_value("IN_a", Some(IoValue::Vec3([0.0, 0.0, 1.0]))).unwrap();

        let mut b = GraphBuilder::new();
        b.start_graph("pair").unwrap();
        b.add_input(ValueType::Float, "gain", Some(IoValue::Float(0.5))).unwrap();
        b.add_sub_graph(add.clone()).unwrap();
        b.add_sub_graph(other.clone()).unwrap();
        let root = b.end_graph().unwrap();

        let table = uniform_table(&root);
        assert_eq!(table.len(), 3);
        assert_eq!(table[&format!("IN_a_{}", add.id())], IoValue::Vec3([1.0, 0.0, 0.0]));
        assert_eq!(table[&format!("IN_a_{}", other.id())], IoValue::Vec3([0.0, 0.0, 1.0]));
        assert_eq!(table[&format!("IN_gain_{}", root.id())], IoValue::Float(0.5));

        // Live tweak shows up without a rebuild.
        add.set_value("IN_a", Some(IoValue::Vec3([0.5; 3]))).unwrap();
        assert_eq!(
            uniform_table(&root)[&format!("IN_a_{}", add.id())],
            IoValue::Vec3([0.5; 3])
        );
    }

    #[test]
    fn textures_and_packing() {
        let tex = ShaderNode::leaf(
            "vec4 albedo(in sampler2D tex, in float k) { return texture(tex, vec2(k)); }",
        )
        .unwrap();
        tex.set_texture("IN_tex", Some(TextureHandle(3))).unwrap();
        tex.set_value("IN_k", Some(IoValue::Float(2.0))).unwrap();

        let mut b = GraphBuilder::new();
        b.start_graph("m").unwrap();
        b.add_output(ValueType::Vec4, "rgba").unwrap();
        let i = b.add_sub_graph(tex.clone()).unwrap();
        b.connect(Connection::new(Endpoint::node(i, "OUT_ret"), Endpoint::external("OUT_rgba")))
            .unwrap();
        let root = b.end_graph().unwrap();

        let table = uniform_table(&root);
        let textures = texture_bindings(&table);
        assert_eq!(textures, vec![(format!("IN_tex_{}", tex.id()).as_str(), TextureHandle(3))]);
        assert_eq!(pack_numeric(&table), vec![[2.0, 0.0, 0.0, 0.0]]);
    }
}
