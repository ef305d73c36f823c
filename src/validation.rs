//! Readiness checks on node trees, and GLSL validation using the naga library.

use std::collections::HashSet;

use anyhow::{Result, anyhow};

use crate::error::NotReady;
use crate::node::{Endpoint, NodeId, NodeKind, ShaderNode};
use crate::program::ShaderStage;
use crate::types::IoRole;
use crate::utils::numbered_listing;

/// Whether `node` can be generated and compiled right now.
pub fn is_ready(node: &ShaderNode) -> bool {
    readiness(node).is_ok()
}

/// Like [`is_ready`], reporting the first gap found.
///
/// Every non-output io variable needs a value, except inputs of a sub-graph
/// that its parent drives through a connection. Leaves need a body, and every
/// connection of a composite must point at an existing sub-graph and variable.
pub fn readiness(node: &ShaderNode) -> Result<(), NotReady> {
    let mut path = HashSet::new();
    check(node, &HashSet::new(), &mut path)
}

fn check(
    node: &ShaderNode,
    connected: &HashSet<&str>,
    path: &mut HashSet<NodeId>,
) -> Result<(), NotReady> {
    if let Some(err) = node.structural_error() {
        return Err(NotReady::Invalid(err));
    }
    if !path.insert(node.id()) {
        return Err(NotReady::Cycle {
            node: node.name().to_string(),
        });
    }

    for var in node.iovars() {
        if var.role == IoRole::Output || var.has_value() || connected.contains(var.name.as_str()) {
            continue;
        }
        return Err(NotReady::MissingValue {
            node: node.name().to_string(),
            var: var.name,
        });
    }

    match node.kind() {
        NodeKind::Leaf(function) => {
            if function.body().is_empty() {
                return Err(NotReady::EmptyBody {
                    node: node.name().to_string(),
                });
            }
        }
        NodeKind::Composite(graph) => {
            for c in &graph.connections {
                let resolves = |endpoint: &Endpoint| match endpoint.index() {
                    Some(i) => graph
                        .sub_graphs
                        .get(i)
                        .is_some_and(|sub| sub.iovar(endpoint.var()).is_some()),
                    None => node.iovar(endpoint.var()).is_some(),
                };
                if !resolves(&c.from) || !resolves(&c.to) {
                    return Err(NotReady::DanglingConnection {
                        node: node.name().to_string(),
                        connection: format!("{} -> {}", c.from, c.to),
                    });
                }
            }
            for (index, sub) in graph.sub_graphs.iter().enumerate() {
                let driven: HashSet<&str> = graph.incoming(index).map(|c| c.to.var()).collect();
                check(sub, &driven, path)?;
            }
        }
    }

    path.remove(&node.id());
    Ok(())
}

/// Parse and validate one GLSL stage with naga. Every resource in `source`
/// needs an explicit binding.
pub fn validate_glsl(source: &str, stage: ShaderStage) -> Result<naga::Module> {
    let shader_stage = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };

    let mut parser = naga::front::glsl::Frontend::default();
    let options = naga::front::glsl::Options {
        stage: shader_stage,
        defines: Default::default(),
    };

    let module = parser
        .parse(&options, source)
        .map_err(|e| anyhow!("GLSL parse failed: {e:?}\n{}", numbered_listing(source)))?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| anyhow!("GLSL validation failed: {e:?}\n{}", numbered_listing(source)))?;

    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::node::Connection;
    use crate::types::{IoValue, TextureHandle, ValueType};

    #[test]
    fn leaf_inputs_need_values() {
        let add = ShaderNode::leaf("vec3 add(in vec3 a, in vec3 b) { return a+b; }").unwrap();
        assert!(matches!(
            readiness(&add),
            Err(NotReady::MissingValue { ref var, .. }) if var == "IN_a"
        ));
        add.set_value("IN_a", Some(IoValue::Vec3([1.0, 0.0, 0.0]))).unwrap();
        add.set_value("IN_b", Some(IoValue::Vec3([0.0, 1.0, 0.0]))).unwrap();
        assert!(is_ready(&add));
    }

    #[test]
    fn unbound_sampler_is_not_ready() {
        let tex = ShaderNode::leaf(
            "vec4 sampleIt(in sampler2D tex, in vec2 uv) { return texture(tex, uv); }",
        )
        .unwrap();
        tex.set_value("IN_uv", Some(IoValue::Vec2([0.5, 0.5]))).unwrap();
        assert!(!is_ready(&tex));
        tex.set_texture("IN_tex", Some(TextureHandle(1))).unwrap();
        assert!(is_ready(&tex));
        tex.set_texture("IN_tex", None).unwrap();
        assert!(!is_ready(&tex));
    }

    #[test]
    fn connected_inputs_need_no_value() {
        let add = ShaderNode::leaf("vec3 add(in vec3 a, in vec3 b) { return a+b; }").unwrap();
        let mut b = GraphBuilder::new();
        b.start_graph("g").unwrap();
        b.add_constant(ValueType::Vec3, "one", Some(IoValue::Vec3([1.0; 3]))).unwrap();
        let i = b.add_sub_graph(add.clone()).unwrap();
        b.connect(Connection::new(Endpoint::external("CONST_one"), Endpoint::node(i, "IN_a")))
            .unwrap();
        let root = b.end_graph().unwrap();

        assert!(matches!(
            readiness(&root),
            Err(NotReady::MissingValue { ref var, .. }) if var == "IN_b"
        ));
        add.set_value("IN_b", Some(IoValue::Vec3([0.0; 3]))).unwrap();
        assert!(is_ready(&root));
    }

    #[test]
    fn empty_body_and_invalid_graphs() {
        let empty = ShaderNode::leaf("void nothing() { }").unwrap();
        assert!(matches!(readiness(&empty), Err(NotReady::EmptyBody { .. })));

        let mut b = GraphBuilder::new();
        b.start_graph("bad").unwrap();
        let _ = b.connect(Connection::new(Endpoint::node(0, "OUT_ret"), Endpoint::external("OUT_x")));
        let bad = b.end_graph().unwrap();
        assert!(matches!(readiness(&bad), Err(NotReady::Invalid(_))));
    }

    #[test]
    fn valid_glsl_fragment() {
        let source = r#"#version 450
layout(location = 0) out vec4 sg_FragColor;
void main() {
    sg_FragColor = vec4(1.0, 0.0, 1.0, 1.0);
}
"#;
        assert!(validate_glsl(source, ShaderStage::Fragment).is_ok());
    }

    #[test]
    fn invalid_glsl_has_listing() {
        let source = "#version 450\nvoid main() { vec4 x = ; }\n";
        let err = validate_glsl(source, ShaderStage::Fragment).unwrap_err();
        assert!(format!("{err}").contains("   2 | void main()"));
    }
}
