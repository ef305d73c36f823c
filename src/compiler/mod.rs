//! Flattens a node tree into shading-language text.
//!
//! Output is two pieces: `declarations` (uniforms and functions, one per
//! distinct instance or function) and `call` (locals for the root outputs and
//! one call of the root function). Both are byte-identical for an unchanged
//! tree: every traversal follows sub-graph order and the temporary counter is
//! reset per generation.

mod calls;
mod declarations;
pub mod schedule;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::CompilerConfig;
use crate::error::GraphError;
use crate::leaf::LeafFunction;
use crate::node::{NodeId, ShaderNode};
use crate::types::{IoRole, IoVar, ValueType};

/// One `uniform` line of the declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformDecl {
    pub name: String,
    pub ty: ValueType,
}

impl UniformDecl {
    pub fn line(&self) -> String {
        format!("uniform {} {};", self.ty.glsl(), self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedShader {
    pub declarations: String,
    pub call: String,
    /// Root outputs; the call leaves their values in locals of the same name.
    pub outputs: Vec<IoVar>,
    /// Uniforms declared in `declarations`, in declaration order.
    pub uniforms: Vec<UniformDecl>,
}

impl GeneratedShader {
    pub fn source(&self) -> String {
        format!("{}\n{}", self.declarations, self.call)
    }

    pub fn output(&self, name: &str) -> Option<&IoVar> {
        self.outputs.iter().find(|v| v.name == name)
    }
}

/// Name of the uniform that backs io variable `var` of instance `id`.
pub fn uniform_name(var: &str, id: NodeId) -> String {
    format!("{var}_{id}")
}

/// Generate source for `node`. Fails on structural errors anywhere in the
/// tree, on cyclic wiring and on two different leaf functions sharing a name.
pub fn generate(node: &Arc<ShaderNode>, config: &CompilerConfig) -> Result<GeneratedShader, GraphError> {
    let mut generator = Generator::new(config);
    generator.declare_uniforms(node);
    generator.declare_node(node)?;
    let call = generator.root_call(node);
    Ok(GeneratedShader {
        declarations: generator.declarations,
        call,
        outputs: node
            .iovars()
            .into_iter()
            .filter(|v| v.role == IoRole::Output)
            .collect(),
        uniforms: generator.uniforms,
    })
}

struct Generator<'a> {
    config: &'a CompilerConfig,
    declarations: String,
    uniforms: Vec<UniformDecl>,
    temp_counter: usize,
    declared_nodes: HashSet<NodeId>,
    declared_uniforms: HashSet<NodeId>,
    leaf_functions: HashMap<String, Arc<LeafFunction>>,
}

impl<'a> Generator<'a> {
    fn new(config: &'a CompilerConfig) -> Self {
        Generator {
            config,
            declarations: String::new(),
            uniforms: Vec::new(),
            temp_counter: 0,
            declared_nodes: HashSet::new(),
            declared_uniforms: HashSet::new(),
            leaf_functions: HashMap::new(),
        }
    }

    fn next_temp(&mut self, var: &IoVar) -> String {
        let name = format!("temp_{}_{}", var.ty.glsl(), self.temp_counter);
        self.temp_counter += 1;
        name
    }

    /// Wrap `text` in the pass guard implied by `name`, if any.
    fn guarded(&self, name: &str, text: String) -> String {
        match self.config.stage_guard(name) {
            Some(define) => format!("#ifdef {define}\n{text}#endif\n"),
            None => text,
        }
    }
}
