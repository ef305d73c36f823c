//! Compiled programs per (node, render pass), rebuilt when the node tree
//! changes.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use anyhow::{Context, Result};

use crate::compiler::generate;
use crate::config::CompilerConfig;
use crate::error::{GraphError, NotReady};
use crate::node::{NodeId, ShaderNode};
use crate::program::{ProgramFactory, ProgramSource, RenderPass};
use crate::validation::readiness;

/// Result of a variant lookup. Rendering can always proceed: a node that
/// cannot be compiled yet resolves to the shared placeholder.
#[derive(Debug)]
pub enum Variant<P> {
    Compiled(Arc<P>),
    Placeholder(Arc<P>),
}

impl<P> Variant<P> {
    pub fn program(&self) -> &Arc<P> {
        match self {
            Variant::Compiled(p) | Variant::Placeholder(p) => p,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Variant::Placeholder(_))
    }
}

impl<P> Clone for Variant<P> {
    fn clone(&self) -> Self {
        match self {
            Variant::Compiled(p) => Variant::Compiled(p.clone()),
            Variant::Placeholder(p) => Variant::Placeholder(p.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantState {
    /// Never requested.
    Unbuilt,
    /// Built from the current tree revision.
    Compiled,
    /// The tree changed (or readiness was lost) since the last build.
    Dirty,
    /// Structurally broken at the current revision; not retried until it
    /// changes.
    Invalid,
    /// The program factory rejected the current revision; retried on access.
    CompileFailed,
}

#[derive(Debug)]
enum Entry<P> {
    Compiled { program: Arc<P>, revision: u64 },
    Invalid { revision: u64, error: GraphError },
    Failed { revision: u64 },
}

pub struct ShaderVariantCache<F: ProgramFactory> {
    factory: F,
    config: CompilerConfig,
    placeholder: Arc<F::Program>,
    entries: HashMap<(NodeId, RenderPass), Entry<F::Program>>,
    owners: HashMap<NodeId, Weak<ShaderNode>>,
}

impl<F: ProgramFactory> ShaderVariantCache<F> {
    /// Compiles the placeholder program up front; a factory that cannot build
    /// it is unusable.
    pub fn new(mut factory: F, config: CompilerConfig) -> Result<Self> {
        let placeholder = factory
            .create_program(&ProgramSource::placeholder(&config))
            .context("failed to compile the placeholder program")?;
        Ok(ShaderVariantCache {
            factory,
            config,
            placeholder: Arc::new(placeholder),
            entries: HashMap::new(),
            owners: HashMap::new(),
        })
    }

    pub fn placeholder(&self) -> &Arc<F::Program> {
        &self.placeholder
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_variant(&mut self, node: &Arc<ShaderNode>, pass: RenderPass) -> Variant<F::Program> {
        let key = (node.id(), pass);
        let revision = node.tree_revision();

        match self.entries.get(&key) {
            Some(Entry::Compiled {
                program,
                revision: built,
            }) if *built == revision => {
                return Variant::Compiled(program.clone());
            }
            Some(Entry::Invalid { revision: seen, .. }) if *seen == revision => {
                return self.fallback();
            }
            _ => {}
        }

        self.prune();
        self.owners.insert(node.id(), Arc::downgrade(node));
        if let Err(gap) = readiness(node) {
            log::debug!("`{}` ({pass}) not ready, using placeholder: {gap}", node.name());
            if let NotReady::Invalid(error) = gap {
                self.entries.insert(key, Entry::Invalid { revision, error });
            }
            return self.fallback();
        }

        let shader = match generate(node, &self.config) {
            Ok(shader) => shader,
            Err(error) => {
                log::error!("`{}` ({pass}) cannot be generated: {error}", node.name());
                self.entries.insert(key, Entry::Invalid { revision, error });
                return self.fallback();
            }
        };

        let label = node.function_name();
        let source = ProgramSource::new(label.as_str(), pass, shader, &self.config);
        match self.factory.create_program(&source) {
            Ok(program) => {
                log::debug!("compiled `{label}` ({pass}) at revision {revision}");
                let program = Arc::new(program);
                self.entries.insert(
                    key,
                    Entry::Compiled {
                        program: program.clone(),
                        revision,
                    },
                );
                Variant::Compiled(program)
            }
            Err(err) => {
                let reported = matches!(
                    self.entries.get(&key),
                    Some(Entry::Failed { revision: seen }) if *seen == revision
                );
                if !reported {
                    log::error!("failed to compile `{label}` ({pass}): {err:#}");
                }
                self.entries.insert(key, Entry::Failed { revision });
                self.fallback()
            }
        }
    }

    fn fallback(&self) -> Variant<F::Program> {
        Variant::Placeholder(self.placeholder.clone())
    }

    /// Whether the next `get_variant` for this pair would rebuild.
    pub fn is_dirty(&self, node: &ShaderNode, pass: RenderPass) -> bool {
        self.state(node, pass) != VariantState::Compiled
    }

    pub fn state(&self, node: &ShaderNode, pass: RenderPass) -> VariantState {
        let current = node.tree_revision();
        match self.entries.get(&(node.id(), pass)) {
            None => VariantState::Unbuilt,
            Some(Entry::Compiled { revision, .. }) if *revision == current => VariantState::Compiled,
            Some(Entry::Invalid { revision, .. }) if *revision == current => VariantState::Invalid,
            Some(Entry::Failed { revision }) if *revision == current => VariantState::CompileFailed,
            Some(_) => VariantState::Dirty,
        }
    }

    /// Structural error recorded for this pair at the current revision.
    pub fn error(&self, node: &ShaderNode, pass: RenderPass) -> Option<&GraphError> {
        match self.entries.get(&(node.id(), pass)) {
            Some(Entry::Invalid { revision, error }) if *revision == node.tree_revision() => Some(error),
            _ => None,
        }
    }

    /// Force a rebuild of every variant containing `node`, in this cache and
    /// any other.
    pub fn invalidate(&mut self, node: &ShaderNode) {
        node.mark_dirty();
    }

    /// Drop all variants owned by a node that is going away. Returns how many
    /// were removed.
    pub fn remove_node(&mut self, id: NodeId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(owner, _), _| *owner != id);
        self.owners.remove(&id);
        before - self.entries.len()
    }

    /// Drop variants whose node no longer exists. Runs on every rebuild;
    /// returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.owners.retain(|_, owner| owner.strong_count() > 0);
        let owners = &self.owners;
        self.entries.retain(|(id, _), _| owners.contains_key(id));
        before - self.entries.len()
    }
}
