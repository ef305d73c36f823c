//! Texture asset notifications feeding sampler io variables.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::GraphError;
use crate::node::ShaderNode;
use crate::types::TextureHandle;

/// Weak reference to one io variable of a node. Writes through a reference
/// whose node has been dropped are no-ops.
#[derive(Debug, Clone)]
pub struct IoVarRef {
    node: Weak<ShaderNode>,
    var: String,
}

impl IoVarRef {
    pub fn new(node: &Arc<ShaderNode>, var: impl Into<String>) -> Self {
        IoVarRef {
            node: Arc::downgrade(node),
            var: var.into(),
        }
    }

    pub fn var(&self) -> &str {
        &self.var
    }

    pub fn node(&self) -> Option<Arc<ShaderNode>> {
        self.node.upgrade()
    }

    pub fn is_orphaned(&self) -> bool {
        self.node.strong_count() == 0
    }

    /// Assign a loaded texture. Resolving twice with the same handle changes
    /// nothing. Returns whether the node changed.
    pub fn resolve(&self, handle: TextureHandle) -> Result<bool, GraphError> {
        match self.node.upgrade() {
            Some(node) => node.set_texture(&self.var, Some(handle)),
            None => Ok(false),
        }
    }

    /// Drop the texture, e.g. when the asset is unloaded.
    pub fn clear(&self) -> Result<bool, GraphError> {
        match self.node.upgrade() {
            Some(node) => node.set_texture(&self.var, None),
            None => Ok(false),
        }
    }
}

/// Asset id → io variables waiting for (or showing) that texture.
///
/// Thread-safe and clone-friendly so the asset loader can hold a copy.
#[derive(Debug, Clone, Default)]
pub struct TextureBindings {
    inner: Arc<Mutex<HashMap<String, Bindings>>>,
}

#[derive(Debug, Default)]
struct Bindings {
    refs: Vec<IoVarRef>,
    loaded: Option<TextureHandle>,
}

impl TextureBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `target` for `asset_id`. If the asset is already loaded the
    /// texture is assigned right away.
    pub fn bind(&self, asset_id: impl Into<String>, target: IoVarRef) -> Result<(), GraphError> {
        let mut map = self.inner.lock();
        let entry = map.entry(asset_id.into()).or_default();
        if let Some(handle) = entry.loaded {
            target.resolve(handle)?;
        }
        entry.refs.push(target);
        Ok(())
    }

    /// The asset finished loading. Returns how many nodes changed.
    pub fn on_loaded(&self, asset_id: &str, handle: TextureHandle) -> usize {
        let mut map = self.inner.lock();
        let entry = map.entry(asset_id.to_string()).or_default();
        entry.loaded = Some(handle);
        apply(asset_id, &entry.refs, |r| r.resolve(handle))
    }

    /// The asset was unloaded; bound variables lose their texture and the
    /// nodes fall back to the placeholder until it comes back.
    pub fn on_removed(&self, asset_id: &str) -> usize {
        let mut map = self.inner.lock();
        let Some(entry) = map.get_mut(asset_id) else {
            return 0;
        };
        entry.loaded = None;
        apply(asset_id, &entry.refs, IoVarRef::clear)
    }

    /// Forget references to dropped nodes and assets nobody waits for.
    pub fn prune(&self) {
        let mut map = self.inner.lock();
        for entry in map.values_mut() {
            entry.refs.retain(|r| !r.is_orphaned());
        }
        map.retain(|_, entry| !entry.refs.is_empty());
    }

    pub fn pending(&self) -> Vec<String> {
        let map = self.inner.lock();
        let mut ids: Vec<String> = map
            .iter()
            .filter(|(_, entry)| entry.loaded.is_none())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}

fn apply(
    asset_id: &str,
    refs: &[IoVarRef],
    f: impl Fn(&IoVarRef) -> Result<bool, GraphError>,
) -> usize {
    refs.iter()
        .filter(|r| match f(r) {
            Ok(changed) => changed,
            Err(err) => {
                log::warn!("asset `{asset_id}`: cannot update `{}`: {err}", r.var());
                false
            }
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::is_ready;

    fn sampler_node() -> Arc<ShaderNode> {
        ShaderNode::leaf("vec4 albedo(in sampler2D tex) { return texture(tex, vec2(0.5)); }")
            .unwrap()
    }

    #[test]
    fn resolve_is_idempotent() {
        let node = sampler_node();
        let r = IoVarRef::new(&node, "IN_tex");
        assert!(r.resolve(TextureHandle(1)).unwrap());
        let revision = node.revision();
        assert!(!r.resolve(TextureHandle(1)).unwrap());
        assert_eq!(node.revision(), revision);
        assert!(is_ready(&node));
    }

    #[test]
    fn orphaned_refs_are_noops() {
        let node = sampler_node();
        let r = IoVarRef::new(&node, "IN_tex");
        drop(node);
        assert!(r.is_orphaned());
        assert!(!r.resolve(TextureHandle(1)).unwrap());
        assert!(!r.clear().unwrap());
    }

    #[test]
    fn load_remove_cycle() {
        let bindings = TextureBindings::new();
        let node = sampler_node();
        bindings.bind("brick.png", IoVarRef::new(&node, "IN_tex")).unwrap();
        assert_eq!(bindings.pending(), ["brick.png"]);
        assert!(!is_ready(&node));

        assert_eq!(bindings.on_loaded("brick.png", TextureHandle(4)), 1);
        assert!(is_ready(&node));
        assert!(bindings.pending().is_empty());

        // Late binders get the loaded texture immediately.
        let late = sampler_node();
        bindings.bind("brick.png", IoVarRef::new(&late, "IN_tex")).unwrap();
        assert!(is_ready(&late));

        assert_eq!(bindings.on_removed("brick.png"), 2);
        assert!(!is_ready(&node));
        assert_eq!(bindings.on_removed("unknown.png"), 0);
    }

    #[test]
    fn prune_drops_dead_entries() {
        let bindings = TextureBindings::new();
        let node = sampler_node();
        bindings.bind("a", IoVarRef::new(&node, "IN_tex")).unwrap();
        drop(node);
        bindings.prune();
        assert!(bindings.pending().is_empty());
    }

    #[test]
    fn bad_variable_is_reported_not_fatal() {
        let bindings = TextureBindings::new();
        let node = sampler_node();
        bindings.bind("a", IoVarRef::new(&node, "IN_missing")).unwrap();
        assert_eq!(bindings.on_loaded("a", TextureHandle(1)), 0);
    }
}
