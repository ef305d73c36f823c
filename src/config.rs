use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::program::AttributeSemantic;

/// Compiler settings. Every field has a default, so `{}` is a valid
/// configuration file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerConfig {
    /// Define guarding vertex-only functions.
    pub vertex_define: String,
    pub fragment_define: String,
    /// Function-name suffix marking vertex-only functions.
    pub vertex_suffix: String,
    pub fragment_suffix: String,
    /// RGBA written by the placeholder program.
    pub placeholder_color: [f32; 4],
    /// Vertex attribute name → semantic, handed to the program factory.
    pub attributes: BTreeMap<String, AttributeSemantic>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            vertex_define: "VERTEX".to_string(),
            fragment_define: "FRAGMENT".to_string(),
            vertex_suffix: "VS".to_string(),
            fragment_suffix: "PS".to_string(),
            placeholder_color: [1.0, 0.0, 1.0, 1.0],
            attributes: BTreeMap::from([
                ("vertex_position".to_string(), AttributeSemantic::Position),
                ("vertex_normal".to_string(), AttributeSemantic::Normal),
                ("vertex_texCoord0".to_string(), AttributeSemantic::TexCoord0),
            ]),
        }
    }
}

impl CompilerConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse compiler config json")
    }

    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read compiler config at {}", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Define that must be set for a function with this name to be compiled,
    /// based on its pass-affinity suffix. An empty suffix never matches.
    pub fn stage_guard(&self, function_name: &str) -> Option<&str> {
        let has_suffix = |suffix: &str| !suffix.is_empty() && function_name.ends_with(suffix);
        if has_suffix(&self.vertex_suffix) {
            Some(&self.vertex_define)
        } else if has_suffix(&self.fragment_suffix) {
            Some(&self.fragment_define)
        } else {
            None
        }
    }
}
