//! Shader graph compiler: composable function nodes flattened into GLSL,
//! with per-pass program caching and a placeholder for graphs that are not
//! ready yet.

pub mod assets;
pub mod builder;
pub mod compiler;
pub mod config;
pub mod dsl;
pub mod error;
pub mod leaf;
pub mod node;
pub mod program;
pub mod registry;
pub mod types;
pub mod uniforms;
pub mod utils;
pub mod validation;
pub mod variant_cache;

pub use assets::{IoVarRef, TextureBindings};
pub use builder::GraphBuilder;
pub use compiler::{GeneratedShader, UniformDecl, generate};
pub use config::CompilerConfig;
pub use error::{GraphError, NotReady};
pub use node::{Connection, Endpoint, NodeId, ShaderNode};
pub use program::{NagaProgramFactory, ProgramFactory, ProgramSource, RenderPass};
pub use registry::NodeRegistry;
pub use types::{IoRole, IoValue, IoVar, Swizzle, TextureHandle, ValueType};
pub use uniforms::uniform_table;
pub use validation::{is_ready, readiness};
pub use variant_cache::{ShaderVariantCache, Variant, VariantState};
