//! The boundary to the native graphics stack: program sources per render pass
//! and the factory that turns them into programs.

use std::collections::{BTreeMap, HashSet};
use std::fmt::{self, Write as _};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::compiler::{GeneratedShader, UniformDecl};
use crate::config::CompilerConfig;
use crate::types::{IoValue, IoVar, ValueType};
use crate::utils::{indent, map_identifiers};
use crate::validation::validate_glsl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderPass {
    Forward,
    Depth,
    Shadow,
    Picking,
}

impl RenderPass {
    pub const ALL: [RenderPass; 4] = [
        RenderPass::Forward,
        RenderPass::Depth,
        RenderPass::Shadow,
        RenderPass::Picking,
    ];

    /// Define emitted in front of every stage compiled for this pass.
    pub fn define(self) -> &'static str {
        match self {
            RenderPass::Forward => "PASS_FORWARD",
            RenderPass::Depth => "PASS_DEPTH",
            RenderPass::Shadow => "PASS_SHADOW",
            RenderPass::Picking => "PASS_PICKING",
        }
    }
}

impl fmt::Display for RenderPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderPass::Forward => "forward",
            RenderPass::Depth => "depth",
            RenderPass::Shadow => "shadow",
            RenderPass::Picking => "picking",
        };
        f.write_str(name)
    }
}

/// Meaning of a vertex attribute, used by the program collaborator to bind
/// vertex buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeSemantic {
    Position,
    Normal,
    Tangent,
    TexCoord0,
    TexCoord1,
    Color,
}

impl AttributeSemantic {
    pub fn value_type(self) -> ValueType {
        match self {
            AttributeSemantic::Position | AttributeSemantic::Normal => ValueType::Vec3,
            AttributeSemantic::Tangent | AttributeSemantic::Color => ValueType::Vec4,
            AttributeSemantic::TexCoord0 | AttributeSemantic::TexCoord1 => ValueType::Vec2,
        }
    }
}

/// Binding of the engine's transform block, read by the vertex stage.
pub const TRANSFORM_BINDING: u32 = 0;
/// Binding of the block holding the graph's numeric uniforms, laid out like
/// [`crate::uniforms::pack_numeric`].
pub const GRAPH_UNIFORMS_BINDING: u32 = 1;
/// Samplers are bound from here on, in uniform name order.
pub const FIRST_SAMPLER_BINDING: u32 = 2;

const TRANSFORM_BLOCK: &str = "\
uniform SgTransform {
    mat4 matrix_model;
    mat4 matrix_normal;
    mat4 matrix_viewProjection;
};
";

/// Interpolated surface values the built-in nodes read. The vertex stage
/// writes them from the matching attribute.
const VARYINGS: [(&str, AttributeSemantic); 5] = [
    ("vPositionW", AttributeSemantic::Position),
    ("vNormalW", AttributeSemantic::Normal),
    ("vUv0", AttributeSemantic::TexCoord0),
    ("vUv1", AttributeSemantic::TexCoord1),
    ("vVertexColor", AttributeSemantic::Color),
];

/// Everything the program collaborator needs for one variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramSource {
    pub label: String,
    pub pass: RenderPass,
    pub vertex_define: String,
    pub fragment_define: String,
    pub declarations: String,
    pub call: String,
    pub outputs: Vec<IoVar>,
    pub uniforms: Vec<UniformDecl>,
    pub attributes: BTreeMap<String, AttributeSemantic>,
}

impl ProgramSource {
    pub fn new(
        label: impl Into<String>,
        pass: RenderPass,
        shader: GeneratedShader,
        config: &CompilerConfig,
    ) -> Self {
        ProgramSource {
            label: label.into(),
            pass,
            vertex_define: config.vertex_define.clone(),
            fragment_define: config.fragment_define.clone(),
            declarations: shader.declarations,
            call: shader.call,
            outputs: shader.outputs,
            uniforms: shader.uniforms,
            attributes: config.attributes.clone(),
        }
    }

    /// Flat-colour program used while a node is not ready.
    pub fn placeholder(config: &CompilerConfig) -> Self {
        let color = IoValue::Vec4(config.placeholder_color);
        let call = format!(
            "vec4 OUT_rgba;\nOUT_rgba = {};\n",
            color.literal().unwrap_or_default()
        );
        let outputs = IoVar::output(ValueType::Vec4, "rgba").into_iter().collect();
        ProgramSource::new(
            "placeholder",
            RenderPass::Forward,
            GeneratedShader {
                declarations: String::new(),
                call,
                outputs,
                uniforms: Vec::new(),
            },
            config,
        )
    }

    /// Numeric uniforms in block order, which is name order.
    pub fn numeric_uniforms(&self) -> Vec<&UniformDecl> {
        let mut numeric: Vec<_> = self.uniforms.iter().filter(|u| !u.ty.is_sampler()).collect();
        numeric.sort_by(|a, b| a.name.cmp(&b.name));
        numeric
    }

    /// Sampler uniforms with their binding slots.
    pub fn sampler_bindings(&self) -> Vec<(&UniformDecl, u32)> {
        let mut samplers: Vec<_> = self.uniforms.iter().filter(|u| u.ty.is_sampler()).collect();
        samplers.sort_by(|a, b| a.name.cmp(&b.name));
        samplers.into_iter().zip(FIRST_SAMPLER_BINDING..).collect()
    }

    /// Complete GLSL 450 text for one stage.
    pub fn stage_text(&self, stage: ShaderStage) -> String {
        let stage_define = match stage {
            ShaderStage::Vertex => &self.vertex_define,
            ShaderStage::Fragment => &self.fragment_define,
        };
        let mut text = String::from("#version 450\n");
        let _ = writeln!(text, "#define {}", self.pass.define());
        let _ = writeln!(text, "#define {stage_define}");

        match stage {
            ShaderStage::Vertex => {
                for (location, (name, semantic)) in self.attributes.iter().enumerate() {
                    let _ = writeln!(
                        text,
                        "layout(location = {location}) in {} {name};",
                        semantic.value_type().glsl()
                    );
                }
                for (location, (name, semantic)) in VARYINGS.iter().enumerate() {
                    let _ = writeln!(
                        text,
                        "layout(location = {location}) out {} {name};",
                        semantic.value_type().glsl()
                    );
                }
                let _ = write!(
                    text,
                    "layout(std140, binding = {TRANSFORM_BINDING}) {TRANSFORM_BLOCK}"
                );
            }
            ShaderStage::Fragment => {
                for (location, (name, semantic)) in VARYINGS.iter().enumerate() {
                    let _ = writeln!(
                        text,
                        "layout(location = {location}) in {} {name};",
                        semantic.value_type().glsl()
                    );
                }
                text.push_str("layout(location = 0) out vec4 sg_FragColor;\n");
            }
        }
        text.push_str(&self.uniform_block());
        if stage == ShaderStage::Vertex {
            text.push_str(&self.surface_helpers());
        }
        text.push_str(&self.function_declarations());

        text.push_str("void main() {\n");
        if stage == ShaderStage::Vertex {
            for (name, semantic) in VARYINGS {
                let _ = writeln!(text, "    {name} = {};", self.varying_expr(semantic));
            }
        }
        text.push_str(&indent(&self.call, 1));
        match stage {
            ShaderStage::Vertex => {
                let _ = writeln!(text, "    gl_Position = {};", self.position_expr());
            }
            ShaderStage::Fragment => {
                let _ = writeln!(text, "    sg_FragColor = {};", self.color_expr());
            }
        }
        text.push_str("}\n");
        text
    }

    /// The graph's uniforms as a std140 block with one 16-byte slot per
    /// value, followed by one binding per sampler.
    fn uniform_block(&self) -> String {
        let mut text = String::new();
        let numeric = self.numeric_uniforms();
        if !numeric.is_empty() {
            let _ = writeln!(
                text,
                "layout(std140, binding = {GRAPH_UNIFORMS_BINDING}) uniform SgGraphUniforms {{"
            );
            let mut pad = 0;
            for decl in numeric {
                let _ = writeln!(text, "    {} {};", decl.ty.glsl(), decl.name);
                for _ in decl.ty.components()..4 {
                    let _ = writeln!(text, "    float sg_pad{pad};");
                    pad += 1;
                }
            }
            text.push_str("};\n");
        }
        for (decl, binding) in self.sampler_bindings() {
            let _ = writeln!(
                text,
                "layout(binding = {binding}) uniform {} {};",
                decl.ty.glsl(),
                decl.name
            );
        }
        text
    }

    /// Generated declarations without the loose uniform lines, which
    /// [`Self::uniform_block`] replaces.
    fn function_declarations(&self) -> String {
        let loose: HashSet<String> = self.uniforms.iter().map(UniformDecl::line).collect();
        self.declarations
            .lines()
            .filter(|line| !loose.contains(*line))
            .map(|line| format!("{line}\n"))
            .collect()
    }

    fn attribute(&self, semantic: AttributeSemantic) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(_, s)| **s == semantic)
            .map(|(name, _)| name.as_str())
    }

    /// World-space helpers available to vertex-stage nodes.
    fn surface_helpers(&self) -> String {
        let position = self.attribute(AttributeSemantic::Position).unwrap_or("vec3(0.0)");
        let normal = self
            .attribute(AttributeSemantic::Normal)
            .unwrap_or("vec3(0.0, 0.0, 1.0)");
        format!(
            "vec3 getWorldPosition() {{\n    return (matrix_model * vec4({position}, 1.0)).xyz;\n}}\n\
             vec3 getWorldNormal() {{\n    return normalize(mat3(matrix_normal) * {normal});\n}}\n"
        )
    }

    fn varying_expr(&self, semantic: AttributeSemantic) -> String {
        match semantic {
            AttributeSemantic::Position => "getWorldPosition()".to_string(),
            AttributeSemantic::Normal => "getWorldNormal()".to_string(),
            AttributeSemantic::Color => self
                .attribute(semantic)
                .map_or("vec4(1.0)".to_string(), str::to_string),
            _ => self
                .attribute(semantic)
                .map_or(format!("{}(0.0)", semantic.value_type().glsl()), str::to_string),
        }
    }

    /// Fragment colour: `OUT_rgba`, else the first vec4, vec3 or float output.
    fn color_expr(&self) -> String {
        let find = |ty: ValueType| self.outputs.iter().find(|v| v.ty == ty);
        if let Some(rgba) = self
            .outputs
            .iter()
            .find(|v| v.name == "OUT_rgba" && v.ty == ValueType::Vec4)
        {
            return rgba.name.clone();
        }
        if let Some(v) = find(ValueType::Vec4) {
            return v.name.clone();
        }
        if let Some(v) = find(ValueType::Vec3) {
            return format!("vec4({}, 1.0)", v.name);
        }
        if let Some(v) = find(ValueType::Float) {
            return format!("vec4(vec3({}), 1.0)", v.name);
        }
        "vec4(1.0)".to_string()
    }

    /// Clip position of the world position, offset by `OUT_vertexOffset` when
    /// the graph provides it.
    fn position_expr(&self) -> String {
        let offset = self
            .outputs
            .iter()
            .find(|v| v.name == "OUT_vertexOffset" && v.ty == ValueType::Vec3);
        match offset {
            Some(o) => format!("matrix_viewProjection * vec4(vPositionW + {}, 1.0)", o.name),
            None => "matrix_viewProjection * vec4(vPositionW, 1.0)".to_string(),
        }
    }
}

/// Creates native programs from generated source. Errors are reported to the
/// variant cache, which falls back to the placeholder.
pub trait ProgramFactory {
    type Program;

    fn create_program(&mut self, source: &ProgramSource) -> Result<Self::Program>;
}

/// Both stages of a program, parsed and validated by naga.
#[derive(Debug)]
pub struct NagaProgram {
    pub label: String,
    pub pass: RenderPass,
    pub vertex: naga::Module,
    pub fragment: naga::Module,
}

/// Headless factory: a program is "created" when both stages pass naga's
/// GLSL frontend and validator.
#[derive(Debug, Default)]
pub struct NagaProgramFactory {
    created: usize,
}

impl NagaProgramFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Programs successfully created so far.
    pub fn created(&self) -> usize {
        self.created
    }
}

impl ProgramFactory for NagaProgramFactory {
    type Program = NagaProgram;

    fn create_program(&mut self, source: &ProgramSource) -> Result<NagaProgram> {
        let sampler_binding = FIRST_SAMPLER_BINDING + source.sampler_bindings().len() as u32;
        let validate = |stage: ShaderStage, name: &str| {
            let text = separate_samplers(&source.stage_text(stage), stage, sampler_binding);
            validate_glsl(&text, stage).with_context(|| {
                format!("{} ({}) generated an invalid {name} stage", source.label, source.pass)
            })
        };
        let vertex = validate(ShaderStage::Vertex, "vertex")?;
        let fragment = validate(ShaderStage::Fragment, "fragment")?;
        self.created += 1;
        Ok(NagaProgram {
            label: source.label.clone(),
            pass: source.pass,
            vertex,
            fragment,
        })
    }
}

/// naga reads Vulkan GLSL, where textures and samplers are separate objects.
/// Combined sampler types become textures, and `texture()` lookups go through
/// `sg_texture` overloads that pair them with one shared sampler.
fn separate_samplers(text: &str, stage: ShaderStage, sampler_binding: u32) -> String {
    let lowered = map_identifiers(text, |word, tail| match word {
        "sampler2D" => Some("texture2D"),
        "samplerCube" => Some("textureCube"),
        "texture" if tail.trim_start().starts_with('(') => Some("sg_texture"),
        _ => None,
    });
    let lookup = |combined: &str, coord: &str| match stage {
        ShaderStage::Vertex => format!("textureLod({combined}(t, sg_sampler), {coord}, 0.0)"),
        ShaderStage::Fragment => format!("texture({combined}(t, sg_sampler), {coord})"),
    };
    let mut preamble = format!("layout(binding = {sampler_binding}) uniform sampler sg_sampler;\n");
    let _ = writeln!(
        preamble,
        "vec4 sg_texture(texture2D t, vec2 uv) {{ return {}; }}",
        lookup("sampler2D", "uv")
    );
    let _ = writeln!(
        preamble,
        "vec4 sg_texture(textureCube t, vec3 dir) {{ return {}; }}",
        lookup("samplerCube", "dir")
    );

    let mut out = String::with_capacity(lowered.len() + preamble.len());
    let mut inserted = false;
    for line in lowered.lines() {
        if !inserted && !line.starts_with('#') {
            out.push_str(&preamble);
            inserted = true;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(name: &str, ty: ValueType) -> UniformDecl {
        UniformDecl {
            name: name.to_string(),
            ty,
        }
    }

    #[test]
    fn placeholder_stage_text() {
        let source = ProgramSource::placeholder(&CompilerConfig::default());
        let fragment = source.stage_text(ShaderStage::Fragment);
        assert!(fragment.starts_with("#version 450\n#define PASS_FORWARD\n#define FRAGMENT\n"));
        assert!(fragment.contains("layout(location = 2) in vec2 vUv0;\n"));
        assert!(fragment.contains("    OUT_rgba = vec4(1.0, 0.0, 1.0, 1.0);\n"));
        assert!(fragment.contains("    sg_FragColor = OUT_rgba;\n"));
        assert!(!fragment.contains("SgGraphUniforms"));

        let vertex = source.stage_text(ShaderStage::Vertex);
        assert!(vertex.contains("#define VERTEX\n"));
        assert!(vertex.contains("in vec3 vertex_position;"));
        assert!(vertex.contains("layout(location = 2) out vec2 vUv0;\n"));
        assert!(vertex.contains("return (matrix_model * vec4(vertex_position, 1.0)).xyz;"));
        assert!(vertex.contains("    vUv0 = vertex_texCoord0;\n"));
        assert!(vertex.contains("    vVertexColor = vec4(1.0);\n"));
        assert!(vertex.contains("gl_Position = matrix_viewProjection * vec4(vPositionW, 1.0);"));
    }

    #[test]
    fn uniforms_move_into_a_padded_block() {
        let mut source = ProgramSource::placeholder(&CompilerConfig::default());
        source.uniforms = vec![
            decl("IN_tex_4", ValueType::Sampler2D),
            decl("IN_b_2", ValueType::Vec3),
            decl("IN_a_2", ValueType::Float),
            decl("IN_env_3", ValueType::SamplerCube),
        ];
        source.declarations = source
            .uniforms
            .iter()
            .map(|u| format!("{}\n", u.line()))
            .collect::<String>()
            + "float keep() { return 1.0; }\n";

        let fragment = source.stage_text(ShaderStage::Fragment);
        assert!(!fragment.contains("uniform vec3 IN_b_2;"));
        assert!(fragment.contains(
            "layout(std140, binding = 1) uniform SgGraphUniforms {\n    \
             float IN_a_2;\n    float sg_pad0;\n    float sg_pad1;\n    float sg_pad2;\n    \
             vec3 IN_b_2;\n    float sg_pad3;\n};\n"
        ));
        assert!(fragment.contains("layout(binding = 2) uniform samplerCube IN_env_3;\n"));
        assert!(fragment.contains("layout(binding = 3) uniform sampler2D IN_tex_4;\n"));
        assert!(fragment.contains("float keep() { return 1.0; }\n"));

        let bindings: Vec<_> = source
            .sampler_bindings()
            .into_iter()
            .map(|(u, binding)| (u.name.as_str(), binding))
            .collect();
        assert_eq!(bindings, [("IN_env_3", 2), ("IN_tex_4", 3)]);
    }

    #[test]
    fn missing_attributes_fall_back_to_constants() {
        let mut source = ProgramSource::placeholder(&CompilerConfig::default());
        source.attributes.clear();
        let vertex = source.stage_text(ShaderStage::Vertex);
        assert!(vertex.contains("return (matrix_model * vec4(vec3(0.0), 1.0)).xyz;"));
        assert!(vertex.contains("    vUv1 = vec2(0.0);\n"));
        NagaProgramFactory::new().create_program(&source).unwrap();
    }

    #[test]
    fn combined_samplers_are_split_for_naga() {
        let text = "#version 450\n#define FRAGMENT\nuniform sampler2D t;\nvec4 f() { return texture (t, vec2(0.0)); }\n";
        let lowered = separate_samplers(text, ShaderStage::Fragment, 5);
        assert!(lowered.starts_with(
            "#version 450\n#define FRAGMENT\nlayout(binding = 5) uniform sampler sg_sampler;\n"
        ));
        assert!(lowered.contains("uniform texture2D t;\n"));
        assert!(lowered.contains("return sg_texture (t, vec2(0.0));"));
        assert!(lowered.contains("return texture(sampler2D(t, sg_sampler), uv);"));

        let vertex = separate_samplers(text, ShaderStage::Vertex, 5);
        assert!(vertex.contains("return textureLod(sampler2D(t, sg_sampler), uv, 0.0);"));
    }

    #[test]
    fn naga_accepts_placeholder() {
        let mut factory = NagaProgramFactory::new();
        let program = factory
            .create_program(&ProgramSource::placeholder(&CompilerConfig::default()))
            .unwrap();
        assert_eq!(program.label, "placeholder");
        assert_eq!(factory.created(), 1);
    }

    #[test]
    fn naga_accepts_uniforms_and_samplers() {
        let mut source = ProgramSource::placeholder(&CompilerConfig::default());
        source.uniforms = vec![
            decl("IN_tint_1", ValueType::Vec3),
            decl("IN_tex_1", ValueType::Sampler2D),
        ];
        source.declarations = "uniform vec3 IN_tint_1;\nuniform sampler2D IN_tex_1;\n\
             vec4 shade(in sampler2D tex, in vec3 tint) {\n    \
             return texture(tex, vUv0) * vec4(tint, 1.0);\n}\n"
            .to_string();
        source.call = "vec4 OUT_rgba;\nOUT_rgba = shade(IN_tex_1, IN_tint_1);\n".to_string();
        NagaProgramFactory::new().create_program(&source).unwrap();
    }

    #[test]
    fn naga_rejects_broken_source() {
        let mut source = ProgramSource::placeholder(&CompilerConfig::default());
        source.call = "vec4 OUT_rgba = ;\n".to_string();
        let err = NagaProgramFactory::new().create_program(&source).unwrap_err();
        assert!(format!("{err:#}").contains("invalid vertex stage"));
    }

    #[test]
    fn color_falls_back_to_first_vec3() {
        let mut source = ProgramSource::placeholder(&CompilerConfig::default());
        source.outputs = vec![IoVar::output(ValueType::Vec3, "albedo").unwrap()];
        assert_eq!(source.color_expr(), "vec4(OUT_albedo, 1.0)");
        source.outputs.clear();
        assert_eq!(source.color_expr(), "vec4(1.0)");
    }
}
