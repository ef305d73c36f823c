//! Core type definitions: value types, io variables and their values.

use std::fmt;

use crate::error::GraphError;

/// Shading-language value type of an io variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Sampler2D,
    SamplerCube,
}

impl ValueType {
    /// Returns the GLSL type name for this value type.
    pub fn glsl(self) -> &'static str {
        match self {
            ValueType::Float => "float",
            ValueType::Vec2 => "vec2",
            ValueType::Vec3 => "vec3",
            ValueType::Vec4 => "vec4",
            ValueType::Sampler2D => "sampler2D",
            ValueType::SamplerCube => "samplerCube",
        }
    }

    /// Parse a GLSL type name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "float" => Some(ValueType::Float),
            "vec2" => Some(ValueType::Vec2),
            "vec3" => Some(ValueType::Vec3),
            "vec4" => Some(ValueType::Vec4),
            "sampler2D" => Some(ValueType::Sampler2D),
            "samplerCube" => Some(ValueType::SamplerCube),
            _ => None,
        }
    }

    pub fn is_sampler(self) -> bool {
        matches!(self, ValueType::Sampler2D | ValueType::SamplerCube)
    }

    /// Number of scalar components, zero for samplers.
    pub fn components(self) -> usize {
        match self {
            ValueType::Float => 1,
            ValueType::Vec2 => 2,
            ValueType::Vec3 => 3,
            ValueType::Vec4 => 4,
            ValueType::Sampler2D | ValueType::SamplerCube => 0,
        }
    }

    pub fn from_components(n: usize) -> Option<Self> {
        match n {
            1 => Some(ValueType::Float),
            2 => Some(ValueType::Vec2),
            3 => Some(ValueType::Vec3),
            4 => Some(ValueType::Vec4),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glsl())
    }
}

/// Role of an io variable, encoded in its name prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IoRole {
    Input,
    Output,
    Constant,
}

impl IoRole {
    pub fn prefix(self) -> &'static str {
        match self {
            IoRole::Input => "IN_",
            IoRole::Output => "OUT_",
            IoRole::Constant => "CONST_",
        }
    }

    /// Infer the role from a prefixed variable name.
    pub fn of(name: &str) -> Option<Self> {
        [IoRole::Input, IoRole::Output, IoRole::Constant]
            .into_iter()
            .find(|role| name.starts_with(role.prefix()))
    }

    /// Prepend the role prefix unless `name` already carries it.
    pub fn prefixed(self, name: &str) -> String {
        if name.starts_with(self.prefix()) {
            name.to_string()
        } else {
            format!("{}{}", self.prefix(), name)
        }
    }
}

/// Handle of a texture resource owned by the asset collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

impl fmt::Display for TextureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture#{}", self.0)
    }
}

/// Value carried by an io variable.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IoValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Texture(TextureHandle),
}

impl IoValue {
    /// Build a numeric value from a component slice, choosing the vector
    /// type by length.
    pub fn from_components(components: &[f32]) -> Option<Self> {
        match *components {
            [x] => Some(IoValue::Float(x)),
            [x, y] => Some(IoValue::Vec2([x, y])),
            [x, y, z] => Some(IoValue::Vec3([x, y, z])),
            [x, y, z, w] => Some(IoValue::Vec4([x, y, z, w])),
            _ => None,
        }
    }

    pub fn components(&self) -> &[f32] {
        match self {
            IoValue::Float(x) => std::slice::from_ref(x),
            IoValue::Vec2(v) => v,
            IoValue::Vec3(v) => v,
            IoValue::Vec4(v) => v,
            IoValue::Texture(_) => &[],
        }
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        match self {
            IoValue::Texture(handle) => Some(*handle),
            _ => None,
        }
    }

    /// Whether this value can be stored in an io variable of type `ty`.
    pub fn fits(&self, ty: ValueType) -> bool {
        match self {
            IoValue::Texture(_) => ty.is_sampler(),
            numeric => {
                !ty.is_sampler()
                    && numeric.components().len() == ty.components()
                    && numeric.components().iter().all(|c| c.is_finite())
            }
        }
    }

    /// Literal constructor expression, e.g. `vec3(1.0, 0.0, 0.0)`.
    /// Textures have no literal form.
    pub fn literal(&self) -> Option<String> {
        let ty = match self {
            IoValue::Float(_) => ValueType::Float,
            IoValue::Vec2(_) => ValueType::Vec2,
            IoValue::Vec3(_) => ValueType::Vec3,
            IoValue::Vec4(_) => ValueType::Vec4,
            IoValue::Texture(_) => return None,
        };
        let parts: Vec<String> = self.components().iter().map(|c| format_float(*c)).collect();
        Some(format!("{}({})", ty.glsl(), parts.join(", ")))
    }
}

impl fmt::Display for IoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoValue::Texture(handle) => write!(f, "{handle}"),
            other => write!(f, "{}", other.literal().unwrap_or_default()),
        }
    }
}

/// Float literal that always carries a decimal point or exponent.
pub fn format_float(v: f32) -> String {
    format!("{v:?}")
}

/// A typed, named slot on a shader node.
#[derive(Clone, Debug, PartialEq)]
pub struct IoVar {
    pub ty: ValueType,
    pub name: String,
    pub role: IoRole,
    pub value: Option<IoValue>,
}

impl IoVar {
    /// Create an io variable; `name` gets the role prefix if it lacks it.
    pub fn new(
        role: IoRole,
        ty: ValueType,
        name: &str,
        value: Option<IoValue>,
    ) -> Result<Self, GraphError> {
        let name = role.prefixed(name);
        if role == IoRole::Output && ty.is_sampler() {
            return Err(GraphError::InvalidOutputType { var: name, ty });
        }
        let var = IoVar {
            ty,
            name,
            role,
            value: None,
        };
        var.check_value(value.as_ref())?;
        Ok(IoVar { value, ..var })
    }

    pub fn input(ty: ValueType, name: &str, value: Option<IoValue>) -> Result<Self, GraphError> {
        Self::new(IoRole::Input, ty, name, value)
    }

    pub fn output(ty: ValueType, name: &str) -> Result<Self, GraphError> {
        Self::new(IoRole::Output, ty, name, None)
    }

    pub fn constant(ty: ValueType, name: &str, value: Option<IoValue>) -> Result<Self, GraphError> {
        Self::new(IoRole::Constant, ty, name, value)
    }

    pub(crate) fn check_value(&self, value: Option<&IoValue>) -> Result<(), GraphError> {
        match value {
            Some(v) if !v.fits(self.ty) => Err(GraphError::ValueMismatch {
                var: self.name.clone(),
                ty: self.ty,
                value: v.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Name without the role prefix.
    pub fn short_name(&self) -> &str {
        self.name
            .strip_prefix(self.role.prefix())
            .unwrap_or(&self.name)
    }

    /// Inputs and sampler constants are bound as per-instance uniforms.
    pub fn is_uniform(&self) -> bool {
        match self.role {
            IoRole::Input => true,
            IoRole::Constant => self.ty.is_sampler(),
            IoRole::Output => false,
        }
    }

    /// Whether the variable carries a value usable for its type.
    pub fn has_value(&self) -> bool {
        self.value.as_ref().is_some_and(|v| v.fits(self.ty))
    }
}

/// Component selection applied to the source side of a connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Swizzle(String);

impl Swizzle {
    const SETS: [&'static str; 3] = ["xyzw", "rgba", "stpq"];

    /// Parse a swizzle such as `rgb` or `xy`. Components must come from a
    /// single set and there may be at most four of them.
    pub fn parse(text: &str) -> Option<Self> {
        if text.is_empty() || text.len() > 4 {
            return None;
        }
        Self::SETS
            .iter()
            .any(|set| text.chars().all(|c| set.contains(c)))
            .then(|| Swizzle(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Result type of applying the swizzle to a value of type `source`.
    pub fn apply(&self, source: ValueType) -> Result<ValueType, GraphError> {
        let invalid = || GraphError::InvalidSwizzle {
            swizzle: self.0.clone(),
            ty: source,
        };
        let available = source.components();
        let in_range = self.0.chars().all(|c| {
            Self::SETS
                .iter()
                .find_map(|set| set.find(c))
                .is_some_and(|pos| pos < available)
        });
        if source.is_sampler() || !in_range {
            return Err(invalid());
        }
        ValueType::from_components(self.0.len()).ok_or_else(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_rejects_numeric_values() {
        let err = IoVar::input(ValueType::Sampler2D, "tex", Some(IoValue::Float(1.0)));
        assert!(matches!(err, Err(GraphError::ValueMismatch { .. })));

        let ok = IoVar::input(
            ValueType::Sampler2D,
            "tex",
            Some(IoValue::Texture(TextureHandle(7))),
        )
        .unwrap();
        assert_eq!(ok.name, "IN_tex");
        assert!(ok.has_value());
    }

    #[test]
    fn numeric_rejects_textures_and_wrong_arity() {
        assert!(IoVar::input(ValueType::Vec3, "a", Some(IoValue::Texture(TextureHandle(1)))).is_err());
        assert!(IoVar::input(ValueType::Vec3, "a", Some(IoValue::Vec2([0.0, 1.0]))).is_err());
        assert!(IoVar::input(ValueType::Float, "a", Some(IoValue::Float(f32::NAN))).is_err());
    }

    #[test]
    fn sampler_outputs_are_rejected() {
        assert!(matches!(
            IoVar::output(ValueType::Sampler2D, "tex"),
            Err(GraphError::InvalidOutputType { .. })
        ));
    }

    #[test]
    fn names_get_role_prefix_once() {
        let a = IoVar::constant(ValueType::Float, "scale", Some(IoValue::Float(2.0))).unwrap();
        let b = IoVar::constant(ValueType::Float, "CONST_scale", Some(IoValue::Float(2.0))).unwrap();
        assert_eq!(a.name, "CONST_scale");
        assert_eq!(a, b);
        assert_eq!(a.short_name(), "scale");
        assert_eq!(IoRole::of("OUT_ret"), Some(IoRole::Output));
        assert_eq!(IoRole::of("ret"), None);
    }

    #[test]
    fn literals_use_constructor_syntax() {
        assert_eq!(IoValue::Vec3([1.0, 0.0, 0.5]).literal().unwrap(), "vec3(1.0, 0.0, 0.5)");
        assert_eq!(IoValue::Float(2.0).literal().unwrap(), "float(2.0)");
        assert_eq!(IoValue::Texture(TextureHandle(3)).literal(), None);
    }

    #[test]
    fn swizzle_types() {
        let rgb = Swizzle::parse("rgb").unwrap();
        assert_eq!(rgb.apply(ValueType::Vec4).unwrap(), ValueType::Vec3);
        assert!(rgb.apply(ValueType::Vec2).is_err());
        assert!(rgb.apply(ValueType::Sampler2D).is_err());
        assert_eq!(Swizzle::parse("x").unwrap().apply(ValueType::Vec2).unwrap(), ValueType::Float);
        assert!(Swizzle::parse("xg").is_none());
        assert!(Swizzle::parse("xyzwx").is_none());
    }
}
