//! Leaf functions: hand-written shading functions whose io variables are
//! derived from the declared header.
//!
//! The header tokenizer only looks at the text up to the first `)`:
//! `<ret> <name>(<qualifier> <type> <name>, ...)`. It is not a GLSL parser.

use crate::error::GraphError;
use crate::types::{IoRole, IoVar, ValueType};
use crate::utils::is_ident;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamQualifier {
    In,
    Out,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeafParam {
    pub qualifier: ParamQualifier,
    pub ty: ValueType,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeafFunction {
    pub name: String,
    pub return_type: Option<ValueType>,
    pub params: Vec<LeafParam>,
    /// Trimmed function source.
    pub source: String,
    /// Extra declarations emitted in front of the function (helper structs,
    /// varyings the body relies on).
    pub declarations: Option<String>,
}

impl LeafFunction {
    pub fn parse(source: &str) -> Result<Self, GraphError> {
        let source = source.trim();
        let first_line = source.lines().next().unwrap_or_default();

        let open = source
            .find('(')
            .ok_or_else(|| GraphError::MalformedLeaf(format!("missing `(` in `{first_line}`")))?;
        let close = source[open..]
            .find(')')
            .map(|i| open + i)
            .ok_or_else(|| GraphError::MalformedLeaf(format!("missing `)` in `{first_line}`")))?;
        if !source[close..].contains('{') {
            return Err(GraphError::MalformedLeaf(format!(
                "missing function body after `{first_line}`"
            )));
        }

        let head: Vec<&str> = source[..open].split_whitespace().collect();
        let [.., ret, name] = head.as_slice() else {
            return Err(GraphError::MalformedLeaf(format!(
                "expected `<type> <name>(` in `{first_line}`"
            )));
        };
        if !is_ident(name) {
            return Err(GraphError::MalformedLeaf(format!(
                "`{name}` is not a valid function name"
            )));
        }
        let return_type = match *ret {
            "void" => None,
            other => Some(
                ValueType::parse(other)
                    .ok_or_else(|| GraphError::UnsupportedType(other.to_string()))?,
            ),
        };

        let mut params = Vec::new();
        for raw in source[open + 1..close].split(',') {
            let raw = raw.trim();
            if raw.is_empty() || raw == "void" {
                continue;
            }
            let tokens: Vec<&str> = raw.split_whitespace().collect();
            let qualifier = match tokens.first().copied() {
                Some("in") => ParamQualifier::In,
                Some("out") => ParamQualifier::Out,
                _ => {
                    log::warn!("leaf `{name}`: ignoring parameter `{raw}` (unsupported qualifier)");
                    continue;
                }
            };
            let [_, .., ty, param_name] = tokens.as_slice() else {
                log::warn!("leaf `{name}`: ignoring parameter `{raw}` (expected `<qualifier> <type> <name>`)");
                continue;
            };
            let ty = ValueType::parse(ty).ok_or_else(|| GraphError::UnsupportedType(ty.to_string()))?;
            if !is_ident(param_name) {
                return Err(GraphError::MalformedLeaf(format!(
                    "`{param_name}` is not a valid parameter name in `{name}`"
                )));
            }
            params.push(LeafParam {
                qualifier,
                ty,
                name: param_name.to_string(),
            });
        }

        Ok(LeafFunction {
            name: name.to_string(),
            return_type,
            params,
            source: source.to_string(),
            declarations: None,
        })
    }

    pub fn with_declarations(mut self, declarations: Option<&str>) -> Self {
        self.declarations = declarations
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        self
    }

    /// Io variables in call order: `OUT_ret` first (if non-void), then one per
    /// parameter in declaration order.
    pub fn iovars(&self) -> Result<Vec<IoVar>, GraphError> {
        let mut vars = Vec::with_capacity(self.params.len() + 1);
        if let Some(ret) = self.return_type {
            vars.push(IoVar::output(ret, "ret")?);
        }
        for param in &self.params {
            let role = match param.qualifier {
                ParamQualifier::In => IoRole::Input,
                ParamQualifier::Out => IoRole::Output,
            };
            let var = IoVar::new(role, param.ty, &param.name, None)?;
            if vars.iter().any(|v: &IoVar| v.name == var.name) {
                return Err(GraphError::DuplicateName {
                    node: self.name.clone(),
                    var: var.name,
                });
            }
            vars.push(var);
        }
        Ok(vars)
    }

    /// Text between the outer braces of the function.
    pub fn body(&self) -> &str {
        let start = self.source.find('{').map_or(0, |i| i + 1);
        let end = self.source.rfind('}').unwrap_or(self.source.len());
        self.source.get(start..end).unwrap_or_default().trim()
    }

    /// Two leaves may share one emitted declaration only if they are the
    /// same text.
    pub fn same_definition(&self, other: &LeafFunction) -> bool {
        self.source == other.source && self.declarations == other.declarations
    }
}
