//! Structural error taxonomy for graph construction and code generation.
//!
//! Errors at the collaborator boundaries (program creation, JSON loading) use
//! `anyhow`; everything that describes a malformed graph is a [`GraphError`]
//! so it can be stored on a sealed node and reported again later.

use thiserror::Error;

use crate::types::ValueType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("a graph is already open in this builder")]
    GraphAlreadyOpen,

    #[error("no graph is open in this builder")]
    NoOpenGraph,

    #[error("duplicate io variable `{var}` on node `{node}`")]
    DuplicateName { node: String, var: String },

    #[error("sub-graph index {index} out of range (graph `{node}` has {len} sub-graphs)")]
    IndexOutOfRange {
        node: String,
        index: usize,
        len: usize,
    },

    #[error("node `{node}` has no io variable `{var}`")]
    UnknownVar { node: String, var: String },

    #[error("`{var}` cannot be used as a connection {side}: {reason}")]
    InvalidEndpoint {
        var: String,
        side: &'static str,
        reason: &'static str,
    },

    #[error("type mismatch connecting {from} ({from_ty}) to {to} ({to_ty})")]
    TypeMismatch {
        from: String,
        from_ty: ValueType,
        to: String,
        to_ty: ValueType,
    },

    #[error("`{target}` is already driven by another connection")]
    DuplicateConnection { target: String },

    #[error("invalid swizzle `.{swizzle}` on {ty}")]
    InvalidSwizzle { swizzle: String, ty: ValueType },

    #[error("value {value} does not fit io variable `{var}` of type {ty}")]
    ValueMismatch {
        var: String,
        ty: ValueType,
        value: String,
    },

    #[error("io variable `{var}` of type {ty} cannot be an output")]
    InvalidOutputType { var: String, ty: ValueType },

    #[error("cyclic dependency between sub-graphs {indices:?} of `{node}`")]
    CyclicDependency { node: String, indices: Vec<usize> },

    #[error("malformed leaf function: {0}")]
    MalformedLeaf(String),

    #[error("unsupported type `{0}`")]
    UnsupportedType(String),

    #[error("two different functions are named `{name}`")]
    FunctionNameCollision { name: String },

    #[error("no registered node named `{0}`")]
    UnknownNode(String),

    #[error("graph `{node}` was sealed with {count} structural error(s), first: {first}")]
    InvalidGraph {
        node: String,
        count: usize,
        first: Box<GraphError>,
    },
}

/// Why a node cannot be compiled yet. Unlike [`GraphError`] these gaps are
/// expected to close (a texture finishes loading, a default is set).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotReady {
    #[error(transparent)]
    Invalid(GraphError),

    #[error("`{var}` on `{node}` has no value")]
    MissingValue { node: String, var: String },

    #[error("leaf `{node}` has an empty body")]
    EmptyBody { node: String },

    #[error("connection {connection} in `{node}` references a missing sub-graph or variable")]
    DanglingConnection { node: String, connection: String },

    #[error("`{node}` is reachable from itself")]
    Cycle { node: String },
}
