//! Error types for remorph.
//!
//! Only mesh construction, configuration validation and meta-morph I/O can
//! fail. Transfer algorithms report "nothing found" through their return
//! values instead.

use thiserror::Error;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur while building meshes or reading transfer inputs.
#[derive(Error, Debug)]
pub enum MeshError {
    /// A triangle references an invalid vertex index.
    #[error("triangle {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The triangle index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A triangle has duplicate vertex indices.
    #[error("triangle {face} is degenerate (has duplicate vertices)")]
    DegenerateFace {
        /// The triangle index.
        face: usize,
    },

    /// A per-triangle attribute does not have one entry per triangle.
    #[error("attribute {attribute} has {found} entries, expected {expected}")]
    AttributeLength {
        /// Attribute name.
        attribute: &'static str,
        /// Number of triangles in the mesh.
        expected: usize,
        /// Number of entries supplied.
        found: usize,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input does not start with the meta-morph header line.
    #[error("missing meta-morph header (expected `{expected}`)")]
    MissingHeader {
        /// The header that was expected.
        expected: &'static str,
    },

    /// A known meta-morph line could not be parsed.
    #[error("line {line}: {message}")]
    Parse {
        /// One-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// Invalid mesh state for the requested operation.
    #[error("invalid mesh state: {0}")]
    InvalidState(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Create a parse error for a one-based line number.
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        MeshError::Parse {
            line,
            message: message.into(),
        }
    }
}
