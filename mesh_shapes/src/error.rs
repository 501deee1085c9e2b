use thiserror::Error;

use crate::types::BoneId;

/// Errors raised while extracting geometry or deriving a shape from it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShapeError {
    /// A shape was requested before any vertex was extracted.
    #[error("no geometry has been extracted")]
    EmptyGeometry,

    /// The source index data cannot describe a valid triangle list.
    #[error("malformed index buffer: {reason}")]
    MalformedIndexBuffer { reason: String },

    /// Not enough distinct, non-collinear points to build the requested shape.
    #[error("degenerate geometry: {reason}")]
    DegenerateGeometry { reason: String },

    /// The bone is absent from the skeleton pose or has no vertices attributed to it.
    #[error("bone {0} is unknown or has no attributed vertices")]
    UnknownBone(BoneId),
}

impl ShapeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedIndexBuffer {
            reason: reason.into(),
        }
    }

    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateGeometry {
            reason: reason.into(),
        }
    }
}

pub type ShapeResult<T> = Result<T, ShapeError>;
