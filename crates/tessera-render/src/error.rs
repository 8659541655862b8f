//! Error types for the sprite renderer.

use tessera_test_utils::{DeviceError, DrawMode};

/// Errors returned by renderer resources and the sprite batch.
///
/// `Device` wraps failures reported by the GPU device. Every other variant is
/// a call-order or argument violation by the caller and is reported the
/// moment it is detected.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// GPU resource creation or shader build failure.
    Device(DeviceError),
    /// A draw operation was issued before `begin()`.
    NotDrawing,
    /// `begin()` was called while a batch is already open.
    AlreadyDrawing,
    /// The shader cannot be replaced while drawing.
    ShaderLocked,
    /// The resource must be bound before `operation`.
    NotBound { operation: &'static str },
    /// The uniform buffer must be the active write target before `operation`.
    NotActive { operation: &'static str },
    /// A uniform block index outside `[0, count)`.
    BlockOutOfRange { index: usize, count: usize },
    /// The padded block range does not fit in a single uniform block binding.
    BlockOverflow { required: usize, limit: usize },
    /// Data larger than the buffer it is loaded into.
    CapacityExceeded {
        what: &'static str,
        requested: usize,
        capacity: usize,
    },
    /// A vertex stride of zero.
    InvalidStride,
    /// Texel data whose length does not match the texture dimensions.
    InvalidTextureData { expected: usize, actual: usize },
    /// Geometry whose index count is not a multiple of the primitive size.
    MalformedIndices { mode: DrawMode, count: usize },
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device(err) => write!(f, "Device error: {}", err),
            Self::NotDrawing => write!(f, "Drawing has not started; call begin() first"),
            Self::AlreadyDrawing => write!(f, "Drawing already started; call end() first"),
            Self::ShaderLocked => write!(f, "Cannot change the shader while drawing"),
            Self::NotBound { operation } => {
                write!(f, "Resource must be bound before {}", operation)
            }
            Self::NotActive { operation } => {
                write!(f, "Uniform buffer must be active before {}", operation)
            }
            Self::BlockOutOfRange { index, count } => {
                write!(f, "Uniform block {} out of range (0..{})", index, count)
            }
            Self::BlockOverflow { required, limit } => write!(
                f,
                "Uniform buffer needs {} bytes, device limit is {}",
                required, limit
            ),
            Self::CapacityExceeded {
                what,
                requested,
                capacity,
            } => write!(
                f,
                "{} data of {} elements exceeds capacity {}",
                what, requested, capacity
            ),
            Self::InvalidStride => write!(f, "Vertex stride must be greater than zero"),
            Self::InvalidTextureData { expected, actual } => write!(
                f,
                "Texture data has {} bytes, expected {}",
                actual, expected
            ),
            Self::MalformedIndices { mode, count } => write!(
                f,
                "{} indices do not form whole {:?} primitives",
                count, mode
            ),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Device(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DeviceError> for RenderError {
    fn from(err: DeviceError) -> Self {
        Self::Device(err)
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_is_source() {
        let err: RenderError = DeviceError::Driver {
            code: 0x0505,
            operation: "texture allocation",
        }
        .into();

        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert!(source.is_some_and(|s| s.contains("GL_OUT_OF_MEMORY")));
        assert!(std::error::Error::source(&RenderError::NotDrawing).is_none());
    }

    #[test]
    fn test_display_names_operation() {
        let err = RenderError::NotBound {
            operation: "load_vertex_data",
        };
        assert_eq!(
            err.to_string(),
            "Resource must be bound before load_vertex_data"
        );
    }
}
