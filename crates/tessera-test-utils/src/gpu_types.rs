//! GPU handle and fixed-function state types.
//!
//! Handles are plain integer ids issued by a [`RenderDevice`](crate::RenderDevice).
//! They carry no ownership; the resource wrappers in `tessera-render` own the
//! handles and release them on drop.

use bitflags::bitflags;

/// Handle to a GPU buffer object (vertex, index or uniform storage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Handle to a vertex array object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexArrayId(pub u32);

/// Handle to a 2D texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// Handle to a linked shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Resolved location of a uniform inside a specific program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Buffer binding target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    Vertex,
    Index,
    Uniform,
}

/// Expected update frequency of a buffer's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    Static,
    Dynamic,
    #[default]
    Stream,
}

/// Component type of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Byte,
    UnsignedByte,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Float,
}

impl AttributeType {
    /// Size of one component in bytes.
    pub const fn size(self) -> usize {
        match self {
            AttributeType::Byte | AttributeType::UnsignedByte => 1,
            AttributeType::Short | AttributeType::UnsignedShort => 2,
            AttributeType::Int | AttributeType::UnsignedInt | AttributeType::Float => 4,
        }
    }
}

/// Layout of one named attribute inside an interleaved vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeLayout {
    /// Number of components (1-4).
    pub components: u32,
    pub ty: AttributeType,
    /// Map integer components to `[0, 1]` / `[-1, 1]`.
    pub normalized: bool,
    /// Byte offset of the attribute inside the vertex.
    pub offset: usize,
}

/// Primitive assembly mode for indexed draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrawMode {
    Points,
    Lines,
    #[default]
    Triangles,
}

impl DrawMode {
    /// Number of indices forming one primitive.
    pub const fn primitive_size(self) -> usize {
        match self {
            DrawMode::Points => 1,
            DrawMode::Lines => 2,
            DrawMode::Triangles => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendEquation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Comparison used by the stencil (and depth) test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Action applied to a stencil value after a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    Increment,
    IncrementWrap,
    Decrement,
    DecrementWrap,
    Invert,
}

/// Server-side capability toggled with enable/disable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Blend,
    DepthTest,
    StencilTest,
    ScissorTest,
}

bitflags! {
    /// Buffers affected by a clear.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Texel storage format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    #[default]
    Rgba,
    Rgb,
    /// Single channel.
    Red,
    /// Dual channel.
    RedGreen,
    Depth,
    DepthStencil,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba => 4,
            PixelFormat::Rgb => 3,
            PixelFormat::Red => 1,
            PixelFormat::RedGreen => 2,
            PixelFormat::Depth => 4,
            PixelFormat::DepthStencil => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// A value written to a program uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec4([f32; 4]),
    /// Column-major.
    Mat4([f32; 16]),
}

/// Implementation limits relevant to buffer layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Required alignment of `bind_buffer_range` offsets, in bytes.
    pub uniform_buffer_offset_alignment: usize,
    /// Largest uniform buffer range, in bytes.
    pub max_uniform_block_size: usize,
    pub max_texture_size: u32,
}

impl Default for DeviceLimits {
    /// The OpenGL 3.3 minimums, with the 256 byte alignment most desktop
    /// drivers report.
    fn default() -> Self {
        Self {
            uniform_buffer_offset_alignment: 256,
            max_uniform_block_size: 16384,
            max_texture_size: 4096,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShaderStage::Vertex => write!(f, "vertex"),
            ShaderStage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Failure reported by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The driver raised an error code while executing `operation`.
    Driver { code: u32, operation: &'static str },
    /// A resource handle could not be created.
    Allocation {
        resource: &'static str,
        reason: String,
    },
    ShaderCompile { stage: ShaderStage, log: String },
    ProgramLink { log: String },
}

impl DeviceError {
    /// Human-readable name of the driver error code, if this is a driver error.
    pub fn code_name(&self) -> Option<&'static str> {
        match self {
            DeviceError::Driver { code, .. } => Some(gl_error_name(*code)),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Driver { code, operation } => write!(
                f,
                "{} (0x{:04X}) during {}",
                gl_error_name(*code),
                code,
                operation
            ),
            Self::Allocation { resource, reason } => {
                write!(f, "Failed to allocate {}: {}", resource, reason)
            }
            Self::ShaderCompile { stage, log } => {
                write!(f, "Failed to compile {} shader: {}", stage, log)
            }
            Self::ProgramLink { log } => write!(f, "Failed to link program: {}", log),
        }
    }
}

impl std::error::Error for DeviceError {}

/// Translate an OpenGL error code into its symbolic name.
pub fn gl_error_name(code: u32) -> &'static str {
    match code {
        0x0000 => "GL_NO_ERROR",
        0x0500 => "GL_INVALID_ENUM",
        0x0501 => "GL_INVALID_VALUE",
        0x0502 => "GL_INVALID_OPERATION",
        0x0503 => "GL_STACK_OVERFLOW",
        0x0504 => "GL_STACK_UNDERFLOW",
        0x0505 => "GL_OUT_OF_MEMORY",
        0x0506 => "GL_INVALID_FRAMEBUFFER_OPERATION",
        0x0507 => "GL_CONTEXT_LOST",
        _ => "GL_UNKNOWN_ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_sizes() {
        assert_eq!(PixelFormat::Rgba.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Rgb.bytes_per_pixel(), 3);
        assert_eq!(PixelFormat::Red.bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::RedGreen.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::DepthStencil.bytes_per_pixel(), 4);
    }

    #[test]
    fn test_error_names() {
        assert_eq!(gl_error_name(0x0505), "GL_OUT_OF_MEMORY");
        assert_eq!(gl_error_name(0xBEEF), "GL_UNKNOWN_ERROR");

        let err = DeviceError::Driver {
            code: 0x0505,
            operation: "buffer allocation",
        };
        assert_eq!(err.code_name(), Some("GL_OUT_OF_MEMORY"));
        assert!(err.to_string().contains("GL_OUT_OF_MEMORY"));
    }

    #[test]
    fn test_primitive_sizes() {
        assert_eq!(DrawMode::Triangles.primitive_size(), 3);
        assert_eq!(DrawMode::Lines.primitive_size(), 2);
    }
}
