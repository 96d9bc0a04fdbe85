/// Conversions from render API enums to GL constants

use aurora_render::aurora::render::{BufferUsage, ShaderDataType, TextureFormat};

/// Component type handed to `vertex_attrib_pointer_*`
pub fn attribute_type(data_type: ShaderDataType) -> u32 {
    match data_type {
        ShaderDataType::Float
        | ShaderDataType::Float2
        | ShaderDataType::Float3
        | ShaderDataType::Float4
        | ShaderDataType::Mat3
        | ShaderDataType::Mat4 => glow::FLOAT,
        ShaderDataType::Int | ShaderDataType::Int2 | ShaderDataType::Int3 | ShaderDataType::Int4 => glow::INT,
        ShaderDataType::Bool => glow::UNSIGNED_BYTE,
    }
}

pub fn buffer_usage(usage: BufferUsage) -> u32 {
    match usage {
        BufferUsage::Static => glow::STATIC_DRAW,
        BufferUsage::Dynamic => glow::DYNAMIC_DRAW,
    }
}

/// (internal format, pixel format, pixel type) of a color texture
///
/// None for depth formats, which are renderbuffers.
pub fn texture_format(format: TextureFormat) -> Option<(i32, u32, u32)> {
    match format {
        TextureFormat::Rgba8 => Some((glow::RGBA8 as i32, glow::RGBA, glow::UNSIGNED_BYTE)),
        TextureFormat::Rgb8 => Some((glow::RGB8 as i32, glow::RGB, glow::UNSIGNED_BYTE)),
        TextureFormat::R8 => Some((glow::R8 as i32, glow::RED, glow::UNSIGNED_BYTE)),
        TextureFormat::Bgra8 => Some((glow::RGBA8 as i32, glow::BGRA, glow::UNSIGNED_BYTE)),
        TextureFormat::Depth24Stencil8 | TextureFormat::Depth32F => None,
    }
}

/// (renderbuffer storage, attachment point) of a depth format
pub fn depth_format(format: TextureFormat) -> Option<(u32, u32)> {
    match format {
        TextureFormat::Depth24Stencil8 => Some((glow::DEPTH24_STENCIL8, glow::DEPTH_STENCIL_ATTACHMENT)),
        TextureFormat::Depth32F => Some((glow::DEPTH_COMPONENT32F, glow::DEPTH_ATTACHMENT)),
        _ => None,
    }
}

/// Row alignment for `UNPACK_ALIGNMENT`
pub fn unpack_alignment(format: TextureFormat, width: u32) -> i32 {
    let row = format.bytes_per_pixel() * width;
    if row % 4 == 0 {
        4
    } else {
        1
    }
}

pub fn error_name(code: u32) -> &'static str {
    match code {
        glow::INVALID_ENUM => "GL_INVALID_ENUM",
        glow::INVALID_VALUE => "GL_INVALID_VALUE",
        glow::INVALID_OPERATION => "GL_INVALID_OPERATION",
        glow::INVALID_FRAMEBUFFER_OPERATION => "GL_INVALID_FRAMEBUFFER_OPERATION",
        glow::OUT_OF_MEMORY => "GL_OUT_OF_MEMORY",
        _ => "unknown GL error",
    }
}

pub fn framebuffer_status_name(status: u32) -> &'static str {
    match status {
        glow::FRAMEBUFFER_COMPLETE => "complete",
        glow::FRAMEBUFFER_INCOMPLETE_ATTACHMENT => "incomplete attachment",
        glow::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT => "missing attachment",
        glow::FRAMEBUFFER_UNSUPPORTED => "unsupported",
        glow::FRAMEBUFFER_INCOMPLETE_MULTISAMPLE => "incomplete multisample",
        _ => "unknown status",
    }
}

#[cfg(test)]
#[path = "gl_conversion_tests.rs"]
mod tests;
