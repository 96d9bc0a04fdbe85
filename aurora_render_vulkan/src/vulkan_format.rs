/// Conversions between aurora render types and Vulkan enums

use ash::vk;
use aurora_render::aurora::render::{ShaderDataType, ShaderStageFlags, TextureFormat, VertexAttribute};

/// Vertex input format of one attribute location
///
/// Matrix attributes arrive one column per location, so the format is
/// picked from the components fed at that location.
pub fn attribute_format(attribute: &VertexAttribute) -> vk::Format {
    vertex_format(attribute.data_type, attribute.components, attribute.normalized)
}

pub fn vertex_format(data_type: ShaderDataType, components: u32, normalized: bool) -> vk::Format {
    if data_type == ShaderDataType::Bool {
        return if normalized { vk::Format::R8_UNORM } else { vk::Format::R8_UINT };
    }
    if data_type.is_integer() {
        return match components {
            1 => vk::Format::R32_SINT,
            2 => vk::Format::R32G32_SINT,
            3 => vk::Format::R32G32B32_SINT,
            _ => vk::Format::R32G32B32A32_SINT,
        };
    }
    match components {
        1 => vk::Format::R32_SFLOAT,
        2 => vk::Format::R32G32_SFLOAT,
        3 => vk::Format::R32G32B32_SFLOAT,
        _ => vk::Format::R32G32B32A32_SFLOAT,
    }
}

/// Image format of a texture or attachment
pub fn texture_format(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::Rgba8 => vk::Format::R8G8B8A8_UNORM,
        // Three-channel images are expanded to RGBA on upload
        TextureFormat::Rgb8 => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::R8 => vk::Format::R8_UNORM,
        TextureFormat::Bgra8 => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::Depth24Stencil8 => vk::Format::D24_UNORM_S8_UINT,
        TextureFormat::Depth32F => vk::Format::D32_SFLOAT,
    }
}

/// Aspect of a whole image of `format`
pub fn aspect_mask(format: TextureFormat) -> vk::ImageAspectFlags {
    match format {
        TextureFormat::Depth24Stencil8 => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
        TextureFormat::Depth32F => vk::ImageAspectFlags::DEPTH,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Bytes per pixel as uploaded (RGB is padded to RGBA)
pub fn upload_bytes_per_pixel(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::Rgb8 => 4,
        other => other.bytes_per_pixel(),
    }
}

/// Expand tightly packed RGB to RGBA with opaque alpha
pub fn expand_rgb_to_rgba(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 3 * 4);
    for pixel in data.chunks_exact(3) {
        out.extend_from_slice(pixel);
        out.push(u8::MAX);
    }
    out
}

pub fn shader_stages(stage: ShaderStageFlags) -> vk::ShaderStageFlags {
    let mut flags = vk::ShaderStageFlags::empty();
    if stage.contains(ShaderStageFlags::VERTEX) {
        flags |= vk::ShaderStageFlags::VERTEX;
    }
    if stage.contains(ShaderStageFlags::FRAGMENT) {
        flags |= vk::ShaderStageFlags::FRAGMENT;
    }
    flags
}

pub fn clear_color_value(color: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue { float32: color },
    }
}

pub fn clear_depth_value() -> vk::ClearValue {
    vk::ClearValue {
        depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
    }
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
