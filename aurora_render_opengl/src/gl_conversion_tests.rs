//! Unit tests for GL enum conversions (no context required)

use super::*;

#[test]
fn test_attribute_type_float_and_matrix() {
    assert_eq!(attribute_type(ShaderDataType::Float3), glow::FLOAT);
    assert_eq!(attribute_type(ShaderDataType::Mat4), glow::FLOAT);
}

#[test]
fn test_attribute_type_integers() {
    assert_eq!(attribute_type(ShaderDataType::Int2), glow::INT);
    assert_eq!(attribute_type(ShaderDataType::Bool), glow::UNSIGNED_BYTE);
}

#[test]
fn test_buffer_usage() {
    assert_eq!(buffer_usage(BufferUsage::Static), glow::STATIC_DRAW);
    assert_eq!(buffer_usage(BufferUsage::Dynamic), glow::DYNAMIC_DRAW);
}

#[test]
fn test_color_formats() {
    assert_eq!(texture_format(TextureFormat::Rgba8), Some((glow::RGBA8 as i32, glow::RGBA, glow::UNSIGNED_BYTE)));
    assert_eq!(texture_format(TextureFormat::R8).map(|f| f.1), Some(glow::RED));
    assert_eq!(texture_format(TextureFormat::Bgra8).map(|f| f.1), Some(glow::BGRA));
    assert_eq!(texture_format(TextureFormat::Depth32F), None);
}

#[test]
fn test_depth_formats() {
    assert_eq!(
        depth_format(TextureFormat::Depth24Stencil8),
        Some((glow::DEPTH24_STENCIL8, glow::DEPTH_STENCIL_ATTACHMENT))
    );
    assert_eq!(depth_format(TextureFormat::Depth32F).map(|f| f.1), Some(glow::DEPTH_ATTACHMENT));
    assert_eq!(depth_format(TextureFormat::Rgba8), None);
}

#[test]
fn test_unpack_alignment_for_odd_rows() {
    assert_eq!(unpack_alignment(TextureFormat::Rgba8, 3), 4);
    assert_eq!(unpack_alignment(TextureFormat::Rgb8, 3), 1);
    assert_eq!(unpack_alignment(TextureFormat::Rgb8, 4), 4);
    assert_eq!(unpack_alignment(TextureFormat::R8, 5), 1);
}

#[test]
fn test_error_names() {
    assert_eq!(error_name(glow::OUT_OF_MEMORY), "GL_OUT_OF_MEMORY");
    assert_eq!(error_name(0xFFFF), "unknown GL error");
    assert_eq!(framebuffer_status_name(glow::FRAMEBUFFER_COMPLETE), "complete");
}
