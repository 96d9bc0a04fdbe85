//! Integration tests for the Vulkan backend through RenderCommand
//!
//! All tests require a GPU and a display and are marked with #[ignore].
//!
//! Run with: cargo test -p aurora_render_vulkan --test vulkan_backend_tests -- --ignored

use std::sync::{Arc, OnceLock};
use aurora_render::aurora::Error;
use aurora_render::aurora::render::{
    BackendRegistry, BufferElement, BufferLayout, BufferUsage, Config, FramebufferSpec, PixelBuffer, RenderApi,
    RenderCommand, ShaderDataType, ShaderDesc, ShaderSource, UniformValue, VertexArray,
};
use aurora_render::glam::{Mat4, Vec4};
use serial_test::serial;
use winit::event_loop::EventLoop;
use winit::window::Window;

const VERTEX: &str = r#"
#version 330 core
layout(location = 0) in vec3 a_Position;
layout(location = 1) in vec2 a_TexCoord;

layout(std140) uniform Camera
{
    mat4 u_ViewProjection;
};

uniform mat4 u_Transform;

out vec2 v_TexCoord;

void main()
{
    v_TexCoord = a_TexCoord;
    gl_Position = u_ViewProjection * u_Transform * vec4(a_Position, 1.0);
}
"#;

const FRAGMENT: &str = r#"
#version 330 core
layout(location = 0) out vec4 color;

in vec2 v_TexCoord;

uniform vec4 u_Color;
uniform sampler2D u_Texture;

void main()
{
    color = texture(u_Texture, v_TexCoord) * u_Color;
}
"#;

/// The event loop can only be created once per process; it is leaked to
/// keep the window valid
#[allow(deprecated)]
fn test_window() -> Arc<Window> {
    static WINDOW: OnceLock<Arc<Window>> = OnceLock::new();
    WINDOW
        .get_or_init(|| {
            let event_loop = EventLoop::new().unwrap();
            let attributes = Window::default_attributes()
                .with_title("Aurora Vulkan Test")
                .with_inner_size(winit::dpi::PhysicalSize::new(320, 240))
                .with_visible(false);
            let window = event_loop.create_window(attributes).unwrap();
            std::mem::forget(event_loop);
            Arc::new(window)
        })
        .clone()
}

fn vulkan_command() -> RenderCommand {
    let window = test_window();
    let mut registry = BackendRegistry::new();
    aurora_render_vulkan::register(&mut registry, window.clone());

    let size = window.inner_size();
    let config = Config { enable_validation: true, ..Config::default() };
    let mut render_command = RenderCommand::new(config, registry, size.width, size.height);
    render_command.initialize(RenderApi::Vulkan).unwrap();
    render_command
}

fn quad(render_command: &mut RenderCommand) -> VertexArray {
    #[rustfmt::skip]
    let vertices: [f32; 20] = [
        -0.5, -0.5, 0.0, 0.0, 0.0,
         0.5, -0.5, 0.0, 1.0, 0.0,
         0.5,  0.5, 0.0, 1.0, 1.0,
        -0.5,  0.5, 0.0, 0.0, 1.0,
    ];
    let layout = BufferLayout::new(vec![
        BufferElement::new(ShaderDataType::Float3, "a_Position"),
        BufferElement::new(ShaderDataType::Float2, "a_TexCoord"),
    ]);
    let vertex_buffer = render_command
        .create_vertex_buffer(bytemuck::cast_slice(&vertices), layout, BufferUsage::Static)
        .unwrap();
    let index_buffer = render_command.create_index_buffer(&[0, 1, 2, 2, 3, 0]).unwrap();

    let mut vertex_array = render_command.create_vertex_array().unwrap();
    vertex_array.add_vertex_buffer(vertex_buffer).unwrap();
    vertex_array.set_index_buffer(index_buffer).unwrap();
    vertex_array
}

fn textured_shader_desc() -> ShaderDesc {
    ShaderDesc {
        name: "textured".to_string(),
        source: ShaderSource::Glsl { vertex: VERTEX.to_string(), fragment: FRAGMENT.to_string() },
    }
}

// ============================================================================
// DRAWING
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_draw_frames() {
    let mut render_command = vulkan_command();
    assert_eq!(render_command.active_api(), Some(RenderApi::Vulkan));

    let vertex_array = quad(&mut render_command);
    let shader = render_command.create_shader(&textured_shader_desc()).unwrap();
    shader.set_uniform("u_ViewProjection", &UniformValue::Mat4(Mat4::IDENTITY)).unwrap();
    shader.set_uniform("u_Transform", &UniformValue::Mat4(Mat4::IDENTITY)).unwrap();
    shader.set_uniform("u_Color", &UniformValue::Vec4(Vec4::new(1.0, 0.5, 0.25, 1.0))).unwrap();

    render_command.set_clear_color([0.1, 0.1, 0.1, 1.0]).unwrap();
    for _ in 0..3 {
        render_command.begin_frame().unwrap();
        render_command.clear().unwrap();
        render_command.submit(shader.as_ref(), &vertex_array, None).unwrap();
        render_command.end_frame().unwrap();
    }

    let stats = render_command.stats().unwrap();
    assert_eq!(stats.frames, 3);
    assert_eq!(stats.draw_calls, 3);
    assert_eq!(stats.indices, 18);
    assert!(stats.pipeline_binds >= 1);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_textures_and_uniform_buffer() {
    let mut render_command = vulkan_command();
    let vertex_array = quad(&mut render_command);
    let shader = render_command.create_shader(&textured_shader_desc()).unwrap();
    shader.set_uniform("u_Transform", &UniformValue::Mat4(Mat4::IDENTITY)).unwrap();
    shader.set_uniform("u_Color", &UniformValue::Vec4(Vec4::ONE)).unwrap();
    shader.set_uniform("u_Texture", &UniformValue::Int(1)).unwrap();

    let texture = render_command.create_texture(&PixelBuffer::solid(4, 4, [255, 0, 0, 255])).unwrap();
    let mut camera = render_command.create_uniform_buffer("Camera", 64).unwrap();
    camera.set_data(0, bytemuck::cast_slice(&Mat4::IDENTITY.to_cols_array())).unwrap();

    render_command.begin_frame().unwrap();
    texture.bind(1).unwrap();
    camera.bind(0).unwrap();
    render_command.submit(shader.as_ref(), &vertex_array, None).unwrap();
    render_command.end_frame().unwrap();
    assert_eq!(render_command.stats().unwrap().draw_calls, 1);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_spirv_shader() {
    let mut render_command = vulkan_command();
    let program = aurora_render_vulkan::aurora::vulkan::build_glsl_program("precompiled", VERTEX, FRAGMENT).unwrap();
    let desc = ShaderDesc {
        name: "precompiled".to_string(),
        source: ShaderSource::SpirV { vertex: program.vertex, fragment: program.fragment },
    };
    let shader = render_command.create_shader(&desc).unwrap();
    assert_eq!(shader.reflection().uniform_buffers.len(), 3);
}

// ============================================================================
// FRAMEBUFFERS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_offscreen_framebuffer() {
    let mut render_command = vulkan_command();
    let vertex_array = quad(&mut render_command);
    let shader = render_command.create_shader(&textured_shader_desc()).unwrap();

    let mut framebuffer = render_command.create_framebuffer(FramebufferSpec::new(128, 64)).unwrap();
    render_command.set_depth_testing(true).unwrap();

    render_command.begin_frame().unwrap();
    framebuffer.bind().unwrap();
    framebuffer.set_clear_color([0.0, 0.0, 1.0, 1.0]).unwrap();
    framebuffer.clear().unwrap();
    render_command.submit(shader.as_ref(), &vertex_array, None).unwrap();
    framebuffer.unbind().unwrap();

    framebuffer.bind_color_attachment(0).unwrap();
    render_command.submit(shader.as_ref(), &vertex_array, None).unwrap();
    render_command.end_frame().unwrap();

    framebuffer.resize(256, 256).unwrap();
    render_command.begin_frame().unwrap();
    framebuffer.bind().unwrap();
    render_command.submit(shader.as_ref(), &vertex_array, None).unwrap();
    framebuffer.unbind().unwrap();
    render_command.end_frame().unwrap();

    assert_eq!(render_command.stats().unwrap().draw_calls, 3);
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_resize_and_minimize() {
    let mut render_command = vulkan_command();
    render_command.on_window_resize(200, 100).unwrap();
    render_command.begin_frame().unwrap();
    render_command.clear().unwrap();
    render_command.end_frame().unwrap();

    // Minimized: recorded but not forwarded to the backend
    render_command.on_window_resize(0, 0).unwrap();
    render_command.begin_frame().unwrap();
    render_command.end_frame().unwrap();
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_switch_to_d3d12_is_unavailable() {
    let mut render_command = vulkan_command();
    let vertex_array = quad(&mut render_command);

    let result = render_command.switch_render_api(RenderApi::D3d12);
    assert!(matches!(result, Err(Error::BackendUnavailable(_))));
    assert_eq!(render_command.active_api(), Some(RenderApi::Vulkan));
    assert!(vertex_array.is_current());
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_vulkan_teardown_makes_resources_stale() {
    let mut render_command = vulkan_command();
    let vertex_array = quad(&mut render_command);
    render_command.teardown_context().unwrap();

    assert!(!vertex_array.is_current());
    assert!(matches!(vertex_array.bind(), Err(Error::StaleResource(_))));
}
