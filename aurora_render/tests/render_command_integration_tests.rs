//! Integration tests for the RenderCommand facade over the public API
//!
//! Uses the headless backend from null_backend.rs. No GPU required.
//!
//! Run with: cargo test --test render_command_integration_tests


use aurora_render::aurora::{Engine, Error};
use aurora_render::aurora::render::{
    BackendRegistry, BindingModel, BufferElement, BufferLayout, BufferUsage, Config,
    FramebufferSpec, RenderApi, RenderCommand, Renderer, ShaderDataType, ShaderDesc,
    ShaderSource, VertexArray, Viewport,
};
use aurora_render::glam::Mat4;
use null_backend::{drain, Journal, NullShader};
use serial_test::serial;

const VERTEX_SRC: &str = r#"
#version 450
layout(location = 0) in vec3 a_Position;
layout(location = 1) in vec4 a_Color;
layout(std140, binding = 0) uniform Camera { mat4 u_ViewProjection; };
uniform mat4 u_Transform;
void main() {}
"#;

const FRAGMENT_SRC: &str = r#"
#version 450
uniform vec4 u_Tint;
uniform sampler2D u_Texture;
void main() {}
"#;

fn facade() -> (RenderCommand, Journal) {
    let journal = null_backend::journal();
    let mut registry = BackendRegistry::new();
    null_backend::register(&mut registry, RenderApi::OpenGl, BindingModel::Immediate, &journal);
    null_backend::register(&mut registry, RenderApi::Vulkan, BindingModel::Deferred, &journal);
    let mut command = RenderCommand::new(Config::default(), registry, 1280, 720);
    command.initialize_default().unwrap();
    drain(&journal);
    (command, journal)
}

fn quad(command: &mut RenderCommand) -> VertexArray {
    let layout = BufferLayout::new(vec![
        BufferElement::new(ShaderDataType::Float3, "a_Position"),
        BufferElement::new(ShaderDataType::Float4, "a_Color"),
    ]);
    let vertices = vec![0u8; layout.stride() as usize * 4];
    let mut va = command.create_vertex_array().unwrap();
    va.add_vertex_buffer(command.create_vertex_buffer(&vertices, layout, BufferUsage::Static).unwrap()).unwrap();
    va.set_index_buffer(command.create_index_buffer(&[0, 1, 2, 2, 3, 0]).unwrap()).unwrap();
    va
}

fn shader_desc() -> ShaderDesc {
    ShaderDesc { name: "quad".to_string(), source: ShaderSource::glsl(VERTEX_SRC, FRAGMENT_SRC) }
}

// ============================================================================
// FULL FRAME
// ============================================================================

#[test]
fn test_integration_default_config_starts_opengl() {
    let (command, _journal) = facade();
    assert_eq!(command.active_api(), Some(RenderApi::OpenGl));
    assert_eq!(command.epoch(), 0);
}

#[test]
fn test_integration_frame_with_offscreen_pass() {
    let (mut command, journal) = facade();
    let shader = command.create_shader(&shader_desc()).unwrap();
    let va = quad(&mut command);
    let fb = command.create_framebuffer(FramebufferSpec::new(512, 512)).unwrap();
    drain(&journal);

    command.begin_frame().unwrap();
    fb.bind().unwrap();
    fb.clear().unwrap();
    command.submit(shader.as_ref(), &va, None).unwrap();
    fb.unbind().unwrap();
    command.clear().unwrap();
    command.submit(shader.as_ref(), &va, None).unwrap();
    command.end_frame().unwrap();

    assert_eq!(
        drain(&journal),
        vec![
            "bind_framebuffer",
            "clear_framebuffer",
            "bind_vertex_array 2",
            "draw 6",
            "unbind_framebuffer",
            "clear",
            "draw 6",
        ]
    );
    let stats = command.stats().unwrap();
    assert_eq!((stats.frames, stats.draw_calls, stats.indices), (1, 2, 12));
}

#[test]
fn test_integration_shader_reflection_is_merged() {
    let (mut command, _journal) = facade();
    let shader = command.create_shader(&shader_desc()).unwrap();
    let reflection = shader.reflection();

    assert!(reflection.find_uniform_buffer("Camera").is_some());
    assert!(reflection.has_uniform("u_ViewProjection"));
    assert!(reflection.has_uniform("u_Transform"));
    assert!(reflection.has_uniform("u_Tint"));
    assert!(reflection.find_resource("u_Texture").is_some());
}

// ============================================================================
// SWITCH
// ============================================================================

#[test]
fn test_integration_switch_and_recreate() {
    let (mut command, journal) = facade();
    let old_shader = command.create_shader(&shader_desc()).unwrap();
    let old_va = quad(&mut command);

    assert_eq!(command.switch_render_api(RenderApi::Vulkan).unwrap(), 1);
    let commands = drain(&journal);
    assert_eq!(&commands[..2], &["destroy OpenGL", "create Vulkan"]);

    assert!(matches!(
        command.submit(old_shader.as_ref(), &old_va, None),
        Err(Error::StaleResource(_))
    ));

    let shader = command.create_shader(&shader_desc()).unwrap();
    let va = quad(&mut command);
    command.submit(shader.as_ref(), &va, None).unwrap();
    assert_eq!(command.stats().unwrap().draw_calls, 1);

    // Back again: a second epoch
    assert_eq!(command.switch_render_api(RenderApi::OpenGl).unwrap(), 2);
    assert!(!va.is_current());
}

#[test]
fn test_integration_d3d12_is_unavailable() {
    let (mut command, _journal) = facade();
    assert!(matches!(command.switch_render_api(RenderApi::D3d12), Err(Error::BackendUnavailable(_))));
    assert_eq!(command.active_api(), Some(RenderApi::OpenGl));
}

#[test]
fn test_integration_resize_follows_window() {
    let (mut command, journal) = facade();
    command.on_window_resize(800, 600).unwrap();
    assert_eq!(drain(&journal), vec!["viewport 800x600"]);
    assert_eq!(command.context().lock().unwrap().viewport(), Viewport::new(0, 0, 800, 600));
}

// ============================================================================
// SCENE
// ============================================================================

#[test]
fn test_integration_scene_uploads_camera_and_transforms() {
    let (mut command, _journal) = facade();
    let shader = command.create_shader(&shader_desc()).unwrap();
    let va = quad(&mut command);

    let mut scene = Renderer::begin_scene(Mat4::IDENTITY);
    scene.submit(shader.as_ref(), &va, Mat4::IDENTITY);
    scene.submit(shader.as_ref(), &va, Mat4::IDENTITY);
    let stats = Renderer::end_scene(&mut command, scene).unwrap();

    assert_eq!(stats.draws, 2);
    let writes = shader.as_any().downcast_ref::<NullShader>().unwrap().writes.lock().unwrap().clone();
    assert_eq!(writes, vec!["u_ViewProjection", "u_Transform", "u_Transform"]);
}

// ============================================================================
// ENGINE SINGLETON
// ============================================================================

#[test]
#[serial]
fn test_integration_engine_owns_render_command() {
    Engine::initialize().unwrap();
    let (command, _journal) = facade();
    Engine::create_render_command(command).unwrap();

    {
        let shared = Engine::render_command().unwrap();
        let mut command = shared.lock().unwrap();
        command.switch_render_api(RenderApi::Vulkan).unwrap();
        assert_eq!(command.active_api(), Some(RenderApi::Vulkan));
    }

    Engine::shutdown();
    assert!(Engine::render_command().is_err());
}
