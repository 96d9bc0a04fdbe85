use glam::{Mat4, Vec3};
use crate::error::Error;
use crate::render::buffer::BufferUsage;
use crate::render::buffer_layout::{BufferElement, BufferLayout, ShaderDataType};
use crate::render::config::Config;
use crate::render::context::BindingModel;
use crate::render::mock_backend::{self, CommandLog, MockBackend, MockShader};
use crate::render::render_api::{BackendRegistry, RenderApi};
use crate::render::render_command::RenderCommand;
use crate::render::renderer::{Renderer, SceneStats};
use crate::render::shader::{Shader, ShaderDesc, ShaderSource};
use crate::render::shader_uniform::UniformValue;
use crate::render::vertex_array::VertexArray;

const VERTEX_SRC: &str = r#"
layout(std140) uniform Camera { mat4 u_ViewProjection; };
uniform mat4 u_Transform;
void main() {}
"#;

const PLAIN_SRC: &str = "void main() {}";

fn setup() -> (RenderCommand, CommandLog) {
    let log = mock_backend::new_log();
    let mut registry = BackendRegistry::new();
    registry.register(RenderApi::OpenGl, MockBackend::factory(RenderApi::OpenGl, BindingModel::Immediate, &log));
    registry.register(RenderApi::Vulkan, MockBackend::factory(RenderApi::Vulkan, BindingModel::Deferred, &log));
    let mut command = RenderCommand::new(Config::default(), registry, 800, 600);
    command.initialize(RenderApi::OpenGl).unwrap();
    (command, log)
}

fn shader(command: &mut RenderCommand, name: &str, vertex: &str) -> Box<dyn Shader> {
    command
        .create_shader(&ShaderDesc { name: name.to_string(), source: ShaderSource::glsl(vertex, PLAIN_SRC) })
        .unwrap()
}

fn triangle(command: &mut RenderCommand) -> VertexArray {
    let layout = BufferLayout::new(vec![BufferElement::new(ShaderDataType::Float3, "Position")]);
    let mut va = command.create_vertex_array().unwrap();
    va.add_vertex_buffer(command.create_vertex_buffer(&[0; 36], layout, BufferUsage::Static).unwrap()).unwrap();
    va.set_index_buffer(command.create_index_buffer(&[0, 1, 2]).unwrap()).unwrap();
    va
}

fn draws(log: &CommandLog) -> Vec<String> {
    mock_backend::take(log)
        .into_iter()
        .filter(|c| c.starts_with("draw") || c.contains(".set "))
        .collect()
}

#[test]
fn test_end_scene_sorts_and_counts_switches() {
    let (mut command, log) = setup();
    let lit = shader(&mut command, "lit", VERTEX_SRC);
    let flat = shader(&mut command, "flat", VERTEX_SRC);
    let a = triangle(&mut command);
    let b = triangle(&mut command);
    mock_backend::take(&log);

    let mut scene = Renderer::begin_scene(Mat4::IDENTITY);
    scene.submit(flat.as_ref(), &a, Mat4::IDENTITY);
    scene.submit(lit.as_ref(), &b, Mat4::IDENTITY);
    scene.submit(flat.as_ref(), &b, Mat4::IDENTITY);
    scene.submit(lit.as_ref(), &a, Mat4::IDENTITY);
    assert_eq!(scene.len(), 4);

    let stats = Renderer::end_scene(&mut command, scene).unwrap();

    assert_eq!(stats, SceneStats { draws: 4, skipped: 0, shader_switches: 2, vertex_array_switches: 4 });
    assert_eq!(command.stats().unwrap().draw_calls, 4);
}

#[test]
fn test_end_scene_is_stable_for_equal_keys() {
    let (mut command, _log) = setup();
    let lit = shader(&mut command, "lit", VERTEX_SRC);
    let va = triangle(&mut command);

    let first = Mat4::from_translation(Vec3::X);
    let second = Mat4::from_translation(Vec3::Y);
    let mut scene = Renderer::begin_scene(Mat4::IDENTITY);
    scene.submit(lit.as_ref(), &va, first);
    scene.submit(lit.as_ref(), &va, second);
    Renderer::end_scene(&mut command, scene).unwrap();

    let mock = lit.as_any().downcast_ref::<MockShader>().unwrap();
    let transforms: Vec<Mat4> = mock
        .values
        .lock()
        .unwrap()
        .iter()
        .filter(|(name, _)| name == "u_Transform")
        .map(|(_, value)| match value {
            UniformValue::Mat4(m) => *m,
            other => panic!("unexpected value {:?}", other),
        })
        .collect();
    assert_eq!(transforms, vec![first, second]);
}

#[test]
fn test_camera_uniform_written_once_per_shader() {
    let (mut command, log) = setup();
    let lit = shader(&mut command, "lit", VERTEX_SRC);
    let va = triangle(&mut command);
    mock_backend::take(&log);

    let view_projection = Mat4::from_scale(Vec3::splat(2.0));
    let mut scene = Renderer::begin_scene(view_projection);
    scene.submit(lit.as_ref(), &va, Mat4::IDENTITY);
    scene.submit(lit.as_ref(), &va, Mat4::IDENTITY);
    Renderer::end_scene(&mut command, scene).unwrap();

    assert_eq!(
        draws(&log),
        vec![
            "shader1.set u_ViewProjection",
            "shader1.set u_Transform",
            "draw 3",
            "shader1.set u_Transform",
            "draw 3",
        ]
    );
}

#[test]
fn test_undeclared_uniforms_are_not_written() {
    let (mut command, log) = setup();
    let plain = shader(&mut command, "plain", PLAIN_SRC);
    let va = triangle(&mut command);
    mock_backend::take(&log);

    let mut scene = Renderer::begin_scene(Mat4::IDENTITY);
    scene.submit(plain.as_ref(), &va, Mat4::IDENTITY);
    Renderer::end_scene(&mut command, scene).unwrap();

    assert_eq!(draws(&log), vec!["draw 3"]);
}

#[test]
fn test_stale_resource_fails_whole_scene() {
    let (mut command, log) = setup();
    let lit = shader(&mut command, "lit", VERTEX_SRC);
    let va = triangle(&mut command);
    command.switch_render_api(RenderApi::Vulkan).unwrap();
    let fresh = triangle(&mut command);
    mock_backend::take(&log);

    let mut scene = Renderer::begin_scene(Mat4::IDENTITY);
    scene.submit(lit.as_ref(), &fresh, Mat4::IDENTITY);
    scene.submit(lit.as_ref(), &va, Mat4::IDENTITY);
    let result = Renderer::end_scene(&mut command, scene);

    assert!(matches!(result, Err(Error::StaleResource(_))));
    assert!(draws(&log).is_empty());
}

#[test]
fn test_empty_scene() {
    let (mut command, _log) = setup();
    let scene = Renderer::begin_scene(Mat4::IDENTITY);
    assert!(scene.is_empty());
    assert_eq!(Renderer::end_scene(&mut command, scene).unwrap(), SceneStats::default());
}
