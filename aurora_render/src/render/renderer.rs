/// Scene renderer: batches draw submissions between begin_scene and end_scene.
///
/// `end_scene` sorts the queued draws by (shader, vertex array) so that
/// consecutive draws share binds, uploads the camera and per-draw transform
/// uniforms the shader declares, and issues every draw on a backend
/// resolved once for the whole scene.

use glam::Mat4;
use crate::error::Result;
use crate::render::context::ResourceKey;
use crate::render::render_command::RenderCommand;
use crate::render::shader::Shader;
use crate::render::shader_uniform::UniformValue;
use crate::render::vertex_array::VertexArray;
use crate::{engine_trace, engine_warn};

/// Camera uniform written once per shader change
pub const VIEW_PROJECTION_UNIFORM: &str = "u_ViewProjection";
/// Model uniform written once per draw
pub const TRANSFORM_UNIFORM: &str = "u_Transform";

struct DrawItem<'a> {
    shader: &'a dyn Shader,
    vertex_array: &'a VertexArray,
    transform: Mat4,
}

impl DrawItem<'_> {
    fn sort_key(&self) -> (ResourceKey, ResourceKey) {
        (self.shader.resource_key(), self.vertex_array.resource_key())
    }
}

/// Draw queue of one scene
pub struct Scene<'a> {
    view_projection: Mat4,
    draws: Vec<DrawItem<'a>>,
}

impl<'a> Scene<'a> {
    /// Queue a draw of `vertex_array` with `shader` at `transform`
    pub fn submit(&mut self, shader: &'a dyn Shader, vertex_array: &'a VertexArray, transform: Mat4) {
        self.draws.push(DrawItem { shader, vertex_array, transform });
    }

    pub fn view_projection(&self) -> Mat4 {
        self.view_projection
    }

    pub fn len(&self) -> usize {
        self.draws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.draws.is_empty()
    }
}

/// Counters for one `end_scene`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SceneStats {
    pub draws: u32,
    /// Draws dropped for a zero index count
    pub skipped: u32,
    pub shader_switches: u32,
    pub vertex_array_switches: u32,
}

pub struct Renderer;

impl Renderer {
    pub fn begin_scene<'a>(view_projection: Mat4) -> Scene<'a> {
        Scene { view_projection, draws: Vec::new() }
    }

    /// Sort and dispatch the scene
    ///
    /// Every resource is checked against the current epoch before the first
    /// draw, so a stale resource fails the scene without partial output.
    pub fn end_scene(render_command: &mut RenderCommand, scene: Scene<'_>) -> Result<SceneStats> {
        let Scene { view_projection, mut draws } = scene;

        for item in &draws {
            item.vertex_array.ensure_current()?;
            render_command.ensure_live(item.shader.resource_key(), item.shader.name())?;
        }

        // Stable: equal keys keep submission order
        draws.sort_by_key(|item| item.sort_key());

        let backend = render_command.backend_mut()?;
        let mut stats = SceneStats::default();
        let mut current_shader = None;
        let mut current_vertex_array = None;

        for item in &draws {
            let count = item.vertex_array.index_count();
            debug_assert!(count > 0, "scene draw with a zero index count");
            if count == 0 {
                stats.skipped += 1;
                continue;
            }

            let shader_key = item.shader.resource_key();
            if current_shader != Some(shader_key) {
                current_shader = Some(shader_key);
                stats.shader_switches += 1;
                set_matrix_if_declared(item.shader, VIEW_PROJECTION_UNIFORM, view_projection)?;
            }
            let va_key = item.vertex_array.resource_key();
            if current_vertex_array != Some(va_key) {
                current_vertex_array = Some(va_key);
                stats.vertex_array_switches += 1;
            }

            set_matrix_if_declared(item.shader, TRANSFORM_UNIFORM, item.transform)?;
            backend.draw_indexed(item.shader, item.vertex_array, count)?;
            stats.draws += 1;
        }

        if stats.skipped > 0 {
            engine_warn!("aurora::Renderer", "Skipped {} draws with zero index count", stats.skipped);
        }
        engine_trace!("aurora::Renderer", "Scene: {} draws, {} shader switches, {} vertex array switches",
            stats.draws, stats.shader_switches, stats.vertex_array_switches);
        Ok(stats)
    }
}

/// Write a matrix uniform when the shader declares it
fn set_matrix_if_declared(shader: &dyn Shader, name: &str, value: Mat4) -> Result<bool> {
    if !shader.reflection().has_uniform(name) {
        return Ok(false);
    }
    shader.set_uniform(name, &UniformValue::Mat4(value))?;
    Ok(true)
}

#[cfg(test)]
#[path = "renderer_tests.rs"]
mod tests;
