/// Backend selection and the backend plugin surface.
///
/// A backend crate implements `RenderBackend` and registers a factory for
/// its `RenderApi` in a `BackendRegistry`. The RenderCommand facade builds
/// the active backend through that registry and re-builds it on a switch.

use std::fmt;
use rustc_hash::FxHashMap;
use crate::error::{Error, Result};
use crate::render::buffer::{BufferUsage, IndexBuffer, UniformBuffer, VertexBuffer};
use crate::render::buffer_layout::BufferLayout;
use crate::render::config::Config;
use crate::render::context::{BindingModel, SharedContext, Viewport};
use crate::render::framebuffer::{Framebuffer, FramebufferSpec};
use crate::render::shader::{Shader, ShaderDesc};
use crate::render::texture::{PixelBuffer, Texture};
use crate::render::vertex_array::VertexArray;
use crate::engine_debug;

// ===== RENDER API =====

/// Native graphics API behind the facade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderApi {
    #[default]
    OpenGl,
    Vulkan,
    /// Selectable, but no backend plugin ships for it
    D3d12,
}

impl RenderApi {
    pub const ALL: [RenderApi; 3] = [RenderApi::OpenGl, RenderApi::Vulkan, RenderApi::D3d12];

    pub fn name(&self) -> &'static str {
        match self {
            RenderApi::OpenGl => "OpenGL",
            RenderApi::Vulkan => "Vulkan",
            RenderApi::D3d12 => "D3D12",
        }
    }

    /// Case-insensitive parse of `name()` values
    pub fn from_name(name: &str) -> Option<Self> {
        RenderApi::ALL
            .into_iter()
            .find(|api| api.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for RenderApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ===== STATS =====

/// Per-backend counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RendererStats {
    pub frames: u64,
    pub draw_calls: u64,
    pub indices: u64,
    /// Native pipeline or program changes
    pub pipeline_binds: u64,
}

// ===== BACKEND TRAIT =====

/// One native graphics backend
///
/// Created by a registry factory with the shared render context. Every
/// resource it creates registers itself in that context.
pub trait RenderBackend: Send + Sync {
    fn api(&self) -> RenderApi;

    fn binding_model(&self) -> BindingModel;

    // ===== RESOURCE FACTORIES =====

    fn create_vertex_buffer(&mut self, data: &[u8], layout: BufferLayout, usage: BufferUsage)
        -> Result<Box<dyn VertexBuffer>>;

    fn create_index_buffer(&mut self, indices: &[u32]) -> Result<Box<dyn IndexBuffer>>;

    fn create_uniform_buffer(&mut self, name: &str, size: u64) -> Result<Box<dyn UniformBuffer>>;

    fn create_vertex_array(&mut self) -> Result<VertexArray>;

    fn create_framebuffer(&mut self, spec: FramebufferSpec) -> Result<Framebuffer>;

    fn create_texture(&mut self, pixels: &PixelBuffer) -> Result<Box<dyn Texture>>;

    fn create_shader(&mut self, desc: &ShaderDesc) -> Result<Box<dyn Shader>>;

    // ===== PIPELINE STATE =====

    fn set_clear_color(&mut self, color: [f32; 4]) -> Result<()>;

    /// Clear the current target (bound framebuffer or window)
    fn clear(&mut self) -> Result<()>;

    fn set_depth_testing(&mut self, enabled: bool) -> Result<()>;

    fn set_blend(&mut self, enabled: bool) -> Result<()>;

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    // ===== DRAWING =====

    /// Draw `index_count` indices of `vertex_array` with `shader`
    fn draw_indexed(&mut self, shader: &dyn Shader, vertex_array: &VertexArray, index_count: u32) -> Result<()>;

    // ===== FRAME / LIFECYCLE =====

    fn begin_frame(&mut self) -> Result<()>;

    fn end_frame(&mut self) -> Result<()>;

    /// Window (default framebuffer) size changed
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    /// Block until the GPU has finished all submitted work
    fn wait_idle(&mut self) -> Result<()>;

    fn stats(&self) -> RendererStats;
}

// ===== REGISTRY =====

/// Factory building a backend for one API
pub type BackendFactory = Box<dyn Fn(&Config, SharedContext) -> Result<Box<dyn RenderBackend>> + Send + Sync>;

/// Maps each API to the factory of its backend plugin
#[derive(Default)]
pub struct BackendRegistry {
    factories: FxHashMap<RenderApi, BackendFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `api`
    pub fn register<F>(&mut self, api: RenderApi, factory: F)
    where
        F: Fn(&Config, SharedContext) -> Result<Box<dyn RenderBackend>> + Send + Sync + 'static,
    {
        engine_debug!("aurora::BackendRegistry", "Registered backend factory for {}", api);
        self.factories.insert(api, Box::new(factory));
    }

    pub fn is_registered(&self, api: RenderApi) -> bool {
        self.factories.contains_key(&api)
    }

    /// Registered APIs in `RenderApi::ALL` order
    pub fn available(&self) -> Vec<RenderApi> {
        RenderApi::ALL
            .into_iter()
            .filter(|api| self.factories.contains_key(api))
            .collect()
    }

    /// Build the backend for `api`
    ///
    /// Fails with `Error::BackendUnavailable` when no plugin is registered.
    pub fn build(&self, api: RenderApi, config: &Config, context: SharedContext) -> Result<Box<dyn RenderBackend>> {
        let Some(factory) = self.factories.get(&api) else {
            return Err(Error::BackendUnavailable(format!("No backend registered for {}", api)));
        };
        factory(config, context)
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
#[path = "render_api_tests.rs"]
mod tests;
