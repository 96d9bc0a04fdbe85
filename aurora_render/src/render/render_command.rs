/// RenderCommand: the stable entry point over the active backend.
///
/// State machine:
///   Unavailable --initialize/build_context--> Active(api)
///   Active(a) --switch_render_api(b)--> teardown_context --> build_context(b)
///   build_context failure --> Unavailable (until a later successful switch)
///
/// Every switch ends in `RenderContext::invalidate_all`, which bumps the
/// epoch. Resources created before the switch fail with
/// `Error::StaleResource` from then on; the caller recreates them.

use winit::event::WindowEvent;
use crate::error::{Error, Result};
use crate::render::buffer::{BufferUsage, IndexBuffer, UniformBuffer, VertexBuffer};
use crate::render::buffer_layout::BufferLayout;
use crate::render::config::Config;
use crate::render::context::{lock_context, BindingModel, RenderContext, ResourceKey, SharedContext, Viewport};
use crate::render::framebuffer::{Framebuffer, FramebufferSpec};
use crate::render::render_api::{BackendRegistry, RenderApi, RenderBackend, RendererStats};
use crate::render::shader::{Shader, ShaderDesc};
use crate::render::texture::{PixelBuffer, Texture};
use crate::render::vertex_array::VertexArray;
use crate::{engine_bail_warn, engine_debug, engine_error, engine_info, engine_warn};

/// Pipeline state re-applied to a freshly built backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineState {
    pub clear_color: [f32; 4],
    pub depth_testing: bool,
    pub blend: bool,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            depth_testing: false,
            blend: false,
        }
    }
}

pub struct RenderCommand {
    registry: BackendRegistry,
    config: Config,
    context: SharedContext,
    backend: Option<Box<dyn RenderBackend>>,
    state: PipelineState,
}

impl RenderCommand {
    /// Create an unavailable facade; call `initialize` to build a backend
    pub fn new(config: Config, registry: BackendRegistry, window_width: u32, window_height: u32) -> Self {
        let context = RenderContext::new(BindingModel::Immediate, window_width, window_height).into_shared();
        Self {
            registry,
            config,
            context,
            backend: None,
            state: PipelineState::default(),
        }
    }

    /// Build the first backend
    pub fn initialize(&mut self, api: RenderApi) -> Result<()> {
        if let Some(active) = self.active_api() {
            engine_bail_warn!("aurora::RenderCommand",
                "Already initialized with {}; use switch_render_api", active);
        }
        self.build_context(api)
    }

    /// Build the backend named by `Config::initial_api`
    pub fn initialize_default(&mut self) -> Result<()> {
        self.initialize(self.config.initial_api)
    }

    // ===== ACCESSORS =====

    pub fn active_api(&self) -> Option<RenderApi> {
        self.backend.as_ref().map(|b| b.api())
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Current epoch: bumped by every switch, resources from older epochs are stale
    pub fn epoch(&self) -> u64 {
        self.context.lock().map(|ctx| ctx.epoch()).unwrap_or(0)
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry_mut(&mut self) -> &mut BackendRegistry {
        &mut self.registry
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.state
    }

    pub fn stats(&self) -> Option<RendererStats> {
        self.backend.as_ref().map(|b| b.stats())
    }

    /// Active backend, resolved once by callers that issue many draws
    pub fn backend_mut(&mut self) -> Result<&mut dyn RenderBackend> {
        match self.backend.as_deref_mut() {
            Some(backend) => Ok(backend),
            None => Err(Error::BackendUnavailable("No active render backend".to_string())),
        }
    }

    /// Fail with `Error::StaleResource` unless `key` is live in the current epoch
    pub fn ensure_live(&self, key: ResourceKey, what: &str) -> Result<()> {
        let ctx = lock_context(&self.context)?;
        if !ctx.is_live(key) {
            return Err(Error::StaleResource(format!(
                "{} is not live in epoch {}", what, ctx.epoch()
            )));
        }
        Ok(())
    }

    // ===== BACKEND SWITCH =====

    /// Switch to `target`, returning the new epoch
    ///
    /// Switching to the active API is a no-op. An unregistered target fails
    /// before anything is torn down.
    pub fn switch_render_api(&mut self, target: RenderApi) -> Result<u64> {
        if self.active_api() == Some(target) {
            engine_debug!("aurora::RenderCommand", "{} already active", target);
            return Ok(self.epoch());
        }
        if !self.registry.is_registered(target) {
            engine_warn!("aurora::RenderCommand", "No backend registered for {}", target);
            return Err(Error::BackendUnavailable(format!("No backend registered for {}", target)));
        }

        let previous = self.active_api();
        let epoch = self.teardown_context()?;
        self.build_context(target)?;

        engine_info!("aurora::RenderCommand", "Switched render API {} -> {} (epoch {})",
            previous.map_or("none", |api| api.name()), target, epoch);
        Ok(epoch)
    }

    /// Phase 1: wait for the GPU, destroy the backend and invalidate every resource
    ///
    /// Returns the new epoch.
    pub fn teardown_context(&mut self) -> Result<u64> {
        if let Some(mut backend) = self.backend.take() {
            if let Err(e) = backend.wait_idle() {
                engine_warn!("aurora::RenderCommand", "wait_idle before teardown failed: {}", e);
            }
            engine_debug!("aurora::RenderCommand", "Tearing down {}", backend.api());
            drop(backend);
        }

        let mut ctx = lock_context(&self.context)?;
        let leaked = ctx.live_count();
        if leaked > 0 {
            engine_debug!("aurora::RenderCommand",
                "{} resources still alive at teardown are now stale", leaked);
        }
        Ok(ctx.invalidate_all())
    }

    /// Phase 2: build the backend for `api` and re-apply the cached pipeline state
    ///
    /// On failure the facade stays unavailable.
    pub fn build_context(&mut self, api: RenderApi) -> Result<()> {
        if let Some(active) = self.active_api() {
            engine_bail_warn!("aurora::RenderCommand",
                "Cannot build {} while {} is active; tear down first", api, active);
        }
        let backend = match self.registry.build(api, &self.config, self.context.clone()) {
            Ok(backend) => backend,
            Err(e) => {
                engine_error!("aurora::RenderCommand", "Failed to build {} backend: {}", api, e);
                return Err(match e {
                    Error::BackendUnavailable(message) => Error::BackendUnavailable(message),
                    other => Error::BackendUnavailable(format!("{} backend failed: {}", api, other)),
                });
            }
        };
        self.backend = Some(backend);

        let viewport = lock_context(&self.context)?.viewport();
        let state = self.state;
        let backend = self.backend_mut()?;
        backend.set_clear_color(state.clear_color)?;
        backend.set_depth_testing(state.depth_testing)?;
        backend.set_blend(state.blend)?;
        backend.set_viewport(viewport)?;

        engine_info!("aurora::RenderCommand", "{} backend ready", api);
        Ok(())
    }

    // ===== PIPELINE STATE =====

    pub fn set_clear_color(&mut self, color: [f32; 4]) -> Result<()> {
        self.state.clear_color = color;
        self.backend_mut()?.set_clear_color(color)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.backend_mut()?.clear()
    }

    pub fn set_depth_testing(&mut self, enabled: bool) -> Result<()> {
        self.state.depth_testing = enabled;
        self.backend_mut()?.set_depth_testing(enabled)
    }

    pub fn set_blend(&mut self, enabled: bool) -> Result<()> {
        self.state.blend = enabled;
        self.backend_mut()?.set_blend(enabled)
    }

    pub fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        lock_context(&self.context)?.set_viewport(viewport);
        self.backend_mut()?.set_viewport(viewport)
    }

    // ===== DRAWING =====

    /// Draw `vertex_array` with `shader`
    ///
    /// `index_count` defaults to the vertex array's index count. A zero count
    /// is a caller bug: it asserts in debug builds and draws nothing otherwise.
    /// A count past the end of the index buffer is rejected with
    /// `InvalidResource` before anything reaches the backend.
    pub fn submit(&mut self, shader: &dyn Shader, vertex_array: &VertexArray, index_count: Option<u32>) -> Result<()> {
        vertex_array.ensure_current()?;
        self.ensure_live(shader.resource_key(), shader.name())?;

        let available = vertex_array.index_count();
        let count = index_count.unwrap_or(available);
        if count > available {
            engine_bail_warn!("aurora::RenderCommand",
                "Draw of {} indices exceeds the {} in the vertex array's index buffer", count, available);
        }
        debug_assert!(count > 0, "submit with a zero index count");
        if count == 0 {
            engine_warn!("aurora::RenderCommand", "Skipped draw with zero index count");
            return Ok(());
        }
        self.backend_mut()?.draw_indexed(shader, vertex_array, count)
    }

    // ===== FRAME =====

    pub fn begin_frame(&mut self) -> Result<()> {
        self.backend_mut()?.begin_frame()
    }

    pub fn end_frame(&mut self) -> Result<()> {
        self.backend_mut()?.end_frame()
    }

    // ===== WINDOW EVENTS =====

    /// Track a new window size
    ///
    /// The viewport follows the window unless an off-screen framebuffer is
    /// bound. A zero size (minimized window) is recorded but not forwarded.
    pub fn on_window_resize(&mut self, width: u32, height: u32) -> Result<()> {
        let viewport = {
            let mut ctx = lock_context(&self.context)?;
            ctx.set_window_size(width, height);
            if ctx.bound_framebuffer().is_some() {
                None
            } else {
                let viewport = ctx.default_viewport();
                ctx.set_viewport(viewport);
                Some(viewport)
            }
        };

        if width == 0 || height == 0 {
            engine_debug!("aurora::RenderCommand", "Window minimized, resize deferred");
            return Ok(());
        }

        let backend = self.backend_mut()?;
        backend.resize(width, height)?;
        if let Some(viewport) = viewport {
            backend.set_viewport(viewport)?;
        }
        Ok(())
    }

    /// Consume the window events this layer cares about
    ///
    /// Returns true when the event was handled.
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> Result<bool> {
        match event {
            WindowEvent::Resized(size) => {
                self.on_window_resize(size.width, size.height)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // ===== RESOURCE FACTORIES =====

    pub fn create_vertex_buffer(&mut self, data: &[u8], layout: BufferLayout, usage: BufferUsage) -> Result<Box<dyn VertexBuffer>> {
        self.backend_mut()?.create_vertex_buffer(data, layout, usage)
    }

    pub fn create_index_buffer(&mut self, indices: &[u32]) -> Result<Box<dyn IndexBuffer>> {
        self.backend_mut()?.create_index_buffer(indices)
    }

    pub fn create_uniform_buffer(&mut self, name: &str, size: u64) -> Result<Box<dyn UniformBuffer>> {
        self.backend_mut()?.create_uniform_buffer(name, size)
    }

    pub fn create_vertex_array(&mut self) -> Result<VertexArray> {
        self.backend_mut()?.create_vertex_array()
    }

    pub fn create_framebuffer(&mut self, spec: FramebufferSpec) -> Result<Framebuffer> {
        self.backend_mut()?.create_framebuffer(spec)
    }

    pub fn create_texture(&mut self, pixels: &PixelBuffer) -> Result<Box<dyn Texture>> {
        self.backend_mut()?.create_texture(pixels)
    }

    pub fn create_shader(&mut self, desc: &ShaderDesc) -> Result<Box<dyn Shader>> {
        self.backend_mut()?.create_shader(desc)
    }
}

impl Drop for RenderCommand {
    fn drop(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            if let Err(e) = backend.wait_idle() {
                engine_warn!("aurora::RenderCommand", "wait_idle on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
#[path = "render_command_tests.rs"]
mod tests;
