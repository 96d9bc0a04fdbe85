/// GlBackend - OpenGL implementation of the RenderBackend trait
///
/// GL state changes take effect immediately on the current context, so the
/// render context runs in Immediate mode: bindings stay valid across
/// frames until something else is bound.
///
/// Presenting is left to the windowing library that owns the context;
/// `end_frame` only closes the frame's bookkeeping.

use std::sync::Arc;
use glow::HasContext;
use aurora_render::aurora::Result;
use aurora_render::aurora::render::{
    lock_context, BindingModel, BufferLayout, BufferUsage, Config, Framebuffer, FramebufferSpec, IndexBuffer,
    PixelBuffer, RenderApi, RenderBackend, RendererStats, Shader, ShaderDesc, SharedContext, Texture,
    UniformBuffer, UniformPacking, VertexArray, VertexBuffer, Viewport,
};
use aurora_render::{engine_bail_warn, engine_debug, engine_info, engine_trace};
use crate::gl_buffer::{GlIndexBuffer, GlUniformBuffer, GlVertexBuffer};
use crate::gl_device::GlDevice;
use crate::gl_framebuffer::GlFramebufferTarget;
use crate::gl_shader::GlShader;
use crate::gl_texture::GlTexture;
use crate::gl_vertex_array::GlVertexArrayTarget;

const SOURCE: &str = "aurora::opengl::Backend";

pub struct GlBackend {
    device: Arc<GlDevice>,
    context: SharedContext,
    uniform_packing: UniformPacking,
    max_framebuffer_size: u32,
    clear_color: [f32; 4],
    /// Last viewport handed to glViewport
    applied_viewport: Option<Viewport>,
    stats: RendererStats,
}

impl GlBackend {
    pub fn new(device: Arc<GlDevice>, config: &Config, context: SharedContext) -> Result<Self> {
        let viewport = {
            let mut ctx = lock_context(&context)?;
            ctx.set_binding_model(BindingModel::Immediate);
            ctx.viewport()
        };
        if !config.vsync {
            engine_debug!(SOURCE, "vsync is controlled by the window's swap interval");
        }

        let gl = device.gl();
        unsafe {
            gl.depth_func(glow::LESS);
            gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            gl.disable(glow::DEPTH_TEST);
            gl.disable(glow::BLEND);
            gl.viewport(viewport.x, viewport.y, viewport.width as i32, viewport.height as i32);
        }
        device.check_error("initial state")?;

        let (major, minor) = device.version();
        engine_info!(SOURCE, "OpenGL {}.{} backend created on {}", major, minor, device.renderer());
        Ok(Self {
            device,
            context,
            uniform_packing: config.uniform_packing,
            max_framebuffer_size: config.max_framebuffer_size,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            applied_viewport: Some(viewport),
            stats: RendererStats::default(),
        })
    }

    pub fn device(&self) -> &Arc<GlDevice> {
        &self.device
    }

    fn apply_viewport(&mut self, viewport: Viewport) {
        if self.applied_viewport == Some(viewport) {
            return;
        }
        unsafe {
            self.device.gl().viewport(viewport.x, viewport.y, viewport.width as i32, viewport.height as i32);
        }
        self.applied_viewport = Some(viewport);
    }

    fn toggle(&self, capability: u32, enabled: bool) {
        let gl = self.device.gl();
        unsafe {
            if enabled {
                gl.enable(capability);
            } else {
                gl.disable(capability);
            }
        }
    }
}

impl RenderBackend for GlBackend {
    fn api(&self) -> RenderApi {
        RenderApi::OpenGl
    }

    fn binding_model(&self) -> BindingModel {
        BindingModel::Immediate
    }

    // ===== RESOURCE FACTORIES =====

    fn create_vertex_buffer(&mut self, data: &[u8], layout: BufferLayout, usage: BufferUsage)
        -> Result<Box<dyn VertexBuffer>>
    {
        Ok(Box::new(GlVertexBuffer::new(&self.device, &self.context, data, layout, usage)?))
    }

    fn create_index_buffer(&mut self, indices: &[u32]) -> Result<Box<dyn IndexBuffer>> {
        Ok(Box::new(GlIndexBuffer::new(&self.device, &self.context, indices)?))
    }

    fn create_uniform_buffer(&mut self, name: &str, size: u64) -> Result<Box<dyn UniformBuffer>> {
        Ok(Box::new(GlUniformBuffer::new(&self.device, &self.context, name, size)?))
    }

    fn create_vertex_array(&mut self) -> Result<VertexArray> {
        VertexArray::new(&self.context, Box::new(GlVertexArrayTarget::new(&self.device)?))
    }

    fn create_framebuffer(&mut self, spec: FramebufferSpec) -> Result<Framebuffer> {
        spec.validate(self.max_framebuffer_size)?;
        let target = GlFramebufferTarget::new(&self.device, &spec)?;
        Framebuffer::new(&self.context, spec, Box::new(target), self.max_framebuffer_size)
    }

    fn create_texture(&mut self, pixels: &PixelBuffer) -> Result<Box<dyn Texture>> {
        Ok(Box::new(GlTexture::new(&self.device, &self.context, pixels)?))
    }

    fn create_shader(&mut self, desc: &ShaderDesc) -> Result<Box<dyn Shader>> {
        Ok(Box::new(GlShader::new(&self.device, &self.context, desc, self.uniform_packing)?))
    }

    // ===== PIPELINE STATE =====

    fn set_clear_color(&mut self, color: [f32; 4]) -> Result<()> {
        self.clear_color = color;
        let [r, g, b, a] = color;
        unsafe { self.device.gl().clear_color(r, g, b, a) };
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        // A framebuffer clear may have left its own color behind
        let [r, g, b, a] = self.clear_color;
        let gl = self.device.gl();
        unsafe {
            gl.clear_color(r, g, b, a);
            gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT | glow::STENCIL_BUFFER_BIT);
        }
        Ok(())
    }

    fn set_depth_testing(&mut self, enabled: bool) -> Result<()> {
        self.toggle(glow::DEPTH_TEST, enabled);
        Ok(())
    }

    fn set_blend(&mut self, enabled: bool) -> Result<()> {
        self.toggle(glow::BLEND, enabled);
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.apply_viewport(viewport);
        Ok(())
    }

    // ===== DRAWING =====

    fn draw_indexed(&mut self, shader: &dyn Shader, vertex_array: &VertexArray, index_count: u32) -> Result<()> {
        let Some(gl_shader) = shader.as_any().downcast_ref::<GlShader>() else {
            engine_bail_warn!(SOURCE, "Shader '{}' was not created by the OpenGL backend", shader.name());
        };
        let (viewport, already_bound) = {
            let ctx = lock_context(&self.context)?;
            (ctx.viewport(), ctx.bound_shader() == Some(shader.resource_key()))
        };
        self.apply_viewport(viewport);

        shader.bind()?;
        if !already_bound {
            self.stats.pipeline_binds += 1;
        }
        vertex_array.bind()?;
        gl_shader.prepare_draw()?;

        unsafe {
            self.device.gl().draw_elements(glow::TRIANGLES, index_count as i32, glow::UNSIGNED_INT, 0);
        }
        self.stats.draw_calls += 1;
        self.stats.indices += index_count as u64;
        Ok(())
    }

    // ===== FRAME / LIFECYCLE =====

    fn begin_frame(&mut self) -> Result<()> {
        lock_context(&self.context)?.begin_frame();
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        self.stats.frames += 1;
        self.device.check_error("frame")
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        // The default framebuffer follows the window; only the viewport changes
        engine_trace!(SOURCE, "Window resized to {}x{}", width, height);
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.device.gl().finish() };
        Ok(())
    }

    fn stats(&self) -> RendererStats {
        self.stats
    }
}

impl Drop for GlBackend {
    fn drop(&mut self) {
        engine_info!(SOURCE, "OpenGL backend destroyed after {} frames", self.stats.frames);
    }
}
