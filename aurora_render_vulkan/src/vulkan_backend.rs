/// VulkanBackend - Vulkan implementation of the RenderBackend trait
///
/// Owns the device context and the frame recorder. Resources keep a strong
/// reference to the device (their handles must outlive them) but only a
/// weak one to the recorder, so dropping the backend ends recording even
/// while application code still holds stale resources.

use std::sync::{Arc, Mutex, MutexGuard};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use aurora_render::aurora::{Error, Result};
use aurora_render::aurora::render::{
    lock_context, BindingModel, BufferLayout, BufferUsage, Config, Framebuffer, FramebufferSpec, IndexBuffer,
    PixelBuffer, RenderApi, RenderBackend, RendererStats, Shader, ShaderDesc, SharedContext, Texture,
    UniformBuffer, VertexArray, VertexBuffer, Viewport,
};
use aurora_render::{engine_bail_warn, engine_debug, engine_info, engine_trace};
use crate::vulkan_buffer::{VulkanIndexBuffer, VulkanUniformBuffer, VulkanVertexBuffer};
use crate::vulkan_context::GpuContext;
use crate::vulkan_framebuffer::VulkanFramebufferTarget;
use crate::vulkan_recorder::{FrameRecorder, SharedRecorder, WeakRecorder};
use crate::vulkan_shader::{PipelineKey, VulkanShader};
use crate::vulkan_texture::VulkanTexture;
use crate::vulkan_vertex_array::VulkanVertexArrayTarget;

const SOURCE: &str = "aurora::vulkan::Backend";

pub struct VulkanBackend {
    context: SharedContext,
    recorder: SharedRecorder,
    gpu: Arc<GpuContext>,
    max_framebuffer_size: u32,
    depth_testing: bool,
    blend: bool,
    stats: RendererStats,
}

impl VulkanBackend {
    /// Create the device and swapchain for `window`
    ///
    /// `width` and `height` are the window's current inner size.
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(
        window: &W,
        width: u32,
        height: u32,
        config: &Config,
        context: SharedContext,
    ) -> Result<Self> {
        let (gpu, surface) = GpuContext::new(window, config)?;
        let recorder = FrameRecorder::new(&gpu, surface, width, height, config.vsync)?;
        if config.max_frames_in_flight != 1 {
            engine_debug!(SOURCE, "max_frames_in_flight = {} requested, recording 1 frame ahead",
                config.max_frames_in_flight);
        }

        {
            let mut ctx = lock_context(&context)?;
            ctx.set_binding_model(BindingModel::Deferred);
            ctx.set_window_size(width, height);
        }

        engine_info!(SOURCE, "Vulkan backend created ({}x{})", width, height);
        Ok(Self {
            context,
            recorder: Arc::new(Mutex::new(recorder)),
            gpu,
            max_framebuffer_size: config.max_framebuffer_size,
            depth_testing: false,
            blend: false,
            stats: RendererStats::default(),
        })
    }

    fn lock_recorder(&self) -> Result<MutexGuard<'_, FrameRecorder>> {
        self.recorder
            .lock()
            .map_err(|_| Error::BackendError("Frame recorder lock poisoned".to_string()))
    }

    fn weak_recorder(&self) -> WeakRecorder {
        Arc::downgrade(&self.recorder)
    }
}

impl RenderBackend for VulkanBackend {
    fn api(&self) -> RenderApi {
        RenderApi::Vulkan
    }

    fn binding_model(&self) -> BindingModel {
        BindingModel::Deferred
    }

    // ===== RESOURCE FACTORIES =====

    fn create_vertex_buffer(&mut self, data: &[u8], layout: BufferLayout, usage: BufferUsage)
        -> Result<Box<dyn VertexBuffer>>
    {
        let buffer = VulkanVertexBuffer::new(&self.gpu, self.weak_recorder(), &self.context, data, layout, usage)?;
        Ok(Box::new(buffer))
    }

    fn create_index_buffer(&mut self, indices: &[u32]) -> Result<Box<dyn IndexBuffer>> {
        let buffer = VulkanIndexBuffer::new(&self.gpu, self.weak_recorder(), &self.context, indices)?;
        Ok(Box::new(buffer))
    }

    fn create_uniform_buffer(&mut self, name: &str, size: u64) -> Result<Box<dyn UniformBuffer>> {
        let buffer = VulkanUniformBuffer::new(&self.gpu, self.weak_recorder(), &self.context, name, size)?;
        Ok(Box::new(buffer))
    }

    fn create_vertex_array(&mut self) -> Result<VertexArray> {
        VertexArray::new(&self.context, Box::new(VulkanVertexArrayTarget::new(self.weak_recorder())))
    }

    fn create_framebuffer(&mut self, spec: FramebufferSpec) -> Result<Framebuffer> {
        spec.validate(self.max_framebuffer_size)?;
        let target = VulkanFramebufferTarget::new(&self.gpu, self.weak_recorder(), &spec)?;
        Framebuffer::new(&self.context, spec, Box::new(target), self.max_framebuffer_size)
    }

    fn create_texture(&mut self, pixels: &PixelBuffer) -> Result<Box<dyn Texture>> {
        let texture = VulkanTexture::new(&self.gpu, self.weak_recorder(), &self.context, pixels)?;
        Ok(Box::new(texture))
    }

    fn create_shader(&mut self, desc: &ShaderDesc) -> Result<Box<dyn Shader>> {
        Ok(Box::new(VulkanShader::new(&self.gpu, &self.context, desc)?))
    }

    // ===== PIPELINE STATE =====

    fn set_clear_color(&mut self, color: [f32; 4]) -> Result<()> {
        self.lock_recorder()?.set_clear_color(color);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let mut recorder = self.lock_recorder()?;
        let color = recorder.clear_color();
        recorder.clear(color)
    }

    fn set_depth_testing(&mut self, enabled: bool) -> Result<()> {
        self.depth_testing = enabled;
        Ok(())
    }

    fn set_blend(&mut self, enabled: bool) -> Result<()> {
        self.blend = enabled;
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        // Applied per draw from the context
        engine_trace!(SOURCE, "Viewport {},{} {}x{}", viewport.x, viewport.y, viewport.width, viewport.height);
        Ok(())
    }

    // ===== DRAWING =====

    fn draw_indexed(&mut self, shader: &dyn Shader, vertex_array: &VertexArray, index_count: u32) -> Result<()> {
        let Some(vulkan_shader) = shader.as_any().downcast_ref::<VulkanShader>() else {
            engine_bail_warn!(SOURCE, "Shader '{}' was not created by the Vulkan backend", shader.name());
        };
        let viewport = lock_context(&self.context)?.viewport();

        shader.bind()?;
        vertex_array.bind()?;

        let mut recorder = self.recorder
            .lock()
            .map_err(|_| Error::BackendError("Frame recorder lock poisoned".to_string()))?;
        let Some(signature) = recorder.begin_draw(viewport)? else {
            engine_trace!(SOURCE, "No window image this frame, draw skipped");
            return Ok(());
        };

        let key = PipelineKey {
            input: vertex_array.input_layout().clone(),
            depth_test: self.depth_testing,
            blend: self.blend,
            signature,
        };
        if vulkan_shader.record_draw(&mut recorder, &key)? {
            self.stats.pipeline_binds += 1;
        }
        recorder.draw_indexed(index_count);

        self.stats.draw_calls += 1;
        self.stats.indices += index_count as u64;
        Ok(())
    }

    // ===== FRAME / LIFECYCLE =====

    fn begin_frame(&mut self) -> Result<()> {
        lock_context(&self.context)?.begin_frame();
        self.lock_recorder()?.begin_frame()
    }

    fn end_frame(&mut self) -> Result<()> {
        let submitted = self.lock_recorder()?.end_frame()?;
        if submitted {
            self.stats.frames += 1;
        }
        // The next command buffer starts without any bound state
        lock_context(&self.context)?.reset_bindings();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        engine_debug!(SOURCE, "Window resized to {}x{}", width, height);
        self.lock_recorder()?.resize(width, height);
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.gpu.wait_idle()
    }

    fn stats(&self) -> RendererStats {
        self.stats
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        self.gpu.wait_idle().ok();
        engine_info!(SOURCE, "Vulkan backend destroyed after {} frames", self.stats.frames);
    }
}
