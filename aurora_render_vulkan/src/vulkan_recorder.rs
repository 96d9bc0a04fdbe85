/// FrameRecorder - the one command buffer of the Vulkan backend
///
/// Every Vulkan "bind" lands here instead of in global state. The recorder
/// owns the swapchain, one primary command buffer, the in-flight fence, the
/// per-frame descriptor pools and the uniform ring. One frame is in flight:
/// `begin_frame` waits for the previous submission before the command
/// buffer, pools and ring are reused.
///
/// Render pass instances are opened lazily on the first draw or clear of
/// the current target and closed when the target changes or the frame ends.
/// Vertex, index and descriptor binds survive pass changes within the
/// command buffer; slot tables (uniform buffers, textures) survive frames.
///
/// The backend holds the only strong reference. Resources keep a
/// `WeakRecorder` and fail with `BackendUnavailable` once the backend is
/// gone.

use ash::vk;
use gpu_allocator::MemoryLocation;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, Weak};
use aurora_render::aurora::{Error, Result};
use aurora_render::aurora::render::{PixelBuffer, TextureFormat, Viewport};
use aurora_render::{engine_debug, engine_err, engine_trace, engine_warn};
use crate::vulkan_buffer::GpuBuffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{clear_color_value, clear_depth_value};
use crate::vulkan_render_pass::{create_render_pass, PassKind, PassSignature};
use crate::vulkan_swapchain::{Acquired, Swapchain};
use crate::vulkan_texture::{GpuImage, SampledImage};

const SOURCE: &str = "aurora::vulkan::FrameRecorder";

/// Initial size of the per-frame uniform ring
const UNIFORM_RING_SIZE: u64 = 256 * 1024;

const POOL_MAX_SETS: u32 = 256;

/// Depth buffer of the window
const WINDOW_DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32F;

pub type SharedRecorder = Arc<Mutex<FrameRecorder>>;
pub type WeakRecorder = Weak<Mutex<FrameRecorder>>;

/// Run `action` on the recorder, failing once the backend has been destroyed
pub fn with_recorder<R>(recorder: &WeakRecorder, action: impl FnOnce(&mut FrameRecorder) -> Result<R>) -> Result<R> {
    let Some(recorder) = recorder.upgrade() else {
        return Err(Error::BackendUnavailable("Vulkan backend destroyed".to_string()));
    };
    let mut guard = recorder
        .lock()
        .map_err(|_| Error::BackendError("Frame recorder lock poisoned".to_string()))?;
    action(&mut guard)
}

// ===== TARGETS =====

/// Native side of a bound framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffscreenTarget {
    pub framebuffer: vk::Framebuffer,
    pub render_pass: vk::RenderPass,
    pub extent: vk::Extent2D,
    pub signature: PassSignature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Window,
    Offscreen(OffscreenTarget),
}

/// Open render pass instance
#[derive(Debug, Clone, Copy)]
struct ActivePass {
    extent: vk::Extent2D,
    signature: PassSignature,
    window: bool,
}

/// Viewport and scissor for `viewport` inside a target of `extent`
///
/// Viewports use a bottom-left origin. The window is rendered with a
/// negative-height viewport so the image is presented upright; offscreen
/// targets are not flipped, which keeps row 0 at texture coordinate 0 when
/// they are sampled.
pub fn viewport_state(viewport: Viewport, extent: vk::Extent2D, flip: bool) -> (vk::Viewport, vk::Rect2D) {
    let (x, y) = (viewport.x as f32, viewport.y as f32);
    let (width, height) = (viewport.width as f32, viewport.height as f32);
    let top = extent.height as i64 - viewport.y as i64 - viewport.height as i64;

    let vk_viewport = if flip {
        vk::Viewport {
            x,
            y: extent.height as f32 - y,
            width,
            height: -height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    } else {
        vk::Viewport { x, y, width, height, min_depth: 0.0, max_depth: 1.0 }
    };

    let scissor_y = if flip { top } else { viewport.y as i64 };
    let scissor = vk::Rect2D {
        offset: vk::Offset2D {
            x: viewport.x.max(0),
            y: scissor_y.clamp(0, i32::MAX as i64) as i32,
        },
        extent: vk::Extent2D {
            width: viewport.width.min(extent.width),
            height: viewport.height.min(extent.height),
        },
    };
    (vk_viewport, scissor)
}

/// Round `value` up to a multiple of `alignment`
pub fn align_offset(value: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}

// ===== RECORDER =====

pub struct FrameRecorder {
    gpu: Arc<GpuContext>,
    swapchain: Swapchain,
    window_size: (u32, u32),
    needs_recreate: bool,

    window_first_pass: vk::RenderPass,
    window_resume_pass: vk::RenderPass,
    window_signature: PassSignature,
    window_depth: Option<GpuImage>,
    window_framebuffers: Vec<vk::Framebuffer>,

    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    in_flight: vk::Fence,

    recording: bool,
    image_index: Option<u32>,
    window_started: bool,
    pass: Option<ActivePass>,
    target: Target,
    clear_color: [f32; 4],
    bound_pipeline: vk::Pipeline,

    descriptor_pools: Vec<vk::DescriptorPool>,
    current_pool: usize,
    uniform_ring: GpuBuffer,
    ring_offset: u64,
    retired_rings: Vec<GpuBuffer>,

    uniform_slots: FxHashMap<u32, (vk::Buffer, u64)>,
    texture_slots: FxHashMap<u32, (vk::ImageView, vk::Sampler)>,
    fallback_texture: SampledImage,
}

impl FrameRecorder {
    /// Build the swapchain for `surface` (taking ownership) and the frame objects
    pub fn new(gpu: &Arc<GpuContext>, surface: vk::SurfaceKHR, width: u32, height: u32, vsync: bool) -> Result<Self> {
        let swapchain = Swapchain::new(gpu, surface, width, height, vsync)?;
        let window_signature = PassSignature {
            color: swapchain.format(),
            depth: Some(gpu.image_format(WINDOW_DEPTH_FORMAT)),
        };

        let device = &gpu.device;
        unsafe {
            let window_first_pass = create_render_pass(device, window_signature, PassKind::WindowFirst)?;
            let window_resume_pass = create_render_pass(device, window_signature, PassKind::WindowResume)?;

            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(gpu.graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let command_pool = device
                .create_command_pool(&pool_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create command pool: {:?}", e))?;

            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(command_pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffer = device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| engine_err!(SOURCE, "Failed to allocate command buffer: {:?}", e))?[0];

            // Signaled so the first frame does not wait
            let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
            let in_flight = device
                .create_fence(&fence_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create frame fence: {:?}", e))?;

            let uniform_ring = GpuBuffer::new(
                gpu,
                UNIFORM_RING_SIZE,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
                "uniform ring",
            )?;
            let fallback_texture = SampledImage::from_pixels(gpu, &PixelBuffer::solid(1, 1, [255; 4]), "fallback texture")?;

            let mut recorder = Self {
                gpu: gpu.clone(),
                swapchain,
                window_size: (width, height),
                needs_recreate: false,
                window_first_pass,
                window_resume_pass,
                window_signature,
                window_depth: None,
                window_framebuffers: Vec::new(),
                command_pool,
                command_buffer,
                in_flight,
                recording: false,
                image_index: None,
                window_started: false,
                pass: None,
                target: Target::Window,
                clear_color: [0.0, 0.0, 0.0, 1.0],
                bound_pipeline: vk::Pipeline::null(),
                descriptor_pools: Vec::new(),
                current_pool: 0,
                uniform_ring,
                ring_offset: 0,
                retired_rings: Vec::new(),
                uniform_slots: FxHashMap::default(),
                texture_slots: FxHashMap::default(),
                fallback_texture,
            };
            recorder.create_descriptor_pool()?;
            recorder.create_window_framebuffers()?;
            Ok(recorder)
        }
    }

    fn create_window_framebuffers(&mut self) -> Result<()> {
        let extent = self.swapchain.extent();
        let depth = GpuImage::new(
            &self.gpu,
            extent.width,
            extent.height,
            WINDOW_DEPTH_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            "window depth",
        )?;
        for &view in self.swapchain.views() {
            let attachments = [view, depth.view()];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.window_first_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe {
                self.gpu.device
                    .create_framebuffer(&create_info, None)
                    .map_err(|e| engine_err!(SOURCE, "Failed to create window framebuffer: {:?}", e))?
            };
            self.window_framebuffers.push(framebuffer);
        }
        self.window_depth = Some(depth);
        Ok(())
    }

    /// Destroy window framebuffers directly; the device must be idle
    fn destroy_window_framebuffers(&mut self) {
        for framebuffer in self.window_framebuffers.drain(..) {
            unsafe { self.gpu.device.destroy_framebuffer(framebuffer, None) };
        }
        self.window_depth = None;
    }

    fn create_descriptor_pool(&mut self) -> Result<()> {
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: POOL_MAX_SETS * 4,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: POOL_MAX_SETS * 4,
            },
        ];
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(POOL_MAX_SETS)
            .pool_sizes(&pool_sizes);
        let pool = unsafe {
            self.gpu.device
                .create_descriptor_pool(&create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create descriptor pool: {:?}", e))?
        };
        self.descriptor_pools.push(pool);
        self.current_pool = self.descriptor_pools.len() - 1;
        engine_trace!(SOURCE, "{} descriptor pools in use", self.descriptor_pools.len());
        Ok(())
    }

    // ===== FRAME =====

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Wait for the frame in flight, then release what it was using
    pub fn wait_in_flight(&mut self) -> Result<()> {
        unsafe {
            self.gpu.device
                .wait_for_fences(&[self.in_flight], true, u64::MAX)
                .map_err(|e| engine_err!(SOURCE, "Failed to wait for frame fence: {:?}", e))?;
        }
        self.gpu.collect_garbage();
        Ok(())
    }

    /// Start recording a frame; a no-op while one is already recording
    pub fn begin_frame(&mut self) -> Result<()> {
        if self.recording {
            return Ok(());
        }
        self.wait_in_flight()?;

        if self.needs_recreate {
            self.recreate_swapchain()?;
        }
        self.image_index = if self.needs_recreate { None } else { self.acquire()? };

        unsafe {
            for &pool in &self.descriptor_pools {
                self.gpu.device
                    .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
                    .map_err(|e| engine_err!(SOURCE, "Failed to reset descriptor pool: {:?}", e))?;
            }
            self.current_pool = 0;
            self.ring_offset = 0;

            self.gpu.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(|e| engine_err!(SOURCE, "Failed to reset command buffer: {:?}", e))?;
            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            self.gpu.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(|e| engine_err!(SOURCE, "Failed to begin command buffer: {:?}", e))?;
        }

        self.recording = true;
        self.window_started = false;
        self.pass = None;
        self.bound_pipeline = vk::Pipeline::null();
        Ok(())
    }

    fn acquire(&mut self) -> Result<Option<u32>> {
        if let Acquired::Image(index) = self.swapchain.acquire_next_image()? {
            return Ok(Some(index));
        }
        engine_debug!(SOURCE, "Swapchain out of date on acquire, recreating");
        self.recreate_swapchain()?;
        if self.needs_recreate {
            return Ok(None);
        }
        match self.swapchain.acquire_next_image()? {
            Acquired::Image(index) => Ok(Some(index)),
            Acquired::OutOfDate => {
                self.needs_recreate = true;
                Ok(None)
            }
        }
    }

    fn recreate_swapchain(&mut self) -> Result<()> {
        self.gpu.wait_idle()?;
        let (width, height) = self.window_size;
        if !self.swapchain.recreate(width, height)? {
            // Zero-sized surface; try again next frame
            self.needs_recreate = true;
            return Ok(());
        }
        self.destroy_window_framebuffers();
        self.create_window_framebuffers()?;
        self.needs_recreate = false;
        Ok(())
    }

    fn ensure_recording(&mut self) -> Result<vk::CommandBuffer> {
        if !self.recording {
            engine_trace!(SOURCE, "Implicit begin_frame");
            self.begin_frame()?;
        }
        Ok(self.command_buffer)
    }

    /// Close the frame, submit it and present the window image
    ///
    /// Returns false when nothing was recorded.
    pub fn end_frame(&mut self) -> Result<bool> {
        if !self.recording {
            return Ok(false);
        }
        self.end_pass();

        // An untouched window image still has to reach PRESENT_SRC
        if self.image_index.is_some() && !self.window_started {
            self.begin_pass(Target::Window)?;
            self.end_pass();
        }

        unsafe {
            self.gpu.device
                .end_command_buffer(self.command_buffer)
                .map_err(|e| engine_err!(SOURCE, "Failed to end command buffer: {:?}", e))?;
        }
        self.recording = false;
        self.submit()?;

        if let Some(image_index) = self.image_index.take() {
            if self.swapchain.present(image_index)? {
                self.needs_recreate = true;
            }
        }
        Ok(true)
    }

    fn submit(&mut self) -> Result<()> {
        let command_buffers = [self.command_buffer];
        let wait_semaphores = [self.swapchain.image_available_semaphore()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores: Vec<vk::Semaphore> = self
            .image_index
            .map(|index| self.swapchain.render_finished_semaphore(index))
            .into_iter()
            .collect();

        let mut submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        if self.image_index.is_some() {
            submit_info = submit_info
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages);
        }

        unsafe {
            self.gpu.device
                .reset_fences(&[self.in_flight])
                .map_err(|e| engine_err!(SOURCE, "Failed to reset frame fence: {:?}", e))?;
            self.gpu.device
                .queue_submit(self.gpu.graphics_queue, &[submit_info], self.in_flight)
                .map_err(|e| engine_err!(SOURCE, "Failed to submit frame: {:?}", e))?;
        }
        // Rings outgrown this frame were used by this submission
        self.retired_rings.clear();
        self.gpu.frame_submitted();
        Ok(())
    }

    /// Note a new window size; the swapchain follows at the next frame
    pub fn resize(&mut self, width: u32, height: u32) {
        self.window_size = (width, height);
        self.needs_recreate = true;
    }

    /// Size of the window images
    pub fn window_extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    pub fn window_signature(&self) -> PassSignature {
        self.window_signature
    }

    // ===== TARGETS AND PASSES =====

    /// Render into `target` from the next draw or clear on
    pub fn bind_offscreen(&mut self, target: OffscreenTarget) {
        self.set_target(Target::Offscreen(target));
    }

    /// Render into the window from the next draw or clear on
    pub fn bind_window(&mut self) {
        self.set_target(Target::Window);
    }

    /// Stop using `framebuffer` (released or re-created)
    pub fn forget_offscreen(&mut self, framebuffer: vk::Framebuffer) {
        if matches!(self.target, Target::Offscreen(t) if t.framebuffer == framebuffer) {
            self.set_target(Target::Window);
        }
    }

    fn set_target(&mut self, target: Target) {
        if self.target != target {
            self.end_pass();
            self.target = target;
        }
    }

    fn end_pass(&mut self) {
        if self.pass.take().is_some() {
            unsafe { self.gpu.device.cmd_end_render_pass(self.command_buffer) };
        }
    }

    fn begin_pass(&mut self, target: Target) -> Result<Option<ActivePass>> {
        let (render_pass, framebuffer, extent, signature, window, clears) = match target {
            Target::Offscreen(t) => (t.render_pass, t.framebuffer, t.extent, t.signature, false, Vec::new()),
            Target::Window => {
                let Some(image_index) = self.image_index else {
                    return Ok(None);
                };
                let render_pass = if self.window_started { self.window_resume_pass } else { self.window_first_pass };
                (
                    render_pass,
                    self.window_framebuffers[image_index as usize],
                    self.swapchain.extent(),
                    self.window_signature,
                    true,
                    vec![clear_color_value(self.clear_color), clear_depth_value()],
                )
            }
        };

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent })
            .clear_values(&clears);
        unsafe {
            self.gpu.device.cmd_begin_render_pass(self.command_buffer, &begin_info, vk::SubpassContents::INLINE);
        }
        if window {
            self.window_started = true;
        }
        let pass = ActivePass { extent, signature, window };
        self.pass = Some(pass);
        Ok(Some(pass))
    }

    /// Open a pass on the current target if none is open
    ///
    /// None when the window is the target but no image was acquired.
    fn ensure_pass(&mut self) -> Result<Option<ActivePass>> {
        self.ensure_recording()?;
        if let Some(pass) = self.pass {
            return Ok(Some(pass));
        }
        self.begin_pass(self.target)
    }

    /// Color the window image starts each frame with
    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Clear color (and depth) of the whole current target
    pub fn clear(&mut self, color: [f32; 4]) -> Result<()> {
        let Some(pass) = self.ensure_pass()? else {
            return Ok(());
        };
        let mut attachments = vec![vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: 0,
            clear_value: clear_color_value(color),
        }];
        if let Some(depth) = pass.signature.depth {
            let mut aspect_mask = vk::ImageAspectFlags::DEPTH;
            if matches!(depth, vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT) {
                aspect_mask |= vk::ImageAspectFlags::STENCIL;
            }
            attachments.push(vk::ClearAttachment {
                aspect_mask,
                color_attachment: 0,
                clear_value: clear_depth_value(),
            });
        }
        let rect = vk::ClearRect {
            rect: vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent: pass.extent },
            base_array_layer: 0,
            layer_count: 1,
        };
        unsafe {
            self.gpu.device.cmd_clear_attachments(self.command_buffer, &attachments, &[rect]);
        }
        Ok(())
    }

    /// Open the pass for a draw and set viewport and scissor
    ///
    /// Returns the signature pipelines must be compatible with, or None when
    /// the draw has nowhere to go (minimized window).
    pub fn begin_draw(&mut self, viewport: Viewport) -> Result<Option<PassSignature>> {
        let Some(pass) = self.ensure_pass()? else {
            return Ok(None);
        };
        let (vk_viewport, scissor) = viewport_state(viewport, pass.extent, pass.window);
        unsafe {
            self.gpu.device.cmd_set_viewport(self.command_buffer, 0, &[vk_viewport]);
            self.gpu.device.cmd_set_scissor(self.command_buffer, 0, &[scissor]);
        }
        Ok(Some(pass.signature))
    }

    /// Bind `pipeline`; returns true when it changed
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) -> bool {
        if self.bound_pipeline == pipeline {
            return false;
        }
        unsafe {
            self.gpu.device.cmd_bind_pipeline(self.command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
        self.bound_pipeline = pipeline;
        true
    }

    pub fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        unsafe {
            self.gpu.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            );
        }
    }

    pub fn draw_indexed(&mut self, index_count: u32) {
        unsafe {
            self.gpu.device.cmd_draw_indexed(self.command_buffer, index_count, 1, 0, 0, 0);
        }
    }

    // ===== INPUT BINDS =====

    pub fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[vk::Buffer]) -> Result<()> {
        let command_buffer = self.ensure_recording()?;
        let offsets = vec![0; buffers.len()];
        unsafe {
            self.gpu.device.cmd_bind_vertex_buffers(command_buffer, first_binding, buffers, &offsets);
        }
        Ok(())
    }

    pub fn bind_index_buffer(&mut self, buffer: vk::Buffer) -> Result<()> {
        let command_buffer = self.ensure_recording()?;
        unsafe {
            self.gpu.device.cmd_bind_index_buffer(command_buffer, buffer, 0, vk::IndexType::UINT32);
        }
        Ok(())
    }

    // ===== SLOTS =====

    pub fn bind_uniform_buffer(&mut self, slot: u32, buffer: vk::Buffer, size: u64) {
        self.uniform_slots.insert(slot, (buffer, size));
    }

    pub fn uniform_slot(&self, slot: u32) -> Option<(vk::Buffer, u64)> {
        self.uniform_slots.get(&slot).copied()
    }

    pub fn bind_texture(&mut self, slot: u32, view: vk::ImageView, sampler: vk::Sampler) {
        self.texture_slots.insert(slot, (view, sampler));
    }

    /// Texture at `slot`, or the white fallback
    pub fn texture_slot(&self, slot: u32) -> (vk::ImageView, vk::Sampler) {
        self.texture_slots.get(&slot).copied().unwrap_or((
            self.fallback_texture.image.view(),
            self.fallback_texture.sampler.handle(),
        ))
    }

    pub fn release_buffer(&mut self, buffer: vk::Buffer) {
        self.uniform_slots.retain(|_, (bound, _)| *bound != buffer);
    }

    pub fn release_view(&mut self, view: vk::ImageView) {
        self.texture_slots.retain(|_, (bound, _)| *bound != view);
    }

    // ===== DESCRIPTORS AND UNIFORMS =====

    /// Allocate a set of `layout` from this frame's pools
    pub fn allocate_descriptor_set(&mut self, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        let layouts = [layout];
        loop {
            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(self.descriptor_pools[self.current_pool])
                .set_layouts(&layouts);
            match unsafe { self.gpu.device.allocate_descriptor_sets(&allocate_info) } {
                Ok(sets) => return Ok(sets[0]),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                    if self.current_pool + 1 < self.descriptor_pools.len() {
                        self.current_pool += 1;
                    } else {
                        self.create_descriptor_pool()?;
                    }
                }
                Err(e) => return Err(engine_err!(SOURCE, "Failed to allocate descriptor set: {:?}", e)),
            }
        }
    }

    /// Copy `data` into the uniform ring, returning (buffer, offset)
    ///
    /// The ring is reset every frame and doubles when a frame outgrows it.
    pub fn upload_uniforms(&mut self, data: &[u8]) -> Result<(vk::Buffer, u64)> {
        let offset = align_offset(self.ring_offset, self.gpu.uniform_alignment());
        let end = offset + data.len() as u64;
        if end > self.uniform_ring.size() {
            let size = (self.uniform_ring.size() * 2).max(align_offset(data.len() as u64, 256) * 2);
            engine_warn!(SOURCE, "Uniform ring full, growing to {} KB", size / 1024);
            let ring = GpuBuffer::new(
                &self.gpu,
                size,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                MemoryLocation::CpuToGpu,
                "uniform ring",
            )?;
            let old = std::mem::replace(&mut self.uniform_ring, ring);
            self.retired_rings.push(old);
            self.ring_offset = 0;
            return self.upload_uniforms(data);
        }
        self.uniform_ring.write(offset, data)?;
        self.ring_offset = end;
        Ok((self.uniform_ring.handle(), offset))
    }

    pub fn gpu(&self) -> &Arc<GpuContext> {
        &self.gpu
    }
}

impl Drop for FrameRecorder {
    fn drop(&mut self) {
        if self.recording {
            engine_warn!(SOURCE, "Recorder dropped mid-frame, discarding recorded commands");
        }
        unsafe {
            self.gpu.device.device_wait_idle().ok();

            self.destroy_window_framebuffers();
            self.gpu.device.destroy_render_pass(self.window_first_pass, None);
            self.gpu.device.destroy_render_pass(self.window_resume_pass, None);
            for pool in self.descriptor_pools.drain(..) {
                self.gpu.device.destroy_descriptor_pool(pool, None);
            }
            self.gpu.device.destroy_fence(self.in_flight, None);
            self.gpu.device.destroy_command_pool(self.command_pool, None);
        }
        // No command buffer is left to reference retired handles
        self.gpu.collect_all_garbage();
    }
}

#[cfg(test)]
#[path = "vulkan_recorder_tests.rs"]
mod tests;
