/// Vulkan buffers: raw GPU buffers plus the vertex, index and uniform
/// buffer resources built on them.
///
/// Static vertex and index data goes through a staging copy into device
/// local memory. Dynamic vertex buffers and uniform buffers stay host
/// visible and are written through the persistent mapping; a write first
/// waits for the frame in flight so the GPU never reads a half-written
/// buffer.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use std::any::Any;
use std::sync::Arc;
use aurora_render::aurora::Result;
use aurora_render::aurora::render::{
    check_buffer_write, check_uniform_write, index_bytes, lock_context, BufferLayout, BufferUsage,
    IndexBuffer, ResourceGuard, ResourceKey, ResourceKind, SharedContext, UniformBuffer, VertexBuffer,
};
use aurora_render::{engine_bail, engine_err, engine_trace};
use crate::vulkan_context::{Garbage, GpuContext};
use crate::vulkan_recorder::{with_recorder, WeakRecorder};

const SOURCE: &str = "aurora::vulkan::Buffer";

// ===== GPU BUFFER =====

/// One `vk::Buffer` with its allocation, retired on drop
pub struct GpuBuffer {
    context: Arc<GpuContext>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
}

impl GpuBuffer {
    /// Create a buffer of `size` bytes (zero-sized requests get a minimal allocation)
    pub fn new(
        context: &Arc<GpuContext>,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Self> {
        unsafe {
            let create_info = vk::BufferCreateInfo::default()
                .size(size.max(4))
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            let buffer = context.device
                .create_buffer(&create_info, None)
                .map_err(|e| engine_err!(SOURCE, "Failed to create buffer '{}': {:?}", name, e))?;

            let allocation = match context.allocate_buffer_memory(buffer, name, location) {
                Ok(allocation) => allocation,
                Err(e) => {
                    context.device.destroy_buffer(buffer, None);
                    return Err(e);
                }
            };
            context.set_object_name(buffer, name);

            Ok(Self {
                context: context.clone(),
                buffer,
                allocation: Some(allocation),
                size,
            })
        }
    }

    /// Device-local buffer initialised with `data` through a staging copy
    pub fn with_data(context: &Arc<GpuContext>, data: &[u8], usage: vk::BufferUsageFlags, name: &str) -> Result<Self> {
        let size = data.len() as u64;
        let buffer = Self::new(context, size, usage | vk::BufferUsageFlags::TRANSFER_DST, MemoryLocation::GpuOnly, name)?;
        if data.is_empty() {
            return Ok(buffer);
        }

        let mut staging = Self::new(
            context,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            &format!("{} staging", name),
        )?;
        staging.write(0, data)?;

        let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size };
        context.one_time_submit(|command_buffer| unsafe {
            context.device.cmd_copy_buffer(command_buffer, staging.buffer, buffer.buffer, &[region]);
        })?;
        Ok(buffer)
    }

    /// Host-visible buffer initialised with `data`
    pub fn mapped_with_data(context: &Arc<GpuContext>, data: &[u8], size: u64, usage: vk::BufferUsageFlags, name: &str) -> Result<Self> {
        let mut buffer = Self::new(context, size, usage, MemoryLocation::CpuToGpu, name)?;
        if !data.is_empty() {
            buffer.write(0, data)?;
        }
        Ok(buffer)
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_mapped(&self) -> bool {
        self.allocation.as_ref().is_some_and(|a| a.mapped_ptr().is_some())
    }

    /// Copy `data` into the mapping at `offset`
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset as usize + data.len();
        if end as u64 > self.size {
            engine_bail!(SOURCE, "Write of {} bytes at {} overruns buffer of {}", data.len(), offset, self.size);
        }
        let Some(mapped) = self.allocation.as_mut().and_then(|a| a.mapped_slice_mut()) else {
            engine_bail!(SOURCE, "Buffer is not host visible");
        };
        mapped[offset as usize..end].copy_from_slice(data);
        Ok(())
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.context.retire(Garbage::Buffer(self.buffer, self.allocation.take()));
    }
}

// ===== VERTEX BUFFER =====

pub struct VulkanVertexBuffer {
    buffer: GpuBuffer,
    layout: BufferLayout,
    usage: BufferUsage,
    recorder: WeakRecorder,
    guard: ResourceGuard,
}

impl VulkanVertexBuffer {
    pub fn new(
        gpu: &Arc<GpuContext>,
        recorder: WeakRecorder,
        context: &SharedContext,
        data: &[u8],
        layout: BufferLayout,
        usage: BufferUsage,
    ) -> Result<Self> {
        layout.validate()?;
        let buffer = match usage {
            BufferUsage::Static => GpuBuffer::with_data(gpu, data, vk::BufferUsageFlags::VERTEX_BUFFER, "vertex buffer")?,
            BufferUsage::Dynamic => GpuBuffer::mapped_with_data(
                gpu,
                data,
                data.len() as u64,
                vk::BufferUsageFlags::VERTEX_BUFFER,
                "dynamic vertex buffer",
            )?,
        };
        Ok(Self {
            buffer,
            layout,
            usage,
            recorder,
            guard: ResourceGuard::register(context, ResourceKind::VertexBuffer, "vertex buffer")?,
        })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

impl VertexBuffer for VulkanVertexBuffer {
    fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    fn size(&self) -> u64 {
        self.buffer.size()
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn set_data(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.guard.ensure_current()?;
        check_buffer_write(SOURCE, self.usage, self.size(), offset, data.len())?;
        with_recorder(&self.recorder, |recorder| recorder.wait_in_flight())?;
        self.buffer.write(offset, data)
    }

    fn bind(&self) -> Result<()> {
        self.guard.ensure_current()?;
        let handle = self.buffer.handle();
        with_recorder(&self.recorder, |recorder| recorder.bind_vertex_buffers(0, &[handle]))
    }

    fn unbind(&self) -> Result<()> {
        engine_trace!(SOURCE, "Vertex buffer unbind is a no-op on Vulkan");
        Ok(())
    }

    fn resource_key(&self) -> ResourceKey {
        self.guard.key()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ===== INDEX BUFFER =====

pub struct VulkanIndexBuffer {
    buffer: GpuBuffer,
    count: u32,
    recorder: WeakRecorder,
    guard: ResourceGuard,
}

impl VulkanIndexBuffer {
    pub fn new(gpu: &Arc<GpuContext>, recorder: WeakRecorder, context: &SharedContext, indices: &[u32]) -> Result<Self> {
        let buffer = GpuBuffer::with_data(gpu, index_bytes(indices), vk::BufferUsageFlags::INDEX_BUFFER, "index buffer")?;
        Ok(Self {
            buffer,
            count: indices.len() as u32,
            recorder,
            guard: ResourceGuard::register(context, ResourceKind::IndexBuffer, "index buffer")?,
        })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

impl IndexBuffer for VulkanIndexBuffer {
    fn count(&self) -> u32 {
        self.count
    }

    fn bind(&self) -> Result<()> {
        self.guard.ensure_current()?;
        let handle = self.buffer.handle();
        with_recorder(&self.recorder, |recorder| recorder.bind_index_buffer(handle))
    }

    fn unbind(&self) -> Result<()> {
        Ok(())
    }

    fn resource_key(&self) -> ResourceKey {
        self.guard.key()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ===== UNIFORM BUFFER =====

pub struct VulkanUniformBuffer {
    name: String,
    buffer: GpuBuffer,
    recorder: WeakRecorder,
    guard: ResourceGuard,
}

impl VulkanUniformBuffer {
    pub fn new(gpu: &Arc<GpuContext>, recorder: WeakRecorder, context: &SharedContext, name: &str, size: u64) -> Result<Self> {
        let zeroes = vec![0u8; size as usize];
        let buffer = GpuBuffer::mapped_with_data(gpu, &zeroes, size, vk::BufferUsageFlags::UNIFORM_BUFFER, name)?;
        Ok(Self {
            name: name.to_string(),
            buffer,
            recorder,
            guard: ResourceGuard::register(context, ResourceKind::UniformBuffer, name)?,
        })
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

impl UniformBuffer for VulkanUniformBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.buffer.size()
    }

    fn set_data(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.guard.ensure_current()?;
        check_uniform_write(SOURCE, self.size(), offset, data.len())?;
        with_recorder(&self.recorder, |recorder| recorder.wait_in_flight())?;
        self.buffer.write(offset, data)
    }

    fn bind(&self, slot: u32) -> Result<()> {
        self.guard.ensure_current()?;
        let needed = lock_context(self.guard.context())?.bind_uniform_slot(slot, self.guard.key());
        if !needed {
            return Ok(());
        }
        let (handle, size) = (self.buffer.handle(), self.buffer.size());
        with_recorder(&self.recorder, |recorder| {
            recorder.bind_uniform_buffer(slot, handle, size);
            Ok(())
        })
    }

    fn resource_key(&self) -> ResourceKey {
        self.guard.key()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanUniformBuffer {
    fn drop(&mut self) {
        let handle = self.buffer.handle();
        let _ = with_recorder(&self.recorder, |recorder| {
            recorder.release_buffer(handle);
            Ok(())
        });
    }
}
