/// OpenGL vertex, index and uniform buffers
///
/// Uploads go through `COPY_WRITE_BUFFER` so writing a buffer never
/// disturbs the element buffer recorded in the currently bound VAO.

use std::any::Any;
use std::sync::Arc;
use glow::HasContext;
use aurora_render::aurora::Result;
use aurora_render::aurora::render::{
    check_buffer_write, check_uniform_write, index_bytes, lock_context, BufferLayout, BufferUsage, IndexBuffer,
    ResourceGuard, ResourceKey, ResourceKind, SharedContext, UniformBuffer, VertexBuffer,
};
use aurora_render::{engine_bail_warn, engine_err, engine_trace};
use crate::gl_conversion::buffer_usage;
use crate::gl_device::GlDevice;

const SOURCE: &str = "aurora::opengl::Buffer";

// ===== RAW BUFFER =====

/// Byte size or offset as the GLsizeiptr / GLintptr glow takes
///
/// glow passes both as i32, so anything past 2 GiB is rejected rather
/// than truncated.
pub(crate) fn gl_byte_size(value: u64, label: &str) -> Result<i32> {
    match i32::try_from(value) {
        Ok(value) => Ok(value),
        Err(_) => {
            engine_bail_warn!(SOURCE, "{} of {} bytes exceeds the OpenGL limit of {} bytes", label, value, i32::MAX);
        }
    }
}

/// One GL buffer object with its size
pub(crate) struct GlBuffer {
    device: Arc<GlDevice>,
    handle: glow::NativeBuffer,
    size: u64,
}

impl GlBuffer {
    /// Allocate `size` bytes, filled from `data` when given
    pub(crate) fn new(device: &Arc<GlDevice>, data: Option<&[u8]>, size: u64, usage: u32, label: &str) -> Result<Self> {
        let gl_size = gl_byte_size(size, label)?;
        let gl = device.gl();
        let handle = unsafe { gl.create_buffer() }
            .map_err(|e| engine_err!(SOURCE, "Failed to create {}: {}", label, e))?;
        unsafe {
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(handle));
            match data {
                Some(data) => gl.buffer_data_u8_slice(glow::COPY_WRITE_BUFFER, data, usage),
                None => gl.buffer_data_size(glow::COPY_WRITE_BUFFER, gl_size, usage),
            }
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
        }
        if let Err(e) = device.check_error(label) {
            unsafe { gl.delete_buffer(handle) };
            return Err(e);
        }
        engine_trace!(SOURCE, "Created {} ({} bytes)", label, size);
        Ok(Self { device: device.clone(), handle, size })
    }

    pub(crate) fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let offset = gl_byte_size(offset, "write offset")?;
        let gl = self.device.gl();
        unsafe {
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(self.handle));
            gl.buffer_sub_data_u8_slice(glow::COPY_WRITE_BUFFER, offset, data);
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
        }
        Ok(())
    }

    pub(crate) fn handle(&self) -> glow::NativeBuffer {
        self.handle
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for GlBuffer {
    fn drop(&mut self) {
        unsafe { self.device.gl().delete_buffer(self.handle) };
    }
}

// ===== VERTEX BUFFER =====

pub struct GlVertexBuffer {
    buffer: GlBuffer,
    layout: BufferLayout,
    usage: BufferUsage,
    guard: ResourceGuard,
}

impl GlVertexBuffer {
    pub fn new(
        device: &Arc<GlDevice>,
        context: &SharedContext,
        data: &[u8],
        layout: BufferLayout,
        usage: BufferUsage,
    ) -> Result<Self> {
        let buffer = GlBuffer::new(device, Some(data), data.len() as u64, buffer_usage(usage), "vertex buffer")?;
        Ok(Self {
            buffer,
            layout,
            usage,
            guard: ResourceGuard::register(context, ResourceKind::VertexBuffer, "vertex buffer")?,
        })
    }

    pub fn handle(&self) -> glow::NativeBuffer {
        self.buffer.handle()
    }
}

impl VertexBuffer for GlVertexBuffer {
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
        self.buffer.write(offset, data)
    }

    fn bind(&self) -> Result<()> {
        self.guard.ensure_current()?;
        unsafe { self.buffer.device.gl().bind_buffer(glow::ARRAY_BUFFER, Some(self.buffer.handle())) };
        Ok(())
    }

    fn unbind(&self) -> Result<()> {
        unsafe { self.buffer.device.gl().bind_buffer(glow::ARRAY_BUFFER, None) };
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

pub struct GlIndexBuffer {
    buffer: GlBuffer,
    count: u32,
    guard: ResourceGuard,
}

impl GlIndexBuffer {
    pub fn new(device: &Arc<GlDevice>, context: &SharedContext, indices: &[u32]) -> Result<Self> {
        let data = index_bytes(indices);
        let buffer = GlBuffer::new(device, Some(data), data.len() as u64, glow::STATIC_DRAW, "index buffer")?;
        Ok(Self {
            buffer,
            count: indices.len() as u32,
            guard: ResourceGuard::register(context, ResourceKind::IndexBuffer, "index buffer")?,
        })
    }

    pub fn handle(&self) -> glow::NativeBuffer {
        self.buffer.handle()
    }
}

impl IndexBuffer for GlIndexBuffer {
    fn count(&self) -> u32 {
        self.count
    }

    /// Records the buffer into whichever VAO is bound
    fn bind(&self) -> Result<()> {
        self.guard.ensure_current()?;
        unsafe { self.buffer.device.gl().bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(self.buffer.handle())) };
        Ok(())
    }

    fn unbind(&self) -> Result<()> {
        unsafe { self.buffer.device.gl().bind_buffer(glow::ELEMENT_ARRAY_BUFFER, None) };
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

pub struct GlUniformBuffer {
    name: String,
    buffer: GlBuffer,
    guard: ResourceGuard,
}

impl GlUniformBuffer {
    pub fn new(device: &Arc<GlDevice>, context: &SharedContext, name: &str, size: u64) -> Result<Self> {
        gl_byte_size(size, name)?;
        let zeroes = vec![0u8; size as usize];
        let buffer = GlBuffer::new(device, Some(&zeroes), size, glow::DYNAMIC_DRAW, name)?;
        Ok(Self {
            name: name.to_string(),
            buffer,
            guard: ResourceGuard::register(context, ResourceKind::UniformBuffer, name)?,
        })
    }
}

impl UniformBuffer for GlUniformBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.buffer.size()
    }

    fn set_data(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.guard.ensure_current()?;
        check_uniform_write(SOURCE, self.size(), offset, data.len())?;
        self.buffer.write(offset, data)
    }

    fn bind(&self, slot: u32) -> Result<()> {
        self.guard.ensure_current()?;
        let needed = lock_context(self.guard.context())?.bind_uniform_slot(slot, self.guard.key());
        if needed {
            unsafe {
                self.buffer.device.gl().bind_buffer_base(glow::UNIFORM_BUFFER, slot, Some(self.buffer.handle()));
            }
        }
        Ok(())
    }

    fn resource_key(&self) -> ResourceKey {
        self.guard.key()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
#[path = "gl_buffer_tests.rs"]
mod tests;
