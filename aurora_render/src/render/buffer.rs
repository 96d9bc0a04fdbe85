/// Vertex, index and uniform buffer traits.
///
/// Each buffer wraps one GPU allocation plus a backend handle and is owned
/// exclusively (`Box<dyn ..>`). Dropping the box frees the GPU resource.
///
/// Binding asymmetry between backends is deliberate: an OpenGL bind changes
/// the single current context, a Vulkan bind is recorded into the frame's
/// command buffer and has no global effect.

use std::any::Any;
use crate::error::Result;
use crate::render::buffer_layout::BufferLayout;
use crate::render::context::ResourceKey;
use crate::engine_bail_warn;

/// Update frequency hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BufferUsage {
    /// Uploaded once at creation
    #[default]
    Static,
    /// Expected to be rewritten through `set_data`
    Dynamic,
}

/// GPU buffer holding vertex data described by a BufferLayout
pub trait VertexBuffer: Send + Sync {
    /// Layout of one vertex
    fn layout(&self) -> &BufferLayout;

    /// Size in bytes
    fn size(&self) -> u64;

    fn usage(&self) -> BufferUsage;

    /// Overwrite `data.len()` bytes starting at `offset`
    ///
    /// Fails on static buffers and on writes past the end.
    fn set_data(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Attach to the vertex input binding point
    fn bind(&self) -> Result<()>;

    fn unbind(&self) -> Result<()>;

    fn resource_key(&self) -> ResourceKey;

    fn as_any(&self) -> &dyn Any;
}

/// GPU buffer of 32-bit indices
pub trait IndexBuffer: Send + Sync {
    /// Number of indices
    fn count(&self) -> u32;

    /// Attach to the index input binding point
    fn bind(&self) -> Result<()>;

    fn unbind(&self) -> Result<()>;

    fn resource_key(&self) -> ResourceKey;

    fn as_any(&self) -> &dyn Any;
}

/// Named GPU buffer bound to a shader-visible slot
///
/// Several uniform buffers may be live at once, each at its own slot.
pub trait UniformBuffer: Send + Sync {
    /// Block name used to match shader reflection
    fn name(&self) -> &str;

    /// Size in bytes
    fn size(&self) -> u64;

    fn set_data(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Attach to binding index `slot`
    fn bind(&self, slot: u32) -> Result<()>;

    fn resource_key(&self) -> ResourceKey;

    fn as_any(&self) -> &dyn Any;
}

/// Reinterpret indices as bytes for upload
pub fn index_bytes(indices: &[u32]) -> &[u8] {
    bytemuck::cast_slice(indices)
}

/// Shared argument checks for `set_data` implementations
pub fn check_buffer_write(source: &str, usage: BufferUsage, size: u64, offset: u64, len: usize) -> Result<()> {
    if usage == BufferUsage::Static {
        engine_bail_warn!(source, "set_data called on a static buffer");
    }
    let end = offset.checked_add(len as u64);
    if end.map_or(true, |end| end > size) {
        engine_bail_warn!(source,
            "Write of {} bytes at offset {} exceeds buffer size {}", len, offset, size);
    }
    Ok(())
}

/// Bounds check for uniform buffers (always writable)
pub fn check_uniform_write(source: &str, size: u64, offset: u64, len: usize) -> Result<()> {
    check_buffer_write(source, BufferUsage::Dynamic, size, offset, len)
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
