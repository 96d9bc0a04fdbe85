/// Vertex array: the bindable draw unit.
///
/// A VertexArray owns its vertex buffers (in insertion order, the index in
/// the list is the binding slot) and at most one index buffer. It folds the
/// layouts of all vertex buffers into one input layout where attribute
/// locations run on from one buffer to the next, and matrices take one
/// location per column.
///
/// The native side (a GL VAO, or recorded Vulkan binds) lives behind
/// `VertexArrayTarget`, created by the active backend.

use std::any::Any;
use crate::error::Result;
use crate::render::buffer::{IndexBuffer, VertexBuffer};
use crate::render::buffer_layout::ShaderDataType;
use crate::render::context::{lock_context, ResourceGuard, ResourceKey, ResourceKind, SharedContext};
use crate::engine_trace;

// ===== INPUT LAYOUT =====

/// One attribute location fed from one vertex buffer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Shader input location
    pub location: u32,
    /// Vertex buffer slot the data comes from
    pub binding: u32,
    /// Declared type of the owning element (a Mat4 element yields four attributes)
    pub data_type: ShaderDataType,
    /// Components read at this location
    pub components: u32,
    /// Byte offset inside one vertex
    pub offset: u32,
    pub normalized: bool,
    pub name: String,
}

/// Per-slot stride
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBindingDesc {
    pub binding: u32,
    pub stride: u32,
}

/// Aggregated input state of a vertex array
///
/// Also serves as part of the Vulkan pipeline cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexInputLayout {
    pub bindings: Vec<VertexBindingDesc>,
    pub attributes: Vec<VertexAttribute>,
}

// ===== BACKEND TARGET =====

/// Backend side of a vertex array
pub trait VertexArrayTarget: Send + Sync {
    /// Record a new vertex buffer at `binding` with its attributes
    fn attach_vertex_buffer(
        &mut self,
        binding: u32,
        buffer: &dyn VertexBuffer,
        attributes: &[VertexAttribute],
    ) -> Result<()>;

    /// Record the (replacement) index buffer
    fn attach_index_buffer(&mut self, buffer: &dyn IndexBuffer) -> Result<()>;

    /// Establish the whole input state
    fn bind(
        &self,
        vertex_buffers: &[Box<dyn VertexBuffer>],
        index_buffer: Option<&dyn IndexBuffer>,
    ) -> Result<()>;

    fn unbind(&self) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

// ===== VERTEX ARRAY =====

pub struct VertexArray {
    target: Box<dyn VertexArrayTarget>,
    vertex_buffers: Vec<Box<dyn VertexBuffer>>,
    index_buffer: Option<Box<dyn IndexBuffer>>,
    input_layout: VertexInputLayout,
    next_location: u32,
    guard: ResourceGuard,
}

impl VertexArray {
    pub fn new(context: &SharedContext, target: Box<dyn VertexArrayTarget>) -> Result<Self> {
        Ok(Self {
            target,
            vertex_buffers: Vec::new(),
            index_buffer: None,
            input_layout: VertexInputLayout::default(),
            next_location: 0,
            guard: ResourceGuard::register(context, ResourceKind::VertexArray, "vertex array")?,
        })
    }

    /// Append a vertex buffer at the next binding slot
    ///
    /// The buffer's layout must be valid (non-empty, offsets up to date).
    pub fn add_vertex_buffer(&mut self, buffer: Box<dyn VertexBuffer>) -> Result<()> {
        self.guard.ensure_current()?;
        let layout = buffer.layout();
        layout.validate()?;

        let binding = self.vertex_buffers.len() as u32;
        let mut attributes = Vec::with_capacity(layout.location_count() as usize);
        let mut location = self.next_location;
        for element in layout {
            let ty = element.data_type;
            let components = ty.components_per_location();
            let column_size = ty.size() / ty.location_count();
            for column in 0..ty.location_count() {
                attributes.push(VertexAttribute {
                    location,
                    binding,
                    data_type: ty,
                    components,
                    offset: element.offset + column * column_size,
                    normalized: element.normalized,
                    name: element.name.clone(),
                });
                location += 1;
            }
        }

        self.target.attach_vertex_buffer(binding, buffer.as_ref(), &attributes)?;

        self.input_layout.bindings.push(VertexBindingDesc { binding, stride: layout.stride() });
        self.input_layout.attributes.extend(attributes);
        self.next_location = location;
        self.vertex_buffers.push(buffer);
        self.invalidate_binding()?;

        engine_trace!("aurora::VertexArray",
            "Attached vertex buffer at slot {} ({} locations in use)", binding, self.next_location);
        Ok(())
    }

    /// Set the index buffer, replacing any previous one
    pub fn set_index_buffer(&mut self, buffer: Box<dyn IndexBuffer>) -> Result<()> {
        self.guard.ensure_current()?;
        self.target.attach_index_buffer(buffer.as_ref())?;
        self.index_buffer = Some(buffer);
        self.invalidate_binding()
    }

    /// Forget the cached bind so the next `bind` re-establishes the full input state
    fn invalidate_binding(&self) -> Result<()> {
        lock_context(self.guard.context())?.unbind_vertex_array(self.guard.key());
        Ok(())
    }

    /// Bind all vertex buffers and the index buffer as one unit
    ///
    /// Skipped when the context already has this vertex array bound.
    pub fn bind(&self) -> Result<()> {
        self.guard.ensure_current()?;
        let key = self.guard.key();
        let needed = lock_context(self.guard.context())?.bind_vertex_array(key);
        if !needed {
            return Ok(());
        }
        if let Err(e) = self.target.bind(&self.vertex_buffers, self.index_buffer.as_deref()) {
            lock_context(self.guard.context())?.unbind_vertex_array(key);
            return Err(e);
        }
        Ok(())
    }

    pub fn unbind(&self) -> Result<()> {
        let was_bound = lock_context(self.guard.context())?.unbind_vertex_array(self.guard.key());
        if was_bound {
            self.target.unbind()?;
        }
        Ok(())
    }

    /// Index count of the index buffer, 0 when none is set
    pub fn index_count(&self) -> u32 {
        self.index_buffer.as_ref().map_or(0, |ib| ib.count())
    }

    /// Vertex buffers in insertion order
    pub fn vertex_buffers(&self) -> &[Box<dyn VertexBuffer>] {
        &self.vertex_buffers
    }

    /// Mutable access for dynamic vertex updates
    pub fn vertex_buffer_mut(&mut self, slot: usize) -> Option<&mut (dyn VertexBuffer + 'static)> {
        self.vertex_buffers.get_mut(slot).map(|vb| vb.as_mut())
    }

    pub fn index_buffer(&self) -> Option<&dyn IndexBuffer> {
        self.index_buffer.as_deref()
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.input_layout.attributes
    }

    pub fn input_layout(&self) -> &VertexInputLayout {
        &self.input_layout
    }

    pub fn target(&self) -> &dyn VertexArrayTarget {
        self.target.as_ref()
    }

    pub fn resource_key(&self) -> ResourceKey {
        self.guard.key()
    }

    pub fn epoch(&self) -> u64 {
        self.guard.epoch()
    }

    /// Still valid in the current epoch (no backend switch since creation)
    pub fn is_current(&self) -> bool {
        self.guard.is_current()
    }

    pub fn ensure_current(&self) -> Result<()> {
        self.guard.ensure_current()
    }
}

#[cfg(test)]
#[path = "vertex_array_tests.rs"]
mod tests;
