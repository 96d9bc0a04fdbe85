/// Vulkan vertex array
///
/// Vulkan has no vertex array object: the input layout becomes part of the
/// pipeline key, and binding records the vertex and index buffer binds into
/// the frame's command buffer.

use ash::vk;
use std::any::Any;
use aurora_render::aurora::Result;
use aurora_render::aurora::render::{IndexBuffer, VertexArrayTarget, VertexAttribute, VertexBuffer};
use aurora_render::{engine_bail_warn, engine_trace};
use crate::vulkan_buffer::{VulkanIndexBuffer, VulkanVertexBuffer};
use crate::vulkan_format::attribute_format;
use crate::vulkan_recorder::{with_recorder, WeakRecorder};

const SOURCE: &str = "aurora::vulkan::VertexArray";

fn vertex_handle(buffer: &dyn VertexBuffer) -> Result<vk::Buffer> {
    match buffer.as_any().downcast_ref::<VulkanVertexBuffer>() {
        Some(buffer) => Ok(buffer.handle()),
        None => engine_bail_warn!(SOURCE, "Vertex buffer was not created by the Vulkan backend"),
    }
}

fn index_handle(buffer: &dyn IndexBuffer) -> Result<vk::Buffer> {
    match buffer.as_any().downcast_ref::<VulkanIndexBuffer>() {
        Some(buffer) => Ok(buffer.handle()),
        None => engine_bail_warn!(SOURCE, "Index buffer was not created by the Vulkan backend"),
    }
}

pub struct VulkanVertexArrayTarget {
    recorder: WeakRecorder,
}

impl VulkanVertexArrayTarget {
    pub fn new(recorder: WeakRecorder) -> Self {
        Self { recorder }
    }
}

impl VertexArrayTarget for VulkanVertexArrayTarget {
    fn attach_vertex_buffer(
        &mut self,
        binding: u32,
        buffer: &dyn VertexBuffer,
        attributes: &[VertexAttribute],
    ) -> Result<()> {
        vertex_handle(buffer)?;
        for attribute in attributes {
            engine_trace!(SOURCE, "Binding {} location {}: '{}' as {:?} at +{}",
                binding, attribute.location, attribute.name, attribute_format(attribute), attribute.offset);
        }
        Ok(())
    }

    fn attach_index_buffer(&mut self, buffer: &dyn IndexBuffer) -> Result<()> {
        index_handle(buffer).map(|_| ())
    }

    fn bind(&self, vertex_buffers: &[Box<dyn VertexBuffer>], index_buffer: Option<&dyn IndexBuffer>) -> Result<()> {
        let handles = vertex_buffers
            .iter()
            .map(|buffer| vertex_handle(buffer.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let index = index_buffer.map(index_handle).transpose()?;

        with_recorder(&self.recorder, |recorder| {
            if !handles.is_empty() {
                recorder.bind_vertex_buffers(0, &handles)?;
            }
            if let Some(index) = index {
                recorder.bind_index_buffer(index)?;
            }
            Ok(())
        })
    }

    fn unbind(&self) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
