/// OpenGL vertex array object
///
/// The VAO captures the attribute pointers and the element buffer when
/// they are attached, so binding the vertex array is a single
/// `glBindVertexArray`.

use std::any::Any;
use std::sync::Arc;
use glow::HasContext;
use aurora_render::aurora::Result;
use aurora_render::aurora::render::{IndexBuffer, VertexArrayTarget, VertexAttribute, VertexBuffer};
use aurora_render::{engine_bail_warn, engine_err, engine_trace};
use crate::gl_buffer::{GlIndexBuffer, GlVertexBuffer};
use crate::gl_conversion::attribute_type;
use crate::gl_device::GlDevice;

const SOURCE: &str = "aurora::opengl::VertexArray";

/// Arguments of one `glVertexAttrib*Pointer` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AttributePointer {
    pub location: u32,
    pub size: i32,
    pub data_type: u32,
    /// Integer attributes go through `glVertexAttribIPointer`
    pub integer: bool,
    pub normalized: bool,
    pub stride: i32,
    pub offset: i32,
}

impl AttributePointer {
    pub(crate) fn new(attribute: &VertexAttribute, stride: u32) -> Self {
        Self {
            location: attribute.location,
            size: attribute.components as i32,
            data_type: attribute_type(attribute.data_type),
            integer: attribute.data_type.is_integer(),
            normalized: attribute.normalized,
            stride: stride as i32,
            offset: attribute.offset as i32,
        }
    }
}

pub struct GlVertexArrayTarget {
    device: Arc<GlDevice>,
    handle: glow::NativeVertexArray,
}

impl GlVertexArrayTarget {
    pub fn new(device: &Arc<GlDevice>) -> Result<Self> {
        let handle = unsafe { device.gl().create_vertex_array() }
            .map_err(|e| engine_err!(SOURCE, "Failed to create vertex array: {}", e))?;
        Ok(Self { device: device.clone(), handle })
    }

    /// Run `f` with this VAO bound, then restore the previous one
    fn with_vao(&self, f: impl FnOnce(&glow::Context)) {
        let gl = self.device.gl();
        let previous = self.device.bound_object(glow::VERTEX_ARRAY_BINDING).map(glow::NativeVertexArray);
        unsafe { gl.bind_vertex_array(Some(self.handle)) };
        f(gl);
        unsafe { gl.bind_vertex_array(previous) };
    }
}

impl VertexArrayTarget for GlVertexArrayTarget {
    fn attach_vertex_buffer(
        &mut self,
        binding: u32,
        buffer: &dyn VertexBuffer,
        attributes: &[VertexAttribute],
    ) -> Result<()> {
        let Some(buffer) = buffer.as_any().downcast_ref::<GlVertexBuffer>() else {
            engine_bail_warn!(SOURCE, "Vertex buffer was not created by the OpenGL backend");
        };
        let stride = buffer.layout().stride();
        let pointers: Vec<AttributePointer> = attributes
            .iter()
            .map(|attribute| AttributePointer::new(attribute, stride))
            .collect();

        self.with_vao(|gl| unsafe {
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer.handle()));
            for pointer in &pointers {
                gl.enable_vertex_attrib_array(pointer.location);
                if pointer.integer {
                    gl.vertex_attrib_pointer_i32(
                        pointer.location, pointer.size, pointer.data_type, pointer.stride, pointer.offset);
                } else {
                    gl.vertex_attrib_pointer_f32(
                        pointer.location, pointer.size, pointer.data_type, pointer.normalized,
                        pointer.stride, pointer.offset);
                }
            }
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
        });
        engine_trace!(SOURCE, "Binding {}: {} attribute locations, stride {}", binding, pointers.len(), stride);
        self.device.check_error("vertex attribute setup")
    }

    fn attach_index_buffer(&mut self, buffer: &dyn IndexBuffer) -> Result<()> {
        let Some(buffer) = buffer.as_any().downcast_ref::<GlIndexBuffer>() else {
            engine_bail_warn!(SOURCE, "Index buffer was not created by the OpenGL backend");
        };
        self.with_vao(|gl| unsafe {
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(buffer.handle()));
        });
        Ok(())
    }

    fn bind(&self, _vertex_buffers: &[Box<dyn VertexBuffer>], _index_buffer: Option<&dyn IndexBuffer>) -> Result<()> {
        unsafe { self.device.gl().bind_vertex_array(Some(self.handle)) };
        Ok(())
    }

    fn unbind(&self) -> Result<()> {
        unsafe { self.device.gl().bind_vertex_array(None) };
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for GlVertexArrayTarget {
    fn drop(&mut self) {
        unsafe { self.device.gl().delete_vertex_array(self.handle) };
    }
}

#[cfg(test)]
#[path = "gl_vertex_array_tests.rs"]
mod tests;
