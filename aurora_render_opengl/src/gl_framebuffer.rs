/// OpenGL offscreen framebuffer
///
/// A sampled color texture plus an optional depth renderbuffer. The
/// viewport is not touched here: the backend applies the context viewport
/// before each draw.

use std::any::Any;
use std::sync::Arc;
use glow::HasContext;
use aurora_render::aurora::Result;
use aurora_render::aurora::render::{FramebufferSpec, FramebufferTarget, TextureFormat};
use aurora_render::{engine_bail_warn, engine_debug, engine_err};
use crate::gl_conversion::{depth_format, framebuffer_status_name};
use crate::gl_device::GlDevice;
use crate::gl_texture::{allocate_texture_2d, bind_texture_unit};

const SOURCE: &str = "aurora::opengl::Framebuffer";

struct Attachments {
    framebuffer: glow::NativeFramebuffer,
    color: glow::NativeTexture,
    depth: Option<glow::NativeRenderbuffer>,
}

pub struct GlFramebufferTarget {
    device: Arc<GlDevice>,
    color_format: TextureFormat,
    depth_format: Option<TextureFormat>,
    attachments: Option<Attachments>,
    clear_color: [f32; 4],
}

impl GlFramebufferTarget {
    pub fn new(device: &Arc<GlDevice>, spec: &FramebufferSpec) -> Result<Self> {
        if let Some(format) = spec.depth_format {
            if depth_format(format).is_none() {
                engine_bail_warn!(SOURCE, "{:?} is not a depth format", format);
            }
        }
        let mut target = Self {
            device: device.clone(),
            color_format: spec.color_format,
            depth_format: spec.depth_format,
            attachments: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        };
        target.attachments = Some(target.create_attachments(spec.width, spec.height)?);
        Ok(target)
    }

    fn create_attachments(&self, width: u32, height: u32) -> Result<Attachments> {
        let gl = self.device.gl();
        let color = allocate_texture_2d(&self.device, width, height, self.color_format, glow::CLAMP_TO_EDGE, None)?;
        let previous = self.device.bound_object(glow::FRAMEBUFFER_BINDING).map(glow::NativeFramebuffer);

        let framebuffer = match unsafe { gl.create_framebuffer() } {
            Ok(framebuffer) => framebuffer,
            Err(e) => {
                unsafe { gl.delete_texture(color) };
                return Err(engine_err!(SOURCE, "Failed to create framebuffer: {}", e));
            }
        };
        let mut attachments = Attachments { framebuffer, color, depth: None };

        let status = unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            gl.framebuffer_texture_2d(glow::FRAMEBUFFER, glow::COLOR_ATTACHMENT0, glow::TEXTURE_2D, Some(color), 0);

            if let Some((storage, attachment)) = self.depth_format.and_then(depth_format) {
                match gl.create_renderbuffer() {
                    Ok(depth) => {
                        gl.bind_renderbuffer(glow::RENDERBUFFER, Some(depth));
                        gl.renderbuffer_storage(glow::RENDERBUFFER, storage, width as i32, height as i32);
                        gl.bind_renderbuffer(glow::RENDERBUFFER, None);
                        gl.framebuffer_renderbuffer(glow::FRAMEBUFFER, attachment, glow::RENDERBUFFER, Some(depth));
                        attachments.depth = Some(depth);
                    }
                    Err(e) => {
                        gl.bind_framebuffer(glow::FRAMEBUFFER, previous);
                        self.delete_attachments(attachments);
                        return Err(engine_err!(SOURCE, "Failed to create depth renderbuffer: {}", e));
                    }
                }
            }

            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, previous);
            status
        };

        if status != glow::FRAMEBUFFER_COMPLETE {
            self.delete_attachments(attachments);
            return Err(engine_err!(SOURCE, "Framebuffer {}x{} is {}", width, height, framebuffer_status_name(status)));
        }
        engine_debug!(SOURCE, "Framebuffer {}x{} created (depth: {:?})", width, height, self.depth_format);
        Ok(attachments)
    }

    fn delete_attachments(&self, attachments: Attachments) {
        let gl = self.device.gl();
        unsafe {
            gl.delete_texture(attachments.color);
            if let Some(depth) = attachments.depth {
                gl.delete_renderbuffer(depth);
            }
            gl.delete_framebuffer(attachments.framebuffer);
        }
    }

    fn attachments(&self) -> Result<&Attachments> {
        match self.attachments.as_ref() {
            Some(attachments) => Ok(attachments),
            None => engine_bail_warn!(SOURCE, "Framebuffer has been released"),
        }
    }

    pub fn color_texture(&self) -> Option<glow::NativeTexture> {
        self.attachments.as_ref().map(|a| a.color)
    }
}

impl FramebufferTarget for GlFramebufferTarget {
    fn bind(&mut self) -> Result<()> {
        let framebuffer = self.attachments()?.framebuffer;
        unsafe { self.device.gl().bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer)) };
        Ok(())
    }

    fn unbind(&mut self) -> Result<()> {
        unsafe { self.device.gl().bind_framebuffer(glow::FRAMEBUFFER, None) };
        Ok(())
    }

    fn set_clear_color(&mut self, color: [f32; 4]) -> Result<()> {
        self.clear_color = color;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.attachments()?;
        let mut mask = glow::COLOR_BUFFER_BIT;
        if self.depth_format.is_some() {
            mask |= glow::DEPTH_BUFFER_BIT | glow::STENCIL_BUFFER_BIT;
        }
        let [r, g, b, a] = self.clear_color;
        let gl = self.device.gl();
        unsafe {
            gl.clear_color(r, g, b, a);
            gl.clear(mask);
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let bound = self.device.bound_object(glow::FRAMEBUFFER_BINDING);
        let attachments = self.create_attachments(width, height)?;
        let framebuffer = attachments.framebuffer;
        if let Some(old) = self.attachments.replace(attachments) {
            let was_bound = bound == Some(old.framebuffer.0);
            self.delete_attachments(old);
            if was_bound {
                unsafe { self.device.gl().bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer)) };
            }
        }
        Ok(())
    }

    fn bind_color_attachment(&self, slot: u32) -> Result<()> {
        let color = self.attachments()?.color;
        bind_texture_unit(&self.device, slot, color);
        Ok(())
    }

    fn has_depth_attachment(&self) -> bool {
        self.depth_format.is_some()
    }

    fn release(&mut self) {
        if let Some(attachments) = self.attachments.take() {
            self.delete_attachments(attachments);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for GlFramebufferTarget {
    fn drop(&mut self) {
        self.release();
    }
}
