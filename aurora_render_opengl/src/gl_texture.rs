/// OpenGL 2D textures

use std::any::Any;
use std::sync::Arc;
use glow::HasContext;
use aurora_render::aurora::Result;
use aurora_render::aurora::render::{
    PixelBuffer, ResourceGuard, ResourceKey, ResourceKind, SharedContext, Texture, TextureFormat,
};
use aurora_render::{engine_bail_warn, engine_debug, engine_err};
use crate::gl_conversion::{texture_format, unpack_alignment};
use crate::gl_device::GlDevice;

const SOURCE: &str = "aurora::opengl::Texture";

/// Create a linearly filtered 2D texture, filled from `pixels` when given
///
/// The texture binding of the active unit is restored afterwards.
pub(crate) fn allocate_texture_2d(
    device: &GlDevice,
    width: u32,
    height: u32,
    format: TextureFormat,
    wrap: u32,
    pixels: Option<&[u8]>,
) -> Result<glow::NativeTexture> {
    let Some((internal, pixel_format, pixel_type)) = texture_format(format) else {
        engine_bail_warn!(SOURCE, "{:?} cannot be used as a color texture", format);
    };
    let gl = device.gl();
    let previous = device.bound_object(glow::TEXTURE_BINDING_2D).map(glow::NativeTexture);
    let texture = unsafe { gl.create_texture() }
        .map_err(|e| engine_err!(SOURCE, "Failed to create texture: {}", e))?;

    unsafe {
        gl.bind_texture(glow::TEXTURE_2D, Some(texture));
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, wrap as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, wrap as i32);
        gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, unpack_alignment(format, width));
        gl.tex_image_2d(
            glow::TEXTURE_2D,
            0,
            internal,
            width as i32,
            height as i32,
            0,
            pixel_format,
            pixel_type,
            pixels,
        );
        gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 4);
        gl.bind_texture(glow::TEXTURE_2D, previous);
    }

    if let Err(e) = device.check_error("texture upload") {
        unsafe { gl.delete_texture(texture) };
        return Err(e);
    }
    Ok(texture)
}

/// Bind `texture` to texture unit `slot`
pub(crate) fn bind_texture_unit(device: &GlDevice, slot: u32, texture: glow::NativeTexture) {
    unsafe {
        let gl = device.gl();
        gl.active_texture(glow::TEXTURE0 + slot);
        gl.bind_texture(glow::TEXTURE_2D, Some(texture));
    }
}

pub struct GlTexture {
    device: Arc<GlDevice>,
    handle: glow::NativeTexture,
    width: u32,
    height: u32,
    format: TextureFormat,
    guard: ResourceGuard,
}

impl GlTexture {
    pub fn new(device: &Arc<GlDevice>, context: &SharedContext, pixels: &PixelBuffer) -> Result<Self> {
        let handle = allocate_texture_2d(
            device,
            pixels.width,
            pixels.height,
            pixels.format,
            glow::REPEAT,
            Some(&pixels.data),
        )?;
        engine_debug!(SOURCE, "Texture {}x{} {:?} uploaded", pixels.width, pixels.height, pixels.format);
        let guard = match ResourceGuard::register(context, ResourceKind::Texture, "texture") {
            Ok(guard) => guard,
            Err(e) => {
                unsafe { device.gl().delete_texture(handle) };
                return Err(e);
            }
        };
        Ok(Self {
            device: device.clone(),
            handle,
            width: pixels.width,
            height: pixels.height,
            format: pixels.format,
            guard,
        })
    }

    pub fn handle(&self) -> glow::NativeTexture {
        self.handle
    }
}

impl Texture for GlTexture {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn bind(&self, slot: u32) -> Result<()> {
        self.guard.ensure_current()?;
        bind_texture_unit(&self.device, slot, self.handle);
        Ok(())
    }

    fn resource_key(&self) -> ResourceKey {
        self.guard.key()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for GlTexture {
    fn drop(&mut self) {
        unsafe { self.device.gl().delete_texture(self.handle) };
    }
}
