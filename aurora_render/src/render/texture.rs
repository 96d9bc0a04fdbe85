/// Texture trait, texture formats, and the decoded pixel buffer contract

use std::any::Any;
use crate::error::Result;
use crate::render::context::ResourceKey;
use crate::engine_bail_warn;

/// Texture and attachment format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    Rgb8,
    R8,
    Bgra8,
    Depth24Stencil8,
    Depth32F,
}

impl TextureFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8 => 4,
            TextureFormat::Rgb8 => 3,
            TextureFormat::R8 => 1,
            TextureFormat::Bgra8 => 4,
            TextureFormat::Depth24Stencil8 => 4,
            TextureFormat::Depth32F => 4,
        }
    }

    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth24Stencil8 | TextureFormat::Depth32F)
    }

    /// Format matching a decoder's channel count
    pub fn from_channels(channels: u32) -> Option<Self> {
        match channels {
            1 => Some(TextureFormat::R8),
            3 => Some(TextureFormat::Rgb8),
            4 => Some(TextureFormat::Rgba8),
            _ => None,
        }
    }
}

// ===== PIXEL BUFFER =====

/// Decoded image handed over by an image decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub bits_per_pixel: u32,
}

impl PixelBuffer {
    /// Validate a decoded image
    ///
    /// The bit depth must agree with the format and the byte count must be
    /// exactly width * height * bytes per pixel.
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: TextureFormat, bits_per_pixel: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            engine_bail_warn!("aurora::PixelBuffer", "Pixel buffer has zero size ({}x{})", width, height);
        }
        if format.is_depth() {
            engine_bail_warn!("aurora::PixelBuffer", "Pixel buffer cannot carry depth format {:?}", format);
        }
        if bits_per_pixel != format.bytes_per_pixel() * 8 {
            engine_bail_warn!("aurora::PixelBuffer",
                "{} bits per pixel does not match format {:?}", bits_per_pixel, format);
        }
        let expected = width as u64 * height as u64 * format.bytes_per_pixel() as u64;
        if data.len() as u64 != expected {
            engine_bail_warn!("aurora::PixelBuffer",
                "Pixel buffer holds {} bytes, {}x{} {:?} needs {}", data.len(), width, height, format, expected);
        }
        Ok(Self { data, width, height, format, bits_per_pixel })
    }

    /// Single-color image, handy for placeholder textures
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba.repeat((width * height) as usize);
        Self { data, width, height, format: TextureFormat::Rgba8, bits_per_pixel: 32 }
    }

    /// Bytes per row
    pub fn row_pitch(&self) -> u32 {
        self.width * self.format.bytes_per_pixel()
    }
}

// ===== TEXTURE TRAIT =====

/// Sampled 2D texture or framebuffer attachment
pub trait Texture: Send + Sync {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn format(&self) -> TextureFormat;

    /// Attach to texture unit / sampler slot `slot`
    fn bind(&self, slot: u32) -> Result<()>;

    fn resource_key(&self) -> ResourceKey;

    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
