/// Off-screen framebuffer with single-binding tracking.
///
/// States: Unbound, Bound. The render context holds the one bound
/// framebuffer record; binding another framebuffer replaces it.
///
/// - `bind` makes this the bound framebuffer and sets the viewport to
///   (0, 0, width, height).
/// - `unbind` restores the default framebuffer and the window viewport.
/// - `set_clear_color` / `clear` act directly when bound. Otherwise they
///   bind, act, unbind, then re-bind whatever framebuffer was bound before
///   and restore its viewport.
/// - Dropping a bound framebuffer unbinds it before the attachments are
///   released, so the context never points at a released target.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};
use crate::error::{Error, Result};
use crate::render::context::{
    lock_context, BoundFramebuffer, ResourceGuard, ResourceKey, ResourceKind, SharedContext,
    SharedFramebufferTarget, Viewport,
};
use crate::render::texture::TextureFormat;
use crate::{engine_bail_warn, engine_warn};

/// Largest framebuffer edge accepted by `resize`
pub const MAX_FRAMEBUFFER_SIZE: u32 = 8192;

// ===== SPEC =====

/// Framebuffer creation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramebufferSpec {
    pub width: u32,
    pub height: u32,
    pub color_format: TextureFormat,
    /// None for color-only targets
    pub depth_format: Option<TextureFormat>,
}

impl Default for FramebufferSpec {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            color_format: TextureFormat::Rgba8,
            depth_format: Some(TextureFormat::Depth24Stencil8),
        }
    }
}

impl FramebufferSpec {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, ..Default::default() }
    }

    /// Check dimensions and attachment formats
    pub fn validate(&self, max_size: u32) -> Result<()> {
        check_size(self.width, self.height, max_size)?;
        if self.color_format.is_depth() {
            engine_bail_warn!("aurora::Framebuffer",
                "Color attachment cannot use depth format {:?}", self.color_format);
        }
        if let Some(depth) = self.depth_format {
            if !depth.is_depth() {
                engine_bail_warn!("aurora::Framebuffer",
                    "Depth attachment cannot use color format {:?}", depth);
            }
        }
        Ok(())
    }
}

fn check_size(width: u32, height: u32, max_size: u32) -> Result<()> {
    if width == 0 || height == 0 || width > max_size || height > max_size {
        engine_bail_warn!("aurora::Framebuffer",
            "Attempted to size framebuffer to {}x{} (limit {})", width, height, max_size);
    }
    Ok(())
}

// ===== BACKEND TARGET =====

/// Backend side of a framebuffer: the native object and its attachments
pub trait FramebufferTarget: Send + Sync {
    /// Make this the native render target
    fn bind(&mut self) -> Result<()>;

    /// Return to the default (window) render target
    fn unbind(&mut self) -> Result<()>;

    /// Clear color used by `clear`
    fn set_clear_color(&mut self, color: [f32; 4]) -> Result<()>;

    /// Clear color and depth. Only called while bound.
    fn clear(&mut self) -> Result<()>;

    /// Re-create the attachments at a new size
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    /// Sample the color attachment at texture slot `slot`
    fn bind_color_attachment(&self, slot: u32) -> Result<()>;

    fn has_depth_attachment(&self) -> bool;

    /// Release the color attachment, then the depth attachment
    fn release(&mut self);

    fn as_any(&self) -> &dyn Any;
}

// ===== FRAMEBUFFER =====

pub struct Framebuffer {
    target: SharedFramebufferTarget,
    spec: FramebufferSpec,
    clear_color: [f32; 4],
    max_size: u32,
    guard: ResourceGuard,
}

impl Framebuffer {
    pub fn new(
        context: &SharedContext,
        spec: FramebufferSpec,
        target: Box<dyn FramebufferTarget>,
        max_size: u32,
    ) -> Result<Self> {
        spec.validate(max_size)?;
        Ok(Self {
            target: Arc::new(Mutex::new(target)),
            spec,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            max_size,
            guard: ResourceGuard::register(context, ResourceKind::Framebuffer, "framebuffer")?,
        })
    }

    fn lock_target(&self) -> Result<MutexGuard<'_, Box<dyn FramebufferTarget>>> {
        self.target
            .lock()
            .map_err(|_| Error::BackendError("Framebuffer target lock poisoned".to_string()))
    }

    fn record(&self) -> BoundFramebuffer {
        BoundFramebuffer {
            key: self.guard.key(),
            width: self.spec.width,
            height: self.spec.height,
            target: Arc::downgrade(&self.target),
        }
    }

    /// True while this is the context's bound framebuffer
    pub fn is_bound(&self) -> bool {
        match self.guard.context().lock() {
            Ok(ctx) => ctx.bound_framebuffer() == Some(self.guard.key()),
            Err(_) => false,
        }
    }

    /// Unbound -> Bound; sets the viewport to the framebuffer size
    pub fn bind(&self) -> Result<()> {
        self.guard.ensure_current()?;
        if self.is_bound() {
            return Ok(());
        }
        self.lock_target()?.bind()?;

        let mut ctx = lock_context(self.guard.context())?;
        ctx.set_bound_framebuffer(Some(self.record()));
        ctx.set_viewport(Viewport::from_size(self.spec.width, self.spec.height));
        Ok(())
    }

    /// Bound -> Unbound; restores the default framebuffer and window viewport
    pub fn unbind(&self) -> Result<()> {
        if !self.is_bound() {
            return Ok(());
        }
        let native = self.lock_target()?.unbind();

        let mut ctx = lock_context(self.guard.context())?;
        ctx.set_bound_framebuffer(None);
        let default_viewport = ctx.default_viewport();
        ctx.set_viewport(default_viewport);
        native
    }

    /// Run `action` with this framebuffer bound, restoring prior binding state
    fn with_bound<R>(&self, action: impl FnOnce(&mut dyn FramebufferTarget) -> Result<R>) -> Result<R> {
        self.guard.ensure_current()?;
        let (previous, previous_viewport) = {
            let ctx = lock_context(self.guard.context())?;
            (ctx.bound_framebuffer_record().cloned(), ctx.viewport())
        };

        if previous.as_ref().is_some_and(|p| p.key == self.guard.key()) {
            let mut target = self.lock_target()?;
            return action(&mut **target);
        }

        self.bind()?;
        let result = {
            let mut target = self.lock_target()?;
            action(&mut **target)
        };
        self.unbind()?;

        if let Some(previous) = previous {
            if let Some(target) = previous.target.upgrade() {
                let mut target = target
                    .lock()
                    .map_err(|_| Error::BackendError("Framebuffer target lock poisoned".to_string()))?;
                target.bind()?;
                lock_context(self.guard.context())?.set_bound_framebuffer(Some(previous));
            }
        }
        lock_context(self.guard.context())?.set_viewport(previous_viewport);

        result
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) -> Result<()> {
        self.clear_color = color;
        self.with_bound(|target| target.set_clear_color(color))
    }

    pub fn clear(&self) -> Result<()> {
        self.with_bound(|target| target.clear())
    }

    /// Re-create attachments at the new size
    ///
    /// Zero or oversized dimensions are rejected and leave the framebuffer
    /// untouched.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.guard.ensure_current()?;
        check_size(width, height, self.max_size)?;
        if width == self.spec.width && height == self.spec.height {
            return Ok(());
        }

        self.lock_target()?.resize(width, height)?;
        self.spec.width = width;
        self.spec.height = height;

        if self.is_bound() {
            let mut ctx = lock_context(self.guard.context())?;
            ctx.set_bound_framebuffer(Some(self.record()));
            ctx.set_viewport(Viewport::from_size(width, height));
        }
        Ok(())
    }

    /// Sample the color attachment at texture slot `slot`
    pub fn bind_color_attachment(&self, slot: u32) -> Result<()> {
        self.guard.ensure_current()?;
        self.lock_target()?.bind_color_attachment(slot)
    }

    pub fn spec(&self) -> &FramebufferSpec {
        &self.spec
    }

    pub fn width(&self) -> u32 {
        self.spec.width
    }

    pub fn height(&self) -> u32 {
        self.spec.height
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn has_depth_attachment(&self) -> bool {
        self.target.lock().map(|t| t.has_depth_attachment()).unwrap_or(false)
    }

    pub fn resource_key(&self) -> ResourceKey {
        self.guard.key()
    }

    pub fn is_current(&self) -> bool {
        self.guard.is_current()
    }

    /// Downcast access to the backend target
    pub fn with_target<R>(&self, f: impl FnOnce(&dyn FramebufferTarget) -> R) -> Result<R> {
        let target = self.lock_target()?;
        Ok(f(&**target))
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        if self.is_bound() {
            if let Err(e) = self.unbind() {
                engine_warn!("aurora::Framebuffer", "Unbind during drop failed: {}", e);
                if let Ok(mut ctx) = self.guard.context().lock() {
                    ctx.set_bound_framebuffer(None);
                }
            }
        }
        if let Ok(mut target) = self.target.lock() {
            target.release();
        }
    }
}

#[cfg(test)]
#[path = "framebuffer_tests.rs"]
mod tests;
