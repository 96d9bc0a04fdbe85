/// Render context: the binding-state cache shared by every backend resource.
///
/// One context lives for the whole life of a RenderCommand, across
/// backend switches. It replaces process-wide "currently bound" globals
/// with an explicit object handed to each resource as a SharedContext.
///
/// It tracks:
/// - live resources (slotmap keys) and the epoch they were created in,
/// - the single bound framebuffer,
/// - the bound vertex array, shader and uniform-buffer slots,
/// - the active viewport and the window size,
/// - bind statistics (issued vs. skipped as redundant).
///
/// Backend switches call `invalidate_all`, which empties the registry and
/// increments the epoch. Any resource created before that point is stale.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use crate::error::{Error, Result};
use crate::render::framebuffer::FramebufferTarget;
use crate::engine_trace;

new_key_type! {
    /// Stable key of a live backend resource
    pub struct ResourceKey;
}

/// Shared handle to the render context
pub type SharedContext = Arc<Mutex<RenderContext>>;

/// Shared framebuffer target (the context keeps a Weak to it for restore)
pub type SharedFramebufferTarget = Arc<Mutex<Box<dyn FramebufferTarget>>>;

// ===== ENUMS =====

/// Kind of a registered resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    VertexBuffer,
    IndexBuffer,
    UniformBuffer,
    VertexArray,
    Framebuffer,
    Texture,
    Shader,
}

/// How a backend applies binds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingModel {
    /// Binds mutate global context state immediately (OpenGL)
    Immediate,
    /// Binds are recorded into a command buffer (Vulkan, D3D12)
    Deferred,
}

// ===== VIEWPORT =====

/// Viewport rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Viewport covering (0, 0, width, height)
    pub fn from_size(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

/// Bind counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindingStats {
    /// Binds forwarded to the backend
    pub binds: u64,
    /// Binds skipped because the object was already bound
    pub skipped: u64,
}

// ===== BOUND FRAMEBUFFER =====

/// Record of the currently bound framebuffer
///
/// Holds a Weak to the target so a save/restore clear can re-bind it.
/// The record is removed before the framebuffer is released, so the Weak
/// never outlives its framebuffer in practice.
#[derive(Clone)]
pub struct BoundFramebuffer {
    pub key: ResourceKey,
    pub width: u32,
    pub height: u32,
    pub(crate) target: Weak<Mutex<Box<dyn FramebufferTarget>>>,
}

impl std::fmt::Debug for BoundFramebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundFramebuffer")
            .field("key", &self.key)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

struct ResourceEntry {
    kind: ResourceKind,
    label: String,
}

// ===== RENDER CONTEXT =====

pub struct RenderContext {
    binding_model: BindingModel,
    epoch: u64,
    resources: SlotMap<ResourceKey, ResourceEntry>,
    bound_framebuffer: Option<BoundFramebuffer>,
    bound_vertex_array: Option<ResourceKey>,
    bound_shader: Option<ResourceKey>,
    uniform_slots: FxHashMap<u32, ResourceKey>,
    viewport: Viewport,
    window_size: (u32, u32),
    stats: BindingStats,
}

impl RenderContext {
    pub fn new(binding_model: BindingModel, window_width: u32, window_height: u32) -> Self {
        Self {
            binding_model,
            epoch: 0,
            resources: SlotMap::with_key(),
            bound_framebuffer: None,
            bound_vertex_array: None,
            bound_shader: None,
            uniform_slots: FxHashMap::default(),
            viewport: Viewport::from_size(window_width, window_height),
            window_size: (window_width, window_height),
            stats: BindingStats::default(),
        }
    }

    /// Wrap into the shared handle handed to backends
    pub fn into_shared(self) -> SharedContext {
        Arc::new(Mutex::new(self))
    }

    pub fn binding_model(&self) -> BindingModel {
        self.binding_model
    }

    pub fn set_binding_model(&mut self, binding_model: BindingModel) {
        self.binding_model = binding_model;
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    // ===== RESOURCE REGISTRY =====

    pub fn register(&mut self, kind: ResourceKind, label: &str) -> ResourceKey {
        self.resources.insert(ResourceEntry { kind, label: label.to_string() })
    }

    /// Remove a resource and drop every binding that references it
    pub fn unregister(&mut self, key: ResourceKey) -> bool {
        if self.resources.remove(key).is_none() {
            return false;
        }
        if self.bound_framebuffer.as_ref().is_some_and(|fb| fb.key == key) {
            self.bound_framebuffer = None;
            self.viewport = self.default_viewport();
        }
        if self.bound_vertex_array == Some(key) {
            self.bound_vertex_array = None;
        }
        if self.bound_shader == Some(key) {
            self.bound_shader = None;
        }
        self.uniform_slots.retain(|_, bound| *bound != key);
        true
    }

    pub fn is_live(&self, key: ResourceKey) -> bool {
        self.resources.contains_key(key)
    }

    pub fn kind_of(&self, key: ResourceKey) -> Option<ResourceKind> {
        self.resources.get(key).map(|entry| entry.kind)
    }

    pub fn label_of(&self, key: ResourceKey) -> Option<&str> {
        self.resources.get(key).map(|entry| entry.label.as_str())
    }

    pub fn live_count(&self) -> usize {
        self.resources.len()
    }

    pub fn live_count_of(&self, kind: ResourceKind) -> usize {
        self.resources.values().filter(|entry| entry.kind == kind).count()
    }

    /// Forget every resource and binding, and start a new epoch
    ///
    /// Returns the new epoch.
    pub fn invalidate_all(&mut self) -> u64 {
        self.resources.clear();
        self.bound_framebuffer = None;
        self.reset_bindings();
        self.viewport = self.default_viewport();
        self.epoch += 1;
        self.epoch
    }

    /// Frame boundary
    ///
    /// Deferred backends start each frame with a fresh command buffer, so
    /// nothing recorded last frame is bound any more.
    pub fn begin_frame(&mut self) {
        if self.binding_model == BindingModel::Deferred {
            self.reset_bindings();
        }
    }

    /// Drop cached vertex array, shader and uniform slot bindings
    pub fn reset_bindings(&mut self) {
        self.bound_vertex_array = None;
        self.bound_shader = None;
        self.uniform_slots.clear();
    }

    // ===== FRAMEBUFFER =====

    pub fn bound_framebuffer(&self) -> Option<ResourceKey> {
        self.bound_framebuffer.as_ref().map(|fb| fb.key)
    }

    pub fn bound_framebuffer_record(&self) -> Option<&BoundFramebuffer> {
        self.bound_framebuffer.as_ref()
    }

    /// Replace the bound framebuffer record, returning the previous one
    pub fn set_bound_framebuffer(&mut self, record: Option<BoundFramebuffer>) -> Option<BoundFramebuffer> {
        std::mem::replace(&mut self.bound_framebuffer, record)
    }

    // ===== BINDING CACHE =====

    /// Record a vertex array bind. Returns false when it is already bound.
    pub fn bind_vertex_array(&mut self, key: ResourceKey) -> bool {
        let needed = self.bound_vertex_array != Some(key);
        self.bound_vertex_array = Some(key);
        self.count_bind(needed, key);
        needed
    }

    pub fn unbind_vertex_array(&mut self, key: ResourceKey) -> bool {
        if self.bound_vertex_array == Some(key) {
            self.bound_vertex_array = None;
            return true;
        }
        false
    }

    pub fn bound_vertex_array(&self) -> Option<ResourceKey> {
        self.bound_vertex_array
    }

    /// Record a shader bind. Returns false when it is already bound.
    pub fn bind_shader(&mut self, key: ResourceKey) -> bool {
        let needed = self.bound_shader != Some(key);
        self.bound_shader = Some(key);
        self.count_bind(needed, key);
        needed
    }

    pub fn unbind_shader(&mut self, key: ResourceKey) -> bool {
        if self.bound_shader == Some(key) {
            self.bound_shader = None;
            return true;
        }
        false
    }

    pub fn bound_shader(&self) -> Option<ResourceKey> {
        self.bound_shader
    }

    /// Record a uniform buffer bind at `slot`. Returns false when redundant.
    pub fn bind_uniform_slot(&mut self, slot: u32, key: ResourceKey) -> bool {
        let needed = self.uniform_slots.insert(slot, key) != Some(key);
        self.count_bind(needed, key);
        needed
    }

    pub fn uniform_slot(&self, slot: u32) -> Option<ResourceKey> {
        self.uniform_slots.get(&slot).copied()
    }

    fn count_bind(&mut self, needed: bool, key: ResourceKey) {
        if needed {
            self.stats.binds += 1;
        } else {
            self.stats.skipped += 1;
            engine_trace!("aurora::RenderContext", "Skipped redundant bind of {:?}", key);
        }
    }

    pub fn stats(&self) -> BindingStats {
        self.stats
    }

    // ===== VIEWPORT =====

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Returns true when the viewport actually changed
    pub fn set_viewport(&mut self, viewport: Viewport) -> bool {
        let changed = self.viewport != viewport;
        self.viewport = viewport;
        changed
    }

    pub fn window_size(&self) -> (u32, u32) {
        self.window_size
    }

    pub fn set_window_size(&mut self, width: u32, height: u32) {
        self.window_size = (width, height);
    }

    /// Viewport of the default (window) framebuffer
    pub fn default_viewport(&self) -> Viewport {
        Viewport::from_size(self.window_size.0, self.window_size.1)
    }
}

/// Lock the shared context, mapping poisoning to a backend error
pub fn lock_context(context: &SharedContext) -> Result<MutexGuard<'_, RenderContext>> {
    context
        .lock()
        .map_err(|_| Error::BackendError("Render context lock poisoned".to_string()))
}

// ===== RESOURCE GUARD =====

/// Registration of one resource in the context, removed on drop
///
/// Every backend resource owns one. The guard remembers the epoch it was
/// registered in, and a guard from an older epoch never touches the
/// registry again.
pub struct ResourceGuard {
    key: ResourceKey,
    epoch: u64,
    kind: ResourceKind,
    context: SharedContext,
}

impl ResourceGuard {
    pub fn register(context: &SharedContext, kind: ResourceKind, label: &str) -> Result<Self> {
        let mut ctx = lock_context(context)?;
        let key = ctx.register(kind, label);
        Ok(Self {
            key,
            epoch: ctx.epoch(),
            kind,
            context: context.clone(),
        })
    }

    pub fn key(&self) -> ResourceKey {
        self.key
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    /// True while the resource is registered in the current epoch
    pub fn is_current(&self) -> bool {
        match self.context.lock() {
            Ok(ctx) => ctx.epoch() == self.epoch && ctx.is_live(self.key),
            Err(_) => false,
        }
    }

    /// Fail with `Error::StaleResource` if a backend switch happened since creation
    pub fn ensure_current(&self) -> Result<()> {
        let ctx = lock_context(&self.context)?;
        if ctx.epoch() != self.epoch || !ctx.is_live(self.key) {
            return Err(Error::StaleResource(format!(
                "{:?} created in epoch {} used in epoch {}",
                self.kind,
                self.epoch,
                ctx.epoch()
            )));
        }
        Ok(())
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        if let Ok(mut ctx) = self.context.lock() {
            if ctx.epoch() == self.epoch {
                ctx.unregister(self.key);
            }
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
