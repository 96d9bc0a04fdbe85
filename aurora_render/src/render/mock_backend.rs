/// Mock backend for unit tests (no GPU required)
///
/// Every native call is recorded as a short string in a shared command
/// log, so tests can assert on the exact sequence a facade call produced
/// (`"va1.bind"`, `"draw 6"`, `"fb2.clear"`, ...).

use std::any::Any;
use std::sync::{Arc, Mutex};
use crate::error::{Error, Result};
use crate::render::buffer::{check_buffer_write, check_uniform_write, BufferUsage, IndexBuffer, UniformBuffer, VertexBuffer};
use crate::render::buffer_layout::BufferLayout;
use crate::render::config::Config;
use crate::render::context::{lock_context, BindingModel, ResourceGuard, ResourceKey, ResourceKind, SharedContext, Viewport};
use crate::render::framebuffer::{Framebuffer, FramebufferSpec, FramebufferTarget};
use crate::render::glsl_reflect::reflect_glsl_program;
use crate::render::render_api::{RenderApi, RenderBackend, RendererStats};
use crate::render::shader::{Shader, ShaderDesc, ShaderSource};
use crate::render::shader_uniform::{ShaderReflection, UniformLocation, UniformValue};
use crate::render::texture::{PixelBuffer, Texture, TextureFormat};
use crate::render::vertex_array::{VertexArray, VertexArrayTarget, VertexAttribute};
use crate::engine_bail_warn;

/// Shared record of native calls
pub type CommandLog = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> CommandLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Drain the log
pub fn take(log: &CommandLog) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}

fn record(log: &CommandLog, command: impl Into<String>) {
    log.lock().unwrap().push(command.into());
}

// ============================================================================
// Mock Buffers
// ============================================================================

pub struct MockVertexBuffer {
    pub id: u32,
    layout: BufferLayout,
    pub data: Vec<u8>,
    usage: BufferUsage,
    log: CommandLog,
    guard: ResourceGuard,
}

impl MockVertexBuffer {
    pub fn new(context: &SharedContext, log: &CommandLog, id: u32, data: &[u8], layout: BufferLayout, usage: BufferUsage) -> Result<Self> {
        Ok(Self {
            id,
            layout,
            data: data.to_vec(),
            usage,
            log: log.clone(),
            guard: ResourceGuard::register(context, ResourceKind::VertexBuffer, "mock vertex buffer")?,
        })
    }
}

impl VertexBuffer for MockVertexBuffer {
    fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn set_data(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.guard.ensure_current()?;
        check_buffer_write("aurora::MockVertexBuffer", self.usage, self.size(), offset, data.len())?;
        let start = offset as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
        record(&self.log, format!("vb{}.set_data {}", self.id, data.len()));
        Ok(())
    }

    fn bind(&self) -> Result<()> {
        record(&self.log, format!("vb{}.bind", self.id));
        Ok(())
    }

    fn unbind(&self) -> Result<()> {
        record(&self.log, format!("vb{}.unbind", self.id));
        Ok(())
    }

    fn resource_key(&self) -> ResourceKey {
        self.guard.key()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockIndexBuffer {
    pub id: u32,
    count: u32,
    log: CommandLog,
    guard: ResourceGuard,
}

impl MockIndexBuffer {
    pub fn new(context: &SharedContext, log: &CommandLog, id: u32, indices: &[u32]) -> Result<Self> {
        Ok(Self {
            id,
            count: indices.len() as u32,
            log: log.clone(),
            guard: ResourceGuard::register(context, ResourceKind::IndexBuffer, "mock index buffer")?,
        })
    }
}

impl IndexBuffer for MockIndexBuffer {
    fn count(&self) -> u32 {
        self.count
    }

    fn bind(&self) -> Result<()> {
        record(&self.log, format!("ib{}.bind", self.id));
        Ok(())
    }

    fn unbind(&self) -> Result<()> {
        record(&self.log, format!("ib{}.unbind", self.id));
        Ok(())
    }

    fn resource_key(&self) -> ResourceKey {
        self.guard.key()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MockUniformBuffer {
    pub id: u32,
    name: String,
    pub data: Vec<u8>,
    log: CommandLog,
    guard: ResourceGuard,
}

impl UniformBuffer for MockUniformBuffer {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn set_data(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.guard.ensure_current()?;
        check_uniform_write("aurora::MockUniformBuffer", self.size(), offset, data.len())?;
        let start = offset as usize;
        self.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn bind(&self, slot: u32) -> Result<()> {
        self.guard.ensure_current()?;
        let needed = lock_context(self.guard.context())?.bind_uniform_slot(slot, self.guard.key());
        if needed {
            record(&self.log, format!("ub{}.bind {}", self.id, slot));
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

// ============================================================================
// Mock Vertex Array Target
// ============================================================================

pub struct MockVertexArrayTarget {
    pub id: u32,
    pub fail_bind: bool,
    log: CommandLog,
}

impl MockVertexArrayTarget {
    pub fn new(log: &CommandLog, id: u32) -> Self {
        Self { id, fail_bind: false, log: log.clone() }
    }
}

impl VertexArrayTarget for MockVertexArrayTarget {
    fn attach_vertex_buffer(&mut self, binding: u32, _buffer: &dyn VertexBuffer, attributes: &[VertexAttribute]) -> Result<()> {
        let locations: Vec<String> = attributes.iter().map(|a| a.location.to_string()).collect();
        record(&self.log, format!("va{}.attach {} [{}]", self.id, binding, locations.join(",")));
        Ok(())
    }

    fn attach_index_buffer(&mut self, buffer: &dyn IndexBuffer) -> Result<()> {
        record(&self.log, format!("va{}.index {}", self.id, buffer.count()));
        Ok(())
    }

    fn bind(&self, vertex_buffers: &[Box<dyn VertexBuffer>], index_buffer: Option<&dyn IndexBuffer>) -> Result<()> {
        if self.fail_bind {
            return Err(Error::BackendError("mock bind failure".to_string()));
        }
        record(&self.log, format!("va{}.bind", self.id));
        for vb in vertex_buffers {
            vb.bind()?;
        }
        if let Some(ib) = index_buffer {
            ib.bind()?;
        }
        Ok(())
    }

    fn unbind(&self) -> Result<()> {
        record(&self.log, format!("va{}.unbind", self.id));
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Framebuffer Target
// ============================================================================

pub struct MockFramebufferTarget {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub clear_color: [f32; 4],
    has_depth: bool,
    log: CommandLog,
}

impl MockFramebufferTarget {
    pub fn new(log: &CommandLog, id: u32, spec: &FramebufferSpec) -> Self {
        Self {
            id,
            width: spec.width,
            height: spec.height,
            clear_color: [0.0; 4],
            has_depth: spec.depth_format.is_some(),
            log: log.clone(),
        }
    }
}

impl FramebufferTarget for MockFramebufferTarget {
    fn bind(&mut self) -> Result<()> {
        record(&self.log, format!("fb{}.bind", self.id));
        Ok(())
    }

    fn unbind(&mut self) -> Result<()> {
        record(&self.log, format!("fb{}.unbind", self.id));
        Ok(())
    }

    fn set_clear_color(&mut self, color: [f32; 4]) -> Result<()> {
        self.clear_color = color;
        record(&self.log, format!("fb{}.clear_color", self.id));
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        record(&self.log, format!("fb{}.clear", self.id));
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.width = width;
        self.height = height;
        record(&self.log, format!("fb{}.resize {}x{}", self.id, width, height));
        Ok(())
    }

    fn bind_color_attachment(&self, slot: u32) -> Result<()> {
        record(&self.log, format!("fb{}.attachment {}", self.id, slot));
        Ok(())
    }

    fn has_depth_attachment(&self) -> bool {
        self.has_depth
    }

    fn release(&mut self) {
        record(&self.log, format!("fb{}.release", self.id));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Texture
// ============================================================================

pub struct MockTexture {
    pub id: u32,
    width: u32,
    height: u32,
    format: TextureFormat,
    log: CommandLog,
    guard: ResourceGuard,
}

impl Texture for MockTexture {
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
        record(&self.log, format!("tex{}.bind {}", self.id, slot));
        Ok(())
    }

    fn resource_key(&self) -> ResourceKey {
        self.guard.key()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Shader
// ============================================================================

pub struct MockShader {
    pub id: u32,
    name: String,
    reflection: ShaderReflection,
    pub values: Mutex<Vec<(String, UniformValue)>>,
    log: CommandLog,
    guard: ResourceGuard,
}

impl MockShader {
    pub fn new(context: &SharedContext, log: &CommandLog, id: u32, name: &str, reflection: ShaderReflection) -> Result<Self> {
        Ok(Self {
            id,
            name: name.to_string(),
            reflection,
            values: Mutex::new(Vec::new()),
            log: log.clone(),
            guard: ResourceGuard::register(context, ResourceKind::Shader, name)?,
        })
    }
}

impl Shader for MockShader {
    fn name(&self) -> &str {
        &self.name
    }

    fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    fn bind(&self) -> Result<()> {
        self.guard.ensure_current()?;
        if lock_context(self.guard.context())?.bind_shader(self.guard.key()) {
            record(&self.log, format!("shader{}.bind", self.id));
        }
        Ok(())
    }

    fn unbind(&self) -> Result<()> {
        if lock_context(self.guard.context())?.unbind_shader(self.guard.key()) {
            record(&self.log, format!("shader{}.unbind", self.id));
        }
        Ok(())
    }

    fn set_uniform(&self, name: &str, value: &UniformValue) -> Result<()> {
        self.guard.ensure_current()?;
        let resolved = match self.reflection.find_uniform(name) {
            Some(UniformLocation::Block { resolved, .. }) | Some(UniformLocation::Loose { resolved, .. }) => resolved,
            None => {
                engine_bail_warn!("aurora::MockShader", "Uniform '{}' not found in '{}'", name, self.name);
            }
        };
        if resolved.uniform_type != value.uniform_type() {
            engine_bail_warn!("aurora::MockShader", "Uniform '{}' type mismatch", name);
        }
        self.values.lock().unwrap().push((name.to_string(), *value));
        record(&self.log, format!("shader{}.set {}", self.id, name));
        Ok(())
    }

    fn resource_key(&self) -> ResourceKey {
        self.guard.key()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Mock Backend
// ============================================================================

pub struct MockBackend {
    api: RenderApi,
    binding_model: BindingModel,
    config: Config,
    context: SharedContext,
    log: CommandLog,
    next_id: u32,
    stats: RendererStats,
    pub clear_color: [f32; 4],
    pub depth_testing: bool,
    pub blend: bool,
    pub viewport: Option<Viewport>,
}

impl MockBackend {
    pub fn new(api: RenderApi, binding_model: BindingModel, config: &Config, context: SharedContext, log: &CommandLog) -> Self {
        if let Ok(mut ctx) = context.lock() {
            ctx.set_binding_model(binding_model);
        }
        record(log, format!("{}.create", api));
        Self {
            api,
            binding_model,
            config: config.clone(),
            context,
            log: log.clone(),
            next_id: 0,
            stats: RendererStats::default(),
            clear_color: [0.0; 4],
            depth_testing: false,
            blend: false,
            viewport: None,
        }
    }

    /// Registry factory recording into `log`
    pub fn factory(api: RenderApi, binding_model: BindingModel, log: &CommandLog)
        -> impl Fn(&Config, SharedContext) -> Result<Box<dyn RenderBackend>> + Send + Sync + 'static
    {
        let log = log.clone();
        move |config: &Config, context: SharedContext| -> Result<Box<dyn RenderBackend>> {
            Ok(Box::new(MockBackend::new(api, binding_model, config, context, &log)))
        }
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        record(&self.log, format!("{}.destroy", self.api));
    }
}

impl RenderBackend for MockBackend {
    fn api(&self) -> RenderApi {
        self.api
    }

    fn binding_model(&self) -> BindingModel {
        self.binding_model
    }

    fn create_vertex_buffer(&mut self, data: &[u8], layout: BufferLayout, usage: BufferUsage) -> Result<Box<dyn VertexBuffer>> {
        layout.validate()?;
        let id = self.next_id();
        Ok(Box::new(MockVertexBuffer::new(&self.context, &self.log, id, data, layout, usage)?))
    }

    fn create_index_buffer(&mut self, indices: &[u32]) -> Result<Box<dyn IndexBuffer>> {
        let id = self.next_id();
        Ok(Box::new(MockIndexBuffer::new(&self.context, &self.log, id, indices)?))
    }

    fn create_uniform_buffer(&mut self, name: &str, size: u64) -> Result<Box<dyn UniformBuffer>> {
        let id = self.next_id();
        Ok(Box::new(MockUniformBuffer {
            id,
            name: name.to_string(),
            data: vec![0; size as usize],
            log: self.log.clone(),
            guard: ResourceGuard::register(&self.context, ResourceKind::UniformBuffer, name)?,
        }))
    }

    fn create_vertex_array(&mut self) -> Result<VertexArray> {
        let id = self.next_id();
        VertexArray::new(&self.context, Box::new(MockVertexArrayTarget::new(&self.log, id)))
    }

    fn create_framebuffer(&mut self, spec: FramebufferSpec) -> Result<Framebuffer> {
        let id = self.next_id();
        let target = MockFramebufferTarget::new(&self.log, id, &spec);
        Framebuffer::new(&self.context, spec, Box::new(target), self.config.max_framebuffer_size)
    }

    fn create_texture(&mut self, pixels: &PixelBuffer) -> Result<Box<dyn Texture>> {
        let id = self.next_id();
        Ok(Box::new(MockTexture {
            id,
            width: pixels.width,
            height: pixels.height,
            format: pixels.format,
            log: self.log.clone(),
            guard: ResourceGuard::register(&self.context, ResourceKind::Texture, "mock texture")?,
        }))
    }

    fn create_shader(&mut self, desc: &ShaderDesc) -> Result<Box<dyn Shader>> {
        let reflection = match &desc.source {
            ShaderSource::Glsl { vertex, fragment } => {
                reflect_glsl_program(vertex, fragment, self.config.uniform_packing)?
            }
            ShaderSource::SpirV { .. } => ShaderReflection::default(),
        };
        let id = self.next_id();
        Ok(Box::new(MockShader::new(&self.context, &self.log, id, &desc.name, reflection)?))
    }

    fn set_clear_color(&mut self, color: [f32; 4]) -> Result<()> {
        self.clear_color = color;
        record(&self.log, "set_clear_color");
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        record(&self.log, "clear");
        Ok(())
    }

    fn set_depth_testing(&mut self, enabled: bool) -> Result<()> {
        self.depth_testing = enabled;
        record(&self.log, format!("depth {}", enabled));
        Ok(())
    }

    fn set_blend(&mut self, enabled: bool) -> Result<()> {
        self.blend = enabled;
        record(&self.log, format!("blend {}", enabled));
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.viewport = Some(viewport);
        record(&self.log, format!("viewport {} {} {} {}", viewport.x, viewport.y, viewport.width, viewport.height));
        Ok(())
    }

    fn draw_indexed(&mut self, shader: &dyn Shader, vertex_array: &VertexArray, index_count: u32) -> Result<()> {
        shader.bind()?;
        vertex_array.bind()?;
        self.stats.draw_calls += 1;
        self.stats.indices += index_count as u64;
        record(&self.log, format!("draw {}", index_count));
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<()> {
        lock_context(&self.context)?.begin_frame();
        record(&self.log, "begin_frame");
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        self.stats.frames += 1;
        record(&self.log, "end_frame");
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        record(&self.log, format!("resize {}x{}", width, height));
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        record(&self.log, "wait_idle");
        Ok(())
    }

    fn stats(&self) -> RendererStats {
        self.stats
    }
}
