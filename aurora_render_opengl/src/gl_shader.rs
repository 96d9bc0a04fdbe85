/// OpenGL shader program
///
/// GLSL text is compiled and linked by the driver, and reflected with the
/// engine's GLSL reflector. Block registers and sampler units come from
/// that reflection and are written into the program once, right after
/// linking.
///
/// Loose uniforms go straight to the program. Block members are collected
/// in a CPU shadow per block and uploaded to a buffer owned by the shader
/// at the next draw, unless the application bound its own uniform buffer
/// at that register.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};
use glow::HasContext;
use rustc_hash::FxHashMap;
use aurora_render::aurora::{Error, Result};
use aurora_render::aurora::render::{
    lock_context, reflect_glsl_program, ResourceGuard, ResourceKey, ResourceKind, Shader, ShaderDesc,
    ShaderReflection, ShaderResourceDeclaration, ShaderSource, SharedContext, UniformBlockStorage, UniformLocation,
    UniformPacking, UniformType, UniformValue,
};
use aurora_render::{engine_bail_warn, engine_debug, engine_err, engine_trace, engine_warn};
use crate::gl_buffer::GlBuffer;
use crate::gl_device::GlDevice;

const SOURCE: &str = "aurora::opengl::Shader";

/// Program uniform names and texture units of a sampler resource
pub(crate) fn sampler_units(resource: &ShaderResourceDeclaration) -> Vec<(String, i32)> {
    if resource.count <= 1 {
        return vec![(resource.name.clone(), resource.register as i32)];
    }
    (0..resource.count)
        .map(|i| (format!("{}[{}]", resource.name, i), (resource.register + i) as i32))
        .collect()
}

/// Check a value against the declared type of a loose uniform
pub(crate) fn check_value_type(name: &str, declared: UniformType, value: &UniformValue) -> Result<()> {
    if declared != value.uniform_type() {
        engine_bail_warn!(SOURCE, "Uniform '{}' is {}, got {}",
            name, declared.name(), value.uniform_type().name());
    }
    Ok(())
}

/// Texture unit carried by a sampler assignment
pub(crate) fn texture_unit(name: &str, value: &UniformValue) -> Result<i32> {
    match value {
        UniformValue::Int(unit) if *unit >= 0 => Ok(*unit),
        UniformValue::Int(unit) => engine_bail_warn!(SOURCE, "Sampler '{}' cannot use texture unit {}", name, unit),
        other => engine_bail_warn!(SOURCE, "Sampler '{}' takes an Int texture unit, got {}",
            name, other.uniform_type().name()),
    }
}

fn compile_stage(gl: &glow::Context, name: &str, kind: u32, source: &str) -> Result<glow::NativeShader> {
    let stage = if kind == glow::VERTEX_SHADER { "vertex" } else { "fragment" };
    unsafe {
        let shader = gl.create_shader(kind)
            .map_err(|e| engine_err!(SOURCE, "Failed to create {} shader: {}", stage, e))?;
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            engine_bail_warn!(SOURCE, "Compilation of '{}' ({}) failed: {}", name, stage, log.trim());
        }
        Ok(shader)
    }
}

fn link_program(gl: &glow::Context, name: &str, vertex: &str, fragment: &str) -> Result<glow::NativeProgram> {
    let vs = compile_stage(gl, name, glow::VERTEX_SHADER, vertex)?;
    let fs = match compile_stage(gl, name, glow::FRAGMENT_SHADER, fragment) {
        Ok(fs) => fs,
        Err(e) => {
            unsafe { gl.delete_shader(vs) };
            return Err(e);
        }
    };

    unsafe {
        let program = match gl.create_program() {
            Ok(program) => program,
            Err(e) => {
                gl.delete_shader(vs);
                gl.delete_shader(fs);
                return Err(engine_err!(SOURCE, "Failed to create program: {}", e));
            }
        };
        gl.attach_shader(program, vs);
        gl.attach_shader(program, fs);
        gl.link_program(program);
        gl.detach_shader(program, vs);
        gl.detach_shader(program, fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);

        if !gl.get_program_link_status(program) {
            let log = gl.get_program_info_log(program);
            gl.delete_program(program);
            engine_bail_warn!(SOURCE, "Linking of '{}' failed: {}", name, log.trim());
        }
        Ok(program)
    }
}

unsafe fn upload_loose(gl: &glow::Context, location: &glow::NativeUniformLocation, value: &UniformValue) {
    let location = Some(location);
    match value {
        UniformValue::Int(v) => gl.uniform_1_i32(location, *v),
        UniformValue::Float(v) => gl.uniform_1_f32(location, *v),
        UniformValue::Vec2(v) => gl.uniform_2_f32(location, v.x, v.y),
        UniformValue::Vec3(v) => gl.uniform_3_f32(location, v.x, v.y, v.z),
        UniformValue::Vec4(v) => gl.uniform_4_f32(location, v.x, v.y, v.z, v.w),
        UniformValue::Mat3(m) => gl.uniform_matrix_3_f32_slice(location, false, &m.to_cols_array()),
        UniformValue::Mat4(m) => gl.uniform_matrix_4_f32_slice(location, false, &m.to_cols_array()),
    }
}

struct BlockState {
    storage: UniformBlockStorage,
    /// None when the linker dropped the block
    buffer: Option<GlBuffer>,
}

struct UniformState {
    blocks: Vec<BlockState>,
    locations: FxHashMap<String, Option<glow::NativeUniformLocation>>,
}

pub struct GlShader {
    name: String,
    device: Arc<GlDevice>,
    program: glow::NativeProgram,
    reflection: ShaderReflection,
    uniforms: Mutex<UniformState>,
    guard: ResourceGuard,
}

impl GlShader {
    pub fn new(device: &Arc<GlDevice>, context: &SharedContext, desc: &ShaderDesc, packing: UniformPacking) -> Result<Self> {
        let ShaderSource::Glsl { vertex, fragment } = &desc.source else {
            engine_bail_warn!(SOURCE, "Shader '{}': SPIR-V programs need the Vulkan backend", desc.name);
        };
        let reflection = reflect_glsl_program(vertex, fragment, packing)?;
        let gl = device.gl();
        let program = link_program(gl, &desc.name, vertex, fragment)?;

        let blocks = match Self::bind_blocks(device, program, &reflection) {
            Ok(blocks) => blocks,
            Err(e) => {
                unsafe { gl.delete_program(program) };
                return Err(e);
            }
        };
        let guard = match ResourceGuard::register(context, ResourceKind::Shader, &desc.name) {
            Ok(guard) => guard,
            Err(e) => {
                unsafe { gl.delete_program(program) };
                return Err(e);
            }
        };

        let shader = Self {
            name: desc.name.clone(),
            device: device.clone(),
            program,
            reflection,
            uniforms: Mutex::new(UniformState { blocks, locations: FxHashMap::default() }),
            guard,
        };
        shader.assign_sampler_units()?;
        engine_debug!(SOURCE, "Shader '{}' linked: {} blocks, {} uniforms, {} resources",
            shader.name,
            shader.reflection.uniform_buffers.len(),
            shader.reflection.uniforms.len(),
            shader.reflection.resources.len());
        Ok(shader)
    }

    /// Point every block at its register and give it a backing buffer
    fn bind_blocks(device: &Arc<GlDevice>, program: glow::NativeProgram, reflection: &ShaderReflection)
        -> Result<Vec<BlockState>>
    {
        let gl = device.gl();
        let mut blocks = Vec::with_capacity(reflection.uniform_buffers.len());
        for declaration in &reflection.uniform_buffers {
            let storage = UniformBlockStorage::new(declaration.clone());
            let Some(index) = (unsafe { gl.get_uniform_block_index(program, declaration.name()) }) else {
                engine_debug!(SOURCE, "Block '{}' is unused by the linked program", declaration.name());
                blocks.push(BlockState { storage, buffer: None });
                continue;
            };

            let linked_size = unsafe {
                gl.uniform_block_binding(program, index, declaration.register());
                gl.get_active_uniform_block_parameter_i32(program, index, glow::UNIFORM_BLOCK_DATA_SIZE)
            }.max(0) as u32;
            if linked_size != declaration.size() {
                engine_warn!(SOURCE, "Block '{}' is {} bytes in the driver layout, {} reflected",
                    declaration.name(), linked_size, declaration.size());
            }

            let size = linked_size.max(declaration.size()) as u64;
            let buffer = GlBuffer::new(device, None, size, glow::DYNAMIC_DRAW, declaration.name())?;
            blocks.push(BlockState { storage, buffer: Some(buffer) });
        }
        Ok(blocks)
    }

    /// Default each sampler to the texture unit matching its register
    fn assign_sampler_units(&self) -> Result<()> {
        if self.reflection.resources.is_empty() {
            return Ok(());
        }
        self.bind()?;
        let gl = self.device.gl();
        for resource in &self.reflection.resources {
            for (name, unit) in sampler_units(resource) {
                if let Some(location) = unsafe { gl.get_uniform_location(self.program, &name) } {
                    unsafe { gl.uniform_1_i32(Some(&location), unit) };
                }
            }
        }
        self.device.check_error("sampler unit assignment")
    }

    fn lock_uniforms(&self) -> Result<MutexGuard<'_, UniformState>> {
        self.uniforms
            .lock()
            .map_err(|_| Error::BackendError("Shader uniform lock poisoned".to_string()))
    }

    fn location(&self, name: &str) -> Result<Option<glow::NativeUniformLocation>> {
        let mut state = self.lock_uniforms()?;
        if let Some(location) = state.locations.get(name) {
            return Ok(location.clone());
        }
        let location = unsafe { self.device.gl().get_uniform_location(self.program, name) };
        if location.is_none() {
            engine_trace!(SOURCE, "Uniform '{}' of '{}' is unused by the linked program", name, self.name);
        }
        state.locations.insert(name.to_string(), location.clone());
        Ok(location)
    }

    /// Upload dirty block shadows and attach the shader's own block buffers
    ///
    /// A register where the application bound a uniform buffer keeps it.
    pub fn prepare_draw(&self) -> Result<()> {
        let claimed: Vec<bool> = {
            let ctx = lock_context(self.guard.context())?;
            self.reflection
                .uniform_buffers
                .iter()
                .map(|block| ctx.uniform_slot(block.register()).is_some())
                .collect()
        };

        let gl = self.device.gl();
        let mut state = self.lock_uniforms()?;
        for (block, claimed) in state.blocks.iter_mut().zip(claimed) {
            let Some(buffer) = block.buffer.as_ref() else {
                continue;
            };
            if block.storage.take_dirty() {
                buffer.write(0, block.storage.data())?;
            }
            if !claimed {
                let register = block.storage.declaration().register();
                unsafe { gl.bind_buffer_base(glow::UNIFORM_BUFFER, register, Some(buffer.handle())) };
            }
        }
        Ok(())
    }

    pub fn program(&self) -> glow::NativeProgram {
        self.program
    }
}

impl Shader for GlShader {
    fn name(&self) -> &str {
        &self.name
    }

    fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    fn bind(&self) -> Result<()> {
        self.guard.ensure_current()?;
        let needed = lock_context(self.guard.context())?.bind_shader(self.guard.key());
        if needed {
            unsafe { self.device.gl().use_program(Some(self.program)) };
        }
        Ok(())
    }

    fn unbind(&self) -> Result<()> {
        let was_bound = lock_context(self.guard.context())?.unbind_shader(self.guard.key());
        if was_bound {
            unsafe { self.device.gl().use_program(None) };
        }
        Ok(())
    }

    fn set_uniform(&self, name: &str, value: &UniformValue) -> Result<()> {
        self.guard.ensure_current()?;

        if self.reflection.find_resource(name).is_some() {
            let unit = texture_unit(name, value)?;
            self.bind()?;
            if let Some(location) = self.location(name)? {
                unsafe { self.device.gl().uniform_1_i32(Some(&location), unit) };
            }
            return Ok(());
        }

        match self.reflection.find_uniform(name) {
            Some(UniformLocation::Block { block, .. }) => {
                let mut state = self.lock_uniforms()?;
                state.blocks[block].storage.set(name, value)
            }
            Some(UniformLocation::Loose { resolved, .. }) => {
                check_value_type(name, resolved.uniform_type, value)?;
                self.bind()?;
                if let Some(location) = self.location(name)? {
                    unsafe { upload_loose(self.device.gl(), &location, value) };
                }
                Ok(())
            }
            None => engine_bail_warn!(SOURCE, "Uniform '{}' not found in shader '{}'", name, self.name),
        }
    }

    fn resource_key(&self) -> ResourceKey {
        self.guard.key()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for GlShader {
    fn drop(&mut self) {
        unsafe { self.device.gl().delete_program(self.program) };
    }
}

#[cfg(test)]
#[path = "gl_shader_tests.rs"]
mod tests;
