/// Backend-independent shader uniform reflection.
///
/// Describes loose uniforms and uniform-buffer blocks (name, type, size,
/// offset, stage, one level of struct nesting) so parameters can be
/// validated and packed on the CPU before upload.
///
/// Block member offsets follow an explicit packing policy:
/// - `UniformPacking::Tight`: each member starts where the previous one
///   ended (offset = previous offset + previous size). No padding.
/// - `UniformPacking::Std140`: members are aligned with the std140 rules
///   (vec3/vec4/matrices/structs on 16 bytes, mat3 columns padded to vec4,
///   array strides rounded up to 16).
///
/// Offsets reflected from compiled SPIR-V bypass both and are recorded
/// with `push_uniform_at`.

use bitflags::bitflags;
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};
use crate::error::{Error, Result};
use crate::engine_bail_warn;

bitflags! {
    /// Shader stages a declaration is visible to
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 0b01;
        const FRAGMENT = 0b10;
        const ALL_GRAPHICS = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

// ===== UNIFORM TYPE =====

/// Uniform type vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    /// Sentinel for an unrecognised type name
    None,
    Int32,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
    Struct,
}

/// Name used for the `None` sentinel
pub const INVALID_TYPE_NAME: &str = "Invalid Type";

impl UniformType {
    /// Tightly packed size in bytes (0 for None and Struct)
    pub fn size(&self) -> u32 {
        match self {
            UniformType::None   => 0,
            UniformType::Int32  => 4,
            UniformType::Float  => 4,
            UniformType::Vec2   => 4 * 2,
            UniformType::Vec3   => 4 * 3,
            UniformType::Vec4   => 4 * 4,
            UniformType::Mat3   => 4 * 3 * 3,
            UniformType::Mat4   => 4 * 4 * 4,
            UniformType::Struct => 0,
        }
    }

    /// Base alignment under std140
    pub fn std140_alignment(&self) -> u32 {
        match self {
            UniformType::None => 1,
            UniformType::Int32 | UniformType::Float => 4,
            UniformType::Vec2 => 8,
            UniformType::Vec3 | UniformType::Vec4 => 16,
            UniformType::Mat3 | UniformType::Mat4 | UniformType::Struct => 16,
        }
    }

    /// Size occupied under std140 (mat3 columns are padded to vec4)
    pub fn std140_size(&self) -> u32 {
        match self {
            UniformType::Mat3 => 16 * 3,
            other => other.size(),
        }
    }

    /// Canonical name (`"Invalid Type"` for the sentinel)
    pub fn name(&self) -> &'static str {
        type_to_string(*self)
    }

    /// Strict parse: unrecognised names fail with `Error::UnknownShaderType`
    pub fn from_name(name: &str) -> Result<Self> {
        match string_to_type(name) {
            UniformType::None => Err(Error::UnknownShaderType(name.to_string())),
            ty => Ok(ty),
        }
    }
}

/// Lenient parse: unrecognised names map to `UniformType::None`
///
/// `"int"` is accepted as an alias of `"int32"`.
pub fn string_to_type(name: &str) -> UniformType {
    match name {
        "int32" | "int" => UniformType::Int32,
        "float" => UniformType::Float,
        "vec2"  => UniformType::Vec2,
        "vec3"  => UniformType::Vec3,
        "vec4"  => UniformType::Vec4,
        "mat3"  => UniformType::Mat3,
        "mat4"  => UniformType::Mat4,
        _ => UniformType::None,
    }
}

/// Inverse of `string_to_type` for every recognised name
pub fn type_to_string(ty: UniformType) -> &'static str {
    match ty {
        UniformType::Int32  => "int32",
        UniformType::Float  => "float",
        UniformType::Vec2   => "vec2",
        UniformType::Vec3   => "vec3",
        UniformType::Vec4   => "vec4",
        UniformType::Mat3   => "mat3",
        UniformType::Mat4   => "mat4",
        UniformType::Struct => "struct",
        UniformType::None   => INVALID_TYPE_NAME,
    }
}

// ===== PACKING =====

/// Offset policy for uniform-buffer members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UniformPacking {
    /// Back-to-back, no alignment padding
    #[default]
    Tight,
    /// GLSL std140 rules
    Std140,
}

fn align_up(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) / alignment * alignment
}

// ===== STRUCT =====

/// Struct type used by a uniform (one nesting level)
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderStruct {
    name: String,
    fields: Vec<ShaderUniformDeclaration>,
    size: u32,
    packing: UniformPacking,
}

impl ShaderStruct {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_packing(name, UniformPacking::Tight)
    }

    pub fn with_packing(name: impl Into<String>, packing: UniformPacking) -> Self {
        Self { name: name.into(), fields: Vec::new(), size: 0, packing }
    }

    /// Append a field at the struct's next offset
    pub fn add_field(&mut self, mut field: ShaderUniformDeclaration) {
        let offset = match self.packing {
            UniformPacking::Tight => self.size,
            UniformPacking::Std140 => align_up(self.size, field.std140_alignment()),
        };
        field.offset = offset;
        self.size = offset + field.block_size(self.packing);
        self.fields.push(field);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[ShaderUniformDeclaration] {
        &self.fields
    }

    pub fn find_field(&self, name: &str) -> Option<&ShaderUniformDeclaration> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Struct size (rounded up to 16 bytes under std140)
    pub fn size(&self) -> u32 {
        match self.packing {
            UniformPacking::Tight => self.size,
            UniformPacking::Std140 => align_up(self.size, 16),
        }
    }

    pub fn packing(&self) -> UniformPacking {
        self.packing
    }
}

// ===== UNIFORM DECLARATION =====

/// One uniform: a loose uniform, a block member or a struct field
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderUniformDeclaration {
    name: String,
    uniform_type: UniformType,
    count: u32,
    size: u32,
    offset: u32,
    stage: ShaderStageFlags,
    shader_struct: Option<ShaderStruct>,
}

impl ShaderUniformDeclaration {
    pub fn new(uniform_type: UniformType, name: impl Into<String>, count: u32) -> Self {
        let count = count.max(1);
        Self {
            name: name.into(),
            uniform_type,
            count,
            size: uniform_type.size() * count,
            offset: 0,
            stage: ShaderStageFlags::ALL_GRAPHICS,
            shader_struct: None,
        }
    }

    pub fn new_struct(shader_struct: ShaderStruct, name: impl Into<String>, count: u32) -> Self {
        let count = count.max(1);
        Self {
            name: name.into(),
            uniform_type: UniformType::Struct,
            count,
            size: shader_struct.size() * count,
            offset: 0,
            stage: ShaderStageFlags::ALL_GRAPHICS,
            shader_struct: Some(shader_struct),
        }
    }

    pub fn with_stage(mut self, stage: ShaderStageFlags) -> Self {
        self.stage = stage;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uniform_type(&self) -> UniformType {
        self.uniform_type
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Tight byte size (element size * count)
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Local offset inside the owning block or struct
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn stage(&self) -> ShaderStageFlags {
        self.stage
    }

    pub(crate) fn add_stage(&mut self, stage: ShaderStageFlags) {
        self.stage |= stage;
    }

    pub fn shader_struct(&self) -> Option<&ShaderStruct> {
        self.shader_struct.as_ref()
    }

    /// Absolute offset of `field` for a struct uniform
    ///
    /// Field offset plus this uniform's offset (one level).
    pub fn field_offset(&self, field: &str) -> Option<u32> {
        let shader_struct = self.shader_struct.as_ref()?;
        shader_struct.find_field(field).map(|f| f.offset + self.offset)
    }

    fn std140_alignment(&self) -> u32 {
        if self.count > 1 {
            return 16;
        }
        self.uniform_type.std140_alignment()
    }

    fn element_size(&self) -> u32 {
        match &self.shader_struct {
            Some(s) => s.size(),
            None => self.uniform_type.size(),
        }
    }

    /// Distance between array elements under `packing`
    pub fn element_stride(&self, packing: UniformPacking) -> u32 {
        match packing {
            UniformPacking::Tight => self.element_size(),
            UniformPacking::Std140 => {
                let size = match &self.shader_struct {
                    Some(s) => s.size(),
                    None => self.uniform_type.std140_size(),
                };
                if self.count > 1 { align_up(size, 16) } else { size }
            }
        }
    }

    /// Bytes this uniform occupies inside a block under `packing`
    pub fn block_size(&self, packing: UniformPacking) -> u32 {
        match packing {
            UniformPacking::Tight => self.size,
            UniformPacking::Std140 => self.element_stride(packing) * self.count,
        }
    }
}

// ===== UNIFORM BUFFER DECLARATION =====

/// Resolved location of a uniform (or struct field) inside a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedUniform {
    pub uniform_type: UniformType,
    /// Absolute byte offset inside the block
    pub offset: u32,
    pub count: u32,
    pub stride: u32,
}

/// A uniform block: name, binding register, stage, size and ordered members
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderUniformBufferDeclaration {
    name: String,
    register: u32,
    stage: ShaderStageFlags,
    size: u32,
    uniforms: Vec<ShaderUniformDeclaration>,
    packing: UniformPacking,
}

impl ShaderUniformBufferDeclaration {
    pub fn new(name: impl Into<String>, register: u32, stage: ShaderStageFlags) -> Self {
        Self {
            name: name.into(),
            register,
            stage,
            size: 0,
            uniforms: Vec::new(),
            packing: UniformPacking::Tight,
        }
    }

    pub fn with_packing(mut self, packing: UniformPacking) -> Self {
        self.packing = packing;
        self
    }

    /// Append a member after the previous one and return its offset
    pub fn push_uniform(&mut self, mut uniform: ShaderUniformDeclaration) -> u32 {
        let offset = match self.packing {
            UniformPacking::Tight => self
                .uniforms
                .last()
                .map_or(0, |previous| previous.offset + previous.size),
            UniformPacking::Std140 => align_up(self.size, uniform.std140_alignment()),
        };
        uniform.offset = offset;
        self.size = self.size.max(offset + uniform.block_size(self.packing));
        self.uniforms.push(uniform);
        offset
    }

    /// Append a member at an externally reflected offset
    pub fn push_uniform_at(&mut self, mut uniform: ShaderUniformDeclaration, offset: u32) {
        uniform.offset = offset;
        self.size = self.size.max(offset + uniform.block_size(self.packing));
        self.uniforms.push(uniform);
    }

    /// Override the block size (reflected size includes trailing padding)
    pub fn set_size(&mut self, size: u32) {
        self.size = self.size.max(size);
    }

    /// Linear search by member name
    pub fn find_uniform(&self, name: &str) -> Option<&ShaderUniformDeclaration> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    /// Resolve `"member"` or `"member.field"` to an absolute offset
    pub fn resolve(&self, path: &str) -> Option<ResolvedUniform> {
        let (base, field) = match path.split_once('.') {
            Some((base, field)) => (base, Some(field)),
            None => (path, None),
        };
        let uniform = self.find_uniform(base)?;
        match field {
            None => Some(ResolvedUniform {
                uniform_type: uniform.uniform_type,
                offset: uniform.offset,
                count: uniform.count,
                stride: uniform.element_stride(self.packing),
            }),
            Some(field) => {
                let shader_struct = uniform.shader_struct.as_ref()?;
                let member = shader_struct.find_field(field)?;
                Some(ResolvedUniform {
                    uniform_type: member.uniform_type,
                    offset: member.offset + uniform.offset,
                    count: member.count,
                    stride: member.element_stride(shader_struct.packing),
                })
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register(&self) -> u32 {
        self.register
    }

    pub fn stage(&self) -> ShaderStageFlags {
        self.stage
    }

    /// Widen the block and every member to `stage`
    pub(crate) fn add_stage(&mut self, stage: ShaderStageFlags) {
        self.stage |= stage;
        for uniform in &mut self.uniforms {
            uniform.add_stage(stage);
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn uniforms(&self) -> &[ShaderUniformDeclaration] {
        &self.uniforms
    }

    pub fn packing(&self) -> UniformPacking {
        self.packing
    }
}

// ===== RESOURCES =====

/// Kind of an opaque shader resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderResourceType {
    Texture2D,
    TextureCube,
}

/// Sampler / texture binding declared by a shader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderResourceDeclaration {
    pub name: String,
    pub resource_type: ShaderResourceType,
    pub register: u32,
    pub count: u32,
}

// ===== REFLECTION =====

/// Where a uniform lives inside a reflected program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformLocation {
    /// Member of `uniform_buffers[block]`
    Block { block: usize, resolved: ResolvedUniform },
    /// Entry of the loose `uniforms` list
    Loose { index: usize, resolved: ResolvedUniform },
}

/// Everything a program declares, merged across stages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderReflection {
    pub uniform_buffers: Vec<ShaderUniformBufferDeclaration>,
    pub uniforms: Vec<ShaderUniformDeclaration>,
    pub resources: Vec<ShaderResourceDeclaration>,
}

impl ShaderReflection {
    pub fn find_uniform_buffer(&self, name: &str) -> Option<&ShaderUniformBufferDeclaration> {
        self.uniform_buffers.iter().find(|b| b.name == name)
    }

    pub fn find_resource(&self, name: &str) -> Option<&ShaderResourceDeclaration> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Locate a uniform path in the blocks first, then among loose uniforms
    pub fn find_uniform(&self, path: &str) -> Option<UniformLocation> {
        for (block, declaration) in self.uniform_buffers.iter().enumerate() {
            if let Some(resolved) = declaration.resolve(path) {
                return Some(UniformLocation::Block { block, resolved });
            }
        }

        let (base, field) = match path.split_once('.') {
            Some((base, field)) => (base, Some(field)),
            None => (path, None),
        };
        let index = self.uniforms.iter().position(|u| u.name == base)?;
        let uniform = &self.uniforms[index];
        let resolved = match field {
            None => ResolvedUniform {
                uniform_type: uniform.uniform_type,
                offset: uniform.offset,
                count: uniform.count,
                stride: uniform.element_stride(UniformPacking::Tight),
            },
            Some(field) => {
                let member = uniform.shader_struct.as_ref()?.find_field(field)?;
                ResolvedUniform {
                    uniform_type: member.uniform_type,
                    offset: uniform.offset + member.offset,
                    count: member.count,
                    stride: member.element_stride(UniformPacking::Tight),
                }
            }
        };
        Some(UniformLocation::Loose { index, resolved })
    }

    pub fn has_uniform(&self, path: &str) -> bool {
        self.find_uniform(path).is_some()
    }
}

// ===== VALUES =====

/// CPU-side uniform value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Int(i32),
    Float(f32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
}

impl UniformValue {
    pub fn uniform_type(&self) -> UniformType {
        match self {
            UniformValue::Int(_) => UniformType::Int32,
            UniformValue::Float(_) => UniformType::Float,
            UniformValue::Vec2(_) => UniformType::Vec2,
            UniformValue::Vec3(_) => UniformType::Vec3,
            UniformValue::Vec4(_) => UniformType::Vec4,
            UniformValue::Mat3(_) => UniformType::Mat3,
            UniformValue::Mat4(_) => UniformType::Mat4,
        }
    }

    /// Tightly packed bytes
    pub fn bytes(&self) -> &[u8] {
        match self {
            UniformValue::Int(v) => bytemuck::bytes_of(v),
            UniformValue::Float(v) => bytemuck::bytes_of(v),
            UniformValue::Vec2(v) => bytemuck::bytes_of(v),
            UniformValue::Vec3(v) => bytemuck::bytes_of(v),
            UniformValue::Vec4(v) => bytemuck::bytes_of(v),
            UniformValue::Mat3(v) => bytemuck::bytes_of(v),
            UniformValue::Mat4(v) => bytemuck::bytes_of(v),
        }
    }

    /// Write into `dst` at `offset` following `packing`
    fn write(&self, dst: &mut [u8], offset: usize, packing: UniformPacking) {
        match (self, packing) {
            (UniformValue::Mat3(m), UniformPacking::Std140) => {
                for (column, value) in m.to_cols_array_2d().iter().enumerate() {
                    let start = offset + column * 16;
                    dst[start..start + 12].copy_from_slice(bytemuck::cast_slice(value));
                }
            }
            _ => {
                let bytes = self.bytes();
                dst[offset..offset + bytes.len()].copy_from_slice(bytes);
            }
        }
    }
}

// ===== BLOCK STORAGE =====

/// CPU shadow of one uniform block, written member by member
#[derive(Debug, Clone)]
pub struct UniformBlockStorage {
    declaration: ShaderUniformBufferDeclaration,
    data: Vec<u8>,
    dirty: bool,
}

impl UniformBlockStorage {
    pub fn new(declaration: ShaderUniformBufferDeclaration) -> Self {
        let data = vec![0; declaration.size() as usize];
        Self { declaration, data, dirty: true }
    }

    /// Write `value` to the member at `path`
    pub fn set(&mut self, path: &str, value: &UniformValue) -> Result<()> {
        self.set_element(path, 0, value)
    }

    /// Write `value` to element `index` of an array member
    pub fn set_element(&mut self, path: &str, index: u32, value: &UniformValue) -> Result<()> {
        let Some(resolved) = self.declaration.resolve(path) else {
            engine_bail_warn!("aurora::UniformBlockStorage",
                "Uniform '{}' not found in block '{}'", path, self.declaration.name());
        };
        if resolved.uniform_type != value.uniform_type() {
            engine_bail_warn!("aurora::UniformBlockStorage",
                "Uniform '{}' is {}, got {}", path,
                resolved.uniform_type.name(), value.uniform_type().name());
        }
        if index >= resolved.count {
            engine_bail_warn!("aurora::UniformBlockStorage",
                "Index {} out of range for '{}' (count {})", index, path, resolved.count);
        }

        let offset = (resolved.offset + index * resolved.stride) as usize;
        let packing = self.declaration.packing();
        let needed = match (value, packing) {
            (UniformValue::Mat3(_), UniformPacking::Std140) => 48,
            _ => value.bytes().len(),
        };
        if offset + needed > self.data.len() {
            engine_bail_warn!("aurora::UniformBlockStorage",
                "Uniform '{}' overruns block '{}' ({} > {})", path,
                self.declaration.name(), offset + needed, self.data.len());
        }
        value.write(&mut self.data, offset, packing);
        self.dirty = true;
        Ok(())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn declaration(&self) -> &ShaderUniformBufferDeclaration {
        &self.declaration
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Return the dirty flag and clear it
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }
}

#[cfg(test)]
#[path = "shader_uniform_tests.rs"]
mod tests;
