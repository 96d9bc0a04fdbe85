/// SPIR-V compilation (naga) and descriptor reflection (spirq)

use ash::vk;
use aurora_render::aurora::Result;
use aurora_render::aurora::render::{
    ShaderStageFlags, ShaderStruct, ShaderUniformBufferDeclaration, ShaderUniformDeclaration,
    UniformPacking, UniformType,
};
use aurora_render::{engine_bail, engine_bail_warn, engine_debug, engine_warn};

const SOURCE: &str = "aurora::vulkan::Spirv";

/// Compile Vulkan GLSL to SPIR-V words
pub fn compile_glsl(source: &str, stage: ShaderStageFlags, name: &str) -> Result<Vec<u32>> {
    let naga_stage = if stage == ShaderStageFlags::VERTEX {
        naga::ShaderStage::Vertex
    } else {
        naga::ShaderStage::Fragment
    };

    let mut frontend = naga::front::glsl::Frontend::default();
    let module = match frontend.parse(&naga::front::glsl::Options::from(naga_stage), source) {
        Ok(module) => module,
        Err(e) => {
            engine_bail_warn!(SOURCE, "GLSL compilation of '{}' ({:?}) failed: {:?}", name, stage, e);
        }
    };

    let info = match naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all())
        .validate(&module)
    {
        Ok(info) => info,
        Err(e) => {
            engine_bail_warn!(SOURCE, "Validation of '{}' ({:?}) failed: {:?}", name, stage, e);
        }
    };

    match naga::back::spv::write_vec(&module, &info, &naga::back::spv::Options::default(), None) {
        Ok(words) => {
            engine_debug!(SOURCE, "Compiled '{}' {:?} stage to {} SPIR-V words", name, stage, words.len());
            Ok(words)
        }
        Err(e) => engine_bail!(SOURCE, "SPIR-V generation for '{}' failed: {:?}", name, e),
    }
}

// ===== REFLECTION =====

/// One descriptor binding of set 0
#[derive(Debug, Clone, PartialEq)]
pub struct SpirvDescriptor {
    pub name: String,
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stages: ShaderStageFlags,
    /// Uniform blocks: members at their reflected offsets
    pub block: Option<ShaderUniformBufferDeclaration>,
}

fn descriptor_type(desc_ty: &spirq::ty::DescriptorType) -> Result<vk::DescriptorType> {
    use spirq::ty::DescriptorType;
    match desc_ty {
        DescriptorType::UniformBuffer() => Ok(vk::DescriptorType::UNIFORM_BUFFER),
        DescriptorType::CombinedImageSampler() => Ok(vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
        DescriptorType::SampledImage() => Ok(vk::DescriptorType::SAMPLED_IMAGE),
        DescriptorType::Sampler() => Ok(vk::DescriptorType::SAMPLER),
        other => {
            engine_bail_warn!(SOURCE, "Unsupported SPIR-V descriptor type: {:?}", other);
        }
    }
}

/// Uniform type of a scalar, vector or square matrix
fn uniform_type(ty: &spirq::ty::Type) -> Option<UniformType> {
    use spirq::ty::{ScalarType, Type};
    let is_float = |scalar: &ScalarType| matches!(scalar, ScalarType::Float { bits: 32 });
    match ty {
        Type::Scalar(ScalarType::Integer { .. }) => Some(UniformType::Int32),
        Type::Scalar(scalar) if is_float(scalar) => Some(UniformType::Float),
        Type::Vector(v) if is_float(&v.scalar_ty) => match v.nscalar {
            2 => Some(UniformType::Vec2),
            3 => Some(UniformType::Vec3),
            4 => Some(UniformType::Vec4),
            _ => None,
        },
        Type::Matrix(m) if is_float(&m.vector_ty.scalar_ty) => match (m.nvector, m.vector_ty.nscalar) {
            (3, 3) => Some(UniformType::Mat3),
            (4, 4) => Some(UniformType::Mat4),
            _ => None,
        },
        _ => None,
    }
}

/// Declaration of one block member; None for types outside the vocabulary
fn member_declaration(name: &str, ty: &spirq::ty::Type, stage: ShaderStageFlags) -> Option<ShaderUniformDeclaration> {
    use spirq::ty::Type;
    let (element, count) = match ty {
        Type::Array(array) => (&*array.element_ty, array.nelement.unwrap_or(1)),
        other => (other, 1),
    };

    let declaration = match element {
        Type::Struct(st) => {
            let mut shader_struct = ShaderStruct::with_packing(name, UniformPacking::Std140);
            for member in &st.members {
                let field = member.name.clone().unwrap_or_default();
                shader_struct.add_field(ShaderUniformDeclaration::new(uniform_type(&member.ty)?, field, 1).with_stage(stage));
            }
            ShaderUniformDeclaration::new_struct(shader_struct, name, count)
        }
        other => ShaderUniformDeclaration::new(uniform_type(other)?, name, count),
    };
    Some(declaration.with_stage(stage))
}

/// Struct holding the block members, with the offset of that struct in the block
///
/// Some compilers wrap the declared block in an anonymous struct with a
/// single unnamed member; those wrappers are stepped through.
fn block_struct(ty: &spirq::ty::Type) -> Option<(&spirq::ty::StructType, u32)> {
    use spirq::ty::Type;
    let Type::Struct(st) = ty else {
        return None;
    };
    let mut st = st;
    let mut base = 0u32;
    while let [only] = st.members.as_slice() {
        match &only.ty {
            Type::Struct(inner) if only.name.is_none() => {
                base += only.offset.unwrap_or(0) as u32;
                st = inner;
            }
            _ => break,
        }
    }
    Some((st, base))
}

fn block_declaration(name: &str, binding: u32, ty: &spirq::ty::Type, stage: ShaderStageFlags) -> ShaderUniformBufferDeclaration {
    let mut block = ShaderUniformBufferDeclaration::new(name, binding, stage).with_packing(UniformPacking::Std140);
    if let Some((st, base)) = block_struct(ty) {
        for member in &st.members {
            let member_name = member.name.clone().unwrap_or_default();
            match member_declaration(&member_name, &member.ty, stage) {
                Some(declaration) => block.push_uniform_at(declaration, base + member.offset.unwrap_or(0) as u32),
                None => engine_warn!(SOURCE, "Block '{}' member '{}' has an unsupported type, it cannot be set",
                    name, member_name),
            }
        }
    }
    if let Some(size) = ty.nbyte() {
        block.set_size(size as u32);
    }
    block
}

/// Descriptors of set 0 used by one stage
pub fn reflect_spirv(words: &[u32], stage: ShaderStageFlags) -> Result<Vec<SpirvDescriptor>> {
    let entry_points = match spirq::ReflectConfig::new().spv(words).ref_all_rscs(true).reflect() {
        Ok(entry_points) => entry_points,
        Err(e) => {
            engine_bail_warn!(SOURCE, "SPIR-V reflection failed: {:?}", e);
        }
    };

    let mut descriptors: Vec<SpirvDescriptor> = Vec::new();
    for entry_point in &entry_points {
        for var in entry_point.vars.iter() {
            match var {
                spirq::var::Variable::Descriptor { name, desc_bind, desc_ty, ty, .. } => {
                    if desc_bind.set() != 0 {
                        engine_bail_warn!(SOURCE, "Descriptor set {} is not supported (set 0 only)", desc_bind.set());
                    }
                    if descriptors.iter().any(|d| d.binding == desc_bind.bind()) {
                        continue;
                    }
                    let descriptor_type = descriptor_type(desc_ty)?;
                    let name = name.clone().unwrap_or_default();
                    let block = (descriptor_type == vk::DescriptorType::UNIFORM_BUFFER).then(|| {
                        let block_name = if name.is_empty() { format!("Block{}", desc_bind.bind()) } else { name.clone() };
                        block_declaration(&block_name, desc_bind.bind(), ty, stage)
                    });
                    descriptors.push(SpirvDescriptor {
                        name,
                        binding: desc_bind.bind(),
                        descriptor_type,
                        stages: stage,
                        block,
                    });
                }
                spirq::var::Variable::PushConstant { name, .. } => {
                    engine_warn!(SOURCE, "Push constant '{}' ignored; use a uniform block",
                        name.clone().unwrap_or_default());
                }
                _ => {}
            }
        }
    }
    descriptors.sort_by_key(|d| d.binding);
    Ok(descriptors)
}

/// Merge vertex and fragment descriptors by binding
pub fn merge_descriptors(vertex: Vec<SpirvDescriptor>, fragment: Vec<SpirvDescriptor>) -> Result<Vec<SpirvDescriptor>> {
    let mut merged = vertex;
    for descriptor in fragment {
        match merged.iter_mut().find(|d| d.binding == descriptor.binding) {
            Some(existing) => {
                if existing.descriptor_type != descriptor.descriptor_type {
                    engine_bail_warn!(SOURCE,
                        "Binding {} ('{}') has type {:?} in the vertex stage and {:?} in the fragment stage",
                        existing.binding, existing.name, existing.descriptor_type, descriptor.descriptor_type);
                }
                existing.stages |= descriptor.stages;
                if let Some(block) = &mut existing.block {
                    *block = widen_block(block, descriptor.stages);
                }
            }
            None => merged.push(descriptor),
        }
    }
    merged.sort_by_key(|d| d.binding);
    Ok(merged)
}

/// Copy of `block` also visible to `stage`
fn widen_block(block: &ShaderUniformBufferDeclaration, stage: ShaderStageFlags) -> ShaderUniformBufferDeclaration {
    let stages = block.stage() | stage;
    let mut widened = ShaderUniformBufferDeclaration::new(block.name(), block.register(), stages)
        .with_packing(block.packing());
    for uniform in block.uniforms() {
        widened.push_uniform_at(uniform.clone().with_stage(stages), uniform.offset());
    }
    widened.set_size(block.size());
    widened
}

#[cfg(test)]
#[path = "vulkan_spirv_tests.rs"]
mod tests;
