/// VulkanShader - modules, descriptor layout, uniform storage and pipelines
///
/// A shader owns one descriptor set layout (set 0) and a pipeline layout.
/// Pipelines are created on demand for each combination of vertex input
/// layout, depth and blend state and render pass signature, and cached
/// for the shader's lifetime.
///
/// Uniform values live in CPU-side block storage. At draw time every
/// block is copied to the recorder's uniform ring unless a uniform buffer
/// is bound at the block's register, which then takes precedence.

use ash::vk;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::ffi::CStr;
use std::sync::{Arc, Mutex, MutexGuard};
use aurora_render::aurora::{Error, Result};
use aurora_render::aurora::render::{
    lock_context, reflect_glsl_program, ResourceGuard, ResourceKey, ResourceKind, SharedContext, Shader,
    ShaderDesc, ShaderReflection, ShaderResourceDeclaration, ShaderResourceType, ShaderSource,
    ShaderStageFlags, ShaderStruct, ShaderUniformBufferDeclaration, ShaderUniformDeclaration,
    UniformBlockStorage, UniformLocation, UniformPacking, UniformValue, VertexInputLayout,
};
use aurora_render::{engine_bail_warn, engine_debug, engine_err, engine_warn};
use crate::vulkan_context::{Garbage, GpuContext};
use crate::vulkan_format::{attribute_format, shader_stages};
use crate::vulkan_glsl::{translate_stage, ProgramBindings, FRAGMENT_UNIFORMS_BLOCK, VERTEX_UNIFORMS_BLOCK};
use crate::vulkan_recorder::FrameRecorder;
use crate::vulkan_render_pass::PassSignature;
use crate::vulkan_spirv::{compile_glsl, merge_descriptors, reflect_spirv, SpirvDescriptor};

const SOURCE: &str = "aurora::vulkan::Shader";

const ENTRY_POINT: &CStr = c"main";

/// Everything a pipeline depends on besides the shader itself
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub input: VertexInputLayout,
    pub depth_test: bool,
    pub blend: bool,
    pub signature: PassSignature,
}

/// What feeds one descriptor binding at draw time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorSource {
    /// `reflection.uniform_buffers[i]`
    Block(usize),
    /// Per-stage block holding the loose uniforms
    LooseUniforms(usize),
    /// Combined image and sampler of `reflection.resources[i]`
    Texture(usize),
    /// Image half of `reflection.resources[i]`
    TextureImage(usize),
    /// Sampler half of `reflection.resources[i]`
    TextureSampler(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorSlot {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stages: ShaderStageFlags,
    pub source: DescriptorSource,
}

/// Mutable uniform state
struct UniformState {
    blocks: Vec<UniformBlockStorage>,
    loose: Vec<UniformBlockStorage>,
    /// Texture slot read by each resource
    texture_slots: Vec<u32>,
}

/// Result of building a program for Vulkan
pub struct CompiledProgram {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
    pub reflection: ShaderReflection,
    pub loose_blocks: Vec<ShaderUniformBufferDeclaration>,
    pub descriptors: Vec<DescriptorSlot>,
}

// ===== PROGRAM BUILD =====

/// Same member, laid out with std140 rules
fn std140_member(uniform: &ShaderUniformDeclaration, stage: ShaderStageFlags) -> ShaderUniformDeclaration {
    let rebuilt = match uniform.shader_struct() {
        Some(source) => {
            let mut shader_struct = ShaderStruct::with_packing(source.name(), UniformPacking::Std140);
            for field in source.fields() {
                shader_struct.add_field(
                    ShaderUniformDeclaration::new(field.uniform_type(), field.name(), field.count()).with_stage(stage),
                );
            }
            ShaderUniformDeclaration::new_struct(shader_struct, uniform.name(), uniform.count())
        }
        None => ShaderUniformDeclaration::new(uniform.uniform_type(), uniform.name(), uniform.count()),
    };
    rebuilt.with_stage(stage)
}

fn find_descriptor(descriptors: &[SpirvDescriptor], binding: u32) -> Option<&SpirvDescriptor> {
    descriptors.iter().find(|d| d.binding == binding)
}

/// Compile GLSL through the rewrite and naga, reflect it like the GL backend
pub fn build_glsl_program(name: &str, vertex: &str, fragment: &str) -> Result<CompiledProgram> {
    // Vulkan uniform blocks are always std140
    let mut reflection = reflect_glsl_program(vertex, fragment, UniformPacking::Std140)?;
    let bindings = ProgramBindings::assign(&reflection)?;

    let mut varyings = FxHashMap::default();
    let vertex_stage = translate_stage(vertex, ShaderStageFlags::VERTEX, &bindings, &mut varyings)?;
    let fragment_stage = translate_stage(fragment, ShaderStageFlags::FRAGMENT, &bindings, &mut varyings)?;
    let vertex_words = compile_glsl(&vertex_stage.source, ShaderStageFlags::VERTEX, name)?;
    let fragment_words = compile_glsl(&fragment_stage.source, ShaderStageFlags::FRAGMENT, name)?;

    let reflected = merge_descriptors(
        reflect_spirv(&vertex_words, ShaderStageFlags::VERTEX)?,
        reflect_spirv(&fragment_words, ShaderStageFlags::FRAGMENT)?,
    )?;

    let mut descriptors = Vec::new();
    for (index, block) in reflection.uniform_buffers.iter_mut().enumerate() {
        let Some(descriptor) = find_descriptor(&reflected, block.register()) else {
            continue;
        };
        if let Some(size) = descriptor.block.as_ref().map(|b| b.size()) {
            block.set_size(size);
        }
        descriptors.push(DescriptorSlot {
            binding: descriptor.binding,
            descriptor_type: descriptor.descriptor_type,
            stages: descriptor.stages,
            source: DescriptorSource::Block(index),
        });
    }

    let mut loose_blocks = Vec::new();
    let stages = [
        (ShaderStageFlags::VERTEX, VERTEX_UNIFORMS_BLOCK, bindings.vertex_uniforms, &vertex_stage.loose_uniforms),
        (ShaderStageFlags::FRAGMENT, FRAGMENT_UNIFORMS_BLOCK, bindings.fragment_uniforms, &fragment_stage.loose_uniforms),
    ];
    for (stage, block_name, binding, names) in stages {
        let Some(binding) = binding else {
            continue;
        };
        let mut block = ShaderUniformBufferDeclaration::new(block_name, binding, stage)
            .with_packing(UniformPacking::Std140);
        for uniform_name in names {
            if let Some(uniform) = reflection.uniforms.iter().find(|u| u.name() == uniform_name) {
                block.push_uniform(std140_member(uniform, stage));
            }
        }
        if let Some(descriptor) = find_descriptor(&reflected, binding) {
            if let Some(size) = descriptor.block.as_ref().map(|b| b.size()) {
                block.set_size(size);
            }
            descriptors.push(DescriptorSlot {
                binding,
                descriptor_type: descriptor.descriptor_type,
                stages: descriptor.stages,
                source: DescriptorSource::LooseUniforms(loose_blocks.len()),
            });
        }
        loose_blocks.push(block);
    }

    for (index, texture) in bindings.textures.iter().enumerate() {
        let halves = [
            (texture.texture, DescriptorSource::TextureImage(index)),
            (texture.sampler, DescriptorSource::TextureSampler(index)),
        ];
        for (binding, source) in halves {
            if let Some(descriptor) = find_descriptor(&reflected, binding) {
                descriptors.push(DescriptorSlot {
                    binding,
                    descriptor_type: descriptor.descriptor_type,
                    stages: descriptor.stages,
                    source,
                });
            }
        }
    }

    descriptors.sort_by_key(|d| d.binding);
    Ok(CompiledProgram {
        vertex: vertex_words,
        fragment: fragment_words,
        reflection,
        loose_blocks,
        descriptors,
    })
}

/// Reflect pre-compiled SPIR-V
///
/// Blocks and textures take their binding as register and slot. A
/// separate sampler pairs with the closest sampled image below it.
pub fn build_spirv_program(vertex: Vec<u32>, fragment: Vec<u32>) -> Result<CompiledProgram> {
    let reflected = merge_descriptors(
        reflect_spirv(&vertex, ShaderStageFlags::VERTEX)?,
        reflect_spirv(&fragment, ShaderStageFlags::FRAGMENT)?,
    )?;

    let mut reflection = ShaderReflection::default();
    let mut descriptors = Vec::new();
    for descriptor in reflected {
        let source = match descriptor.descriptor_type {
            vk::DescriptorType::UNIFORM_BUFFER => {
                let Some(block) = descriptor.block.clone() else {
                    continue;
                };
                reflection.uniform_buffers.push(block);
                DescriptorSource::Block(reflection.uniform_buffers.len() - 1)
            }
            vk::DescriptorType::SAMPLER => {
                let Some(image) = reflection.resources.len().checked_sub(1) else {
                    engine_warn!(SOURCE, "Sampler at binding {} has no image before it", descriptor.binding);
                    continue;
                };
                DescriptorSource::TextureSampler(image)
            }
            image_type => {
                reflection.resources.push(ShaderResourceDeclaration {
                    name: descriptor.name.clone(),
                    resource_type: ShaderResourceType::Texture2D,
                    register: descriptor.binding,
                    count: 1,
                });
                let index = reflection.resources.len() - 1;
                if image_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER {
                    DescriptorSource::Texture(index)
                } else {
                    DescriptorSource::TextureImage(index)
                }
            }
        };
        descriptors.push(DescriptorSlot {
            binding: descriptor.binding,
            descriptor_type: descriptor.descriptor_type,
            stages: descriptor.stages,
            source,
        });
    }

    Ok(CompiledProgram {
        vertex,
        fragment,
        reflection,
        loose_blocks: Vec::new(),
        descriptors,
    })
}

// ===== SHADER =====

pub struct VulkanShader {
    name: String,
    gpu: Arc<GpuContext>,
    reflection: ShaderReflection,
    modules: [vk::ShaderModule; 2],
    set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
    descriptors: Vec<DescriptorSlot>,
    uniforms: Mutex<UniformState>,
    pipelines: Mutex<FxHashMap<PipelineKey, vk::Pipeline>>,
    guard: ResourceGuard,
}

impl VulkanShader {
    pub fn new(gpu: &Arc<GpuContext>, context: &SharedContext, desc: &ShaderDesc) -> Result<Self> {
        let program = match &desc.source {
            ShaderSource::Glsl { vertex, fragment } => build_glsl_program(&desc.name, vertex, fragment)?,
            ShaderSource::SpirV { vertex, fragment } => build_spirv_program(vertex.clone(), fragment.clone())?,
        };

        let device = &gpu.device;
        let vertex_module = create_module(gpu, &program.vertex, &desc.name)?;
        let fragment_module = match create_module(gpu, &program.fragment, &desc.name) {
            Ok(module) => module,
            Err(e) => {
                gpu.retire(Garbage::ShaderModule(vertex_module));
                return Err(e);
            }
        };

        let layout_bindings: Vec<vk::DescriptorSetLayoutBinding> = program
            .descriptors
            .iter()
            .map(|slot| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(slot.binding)
                    .descriptor_type(slot.descriptor_type)
                    .descriptor_count(1)
                    .stage_flags(shader_stages(slot.stages))
            })
            .collect();
        let set_layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&layout_bindings);
        let set_layout = unsafe { device.create_descriptor_set_layout(&set_layout_info, None) };
        let set_layout = match set_layout {
            Ok(layout) => layout,
            Err(e) => {
                gpu.retire(Garbage::ShaderModule(vertex_module));
                gpu.retire(Garbage::ShaderModule(fragment_module));
                return Err(engine_err!(SOURCE, "Failed to create descriptor set layout for '{}': {:?}", desc.name, e));
            }
        };

        let set_layouts = [set_layout];
        let pipeline_layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let pipeline_layout = match unsafe { device.create_pipeline_layout(&pipeline_layout_info, None) } {
            Ok(layout) => layout,
            Err(e) => {
                gpu.retire(Garbage::ShaderModule(vertex_module));
                gpu.retire(Garbage::ShaderModule(fragment_module));
                gpu.retire(Garbage::DescriptorSetLayout(set_layout));
                return Err(engine_err!(SOURCE, "Failed to create pipeline layout for '{}': {:?}", desc.name, e));
            }
        };
        gpu.set_object_name(vertex_module, &format!("{} (vertex)", desc.name));
        gpu.set_object_name(fragment_module, &format!("{} (fragment)", desc.name));

        let uniforms = UniformState {
            blocks: program.reflection.uniform_buffers.iter().cloned().map(UniformBlockStorage::new).collect(),
            loose: program.loose_blocks.into_iter().map(UniformBlockStorage::new).collect(),
            texture_slots: program.reflection.resources.iter().map(|r| r.register).collect(),
        };

        engine_debug!(SOURCE, "Created shader '{}': {} blocks, {} loose uniforms, {} resources, {} descriptors",
            desc.name,
            program.reflection.uniform_buffers.len(),
            program.reflection.uniforms.len(),
            program.reflection.resources.len(),
            program.descriptors.len());

        Ok(Self {
            name: desc.name.clone(),
            gpu: gpu.clone(),
            reflection: program.reflection,
            modules: [vertex_module, fragment_module],
            set_layout,
            pipeline_layout,
            descriptors: program.descriptors,
            uniforms: Mutex::new(uniforms),
            pipelines: Mutex::new(FxHashMap::default()),
            guard: ResourceGuard::register(context, ResourceKind::Shader, &desc.name)?,
        })
    }

    fn lock_uniforms(&self) -> Result<MutexGuard<'_, UniformState>> {
        self.uniforms
            .lock()
            .map_err(|_| Error::BackendError("Shader uniform lock poisoned".to_string()))
    }

    /// Pipeline for `key`, created on first use
    pub fn pipeline(&self, key: &PipelineKey) -> Result<vk::Pipeline> {
        let mut pipelines = self
            .pipelines
            .lock()
            .map_err(|_| Error::BackendError("Pipeline cache lock poisoned".to_string()))?;
        if let Some(&pipeline) = pipelines.get(key) {
            return Ok(pipeline);
        }
        let pipeline = self.create_pipeline(key)?;
        pipelines.insert(key.clone(), pipeline);
        engine_debug!(SOURCE, "Shader '{}' now has {} pipelines", self.name, pipelines.len());
        Ok(pipeline)
    }

    fn create_pipeline(&self, key: &PipelineKey) -> Result<vk::Pipeline> {
        let render_pass = self.gpu.render_pass(key.signature)?;

        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(self.modules[0])
                .name(ENTRY_POINT),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(self.modules[1])
                .name(ENTRY_POINT),
        ];

        let bindings: Vec<vk::VertexInputBindingDescription> = key
            .input
            .bindings
            .iter()
            .map(|b| vk::VertexInputBindingDescription {
                binding: b.binding,
                stride: b.stride,
                input_rate: vk::VertexInputRate::VERTEX,
            })
            .collect();
        let attributes: Vec<vk::VertexInputAttributeDescription> = key
            .input
            .attributes
            .iter()
            .map(|a| vk::VertexInputAttributeDescription {
                location: a.location,
                binding: a.binding,
                format: attribute_format(a),
                offset: a.offset,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_test = key.depth_test && key.signature.depth.is_some();
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth_test)
            .depth_write_enable(depth_test)
            .depth_compare_op(vk::CompareOp::LESS);

        let blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(key.blend)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .alpha_blend_op(vk::BlendOp::ADD);
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .attachments(std::slice::from_ref(&blend_attachment));

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(self.pipeline_layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            self.gpu.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| engine_err!(SOURCE, "Failed to create pipeline for '{}': {:?}", self.name, e))?
        };
        let pipeline = pipelines[0];
        self.gpu.set_object_name(pipeline, &self.name);
        Ok(pipeline)
    }

    /// Bind the pipeline for `key` and this draw's descriptor set
    ///
    /// Returns true when the bound pipeline changed.
    pub fn record_draw(&self, recorder: &mut FrameRecorder, key: &PipelineKey) -> Result<bool> {
        let pipeline = self.pipeline(key)?;
        let changed = recorder.bind_pipeline(pipeline);
        if self.descriptors.is_empty() {
            return Ok(changed);
        }
        let set = recorder.allocate_descriptor_set(self.set_layout)?;
        self.write_descriptors(recorder, set)?;
        recorder.bind_descriptor_set(self.pipeline_layout, set);
        Ok(changed)
    }

    fn write_descriptors(&self, recorder: &mut FrameRecorder, set: vk::DescriptorSet) -> Result<()> {
        let uniforms = self.lock_uniforms()?;

        enum Info {
            Buffer(vk::DescriptorBufferInfo),
            Image(vk::DescriptorImageInfo),
        }

        let mut infos = Vec::with_capacity(self.descriptors.len());
        for slot in &self.descriptors {
            let info = match slot.source {
                DescriptorSource::Block(index) => {
                    let register = self.reflection.uniform_buffers[index].register();
                    match recorder.uniform_slot(register) {
                        Some((buffer, size)) => Info::Buffer(vk::DescriptorBufferInfo { buffer, offset: 0, range: size }),
                        None => Info::Buffer(upload_block(recorder, &uniforms.blocks[index])?),
                    }
                }
                DescriptorSource::LooseUniforms(index) => Info::Buffer(upload_block(recorder, &uniforms.loose[index])?),
                DescriptorSource::Texture(index) | DescriptorSource::TextureImage(index) => {
                    let (view, sampler) = recorder.texture_slot(uniforms.texture_slots[index]);
                    Info::Image(vk::DescriptorImageInfo {
                        sampler,
                        image_view: view,
                        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    })
                }
                DescriptorSource::TextureSampler(index) => {
                    let (_, sampler) = recorder.texture_slot(uniforms.texture_slots[index]);
                    Info::Image(vk::DescriptorImageInfo {
                        sampler,
                        image_view: vk::ImageView::null(),
                        image_layout: vk::ImageLayout::UNDEFINED,
                    })
                }
            };
            infos.push(info);
        }

        let writes: Vec<vk::WriteDescriptorSet> = self
            .descriptors
            .iter()
            .zip(&infos)
            .map(|(slot, info)| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(slot.binding)
                    .descriptor_type(slot.descriptor_type);
                match info {
                    Info::Buffer(buffer) => write.buffer_info(std::slice::from_ref(buffer)),
                    Info::Image(image) => write.image_info(std::slice::from_ref(image)),
                }
            })
            .collect();
        unsafe { self.gpu.device.update_descriptor_sets(&writes, &[]) };
        Ok(())
    }

    pub fn descriptors(&self) -> &[DescriptorSlot] {
        &self.descriptors
    }
}

/// Minimum range written for a block descriptor
const MIN_BLOCK_RANGE: usize = 16;

fn upload_block(recorder: &mut FrameRecorder, storage: &UniformBlockStorage) -> Result<vk::DescriptorBufferInfo> {
    let data = storage.data();
    let (buffer, offset) = if data.len() < MIN_BLOCK_RANGE {
        let mut padded = data.to_vec();
        padded.resize(MIN_BLOCK_RANGE, 0);
        recorder.upload_uniforms(&padded)?
    } else {
        recorder.upload_uniforms(data)?
    };
    Ok(vk::DescriptorBufferInfo {
        buffer,
        offset,
        range: data.len().max(MIN_BLOCK_RANGE) as u64,
    })
}

fn create_module(gpu: &GpuContext, words: &[u32], name: &str) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(words);
    unsafe {
        gpu.device
            .create_shader_module(&create_info, None)
            .map_err(|e| engine_err!(SOURCE, "Failed to create shader module for '{}': {:?}", name, e))
    }
}

impl Shader for VulkanShader {
    fn name(&self) -> &str {
        &self.name
    }

    fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    fn bind(&self) -> Result<()> {
        self.guard.ensure_current()?;
        lock_context(self.guard.context())?.bind_shader(self.guard.key());
        Ok(())
    }

    fn unbind(&self) -> Result<()> {
        lock_context(self.guard.context())?.unbind_shader(self.guard.key());
        Ok(())
    }

    fn set_uniform(&self, name: &str, value: &UniformValue) -> Result<()> {
        self.guard.ensure_current()?;
        let mut uniforms = self.lock_uniforms()?;

        // Sampler uniforms select the texture slot they read
        if let Some(index) = self.reflection.resources.iter().position(|r| r.name == name) {
            let UniformValue::Int(slot) = *value else {
                engine_bail_warn!(SOURCE, "Sampler '{}' takes an Int texture slot", name);
            };
            if slot < 0 {
                engine_bail_warn!(SOURCE, "Negative texture slot {} for '{}'", slot, name);
            }
            uniforms.texture_slots[index] = slot as u32;
            return Ok(());
        }

        match self.reflection.find_uniform(name) {
            Some(UniformLocation::Block { block, .. }) => uniforms.blocks[block].set(name, value),
            Some(UniformLocation::Loose { index, .. }) => {
                let base = self.reflection.uniforms[index].name();
                let mut written = false;
                for storage in uniforms.loose.iter_mut() {
                    if storage.declaration().find_uniform(base).is_some() {
                        storage.set(name, value)?;
                        written = true;
                    }
                }
                if !written {
                    engine_bail_warn!(SOURCE, "Uniform '{}' of shader '{}' is not used by any stage", name, self.name);
                }
                Ok(())
            }
            None => {
                engine_bail_warn!(SOURCE, "Uniform '{}' not found in shader '{}'", name, self.name);
            }
        }
    }

    fn resource_key(&self) -> ResourceKey {
        self.guard.key()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanShader {
    fn drop(&mut self) {
        if let Ok(mut pipelines) = self.pipelines.lock() {
            for (_, pipeline) in pipelines.drain() {
                self.gpu.retire(Garbage::Pipeline(pipeline));
            }
        }
        self.gpu.retire(Garbage::PipelineLayout(self.pipeline_layout));
        self.gpu.retire(Garbage::DescriptorSetLayout(self.set_layout));
        for module in self.modules {
            self.gpu.retire(Garbage::ShaderModule(module));
        }
    }
}

#[cfg(test)]
#[path = "vulkan_shader_tests.rs"]
mod tests;
