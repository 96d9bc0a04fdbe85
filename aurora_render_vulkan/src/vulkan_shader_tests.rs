//! Unit tests for program building (rewrite, compile, descriptor mapping)
//!
//! Everything here runs through naga and spirq on the CPU; pipelines and
//! modules need a device and are covered by the ignored GPU tests.

use super::*;
use aurora_render::aurora::render::UniformType;

const VERTEX: &str = r#"
#version 330 core
layout(location = 0) in vec3 a_Position;
layout(location = 1) in vec2 a_TexCoord;

layout(std140) uniform Camera
{
    mat4 u_ViewProjection;
};

uniform mat4 u_Transform;

out vec2 v_TexCoord;

void main()
{
    v_TexCoord = a_TexCoord;
    gl_Position = u_ViewProjection * u_Transform * vec4(a_Position, 1.0);
}
"#;

const FRAGMENT: &str = r#"
#version 330 core
layout(location = 0) out vec4 color;

in vec2 v_TexCoord;

uniform vec4 u_Color;
uniform sampler2D u_Texture;

void main()
{
    color = texture(u_Texture, v_TexCoord) * u_Color;
}
"#;

const SPIRV_VERTEX: &str = r#"#version 450
layout(location = 0) in vec3 a_Position;
layout(std140, set = 0, binding = 0) uniform Camera {
    mat4 u_ViewProjection;
    vec4 u_Tint;
};
layout(location = 0) out vec4 v_Tint;
void main() {
    v_Tint = u_Tint;
    gl_Position = u_ViewProjection * vec4(a_Position, 1.0);
}
"#;

const SPIRV_FRAGMENT: &str = r#"#version 450
layout(location = 0) in vec4 v_Tint;
layout(location = 0) out vec4 o_Color;
layout(set = 0, binding = 1) uniform texture2D u_Albedo;
layout(set = 0, binding = 2) uniform sampler u_AlbedoSampler;
void main() {
    o_Color = texture(sampler2D(u_Albedo, u_AlbedoSampler), vec2(0.5)) * v_Tint;
}
"#;

fn sources(program: &CompiledProgram) -> Vec<(u32, DescriptorSource)> {
    program.descriptors.iter().map(|d| (d.binding, d.source)).collect()
}

// ============================================================================
// GLSL PROGRAMS
// ============================================================================

#[test]
fn test_glsl_program_descriptor_layout() {
    let program = build_glsl_program("textured", VERTEX, FRAGMENT).unwrap();
    assert_eq!(sources(&program), vec![
        (0, DescriptorSource::Block(0)),
        (1, DescriptorSource::LooseUniforms(0)),
        (2, DescriptorSource::LooseUniforms(1)),
        (3, DescriptorSource::TextureImage(0)),
        (4, DescriptorSource::TextureSampler(0)),
    ]);

    let types: Vec<vk::DescriptorType> = program.descriptors.iter().map(|d| d.descriptor_type).collect();
    assert_eq!(types, vec![
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::DescriptorType::SAMPLED_IMAGE,
        vk::DescriptorType::SAMPLER,
    ]);
}

#[test]
fn test_glsl_program_stages_follow_use() {
    let program = build_glsl_program("textured", VERTEX, FRAGMENT).unwrap();
    assert_eq!(program.descriptors[0].stages, ShaderStageFlags::VERTEX);
    assert_eq!(program.descriptors[1].stages, ShaderStageFlags::VERTEX);
    assert_eq!(program.descriptors[2].stages, ShaderStageFlags::FRAGMENT);
    assert_eq!(program.descriptors[3].stages, ShaderStageFlags::FRAGMENT);
}

#[test]
fn test_glsl_program_keeps_gl_reflection() {
    let program = build_glsl_program("textured", VERTEX, FRAGMENT).unwrap();
    let reflection = &program.reflection;
    assert_eq!(reflection.uniform_buffers.len(), 1);
    assert_eq!(reflection.uniform_buffers[0].name(), "Camera");
    assert_eq!(reflection.uniform_buffers[0].size(), 64);
    assert_eq!(reflection.uniforms.len(), 2);
    assert_eq!(reflection.resources.len(), 1);
    assert_eq!(reflection.resources[0].name, "u_Texture");
    assert!(matches!(reflection.find_uniform("u_Color"), Some(UniformLocation::Loose { .. })));
}

#[test]
fn test_glsl_program_loose_blocks_per_stage() {
    let program = build_glsl_program("textured", VERTEX, FRAGMENT).unwrap();
    assert_eq!(program.loose_blocks.len(), 2);

    let vertex = &program.loose_blocks[0];
    assert_eq!(vertex.name(), VERTEX_UNIFORMS_BLOCK);
    assert_eq!(vertex.register(), 1);
    assert_eq!(vertex.size(), 64);
    assert!(vertex.find_uniform("u_Transform").is_some());
    assert!(vertex.find_uniform("u_Color").is_none());

    let fragment = &program.loose_blocks[1];
    assert_eq!(fragment.name(), FRAGMENT_UNIFORMS_BLOCK);
    assert_eq!(fragment.size(), 16);
    assert_eq!(fragment.resolve("u_Color").unwrap().offset, 0);
}

#[test]
fn test_glsl_program_emits_spirv() {
    let program = build_glsl_program("textured", VERTEX, FRAGMENT).unwrap();
    assert_eq!(program.vertex[0], 0x0723_0203);
    assert_eq!(program.fragment[0], 0x0723_0203);
}

#[test]
fn test_glsl_program_without_uniforms() {
    let vertex = "#version 330 core\nlayout(location = 0) in vec3 a_Position;\nvoid main() { gl_Position = vec4(a_Position, 1.0); }\n";
    let fragment = "#version 330 core\nout vec4 color;\nvoid main() { color = vec4(1.0); }\n";
    let program = build_glsl_program("flat", vertex, fragment).unwrap();
    assert!(program.descriptors.is_empty());
    assert!(program.loose_blocks.is_empty());
}

#[test]
fn test_glsl_program_rejects_broken_source() {
    let fragment = "#version 330 core\nout vec4 color;\nvoid main() { color = missing(); }\n";
    assert!(build_glsl_program("broken", VERTEX, fragment).is_err());
}

// ============================================================================
// SPIR-V PROGRAMS
// ============================================================================

#[test]
fn test_spirv_program_pairs_sampler_with_image() {
    let vertex = compile_glsl(SPIRV_VERTEX, ShaderStageFlags::VERTEX, "spirv").unwrap();
    let fragment = compile_glsl(SPIRV_FRAGMENT, ShaderStageFlags::FRAGMENT, "spirv").unwrap();
    let program = build_spirv_program(vertex, fragment).unwrap();

    assert_eq!(sources(&program), vec![
        (0, DescriptorSource::Block(0)),
        (1, DescriptorSource::TextureImage(0)),
        (2, DescriptorSource::TextureSampler(0)),
    ]);
    assert_eq!(program.reflection.resources.len(), 1);
    assert_eq!(program.reflection.resources[0].name, "u_Albedo");
    assert_eq!(program.reflection.resources[0].register, 1);
}

#[test]
fn test_spirv_program_block_from_reflection() {
    let vertex = compile_glsl(SPIRV_VERTEX, ShaderStageFlags::VERTEX, "spirv").unwrap();
    let fragment = compile_glsl(SPIRV_FRAGMENT, ShaderStageFlags::FRAGMENT, "spirv").unwrap();
    let program = build_spirv_program(vertex, fragment).unwrap();

    let block = &program.reflection.uniform_buffers[0];
    assert_eq!(block.register(), 0);
    assert_eq!(block.size(), 80);
    let tint = block.resolve("u_Tint").unwrap();
    assert_eq!(tint.offset, 64);
    assert_eq!(tint.uniform_type, UniformType::Vec4);
    assert!(program.loose_blocks.is_empty());
}

// ============================================================================
// HELPERS
// ============================================================================

#[test]
fn test_std140_member_relays_out_structs() {
    let mut light = ShaderStruct::with_packing("Light", UniformPacking::Tight);
    light.add_field(ShaderUniformDeclaration::new(UniformType::Vec3, "position", 1));
    light.add_field(ShaderUniformDeclaration::new(UniformType::Float, "intensity", 1));
    let uniform = ShaderUniformDeclaration::new_struct(light, "u_Light", 2);

    let member = std140_member(&uniform, ShaderStageFlags::FRAGMENT);
    assert_eq!(member.name(), "u_Light");
    assert_eq!(member.count(), 2);
    assert_eq!(member.stage(), ShaderStageFlags::FRAGMENT);
    let rebuilt = member.shader_struct().unwrap();
    assert_eq!(rebuilt.packing(), UniformPacking::Std140);
    assert_eq!(rebuilt.fields().len(), 2);
    assert_eq!(rebuilt.fields()[0].stage(), ShaderStageFlags::FRAGMENT);
}

#[test]
fn test_std140_member_scalar() {
    let uniform = ShaderUniformDeclaration::new(UniformType::Vec2, "u_Offset", 1);
    let member = std140_member(&uniform, ShaderStageFlags::VERTEX);
    assert_eq!(member.uniform_type(), UniformType::Vec2);
    assert_eq!(member.stage(), ShaderStageFlags::VERTEX);
    assert!(member.shader_struct().is_none());
}
