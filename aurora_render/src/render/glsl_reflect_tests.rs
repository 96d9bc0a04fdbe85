use crate::error::Error;
use crate::render::glsl_reflect::*;
use crate::render::shader_uniform::*;

const VERTEX: &str = r#"
#version 450 core
// Flat color vertex stage
layout(location = 0) in vec3 a_Position;
layout(location = 1) in vec2 a_TexCoord;

layout(std140, binding = 0) uniform Camera {
    mat4 u_ViewProjection;
    vec3 u_Eye;
    float u_Time;
} camera;

uniform mat4 u_Transform;

out vec2 v_TexCoord;

void main() {
    v_TexCoord = a_TexCoord;
    gl_Position = camera.u_ViewProjection * u_Transform * vec4(a_Position, 1.0);
}
"#;

const FRAGMENT: &str = r#"
#version 450 core
precision mediump float;

/* Point light,
   one level of nesting */
struct Light {
    vec3 Position;
    float Radius;
    vec4 Color;
};

layout(std140, binding = 0) uniform Camera {
    mat4 u_ViewProjection;
    vec3 u_Eye;
    float u_Time;
};

uniform Light u_Light;
uniform vec4 u_Color;
uniform sampler2D u_Texture;

in vec2 v_TexCoord;
out vec4 o_Color;

void main() {
    if (u_Time > 0.0) { o_Color = u_Color; }
    o_Color = texture(u_Texture, v_TexCoord) * u_Light.Color;
}
"#;

#[test]
fn test_vertex_stage_block_and_loose_uniform() {
    let reflection = reflect_glsl(ShaderStageFlags::VERTEX, VERTEX, UniformPacking::Tight).unwrap();

    assert_eq!(reflection.uniform_buffers.len(), 1);
    let camera = &reflection.uniform_buffers[0];
    assert_eq!(camera.name(), "Camera");
    assert_eq!(camera.register(), 0);
    assert_eq!(camera.packing(), UniformPacking::Std140);
    assert_eq!(camera.find_uniform("u_Eye").unwrap().offset(), 64);
    assert_eq!(camera.find_uniform("u_Time").unwrap().offset(), 76);
    assert_eq!(camera.size(), 80);

    assert_eq!(reflection.uniforms.len(), 1);
    assert_eq!(reflection.uniforms[0].name(), "u_Transform");
    assert_eq!(reflection.uniforms[0].uniform_type(), UniformType::Mat4);
}

#[test]
fn test_program_merges_stages() {
    let reflection = reflect_glsl_program(VERTEX, FRAGMENT, UniformPacking::Tight).unwrap();

    assert_eq!(reflection.uniform_buffers.len(), 1);
    let camera = &reflection.uniform_buffers[0];
    assert_eq!(camera.stage(), ShaderStageFlags::ALL_GRAPHICS);
    assert_eq!(camera.find_uniform("u_Time").unwrap().stage(), ShaderStageFlags::ALL_GRAPHICS);

    let transform = reflection.uniforms.iter().find(|u| u.name() == "u_Transform").unwrap();
    assert_eq!(transform.stage(), ShaderStageFlags::VERTEX);
    let color = reflection.uniforms.iter().find(|u| u.name() == "u_Color").unwrap();
    assert_eq!(color.stage(), ShaderStageFlags::FRAGMENT);
}

#[test]
fn test_struct_uniform_and_field_resolution() {
    let reflection = reflect_glsl(ShaderStageFlags::FRAGMENT, FRAGMENT, UniformPacking::Tight).unwrap();

    let light = reflection.uniforms.iter().find(|u| u.name() == "u_Light").unwrap();
    assert_eq!(light.uniform_type(), UniformType::Struct);
    assert_eq!(light.size(), 32);
    assert_eq!(light.shader_struct().unwrap().name(), "Light");

    match reflection.find_uniform("u_Light.Color") {
        Some(UniformLocation::Loose { resolved, .. }) => {
            assert_eq!(resolved.uniform_type, UniformType::Vec4);
            assert_eq!(resolved.offset, 16);
        }
        other => panic!("unexpected location {:?}", other),
    }
}

#[test]
fn test_sampler_becomes_resource() {
    let reflection = reflect_glsl(ShaderStageFlags::FRAGMENT, FRAGMENT, UniformPacking::Tight).unwrap();

    let texture = reflection.find_resource("u_Texture").unwrap();
    assert_eq!(texture.resource_type, ShaderResourceType::Texture2D);
    assert_eq!(texture.register, 0);
    assert_eq!(texture.count, 1);
    assert!(reflection.uniforms.iter().all(|u| u.name() != "u_Texture"));
}

#[test]
fn test_unbound_blocks_get_sequential_registers() {
    let source = r#"
        layout(binding = 2) uniform Material { vec4 albedo; };
        uniform Frame { float time; };
        uniform Object { mat4 model; };
    "#;
    let reflection = reflect_glsl(ShaderStageFlags::VERTEX, source, UniformPacking::Tight).unwrap();
    let registers: Vec<u32> = reflection.uniform_buffers.iter().map(|b| b.register()).collect();
    assert_eq!(registers, vec![2, 3, 4]);
}

#[test]
fn test_default_packing_applies_without_std140() {
    let source = "uniform Params { float a; vec4 b; int c; };";

    let tight = reflect_glsl(ShaderStageFlags::FRAGMENT, source, UniformPacking::Tight).unwrap();
    let offsets: Vec<u32> = tight.uniform_buffers[0].uniforms().iter().map(|u| u.offset()).collect();
    assert_eq!(offsets, vec![0, 4, 20]);

    let std140 = reflect_glsl(ShaderStageFlags::FRAGMENT, source, UniformPacking::Std140).unwrap();
    let offsets: Vec<u32> = std140.uniform_buffers[0].uniforms().iter().map(|u| u.offset()).collect();
    assert_eq!(offsets, vec![0, 16, 32]);
}

#[test]
fn test_arrays_and_declarator_lists() {
    let source = "uniform float u_Weights[4], u_Bias; uniform highp mat4 u_Bones[2];";
    let reflection = reflect_glsl(ShaderStageFlags::VERTEX, source, UniformPacking::Tight).unwrap();

    let names: Vec<(&str, u32)> = reflection.uniforms.iter().map(|u| (u.name(), u.count())).collect();
    assert_eq!(names, vec![("u_Weights", 4), ("u_Bias", 1), ("u_Bones", 2)]);
    assert_eq!(reflection.uniforms[2].size(), 128);
}

#[test]
fn test_unknown_type_is_reported() {
    let source = "uniform dvec3 u_Position;";
    let result = reflect_glsl(ShaderStageFlags::VERTEX, source, UniformPacking::Tight);
    assert_eq!(result, Err(Error::UnknownShaderType("dvec3".to_string())));
}

#[test]
fn test_nested_struct_is_rejected() {
    let source = r#"
        struct Inner { float x; };
        struct Outer { Inner inner; };
    "#;
    let result = reflect_glsl(ShaderStageFlags::VERTEX, source, UniformPacking::Tight);
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_commented_out_uniforms_are_ignored() {
    let source = r#"
        // uniform vec4 u_Old;
        /* uniform mat4 u_Gone; */
        #define UNUSED uniform float u_Macro;
        uniform vec2 u_Kept;
    "#;
    let reflection = reflect_glsl(ShaderStageFlags::FRAGMENT, source, UniformPacking::Tight).unwrap();
    assert_eq!(reflection.uniforms.len(), 1);
    assert_eq!(reflection.uniforms[0].name(), "u_Kept");
}

#[test]
fn test_malformed_array_size() {
    let source = "uniform vec4 u_Colors[MAX_COLORS];";
    assert!(reflect_glsl(ShaderStageFlags::FRAGMENT, source, UniformPacking::Tight).is_err());
}
