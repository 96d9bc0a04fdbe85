use glam::{Mat3, Mat4, Vec3, Vec4};
use crate::error::Error;
use crate::render::shader_uniform::*;

fn floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn light_struct(packing: UniformPacking) -> ShaderStruct {
    let mut light = ShaderStruct::with_packing("Light", packing);
    light.add_field(ShaderUniformDeclaration::new(UniformType::Vec3, "Position", 1));
    light.add_field(ShaderUniformDeclaration::new(UniformType::Float, "Radius", 1));
    light.add_field(ShaderUniformDeclaration::new(UniformType::Vec4, "Color", 1));
    light
}

// ============================================================================
// TYPE NAMES
// ============================================================================

#[test]
fn test_type_names_round_trip() {
    for name in ["int32", "float", "vec2", "vec3", "vec4", "mat3", "mat4"] {
        assert_eq!(type_to_string(string_to_type(name)), name);
    }
}

#[test]
fn test_unknown_type_maps_to_stable_sentinel() {
    let ty = string_to_type("dvec3");
    assert_eq!(ty, UniformType::None);
    assert_eq!(type_to_string(ty), "Invalid Type");

    let again = string_to_type(type_to_string(ty));
    assert_eq!(again, UniformType::None);
    assert_eq!(type_to_string(again), "Invalid Type");
}

#[test]
fn test_strict_parse_fails_explicitly() {
    assert_eq!(UniformType::from_name("mat4"), Ok(UniformType::Mat4));
    assert_eq!(UniformType::from_name("int"), Ok(UniformType::Int32));
    assert_eq!(
        UniformType::from_name("bvec2"),
        Err(Error::UnknownShaderType("bvec2".to_string()))
    );
}

#[test]
fn test_type_sizes() {
    assert_eq!(UniformType::Int32.size(), 4);
    assert_eq!(UniformType::Vec3.size(), 12);
    assert_eq!(UniformType::Mat3.size(), 36);
    assert_eq!(UniformType::Mat3.std140_size(), 48);
    assert_eq!(UniformType::Mat4.size(), 64);
}

// ============================================================================
// PACKING
// ============================================================================

#[test]
fn test_tight_packing_law() {
    let mut block = ShaderUniformBufferDeclaration::new("Params", 0, ShaderStageFlags::FRAGMENT);
    let a = block.push_uniform(ShaderUniformDeclaration::new(UniformType::Float, "a", 1));
    let b = block.push_uniform(ShaderUniformDeclaration::new(UniformType::Vec4, "b", 1));
    let c = block.push_uniform(ShaderUniformDeclaration::new(UniformType::Int32, "c", 1));

    assert_eq!((a, b, c), (0, 4, 20));
    assert_eq!(block.size(), 24);
    assert_eq!(block.packing(), UniformPacking::Tight);
}

#[test]
fn test_std140_packing_aligns_vectors() {
    let mut block = ShaderUniformBufferDeclaration::new("Params", 0, ShaderStageFlags::FRAGMENT)
        .with_packing(UniformPacking::Std140);
    let a = block.push_uniform(ShaderUniformDeclaration::new(UniformType::Float, "a", 1));
    let b = block.push_uniform(ShaderUniformDeclaration::new(UniformType::Vec4, "b", 1));
    let c = block.push_uniform(ShaderUniformDeclaration::new(UniformType::Int32, "c", 1));

    assert_eq!((a, b, c), (0, 16, 32));
    assert_eq!(block.size(), 36);
}

#[test]
fn test_std140_float_fills_vec3_tail() {
    let mut block = ShaderUniformBufferDeclaration::new("Light", 1, ShaderStageFlags::FRAGMENT)
        .with_packing(UniformPacking::Std140);
    block.push_uniform(ShaderUniformDeclaration::new(UniformType::Vec3, "position", 1));
    let radius = block.push_uniform(ShaderUniformDeclaration::new(UniformType::Float, "radius", 1));
    let model = block.push_uniform(ShaderUniformDeclaration::new(UniformType::Mat3, "normal", 1));

    assert_eq!(radius, 12);
    assert_eq!(model, 16);
    assert_eq!(block.size(), 64);
}

#[test]
fn test_std140_array_stride_is_rounded() {
    let mut block = ShaderUniformBufferDeclaration::new("Weights", 0, ShaderStageFlags::VERTEX)
        .with_packing(UniformPacking::Std140);
    block.push_uniform(ShaderUniformDeclaration::new(UniformType::Float, "w", 4));
    assert_eq!(block.size(), 64);
    assert_eq!(block.resolve("w").unwrap().stride, 16);
}

#[test]
fn test_push_uniform_at_uses_reflected_offset() {
    let mut block = ShaderUniformBufferDeclaration::new("Camera", 0, ShaderStageFlags::VERTEX);
    block.push_uniform_at(ShaderUniformDeclaration::new(UniformType::Mat4, "view", 1), 0);
    block.push_uniform_at(ShaderUniformDeclaration::new(UniformType::Vec3, "eye", 1), 64);
    block.set_size(80);
    assert_eq!(block.find_uniform("eye").unwrap().offset(), 64);
    assert_eq!(block.size(), 80);
}

// ============================================================================
// STRUCTS / LOOKUP
// ============================================================================

#[test]
fn test_struct_field_offset_adds_owner_offset() {
    let mut block = ShaderUniformBufferDeclaration::new("Scene", 2, ShaderStageFlags::FRAGMENT);
    block.push_uniform(ShaderUniformDeclaration::new(UniformType::Mat4, "u_ViewProjection", 1));
    block.push_uniform(ShaderUniformDeclaration::new_struct(light_struct(UniformPacking::Tight), "u_Light", 1));

    let light = block.find_uniform("u_Light").unwrap();
    assert_eq!(light.offset(), 64);
    assert_eq!(light.size(), 32);
    assert_eq!(light.field_offset("Radius"), Some(64 + 12));

    let resolved = block.resolve("u_Light.Color").unwrap();
    assert_eq!(resolved.offset, 64 + 16);
    assert_eq!(resolved.uniform_type, UniformType::Vec4);
    assert_eq!(block.size(), 96);
}

#[test]
fn test_std140_struct_layout() {
    let light = light_struct(UniformPacking::Std140);
    let offsets: Vec<u32> = light.fields().iter().map(|f| f.offset()).collect();
    assert_eq!(offsets, vec![0, 12, 16]);
    assert_eq!(light.size(), 32);
}

#[test]
fn test_find_uniform_misses() {
    let mut block = ShaderUniformBufferDeclaration::new("Scene", 0, ShaderStageFlags::VERTEX);
    block.push_uniform(ShaderUniformDeclaration::new(UniformType::Float, "time", 1));
    assert!(block.find_uniform("Time").is_none());
    assert!(block.resolve("time.x").is_none());
    assert!(block.resolve("missing").is_none());
}

#[test]
fn test_reflection_prefers_blocks_then_loose() {
    let mut block = ShaderUniformBufferDeclaration::new("Camera", 0, ShaderStageFlags::VERTEX);
    block.push_uniform(ShaderUniformDeclaration::new(UniformType::Mat4, "u_ViewProjection", 1));

    let reflection = ShaderReflection {
        uniform_buffers: vec![block],
        uniforms: vec![ShaderUniformDeclaration::new(UniformType::Mat4, "u_Transform", 1)],
        resources: Vec::new(),
    };

    assert!(matches!(
        reflection.find_uniform("u_ViewProjection"),
        Some(UniformLocation::Block { block: 0, .. })
    ));
    assert!(matches!(
        reflection.find_uniform("u_Transform"),
        Some(UniformLocation::Loose { index: 0, .. })
    ));
    assert!(!reflection.has_uniform("u_Color"));
}

// ============================================================================
// BLOCK STORAGE
// ============================================================================

#[test]
fn test_storage_writes_at_resolved_offset() {
    let mut block = ShaderUniformBufferDeclaration::new("Params", 0, ShaderStageFlags::FRAGMENT);
    block.push_uniform(ShaderUniformDeclaration::new(UniformType::Float, "a", 1));
    block.push_uniform(ShaderUniformDeclaration::new(UniformType::Vec4, "b", 1));

    let mut storage = UniformBlockStorage::new(block);
    assert!(storage.take_dirty());
    assert!(!storage.is_dirty());

    storage.set("b", &UniformValue::Vec4(Vec4::new(1.0, 2.0, 3.0, 4.0))).unwrap();
    assert!(storage.is_dirty());

    assert_eq!(floats(&storage.data()[4..20]), vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_storage_rejects_type_mismatch_and_unknown_name() {
    let mut block = ShaderUniformBufferDeclaration::new("Params", 0, ShaderStageFlags::FRAGMENT);
    block.push_uniform(ShaderUniformDeclaration::new(UniformType::Vec3, "tint", 1));
    let mut storage = UniformBlockStorage::new(block);

    assert!(matches!(
        storage.set("tint", &UniformValue::Float(1.0)),
        Err(Error::InvalidResource(_))
    ));
    assert!(storage.set("missing", &UniformValue::Vec3(Vec3::ONE)).is_err());
}

#[test]
fn test_storage_std140_mat3_columns_are_padded() {
    let mut block = ShaderUniformBufferDeclaration::new("Normals", 0, ShaderStageFlags::VERTEX)
        .with_packing(UniformPacking::Std140);
    block.push_uniform(ShaderUniformDeclaration::new(UniformType::Mat3, "normal", 1));
    let mut storage = UniformBlockStorage::new(block);

    storage.set("normal", &UniformValue::Mat3(Mat3::IDENTITY)).unwrap();
    let floats = floats(storage.data());
    assert_eq!(floats.len(), 12);
    assert_eq!(&floats[0..3], &[1.0, 0.0, 0.0]);
    assert_eq!(&floats[4..7], &[0.0, 1.0, 0.0]);
    assert_eq!(&floats[8..11], &[0.0, 0.0, 1.0]);
}

#[test]
fn test_storage_array_elements() {
    let mut block = ShaderUniformBufferDeclaration::new("Bones", 0, ShaderStageFlags::VERTEX);
    block.push_uniform(ShaderUniformDeclaration::new(UniformType::Mat4, "bones", 2));
    let mut storage = UniformBlockStorage::new(block);

    storage.set_element("bones", 1, &UniformValue::Mat4(Mat4::IDENTITY)).unwrap();
    let floats = floats(storage.data());
    assert_eq!(floats[16], 1.0);
    assert_eq!(floats[0], 0.0);
    assert!(storage.set_element("bones", 2, &UniformValue::Mat4(Mat4::IDENTITY)).is_err());
}

#[test]
fn test_value_bytes_are_tight() {
    assert_eq!(UniformValue::Int(7).bytes(), &7i32.to_ne_bytes());
    assert_eq!(UniformValue::Vec3(Vec3::ONE).bytes().len(), 12);
    assert_eq!(UniformValue::Mat3(Mat3::IDENTITY).bytes().len(), 36);
    assert_eq!(UniformValue::Mat4(Mat4::IDENTITY).uniform_type(), UniformType::Mat4);
}
