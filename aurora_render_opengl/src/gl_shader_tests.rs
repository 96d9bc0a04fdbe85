//! Unit tests for GL shader uniform helpers (no context required)

use super::*;
use aurora_render::aurora::render::ShaderResourceType;
use aurora_render::glam::Vec3;

fn sampler(name: &str, register: u32, count: u32) -> ShaderResourceDeclaration {
    ShaderResourceDeclaration {
        name: name.to_string(),
        resource_type: ShaderResourceType::Texture2D,
        register,
        count,
    }
}

#[test]
fn test_single_sampler_uses_its_register() {
    assert_eq!(sampler_units(&sampler("u_Texture", 2, 1)), vec![("u_Texture".to_string(), 2)]);
}

#[test]
fn test_sampler_array_spreads_over_units() {
    let units = sampler_units(&sampler("u_Textures", 1, 3));
    assert_eq!(units, vec![
        ("u_Textures[0]".to_string(), 1),
        ("u_Textures[1]".to_string(), 2),
        ("u_Textures[2]".to_string(), 3),
    ]);
}

#[test]
fn test_value_type_must_match_declaration() {
    assert!(check_value_type("u_Color", UniformType::Vec3, &UniformValue::Vec3(Vec3::ONE)).is_ok());
    let result = check_value_type("u_Color", UniformType::Vec4, &UniformValue::Vec3(Vec3::ONE));
    assert!(matches!(result, Err(Error::InvalidResource(_))));
}

#[test]
fn test_texture_unit_accepts_non_negative_int() {
    assert_eq!(texture_unit("u_Texture", &UniformValue::Int(3)).unwrap(), 3);
    assert_eq!(texture_unit("u_Texture", &UniformValue::Int(0)).unwrap(), 0);
}

#[test]
fn test_texture_unit_rejects_negative_and_non_int() {
    assert!(texture_unit("u_Texture", &UniformValue::Int(-1)).is_err());
    assert!(matches!(
        texture_unit("u_Texture", &UniformValue::Float(1.0)),
        Err(Error::InvalidResource(_))
    ));
}
