use crate::error::Error;
use crate::render::buffer_layout::{BufferElement, BufferLayout, ShaderDataType};

fn scenario_layout() -> BufferLayout {
    BufferLayout::new(vec![
        BufferElement::new(ShaderDataType::Float3, "a_Position"),
        BufferElement::new(ShaderDataType::Float4, "a_Color"),
        BufferElement::new(ShaderDataType::Float2, "a_UV"),
    ])
}

// ============================================================================
// DATA TYPE
// ============================================================================

#[test]
fn test_data_type_sizes() {
    assert_eq!(ShaderDataType::Float.size(), 4);
    assert_eq!(ShaderDataType::Float3.size(), 12);
    assert_eq!(ShaderDataType::Mat3.size(), 36);
    assert_eq!(ShaderDataType::Mat4.size(), 64);
    assert_eq!(ShaderDataType::Int4.size(), 16);
    assert_eq!(ShaderDataType::Bool.size(), 1);
}

#[test]
fn test_matrix_location_spread() {
    assert_eq!(ShaderDataType::Mat4.location_count(), 4);
    assert_eq!(ShaderDataType::Mat4.components_per_location(), 4);
    assert_eq!(ShaderDataType::Mat3.location_count(), 3);
    assert_eq!(ShaderDataType::Mat3.components_per_location(), 3);
    assert_eq!(ShaderDataType::Float2.location_count(), 1);
}

#[test]
fn test_data_type_names_parse_back() {
    for ty in [
        ShaderDataType::Float, ShaderDataType::Float2, ShaderDataType::Float3,
        ShaderDataType::Float4, ShaderDataType::Mat3, ShaderDataType::Mat4,
        ShaderDataType::Int, ShaderDataType::Int2, ShaderDataType::Int3,
        ShaderDataType::Int4, ShaderDataType::Bool,
    ] {
        assert_eq!(ShaderDataType::from_name(ty.name()), Ok(ty));
    }
}

#[test]
fn test_unknown_type_name_is_an_error() {
    assert_eq!(
        ShaderDataType::from_name("Float5"),
        Err(Error::InvalidShaderDataType("Float5".to_string()))
    );
}

// ============================================================================
// OFFSETS AND STRIDE
// ============================================================================

#[test]
fn test_offsets_are_prefix_sums() {
    let layout = scenario_layout();
    let offsets: Vec<u32> = layout.iter().map(|e| e.offset).collect();
    assert_eq!(offsets, vec![0, 12, 28]);
    assert_eq!(layout.stride(), 36);
    assert!(!layout.has_stale_offsets());
}

#[test]
fn test_offset_law_over_every_type() {
    let types = [
        ShaderDataType::Bool, ShaderDataType::Mat4, ShaderDataType::Int3,
        ShaderDataType::Float, ShaderDataType::Mat3, ShaderDataType::Int2,
    ];
    let layout = BufferLayout::new(
        types.iter().enumerate().map(|(i, ty)| BufferElement::new(*ty, format!("e{}", i))).collect(),
    );

    let mut expected = 0;
    for element in layout.elements() {
        assert_eq!(element.offset, expected);
        expected += element.data_type.size();
    }
    assert_eq!(layout.stride(), expected);
}

#[test]
fn test_from_names_builds_same_layout() {
    let layout = BufferLayout::from_names(&[
        ("Float3", "a_Position"),
        ("Float4", "a_Color"),
        ("Float2", "a_UV"),
    ])
    .unwrap();
    assert_eq!(layout, scenario_layout());
}

#[test]
fn test_from_names_rejects_unknown_type() {
    let result = BufferLayout::from_names(&[("Float3", "a_Position"), ("Double", "a_Weight")]);
    assert_eq!(result, Err(Error::InvalidShaderDataType("Double".to_string())));
}

// ============================================================================
// STALE OFFSET HAZARD
// ============================================================================

#[test]
fn test_add_element_leaves_layout_stale_until_recalculated() {
    let mut layout = scenario_layout();
    layout.add_element("a_TexIndex", ShaderDataType::Float);

    assert!(layout.has_stale_offsets());
    assert_eq!(layout.stride(), 36);
    assert!(matches!(layout.validate(), Err(Error::InvalidResource(_))));

    layout.calculate_offsets_and_stride();
    assert!(!layout.has_stale_offsets());
    assert_eq!(layout.elements()[3].offset, 36);
    assert_eq!(layout.stride(), 40);
    assert!(layout.validate().is_ok());
}

#[test]
fn test_reordering_elements_is_detected() {
    let mut layout = scenario_layout();
    layout.elements_mut().swap(0, 2);
    assert!(layout.has_stale_offsets());

    layout.calculate_offsets_and_stride();
    let offsets: Vec<u32> = layout.iter().map(|e| e.offset).collect();
    assert_eq!(offsets, vec![0, 8, 24]);
}

#[test]
fn test_add_element_named_validates_type() {
    let mut layout = BufferLayout::default();
    layout.add_element_named("a_Position", "Float3").unwrap();
    assert!(layout.add_element_named("a_Bad", "vec3").is_err());
    assert_eq!(layout.len(), 1);
}

#[test]
fn test_empty_layout_is_invalid() {
    let layout = BufferLayout::default();
    assert!(layout.is_empty());
    assert!(!layout.has_stale_offsets());
    assert!(layout.validate().is_err());
}

#[test]
fn test_location_count_includes_matrix_columns() {
    let layout = BufferLayout::new(vec![
        BufferElement::new(ShaderDataType::Float3, "a_Position"),
        BufferElement::new(ShaderDataType::Mat4, "a_Model"),
    ]);
    assert_eq!(layout.location_count(), 5);
}

#[test]
fn test_normalized_builder() {
    let element = BufferElement::new(ShaderDataType::Int4, "a_Color").normalized(true);
    assert!(element.normalized);
    assert_eq!(element.size, 16);
}
