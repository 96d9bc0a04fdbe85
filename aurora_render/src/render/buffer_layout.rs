/// Backend-agnostic vertex buffer layout description.
///
/// A BufferLayout is an ordered list of named, typed fields. Order is
/// significant: it defines the on-GPU field order inside one vertex.
///
/// Offsets are a left-to-right prefix sum of the element sizes and the
/// stride is the total. They are computed by `calculate_offsets_and_stride`,
/// which runs once on construction. Appending or editing elements afterwards
/// does NOT recompute them: call `calculate_offsets_and_stride` again, or the
/// layout is stale (`has_stale_offsets`) and will be refused when attached
/// to a vertex array.

use crate::error::{Error, Result};
use crate::engine_bail_warn;

// ===== SHADER DATA TYPE =====

/// Declared type of one vertex attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderDataType {
    Float,
    Float2,
    Float3,
    Float4,
    Mat3,
    Mat4,
    Int,
    Int2,
    Int3,
    Int4,
    Bool,
}

impl ShaderDataType {
    /// Size in bytes (4 bytes per float/int component, 1 byte for bool)
    pub fn size(&self) -> u32 {
        match self {
            ShaderDataType::Float  => 4,
            ShaderDataType::Float2 => 4 * 2,
            ShaderDataType::Float3 => 4 * 3,
            ShaderDataType::Float4 => 4 * 4,
            ShaderDataType::Mat3   => 4 * 3 * 3,
            ShaderDataType::Mat4   => 4 * 4 * 4,
            ShaderDataType::Int    => 4,
            ShaderDataType::Int2   => 4 * 2,
            ShaderDataType::Int3   => 4 * 3,
            ShaderDataType::Int4   => 4 * 4,
            ShaderDataType::Bool   => 1,
        }
    }

    /// Number of scalar components
    pub fn component_count(&self) -> u32 {
        match self {
            ShaderDataType::Float  => 1,
            ShaderDataType::Float2 => 2,
            ShaderDataType::Float3 => 3,
            ShaderDataType::Float4 => 4,
            ShaderDataType::Mat3   => 3 * 3,
            ShaderDataType::Mat4   => 4 * 4,
            ShaderDataType::Int    => 1,
            ShaderDataType::Int2   => 2,
            ShaderDataType::Int3   => 3,
            ShaderDataType::Int4   => 4,
            ShaderDataType::Bool   => 1,
        }
    }

    /// Number of consecutive attribute locations this type occupies
    ///
    /// Matrices are fed to the vertex stage one column per location.
    pub fn location_count(&self) -> u32 {
        match self {
            ShaderDataType::Mat3 => 3,
            ShaderDataType::Mat4 => 4,
            _ => 1,
        }
    }

    /// Components fed per location (column height for matrices)
    pub fn components_per_location(&self) -> u32 {
        self.component_count() / self.location_count()
    }

    /// Whether the attribute reaches the shader as an integer
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ShaderDataType::Int
                | ShaderDataType::Int2
                | ShaderDataType::Int3
                | ShaderDataType::Int4
                | ShaderDataType::Bool
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ShaderDataType::Float  => "Float",
            ShaderDataType::Float2 => "Float2",
            ShaderDataType::Float3 => "Float3",
            ShaderDataType::Float4 => "Float4",
            ShaderDataType::Mat3   => "Mat3",
            ShaderDataType::Mat4   => "Mat4",
            ShaderDataType::Int    => "Int",
            ShaderDataType::Int2   => "Int2",
            ShaderDataType::Int3   => "Int3",
            ShaderDataType::Int4   => "Int4",
            ShaderDataType::Bool   => "Bool",
        }
    }

    /// Parse a declared type name
    ///
    /// Unknown names fail with `Error::InvalidShaderDataType` instead of
    /// producing a zero-sized element.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "Float"  => Ok(ShaderDataType::Float),
            "Float2" => Ok(ShaderDataType::Float2),
            "Float3" => Ok(ShaderDataType::Float3),
            "Float4" => Ok(ShaderDataType::Float4),
            "Mat3"   => Ok(ShaderDataType::Mat3),
            "Mat4"   => Ok(ShaderDataType::Mat4),
            "Int"    => Ok(ShaderDataType::Int),
            "Int2"   => Ok(ShaderDataType::Int2),
            "Int3"   => Ok(ShaderDataType::Int3),
            "Int4"   => Ok(ShaderDataType::Int4),
            "Bool"   => Ok(ShaderDataType::Bool),
            other => Err(Error::InvalidShaderDataType(other.to_string())),
        }
    }
}

// ===== BUFFER ELEMENT =====

/// One named field of a vertex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferElement {
    pub name: String,
    pub data_type: ShaderDataType,
    pub size: u32,
    pub offset: u32,
    pub normalized: bool,
}

impl BufferElement {
    pub fn new(data_type: ShaderDataType, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type,
            size: data_type.size(),
            offset: 0,
            normalized: false,
        }
    }

    /// Builder-style normalize flag (integer data read as [0,1] floats)
    pub fn normalized(mut self, normalized: bool) -> Self {
        self.normalized = normalized;
        self
    }
}

// ===== BUFFER LAYOUT =====

/// Ordered vertex layout with derived offsets and stride
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferLayout {
    elements: Vec<BufferElement>,
    stride: u32,
}

impl BufferLayout {
    /// Build a layout and compute offsets/stride once
    pub fn new(elements: Vec<BufferElement>) -> Self {
        let mut layout = Self { elements, stride: 0 };
        layout.calculate_offsets_and_stride();
        layout
    }

    /// Build a layout from (type name, semantic name) pairs
    ///
    /// ```
    /// use aurora_render::aurora::render::BufferLayout;
    ///
    /// let layout = BufferLayout::from_names(&[("Float3", "a_Position"), ("Float2", "a_UV")])?;
    /// assert_eq!(layout.stride(), 20);
    /// # Ok::<(), aurora_render::aurora::Error>(())
    /// ```
    pub fn from_names(pairs: &[(&str, &str)]) -> Result<Self> {
        let elements = pairs
            .iter()
            .map(|(ty, name)| Ok(BufferElement::new(ShaderDataType::from_name(ty)?, *name)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(elements))
    }

    /// Append an element. Offsets are not recomputed.
    pub fn add_element(&mut self, name: impl Into<String>, data_type: ShaderDataType) -> &mut Self {
        self.elements.push(BufferElement::new(data_type, name));
        self
    }

    /// Append an element from a type name. Offsets are not recomputed.
    pub fn add_element_named(&mut self, name: impl Into<String>, type_name: &str) -> Result<&mut Self> {
        let data_type = ShaderDataType::from_name(type_name)?;
        Ok(self.add_element(name, data_type))
    }

    /// Prefix-sum offsets and total stride
    pub fn calculate_offsets_and_stride(&mut self) {
        let mut offset = 0;
        for element in &mut self.elements {
            element.size = element.data_type.size();
            element.offset = offset;
            offset += element.size;
        }
        self.stride = offset;
    }

    /// True when stored offsets or stride no longer match the element list
    pub fn has_stale_offsets(&self) -> bool {
        let mut offset = 0;
        for element in &self.elements {
            if element.size != element.data_type.size() || element.offset != offset {
                return true;
            }
            offset += element.size;
        }
        offset != self.stride
    }

    /// Refuse layouts that cannot describe GPU data
    pub fn validate(&self) -> Result<()> {
        if self.elements.is_empty() {
            engine_bail_warn!("aurora::BufferLayout", "Buffer layout has no elements");
        }
        if self.has_stale_offsets() {
            engine_bail_warn!("aurora::BufferLayout",
                "Buffer layout offsets are stale, call calculate_offsets_and_stride() after editing elements");
        }
        Ok(())
    }

    pub fn elements(&self) -> &[BufferElement] {
        &self.elements
    }

    /// Direct access to the element list
    ///
    /// Edits through this reference leave the layout stale until
    /// `calculate_offsets_and_stride` runs again.
    pub fn elements_mut(&mut self) -> &mut Vec<BufferElement> {
        &mut self.elements
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BufferElement> {
        self.elements.iter()
    }

    /// Total attribute locations consumed by this layout
    pub fn location_count(&self) -> u32 {
        self.elements.iter().map(|e| e.data_type.location_count()).sum()
    }
}

impl<'a> IntoIterator for &'a BufferLayout {
    type Item = &'a BufferElement;
    type IntoIter = std::slice::Iter<'a, BufferElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

#[cfg(test)]
#[path = "buffer_layout_tests.rs"]
mod tests;
