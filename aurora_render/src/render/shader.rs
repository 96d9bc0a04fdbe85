/// Shader program trait and creation descriptors

use std::any::Any;
use crate::error::Result;
use crate::render::context::ResourceKey;
use crate::render::shader_uniform::{ShaderReflection, UniformValue};

/// Program source for both stages
#[derive(Debug, Clone)]
pub enum ShaderSource {
    /// GLSL text (compiled by GL, or through naga for Vulkan)
    Glsl { vertex: String, fragment: String },
    /// Pre-compiled SPIR-V words (Vulkan only)
    SpirV { vertex: Vec<u32>, fragment: Vec<u32> },
}

impl ShaderSource {
    pub fn glsl(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        ShaderSource::Glsl { vertex: vertex.into(), fragment: fragment.into() }
    }

    pub fn is_glsl(&self) -> bool {
        matches!(self, ShaderSource::Glsl { .. })
    }
}

/// Shader creation parameters
#[derive(Debug, Clone)]
pub struct ShaderDesc {
    /// Debug name
    pub name: String,
    pub source: ShaderSource,
}

/// Linked shader program
pub trait Shader: Send + Sync {
    fn name(&self) -> &str;

    /// Uniform blocks, loose uniforms and resources of the program
    fn reflection(&self) -> &ShaderReflection;

    fn bind(&self) -> Result<()>;

    fn unbind(&self) -> Result<()>;

    /// Set a uniform by path (`"u_Color"`, `"u_Light.Position"`)
    ///
    /// The path is looked up in the reflection and the value type checked.
    fn set_uniform(&self, name: &str, value: &UniformValue) -> Result<()>;

    fn resource_key(&self) -> ResourceKey;

    fn as_any(&self) -> &dyn Any;
}
