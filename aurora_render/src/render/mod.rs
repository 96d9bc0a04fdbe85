/// Render module - backend-agnostic resources, reflection and the command facade

pub mod buffer_layout;
pub mod buffer;
pub mod context;
pub mod texture;
pub mod vertex_array;
pub mod framebuffer;
pub mod shader_uniform;
pub mod glsl_reflect;
pub mod shader;
pub mod render_api;
pub mod config;
pub mod render_command;
pub mod renderer;

#[cfg(test)]
pub mod mock_backend;

pub use buffer_layout::*;
pub use buffer::*;
pub use context::*;
pub use texture::*;
pub use vertex_array::*;
pub use framebuffer::*;
pub use shader_uniform::*;
pub use glsl_reflect::{reflect_glsl, reflect_glsl_program, GlslReflector};
pub use shader::*;
pub use render_api::*;
pub use config::*;
pub use render_command::*;
pub use renderer::*;
