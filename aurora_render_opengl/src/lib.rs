/*!
# Aurora Render - OpenGL Backend

OpenGL 3.3 core implementation of the Aurora render API, on top of glow.

The application owns the GL context: it creates it with its windowing
library, makes it current on the render thread and wraps it in a
`GlDevice`. The device is then registered as the OpenGL backend plugin and
selected at runtime through `RenderCommand`, like any other backend.
*/

mod gl_backend;
mod gl_buffer;
mod gl_conversion;
mod gl_device;
mod gl_framebuffer;
mod gl_shader;
mod gl_texture;
mod gl_vertex_array;

use std::sync::Arc;
use aurora_render::aurora::render::{BackendRegistry, Config, RenderApi, RenderBackend, SharedContext};
use aurora_render::aurora::Result;

// Main aurora namespace module
pub mod aurora {
    pub mod opengl {
        pub use crate::gl_backend::GlBackend;
        pub use crate::gl_buffer::{GlIndexBuffer, GlUniformBuffer, GlVertexBuffer};
        pub use crate::gl_device::{GlDevice, MessageLevel, MIN_GL_VERSION};
        pub use crate::gl_framebuffer::GlFramebufferTarget;
        pub use crate::gl_shader::GlShader;
        pub use crate::gl_texture::GlTexture;
        pub use crate::gl_vertex_array::GlVertexArrayTarget;
    }
}

/// Register the OpenGL backend for an application-owned context
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use aurora_render::aurora::render::{BackendRegistry, Config, RenderApi, RenderCommand};
/// use aurora_render_opengl::aurora::opengl::GlDevice;
/// # fn run(gl: glow::Context) -> aurora_render::aurora::Result<()> {
/// let config = Config::default();
/// let device = Arc::new(GlDevice::new(gl, &config)?);
///
/// let mut registry = BackendRegistry::new();
/// aurora_render_opengl::register(&mut registry, device);
///
/// let mut render_command = RenderCommand::new(config, registry, 1280, 720);
/// render_command.initialize(RenderApi::OpenGl)?;
/// # Ok(())
/// # }
/// ```
pub fn register(registry: &mut BackendRegistry, device: Arc<gl_device::GlDevice>) {
    registry.register(RenderApi::OpenGl, move |config: &Config, context: SharedContext| -> Result<Box<dyn RenderBackend>> {
        let backend = gl_backend::GlBackend::new(device.clone(), config, context)?;
        Ok(Box::new(backend))
    });
}
