/*!
# Aurora Render - Vulkan Backend

Vulkan implementation of the Aurora render API.

This crate provides a backend that implements the `aurora_render` backend
traits using the Ash library for Vulkan bindings, gpu-allocator for memory
management, naga to compile GLSL and spirq to reflect SPIR-V. It also
carries the staged Vulkan function loader (loader, instance and device
entry points resolved in order).

The backend is registered as a plugin and selected at runtime through
`RenderCommand`.
*/

mod vulkan_backend;
mod vulkan_buffer;
mod vulkan_context;
mod vulkan_debug;
mod vulkan_entry_points;
mod vulkan_format;
mod vulkan_framebuffer;
mod vulkan_glsl;
mod vulkan_loader;
mod vulkan_recorder;
mod vulkan_render_pass;
mod vulkan_shader;
mod vulkan_spirv;
mod vulkan_swapchain;
mod vulkan_texture;
mod vulkan_vertex_array;

use std::sync::Arc;
use aurora_render::aurora::render::{BackendRegistry, Config, RenderApi, RenderBackend, SharedContext};
use aurora_render::aurora::Result;
use winit::window::Window;

// Main aurora namespace module
pub mod aurora {
    pub mod vulkan {
        pub use crate::vulkan_backend::VulkanBackend;
        pub use crate::vulkan_debug::{get_validation_stats, print_validation_stats_report};
        pub use crate::vulkan_entry_points::{EntryLevel, EntryPoint, Feature};
        pub use crate::vulkan_loader::{
            AshResolver, DeviceTable, FunctionTable, LoaderStage, SymbolResolver, VoidFunction, VulkanLoader,
        };
        pub use crate::vulkan_shader::{build_glsl_program, build_spirv_program, CompiledProgram};
    }
}

/// Register the Vulkan backend for `window`
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use aurora_render::aurora::render::{BackendRegistry, Config, RenderApi, RenderCommand};
/// # fn run(window: Arc<winit::window::Window>) -> aurora_render::aurora::Result<()> {
/// let mut registry = BackendRegistry::new();
/// aurora_render_vulkan::register(&mut registry, window.clone());
///
/// let size = window.inner_size();
/// let mut render_command = RenderCommand::new(Config::default(), registry, size.width, size.height);
/// render_command.initialize(RenderApi::Vulkan)?;
/// # Ok(())
/// # }
/// ```
pub fn register(registry: &mut BackendRegistry, window: Arc<Window>) {
    registry.register(RenderApi::Vulkan, move |config: &Config, context: SharedContext| -> Result<Box<dyn RenderBackend>> {
        let size = window.inner_size();
        let backend = vulkan_backend::VulkanBackend::new(&*window, size.width, size.height, config, context)?;
        Ok(Box::new(backend))
    });
}
