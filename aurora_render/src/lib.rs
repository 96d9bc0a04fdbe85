/*!
# Aurora Render

Backend-agnostic render API abstraction for the Aurora engine.

This crate defines the resource vocabulary (buffers, vertex arrays,
framebuffers, textures, shaders), shader uniform reflection and the
`RenderCommand` facade. Backends (OpenGL, Vulkan) live in their own crates
and register a factory in a `BackendRegistry`; the facade can switch between
them at runtime.

## Architecture

- **RenderCommand**: Stable entry point, forwards to the active backend and
  owns the backend switch protocol
- **RenderBackend**: Trait each backend plugin implements
- **RenderContext**: Per-facade bind caches, viewport and resource registry
- **VertexArray / Framebuffer**: Backend-agnostic wrappers with bind
  bookkeeping, over backend targets
- **ShaderReflection**: Uniform blocks, loose uniforms and resources per
  shader

## Example

```
use aurora_render::aurora::render::{BufferElement, BufferLayout, ShaderDataType};

let layout = BufferLayout::new(vec![
    BufferElement::new(ShaderDataType::Float3, "a_Position"),
    BufferElement::new(ShaderDataType::Float4, "a_Color"),
]);
assert_eq!(layout.stride(), 28);
```
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod render;

// Main aurora namespace module
pub mod aurora {
    // Error types
    pub use crate::error::{Error, Result};

    // Engine singleton
    pub use crate::engine::Engine;

    // Logging sub-module (types only, macros are exported at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger, FilteredLogger};
    }

    // Render sub-module with all rendering types
    pub mod render {
        pub use crate::render::*;
    }
}

// Re-export math library at crate root
pub use glam;
