/// Render configuration and validation-layer settings

use crate::render::framebuffer::MAX_FRAMEBUFFER_SIZE;
use crate::render::render_api::RenderApi;
use crate::render::shader_uniform::UniformPacking;

/// Which validation messages reach the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DebugSeverity {
    ErrorsOnly,
    #[default]
    ErrorsAndWarnings,
    All,
}

/// Where validation messages are written in addition to the engine logger
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DebugOutput {
    /// Engine logger only
    #[default]
    Console,
    /// Append to a file
    File(String),
    /// Engine logger and file
    Both(String),
}

/// Validation message categories to show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self { show_general: true, show_validation: true, show_performance: true }
    }
}

/// Validation message counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

/// Render configuration, shared by every backend
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    /// Packed like `vk::make_api_version(0, major, minor, patch)`
    pub app_version: u32,

    /// Request validation layers (Vulkan, needs the `vulkan-validation` feature)
    pub enable_validation: bool,
    pub debug_severity: DebugSeverity,
    pub debug_output: DebugOutput,
    pub debug_message_filter: DebugMessageFilter,
    /// Abort the process on a validation error (for debugger attachment)
    pub break_on_validation_error: bool,
    /// Panic on a validation error
    ///
    /// The panic is raised inside the driver's debug callback, which cannot
    /// unwind back through the C frames: the process aborts instead, so the
    /// panic cannot be caught with `catch_unwind`. Off by default.
    pub panic_on_validation_error: bool,
    pub enable_validation_stats: bool,

    /// Backend built by `RenderCommand::initialize` when none is given
    pub initial_api: RenderApi,
    /// Packing of uniform blocks without an explicit std140 qualifier
    pub uniform_packing: UniformPacking,
    pub vsync: bool,
    /// Frames recorded ahead of the GPU (the Vulkan backend uses 1)
    pub max_frames_in_flight: u32,
    /// Largest framebuffer edge accepted by create and resize
    pub max_framebuffer_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Aurora Application".to_string(),
            app_version: 1 << 22,
            enable_validation: cfg!(debug_assertions),
            debug_severity: DebugSeverity::default(),
            debug_output: DebugOutput::default(),
            debug_message_filter: DebugMessageFilter::default(),
            break_on_validation_error: false,
            panic_on_validation_error: false,
            enable_validation_stats: true,
            initial_api: RenderApi::default(),
            uniform_packing: UniformPacking::default(),
            vsync: true,
            max_frames_in_flight: 1,
            max_framebuffer_size: MAX_FRAMEBUFFER_SIZE,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
