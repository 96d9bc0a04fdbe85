/// GlDevice - the externally owned GL context
///
/// The application creates the GL context (and makes it current) with its
/// windowing library, then hands the function loader or a ready
/// `glow::Context` over. Every GL call of this crate goes through one
/// shared `GlDevice`.

use std::num::NonZeroU32;
use glow::HasContext;
use aurora_render::aurora::{Error, Result};
use aurora_render::aurora::render::{Config, DebugSeverity};
use aurora_render::{engine_debug, engine_error, engine_info, engine_trace, engine_warn};
use crate::gl_conversion::error_name;

const SOURCE: &str = "aurora::opengl::Device";

/// Oldest context version the backend drives (uniform blocks, VAOs, GLSL 330)
pub const MIN_GL_VERSION: (u32, u32) = (3, 3);

pub struct GlDevice {
    gl: glow::Context,
    version: (u32, u32),
    renderer: String,
}

// GL objects are only touched from the thread owning the current context;
// the Send + Sync bounds come from the backend traits.
unsafe impl Send for GlDevice {}
unsafe impl Sync for GlDevice {}

/// Log level of a GL debug message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Error,
    Warning,
    Info,
    Verbose,
}

impl MessageLevel {
    pub fn from_severity(severity: u32) -> Self {
        match severity {
            glow::DEBUG_SEVERITY_HIGH => MessageLevel::Error,
            glow::DEBUG_SEVERITY_MEDIUM => MessageLevel::Warning,
            glow::DEBUG_SEVERITY_LOW => MessageLevel::Info,
            _ => MessageLevel::Verbose,
        }
    }

    /// Whether `filter` lets this level through
    pub fn is_reported(&self, filter: DebugSeverity) -> bool {
        match filter {
            DebugSeverity::ErrorsOnly => *self == MessageLevel::Error,
            DebugSeverity::ErrorsAndWarnings => matches!(self, MessageLevel::Error | MessageLevel::Warning),
            DebugSeverity::All => true,
        }
    }
}

fn message_type_label(gltype: u32) -> &'static str {
    match gltype {
        glow::DEBUG_TYPE_ERROR => "Error",
        glow::DEBUG_TYPE_DEPRECATED_BEHAVIOR => "Deprecated",
        glow::DEBUG_TYPE_UNDEFINED_BEHAVIOR => "Undefined",
        glow::DEBUG_TYPE_PERFORMANCE => "Performance",
        glow::DEBUG_TYPE_PORTABILITY => "Portability",
        _ => "General",
    }
}

impl GlDevice {
    /// Wrap a context that is current on the calling thread
    pub fn new(mut gl: glow::Context, config: &Config) -> Result<Self> {
        let version = {
            let version = gl.version();
            (version.major, version.minor)
        };
        if version < MIN_GL_VERSION {
            return Err(Error::InitializationFailed(format!(
                "OpenGL {}.{} found, {}.{} required",
                version.0, version.1, MIN_GL_VERSION.0, MIN_GL_VERSION.1
            )));
        }

        let (renderer, vendor) = unsafe {
            (gl.get_parameter_string(glow::RENDERER), gl.get_parameter_string(glow::VENDOR))
        };
        engine_info!(SOURCE, "OpenGL {}.{} on {} ({})", version.0, version.1, renderer, vendor);

        if config.enable_validation {
            install_debug_callback(&mut gl, config);
        }

        Ok(Self { gl, version, renderer })
    }

    /// Build the context from the windowing library's proc address lookup
    ///
    /// # Safety
    ///
    /// A GL context must be current on the calling thread and `loader` must
    /// return valid function pointers for it.
    pub unsafe fn from_loader_function<F>(loader: F, config: &Config) -> Result<Self>
    where
        F: FnMut(&str) -> *const std::ffi::c_void,
    {
        let gl = glow::Context::from_loader_function(loader);
        Self::new(gl, config)
    }

    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    pub fn version(&self) -> (u32, u32) {
        self.version
    }

    pub fn renderer(&self) -> &str {
        &self.renderer
    }

    /// Drain the GL error queue after `operation`
    ///
    /// `GL_OUT_OF_MEMORY` maps to `Error::OutOfMemory`, anything else to
    /// `Error::BackendError`.
    pub fn check_error(&self, operation: &str) -> Result<()> {
        let mut first = None;
        loop {
            let code = unsafe { self.gl.get_error() };
            if code == glow::NO_ERROR {
                break;
            }
            engine_debug!(SOURCE, "{} raised {}", operation, error_name(code));
            first.get_or_insert(code);
        }
        match first {
            None => Ok(()),
            Some(glow::OUT_OF_MEMORY) => Err(Error::OutOfMemory),
            Some(code) => Err(Error::BackendError(format!("{} failed: {}", operation, error_name(code)))),
        }
    }

    /// Object name currently bound at binding point `pname`
    pub fn bound_object(&self, pname: u32) -> Option<NonZeroU32> {
        NonZeroU32::new(unsafe { self.gl.get_parameter_i32(pname) } as u32)
    }
}

fn install_debug_callback(gl: &mut glow::Context, config: &Config) {
    if !gl.supports_debug() {
        engine_warn!(SOURCE, "KHR_debug not available, GL debug output disabled");
        return;
    }
    let filter = config.debug_severity;
    let panic_on_error = config.panic_on_validation_error;
    unsafe {
        gl.enable(glow::DEBUG_OUTPUT);
        gl.enable(glow::DEBUG_OUTPUT_SYNCHRONOUS);
        gl.debug_message_callback(move |_source, gltype, id, severity, message| {
            let level = MessageLevel::from_severity(severity);
            if !level.is_reported(filter) {
                return;
            }
            let label = message_type_label(gltype);
            match level {
                MessageLevel::Error => {
                    engine_error!(SOURCE, "[{}] #{} {}", label, id, message);
                    if panic_on_error {
                        panic!("GL debug error #{}: {}", id, message);
                    }
                }
                MessageLevel::Warning => engine_warn!(SOURCE, "[{}] #{} {}", label, id, message),
                MessageLevel::Info => engine_info!(SOURCE, "[{}] #{} {}", label, id, message),
                MessageLevel::Verbose => engine_trace!(SOURCE, "[{}] #{} {}", label, id, message),
            }
        });
    }
    engine_debug!(SOURCE, "GL debug output enabled ({:?})", filter);
}

#[cfg(test)]
#[path = "gl_device_tests.rs"]
mod tests;
