//! Error types for the Aurora render layer
//!
//! This module defines the error types used throughout the render layer,
//! including backend construction, resource creation, shader reflection
//! and function loading.

use std::fmt;

/// Result type for Aurora render operations
pub type Result<T> = std::result::Result<T, Error>;

/// Aurora render errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Backend-specific error (OpenGL, Vulkan, D3D12)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (texture, buffer, shader, etc.)
    InvalidResource(String),

    /// Initialization failed (context, device, subsystems)
    InitializationFailed(String),

    /// A buffer element was declared with a type the layout does not know
    InvalidShaderDataType(String),

    /// A shader uniform was declared with a type name outside the vocabulary
    UnknownShaderType(String),

    /// GPU memory allocation failed for a reason other than exhaustion
    AllocationError(String),

    /// A function table was queried before its governing handle was loaded
    NotLoaded(&'static str),

    /// A resource created before the last render API switch was used
    StaleResource(String),

    /// No backend is active, or the requested backend has no plugin
    BackendUnavailable(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvalidShaderDataType(name) => write!(f, "Invalid shader data type: '{}'", name),
            Error::UnknownShaderType(name) => write!(f, "Unknown shader uniform type: '{}'", name),
            Error::AllocationError(msg) => write!(f, "Allocation error: {}", msg),
            Error::NotLoaded(level) => write!(f, "Function table not loaded: {} level", level),
            Error::StaleResource(msg) => write!(f, "Stale resource: {}", msg),
            Error::BackendUnavailable(msg) => write!(f, "Backend unavailable: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
