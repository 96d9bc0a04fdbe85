//! Unit tests for error.rs
//!
//! Tests all Error variants and their implementations (Display, Debug, Clone, std::error::Error).

use crate::error::{Error, Result};

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_backend_error_display() {
    let err = Error::BackendError("glCheckFramebufferStatus returned 0x8CD6".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Backend error"));
    assert!(display.contains("0x8CD6"));
}

#[test]
fn test_out_of_memory_display() {
    assert_eq!(format!("{}", Error::OutOfMemory), "Out of GPU memory");
}

#[test]
fn test_invalid_shader_data_type_display() {
    let err = Error::InvalidShaderDataType("Float5".to_string());
    assert_eq!(format!("{}", err), "Invalid shader data type: 'Float5'");
}

#[test]
fn test_unknown_shader_type_display() {
    let err = Error::UnknownShaderType("dvec3".to_string());
    assert!(format!("{}", err).contains("dvec3"));
}

#[test]
fn test_not_loaded_display_names_level() {
    let err = Error::NotLoaded("instance");
    assert_eq!(format!("{}", err), "Function table not loaded: instance level");
}

#[test]
fn test_stale_and_unavailable_display() {
    let stale = Error::StaleResource("vertex buffer 'quad' from epoch 0".to_string());
    assert!(format!("{}", stale).starts_with("Stale resource"));

    let unavailable = Error::BackendUnavailable("D3D12".to_string());
    assert!(format!("{}", unavailable).contains("D3D12"));
}

// ============================================================================
// ERROR TRAIT IMPLEMENTATIONS
// ============================================================================

#[test]
fn test_error_is_std_error() {
    let err = Error::AllocationError("no host visible heap".to_string());
    let _: &dyn std::error::Error = &err;
}

#[test]
fn test_error_clone_and_eq() {
    let err = Error::InvalidResource("layout".to_string());
    assert_eq!(err.clone(), err);
    assert_ne!(Error::NotLoaded("device"), Error::NotLoaded("instance"));
}

#[test]
fn test_error_debug() {
    let debug = format!("{:?}", Error::InitializationFailed("init".to_string()));
    assert!(debug.contains("InitializationFailed"));
}

// ============================================================================
// ERROR PROPAGATION TESTS
// ============================================================================

#[test]
fn test_error_propagation_with_question_mark() {
    fn inner() -> Result<i32> {
        Err(Error::OutOfMemory)
    }

    fn outer() -> Result<i32> {
        inner()?;
        Ok(42)
    }

    assert_eq!(outer(), Err(Error::OutOfMemory));
}
