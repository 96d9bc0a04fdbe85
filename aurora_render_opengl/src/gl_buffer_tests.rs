//! Unit tests for GL buffer size conversion (no context required)

use super::*;
use aurora_render::aurora::Error;

#[test]
fn test_byte_size_within_gl_range() {
    assert_eq!(gl_byte_size(0, "vertex buffer").unwrap(), 0);
    assert_eq!(gl_byte_size(4096, "vertex buffer").unwrap(), 4096);
    assert_eq!(gl_byte_size(i32::MAX as u64, "vertex buffer").unwrap(), i32::MAX);
}

#[test]
fn test_byte_size_past_two_gib_is_rejected() {
    let result = gl_byte_size(i32::MAX as u64 + 1, "vertex buffer");
    assert!(matches!(result, Err(Error::InvalidResource(_))));
    // 4 GiB would wrap to 0 if truncated
    assert!(gl_byte_size(1 << 32, "write offset").is_err());
}
