//! Unit tests for swapchain mode and extent selection

use super::*;

fn capabilities(current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
    vk::SurfaceCapabilitiesKHR {
        current_extent: vk::Extent2D { width: current.0, height: current.1 },
        min_image_extent: vk::Extent2D { width: 1, height: 1 },
        max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
        ..Default::default()
    }
}

#[test]
fn test_extent_follows_surface_when_defined() {
    let extent = choose_extent(&capabilities((800, 600)), 1024, 768);
    assert_eq!((extent.width, extent.height), (800, 600));
}

#[test]
fn test_extent_clamps_requested_size_when_undefined() {
    let extent = choose_extent(&capabilities((u32::MAX, u32::MAX)), 10_000, 300);
    assert_eq!((extent.width, extent.height), (4096, 300));
}

#[test]
fn test_vsync_always_fifo() {
    let available = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
    assert_eq!(choose_present_mode(&available, true), vk::PresentModeKHR::FIFO);
}

#[test]
fn test_no_vsync_prefers_mailbox_then_immediate() {
    let both = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
    assert_eq!(choose_present_mode(&both, false), vk::PresentModeKHR::MAILBOX);
    let immediate = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];
    assert_eq!(choose_present_mode(&immediate, false), vk::PresentModeKHR::IMMEDIATE);
    assert_eq!(choose_present_mode(&[vk::PresentModeKHR::FIFO], false), vk::PresentModeKHR::FIFO);
}
