/// Static tables of the Vulkan entry points the loader resolves.
///
/// Each entry names the feature that provides it and the level it is
/// resolved at. The loader walks these slices in order, so adding a
/// function is one line here.

/// Handle a function is resolved against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryLevel {
    /// Global commands, resolved with a null instance
    Loader,
    Instance,
    Device,
}

/// Core version or extension providing an entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    Core10,
    Core11,
    Core12,
    Core13,
    Surface,
    Swapchain,
    DebugUtils,
    DynamicRendering,
    ExtendedDynamicState,
    Synchronization2,
}

impl Feature {
    pub const ALL: [Feature; 10] = [
        Feature::Core10,
        Feature::Core11,
        Feature::Core12,
        Feature::Core13,
        Feature::Surface,
        Feature::Swapchain,
        Feature::DebugUtils,
        Feature::DynamicRendering,
        Feature::ExtendedDynamicState,
        Feature::Synchronization2,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPoint {
    pub feature: Feature,
    pub name: &'static str,
    pub level: EntryLevel,
}

const fn loader(feature: Feature, name: &'static str) -> EntryPoint {
    EntryPoint { feature, name, level: EntryLevel::Loader }
}

const fn instance(feature: Feature, name: &'static str) -> EntryPoint {
    EntryPoint { feature, name, level: EntryLevel::Instance }
}

const fn device(feature: Feature, name: &'static str) -> EntryPoint {
    EntryPoint { feature, name, level: EntryLevel::Device }
}

// ===== LOADER LEVEL =====

pub static LOADER_ENTRY_POINTS: &[EntryPoint] = &[
    loader(Feature::Core10, "vkCreateInstance"),
    loader(Feature::Core10, "vkEnumerateInstanceExtensionProperties"),
    loader(Feature::Core10, "vkEnumerateInstanceLayerProperties"),
    loader(Feature::Core11, "vkEnumerateInstanceVersion"),
];

// ===== INSTANCE LEVEL =====

pub static INSTANCE_ENTRY_POINTS: &[EntryPoint] = &[
    instance(Feature::Core10, "vkDestroyInstance"),
    instance(Feature::Core10, "vkEnumeratePhysicalDevices"),
    instance(Feature::Core10, "vkGetPhysicalDeviceProperties"),
    instance(Feature::Core10, "vkGetPhysicalDeviceFeatures"),
    instance(Feature::Core10, "vkGetPhysicalDeviceFormatProperties"),
    instance(Feature::Core10, "vkGetPhysicalDeviceMemoryProperties"),
    instance(Feature::Core10, "vkGetPhysicalDeviceQueueFamilyProperties"),
    instance(Feature::Core10, "vkEnumerateDeviceExtensionProperties"),
    instance(Feature::Core10, "vkCreateDevice"),
    instance(Feature::Core10, "vkGetDeviceProcAddr"),
    instance(Feature::Core11, "vkGetPhysicalDeviceProperties2"),
    instance(Feature::Core11, "vkGetPhysicalDeviceFeatures2"),
    instance(Feature::Core11, "vkGetPhysicalDeviceMemoryProperties2"),
    instance(Feature::Surface, "vkDestroySurfaceKHR"),
    instance(Feature::Surface, "vkGetPhysicalDeviceSurfaceSupportKHR"),
    instance(Feature::Surface, "vkGetPhysicalDeviceSurfaceCapabilitiesKHR"),
    instance(Feature::Surface, "vkGetPhysicalDeviceSurfaceFormatsKHR"),
    instance(Feature::Surface, "vkGetPhysicalDeviceSurfacePresentModesKHR"),
    instance(Feature::DebugUtils, "vkCreateDebugUtilsMessengerEXT"),
    instance(Feature::DebugUtils, "vkDestroyDebugUtilsMessengerEXT"),
];

// ===== DEVICE LEVEL =====

pub static DEVICE_ENTRY_POINTS: &[EntryPoint] = &[
    device(Feature::Core10, "vkDestroyDevice"),
    device(Feature::Core10, "vkGetDeviceQueue"),
    device(Feature::Core10, "vkDeviceWaitIdle"),
    device(Feature::Core10, "vkQueueSubmit"),
    device(Feature::Core10, "vkQueueWaitIdle"),
    device(Feature::Core10, "vkAllocateMemory"),
    device(Feature::Core10, "vkFreeMemory"),
    device(Feature::Core10, "vkMapMemory"),
    device(Feature::Core10, "vkUnmapMemory"),
    device(Feature::Core10, "vkCreateBuffer"),
    device(Feature::Core10, "vkDestroyBuffer"),
    device(Feature::Core10, "vkBindBufferMemory"),
    device(Feature::Core10, "vkGetBufferMemoryRequirements"),
    device(Feature::Core10, "vkCreateImage"),
    device(Feature::Core10, "vkDestroyImage"),
    device(Feature::Core10, "vkBindImageMemory"),
    device(Feature::Core10, "vkGetImageMemoryRequirements"),
    device(Feature::Core10, "vkCreateImageView"),
    device(Feature::Core10, "vkDestroyImageView"),
    device(Feature::Core10, "vkCreateSampler"),
    device(Feature::Core10, "vkDestroySampler"),
    device(Feature::Core10, "vkCreateShaderModule"),
    device(Feature::Core10, "vkDestroyShaderModule"),
    device(Feature::Core10, "vkCreateGraphicsPipelines"),
    device(Feature::Core10, "vkDestroyPipeline"),
    device(Feature::Core10, "vkCreatePipelineLayout"),
    device(Feature::Core10, "vkDestroyPipelineLayout"),
    device(Feature::Core10, "vkCreateDescriptorSetLayout"),
    device(Feature::Core10, "vkDestroyDescriptorSetLayout"),
    device(Feature::Core10, "vkCreateDescriptorPool"),
    device(Feature::Core10, "vkDestroyDescriptorPool"),
    device(Feature::Core10, "vkResetDescriptorPool"),
    device(Feature::Core10, "vkAllocateDescriptorSets"),
    device(Feature::Core10, "vkUpdateDescriptorSets"),
    device(Feature::Core10, "vkCreateRenderPass"),
    device(Feature::Core10, "vkDestroyRenderPass"),
    device(Feature::Core10, "vkCreateFramebuffer"),
    device(Feature::Core10, "vkDestroyFramebuffer"),
    device(Feature::Core10, "vkCreateCommandPool"),
    device(Feature::Core10, "vkDestroyCommandPool"),
    device(Feature::Core10, "vkAllocateCommandBuffers"),
    device(Feature::Core10, "vkFreeCommandBuffers"),
    device(Feature::Core10, "vkBeginCommandBuffer"),
    device(Feature::Core10, "vkEndCommandBuffer"),
    device(Feature::Core10, "vkResetCommandBuffer"),
    device(Feature::Core10, "vkCreateFence"),
    device(Feature::Core10, "vkDestroyFence"),
    device(Feature::Core10, "vkWaitForFences"),
    device(Feature::Core10, "vkResetFences"),
    device(Feature::Core10, "vkCreateSemaphore"),
    device(Feature::Core10, "vkDestroySemaphore"),
    device(Feature::Core10, "vkCmdBeginRenderPass"),
    device(Feature::Core10, "vkCmdEndRenderPass"),
    device(Feature::Core10, "vkCmdBindPipeline"),
    device(Feature::Core10, "vkCmdBindVertexBuffers"),
    device(Feature::Core10, "vkCmdBindIndexBuffer"),
    device(Feature::Core10, "vkCmdBindDescriptorSets"),
    device(Feature::Core10, "vkCmdSetViewport"),
    device(Feature::Core10, "vkCmdSetScissor"),
    device(Feature::Core10, "vkCmdDrawIndexed"),
    device(Feature::Core10, "vkCmdDraw"),
    device(Feature::Core10, "vkCmdClearAttachments"),
    device(Feature::Core10, "vkCmdPipelineBarrier"),
    device(Feature::Core10, "vkCmdCopyBufferToImage"),
    device(Feature::Core11, "vkGetDeviceQueue2"),
    device(Feature::Core11, "vkBindBufferMemory2"),
    device(Feature::Core12, "vkGetBufferDeviceAddress"),
    device(Feature::Core12, "vkWaitSemaphores"),
    device(Feature::Core13, "vkCmdBeginRendering"),
    device(Feature::Core13, "vkCmdEndRendering"),
    device(Feature::Core13, "vkQueueSubmit2"),
    device(Feature::Swapchain, "vkCreateSwapchainKHR"),
    device(Feature::Swapchain, "vkDestroySwapchainKHR"),
    device(Feature::Swapchain, "vkGetSwapchainImagesKHR"),
    device(Feature::Swapchain, "vkAcquireNextImageKHR"),
    device(Feature::Swapchain, "vkQueuePresentKHR"),
    device(Feature::DebugUtils, "vkSetDebugUtilsObjectNameEXT"),
    device(Feature::DebugUtils, "vkCmdBeginDebugUtilsLabelEXT"),
    device(Feature::DebugUtils, "vkCmdEndDebugUtilsLabelEXT"),
    device(Feature::DynamicRendering, "vkCmdBeginRenderingKHR"),
    device(Feature::DynamicRendering, "vkCmdEndRenderingKHR"),
    device(Feature::ExtendedDynamicState, "vkCmdSetCullModeEXT"),
    device(Feature::ExtendedDynamicState, "vkCmdSetFrontFaceEXT"),
    device(Feature::ExtendedDynamicState, "vkCmdSetDepthTestEnableEXT"),
    device(Feature::ExtendedDynamicState, "vkCmdSetDepthWriteEnableEXT"),
    device(Feature::Synchronization2, "vkCmdPipelineBarrier2KHR"),
    device(Feature::Synchronization2, "vkQueueSubmit2KHR"),
];

/// Every entry point of `level`
pub fn entry_points(level: EntryLevel) -> &'static [EntryPoint] {
    match level {
        EntryLevel::Loader => LOADER_ENTRY_POINTS,
        EntryLevel::Instance => INSTANCE_ENTRY_POINTS,
        EntryLevel::Device => DEVICE_ENTRY_POINTS,
    }
}

/// Look up a name across all three tables
pub fn find_entry_point(name: &str) -> Option<&'static EntryPoint> {
    LOADER_ENTRY_POINTS
        .iter()
        .chain(INSTANCE_ENTRY_POINTS)
        .chain(DEVICE_ENTRY_POINTS)
        .find(|entry| entry.name == name)
}
