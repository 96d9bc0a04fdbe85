/// Swapchain - presentation images of the window surface
///
/// Owns the surface, the swapchain, one view per image and the semaphores
/// pairing acquire, submit and present. With one frame in flight a single
/// acquire semaphore suffices; render-finished semaphores are per image.

use ash::vk;
use std::sync::Arc;
use aurora_render::aurora::{Error, Result};
use aurora_render::{engine_debug, engine_err, engine_error};
use crate::vulkan_context::GpuContext;

const SOURCE: &str = "aurora::vulkan::Swapchain";

/// Result of an acquire
pub enum Acquired {
    Image(u32),
    /// The surface changed; recreate before rendering
    OutOfDate,
}

pub struct Swapchain {
    context: Arc<GpuContext>,
    surface: vk::SurfaceKHR,
    loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    extent: vk::Extent2D,
    vsync: bool,

    image_available: vk::Semaphore,
    render_finished: Vec<vk::Semaphore>,
}

fn choose_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
        height: height.clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
    }
}

impl Swapchain {
    /// Build the swapchain for `surface`, taking ownership of it
    ///
    /// The surface is destroyed if construction fails.
    pub fn new(context: &Arc<GpuContext>, surface: vk::SurfaceKHR, width: u32, height: u32, vsync: bool) -> Result<Self> {
        let formats = unsafe {
            context.surface_loader.get_physical_device_surface_formats(context.physical_device, surface)
        };
        let formats = match formats {
            Ok(formats) if !formats.is_empty() => formats,
            other => {
                unsafe { context.surface_loader.destroy_surface(surface, None) };
                engine_error!(SOURCE, "Failed to query surface formats: {:?}", other.err());
                return Err(Error::InitializationFailed("Surface reports no formats".to_string()));
            }
        };
        let chosen = formats
            .iter()
            .find(|f| f.format == vk::Format::B8G8R8A8_SRGB || f.format == vk::Format::R8G8B8A8_SRGB)
            .unwrap_or(&formats[0]);

        let mut swapchain = Self {
            context: context.clone(),
            surface,
            loader: ash::khr::swapchain::Device::new(&context.instance, &context.device),
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            format: chosen.format,
            color_space: chosen.color_space,
            extent: vk::Extent2D { width: 0, height: 0 },
            vsync,
            image_available: vk::Semaphore::null(),
            render_finished: Vec::new(),
        };

        unsafe {
            swapchain.image_available = context.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(|e| {
                    engine_error!(SOURCE, "Failed to create image-available semaphore: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create semaphore: {:?}", e))
                })?;
        }
        swapchain.build(width, height)?;
        Ok(swapchain)
    }

    /// (Re)create swapchain, views and per-image semaphores
    ///
    /// Returns false when the surface has zero area (minimized window);
    /// the old swapchain is then kept.
    fn build(&mut self, width: u32, height: u32) -> Result<bool> {
        unsafe {
            let capabilities = self.context.surface_loader
                .get_physical_device_surface_capabilities(self.context.physical_device, self.surface)
                .map_err(|e| engine_err!(SOURCE, "Failed to get surface capabilities: {:?}", e))?;
            let extent = choose_extent(&capabilities, width, height);
            if extent.width == 0 || extent.height == 0 {
                return Ok(false);
            }

            let present_modes = self.context.surface_loader
                .get_physical_device_surface_present_modes(self.context.physical_device, self.surface)
                .unwrap_or_default();
            let present_mode = choose_present_mode(&present_modes, self.vsync);

            let mut image_count = capabilities.min_image_count + 1;
            if capabilities.max_image_count > 0 {
                image_count = image_count.min(capabilities.max_image_count);
            }

            let old_swapchain = self.swapchain;
            let create_info = vk::SwapchainCreateInfoKHR::default()
                .surface(self.surface)
                .min_image_count(image_count)
                .image_format(self.format)
                .image_color_space(self.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
                .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(present_mode)
                .clipped(true)
                .old_swapchain(old_swapchain);

            let swapchain = self.loader
                .create_swapchain(&create_info, None)
                .map_err(|e| {
                    engine_error!(SOURCE, "Failed to create swapchain: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create swapchain: {:?}", e))
                })?;

            self.destroy_views();
            if old_swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(old_swapchain, None);
            }
            self.swapchain = swapchain;
            self.extent = extent;

            self.images = self.loader
                .get_swapchain_images(swapchain)
                .map_err(|e| engine_err!(SOURCE, "Failed to get swapchain images: {:?}", e))?;

            for &image in &self.images {
                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(self.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                let view = self.context.device
                    .create_image_view(&view_info, None)
                    .map_err(|e| engine_err!(SOURCE, "Failed to create swapchain image view: {:?}", e))?;
                self.views.push(view);
            }

            while self.render_finished.len() < self.images.len() {
                let semaphore = self.context.device
                    .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                    .map_err(|e| engine_err!(SOURCE, "Failed to create render-finished semaphore: {:?}", e))?;
                self.render_finished.push(semaphore);
            }

            engine_debug!(SOURCE, "Swapchain {}x{} with {} images ({:?})",
                extent.width, extent.height, self.images.len(), present_mode);
            Ok(true)
        }
    }

    fn destroy_views(&mut self) {
        for view in self.views.drain(..) {
            unsafe { self.context.device.destroy_image_view(view, None) };
        }
    }

    /// Recreate after a resize; the device must be idle
    pub fn recreate(&mut self, width: u32, height: u32) -> Result<bool> {
        self.build(width, height)
    }

    pub fn acquire_next_image(&mut self) -> Result<Acquired> {
        let result = unsafe {
            self.loader.acquire_next_image(self.swapchain, u64::MAX, self.image_available, vk::Fence::null())
        };
        match result {
            Ok((index, _suboptimal)) => Ok(Acquired::Image(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
            Err(e) => Err(engine_err!(SOURCE, "Failed to acquire next swapchain image: {:?}", e)),
        }
    }

    /// Present `image_index`; returns true when the swapchain is out of date
    pub fn present(&mut self, image_index: u32) -> Result<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [self.render_finished_semaphore(image_index)];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.loader.queue_present(self.context.present_queue, &present_info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(engine_err!(SOURCE, "Failed to present swapchain image: {:?}", e)),
        }
    }

    pub fn image_available_semaphore(&self) -> vk::Semaphore {
        self.image_available
    }

    pub fn render_finished_semaphore(&self, image_index: u32) -> vk::Semaphore {
        self.render_finished[image_index as usize]
    }

    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.context.device.device_wait_idle().ok();

            self.context.device.destroy_semaphore(self.image_available, None);
            for &semaphore in &self.render_finished {
                self.context.device.destroy_semaphore(semaphore, None);
            }
            self.destroy_views();
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
            }
            self.context.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
