/// GpuContext - device-level state shared by every Vulkan resource
///
/// Owns the instance, the logical device, the allocator, the queues and the
/// staged function loader. Every buffer, image and shader holds an
/// `Arc<GpuContext>`, so the device outlives all of them (a stale resource
/// kept after a backend switch still frees its handles correctly). The
/// window surface is handed to the swapchain, which dies with the backend.
///
/// Handles released while the GPU may still read them are queued as
/// garbage, tagged with the number of frame submissions issued so far.
/// A handle is destroyed once a fence wait shows that the submission
/// which could have used it has completed.

use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::{AllocationError, MemoryLocation};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};
use aurora_render::aurora::{Error, Result};
use aurora_render::aurora::render::Config;
use aurora_render::{engine_debug, engine_err, engine_error, engine_info, engine_warn};
use aurora_render::aurora::render::TextureFormat;
use crate::vulkan_debug::{self, DebugConfig};
use crate::vulkan_format::texture_format;
use crate::vulkan_loader::{AshResolver, VulkanLoader};
use crate::vulkan_render_pass::{PassSignature, RenderPassCache};

const SOURCE: &str = "aurora::vulkan";

// ===== GARBAGE =====

/// A handle waiting for the GPU to stop using it
pub enum Garbage {
    Buffer(vk::Buffer, Option<Allocation>),
    Image(vk::Image, Option<Allocation>),
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
    Framebuffer(vk::Framebuffer),
    RenderPass(vk::RenderPass),
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    DescriptorPool(vk::DescriptorPool),
    ShaderModule(vk::ShaderModule),
}

#[derive(Default)]
struct GarbageQueue {
    retired: Vec<(u64, Garbage)>,
    /// Frame submissions issued
    submitted: u64,
    /// Frame submissions known to be complete
    completed: u64,
}

// ===== INIT HELPERS =====

fn init_failed(what: &str, detail: impl std::fmt::Debug) -> Error {
    engine_error!(SOURCE, "{}: {:?}", what, detail);
    Error::InitializationFailed(format!("{}: {:?}", what, detail))
}

/// Map an allocator failure onto the render error vocabulary
pub fn allocation_error(what: &str, size: u64, error: AllocationError) -> Error {
    match error {
        AllocationError::OutOfMemory => {
            engine_error!(SOURCE, "Out of GPU memory for {} ({:.2} MB)", what, size as f64 / (1024.0 * 1024.0));
            Error::OutOfMemory
        }
        other => {
            engine_error!(SOURCE, "Allocation of {} failed: {:?}", what, other);
            Error::AllocationError(format!("{}: {}", what, other))
        }
    }
}

/// D24S8 is optional in Vulkan; fall back to D32S8 where it is missing
fn pick_depth_stencil_format(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> vk::Format {
    [vk::Format::D24_UNORM_S8_UINT, vk::Format::D32_SFLOAT_S8_UINT]
        .into_iter()
        .find(|&format| {
            let properties = unsafe { instance.get_physical_device_format_properties(physical_device, format) };
            properties
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .unwrap_or(vk::Format::D32_SFLOAT_S8_UINT)
}

fn validation_layer_present(entry: &ash::Entry) -> bool {
    let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
    layers.iter().any(|layer| {
        layer
            .layer_name_as_c_str()
            .map(|name| name == c"VK_LAYER_KHRONOS_validation")
            .unwrap_or(false)
    })
}

// ===== GPU CONTEXT =====

pub struct GpuContext {
    _entry: ash::Entry,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    /// Dropped before the device is destroyed
    allocator: ManuallyDrop<Mutex<Allocator>>,

    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue: vk::Queue,

    pub surface_loader: ash::khr::surface::Instance,

    pub limits: vk::PhysicalDeviceLimits,
    pub device_name: String,

    upload_command_pool: Mutex<vk::CommandPool>,
    garbage: Mutex<GarbageQueue>,
    render_passes: Mutex<RenderPassCache>,
    /// Format used for `TextureFormat::Depth24Stencil8`
    depth_stencil_format: vk::Format,

    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    debug_names: Option<ash::ext::debug_utils::Device>,
    validation_stats: bool,

    loader: VulkanLoader,
}

impl GpuContext {
    /// Create instance, device and allocator for `window`
    ///
    /// Also returns the window surface the device was picked for; the
    /// caller owns it.
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(window: &W, config: &Config) -> Result<(Arc<Self>, vk::SurfaceKHR)> {
        unsafe {
            let resolver = AshResolver::load()?;
            let entry = resolver.entry().clone();

            let mut loader = VulkanLoader::new();
            loader.initialize_custom(resolver);

            let instance_version = loader.instance_version();
            let api_version = instance_version.min(vk::API_VERSION_1_3);
            engine_debug!(SOURCE, "Instance version {}.{}.{}, requesting {}.{}",
                vk::api_version_major(instance_version),
                vk::api_version_minor(instance_version),
                vk::api_version_patch(instance_version),
                vk::api_version_major(api_version),
                vk::api_version_minor(api_version));

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|e| init_failed("Invalid application name", e))?;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(config.app_version)
                .engine_name(c"Aurora")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(api_version);

            let display_handle = window.display_handle()
                .map_err(|e| init_failed("Failed to get display handle", e))?;
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| init_failed("Failed to get required extensions", e))?
                .to_vec();

            let mut validation = config.enable_validation && cfg!(feature = "vulkan-validation");
            if validation && !validation_layer_present(&entry) {
                engine_warn!(SOURCE, "VK_LAYER_KHRONOS_validation not installed, validation disabled");
                validation = false;
            }
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }
            let layer_names = if validation {
                vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| init_failed("Failed to create Vulkan instance", e))?;
            loader.load_instance(instance.handle())?;

            let debug_utils = if validation {
                let debug_config = DebugConfig::from_render_config(config);
                let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(vulkan_debug::severity_flags(debug_config.severity))
                    .message_type(vulkan_debug::type_flags(&debug_config.message_filter))
                    .pfn_user_callback(Some(vulkan_debug::vulkan_debug_callback));
                vulkan_debug::init_debug_config(debug_config);

                let debug_instance = ash::ext::debug_utils::Instance::new(&entry, &instance);
                let messenger = debug_instance
                    .create_debug_utils_messenger(&debug_info, None)
                    .map_err(|e| init_failed("Failed to create debug messenger", e))?;
                Some((debug_instance, messenger))
            } else {
                None
            };

            let window_handle = window.window_handle()
                .map_err(|e| init_failed("Failed to get window handle", e))?;
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| init_failed("Failed to create surface", e))?;
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            let physical_device = instance
                .enumerate_physical_devices()
                .map_err(|e| init_failed("Failed to enumerate physical devices", e))?
                .into_iter()
                .next()
                .ok_or_else(|| init_failed("No Vulkan-capable GPU found", "0 devices"))?;

            let properties = instance.get_physical_device_properties(physical_device);
            let device_name = properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string());

            let queue_families = instance.get_physical_device_queue_family_properties(physical_device);
            let graphics_queue_family = queue_families
                .iter()
                .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                .map(|index| index as u32)
                .ok_or_else(|| init_failed("No graphics queue family found", device_name.as_str()))?;
            let present_queue_family = (0..queue_families.len() as u32)
                .find(|&index| {
                    surface_loader
                        .get_physical_device_surface_support(physical_device, index, surface)
                        .unwrap_or(false)
                })
                .ok_or_else(|| init_failed("No present queue family found", device_name.as_str()))?;

            let queue_priorities = [1.0];
            let mut queue_create_infos = vec![vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_queue_family)
                .queue_priorities(&queue_priorities)];
            if present_queue_family != graphics_queue_family {
                queue_create_infos.push(vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(present_queue_family)
                    .queue_priorities(&queue_priorities));
            }

            let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];
            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| init_failed("Failed to create logical device", e))?;
            loader.load_device(device.handle())?;

            let graphics_queue = device.get_device_queue(graphics_queue_family, 0);
            let present_queue = device.get_device_queue(present_queue_family, 0);

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| init_failed("Failed to create GPU allocator", e))?;

            let pool_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let upload_command_pool = device
                .create_command_pool(&pool_info, None)
                .map_err(|e| init_failed("Failed to create upload command pool", e))?;

            let debug_names = if debug_utils.is_some() && loader.has_capability("vkSetDebugUtilsObjectNameEXT") {
                Some(ash::ext::debug_utils::Device::new(&instance, &device))
            } else {
                None
            };

            let depth_stencil_format = pick_depth_stencil_format(&instance, physical_device);

            engine_info!(SOURCE, "Vulkan device '{}' ready (validation: {})", device_name, validation);

            let context = Arc::new(Self {
                _entry: entry,
                instance,
                physical_device,
                device,
                allocator: ManuallyDrop::new(Mutex::new(allocator)),
                graphics_queue,
                graphics_queue_family,
                present_queue,
                surface_loader,
                limits: properties.limits,
                device_name,
                upload_command_pool: Mutex::new(upload_command_pool),
                garbage: Mutex::new(GarbageQueue::default()),
                render_passes: Mutex::new(RenderPassCache::default()),
                depth_stencil_format,
                debug_utils,
                debug_names,
                validation_stats: validation && config.enable_validation_stats,
                loader,
            });
            Ok((context, surface))
        }
    }

    pub fn loader(&self) -> &VulkanLoader {
        &self.loader
    }

    pub fn lock_allocator(&self) -> Result<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| engine_err!(SOURCE, "GPU allocator lock poisoned"))
    }

    /// Allocate and bind memory for `buffer`
    pub fn allocate_buffer_memory(&self, buffer: vk::Buffer, name: &str, location: MemoryLocation) -> Result<Allocation> {
        unsafe {
            let requirements = self.device.get_buffer_memory_requirements(buffer);
            let allocation = self.lock_allocator()?
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| allocation_error(name, requirements.size, e))?;
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .map_err(|e| engine_err!(SOURCE, "Failed to bind memory of '{}': {:?}", name, e))?;
            Ok(allocation)
        }
    }

    /// Allocate and bind device-local memory for `image`
    pub fn allocate_image_memory(&self, image: vk::Image, name: &str) -> Result<Allocation> {
        unsafe {
            let requirements = self.device.get_image_memory_requirements(image);
            let allocation = self.lock_allocator()?
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|e| allocation_error(name, requirements.size, e))?;
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(|e| engine_err!(SOURCE, "Failed to bind memory of '{}': {:?}", name, e))?;
            Ok(allocation)
        }
    }

    /// Record with `record` into a transient command buffer, submit and wait
    pub fn one_time_submit(&self, record: impl FnOnce(vk::CommandBuffer)) -> Result<()> {
        let pool = self
            .upload_command_pool
            .lock()
            .map_err(|_| engine_err!(SOURCE, "Upload command pool lock poisoned"))?;
        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffer = self.device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| engine_err!(SOURCE, "Failed to allocate upload command buffer: {:?}", e))?[0];

            let result = self.submit_and_wait(command_buffer, record);
            self.device.free_command_buffers(*pool, &[command_buffer]);
            result
        }
    }

    unsafe fn submit_and_wait(&self, command_buffer: vk::CommandBuffer, record: impl FnOnce(vk::CommandBuffer)) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        self.device
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(|e| engine_err!(SOURCE, "Failed to begin upload command buffer: {:?}", e))?;
        record(command_buffer);
        self.device
            .end_command_buffer(command_buffer)
            .map_err(|e| engine_err!(SOURCE, "Failed to end upload command buffer: {:?}", e))?;

        let fence = self.device
            .create_fence(&vk::FenceCreateInfo::default(), None)
            .map_err(|e| engine_err!(SOURCE, "Failed to create upload fence: {:?}", e))?;
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
        let submitted = self.device
            .queue_submit(self.graphics_queue, &[submit_info], fence)
            .map_err(|e| engine_err!(SOURCE, "Failed to submit upload: {:?}", e))
            .and_then(|_| {
                self.device
                    .wait_for_fences(&[fence], true, u64::MAX)
                    .map_err(|e| engine_err!(SOURCE, "Failed to wait for upload: {:?}", e))
            });
        self.device.destroy_fence(fence, None);
        submitted
    }

    /// Queue a handle for destruction once the GPU is done with it
    pub fn retire(&self, garbage: Garbage) {
        match self.garbage.lock() {
            Ok(mut queue) => {
                let tag = queue.submitted;
                queue.retired.push((tag, garbage));
            }
            Err(_) => engine_error!(SOURCE, "Garbage queue lock poisoned, leaking a handle"),
        }
    }

    /// Count one frame submission
    pub fn frame_submitted(&self) {
        if let Ok(mut queue) = self.garbage.lock() {
            queue.submitted += 1;
        }
    }

    /// Destroy handles no submitted frame can still use
    ///
    /// The caller has just waited for every submitted frame. Handles retired
    /// since the last submission may be referenced by the command buffer
    /// being recorded and stay queued.
    pub fn collect_garbage(&self) {
        let ready = match self.garbage.lock() {
            Ok(mut queue) => {
                queue.completed = queue.submitted;
                let completed = queue.completed;
                let (ready, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut queue.retired)
                    .into_iter()
                    .partition(|(tag, _)| *tag < completed);
                queue.retired = pending;
                ready
            }
            Err(_) => return,
        };
        self.destroy_all(ready);
    }

    /// Destroy every queued handle; no command buffer may reference them
    pub fn collect_all_garbage(&self) {
        let all = match self.garbage.lock() {
            Ok(mut queue) => std::mem::take(&mut queue.retired),
            Err(_) => return,
        };
        self.destroy_all(all);
    }

    fn destroy_all(&self, retired: Vec<(u64, Garbage)>) {
        if retired.is_empty() {
            return;
        }
        let count = retired.len();
        unsafe {
            for (_, garbage) in retired {
                self.destroy(garbage);
            }
        }
        aurora_render::engine_trace!(SOURCE, "Destroyed {} retired handles", count);
    }

    unsafe fn destroy(&self, garbage: Garbage) {
        let free = |allocation: Option<Allocation>| {
            if let Some(allocation) = allocation {
                if let Ok(mut allocator) = self.allocator.lock() {
                    if let Err(e) = allocator.free(allocation) {
                        engine_warn!(SOURCE, "Failed to free GPU allocation: {:?}", e);
                    }
                }
            }
        };
        match garbage {
            Garbage::Buffer(buffer, allocation) => {
                self.device.destroy_buffer(buffer, None);
                free(allocation);
            }
            Garbage::Image(image, allocation) => {
                self.device.destroy_image(image, None);
                free(allocation);
            }
            Garbage::ImageView(view) => self.device.destroy_image_view(view, None),
            Garbage::Sampler(sampler) => self.device.destroy_sampler(sampler, None),
            Garbage::Framebuffer(framebuffer) => self.device.destroy_framebuffer(framebuffer, None),
            Garbage::RenderPass(render_pass) => self.device.destroy_render_pass(render_pass, None),
            Garbage::Pipeline(pipeline) => self.device.destroy_pipeline(pipeline, None),
            Garbage::PipelineLayout(layout) => self.device.destroy_pipeline_layout(layout, None),
            Garbage::DescriptorSetLayout(layout) => self.device.destroy_descriptor_set_layout(layout, None),
            Garbage::DescriptorPool(pool) => self.device.destroy_descriptor_pool(pool, None),
            Garbage::ShaderModule(module) => self.device.destroy_shader_module(module, None),
        }
    }

    /// Attach a debug name to `handle` (validation builds only)
    pub fn set_object_name<H: Handle>(&self, handle: H, name: &str) {
        let Some(debug_names) = &self.debug_names else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&name);
        unsafe {
            if let Err(e) = debug_names.set_debug_utils_object_name(&info) {
                engine_debug!(SOURCE, "Failed to name object: {:?}", e);
            }
        }
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| engine_err!(SOURCE, "Failed to wait for device idle: {:?}", e))?;
        }
        self.collect_garbage();
        Ok(())
    }

    /// Native format of `format` on this device
    pub fn image_format(&self, format: TextureFormat) -> vk::Format {
        match format {
            TextureFormat::Depth24Stencil8 => self.depth_stencil_format,
            other => texture_format(other),
        }
    }

    /// Render pass every pipeline for `signature` is built against
    pub fn render_pass(&self, signature: PassSignature) -> Result<vk::RenderPass> {
        self.render_passes
            .lock()
            .map_err(|_| engine_err!(SOURCE, "Render pass cache lock poisoned"))?
            .get_or_create(&self.device, signature)
    }

    /// Dynamic uniform offsets must be multiples of this
    pub fn uniform_alignment(&self) -> u64 {
        self.limits.min_uniform_buffer_offset_alignment.max(1)
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.collect_all_garbage();

            ManuallyDrop::drop(&mut self.allocator);

            if let Ok(mut render_passes) = self.render_passes.lock() {
                render_passes.destroy(&self.device);
            }

            if let Ok(pool) = self.upload_command_pool.lock() {
                self.device.destroy_command_pool(*pool, None);
            }

            self.device.destroy_device(None);

            if let Some((debug_instance, messenger)) = self.debug_utils.take() {
                debug_instance.destroy_debug_utils_messenger(messenger, None);
                if self.validation_stats {
                    vulkan_debug::print_validation_stats_report();
                }
                vulkan_debug::shutdown_debug_config();
            }

            self.instance.destroy_instance(None);
        }
        engine_debug!(SOURCE, "Vulkan device '{}' destroyed", self.device_name);
    }
}
