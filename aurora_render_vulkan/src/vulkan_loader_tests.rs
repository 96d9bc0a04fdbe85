//! Unit tests for the staged Vulkan loader
//!
//! A fake resolver stands in for the driver, so no GPU or Vulkan library
//! is required.

use super::*;
use std::sync::Mutex;
use aurora_render::aurora::Engine;
use aurora_render::aurora::log::{Logger, LogEntry, LogSeverity};
use serial_test::serial;

// ============================================================================
// FAKE RESOLVER
// ============================================================================

unsafe extern "system" fn fake_function() {}

unsafe extern "system" fn fake_enumerate_version(version: *mut u32) -> vk::Result {
    *version = vk::make_api_version(0, 1, 3, 0);
    vk::Result::SUCCESS
}

/// Resolves every known entry point except the names in `missing`
struct FakeResolver {
    missing: Vec<&'static str>,
    device_lookups: Arc<Mutex<Vec<(u64, String)>>>,
}

impl FakeResolver {
    fn new(missing: &[&'static str]) -> Self {
        Self { missing: missing.to_vec(), device_lookups: Arc::new(Mutex::new(Vec::new())) }
    }

    fn pointer(&self, name: &CStr) -> vk::PFN_vkVoidFunction {
        let name = name.to_str().ok()?;
        if self.missing.contains(&name) {
            return None;
        }
        if name == "vkEnumerateInstanceVersion" {
            let typed: vk::PFN_vkEnumerateInstanceVersion = fake_enumerate_version;
            return Some(unsafe { mem::transmute::<vk::PFN_vkEnumerateInstanceVersion, VoidFunction>(typed) });
        }
        Some(fake_function as VoidFunction)
    }
}

impl SymbolResolver for FakeResolver {
    unsafe fn instance_proc_addr(&self, instance: vk::Instance, name: &CStr) -> vk::PFN_vkVoidFunction {
        let entry = crate::vulkan_entry_points::find_entry_point(name.to_str().ok()?)?;
        // Only global commands resolve with a null instance
        if instance == vk::Instance::null() && entry.level != EntryLevel::Loader {
            return None;
        }
        self.pointer(name)
    }

    unsafe fn device_proc_addr(&self, _instance: vk::Instance, device: vk::Device, name: &CStr) -> vk::PFN_vkVoidFunction {
        let entry = crate::vulkan_entry_points::find_entry_point(name.to_str().ok()?)?;
        if entry.level != EntryLevel::Device {
            return None;
        }
        self.device_lookups.lock().unwrap().push((device.as_raw(), name.to_string_lossy().into_owned()));
        self.pointer(name)
    }
}

fn instance() -> vk::Instance {
    vk::Instance::from_raw(0x1000)
}

fn device(raw: u64) -> vk::Device {
    vk::Device::from_raw(raw)
}

fn loaded(missing: &[&'static str]) -> VulkanLoader {
    let mut loader = VulkanLoader::new();
    loader.initialize_custom(FakeResolver::new(missing));
    unsafe { loader.load_instance(instance()).unwrap() };
    loader
}

struct TestLogger {
    entries: Arc<Mutex<Vec<(LogSeverity, String)>>>,
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push((entry.severity, entry.message.clone()));
    }
}

// ============================================================================
// STAGE ORDERING
// ============================================================================

#[test]
fn test_new_loader_is_uninitialized() {
    let loader = VulkanLoader::new();
    assert_eq!(loader.stage(), LoaderStage::Uninitialized);
    assert_eq!(loader.loader_function("vkCreateInstance"), Err(Error::NotLoaded("loader")));
    assert_eq!(loader.instance_function("vkCreateDevice"), Err(Error::NotLoaded("instance")));
    assert_eq!(loader.device_function("vkQueueSubmit"), Err(Error::NotLoaded("device")));
}

#[test]
fn test_load_instance_before_initialize_fails() {
    let mut loader = VulkanLoader::new();
    let result = unsafe { loader.load_instance(instance()) };
    assert_eq!(result, Err(Error::NotLoaded("loader")));
    assert_eq!(loader.stage(), LoaderStage::Uninitialized);
}

#[test]
fn test_load_device_before_instance_fails() {
    let mut loader = VulkanLoader::new();
    loader.initialize_custom(FakeResolver::new(&[]));
    let result = unsafe { loader.load_device(device(0x2000)) };
    assert_eq!(result, Err(Error::NotLoaded("instance")));
    assert_eq!(loader.device_function("vkQueueSubmit"), Err(Error::NotLoaded("device")));
}

#[test]
fn test_initialize_custom_resolves_global_commands() {
    let mut loader = VulkanLoader::new();
    loader.initialize_custom(FakeResolver::new(&[]));

    assert_eq!(loader.stage(), LoaderStage::LoaderReady);
    assert!(loader.loader_function("vkCreateInstance").unwrap().is_some());
    assert!(loader.has_capability("vkEnumerateInstanceLayerProperties"));
    // Still no instance
    assert_eq!(loader.instance_function("vkCreateDevice"), Err(Error::NotLoaded("instance")));
}

#[test]
fn test_full_stage_progression() {
    let mut loader = loaded(&[]);
    assert_eq!(loader.stage(), LoaderStage::InstanceReady);
    assert_eq!(loader.instance(), instance());

    unsafe { loader.load_device(device(0x2000)).unwrap() };

    assert_eq!(loader.stage(), LoaderStage::DeviceReady);
    assert!(loader.device_function("vkCmdDrawIndexed").unwrap().is_some());
    assert_eq!(loader.device_table().device(), device(0x2000));
}

// ============================================================================
// RESOLUTION
// ============================================================================

#[test]
fn test_load_instance_also_resolves_device_level_through_instance() {
    let loader = loaded(&[]);
    assert!(loader.instance_function("vkGetPhysicalDeviceProperties").unwrap().is_some());
    assert!(loader.instance_function("vkQueueSubmit").unwrap().is_some());
    assert!(loader.instance_table().supports(Feature::Swapchain));
}

#[test]
fn test_load_instance_only_skips_device_level() {
    let mut loader = VulkanLoader::new();
    loader.initialize_custom(FakeResolver::new(&[]));
    unsafe { loader.load_instance_only(instance()).unwrap() };

    assert!(loader.instance_function("vkCreateDevice").unwrap().is_some());
    assert_eq!(loader.instance_function("vkQueueSubmit"), Ok(None));
    assert_eq!(loader.instance_table().len(), crate::vulkan_entry_points::INSTANCE_ENTRY_POINTS.len());
}

#[test]
fn test_unresolved_symbol_is_absent_not_error() {
    let mut loader = loaded(&["vkCmdBeginRenderingKHR", "vkSetDebugUtilsObjectNameEXT"]);
    unsafe { loader.load_device(device(0x2000)).unwrap() };

    assert_eq!(loader.device_function("vkCmdBeginRenderingKHR"), Ok(None));
    assert!(!loader.has_capability("vkSetDebugUtilsObjectNameEXT"));
    assert!(!loader.device_table().supports(Feature::DynamicRendering));
    assert!(loader.device_table().supports(Feature::Core10));
}

#[test]
fn test_unknown_name_is_absent() {
    let loader = loaded(&[]);
    assert_eq!(loader.instance_function("vkNotAFunction"), Ok(None));
    assert!(!loader.has_capability("vkNotAFunction"));
}

#[test]
fn test_get_capability_returns_typed_pointer() {
    let mut loader = VulkanLoader::new();
    loader.initialize_custom(FakeResolver::new(&[]));

    assert_eq!(loader.instance_version(), vk::make_api_version(0, 1, 3, 0));

    let typed: Option<vk::PFN_vkEnumerateInstanceVersion> =
        unsafe { loader.get_capability("vkEnumerateInstanceVersion") };
    assert!(typed.is_some());
}

#[test]
fn test_get_capability_rejects_non_pointer_type() {
    let loader = loaded(&[]);
    let wrong: Option<[u64; 2]> = unsafe { loader.instance_table().get_capability("vkCreateDevice") };
    assert!(wrong.is_none());
}

#[test]
fn test_instance_version_defaults_to_1_0() {
    let mut loader = VulkanLoader::new();
    loader.initialize_custom(FakeResolver::new(&["vkEnumerateInstanceVersion"]));
    assert_eq!(loader.instance_version(), vk::API_VERSION_1_0);
}

// ============================================================================
// DEVICE TABLES
// ============================================================================

#[test]
fn test_load_device_table_leaves_global_table_untouched() {
    let loader = loaded(&[]);
    let mut table = DeviceTable::new();

    unsafe { loader.load_device_table(&mut table, device(0x3000)).unwrap() };

    assert!(table.is_loaded());
    assert!(table.has_capability("vkQueuePresentKHR"));
    assert!(!loader.device_table().is_loaded());
    assert_eq!(loader.stage(), LoaderStage::InstanceReady);
}

#[test]
fn test_device_lookups_use_the_given_device() {
    let resolver = FakeResolver::new(&[]);
    let lookups = resolver.device_lookups.clone();
    let mut loader = VulkanLoader::new();
    loader.initialize_custom(resolver);
    unsafe {
        loader.load_instance(instance()).unwrap();
        loader.load_device(device(0x2000)).unwrap();
    }

    let lookups = lookups.lock().unwrap();
    assert_eq!(lookups.len(), crate::vulkan_entry_points::DEVICE_ENTRY_POINTS.len());
    assert!(lookups.iter().all(|(raw, _)| *raw == 0x2000));
}

#[test]
#[serial]
fn test_load_device_last_writer_wins_and_warns() {
    let mut loader = loaded(&[]);
    unsafe { loader.load_device(device(0x2000)).unwrap() };

    let entries = Arc::new(Mutex::new(Vec::new()));
    Engine::set_logger(TestLogger { entries: entries.clone() });
    unsafe { loader.load_device(device(0x4000)).unwrap() };
    Engine::reset_logger();

    assert_eq!(loader.device_table().device(), device(0x4000));
    let warned = entries.lock().unwrap().iter().any(|(severity, message)| {
        *severity == LogSeverity::Warn && message.contains("replaced")
    });
    assert!(warned);
}

#[test]
fn test_reloading_instance_resets_device_table() {
    let mut loader = loaded(&[]);
    unsafe {
        loader.load_device(device(0x2000)).unwrap();
        loader.load_instance(vk::Instance::from_raw(0x5000)).unwrap();
    }
    assert_eq!(loader.stage(), LoaderStage::InstanceReady);
    assert_eq!(loader.device_function("vkQueueSubmit"), Err(Error::NotLoaded("device")));
}
