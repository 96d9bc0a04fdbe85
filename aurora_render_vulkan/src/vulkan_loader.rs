/// Staged Vulkan function loader
///
/// Stages run strictly in order:
///   Uninitialized --initialize--> LoaderReady --load_instance--> InstanceReady
///   --load_device--> DeviceReady
///
/// Each stage walks the static tables in `vulkan_entry_points` and fills a
/// `FunctionTable`. A symbol the driver does not export leaves an empty
/// slot; callers probe with `has_capability` before use.
///
/// The loader keeps one device table (the last `load_device` wins). Code
/// that drives several devices resolves into its own `DeviceTable` through
/// `load_device_table`.

use std::ffi::{c_char, CStr, CString};
use std::mem;
use std::sync::Arc;
use ash::vk;
use ash::vk::Handle;
use rustc_hash::FxHashMap;
use aurora_render::aurora::{Error, Result};
use aurora_render::{engine_debug, engine_error, engine_warn};
use crate::vulkan_entry_points::{entry_points, EntryLevel, EntryPoint, Feature};

/// Untyped function pointer as returned by `vkGet*ProcAddr`
pub type VoidFunction = unsafe extern "system" fn();

// ===== SYMBOL RESOLVER =====

/// Source of Vulkan function pointers
pub trait SymbolResolver: Send + Sync {
    /// `vkGetInstanceProcAddr`. `instance` is null for global commands.
    ///
    /// # Safety
    /// `instance` must be null or a live instance created through this resolver.
    unsafe fn instance_proc_addr(&self, instance: vk::Instance, name: &CStr) -> vk::PFN_vkVoidFunction;

    /// `vkGetDeviceProcAddr` for a device created from `instance`
    ///
    /// # Safety
    /// Both handles must be live.
    unsafe fn device_proc_addr(&self, instance: vk::Instance, device: vk::Device, name: &CStr) -> vk::PFN_vkVoidFunction;
}

/// Resolver backed by the system Vulkan library
pub struct AshResolver {
    entry: ash::Entry,
}

impl AshResolver {
    pub fn new(entry: ash::Entry) -> Self {
        Self { entry }
    }

    /// Open the Vulkan driver library
    pub fn load() -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            engine_error!("aurora::vulkan", "Failed to load Vulkan library: {:?}", e);
            Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
        })?;
        Ok(Self::new(entry))
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }
}

impl SymbolResolver for AshResolver {
    unsafe fn instance_proc_addr(&self, instance: vk::Instance, name: &CStr) -> vk::PFN_vkVoidFunction {
        self.entry.get_instance_proc_addr(instance, name.as_ptr())
    }

    unsafe fn device_proc_addr(&self, instance: vk::Instance, device: vk::Device, name: &CStr) -> vk::PFN_vkVoidFunction {
        let raw = self.entry.get_instance_proc_addr(
            instance,
            b"vkGetDeviceProcAddr\0".as_ptr() as *const c_char,
        )?;
        let get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr = mem::transmute(raw);
        get_device_proc_addr(device, name.as_ptr())
    }
}

// ===== FUNCTION TABLE =====

#[derive(Debug, Clone, Copy)]
struct Slot {
    feature: Feature,
    function: Option<VoidFunction>,
}

/// Resolved entry points of one or more levels
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    slots: FxHashMap<&'static str, Slot>,
}

impl FunctionTable {
    /// Resolve every entry through `lookup`, returning how many resolved
    fn resolve(&mut self, entries: &'static [EntryPoint], lookup: impl Fn(&CStr) -> vk::PFN_vkVoidFunction) -> usize {
        let mut resolved = 0;
        for entry in entries {
            let function = match CString::new(entry.name) {
                Ok(name) => lookup(&name),
                Err(_) => None,
            };
            if function.is_some() {
                resolved += 1;
            }
            self.slots.insert(entry.name, Slot { feature: entry.feature, function });
        }
        resolved
    }

    fn clear(&mut self) {
        self.slots.clear();
    }

    /// Raw pointer of `name`, None when absent or unresolved
    pub fn function(&self, name: &str) -> Option<VoidFunction> {
        self.slots.get(name).and_then(|slot| slot.function)
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.function(name).is_some()
    }

    /// Typed pointer of `name`
    ///
    /// # Safety
    /// `F` must be the `vk::PFN_*` type matching `name`.
    pub unsafe fn get_capability<F: Copy>(&self, name: &str) -> Option<F> {
        if mem::size_of::<F>() != mem::size_of::<VoidFunction>() {
            return None;
        }
        let function = self.function(name)?;
        Some(mem::transmute_copy::<VoidFunction, F>(&function))
    }

    /// True when every entry point of `feature` in this table resolved
    pub fn supports(&self, feature: Feature) -> bool {
        let mut slots = self.slots.values().filter(|slot| slot.feature == feature).peekable();
        slots.peek().is_some() && slots.all(|slot| slot.function.is_some())
    }

    /// Number of resolved slots
    pub fn resolved_count(&self) -> usize {
        self.slots.values().filter(|slot| slot.function.is_some()).count()
    }

    /// Number of slots, resolved or not
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Device-level entry points resolved for one device
#[derive(Debug, Clone)]
pub struct DeviceTable {
    device: vk::Device,
    functions: FunctionTable,
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self { device: vk::Device::null(), functions: FunctionTable::default() }
    }
}

impl DeviceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device the table was resolved for (null when empty)
    pub fn device(&self) -> vk::Device {
        self.device
    }

    pub fn is_loaded(&self) -> bool {
        self.device != vk::Device::null()
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.functions.has_capability(name)
    }

    /// # Safety
    /// `F` must be the `vk::PFN_*` type matching `name`.
    pub unsafe fn get_capability<F: Copy>(&self, name: &str) -> Option<F> {
        self.functions.get_capability(name)
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.functions.supports(feature)
    }
}

// ===== LOADER =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoaderStage {
    Uninitialized,
    LoaderReady,
    InstanceReady,
    DeviceReady,
}

pub struct VulkanLoader {
    resolver: Option<Arc<dyn SymbolResolver>>,
    stage: LoaderStage,
    loader_table: FunctionTable,
    instance: vk::Instance,
    instance_table: FunctionTable,
    device_table: DeviceTable,
}

impl Default for VulkanLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl VulkanLoader {
    pub fn new() -> Self {
        Self {
            resolver: None,
            stage: LoaderStage::Uninitialized,
            loader_table: FunctionTable::default(),
            instance: vk::Instance::null(),
            instance_table: FunctionTable::default(),
            device_table: DeviceTable::default(),
        }
    }

    /// Open the system Vulkan library and resolve the global commands
    ///
    /// Fails only when the library cannot be opened.
    pub fn initialize(&mut self) -> Result<()> {
        let resolver = AshResolver::load()?;
        self.initialize_custom(resolver);
        Ok(())
    }

    /// Use an injected resolver (tests, or an `ash::Entry` already loaded)
    pub fn initialize_custom(&mut self, resolver: impl SymbolResolver + 'static) {
        let resolver: Arc<dyn SymbolResolver> = Arc::new(resolver);
        self.loader_table.clear();
        let resolved = self.loader_table.resolve(entry_points(EntryLevel::Loader), |name| unsafe {
            resolver.instance_proc_addr(vk::Instance::null(), name)
        });
        self.instance_table.clear();
        self.instance = vk::Instance::null();
        self.device_table = DeviceTable::default();
        self.resolver = Some(resolver);
        self.stage = LoaderStage::LoaderReady;
        engine_debug!("aurora::vulkan", "Loader ready ({}/{} global commands)", resolved, self.loader_table.len());
    }

    fn resolver(&self) -> Result<Arc<dyn SymbolResolver>> {
        self.resolver.clone().ok_or(Error::NotLoaded("loader"))
    }

    /// Resolve instance-level and device-level entry points against `instance`
    ///
    /// Device-level functions go through `vkGetInstanceProcAddr` and dispatch
    /// to whichever device they are called with.
    ///
    /// # Safety
    /// `instance` must be a live instance created through this loader's library.
    pub unsafe fn load_instance(&mut self, instance: vk::Instance) -> Result<()> {
        self.load_instance_levels(instance, true)
    }

    /// Resolve the instance-level subset only
    ///
    /// # Safety
    /// Same contract as `load_instance`.
    pub unsafe fn load_instance_only(&mut self, instance: vk::Instance) -> Result<()> {
        self.load_instance_levels(instance, false)
    }

    unsafe fn load_instance_levels(&mut self, instance: vk::Instance, with_device_level: bool) -> Result<()> {
        let resolver = self.resolver()?;
        let lookup = |name: &CStr| resolver.instance_proc_addr(instance, name);

        self.instance_table.clear();
        let mut resolved = self.instance_table.resolve(entry_points(EntryLevel::Instance), lookup);
        if with_device_level {
            resolved += self.instance_table.resolve(entry_points(EntryLevel::Device), lookup);
        }

        self.instance = instance;
        self.device_table = DeviceTable::default();
        self.stage = LoaderStage::InstanceReady;
        engine_debug!("aurora::vulkan", "Instance {:#x} loaded ({}/{} entry points)",
            instance.as_raw(), resolved, self.instance_table.len());
        Ok(())
    }

    /// Resolve the device-level entry points into the loader's device table
    ///
    /// The last writer wins; replacing another device is logged.
    ///
    /// # Safety
    /// `device` must be a live device created from the loaded instance.
    pub unsafe fn load_device(&mut self, device: vk::Device) -> Result<()> {
        let mut table = DeviceTable::default();
        self.load_device_table(&mut table, device)?;

        if self.device_table.is_loaded() && self.device_table.device() != device {
            engine_warn!("aurora::vulkan", "Device table for {:#x} replaced by {:#x}",
                self.device_table.device().as_raw(), device.as_raw());
        }
        self.device_table = table;
        self.stage = LoaderStage::DeviceReady;
        Ok(())
    }

    /// Resolve the device-level entry points into a caller-owned table
    ///
    /// # Safety
    /// Same contract as `load_device`.
    pub unsafe fn load_device_table(&self, table: &mut DeviceTable, device: vk::Device) -> Result<()> {
        if self.stage < LoaderStage::InstanceReady {
            return Err(Error::NotLoaded("instance"));
        }
        let resolver = self.resolver()?;
        let instance = self.instance;

        table.functions.clear();
        let resolved = table.functions.resolve(entry_points(EntryLevel::Device), |name| {
            resolver.device_proc_addr(instance, device, name)
        });
        table.device = device;
        engine_debug!("aurora::vulkan", "Device {:#x} loaded ({}/{} entry points)",
            device.as_raw(), resolved, table.functions.len());
        Ok(())
    }

    // ===== QUERIES =====

    pub fn stage(&self) -> LoaderStage {
        self.stage
    }

    pub fn instance(&self) -> vk::Instance {
        self.instance
    }

    pub fn loader_function(&self, name: &str) -> Result<Option<VoidFunction>> {
        if self.stage < LoaderStage::LoaderReady {
            return Err(Error::NotLoaded("loader"));
        }
        Ok(self.loader_table.function(name))
    }

    pub fn instance_function(&self, name: &str) -> Result<Option<VoidFunction>> {
        if self.stage < LoaderStage::InstanceReady {
            return Err(Error::NotLoaded("instance"));
        }
        Ok(self.instance_table.function(name))
    }

    pub fn device_function(&self, name: &str) -> Result<Option<VoidFunction>> {
        if self.stage < LoaderStage::DeviceReady {
            return Err(Error::NotLoaded("device"));
        }
        Ok(self.device_table.functions.function(name))
    }

    pub fn loader_table(&self) -> &FunctionTable {
        &self.loader_table
    }

    pub fn instance_table(&self) -> &FunctionTable {
        &self.instance_table
    }

    pub fn device_table(&self) -> &DeviceTable {
        &self.device_table
    }

    /// True when `name` resolved at any loaded level
    pub fn has_capability(&self, name: &str) -> bool {
        self.device_table.has_capability(name)
            || self.instance_table.has_capability(name)
            || self.loader_table.has_capability(name)
    }

    /// Typed pointer of `name`, device level first
    ///
    /// # Safety
    /// `F` must be the `vk::PFN_*` type matching `name`.
    pub unsafe fn get_capability<F: Copy>(&self, name: &str) -> Option<F> {
        self.device_table
            .get_capability(name)
            .or_else(|| self.instance_table.get_capability(name))
            .or_else(|| self.loader_table.get_capability(name))
    }

    /// Highest instance API version the loader supports (1.0 when unknown)
    pub fn instance_version(&self) -> u32 {
        let enumerate: Option<vk::PFN_vkEnumerateInstanceVersion> =
            unsafe { self.loader_table.get_capability("vkEnumerateInstanceVersion") };
        let Some(enumerate) = enumerate else {
            return vk::API_VERSION_1_0;
        };
        let mut version = 0;
        match unsafe { enumerate(&mut version) } {
            vk::Result::SUCCESS => version,
            _ => vk::API_VERSION_1_0,
        }
    }
}

#[cfg(test)]
#[path = "vulkan_loader_tests.rs"]
mod tests;
