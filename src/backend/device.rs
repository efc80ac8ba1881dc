// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (first device meeting every requirement)
// - Logical device + graphics/present/transfer queue creation
// - Graphics command pool
// - Cached swapchain support and depth format for the selected GPU
// - Device memory bookkeeping (live allocation count)
//
// Selection runs over `PhysicalDeviceSnapshot`s, plain data captured from the
// driver, so the requirements logic is deterministic and testable without a GPU.

use ash::extensions::khr;
use ash::vk;
use std::cell::Cell;
use std::ffi::CStr;

use super::error::{BackendError, BackendResult};
use super::utils;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// What a physical device must offer to be selected.
#[derive(Debug, Clone)]
pub struct DeviceRequirements {
    pub graphics: bool,
    pub present: bool,
    pub compute: bool,
    pub transfer: bool,
    pub sampler_anisotropy: bool,
    pub discrete_gpu: bool,
    /// Device extensions; the swapchain extension is always required.
    pub extensions: Vec<String>,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self {
            graphics: true,
            present: true,
            compute: false,
            transfer: true,
            sampler_anisotropy: true,
            discrete_gpu: false,
            extensions: vec![swapchain_extension_name()],
        }
    }
}

impl DeviceRequirements {
    /// Adds the swapchain extension if the list does not carry it already.
    pub fn with_swapchain(mut self) -> Self {
        let swapchain = swapchain_extension_name();
        if !self.extensions.iter().any(|ext| *ext == swapchain) {
            self.extensions.insert(0, swapchain);
        }
        self
    }
}

fn swapchain_extension_name() -> String {
    khr::Swapchain::name().to_string_lossy().into_owned()
}

/// Queue family indices found on a physical device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
    pub transfer: Option<u32>,
    pub compute: Option<u32>,
}

impl QueueFamilyIndices {
    /// Unique families in graphics, present, transfer order.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(3);
        for family in [self.graphics, self.present, self.transfer].into_iter().flatten() {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        families
    }
}

/// One queue family as seen by selection.
#[derive(Clone, Copy, Debug)]
pub struct QueueFamilySnapshot {
    pub flags: vk::QueueFlags,
    pub supports_present: bool,
}

/// Surface formats, present modes and capabilities for a device/surface pair.
#[derive(Clone, Debug, Default)]
pub struct SwapchainSupportInfo {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportInfo {
    pub fn query(
        surface_loader: &khr::Surface,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> BackendResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            })
        }
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Everything selection needs to know about one enumerated device.
#[derive(Clone, Debug)]
pub struct PhysicalDeviceSnapshot {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub queue_families: Vec<QueueFamilySnapshot>,
    pub swapchain_support: SwapchainSupportInfo,
    pub extensions: Vec<String>,
    pub sampler_anisotropy: bool,
}

impl PhysicalDeviceSnapshot {
    /// Queries the driver for everything selection looks at.
    pub fn capture(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> BackendResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let features = unsafe { instance.get_physical_device_features(physical_device) };
        let family_properties =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        let mut queue_families = Vec::with_capacity(family_properties.len());
        for (index, family) in family_properties.iter().enumerate() {
            let supports_present = unsafe {
                surface_loader.get_physical_device_surface_support(
                    physical_device,
                    index as u32,
                    surface,
                )?
            };
            queue_families.push(QueueFamilySnapshot {
                flags: family.queue_flags,
                supports_present,
            });
        }

        let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device)? }
            .iter()
            .map(|ext| {
                unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();

        Ok(Self {
            name: device_name(&properties),
            device_type: properties.device_type,
            queue_families,
            swapchain_support: SwapchainSupportInfo::query(surface_loader, physical_device, surface)?,
            extensions,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
        })
    }
}

/// Why a device was passed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotDiscrete,
    MissingQueue(&'static str),
    NoSwapchainSupport,
    MissingExtension(String),
    NoSamplerAnisotropy,
}

/// Single pass over the queue families.
///
/// Graphics and compute take the first family carrying the bit. Present
/// prefers the graphics family when it can present, so the swapchain can stay
/// exclusive. Transfer takes the family with the fewest graphics/compute bits;
/// on a tie the earlier family is kept.
pub fn find_queue_families(families: &[QueueFamilySnapshot]) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();
    let mut min_transfer_score = u8::MAX;

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        let mut transfer_score = 0u8;

        if family.flags.contains(vk::QueueFlags::GRAPHICS) {
            if indices.graphics.is_none() {
                indices.graphics = Some(index);
            }
            transfer_score += 1;
        }

        if family.flags.contains(vk::QueueFlags::COMPUTE) {
            if indices.compute.is_none() {
                indices.compute = Some(index);
            }
            transfer_score += 1;
        }

        if family.flags.contains(vk::QueueFlags::TRANSFER) && transfer_score < min_transfer_score {
            min_transfer_score = transfer_score;
            indices.transfer = Some(index);
        }

        if family.supports_present && indices.present.is_none() {
            indices.present = Some(index);
        }
    }

    if let Some(graphics) = indices.graphics {
        if families[graphics as usize].supports_present {
            indices.present = Some(graphics);
        }
    }

    indices
}

/// Checks one device in order: discrete type, queues, swapchain support,
/// extensions, sampler anisotropy.
pub fn meets_requirements(
    snapshot: &PhysicalDeviceSnapshot,
    requirements: &DeviceRequirements,
) -> Result<QueueFamilyIndices, Rejection> {
    if requirements.discrete_gpu && snapshot.device_type != vk::PhysicalDeviceType::DISCRETE_GPU {
        return Err(Rejection::NotDiscrete);
    }

    let indices = find_queue_families(&snapshot.queue_families);

    log::info!("GRAPHICS | PRESENT | TRANSFER | COMPUTE | NAME");
    log::info!(
        "       {} |       {} |        {} |       {} | {}",
        indices.graphics.is_some() as u8,
        indices.present.is_some() as u8,
        indices.transfer.is_some() as u8,
        indices.compute.is_some() as u8,
        snapshot.name
    );

    let queue_checks = [
        (requirements.graphics, indices.graphics, "graphics"),
        (requirements.present, indices.present, "present"),
        (requirements.transfer, indices.transfer, "transfer"),
        (requirements.compute, indices.compute, "compute"),
    ];
    for (required, found, name) in queue_checks {
        if required && found.is_none() {
            return Err(Rejection::MissingQueue(name));
        }
    }

    if !snapshot.swapchain_support.is_adequate() {
        return Err(Rejection::NoSwapchainSupport);
    }

    for required in &requirements.extensions {
        if !snapshot.extensions.iter().any(|available| available == required) {
            return Err(Rejection::MissingExtension(required.clone()));
        }
    }

    if requirements.sampler_anisotropy && !snapshot.sampler_anisotropy {
        return Err(Rejection::NoSamplerAnisotropy);
    }

    Ok(indices)
}

/// Index of the first device meeting every requirement, with its queue families.
pub fn select_physical_device(
    snapshots: &[PhysicalDeviceSnapshot],
    requirements: &DeviceRequirements,
) -> Option<(usize, QueueFamilyIndices)> {
    for (index, snapshot) in snapshots.iter().enumerate() {
        match meets_requirements(snapshot, requirements) {
            Ok(indices) => {
                log::info!("Device {} meets requirements", snapshot.name);
                return Some((index, indices));
            }
            Err(reason) => {
                log::info!("Device {} rejected: {:?}", snapshot.name, reason);
            }
        }
    }
    None
}

/// First memory type allowed by `type_filter` that has all of `flags`.
pub fn find_memory_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        (type_filter & (1 << i)) != 0
            && memory_properties.memory_types[i as usize]
                .property_flags
                .contains(flags)
    })
}

/// First candidate whose linear or optimal tiling supports depth-stencil attachment.
pub fn pick_depth_format<F>(candidates: &[vk::Format], mut format_properties: F) -> Option<vk::Format>
where
    F: FnMut(vk::Format) -> vk::FormatProperties,
{
    let required = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
    candidates.iter().copied().find(|&format| {
        let properties = format_properties(format);
        properties.linear_tiling_features.contains(required)
            || properties.optimal_tiling_features.contains(required)
    })
}

fn device_name(properties: &vk::PhysicalDeviceProperties) -> String {
    unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated",
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "Unknown",
    }
}

/// Resolved queue family indices of the created device.
#[derive(Clone, Copy, Debug)]
pub struct QueueIndices {
    pub graphics: u32,
    pub present: u32,
    pub transfer: u32,
    pub compute: Option<u32>,
}

/// Logical device plus the state derived from the selected GPU.
///
/// The physical device is enumerated, not owned. The logical device and the
/// graphics command pool are destroyed on drop, which must happen after every
/// object created from them.
pub struct Device {
    pub physical_device: vk::PhysicalDevice,
    pub logical_device: ash::Device,
    pub swapchain_loader: khr::Swapchain,
    pub queue_indices: QueueIndices,

    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub transfer_queue: vk::Queue,
    pub graphics_command_pool: vk::CommandPool,

    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,

    instance: ash::Instance,
    swapchain_support: SwapchainSupportInfo,
    depth_format: vk::Format,
    live_allocations: Cell<usize>,
}

impl Device {
    /// Selects a physical device and creates the logical device on it.
    pub fn create(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
        requirements: &DeviceRequirements,
    ) -> BackendResult<Self> {
        let physical_devices = unsafe { instance.enumerate_physical_devices()? };
        if physical_devices.is_empty() {
            log::error!("No Vulkan-capable GPU found");
            return Err(BackendError::NoSuitableDevice);
        }

        let mut snapshots = Vec::with_capacity(physical_devices.len());
        for &physical_device in &physical_devices {
            snapshots.push(PhysicalDeviceSnapshot::capture(
                instance,
                surface_loader,
                surface,
                physical_device,
            )?);
        }

        let (selected, indices) = select_physical_device(&snapshots, requirements).ok_or_else(|| {
            log::error!("No physical devices were found which meet the requirements!");
            BackendError::NoSuitableDevice
        })?;

        let physical_device = physical_devices[selected];
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let features = unsafe { instance.get_physical_device_features(physical_device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };
        log_selected_device(&properties, &memory_properties);

        // Queue requirements passed, but unrequested families may still be absent.
        let graphics = indices.graphics.ok_or(BackendError::NoSuitableDevice)?;
        let queue_indices = QueueIndices {
            graphics,
            present: indices.present.unwrap_or(graphics),
            transfer: indices.transfer.unwrap_or(graphics),
            compute: indices.compute,
        };
        log::debug!("Queue families: {:?}", queue_indices);

        log::info!("Creating logical device...");
        let unique = QueueFamilyIndices {
            graphics: Some(queue_indices.graphics),
            present: Some(queue_indices.present),
            transfer: Some(queue_indices.transfer),
            compute: None,
        }
        .unique_families();

        let queue_priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let enabled_features = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: if requirements.sampler_anisotropy { vk::TRUE } else { vk::FALSE },
            fill_mode_non_solid: features.fill_mode_non_solid,
            ..Default::default()
        };

        let extension_names: Vec<std::ffi::CString> = requirements
            .extensions
            .iter()
            .map(|name| std::ffi::CString::new(name.as_str()))
            .collect::<Result<_, _>>()
            .map_err(|e| BackendError::InvalidConfig(format!("device extension name: {}", e)))?;
        let extension_ptrs: Vec<*const std::os::raw::c_char> =
            extension_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&enabled_features);

        let logical_device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .map_err(|e| utils::log_failure("Failed to create Vulkan device", e))?;
        log::info!("Logical device created");

        let graphics_queue = unsafe { logical_device.get_device_queue(queue_indices.graphics, 0) };
        let present_queue = unsafe { logical_device.get_device_queue(queue_indices.present, 0) };
        let transfer_queue = unsafe { logical_device.get_device_queue(queue_indices.transfer, 0) };

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_indices.graphics)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let graphics_command_pool = match unsafe { logical_device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { logical_device.destroy_device(None) };
                return Err(utils::log_failure("Failed to create graphics command pool", e).into());
            }
        };
        log::info!("Graphics command pool created");

        let swapchain_loader = khr::Swapchain::new(instance, &logical_device);

        Ok(Self {
            physical_device,
            logical_device,
            swapchain_loader,
            queue_indices,
            graphics_queue,
            present_queue,
            transfer_queue,
            graphics_command_pool,
            properties,
            features,
            memory_properties,
            instance: instance.clone(),
            swapchain_support: snapshots.swap_remove(selected).swapchain_support,
            depth_format: vk::Format::UNDEFINED,
            live_allocations: Cell::new(0),
        })
    }

    /// Re-queries surface support. Capabilities change with the window size,
    /// so this runs before every swapchain (re)creation.
    pub fn query_swapchain_support(
        &mut self,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> BackendResult<()> {
        self.swapchain_support = SwapchainSupportInfo::query(surface_loader, self.physical_device, surface)?;
        Ok(())
    }

    pub fn swapchain_support(&self) -> &SwapchainSupportInfo {
        &self.swapchain_support
    }

    /// Finds and caches the depth format. Fatal when none is supported.
    pub fn detect_depth_format(&mut self) -> BackendResult<vk::Format> {
        let instance = &self.instance;
        let physical_device = self.physical_device;
        let found = pick_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| unsafe {
            instance.get_physical_device_format_properties(physical_device, format)
        });

        match found {
            Some(format) => {
                self.depth_format = format;
                log::debug!("Depth format: {:?}", format);
                Ok(format)
            }
            None => {
                self.depth_format = vk::Format::UNDEFINED;
                log::error!("Failed to find supported depth format");
                Err(BackendError::UnsupportedDepthFormat)
            }
        }
    }

    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    pub fn find_memory_index(&self, type_filter: u32, flags: vk::MemoryPropertyFlags) -> Option<u32> {
        find_memory_index(&self.memory_properties, type_filter, flags)
    }

    /// Allocates device memory and counts it as live.
    pub fn allocate_memory(&self, size: vk::DeviceSize, memory_type_index: u32) -> BackendResult<vk::DeviceMemory> {
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { self.logical_device.allocate_memory(&alloc_info, None) }
            .map_err(|e| utils::log_failure("Device memory allocation failed", e))?;
        self.live_allocations.set(self.live_allocations.get() + 1);
        Ok(memory)
    }

    /// Frees memory obtained from `allocate_memory`. Null handles are ignored.
    pub fn free_memory(&self, memory: vk::DeviceMemory) {
        if memory == vk::DeviceMemory::null() {
            return;
        }
        unsafe { self.logical_device.free_memory(memory, None) };
        self.live_allocations.set(self.live_allocations.get().saturating_sub(1));
    }

    /// Number of device memory allocations not yet freed.
    pub fn allocation_count(&self) -> usize {
        self.live_allocations.get()
    }

    /// Blocks until the device has finished all submitted work.
    pub fn wait_idle(&self) -> BackendResult<()> {
        unsafe { self.logical_device.device_wait_idle() }
            .map_err(|e| utils::log_failure("vkDeviceWaitIdle failed", e))?;
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if self.live_allocations.get() != 0 {
            log::warn!(
                "Destroying device with {} live memory allocations",
                self.live_allocations.get()
            );
        }

        log::info!("Destroying command pools...");
        unsafe {
            self.logical_device
                .destroy_command_pool(self.graphics_command_pool, None);
        }

        log::info!("Destroying logical device...");
        unsafe { self.logical_device.destroy_device(None) };
    }
}

fn log_selected_device(
    properties: &vk::PhysicalDeviceProperties,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
) {
    log::info!("Selected GPU: {}", device_name(properties));
    log::info!("GPU type is {}", device_type_name(properties.device_type));
    log::info!(
        "GPU driver version: {}.{}.{}",
        vk::api_version_major(properties.driver_version),
        vk::api_version_minor(properties.driver_version),
        vk::api_version_patch(properties.driver_version)
    );
    log::info!(
        "Vulkan API version: {}.{}.{}",
        vk::api_version_major(properties.api_version),
        vk::api_version_minor(properties.api_version),
        vk::api_version_patch(properties.api_version)
    );

    let heaps = &memory_properties.memory_heaps[..memory_properties.memory_heap_count as usize];
    for heap in heaps {
        let gib = heap.size as f64 / (1024.0 * 1024.0 * 1024.0);
        if heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL) {
            log::info!("Local GPU memory: {:.2} GiB", gib);
        } else {
            log::info!("Shared system memory: {:.2} GiB", gib);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, supports_present: bool) -> QueueFamilySnapshot {
        QueueFamilySnapshot { flags, supports_present }
    }

    fn adequate_support() -> SwapchainSupportInfo {
        SwapchainSupportInfo {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    fn snapshot(name: &str, device_type: vk::PhysicalDeviceType) -> PhysicalDeviceSnapshot {
        PhysicalDeviceSnapshot {
            name: name.to_string(),
            device_type,
            queue_families: vec![
                family(
                    vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                    true,
                ),
            ],
            swapchain_support: adequate_support(),
            extensions: vec![swapchain_extension_name()],
            sampler_anisotropy: true,
        }
    }

    #[test]
    fn test_transfer_prefers_dedicated_family() {
        let families = [
            family(
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                true,
            ),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, false),
            family(vk::QueueFlags::TRANSFER, false),
        ];
        let indices = find_queue_families(&families);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.compute, Some(0));
        assert_eq!(indices.transfer, Some(2));
        assert_eq!(indices.present, Some(0));
    }

    #[test]
    fn test_transfer_tie_keeps_first_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, true),
            family(vk::QueueFlags::TRANSFER, false),
            family(vk::QueueFlags::TRANSFER, false),
        ];
        assert_eq!(find_queue_families(&families).transfer, Some(1));
    }

    #[test]
    fn test_present_prefers_graphics_family() {
        let families = [
            family(vk::QueueFlags::TRANSFER, true),
            family(vk::QueueFlags::GRAPHICS, true),
        ];
        let indices = find_queue_families(&families);
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
    }

    #[test]
    fn test_present_on_separate_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, false),
            family(vk::QueueFlags::TRANSFER, true),
        ];
        let indices = find_queue_families(&families);
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(1));
        assert_eq!(indices.unique_families(), vec![0, 1]);
    }

    #[test]
    fn test_rejects_non_discrete_when_required() {
        let requirements = DeviceRequirements {
            discrete_gpu: true,
            ..Default::default()
        };
        let integrated = snapshot("iGPU", vk::PhysicalDeviceType::INTEGRATED_GPU);
        assert_eq!(meets_requirements(&integrated, &requirements), Err(Rejection::NotDiscrete));
    }

    #[test]
    fn test_rejects_missing_queue() {
        let mut device = snapshot("compute-only", vk::PhysicalDeviceType::DISCRETE_GPU);
        device.queue_families = vec![family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, true)];
        assert_eq!(
            meets_requirements(&device, &DeviceRequirements::default()),
            Err(Rejection::MissingQueue("graphics"))
        );
    }

    #[test]
    fn test_rejects_empty_swapchain_support() {
        let mut device = snapshot("headless", vk::PhysicalDeviceType::DISCRETE_GPU);
        device.swapchain_support.present_modes.clear();
        assert_eq!(
            meets_requirements(&device, &DeviceRequirements::default()),
            Err(Rejection::NoSwapchainSupport)
        );
    }

    #[test]
    fn test_rejects_missing_extension() {
        let mut device = snapshot("no-swapchain", vk::PhysicalDeviceType::DISCRETE_GPU);
        device.extensions.clear();
        assert_eq!(
            meets_requirements(&device, &DeviceRequirements::default()),
            Err(Rejection::MissingExtension(swapchain_extension_name()))
        );
    }

    #[test]
    fn test_rejects_missing_anisotropy() {
        let mut device = snapshot("old", vk::PhysicalDeviceType::DISCRETE_GPU);
        device.sampler_anisotropy = false;
        assert_eq!(
            meets_requirements(&device, &DeviceRequirements::default()),
            Err(Rejection::NoSamplerAnisotropy)
        );
    }

    #[test]
    fn test_selection_is_first_match_and_deterministic() {
        let mut broken = snapshot("broken", vk::PhysicalDeviceType::DISCRETE_GPU);
        broken.extensions.clear();
        let devices = vec![
            broken,
            snapshot("first-good", vk::PhysicalDeviceType::INTEGRATED_GPU),
            snapshot("second-good", vk::PhysicalDeviceType::DISCRETE_GPU),
        ];
        let requirements = DeviceRequirements::default();

        let first = select_physical_device(&devices, &requirements);
        assert_eq!(first.map(|(index, _)| index), Some(1));
        for _ in 0..10 {
            assert_eq!(select_physical_device(&devices, &requirements), first);
        }
    }

    #[test]
    fn test_selection_fails_when_nothing_fits() {
        let requirements = DeviceRequirements {
            discrete_gpu: true,
            ..Default::default()
        };
        let devices = vec![snapshot("iGPU", vk::PhysicalDeviceType::INTEGRATED_GPU)];
        assert!(select_physical_device(&devices, &requirements).is_none());
    }

    #[test]
    fn test_with_swapchain_adds_extension_once() {
        let requirements = DeviceRequirements {
            extensions: vec!["VK_KHR_maintenance1".to_string()],
            ..Default::default()
        }
        .with_swapchain()
        .with_swapchain();
        assert_eq!(requirements.extensions.len(), 2);
        assert_eq!(requirements.extensions[0], swapchain_extension_name());
    }

    #[test]
    fn test_find_memory_index() {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        properties.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        properties.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        properties.memory_types[2].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL
            | vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT;

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_index(&properties, 0b111, host), Some(1));
        assert_eq!(find_memory_index(&properties, 0b101, host), Some(2));
        assert_eq!(find_memory_index(&properties, 0b001, host), None);
    }

    #[test]
    fn test_pick_depth_format_order() {
        let picked = pick_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
            if format == vk::Format::D32_SFLOAT {
                vk::FormatProperties::default()
            } else {
                vk::FormatProperties {
                    optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                    ..Default::default()
                }
            }
        });
        assert_eq!(picked, Some(vk::Format::D32_SFLOAT_S8_UINT));
    }

    #[test]
    fn test_pick_depth_format_none_supported() {
        let picked = pick_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| vk::FormatProperties::default());
        assert_eq!(picked, None);
    }
}
