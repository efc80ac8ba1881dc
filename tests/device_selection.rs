// Physical device selection over captured device snapshots.

use ash::vk;
use hearth_renderer::backend::device::{
    find_queue_families, pick_depth_format, select_physical_device, PhysicalDeviceSnapshot,
    QueueFamilySnapshot, SwapchainSupportInfo, DEPTH_FORMAT_CANDIDATES,
};
use hearth_renderer::backend::DeviceRequirements;

fn family(flags: vk::QueueFlags, supports_present: bool) -> QueueFamilySnapshot {
    QueueFamilySnapshot {
        flags,
        supports_present,
    }
}

fn all_queues() -> vk::QueueFlags {
    vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER
}

fn device(name: &str, device_type: vk::PhysicalDeviceType) -> PhysicalDeviceSnapshot {
    PhysicalDeviceSnapshot {
        name: name.to_string(),
        device_type,
        queue_families: vec![family(all_queues(), true)],
        swapchain_support: SwapchainSupportInfo {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        },
        extensions: vec!["VK_KHR_swapchain".to_string()],
        sampler_anisotropy: true,
    }
}

#[test]
fn test_discrete_requirement_skips_integrated() {
    let devices = [
        device("Integrated", vk::PhysicalDeviceType::INTEGRATED_GPU),
        device("Discrete", vk::PhysicalDeviceType::DISCRETE_GPU),
    ];

    let requirements = DeviceRequirements {
        discrete_gpu: true,
        ..Default::default()
    };
    let (index, _) = select_physical_device(&devices, &requirements).unwrap();
    assert_eq!(devices[index].name, "Discrete");

    let (index, _) = select_physical_device(&devices, &DeviceRequirements::default()).unwrap();
    assert_eq!(devices[index].name, "Integrated");
}

#[test]
fn test_selection_is_deterministic() {
    let mut second = device("Second", vk::PhysicalDeviceType::DISCRETE_GPU);
    second.queue_families.push(family(vk::QueueFlags::TRANSFER, false));
    let devices = [device("First", vk::PhysicalDeviceType::DISCRETE_GPU), second];

    let requirements = DeviceRequirements::default();
    let first_pick = select_physical_device(&devices, &requirements).map(|(i, _)| i);
    for _ in 0..10 {
        assert_eq!(select_physical_device(&devices, &requirements).map(|(i, _)| i), first_pick);
    }
    assert_eq!(first_pick, Some(0));
}

#[test]
fn test_no_device_meets_requirements() {
    let mut no_present = device("Headless", vk::PhysicalDeviceType::DISCRETE_GPU);
    no_present.queue_families = vec![family(all_queues(), false)];
    let mut no_swapchain = device("Bare", vk::PhysicalDeviceType::DISCRETE_GPU);
    no_swapchain.extensions.clear();

    let devices = [no_present, no_swapchain];
    assert!(select_physical_device(&devices, &DeviceRequirements::default()).is_none());
}

#[test]
fn test_dedicated_transfer_family() {
    let families = [
        family(all_queues(), true),
        family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, false),
        family(vk::QueueFlags::TRANSFER, false),
        family(vk::QueueFlags::TRANSFER | vk::QueueFlags::SPARSE_BINDING, false),
    ];
    let indices = find_queue_families(&families);
    assert_eq!(indices.graphics, Some(0));
    assert_eq!(indices.present, Some(0));
    assert_eq!(indices.compute, Some(0));
    assert_eq!(indices.transfer, Some(2));
    assert_eq!(indices.unique_families(), vec![0, 2]);
}

#[test]
fn test_depth_format_falls_through_candidates() {
    let chosen = pick_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
        if format == vk::Format::D24_UNORM_S8_UINT {
            vk::FormatProperties {
                optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            }
        } else {
            vk::FormatProperties::default()
        }
    });
    assert_eq!(chosen, Some(vk::Format::D24_UNORM_S8_UINT));

    let none = pick_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| vk::FormatProperties::default());
    assert_eq!(none, None);
}
