// Swapchain - Window presentation
//
// Owns the presentable image views, the shared depth attachment and one
// framebuffer per image. Recreation happens in place: the struct survives,
// every handle inside it is rebuilt.

use ash::extensions::khr;
use ash::vk;

use super::device::Device;
use super::error::{BackendError, BackendResult};
use super::framebuffer::Framebuffer;
use super::image::{Image, ImageDesc};
use super::render_pass::RenderPass;
use super::utils;

/// Prefers BGRA8 unorm with sRGB non-linear color space, else the first format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

/// MAILBOX when available and preferred; FIFO otherwise, which is always supported.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR], prefer_mailbox: bool) -> vk::PresentModeKHR {
    if prefer_mailbox && present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// The surface's current extent when it dictates one, else the requested
/// size clamped to the supported range.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// `choose_extent`, or `None` while the surface has no area. A minimized
/// window reports a 0x0 current extent no matter what size was requested.
pub fn usable_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> Option<vk::Extent2D> {
    let extent = choose_extent(capabilities, width, height);
    (extent.width > 0 && extent.height > 0).then_some(extent)
}

/// One more than the minimum, capped by the maximum when the surface has one.
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        image_count = capabilities.max_image_count;
    }
    image_count
}

/// Frames in flight for a swapchain of `image_count` images (at least one).
pub fn frames_in_flight_for(image_count: u32) -> u32 {
    image_count.saturating_sub(1).max(1)
}

/// CONCURRENT with both families when graphics and present differ, else EXCLUSIVE.
pub fn sharing_mode_for(graphics_family: u32, present_family: u32) -> (vk::SharingMode, Vec<u32>) {
    if graphics_family != present_family {
        (vk::SharingMode::CONCURRENT, vec![graphics_family, present_family])
    } else {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    }
}

#[derive(Debug, Default)]
pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub framebuffers: Vec<Framebuffer>,
    pub depth_attachment: Image,
    pub image_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub frames_in_flight: u32,
    prefer_mailbox: bool,
}

impl Swapchain {
    pub fn create(
        device: &mut Device,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        prefer_mailbox: bool,
    ) -> BackendResult<Self> {
        log::info!("Creating swapchain: {}x{}", width, height);
        device.query_swapchain_support(surface_loader, surface)?;
        let extent = usable_extent(&device.swapchain_support().capabilities, width, height)
            .ok_or_else(|| BackendError::Surface("surface has no area, cannot create swapchain".into()))?;

        let mut swapchain = Self {
            prefer_mailbox,
            ..Default::default()
        };
        if let Err(e) = swapchain.create_internal(device, surface, extent) {
            swapchain.destroy(device);
            return Err(e);
        }
        Ok(swapchain)
    }

    /// Rebuilds the internal state at the size the surface now allows.
    /// Returns false, with the old swapchain left intact, while the surface
    /// has no area. Framebuffers are destroyed on a rebuild and must be
    /// regenerated by the caller.
    pub fn recreate(
        &mut self,
        device: &mut Device,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> BackendResult<bool> {
        // Capabilities follow the window size
        device.query_swapchain_support(surface_loader, surface)?;
        let Some(extent) = usable_extent(&device.swapchain_support().capabilities, width, height) else {
            log::debug!("Surface has no area, deferring swapchain recreation");
            return Ok(false);
        };

        log::info!("Recreating swapchain: {}x{}", extent.width, extent.height);
        self.destroy(device);
        if let Err(e) = self.create_internal(device, surface, extent) {
            self.destroy(device);
            return Err(e);
        }
        Ok(true)
    }

    /// Expects swapchain support to have been queried for `surface`.
    fn create_internal(&mut self, device: &mut Device, surface: vk::SurfaceKHR, extent: vk::Extent2D) -> BackendResult<()> {
        let support = device.swapchain_support().clone();

        let surface_format = choose_surface_format(&support.formats)
            .ok_or_else(|| BackendError::Surface("no surface formats available".into()))?;
        let present_mode = choose_present_mode(&support.present_modes, self.prefer_mailbox);
        let image_count = determine_image_count(&support.capabilities);
        log::info!("Present mode: {:?}", present_mode);

        let (sharing_mode, queue_families) =
            sharing_mode_for(device.queue_indices.graphics, device.queue_indices.present);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&queue_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        self.handle = unsafe { device.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| utils::log_failure("Failed to create swapchain", e))?;
        self.image_format = surface_format;
        self.present_mode = present_mode;
        self.extent = extent;

        self.images = unsafe { device.swapchain_loader.get_swapchain_images(self.handle) }?;
        self.frames_in_flight = frames_in_flight_for(self.images.len() as u32);
        log::info!(
            "Created swapchain with {} images, {} frames in flight",
            self.images.len(),
            self.frames_in_flight
        );

        self.views = Vec::with_capacity(self.images.len());
        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe { device.logical_device.create_image_view(&view_info, None) }
                .map_err(|e| utils::log_failure("Failed to create swapchain image view", e))?;
            self.views.push(view);
        }

        let depth_format = device.detect_depth_format()?;
        self.depth_attachment = Image::create(device, &ImageDesc::depth(extent.width, extent.height, depth_format))?;

        Ok(())
    }

    /// Rebuilds one framebuffer per image from its color view and the shared depth view.
    pub fn regenerate_framebuffers(
        &mut self,
        device: &ash::Device,
        render_pass: &RenderPass,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        self.destroy_framebuffers(device);

        for &view in &self.views {
            let attachments = vec![view, self.depth_attachment.view];
            let framebuffer = Framebuffer::create(device, render_pass.handle, width, height, attachments)?;
            self.framebuffers.push(framebuffer);
        }
        log::debug!("Regenerated {} framebuffers", self.framebuffers.len());
        Ok(())
    }

    pub fn destroy_framebuffers(&mut self, device: &ash::Device) {
        for framebuffer in &mut self.framebuffers {
            framebuffer.destroy(device);
        }
        self.framebuffers.clear();
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquires the next image. `Ok(None)` means the swapchain is out of date
    /// and must be recreated before the frame can go on.
    pub fn acquire_next_image_index(
        &self,
        device: &Device,
        timeout_ns: u64,
        image_available: vk::Semaphore,
        fence: vk::Fence,
    ) -> BackendResult<Option<u32>> {
        let result = unsafe {
            device
                .swapchain_loader
                .acquire_next_image(self.handle, timeout_ns, image_available, fence)
        };

        match result {
            Ok((index, _suboptimal)) => Ok(Some(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
            Err(e) => Err(utils::log_failure("Failed to acquire swapchain image", e).into()),
        }
    }

    /// Presents `image_index` once `render_complete` signals. Returns true
    /// when the swapchain is out of date or suboptimal and needs recreating.
    pub fn present(
        &self,
        device: &Device,
        present_queue: vk::Queue,
        render_complete: vk::Semaphore,
        image_index: u32,
    ) -> BackendResult<bool> {
        let wait_semaphores = [render_complete];
        let swapchains = [self.handle];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { device.swapchain_loader.queue_present(present_queue, &present_info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(utils::log_failure("Failed to present swapchain image", e).into()),
        }
    }

    /// Destroys framebuffers, depth attachment, views and the swapchain.
    /// Waits for the device first. Safe to call on a partially built swapchain.
    pub fn destroy(&mut self, device: &Device) {
        if let Err(e) = device.wait_idle() {
            log::warn!("Device wait before swapchain teardown failed: {}", e);
        }

        let logical = &device.logical_device;
        self.destroy_framebuffers(logical);
        self.depth_attachment.destroy(device);

        for view in self.views.drain(..) {
            unsafe { logical.destroy_image_view(view, None) };
        }
        self.images.clear();

        if self.handle != vk::SwapchainKHR::null() {
            unsafe { device.swapchain_loader.destroy_swapchain(self.handle, None) };
            self.handle = vk::SwapchainKHR::null();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_surface_format_preference() {
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let bgra = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_surface_format(&[srgb, bgra]), Some(bgra));
        assert_eq!(choose_surface_format(&[srgb]), Some(srgb));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn test_present_mode_preference() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::FIFO);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE], true),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_extent_clamped_when_surface_undefined() {
        let caps = capabilities(2, 0);
        let extent = choose_extent(&caps, 8000, 0);
        assert_eq!(extent.width, 4096);
        assert_eq!(extent.height, 1);
        let extent = choose_extent(&caps, 1280, 720);
        assert_eq!((extent.width, extent.height), (1280, 720));
    }

    #[test]
    fn test_extent_follows_surface() {
        let mut caps = capabilities(2, 0);
        caps.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let extent = choose_extent(&caps, 1280, 720);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_minimized_surface_has_no_usable_extent() {
        let mut caps = capabilities(2, 0);
        caps.current_extent = vk::Extent2D { width: 0, height: 0 };
        // The requested size is still the last nonzero window size
        assert_eq!(usable_extent(&caps, 1280, 720), None);

        caps.current_extent = vk::Extent2D { width: 640, height: 0 };
        assert_eq!(usable_extent(&caps, 1280, 720), None);

        caps.current_extent = vk::Extent2D { width: 640, height: 480 };
        assert_eq!(usable_extent(&caps, 1280, 720), Some(vk::Extent2D { width: 640, height: 480 }));
    }

    #[test]
    fn test_image_count() {
        assert_eq!(determine_image_count(&capabilities(2, 0)), 3);
        assert_eq!(determine_image_count(&capabilities(2, 8)), 3);
        assert_eq!(determine_image_count(&capabilities(3, 3)), 3);
        assert_eq!(frames_in_flight_for(3), 2);
        assert_eq!(frames_in_flight_for(1), 1);
    }

    #[test]
    fn test_sharing_mode() {
        assert_eq!(sharing_mode_for(0, 0), (vk::SharingMode::EXCLUSIVE, vec![]));
        assert_eq!(sharing_mode_for(0, 2), (vk::SharingMode::CONCURRENT, vec![0, 2]));
    }
}
