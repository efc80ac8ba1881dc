// Image - device-local image with its memory and an optional view
//
// Used for the swapchain depth attachment.

use ash::vk;

use super::device::Device;
use super::error::{BackendError, BackendResult};
use super::utils;

#[derive(Debug, Default)]
pub struct Image {
    pub handle: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub aspect: vk::ImageAspectFlags,
}

/// Parameters for `Image::create`.
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub memory_flags: vk::MemoryPropertyFlags,
    pub create_view: bool,
    pub aspect: vk::ImageAspectFlags,
}

impl ImageDesc {
    /// Depth attachment of the given size.
    pub fn depth(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            width,
            height,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            memory_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            create_view: true,
            aspect: vk::ImageAspectFlags::DEPTH,
        }
    }
}

impl Image {
    /// Creates the image, allocates and binds its memory, and creates a view
    /// when asked. Anything created before a failure is released again.
    pub fn create(device: &Device, desc: &ImageDesc) -> BackendResult<Self> {
        let mut image = Self {
            width: desc.width,
            height: desc.height,
            format: desc.format,
            aspect: desc.aspect,
            ..Default::default()
        };

        if let Err(e) = image.create_inner(device, desc) {
            image.destroy(device);
            return Err(e);
        }
        Ok(image)
    }

    fn create_inner(&mut self, device: &Device, desc: &ImageDesc) -> BackendResult<()> {
        let logical = &device.logical_device;

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(desc.format)
            .tiling(desc.tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        self.handle = unsafe { logical.create_image(&image_info, None) }
            .map_err(|e| utils::log_failure("Failed to create image", e))?;

        let mem_requirements = unsafe { logical.get_image_memory_requirements(self.handle) };
        let memory_type = device
            .find_memory_index(mem_requirements.memory_type_bits, desc.memory_flags)
            .ok_or_else(|| {
                log::error!("Required memory type for image not found");
                BackendError::NoMemoryType
            })?;

        self.memory = device.allocate_memory(mem_requirements.size, memory_type)?;
        unsafe { logical.bind_image_memory(self.handle, self.memory, 0) }
            .map_err(|e| utils::log_failure("Failed to bind image memory", e))?;

        if desc.create_view {
            self.create_view(logical)?;
        }
        Ok(())
    }

    pub fn create_view(&mut self, device: &ash::Device) -> BackendResult<()> {
        let view_info = vk::ImageViewCreateInfo::builder()
            .image(self.handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: self.aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        self.view = unsafe { device.create_image_view(&view_info, None) }
            .map_err(|e| utils::log_failure("Failed to create image view", e))?;
        Ok(())
    }

    pub fn destroy(&mut self, device: &Device) {
        let logical = &device.logical_device;
        unsafe {
            if self.view != vk::ImageView::null() {
                logical.destroy_image_view(self.view, None);
                self.view = vk::ImageView::null();
            }
            if self.handle != vk::Image::null() {
                logical.destroy_image(self.handle, None);
                self.handle = vk::Image::null();
            }
        }
        device.free_memory(self.memory);
        self.memory = vk::DeviceMemory::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_desc() {
        let desc = ImageDesc::depth(640, 480, vk::Format::D32_SFLOAT);
        assert!(desc.create_view);
        assert_eq!(desc.aspect, vk::ImageAspectFlags::DEPTH);
        assert!(desc.usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT));
        assert_eq!(desc.memory_flags, vk::MemoryPropertyFlags::DEVICE_LOCAL);
    }
}
