// Framebuffer - image views bound to the main render pass at a fixed size

use ash::vk;

use super::error::BackendResult;
use super::utils;

#[derive(Debug, Default)]
pub struct Framebuffer {
    pub handle: vk::Framebuffer,
    /// Borrowed views; the swapchain owns them.
    pub attachments: Vec<vk::ImageView>,
    pub render_pass: vk::RenderPass,
}

impl Framebuffer {
    pub fn create(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        width: u32,
        height: u32,
        attachments: Vec<vk::ImageView>,
    ) -> BackendResult<Self> {
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(width)
            .height(height)
            .layers(1);

        let handle = unsafe { device.create_framebuffer(&framebuffer_info, None) }
            .map_err(|e| utils::log_failure("Failed to create framebuffer", e))?;

        Ok(Self {
            handle,
            attachments,
            render_pass,
        })
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        if self.handle != vk::Framebuffer::null() {
            unsafe { device.destroy_framebuffer(self.handle, None) };
            self.handle = vk::Framebuffer::null();
        }
        self.attachments.clear();
        self.render_pass = vk::RenderPass::null();
    }
}
