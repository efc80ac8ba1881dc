// Main render pass
//
// One color attachment (presented) and one depth attachment, a single
// subpass. The handle survives swapchain recreation; only the render area
// follows the window size.

use ash::vk;

use super::command_buffer::CommandBuffer;
use super::error::BackendResult;
use super::utils;

/// Rectangle the pass renders into, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderArea {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl RenderArea {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn to_rect(self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D {
                x: self.x as i32,
                y: self.y as i32,
            },
            extent: vk::Extent2D {
                width: self.width as u32,
                height: self.height as u32,
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct RenderPass {
    pub handle: vk::RenderPass,
    pub render_area: RenderArea,
    pub clear_color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

impl RenderPass {
    pub fn create(
        device: &ash::Device,
        color_format: vk::Format,
        depth_format: vk::Format,
        render_area: RenderArea,
        clear_color: [f32; 4],
        depth: f32,
        stencil: u32,
    ) -> BackendResult<Self> {
        // Color attachment (the swapchain image)
        let color_attachment = vk::AttachmentDescription::builder()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();

        let depth_attachment = vk::AttachmentDescription::builder()
            .format(depth_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build();

        let color_attachment_ref = vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build();

        let depth_attachment_ref = vk::AttachmentReference::builder()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build();

        let color_attachments = &[color_attachment_ref];
        let subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(color_attachments)
            .depth_stencil_attachment(&depth_attachment_ref)
            .build();

        let dependency = vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .build();

        let attachments = &[color_attachment, depth_attachment];
        let subpasses = &[subpass];
        let dependencies = &[dependency];

        let render_pass_info = vk::RenderPassCreateInfo::builder()
            .attachments(attachments)
            .subpasses(subpasses)
            .dependencies(dependencies);

        let handle = unsafe { device.create_render_pass(&render_pass_info, None) }
            .map_err(|e| utils::log_failure("Failed to create render pass", e))?;
        log::info!("Vulkan render pass created");

        Ok(Self {
            handle,
            render_area,
            clear_color,
            depth,
            stencil,
        })
    }

    pub fn clear_values(&self) -> [vk::ClearValue; 2] {
        [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.depth,
                    stencil: self.stencil,
                },
            },
        ]
    }

    /// Begins the pass on `framebuffer` and moves the command buffer into the
    /// in-render-pass state.
    pub fn begin(
        &self,
        device: &ash::Device,
        command_buffer: &mut CommandBuffer,
        framebuffer: vk::Framebuffer,
    ) -> BackendResult<()> {
        command_buffer.enter_render_pass()?;

        let clear_values = self.clear_values();
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.handle)
            .framebuffer(framebuffer)
            .render_area(self.render_area.to_rect())
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(command_buffer.handle, &begin_info, vk::SubpassContents::INLINE);
        }
        Ok(())
    }

    pub fn end(&self, device: &ash::Device, command_buffer: &mut CommandBuffer) -> BackendResult<()> {
        command_buffer.leave_render_pass()?;
        unsafe { device.cmd_end_render_pass(command_buffer.handle) };
        Ok(())
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        if self.handle != vk::RenderPass::null() {
            unsafe { device.destroy_render_pass(self.handle, None) };
            self.handle = vk::RenderPass::null();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_area_to_rect() {
        let rect = RenderArea::new(0.0, 0.0, 1280.0, 720.0).to_rect();
        assert_eq!(rect.offset.x, 0);
        assert_eq!(rect.extent.width, 1280);
        assert_eq!(rect.extent.height, 720);
    }

    #[test]
    fn test_clear_values_layout() {
        let pass = RenderPass {
            clear_color: [0.0, 0.0, 0.2, 1.0],
            depth: 1.0,
            stencil: 0,
            ..Default::default()
        };
        let values = pass.clear_values();
        unsafe {
            assert_eq!(values[0].color.float32, [0.0, 0.0, 0.2, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
            assert_eq!(values[1].depth_stencil.stencil, 0);
        }
    }
}
