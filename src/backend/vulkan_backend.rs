// Vulkan backend - what the renderer frontend drives
//
// Frame sequencing lives in `frame_protocol`; this file issues the Vulkan
// calls behind each step.

use ash::vk;
use glam::{Mat4, Vec3, Vec4};

use super::command_buffer::{CommandBuffer, CommandBufferState};
use super::context::{BackendConfig, Context};
use super::error::{BackendError, BackendResult};
use super::frame::FrameState;
use super::frame_protocol::{self, FrameOps, RebuiltSwapchain};
use super::render_pass::RenderArea;
use super::sync::{Fence, FrameSync, Semaphore};
use super::utils;
use crate::platform::PlatformSurface;

pub struct VulkanBackend {
    context: Context,
}

impl VulkanBackend {
    pub fn initialize(
        app_name: &str,
        width: u32,
        height: u32,
        platform: &dyn PlatformSurface,
        config: BackendConfig,
    ) -> BackendResult<Self> {
        let context = Context::create(app_name, width, height, platform, config)?;
        Ok(Self { context })
    }

    /// Waits for the device and destroys everything in reverse creation order.
    pub fn shutdown(self) {
        drop(self);
    }

    /// Caches the new size; the swapchain is rebuilt by the next `begin_frame`.
    pub fn on_resized(&mut self, width: u32, height: u32) {
        log::info!("Vulkan backend resized: {}x{}", width, height);
        self.context.frame.on_resized(width, height);
    }

    pub fn begin_frame(&mut self, delta_time: f32) -> BackendResult<bool> {
        log::trace!("begin_frame dt={}", delta_time);
        frame_protocol::begin_frame(&mut self.context)
    }

    /// Uploads the per-frame globals and binds the object shader. Only valid
    /// between a successful `begin_frame` and its `end_frame`.
    pub fn update_global_state(
        &mut self,
        projection: Mat4,
        view: Mat4,
        _view_position: Vec3,
        _ambient_color: Vec4,
        _mode: i32,
    ) -> BackendResult<()> {
        let ctx = &mut self.context;
        let slot = ctx.frame.current_frame;
        let command_buffer = command_buffer_mut(&mut ctx.graphics_command_buffers, ctx.frame.image_index as usize)?;
        if command_buffer.state() != CommandBufferState::InRenderPass {
            return Err(BackendError::InvalidState(
                "update_global_state called outside begin_frame/end_frame".into(),
            ));
        }

        ctx.object_shader.use_shader(&ctx.device, command_buffer);
        ctx.object_shader.global_ubo.projection = projection;
        ctx.object_shader.global_ubo.view = view;
        ctx.object_shader
            .update_global_state(&ctx.device, command_buffer, slot)
    }

    pub fn end_frame(&mut self, delta_time: f32) -> BackendResult<bool> {
        log::trace!("end_frame dt={}", delta_time);
        frame_protocol::end_frame(&mut self.context)
    }

    /// Blocks until the GPU is idle (application suspend).
    pub fn wait_idle(&self) -> BackendResult<()> {
        self.context.device.wait_idle()
    }

    pub fn frame_count(&self) -> u64 {
        self.context.frame.frame_count()
    }

    pub fn render_area(&self) -> RenderArea {
        self.context.main_render_pass.render_area
    }

    pub fn current_frame(&self) -> usize {
        self.context.frame.current_frame
    }

    pub fn frames_in_flight(&self) -> usize {
        self.context.frame.frames_in_flight()
    }

    pub fn allocation_count(&self) -> usize {
        self.context.device.allocation_count()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl FrameOps for Context {
    fn frame(&self) -> &FrameState {
        &self.frame
    }

    fn frame_mut(&mut self) -> &mut FrameState {
        &mut self.frame
    }

    fn wait_idle(&mut self) -> BackendResult<()> {
        self.device.wait_idle()
    }

    fn wait_fence(&mut self, slot: usize) -> BackendResult<bool> {
        let logical = &self.device.logical_device;
        fence_mut(&mut self.sync, slot)?.wait(logical, u64::MAX)
    }

    fn reset_fence(&mut self, slot: usize) -> BackendResult<()> {
        let logical = &self.device.logical_device;
        fence_mut(&mut self.sync, slot)?.reset(logical)
    }

    fn acquire_image(&mut self, slot: usize) -> BackendResult<Option<u32>> {
        let image_available = semaphore_handle(&self.sync.image_available, "image-available semaphore", slot)?;
        self.swapchain
            .acquire_next_image_index(&self.device, u64::MAX, image_available, vk::Fence::null())
    }

    fn record_begin(&mut self, image_index: u32) -> BackendResult<()> {
        let index = image_index as usize;
        let logical = &self.device.logical_device;
        let command_buffer = command_buffer_mut(&mut self.graphics_command_buffers, index)?;
        command_buffer.reset()?;
        command_buffer.begin(logical, false, false, false)?;

        unsafe {
            logical.cmd_set_viewport(command_buffer.handle, 0, &[self.frame.viewport()]);
            logical.cmd_set_scissor(command_buffer.handle, 0, &[self.frame.scissor()]);
            logical.cmd_set_line_width(command_buffer.handle, 1.0);
        }

        self.main_render_pass.render_area = self.frame.render_area();
        let framebuffer = self
            .swapchain
            .framebuffers
            .get(index)
            .map(|framebuffer| framebuffer.handle)
            .ok_or_else(|| BackendError::InvalidState(format!("no framebuffer for image {}", index)))?;
        self.main_render_pass.begin(logical, command_buffer, framebuffer)
    }

    fn record_end(&mut self, image_index: u32) -> BackendResult<()> {
        let logical = &self.device.logical_device;
        let command_buffer = command_buffer_mut(&mut self.graphics_command_buffers, image_index as usize)?;
        self.main_render_pass.end(logical, command_buffer)?;
        command_buffer.end(logical)
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> BackendResult<()> {
        let fence_handle = fence_mut(&mut self.sync, slot)?.handle;
        let wait_semaphores = [semaphore_handle(&self.sync.image_available, "image-available semaphore", slot)?];
        let signal_semaphores = [semaphore_handle(&self.sync.queue_complete, "queue-complete semaphore", slot)?];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];

        let logical = &self.device.logical_device;
        let command_buffer = command_buffer_mut(&mut self.graphics_command_buffers, image_index as usize)?;
        let command_buffers = [command_buffer.handle];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe { logical.queue_submit(self.device.graphics_queue, &[submit_info], fence_handle) }
            .map_err(|e| utils::log_failure("vkQueueSubmit failed", e))?;
        command_buffer.update_submitted()
    }

    fn present(&mut self, slot: usize, image_index: u32) -> BackendResult<bool> {
        let render_complete = semaphore_handle(&self.sync.queue_complete, "queue-complete semaphore", slot)?;
        self.swapchain
            .present(&self.device, self.device.present_queue, render_complete, image_index)
    }

    fn rebuild_swapchain(&mut self, width: u32, height: u32) -> BackendResult<Option<RebuiltSwapchain>> {
        self.rebuild_presentation(width, height)
    }
}

fn fence_mut(sync: &mut FrameSync, slot: usize) -> BackendResult<&mut Fence> {
    sync.in_flight
        .get_mut(slot)
        .ok_or_else(|| missing_sync("in-flight fence", slot))
}

fn command_buffer_mut(buffers: &mut [CommandBuffer], image_index: usize) -> BackendResult<&mut CommandBuffer> {
    buffers
        .get_mut(image_index)
        .ok_or_else(|| BackendError::InvalidState(format!("no command buffer for image {}", image_index)))
}

fn semaphore_handle(semaphores: &[Semaphore], what: &str, slot: usize) -> BackendResult<vk::Semaphore> {
    semaphores
        .get(slot)
        .map(|semaphore| semaphore.handle)
        .ok_or_else(|| missing_sync(what, slot))
}

fn missing_sync(what: &str, slot: usize) -> BackendError {
    BackendError::InvalidState(format!("no {} for frame slot {}", what, slot))
}
