// Command buffers
//
// One primary command buffer per swapchain image, reset and re-recorded every
// frame. The recording state is tracked explicitly; a call made in the wrong
// state is rejected instead of reaching the driver.

use ash::vk;

use super::error::{BackendError, BackendResult};
use super::utils;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CommandBufferState {
    #[default]
    NotAllocated,
    Ready,
    Recording,
    InRenderPass,
    RecordingEnded,
    Submitted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandBufferAction {
    Allocate,
    Begin,
    BeginRenderPass,
    EndRenderPass,
    End,
    Submit,
    Reset,
    Free,
}

impl CommandBufferState {
    /// Next state for `action`, or `InvalidState` if the action is not allowed here.
    pub fn transition(self, action: CommandBufferAction) -> BackendResult<Self> {
        use CommandBufferAction as A;
        use CommandBufferState as S;

        let next = match (self, action) {
            (S::NotAllocated, A::Allocate) => S::Ready,
            (S::Ready, A::Begin) => S::Recording,
            (S::Recording, A::BeginRenderPass) => S::InRenderPass,
            (S::InRenderPass, A::EndRenderPass) => S::Recording,
            (S::Recording, A::End) => S::RecordingEnded,
            (S::RecordingEnded, A::Submit) => S::Submitted,
            (S::NotAllocated, A::Reset) => {
                return Err(invalid(self, action));
            }
            (_, A::Reset) => S::Ready,
            (_, A::Free) => S::NotAllocated,
            _ => return Err(invalid(self, action)),
        };
        Ok(next)
    }
}

fn invalid(state: CommandBufferState, action: CommandBufferAction) -> BackendError {
    log::error!("Command buffer: {:?} is not valid in state {:?}", action, state);
    BackendError::InvalidState(format!("command buffer {:?} while {:?}", action, state))
}

#[derive(Debug, Default)]
pub struct CommandBuffer {
    pub handle: vk::CommandBuffer,
    state: CommandBufferState,
}

impl CommandBuffer {
    pub fn allocate(device: &ash::Device, pool: vk::CommandPool, primary: bool) -> BackendResult<Self> {
        let state = CommandBufferState::NotAllocated.transition(CommandBufferAction::Allocate)?;

        let level = if primary {
            vk::CommandBufferLevel::PRIMARY
        } else {
            vk::CommandBufferLevel::SECONDARY
        };
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(level)
            .command_buffer_count(1);

        let buffers = unsafe { device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| utils::log_failure("Failed to allocate command buffer", e))?;
        let handle = buffers
            .into_iter()
            .next()
            .ok_or(BackendError::Vulkan(vk::Result::ERROR_UNKNOWN))?;

        Ok(Self { handle, state })
    }

    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    pub fn begin(
        &mut self,
        device: &ash::Device,
        single_use: bool,
        render_pass_continue: bool,
        simultaneous_use: bool,
    ) -> BackendResult<()> {
        let next = self.state.transition(CommandBufferAction::Begin)?;

        let mut flags = vk::CommandBufferUsageFlags::empty();
        if single_use {
            flags |= vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT;
        }
        if render_pass_continue {
            flags |= vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE;
        }
        if simultaneous_use {
            flags |= vk::CommandBufferUsageFlags::SIMULTANEOUS_USE;
        }
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);

        unsafe { device.begin_command_buffer(self.handle, &begin_info) }
            .map_err(|e| utils::log_failure("vkBeginCommandBuffer failed", e))?;
        self.state = next;
        Ok(())
    }

    pub fn end(&mut self, device: &ash::Device) -> BackendResult<()> {
        let next = self.state.transition(CommandBufferAction::End)?;
        unsafe { device.end_command_buffer(self.handle) }
            .map_err(|e| utils::log_failure("vkEndCommandBuffer failed", e))?;
        self.state = next;
        Ok(())
    }

    /// Render passes are the only callers; see `RenderPass::begin`/`end`.
    pub(crate) fn enter_render_pass(&mut self) -> BackendResult<()> {
        self.state = self.state.transition(CommandBufferAction::BeginRenderPass)?;
        Ok(())
    }

    pub(crate) fn leave_render_pass(&mut self) -> BackendResult<()> {
        self.state = self.state.transition(CommandBufferAction::EndRenderPass)?;
        Ok(())
    }

    /// Records that the buffer was handed to a queue.
    pub fn update_submitted(&mut self) -> BackendResult<()> {
        self.state = self.state.transition(CommandBufferAction::Submit)?;
        Ok(())
    }

    /// Back to `Ready`. The pool was created with `RESET_COMMAND_BUFFER`, so
    /// `vkBeginCommandBuffer` resets the buffer implicitly.
    pub fn reset(&mut self) -> BackendResult<()> {
        self.state = self.state.transition(CommandBufferAction::Reset)?;
        Ok(())
    }

    pub fn free(&mut self, device: &ash::Device, pool: vk::CommandPool) {
        if self.handle != vk::CommandBuffer::null() {
            unsafe { device.free_command_buffers(pool, &[self.handle]) };
            self.handle = vk::CommandBuffer::null();
        }
        self.state = CommandBufferState::NotAllocated;
    }

    /// Allocates a primary buffer and begins it for one-time submission.
    pub fn allocate_and_begin_single_use(device: &ash::Device, pool: vk::CommandPool) -> BackendResult<Self> {
        let mut command_buffer = Self::allocate(device, pool, true)?;
        if let Err(e) = command_buffer.begin(device, true, false, false) {
            command_buffer.free(device, pool);
            return Err(e);
        }
        Ok(command_buffer)
    }

    /// Ends, submits, blocks until `queue` is idle, then frees. Never used for
    /// the per-frame buffers.
    pub fn end_single_use(
        mut self,
        device: &ash::Device,
        pool: vk::CommandPool,
        queue: vk::Queue,
    ) -> BackendResult<()> {
        let result = self.submit_and_wait(device, queue);
        self.free(device, pool);
        result
    }

    fn submit_and_wait(&mut self, device: &ash::Device, queue: vk::Queue) -> BackendResult<()> {
        self.end(device)?;

        let command_buffers = [self.handle];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers).build();
        unsafe { device.queue_submit(queue, &[submit_info], vk::Fence::null()) }
            .map_err(|e| utils::log_failure("Single-use submit failed", e))?;
        self.update_submitted()?;

        unsafe { device.queue_wait_idle(queue) }
            .map_err(|e| utils::log_failure("vkQueueWaitIdle failed", e))?;
        Ok(())
    }
}

/// Allocates one primary command buffer per swapchain image.
pub fn allocate_per_image(
    device: &ash::Device,
    pool: vk::CommandPool,
    image_count: usize,
) -> BackendResult<Vec<CommandBuffer>> {
    let mut buffers = Vec::with_capacity(image_count);
    for _ in 0..image_count {
        match CommandBuffer::allocate(device, pool, true) {
            Ok(buffer) => buffers.push(buffer),
            Err(e) => {
                free_all(&mut buffers, device, pool);
                return Err(e);
            }
        }
    }
    log::debug!("Vulkan command buffers created: {}", image_count);
    Ok(buffers)
}

pub fn free_all(buffers: &mut Vec<CommandBuffer>, device: &ash::Device, pool: vk::CommandPool) {
    for buffer in buffers.iter_mut() {
        buffer.free(device, pool);
    }
    buffers.clear();
}
