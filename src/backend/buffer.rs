// Buffer - GPU buffer with its own device memory
//
// Tracks usage, memory flags and the memory-type index it was allocated
// from, so a resize can allocate the replacement from the same type.

use ash::vk;
use std::ffi::c_void;

use super::command_buffer::CommandBuffer;
use super::device::Device;
use super::error::{BackendError, BackendResult};
use super::utils;

#[derive(Debug, Default)]
pub struct Buffer {
    pub handle: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub total_size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub memory_flags: vk::MemoryPropertyFlags,
    memory_index: u32,
    is_locked: bool,
}

impl Buffer {
    pub fn create(
        device: &Device,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_flags: vk::MemoryPropertyFlags,
        bind_on_create: bool,
    ) -> BackendResult<Self> {
        let mut buffer = Self {
            total_size: size,
            usage,
            memory_flags,
            ..Default::default()
        };

        let result = buffer.create_inner(device).and_then(|()| {
            if bind_on_create {
                buffer.bind(device, 0)
            } else {
                Ok(())
            }
        });
        if let Err(e) = result {
            log::error!("Error creating Vulkan buffer: {}", e);
            buffer.destroy(device);
            return Err(e);
        }

        Ok(buffer)
    }

    fn create_inner(&mut self, device: &Device) -> BackendResult<()> {
        let (handle, memory, memory_index) =
            allocate_buffer(device, self.total_size, self.usage, self.memory_flags, None)?;
        self.handle = handle;
        self.memory = memory;
        self.memory_index = memory_index;
        Ok(())
    }

    pub fn bind(&self, device: &Device, offset: vk::DeviceSize) -> BackendResult<()> {
        unsafe {
            device
                .logical_device
                .bind_buffer_memory(self.handle, self.memory, offset)
        }
        .map_err(|e| utils::log_failure("Error binding Vulkan buffer", e))?;
        Ok(())
    }

    pub fn memory_index(&self) -> u32 {
        self.memory_index
    }

    pub fn is_locked(&self) -> bool {
        self.is_locked
    }

    /// Maps `size` bytes at `offset`. Must be followed by `unlock`.
    pub fn lock(
        &mut self,
        device: &Device,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> BackendResult<*mut c_void> {
        if self.is_locked {
            return Err(BackendError::InvalidState("buffer is already locked".into()));
        }
        let ptr = unsafe {
            device
                .logical_device
                .map_memory(self.memory, offset, size, vk::MemoryMapFlags::empty())
        }
        .map_err(|e| utils::log_failure("Error locking Vulkan buffer memory", e))?;
        self.is_locked = true;
        Ok(ptr)
    }

    pub fn unlock(&mut self, device: &Device) {
        if self.is_locked {
            unsafe { device.logical_device.unmap_memory(self.memory) };
            self.is_locked = false;
        }
    }

    /// Copies `data` into host-visible memory at `offset` (map, copy, unmap).
    pub fn load_data<T: bytemuck::Pod>(
        &mut self,
        device: &Device,
        offset: vk::DeviceSize,
        data: &[T],
    ) -> BackendResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = bytes.len() as vk::DeviceSize;
        check_range(offset, size, self.total_size)?;

        let ptr = self.lock(device, offset, size)?;
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
        }
        self.unlock(device);
        Ok(())
    }

    /// Replaces the buffer with a `new_size` one from the same memory type,
    /// copying the old contents over. Blocks until the device is idle.
    ///
    /// The buffer must have been created with both `TRANSFER_SRC` and
    /// `TRANSFER_DST` usage: the old buffer is the copy source and the
    /// replacement, created with the same usage, is its destination.
    pub fn resize(
        &mut self,
        device: &Device,
        new_size: vk::DeviceSize,
        queue: vk::Queue,
        pool: vk::CommandPool,
    ) -> BackendResult<()> {
        check_resizable(self.usage)?;

        let (new_handle, new_memory, _) = allocate_buffer(
            device,
            new_size,
            self.usage,
            self.memory_flags,
            Some(self.memory_index),
        )?;

        let release_new = |device: &Device| {
            unsafe { device.logical_device.destroy_buffer(new_handle, None) };
            device.free_memory(new_memory);
        };

        if let Err(e) = unsafe { device.logical_device.bind_buffer_memory(new_handle, new_memory, 0) } {
            release_new(device);
            return Err(utils::log_failure("Unable to resize Vulkan buffer, memory binding failed", e).into());
        }

        let copy_size = self.total_size.min(new_size);
        if let Err(e) = copy_to(device, pool, queue, self.handle, 0, new_handle, 0, copy_size) {
            release_new(device);
            return Err(e);
        }

        device.wait_idle()?;

        self.unlock(device);
        unsafe { device.logical_device.destroy_buffer(self.handle, None) };
        device.free_memory(self.memory);

        self.total_size = new_size;
        self.memory = new_memory;
        self.handle = new_handle;
        log::debug!("Buffer resized to {} bytes", new_size);
        Ok(())
    }

    pub fn destroy(&mut self, device: &Device) {
        self.unlock(device);
        device.free_memory(self.memory);
        self.memory = vk::DeviceMemory::null();
        if self.handle != vk::Buffer::null() {
            unsafe { device.logical_device.destroy_buffer(self.handle, None) };
            self.handle = vk::Buffer::null();
        }
        self.total_size = 0;
    }
}

/// Fails when `size` bytes at `offset` do not fit in a buffer of `total_size`.
pub fn check_range(offset: vk::DeviceSize, size: vk::DeviceSize, total_size: vk::DeviceSize) -> BackendResult<()> {
    match offset.checked_add(size) {
        Some(end) if end <= total_size => Ok(()),
        _ => Err(BackendError::InvalidState(format!(
            "load of {} bytes at offset {} overruns buffer of {} bytes",
            size, offset, total_size
        ))),
    }
}

/// Fails unless `usage` allows the buffer to be both copied from and into.
pub fn check_resizable(usage: vk::BufferUsageFlags) -> BackendResult<()> {
    let required = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;
    if usage.contains(required) {
        Ok(())
    } else {
        Err(BackendError::InvalidState(format!(
            "buffer usage {:?} lacks TRANSFER_SRC | TRANSFER_DST, cannot resize",
            usage
        )))
    }
}

/// Creates a buffer and allocates (but does not bind) memory for it. Uses
/// `memory_index` when given, otherwise searches for one matching `memory_flags`.
fn allocate_buffer(
    device: &Device,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_flags: vk::MemoryPropertyFlags,
    memory_index: Option<u32>,
) -> BackendResult<(vk::Buffer, vk::DeviceMemory, u32)> {
    let logical = &device.logical_device;

    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let handle = unsafe { logical.create_buffer(&buffer_info, None) }
        .map_err(|e| utils::log_failure("Error creating Vulkan buffer", e))?;

    let requirements = unsafe { logical.get_buffer_memory_requirements(handle) };
    let index = match memory_index.or_else(|| device.find_memory_index(requirements.memory_type_bits, memory_flags)) {
        Some(index) => index,
        None => {
            log::error!("Unable to create Vulkan buffer because the required memory type index was not found");
            unsafe { logical.destroy_buffer(handle, None) };
            return Err(BackendError::NoMemoryType);
        }
    };

    match device.allocate_memory(requirements.size, index) {
        Ok(memory) => Ok((handle, memory, index)),
        Err(e) => {
            unsafe { logical.destroy_buffer(handle, None) };
            Err(e)
        }
    }
}

/// Copies `size` bytes between buffers through a single-use command buffer.
/// Waits for `queue` to go idle before and after.
#[allow(clippy::too_many_arguments)]
pub fn copy_to(
    device: &Device,
    pool: vk::CommandPool,
    queue: vk::Queue,
    source: vk::Buffer,
    source_offset: vk::DeviceSize,
    dest: vk::Buffer,
    dest_offset: vk::DeviceSize,
    size: vk::DeviceSize,
) -> BackendResult<()> {
    let logical = &device.logical_device;
    unsafe { logical.queue_wait_idle(queue) }
        .map_err(|e| utils::log_failure("vkQueueWaitIdle failed", e))?;

    let command_buffer = CommandBuffer::allocate_and_begin_single_use(logical, pool)?;

    let region = vk::BufferCopy {
        src_offset: source_offset,
        dst_offset: dest_offset,
        size,
    };
    unsafe { logical.cmd_copy_buffer(command_buffer.handle, source, dest, &[region]) };

    command_buffer.end_single_use(logical, pool, queue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_buffer_is_empty() {
        let buffer = Buffer::default();
        assert_eq!(buffer.handle, vk::Buffer::null());
        assert_eq!(buffer.memory, vk::DeviceMemory::null());
        assert_eq!(buffer.total_size, 0);
        assert!(!buffer.is_locked());
    }

    #[test]
    fn test_load_range() {
        assert!(check_range(0, 256, 768).is_ok());
        assert!(check_range(512, 256, 768).is_ok());
        assert!(check_range(513, 256, 768).is_err());
        assert!(check_range(u64::MAX, 1, 768).is_err());
    }

    #[test]
    fn test_resize_requires_transfer_usage() {
        let vertex = vk::BufferUsageFlags::VERTEX_BUFFER;
        let both = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;

        assert!(check_resizable(vertex | both).is_ok());
        assert!(matches!(
            check_resizable(vertex | vk::BufferUsageFlags::TRANSFER_DST),
            Err(BackendError::InvalidState(_))
        ));
        assert!(check_resizable(vertex | vk::BufferUsageFlags::TRANSFER_SRC).is_err());
        assert!(check_resizable(vk::BufferUsageFlags::UNIFORM_BUFFER).is_err());
    }
}
