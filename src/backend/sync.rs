// Synchronization primitives
//
// Fences for GPU-CPU sync, semaphores for GPU-GPU sync. One of each kind per
// frame in flight.

use ash::vk;

use super::error::BackendResult;
use super::utils;

/// Fence plus a cached signaled flag, so waiting on a fence we already saw
/// signal skips the API call.
#[derive(Debug, Default)]
pub struct Fence {
    pub handle: vk::Fence,
    is_signaled: bool,
}

impl Fence {
    pub fn create(device: &ash::Device, create_signaled: bool) -> BackendResult<Self> {
        let flags = if create_signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence_info = vk::FenceCreateInfo::builder().flags(flags);

        let handle = unsafe { device.create_fence(&fence_info, None) }
            .map_err(|e| utils::log_failure("Failed to create fence", e))?;

        Ok(Self {
            handle,
            is_signaled: create_signaled,
        })
    }

    pub fn is_signaled(&self) -> bool {
        self.is_signaled
    }

    /// Waits up to `timeout_ns`. Returns false on timeout; other failures are errors.
    pub fn wait(&mut self, device: &ash::Device, timeout_ns: u64) -> BackendResult<bool> {
        if self.is_signaled {
            return Ok(true);
        }

        match unsafe { device.wait_for_fences(&[self.handle], true, timeout_ns) } {
            Ok(()) => {
                self.is_signaled = true;
                Ok(true)
            }
            Err(vk::Result::TIMEOUT) => {
                log::warn!("Fence wait timed out");
                Ok(false)
            }
            Err(e) => Err(utils::log_failure("Fence wait failed", e).into()),
        }
    }

    /// Unsignals the fence. Only done right before the submit that signals it.
    pub fn reset(&mut self, device: &ash::Device) -> BackendResult<()> {
        if !self.is_signaled {
            return Ok(());
        }
        unsafe { device.reset_fences(&[self.handle]) }
            .map_err(|e| utils::log_failure("Failed to reset fence", e))?;
        self.is_signaled = false;
        Ok(())
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        if self.handle != vk::Fence::null() {
            unsafe { device.destroy_fence(self.handle, None) };
            self.handle = vk::Fence::null();
        }
        self.is_signaled = false;
    }
}

#[derive(Debug, Default)]
pub struct Semaphore {
    pub handle: vk::Semaphore,
}

impl Semaphore {
    pub fn create(device: &ash::Device) -> BackendResult<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let handle = unsafe { device.create_semaphore(&semaphore_info, None) }
            .map_err(|e| utils::log_failure("Failed to create semaphore", e))?;
        Ok(Self { handle })
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        if self.handle != vk::Semaphore::null() {
            unsafe { device.destroy_semaphore(self.handle, None) };
            self.handle = vk::Semaphore::null();
        }
    }
}

/// Per-slot synchronization objects, one entry per frame in flight.
#[derive(Debug, Default)]
pub struct FrameSync {
    pub image_available: Vec<Semaphore>,
    pub queue_complete: Vec<Semaphore>,
    pub in_flight: Vec<Fence>,
}

impl FrameSync {
    /// Fences start signaled so the first wait on each slot returns at once.
    pub fn create(device: &ash::Device, frames_in_flight: usize) -> BackendResult<Self> {
        let mut sync = Self::default();
        if let Err(e) = sync.fill(device, frames_in_flight) {
            sync.destroy(device);
            return Err(e);
        }
        log::debug!("Created sync objects for {} frames in flight", frames_in_flight);
        Ok(sync)
    }

    fn fill(&mut self, device: &ash::Device, frames_in_flight: usize) -> BackendResult<()> {
        for _ in 0..frames_in_flight {
            self.image_available.push(Semaphore::create(device)?);
            self.queue_complete.push(Semaphore::create(device)?);
            self.in_flight.push(Fence::create(device, true)?);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        for semaphore in self
            .image_available
            .iter_mut()
            .chain(self.queue_complete.iter_mut())
        {
            semaphore.destroy(device);
        }
        for fence in &mut self.in_flight {
            fence.destroy(device);
        }
        self.image_available.clear();
        self.queue_complete.clear();
        self.in_flight.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fence_is_null_and_unsignaled() {
        let fence = Fence::default();
        assert_eq!(fence.handle, vk::Fence::null());
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_empty_frame_sync() {
        let sync = FrameSync::default();
        assert!(sync.is_empty());
        assert_eq!(sync.len(), 0);
    }
}
