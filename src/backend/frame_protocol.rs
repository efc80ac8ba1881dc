// Frame protocol - the order of operations for one frame
//
// begin_frame:  gate on recreation/resize → wait slot fence → acquire image →
//               record begin (command buffer, dynamic state, render pass)
// end_frame:    record end → wait the image's previous fence → claim image →
//               reset slot fence → submit → present → advance slot
//
// The GPU side sits behind `FrameOps`. `Context` implements it with Vulkan
// calls. A frame call returning `Ok(false)` means "skip this frame", never
// failure.

use ash::vk;

use super::error::BackendResult;
use super::frame::{FrameGate, FrameState};

/// Shape of the swapchain after a rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RebuiltSwapchain {
    pub extent: vk::Extent2D,
    pub image_count: usize,
    pub frames_in_flight: usize,
}

/// Device-side steps of a frame, issued in the order the functions of this
/// module decide.
pub trait FrameOps {
    fn frame(&self) -> &FrameState;
    fn frame_mut(&mut self) -> &mut FrameState;

    fn wait_idle(&mut self) -> BackendResult<()>;

    /// Waits on the in-flight fence of `slot`. False on timeout.
    fn wait_fence(&mut self, slot: usize) -> BackendResult<bool>;

    fn reset_fence(&mut self, slot: usize) -> BackendResult<()>;

    /// Acquires the next image, signaling the slot's image-available
    /// semaphore. `Ok(None)` when the swapchain is out of date.
    fn acquire_image(&mut self, slot: usize) -> BackendResult<Option<u32>>;

    /// Resets and begins the image's command buffer, sets the dynamic state
    /// and begins the main render pass.
    fn record_begin(&mut self, image_index: u32) -> BackendResult<()>;

    /// Ends the main render pass and the image's command buffer.
    fn record_end(&mut self, image_index: u32) -> BackendResult<()>;

    /// Submits the image's command buffer, signaling the slot's fence.
    fn submit(&mut self, slot: usize, image_index: u32) -> BackendResult<()>;

    /// True when the swapchain is out of date or suboptimal.
    fn present(&mut self, slot: usize, image_index: u32) -> BackendResult<bool>;

    /// Rebuilds the swapchain and everything sized by it. `Ok(None)` when
    /// the surface has no area right now; nothing was torn down.
    fn rebuild_swapchain(&mut self, width: u32, height: u32) -> BackendResult<Option<RebuiltSwapchain>>;
}

pub fn begin_frame<O: FrameOps + ?Sized>(ops: &mut O) -> BackendResult<bool> {
    match ops.frame().gate() {
        FrameGate::Proceed => {}
        FrameGate::Recreating => {
            ops.wait_idle()?;
            log::info!("begin_frame: swapchain recreation in progress. Booting.");
            return Ok(false);
        }
        FrameGate::ZeroArea => {
            log::trace!("begin_frame: window has zero area. Booting.");
            return Ok(false);
        }
        FrameGate::ResizePending { width, height } => {
            ops.wait_idle()?;
            if recreate_swapchain(ops, width, height)? {
                log::info!("Resized, booting.");
            }
            return Ok(false);
        }
    }

    let slot = ops.frame().current_frame;
    if !ops.wait_fence(slot)? {
        log::warn!("In-flight fence wait failure!");
        return Ok(false);
    }

    let Some(image_index) = ops.acquire_image(slot)? else {
        log::debug!("Swapchain out of date on acquire, recreating");
        recreate_at_current_size(ops)?;
        return Ok(false);
    };
    ops.frame_mut().image_index = image_index;

    ops.record_begin(image_index)?;
    Ok(true)
}

pub fn end_frame<O: FrameOps + ?Sized>(ops: &mut O) -> BackendResult<bool> {
    let slot = ops.frame().current_frame;
    let image_index = ops.frame().image_index;

    ops.record_end(image_index)?;

    // The image may still be in use by an earlier frame
    if let Some(previous) = ops.frame().fence_for_image(image_index) {
        if !ops.wait_fence(previous)? {
            log::warn!("Wait on the fence of image {} timed out", image_index);
        }
    }
    ops.frame_mut().claim_image(image_index)?;

    ops.reset_fence(slot)?;
    ops.submit(slot, image_index)?;
    ops.frame_mut().complete_frame();

    let presented = ops.present(slot, image_index);
    ops.frame_mut().advance();

    if presented? {
        log::debug!("Swapchain out of date or suboptimal on present, recreating");
        recreate_at_current_size(ops)?;
    }
    Ok(true)
}

/// Recreates the swapchain at `width`x`height`. Returns false when
/// recreation is refused or deferred: already in progress, a zero-sized
/// target, or a surface with no area.
pub fn recreate_swapchain<O: FrameOps + ?Sized>(ops: &mut O, width: u32, height: u32) -> BackendResult<bool> {
    if !ops.frame_mut().begin_recreate() {
        log::debug!("recreate_swapchain called when already recreating. Booting.");
        return Ok(false);
    }

    if width == 0 || height == 0 {
        log::debug!("recreate_swapchain called when window is < 1 in a dimension. Booting.");
        ops.frame_mut().abort_recreate();
        return Ok(false);
    }

    match ops.rebuild_swapchain(width, height) {
        Ok(Some(rebuilt)) => {
            ops.frame_mut().finish_recreate(
                (width, height),
                rebuilt.extent,
                rebuilt.image_count,
                rebuilt.frames_in_flight,
            );
            Ok(true)
        }
        Ok(None) => {
            ops.frame_mut().abort_recreate();
            Ok(false)
        }
        Err(e) => {
            ops.frame_mut().abort_recreate();
            Err(e)
        }
    }
}

/// Recreates at the current framebuffer size, after an out-of-date or
/// suboptimal acquire/present.
pub fn recreate_at_current_size<O: FrameOps + ?Sized>(ops: &mut O) -> BackendResult<bool> {
    let (width, height) = ops.frame().framebuffer_size();
    recreate_swapchain(ops, width, height)
}
