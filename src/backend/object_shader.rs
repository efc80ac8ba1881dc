// Built-in object shader
//
// Vertex + fragment stage, one global uniform buffer described by one
// descriptor set per frame in flight, and the pipeline tying them together.
// Each frame slot owns a 256-byte region of the uniform buffer; the slot's
// fence has been waited on before the region is rewritten.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use super::buffer::Buffer;
use super::command_buffer::CommandBuffer;
use super::device::Device;
use super::error::{BackendError, BackendResult};
use super::pipeline::{packed_attributes, Pipeline, PipelineDesc};
use super::render_pass::RenderPass;
use super::shader::{ShaderKind, ShaderStage};
use super::utils;

pub const BUILTIN_SHADER_NAME_OBJECT: &str = "Builtin.ObjectShader";

/// Upper bound on frame slots the shader allocates descriptor sets for.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Per-frame global uniform data. Padded to 256 bytes, the largest
/// `minUniformBufferOffsetAlignment` a device may require.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GlobalUniformObject {
    pub projection: Mat4,
    pub view: Mat4,
    pub reserved0: Mat4,
    pub reserved1: Mat4,
}

impl Default for GlobalUniformObject {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            reserved0: Mat4::ZERO,
            reserved1: Mat4::ZERO,
        }
    }
}

pub const GLOBAL_UBO_SIZE: vk::DeviceSize = std::mem::size_of::<GlobalUniformObject>() as vk::DeviceSize;

/// Byte offset of a frame slot's region in the uniform buffer.
pub fn slot_offset(slot: usize) -> vk::DeviceSize {
    slot as vk::DeviceSize * GLOBAL_UBO_SIZE
}

#[derive(Debug, Default)]
pub struct ObjectShader {
    pub stages: Vec<ShaderStage>,
    pub global_descriptor_set_layout: vk::DescriptorSetLayout,
    pub global_descriptor_pool: vk::DescriptorPool,
    pub global_descriptor_sets: Vec<vk::DescriptorSet>,
    pub global_uniform_buffer: Buffer,
    pub global_ubo: GlobalUniformObject,
    pub pipeline: Pipeline,
}

impl ObjectShader {
    /// Loads both stages and builds the descriptor objects, uniform buffer and
    /// pipeline. A stage that fails to load stops creation before any
    /// pipeline object is made.
    pub fn create(
        device: &Device,
        render_pass: &RenderPass,
        framebuffer_width: u32,
        framebuffer_height: u32,
    ) -> BackendResult<Self> {
        let mut shader = Self::default();
        if let Err(e) = shader.create_inner(device, render_pass, framebuffer_width, framebuffer_height) {
            shader.destroy(device);
            return Err(e);
        }
        log::info!("Object shader '{}' created", BUILTIN_SHADER_NAME_OBJECT);
        Ok(shader)
    }

    fn create_inner(
        &mut self,
        device: &Device,
        render_pass: &RenderPass,
        framebuffer_width: u32,
        framebuffer_height: u32,
    ) -> BackendResult<()> {
        let logical = &device.logical_device;

        for kind in [ShaderKind::Vertex, ShaderKind::Fragment] {
            let stage = ShaderStage::create(logical, BUILTIN_SHADER_NAME_OBJECT, kind).map_err(|e| {
                log::error!(
                    "Unable to create {} shader module for '{}'",
                    kind.extension(),
                    BUILTIN_SHADER_NAME_OBJECT
                );
                e
            })?;
            self.stages.push(stage);
        }

        let ubo_binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_count(1)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .build();
        let bindings = &[ubo_binding];
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);
        self.global_descriptor_set_layout = unsafe { logical.create_descriptor_set_layout(&layout_info, None) }
            .map_err(|e| utils::log_failure("Error creating global descriptor set layout", e))?;

        let pool_size = vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: MAX_FRAMES_IN_FLIGHT as u32,
        };
        let pool_sizes = &[pool_size];
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(pool_sizes)
            .max_sets(MAX_FRAMES_IN_FLIGHT as u32);
        self.global_descriptor_pool = unsafe { logical.create_descriptor_pool(&pool_info, None) }
            .map_err(|e| utils::log_failure("Error creating global descriptor pool", e))?;

        // Y-flipped; overridden by the dynamic viewport every frame
        let viewport = vk::Viewport {
            x: 0.0,
            y: framebuffer_height as f32,
            width: framebuffer_width as f32,
            height: -(framebuffer_height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D {
                width: framebuffer_width,
                height: framebuffer_height,
            },
        };

        // Position only
        let vec3_size = std::mem::size_of::<Vec3>() as u32;
        let attributes = packed_attributes(&[(vk::Format::R32G32B32_SFLOAT, vec3_size)]);
        let set_layouts = [self.global_descriptor_set_layout];
        let stage_infos: Vec<vk::PipelineShaderStageCreateInfo> =
            self.stages.iter().map(ShaderStage::stage_create_info).collect();

        self.pipeline = Pipeline::create(
            logical,
            &PipelineDesc {
                render_pass: render_pass.handle,
                vertex_stride: vec3_size,
                attributes: &attributes,
                descriptor_set_layouts: &set_layouts,
                stages: &stage_infos,
                viewport,
                scissor,
                wireframe: false,
            },
        )
        .map_err(|e| {
            log::error!("Failed to load graphics pipeline for object shader");
            e
        })?;

        self.global_uniform_buffer = create_uniform_buffer(device)?;

        let layouts = vec![self.global_descriptor_set_layout; MAX_FRAMES_IN_FLIGHT];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.global_descriptor_pool)
            .set_layouts(&layouts);
        self.global_descriptor_sets = unsafe { logical.allocate_descriptor_sets(&alloc_info) }
            .map_err(|e| utils::log_failure("Error allocating global descriptor sets", e))?;

        Ok(())
    }

    /// Binds the pipeline on `command_buffer`.
    pub fn use_shader(&self, device: &Device, command_buffer: &CommandBuffer) {
        self.pipeline
            .bind(&device.logical_device, command_buffer, vk::PipelineBindPoint::GRAPHICS);
    }

    /// Uploads `global_ubo` into the region of `frame_slot` and binds that
    /// slot's descriptor set.
    pub fn update_global_state(
        &mut self,
        device: &Device,
        command_buffer: &CommandBuffer,
        frame_slot: usize,
    ) -> BackendResult<()> {
        let descriptor_set = *self.global_descriptor_sets.get(frame_slot).ok_or_else(|| {
            BackendError::InvalidState(format!("no global descriptor set for frame slot {}", frame_slot))
        })?;
        let logical = &device.logical_device;
        let offset = slot_offset(frame_slot);

        self.global_uniform_buffer
            .load_data(device, offset, std::slice::from_ref(&self.global_ubo))?;

        let buffer_info = vk::DescriptorBufferInfo {
            buffer: self.global_uniform_buffer.handle,
            offset,
            range: GLOBAL_UBO_SIZE,
        };
        let buffer_infos = &[buffer_info];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(descriptor_set)
            .dst_binding(0)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(buffer_infos)
            .build();

        unsafe {
            logical.update_descriptor_sets(&[write], &[]);
            logical.cmd_bind_descriptor_sets(
                command_buffer.handle,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout,
                0,
                &[descriptor_set],
                &[],
            );
        }
        Ok(())
    }

    pub fn destroy(&mut self, device: &Device) {
        let logical = &device.logical_device;

        self.global_uniform_buffer.destroy(device);
        self.pipeline.destroy(logical);

        unsafe {
            if self.global_descriptor_pool != vk::DescriptorPool::null() {
                // Frees the sets allocated from it
                logical.destroy_descriptor_pool(self.global_descriptor_pool, None);
                self.global_descriptor_pool = vk::DescriptorPool::null();
            }
            if self.global_descriptor_set_layout != vk::DescriptorSetLayout::null() {
                logical.destroy_descriptor_set_layout(self.global_descriptor_set_layout, None);
                self.global_descriptor_set_layout = vk::DescriptorSetLayout::null();
            }
        }
        self.global_descriptor_sets.clear();

        for stage in &mut self.stages {
            stage.destroy(logical);
        }
        self.stages.clear();
    }
}

/// Device-local host-visible memory when the device has it, plain
/// host-visible memory otherwise.
fn create_uniform_buffer(device: &Device) -> BackendResult<Buffer> {
    let size = GLOBAL_UBO_SIZE * MAX_FRAMES_IN_FLIGHT as vk::DeviceSize;
    let usage = vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::UNIFORM_BUFFER;
    let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

    match Buffer::create(device, size, usage, host | vk::MemoryPropertyFlags::DEVICE_LOCAL, true) {
        Err(BackendError::NoMemoryType) => {
            log::debug!("No device-local host-visible memory, using host memory for the global UBO");
            Buffer::create(device, size, usage, host, true)
        }
        result => result,
    }
    .map_err(|e| {
        log::error!("Global uniform buffer creation failed for object shader");
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_ubo_is_256_bytes() {
        assert_eq!(GLOBAL_UBO_SIZE, 256);
        assert_eq!(std::mem::align_of::<GlobalUniformObject>() % 4, 0);
    }

    #[test]
    fn test_global_ubo_bytes_start_with_projection() {
        let ubo = GlobalUniformObject {
            projection: Mat4::from_scale(Vec3::splat(2.0)),
            ..Default::default()
        };
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&ubo));
        assert_eq!(floats.len(), 64);
        assert_eq!(floats[0], 2.0);
        // view is identity
        assert_eq!(floats[16], 1.0);
        assert_eq!(floats[32..].iter().sum::<f32>(), 0.0);
    }

    #[test]
    fn test_slot_offsets_are_aligned() {
        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            assert_eq!(slot_offset(slot) % 256, 0);
        }
        assert_eq!(slot_offset(2), 512);
    }
}
